//! OpenFlow 1.3.1 wire framing (spec.md §6): an 8-byte header
//! `(version: u8, type: u8, length: u16, xid: u32)` followed by
//! `length - 8` payload bytes, all multi-byte integers big-endian.

use std::collections::BTreeSet;

/// Size in bytes of the fixed `ofp_header`.
pub const HEADER_LEN: usize = 8;

/// OpenFlow 1.3 wire version number.
pub const OFP_VERSION_1_3: u8 = 0x04;

/// `ofp_type` values this core dispatches on (spec.md §4.3/§4.9); values
/// outside this set are rejected with `BAD_TYPE`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum OfpType {
    Hello = 0,
    Error = 1,
    EchoRequest = 2,
    EchoReply = 3,
    Experimenter = 4,
    FeaturesRequest = 5,
    FeaturesReply = 6,
    GetConfigRequest = 7,
    GetConfigReply = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    GroupMod = 15,
    PortMod = 16,
    TableMod = 17,
    MultipartRequest = 18,
    MultipartReply = 19,
    BarrierRequest = 20,
    BarrierReply = 21,
    QueueGetConfigRequest = 22,
    QueueGetConfigReply = 23,
    RoleRequest = 24,
    RoleReply = 25,
    GetAsyncRequest = 26,
    GetAsyncReply = 27,
    SetAsync = 28,
    MeterMod = 29,
}

impl OfpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use OfpType::*;
        Some(match value {
            0 => Hello,
            1 => Error,
            2 => EchoRequest,
            3 => EchoReply,
            4 => Experimenter,
            5 => FeaturesRequest,
            6 => FeaturesReply,
            7 => GetConfigRequest,
            8 => GetConfigReply,
            9 => SetConfig,
            10 => PacketIn,
            11 => FlowRemoved,
            12 => PortStatus,
            13 => PacketOut,
            14 => FlowMod,
            15 => GroupMod,
            16 => PortMod,
            17 => TableMod,
            18 => MultipartRequest,
            19 => MultipartReply,
            20 => BarrierRequest,
            21 => BarrierReply,
            22 => QueueGetConfigRequest,
            23 => QueueGetConfigReply,
            24 => RoleRequest,
            25 => RoleReply,
            26 => GetAsyncRequest,
            27 => GetAsyncReply,
            28 => SetAsync,
            29 => MeterMod,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this type carries a multipart body split across fragments
    /// (spec.md §4.2).
    pub fn is_multipart(self) -> bool {
        matches!(self, OfpType::MultipartRequest | OfpType::MultipartReply)
    }
}

/// A decoded `ofp_header`. Does not own the payload; callers slice the
/// owning [`crate::pbuf::PBuf`] separately once they know `length`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub version: u8,
    pub raw_type: u8,
    pub length: u16,
    pub xid: u32,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            version: bytes[0],
            raw_type: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
            xid: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.version;
        out[1] = self.raw_type;
        out[2..4].copy_from_slice(&self.length.to_be_bytes());
        out[4..8].copy_from_slice(&self.xid.to_be_bytes());
        out
    }

    pub fn message_type(&self) -> Option<OfpType> {
        OfpType::from_u8(self.raw_type)
    }
}

/// `OFPHET_VERSIONBITMAP` Hello element: the set of wire versions one side
/// announces as supported (spec.md §4.1: "inspect a `VersionBitmap` Hello
/// element for a common version").
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VersionBitmap {
    versions: BTreeSet<u8>,
}

const HELLO_ELEM_VERSIONBITMAP: u16 = 1;

impl VersionBitmap {
    pub fn new(versions: impl IntoIterator<Item = u8>) -> Self {
        Self {
            versions: versions.into_iter().collect(),
        }
    }

    pub fn supports(&self, version: u8) -> bool {
        self.versions.contains(&version)
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.versions.iter().copied()
    }

    /// Highest version present in both bitmaps, if any (spec.md §8 property
    /// 3: "the negotiated version equals `max(local ∩ peer)` when
    /// non-empty").
    pub fn highest_common(&self, other: &VersionBitmap) -> Option<u8> {
        self.versions
            .intersection(&other.versions)
            .copied()
            .max()
    }

    /// Encodes as a single `OFPHET_VERSIONBITMAP` Hello element: a 4-byte
    /// element header (`type`, `length`) followed by one `u32` bitmap word
    /// per 32 versions, bit `n` of word `n/32` set iff version `n` is
    /// supported.
    pub fn encode(&self) -> Vec<u8> {
        let max_version = self.versions.iter().copied().max().unwrap_or(0);
        let word_count = (max_version as usize / 32) + 1;
        let mut words = vec![0u32; word_count];
        for &v in &self.versions {
            words[v as usize / 32] |= 1u32 << (v as usize % 32);
        }
        let body_len = 4 + words.len() * 4;
        let mut out = Vec::with_capacity(body_len);
        out.extend_from_slice(&HELLO_ELEM_VERSIONBITMAP.to_be_bytes());
        out.extend_from_slice(&(body_len as u16).to_be_bytes());
        for word in words {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Decodes one `OFPHET_VERSIONBITMAP` element. `bytes` must begin at the
    /// element's own 4-byte header.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let elem_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let elem_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if elem_type != HELLO_ELEM_VERSIONBITMAP || elem_len > bytes.len() || elem_len < 4 {
            return None;
        }
        let mut versions = BTreeSet::new();
        for (word_idx, chunk) in bytes[4..elem_len].chunks(4).enumerate() {
            if chunk.len() < 4 {
                break;
            }
            let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            for bit in 0..32 {
                if word & (1 << bit) != 0 {
                    versions.insert((word_idx * 32 + bit) as u8);
                }
            }
        }
        Some(Self { versions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_encode_parse() {
        let header = Header {
            version: OFP_VERSION_1_3,
            raw_type: OfpType::Hello.as_u8(),
            length: 8,
            xid: 0xdead_beef,
        };
        let bytes = header.encode();
        let parsed = Header::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn version_bitmap_round_trips() {
        let bitmap = VersionBitmap::new([0x01, 0x04, 0x05]);
        let encoded = bitmap.encode();
        let decoded = VersionBitmap::decode(&encoded).unwrap();
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn highest_common_picks_max_of_intersection() {
        let local = VersionBitmap::new([0x01, 0x04]);
        let peer = VersionBitmap::new([0x01, 0x04, 0x05]);
        assert_eq!(local.highest_common(&peer), Some(0x04));
    }

    #[test]
    fn highest_common_is_none_when_disjoint() {
        let local = VersionBitmap::new([0x04]);
        let peer = VersionBitmap::new([0x05]);
        assert_eq!(local.highest_common(&peer), None);
    }
}
