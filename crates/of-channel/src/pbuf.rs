//! Owning packet buffer with read/write cursors (spec.md §4.2: "Framing
//! reads exactly one OpenFlow header (8 bytes) to learn `length`; if fewer
//! bytes are buffered, no message is produced. Given enough bytes, the
//! producer yields a message view of exactly `length` bytes and advances
//! the cursor.").

use bytes::{Buf, BytesMut};

use crate::wire::{Header, HEADER_LEN};

/// An owning byte buffer with a read cursor, fed by repeated socket reads
/// and drained by [`PBuf::next_message`]. Named after the source's `PBuf`
/// (spec.md §2).
#[derive(Debug, Default)]
pub struct PBuf {
    buf: BytesMut,
}

/// One framed OpenFlow message, still including its 8-byte header. Owns its
/// storage (spec.md §4.2: "The yielded view owns its storage so that the
/// channel's inbound PBuf can be refreshed without copying.") by virtue of
/// being split out of the underlying `BytesMut` rather than copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedMessage {
    bytes: bytes::Bytes,
}

impl FramedMessage {
    pub fn header(&self) -> Header {
        Header::parse(&self.bytes).expect("FramedMessage always contains a full header")
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    pub fn into_bytes(self) -> bytes::Bytes {
        self.bytes
    }

    #[cfg(test)]
    pub(crate) fn from_bytes_for_test(bytes: bytes::Bytes) -> Self {
        Self { bytes }
    }
}

impl PBuf {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Appends newly read bytes to the buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// How many bytes are currently buffered but not yet framed into a
    /// message.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to frame one message from the front of the buffer.
    ///
    /// Returns `None` when fewer than `HEADER_LEN` bytes are buffered, or
    /// when the header is present but `length` bytes have not all arrived
    /// yet — in both cases the caller should read more bytes from the
    /// socket and retry, matching spec.md's "if fewer bytes are buffered, no
    /// message is produced."
    pub fn next_message(&mut self) -> Option<FramedMessage> {
        if self.buf.len() < HEADER_LEN {
            return None;
        }
        let header = Header::parse(&self.buf)?;
        let declared_len = header.length as usize;
        if declared_len < HEADER_LEN || self.buf.len() < declared_len {
            return None;
        }
        let frame = self.buf.split_to(declared_len).freeze();
        Some(FramedMessage { bytes: frame })
    }

    /// Drains every fully-buffered message at once, useful in tests and for
    /// batch dispatch after a single socket read.
    pub fn drain_messages(&mut self) -> Vec<FramedMessage> {
        let mut out = Vec::new();
        while let Some(msg) = self.next_message() {
            out.push(msg);
        }
        out
    }

    pub fn remaining(&self) -> &[u8] {
        self.buf.chunk()
    }
}
