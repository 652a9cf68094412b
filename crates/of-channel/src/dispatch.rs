//! Message dispatcher (spec.md §4.3).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{codes, OfpError, OfpErrorType};
use crate::handler::MessageHandler;
use crate::model::{Channel, Role};
use crate::pbuf::FramedMessage;
use crate::wire::OfpType;

/// Whether `message_type` is classified as master-only by spec.md §4.3's
/// role-check table ("state-modifying messages (flow-mod, group-mod,
/// port-mod, meter-mod, table-mod, packet-out, set-async, set-config) are
/// rejected for Slave.").
pub fn is_master_only(message_type: OfpType) -> bool {
    matches!(
        message_type,
        OfpType::FlowMod
            | OfpType::GroupMod
            | OfpType::PortMod
            | OfpType::MeterMod
            | OfpType::TableMod
            | OfpType::PacketOut
            | OfpType::SetAsync
            | OfpType::SetConfig
    )
}

/// `OFPMP_TABLE_FEATURES` multipart subtype, the one multipart request
/// spec.md §4.3 calls out as write-adjacent: "Multipart: write-adjacent
/// types (TableFeatures request with a body) are Slave-restricted; pure
/// reads are not."
pub const OFPMP_TABLE_FEATURES: u16 = 12;

/// Whether a multipart request of subtype `mp_type` with a nonempty `body`
/// should be treated as a write for role-check purposes.
pub fn is_multipart_write(mp_type: u16, body_is_empty: bool) -> bool {
    mp_type == OFPMP_TABLE_FEATURES && !body_is_empty
}

/// Whether an `OFPT_ERROR` body's embedded `(type, code)` is one of the two
/// reasons spec.md §4.3 exempts from the version check ("Hello and Error
/// with HELLO_FAILED/INCOMPATIBLE or BAD_VERSION"): any `HELLO_FAILED`
/// reply, or a `BAD_REQUEST`/`OFPBRC_BAD_VERSION` reply specifically. Other
/// error types (e.g. `FLOW_MOD_FAILED`) from a version-mismatched peer still
/// fail the version check.
fn is_version_exempt_error(payload: &[u8]) -> bool {
    if payload.len() < 4 {
        return false;
    }
    let raw_type = u16::from_be_bytes([payload[0], payload[1]]);
    let code = u16::from_be_bytes([payload[2], payload[3]]);
    raw_type == OfpErrorType::HelloFailed as u16
        || (raw_type == OfpErrorType::BadRequest as u16 && code == codes::BAD_VERSION.code)
}

/// Decoded multipart header fields the dispatcher needs before it can apply
/// the role check and hand the fragment to [`crate::multipart::MultipartTable`].
#[derive(Clone, Copy, Debug)]
pub struct MultipartHeader {
    pub mp_type: u16,
    pub more: bool,
}

impl MultipartHeader {
    const MORE_FLAG: u16 = 0x0001;

    /// Parses the 4-byte `ofp_multipart_request`/`ofp_multipart_reply`
    /// prefix (`type: u16`, `flags: u16`) that follows the common header.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 4 {
            return None;
        }
        let mp_type = u16::from_be_bytes([payload[0], payload[1]]);
        let flags = u16::from_be_bytes([payload[2], payload[3]]);
        Some(Self {
            mp_type,
            more: flags & Self::MORE_FLAG != 0,
        })
    }
}

/// Routes one framed message to a type-specific handler, enforcing version
/// and role per spec.md §4.3.
pub struct Dispatcher {
    handler: Arc<dyn MessageHandler>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    /// Validates and dispatches `message`, returning the [`OfpError`] the
    /// caller should serialize into an `OFPT_ERROR` reply on failure.
    ///
    /// This does not itself run the multipart-reassembly step (spec.md
    /// §4.2) — callers route `MultipartRequest`/`MultipartReply` fragments
    /// through [`crate::multipart::MultipartTable`] first and only invoke
    /// `dispatch` once a complete payload is available, the same way the
    /// framing layer only yields one complete [`FramedMessage`] at a time.
    pub async fn dispatch(
        &self,
        channel: &Channel,
        message: &FramedMessage,
    ) -> Result<(), OfpError> {
        let header = message.header();

        let message_type = header.message_type().ok_or(OfpError::BadType {
            raw_type: header.raw_type,
        })?;

        if header.length as usize != message.as_bytes().len() {
            return Err(OfpError::BadLen {
                declared: header.length,
                actual: message.as_bytes().len(),
            });
        }

        let negotiated = channel.version();
        let is_version_exempt = match message_type {
            OfpType::Hello => true,
            OfpType::Error => is_version_exempt_error(message.payload()),
            _ => false,
        };
        if !is_version_exempt && negotiated != 0 && header.version != negotiated {
            return Err(OfpError::BadVersion {
                expected: negotiated,
                got: header.version,
            });
        }

        let role_restricted = if message_type.is_multipart() {
            MultipartHeader::parse(message.payload())
                .map(|mp| is_multipart_write(mp.mp_type, message.payload().len() <= 4))
                .unwrap_or(false)
        } else {
            is_master_only(message_type)
        };

        if role_restricted && channel.role() == Role::Slave {
            warn!(
                channel_id = %channel.channel_id,
                ?message_type,
                "rejecting master-only message from Slave channel"
            );
            return Err(OfpError::IsSlave { message_type });
        }

        debug!(channel_id = %channel.channel_id, ?message_type, xid = %header.xid, "dispatching message");
        self.handler
            .handle(channel, message_type, message)
            .await
            .map_err(|e| OfpError::Internal {
                detail: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NullHandler;
    use crate::test_support::fixture_channel;
    use crate::wire::{Header, HEADER_LEN, OFP_VERSION_1_3};
    use std::sync::Arc;

    fn framed(version: u8, message_type: OfpType, xid: u32, payload: &[u8]) -> FramedMessage {
        let mut bytes = Vec::new();
        let header = Header {
            version,
            raw_type: message_type.as_u8(),
            length: (HEADER_LEN + payload.len()) as u16,
            xid,
        };
        bytes.extend_from_slice(&header.encode());
        bytes.extend_from_slice(payload);
        FramedMessage::from_bytes_for_test(bytes.into())
    }

    #[tokio::test]
    async fn unknown_type_is_bad_type() {
        let chan = fixture_channel();
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let mut bytes = vec![OFP_VERSION_1_3, 250, 0, 8, 0, 0, 0, 1];
        bytes.resize(8, 0);
        let msg = FramedMessage::from_bytes_for_test(bytes.into());
        let err = dispatcher.dispatch(&chan, &msg).await.unwrap_err();
        assert!(matches!(err, OfpError::BadType { raw_type: 250 }));
    }

    #[tokio::test]
    async fn length_mismatch_is_bad_len() {
        let chan = fixture_channel();
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let header = Header {
            version: OFP_VERSION_1_3,
            raw_type: OfpType::Hello.as_u8(),
            length: 20, // lies about length relative to the actual 8-byte frame
            xid: 1,
        };
        let msg = FramedMessage::from_bytes_for_test(header.encode().to_vec().into());
        let err = dispatcher.dispatch(&chan, &msg).await.unwrap_err();
        assert!(matches!(err, OfpError::BadLen { .. }));
    }

    #[tokio::test]
    async fn hello_passes_regardless_of_negotiated_version() {
        let chan = fixture_channel();
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let msg = framed(0x01, OfpType::Hello, 1, &[]);
        assert!(dispatcher.dispatch(&chan, &msg).await.is_ok());
    }

    #[tokio::test]
    async fn version_mismatch_after_negotiation_is_bad_version() {
        let chan = fixture_channel();
        chan.with_state(|g| g.version = OFP_VERSION_1_3);
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let msg = framed(0x01, OfpType::FeaturesRequest, 1, &[]);
        let err = dispatcher.dispatch(&chan, &msg).await.unwrap_err();
        assert!(matches!(err, OfpError::BadVersion { .. }));
    }

    #[tokio::test]
    async fn slave_role_rejects_flow_mod() {
        let chan = fixture_channel();
        chan.with_state(|g| {
            g.version = OFP_VERSION_1_3;
            g.role = Role::Slave;
        });
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let msg = framed(OFP_VERSION_1_3, OfpType::FlowMod, 1, &[]);
        let err = dispatcher.dispatch(&chan, &msg).await.unwrap_err();
        assert!(matches!(err, OfpError::IsSlave { .. }));
    }

    #[tokio::test]
    async fn bad_version_error_reply_is_exempt_from_version_check() {
        let chan = fixture_channel();
        chan.with_state(|g| g.version = OFP_VERSION_1_3);
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let mut body = Vec::new();
        body.extend_from_slice(&(OfpErrorType::BadRequest as u16).to_be_bytes());
        body.extend_from_slice(&codes::BAD_VERSION.code.to_be_bytes());
        let msg = framed(0x01, OfpType::Error, 1, &body);
        assert!(dispatcher.dispatch(&chan, &msg).await.is_ok());
    }

    #[tokio::test]
    async fn non_exempt_error_reply_still_fails_version_check() {
        let chan = fixture_channel();
        chan.with_state(|g| g.version = OFP_VERSION_1_3);
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let mut body = Vec::new();
        body.extend_from_slice(&(OfpErrorType::FlowModFailed as u16).to_be_bytes());
        body.extend_from_slice(&codes::FLOW_MOD_BAD_FLAGS.code.to_be_bytes());
        let msg = framed(0x01, OfpType::Error, 1, &body);
        let err = dispatcher.dispatch(&chan, &msg).await.unwrap_err();
        assert!(matches!(err, OfpError::BadVersion { .. }));
    }

    #[tokio::test]
    async fn slave_role_allows_echo_request() {
        let chan = fixture_channel();
        chan.with_state(|g| {
            g.version = OFP_VERSION_1_3;
            g.role = Role::Slave;
        });
        let dispatcher = Dispatcher::new(Arc::new(NullHandler));
        let msg = framed(OFP_VERSION_1_3, OfpType::EchoRequest, 1, &[]);
        assert!(dispatcher.dispatch(&chan, &msg).await.is_ok());
    }
}
