//! Channel/dispatcher error domain (spec.md §7). Modeled on
//! `spark-switch::error::SwitchError`: a `thiserror`-derived enum with
//! `with_*` contextual builders and a `From` conversion into the
//! workspace-wide [`of_core::CoreError`].

use of_core::CoreError;
use thiserror::Error;

use crate::wire::OfpType;

/// `ofp_error_type` values this core can emit (spec.md §7's representative
/// codes, grouped by the `ofp_error_type` they belong to).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OfpErrorType {
    HelloFailed = 0,
    BadRequest = 1,
    FlowModFailed = 5,
    GroupModFailed = 6,
    RoleRequestFailed = 11,
    TableFeaturesFailed = 13,
}

/// A single `(type, code)` pair as carried on the wire in an `OFPT_ERROR`
/// message body.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OfpErrorCode {
    pub error_type: OfpErrorType,
    pub code: u16,
}

pub mod codes {
    use super::{OfpErrorCode, OfpErrorType};

    pub const BAD_VERSION: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::BadRequest,
        code: 1, // OFPBRC_BAD_VERSION
    };
    pub const BAD_TYPE: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::BadRequest,
        code: 2, // OFPBRC_BAD_TYPE
    };
    pub const BAD_LEN: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::BadRequest,
        code: 6, // OFPBRC_BAD_LEN
    };
    pub const IS_SLAVE: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::BadRequest,
        code: 13, // OFPBRC_IS_SLAVE
    };
    pub const MULTIPART_BUFFER_OVERFLOW: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::BadRequest,
        code: 14, // OFPBRC_MULTIPART_BUFFER_OVERFLOW
    };
    pub const BAD_MULTIPART: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::BadRequest,
        code: 15, // chosen locally: no stable OFPBRC_* code names a
                   // type-mismatch within one multipart accumulator; spec.md
                   // §4.2 only names the resulting error `BAD_MULTIPART`.
    };
    pub const HELLO_INCOMPATIBLE: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::HelloFailed,
        code: 0, // OFPHFC_INCOMPATIBLE
    };
    pub const ROLE_STALE: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::RoleRequestFailed,
        code: 2, // OFPRRFC_STALE
    };
    pub const FLOW_MOD_BAD_FLAGS: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::FlowModFailed,
        code: 7, // OFPFMFC_BAD_FLAGS
    };
    pub const GROUP_MOD_BAD_TYPE: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::GroupModFailed,
        code: 0, // OFPGMFC_BAD_TYPE
    };
    pub const TABLE_FEATURES_BAD_LEN: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::TableFeaturesFailed,
        code: 0, // OFPTFFC_BAD_LEN
    };
    /// Not a wire-standard code: used for [`super::OfpError::Internal`],
    /// which has no OpenFlow-defined `(type, code)` because it represents a
    /// local invariant violation rather than a protocol disagreement.
    pub const INTERNAL: OfpErrorCode = OfpErrorCode {
        error_type: OfpErrorType::BadRequest,
        code: 0xffff,
    };
}

/// Errors surfaced by the framing, multipart, and dispatch layers.
///
/// Every variant here maps to a wire `ofp_error` reply per spec.md §7
/// ("Protocol errors map to OpenFlow `ofp_error` `(type, code)` and are sent
/// to the peer before logging") via [`OfpError::wire_code`]; some also carry
/// enough context for [`OfpError::disables_channel`] to decide whether the
/// channel FSM should transition to `Disable` (spec.md §7's propagation
/// policy: "errors that imply mis-framed or mis-versioned bytes on the
/// stream... transition to `Disable`").
#[derive(Debug, Error)]
pub enum OfpError {
    #[error("message version {got:#x} does not match negotiated version {expected:#x}")]
    BadVersion { expected: u8, got: u8 },

    #[error("declared length {declared} does not match buffered length {actual}")]
    BadLen { declared: u16, actual: usize },

    #[error("unknown message type {raw_type}")]
    BadType { raw_type: u8 },

    #[error("message type {message_type:?} is master-only but channel role is Slave")]
    IsSlave { message_type: OfpType },

    #[error("no common OpenFlow version between local and peer bitmaps")]
    HelloIncompatible,

    #[error("multipart accumulator slots exhausted for this channel")]
    MultipartBufferOverflow,

    #[error("multipart fragment type disagrees with the open accumulator for this xid")]
    BadMultipart,

    #[error("role request generation_id {got} is stale (stored {stored})")]
    RoleStale { stored: u64, got: u64 },

    #[error("internal channel failure: {detail}")]
    Internal { detail: String },
}

impl OfpError {
    /// The `(type, code)` pair to serialize into an `OFPT_ERROR` body.
    pub fn wire_code(&self) -> OfpErrorCode {
        match self {
            OfpError::BadVersion { .. } => codes::BAD_VERSION,
            OfpError::BadLen { .. } => codes::BAD_LEN,
            OfpError::BadType { .. } => codes::BAD_TYPE,
            OfpError::IsSlave { .. } => codes::IS_SLAVE,
            OfpError::HelloIncompatible => codes::HELLO_INCOMPATIBLE,
            OfpError::MultipartBufferOverflow => codes::MULTIPART_BUFFER_OVERFLOW,
            OfpError::BadMultipart => codes::BAD_MULTIPART,
            OfpError::RoleStale { .. } => codes::ROLE_STALE,
            OfpError::Internal { .. } => codes::INTERNAL,
        }
    }

    /// Whether this error, per spec.md §7's propagation policy, implies the
    /// byte stream itself is no longer trustworthy and the channel must move
    /// to `Disable` rather than merely reply with an error and continue.
    pub fn disables_channel(&self) -> bool {
        matches!(
            self,
            OfpError::BadVersion { .. } | OfpError::BadLen { .. } | OfpError::HelloIncompatible
        )
    }
}

impl From<OfpError> for CoreError {
    fn from(value: OfpError) -> Self {
        let code = value.wire_code();
        CoreError::new(
            match code.error_type {
                OfpErrorType::HelloFailed => "channel.hello_failed",
                OfpErrorType::BadRequest => "channel.bad_request",
                OfpErrorType::FlowModFailed => "channel.flow_mod_failed",
                OfpErrorType::GroupModFailed => "channel.group_mod_failed",
                OfpErrorType::RoleRequestFailed => "channel.role_request_failed",
                OfpErrorType::TableFeaturesFailed => "channel.table_features_failed",
            },
            value.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_version_disables_channel() {
        let err = OfpError::BadVersion {
            expected: 0x04,
            got: 0x01,
        };
        assert!(err.disables_channel());
        assert_eq!(err.wire_code(), codes::BAD_VERSION);
    }

    #[test]
    fn is_slave_does_not_disable_channel() {
        let err = OfpError::IsSlave {
            message_type: OfpType::FlowMod,
        };
        assert!(!err.disables_channel());
    }
}
