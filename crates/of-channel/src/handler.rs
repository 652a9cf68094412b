//! The external-collaborator contract for type-specific message handlers
//! (spec.md §1: "The surrounding OpenFlow message handlers (`ofp_*_handler`)
//! ... are treated as external collaborators — their interfaces are
//! specified (§6) but their implementations are out of scope.").
//!
//! `of-channel::dispatch::Dispatcher` calls into a `MessageHandler` once it
//! has validated version, length, and role for a framed message. A real
//! deployment wires a handler that talks to the flow/group/meter tables;
//! this crate only ships [`NullHandler`], a test double that acknowledges
//! everything, so the dispatcher and its tests do not depend on those
//! out-of-scope subsystems.

use async_trait::async_trait;
use of_core::CoreError;

use crate::model::Channel;
use crate::pbuf::FramedMessage;
use crate::wire::OfpType;

/// Handles one already-validated framed message for a given message type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        channel: &Channel,
        message_type: OfpType,
        message: &FramedMessage,
    ) -> Result<(), CoreError>;
}

/// Test double: accepts every message without producing a reply. Useful for
/// exercising the dispatcher's version/length/role checks in isolation from
/// any real flow/group/meter table.
#[derive(Debug, Default)]
pub struct NullHandler;

#[async_trait]
impl MessageHandler for NullHandler {
    async fn handle(
        &self,
        _channel: &Channel,
        _message_type: OfpType,
        _message: &FramedMessage,
    ) -> Result<(), CoreError> {
        Ok(())
    }
}
