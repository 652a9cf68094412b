//! Per-controller OpenFlow channel: wire framing, multipart reassembly, the
//! connection finite-state machine, message dispatch, and the channel
//! manager that owns every channel in the process.

pub mod dispatch;
pub mod error;
pub mod fsm;
pub mod handler;
pub mod manager;
pub mod model;
pub mod multipart;
pub mod pbuf;
pub mod runner;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatch::Dispatcher;
pub use error::{OfpError, OfpErrorCode, OfpErrorType};
pub use fsm::{Action, ChannelEvent, ChannelState, RetryBackoff};
pub use handler::MessageHandler;
pub use manager::ChannelManager;
pub use model::{AsyncConfig, Channel, ChannelGuarded, Role};
pub use multipart::MultipartTable;
pub use pbuf::{FramedMessage, PBuf};
pub use runner::{negotiate_version, ChannelRunner, ECHO_INTERVAL};
pub use wire::{Header, OfpType, VersionBitmap, HEADER_LEN, OFP_VERSION_1_3};
