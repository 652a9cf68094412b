//! # of-core
//!
//! Shared foundation for the OpenFlow switch core: the stable error type,
//! small newtype identifiers, a tracing-based observability facade, and the
//! timer/scheduler primitive used by the channel FSM and the updater.
//!
//! Nothing in this crate is OpenFlow-specific; `of-channel` and
//! `of-forwarding` build on top of it the same way `spark-switch` builds on
//! `spark-core` in the teacher workspace this one is modeled on.

pub mod error;
pub mod ids;
pub mod observability;
pub mod scheduler;

pub use error::CoreError;
pub use ids::{ChannelId, DatapathId, Xid};
pub use observability::init_logging;

/// Convenience alias used throughout the workspace for fallible operations
/// whose error does not need a more specific domain type.
pub type Result<T> = core::result::Result<T, CoreError>;
