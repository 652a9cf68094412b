//! Bridge container, fail-mode policy, and the datastore management API
//! tying the channel core (`of-channel`) and forwarding core
//! (`of-forwarding`) together into one switch process.

pub mod bridge;
pub mod config;
pub mod datastore;
pub mod failmode;

pub use bridge::{Bridge, PortInfo};
pub use config::SwitchConfig;
pub use datastore::Datastore;
pub use failmode::{operational_mode, FailMode, OperationalMode};
