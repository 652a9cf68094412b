//! Hybrid L2/L3 forwarding core: a double-buffered MAC learning table, a
//! double-buffered RIB (route + ARP + FIB), the L2/L3 forwarding pipelines,
//! and the single updater thread that drives both tables' aging/merge
//! cycles.

pub mod config;
pub mod error;
pub mod mac;
pub mod netlink;
pub mod pipeline;
pub mod rib;
pub mod updater;

pub use config::{MacTableConfig, PipelineConfig, RibConfig};
pub use error::ForwardingError;
pub use mac::{AddressType, LocalWorkerData, MacEntry, MacLookup, MacTable};
pub use netlink::{FixedNotificationSource, NotificationEntry, NotificationSource};
pub use pipeline::{Frame, Pipeline, PipelineOutcome};
pub use rib::{rib_lookup, ArpEntry, FibEntry, L3Packet, Rib, RibLocalWorkerData, RibLookupOutcome, RouteEntry, Scope};
pub use updater::{BridgeTables, Updater};
