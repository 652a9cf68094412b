//! The bridge container (spec.md GLOSSARY "Bridge"): owns the flow/group/
//! meter tables (external collaborators, stubbed here), the MAC table and
//! RIB, the port map, fail mode, and OpenFlow capabilities. Lifetime spans
//! process start to shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use of_core::DatapathId;
use of_forwarding::{MacTable, MacTableConfig, Rib, RibConfig};
use tracing::info;

use crate::failmode::{operational_mode, FailMode, OperationalMode};

/// Out-of-scope external collaborator (spec.md §1: "the flow database,
/// group/meter tables... are treated as external collaborators"). Kept as a
/// zero-sized marker so `Bridge` has somewhere to put the slot its owner
/// expects, without pulling a flow-table implementation into this crate.
#[derive(Debug, Default)]
pub struct FlowDb;

#[derive(Debug, Default)]
pub struct GroupTable;

#[derive(Debug, Default)]
pub struct MeterTable;

#[derive(Clone, Debug)]
pub struct PortInfo {
    pub name: String,
    pub hw_addr: [u8; 6],
    pub up: bool,
}

/// `ofp_capabilities` bitmask this bridge advertises in `OFPT_FEATURES_REPLY`.
pub mod capabilities {
    pub const FLOW_STATS: u32 = 1 << 0;
    pub const TABLE_STATS: u32 = 1 << 1;
    pub const PORT_STATS: u32 = 1 << 2;
    pub const GROUP_STATS: u32 = 1 << 3;
}

pub struct Bridge {
    pub dpid: DatapathId,
    pub mac_table: Arc<MacTable>,
    pub rib: Arc<Rib>,
    pub flowdb: FlowDb,
    pub group_table: GroupTable,
    pub meter_table: MeterTable,
    ports: Mutex<HashMap<u32, PortInfo>>,
    fail_mode: Mutex<FailMode>,
    capabilities: AtomicU32,
}

impl Bridge {
    pub fn new(dpid: DatapathId, mac_table_config: MacTableConfig, rib_config: RibConfig, fail_mode: FailMode) -> Self {
        Self {
            dpid,
            mac_table: Arc::new(MacTable::new(mac_table_config)),
            rib: Arc::new(Rib::new(rib_config)),
            flowdb: FlowDb,
            group_table: GroupTable,
            meter_table: MeterTable,
            ports: Mutex::new(HashMap::new()),
            fail_mode: Mutex::new(fail_mode),
            capabilities: AtomicU32::new(
                capabilities::FLOW_STATS | capabilities::TABLE_STATS | capabilities::PORT_STATS,
            ),
        }
    }

    pub fn add_port(&self, port_no: u32, info: PortInfo) {
        self.ports.lock().unwrap().insert(port_no, info);
    }

    pub fn remove_port(&self, port_no: u32) -> Option<PortInfo> {
        self.ports.lock().unwrap().remove(&port_no)
    }

    pub fn port(&self, port_no: u32) -> Option<PortInfo> {
        self.ports.lock().unwrap().get(&port_no).cloned()
    }

    pub fn capabilities(&self) -> u32 {
        self.capabilities.load(Ordering::Acquire)
    }

    pub fn fail_mode(&self) -> FailMode {
        *self.fail_mode.lock().unwrap()
    }

    pub fn set_fail_mode(&self, mode: FailMode) {
        *self.fail_mode.lock().unwrap() = mode;
    }

    /// Re-evaluates operational mode given the channel manager's current
    /// `alive_count` for this dpid (spec.md §4.1: "When the last live
    /// channel for a dpid disappears, the bridge transitions to Secure or
    /// Standalone per its configured fail mode.").
    pub fn on_alive_count_changed(&self, alive_count: usize) -> OperationalMode {
        let configured = self.fail_mode();
        let mode = operational_mode(alive_count, configured);
        if let OperationalMode::Failed(fm) = mode {
            info!(dpid = %self.dpid, fail_mode = ?fm, "bridge lost its last controller channel");
        }
        mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bridge_has_no_ports_and_configured_fail_mode() {
        let bridge = Bridge::new(
            DatapathId::new(1),
            MacTableConfig::default(),
            RibConfig::default(),
            FailMode::Standalone,
        );
        assert_eq!(bridge.fail_mode(), FailMode::Standalone);
        assert!(bridge.port(1).is_none());
    }

    #[test]
    fn alive_count_zero_triggers_configured_fail_mode() {
        let bridge = Bridge::new(
            DatapathId::new(2),
            MacTableConfig::default(),
            RibConfig::default(),
            FailMode::Secure,
        );
        let mode = bridge.on_alive_count_changed(0);
        assert_eq!(mode, OperationalMode::Failed(FailMode::Secure));
    }

    #[test]
    fn add_and_remove_port_round_trips() {
        let bridge = Bridge::new(
            DatapathId::new(3),
            MacTableConfig::default(),
            RibConfig::default(),
            FailMode::Secure,
        );
        bridge.add_port(
            1,
            PortInfo {
                name: "eth0".to_string(),
                hw_addr: [1, 2, 3, 4, 5, 6],
                up: true,
            },
        );
        assert!(bridge.port(1).is_some());
        let removed = bridge.remove_port(1);
        assert!(removed.is_some());
        assert!(bridge.port(1).is_none());
    }
}
