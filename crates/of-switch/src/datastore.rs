//! Datastore management API (spec.md §6: "Datastore API surface: bridge
//! create/destroy, MAC-table config get/set and single-entry
//! add/delete/clear/iterate, and RIB route-rule iteration, all routed
//! through the updater... so that no caller needs to hold the table's
//! internal locks.").
//!
//! Modeled on lagopus's CLI/datastore glue (`mactable.c`'s
//! `mactable_entry_update`/`mactable_entry_delete`/`mactable_clear`
//! functions, and the `macentry_args`/`copy_macentry` bulk-copy pattern for
//! iteration) but kept out of the updater's own crate: `of-forwarding`
//! exposes the per-table primitives, this module is the one place that owns
//! the bridge registry and the per-bridge worker handle a datastore caller
//! writes through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use of_core::DatapathId;
use of_forwarding::{LocalWorkerData, MacEntry, MacTableConfig, RibConfig, RouteEntry};
use tracing::info;

use crate::bridge::Bridge;
use crate::failmode::FailMode;

/// Owns every live [`Bridge`] in the process and the datastore-write handles
/// into each bridge's MAC table. A single `Datastore` is meant to back
/// whatever CLI/management-plane surface embeds this workspace (out of scope
/// per spec.md §1, "management-plane configuration UI").
pub struct Datastore {
    bridges: Mutex<HashMap<DatapathId, Entry>>,
}

struct Entry {
    bridge: Arc<Bridge>,
    mac_writer: Mutex<LocalWorkerData>,
}

impl Default for Datastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore {
    pub fn new() -> Self {
        Self {
            bridges: Mutex::new(HashMap::new()),
        }
    }

    /// Creates and registers a new bridge, returning the handle callers use
    /// for port/fail-mode operations ([`Bridge`] itself) while this
    /// datastore keeps the write handle into its MAC table.
    pub fn create_bridge(
        &self,
        dpid: DatapathId,
        mac_table_config: MacTableConfig,
        rib_config: RibConfig,
        fail_mode: FailMode,
    ) -> Arc<Bridge> {
        let bridge = Arc::new(Bridge::new(dpid, mac_table_config, rib_config, fail_mode));
        let mac_writer = bridge.mac_table.register_worker(of_forwarding::PipelineConfig::default().queue_capacity);
        let mut bridges = self.bridges.lock().unwrap();
        bridges.insert(
            dpid,
            Entry {
                bridge: bridge.clone(),
                mac_writer: Mutex::new(mac_writer),
            },
        );
        info!(%dpid, "bridge created");
        bridge
    }

    /// Destroys a bridge, returning it if it existed. The bridge's tables
    /// are dropped with it; nothing persists past process lifetime (spec.md
    /// §6: "Persisted state: none").
    pub fn destroy_bridge(&self, dpid: DatapathId) -> Option<Arc<Bridge>> {
        let removed = self.bridges.lock().unwrap().remove(&dpid);
        if removed.is_some() {
            info!(%dpid, "bridge destroyed");
        }
        removed.map(|entry| entry.bridge)
    }

    pub fn bridge(&self, dpid: DatapathId) -> Option<Arc<Bridge>> {
        self.bridges.lock().unwrap().get(&dpid).map(|e| e.bridge.clone())
    }

    /// MAC-table config get.
    pub fn mac_table_config(&self, dpid: DatapathId) -> Option<MacTableConfig> {
        self.bridge(dpid).map(|b| b.mac_table.config())
    }

    /// MAC-table config set. Takes effect from the next updater cycle.
    pub fn set_mac_table_config(&self, dpid: DatapathId, config: MacTableConfig) -> bool {
        match self.bridge(dpid) {
            Some(bridge) => {
                bridge.mac_table.set_config(config);
                true
            }
            None => false,
        }
    }

    /// Adds (or overwrites) one static MAC entry. Routed through the
    /// updater via `MacTable::datastore_update` rather than mutating either
    /// double-buffered side directly (spec.md §6).
    pub fn add_mac_entry(&self, dpid: DatapathId, mac: u64, port: u32) -> bool {
        let bridges = self.bridges.lock().unwrap();
        match bridges.get(&dpid) {
            Some(entry) => {
                let mut writer = entry.mac_writer.lock().unwrap();
                entry.bridge.mac_table.datastore_update(&mut writer, mac, port);
                true
            }
            None => false,
        }
    }

    /// Deletes one MAC entry regardless of static/dynamic origin.
    pub fn delete_mac_entry(&self, dpid: DatapathId, mac: u64) -> bool {
        let bridges = self.bridges.lock().unwrap();
        match bridges.get(&dpid) {
            Some(entry) => {
                let mut writer = entry.mac_writer.lock().unwrap();
                entry.bridge.mac_table.datastore_delete(&mut writer, mac);
                true
            }
            None => false,
        }
    }

    /// Clears every MAC entry on the next updater cycle.
    pub fn clear_mac_entries(&self, dpid: DatapathId) -> bool {
        match self.bridge(dpid) {
            Some(bridge) => {
                bridge.mac_table.request_clear();
                true
            }
            None => false,
        }
    }

    /// Bounded snapshot of every MAC entry currently visible on the bridge's
    /// read side.
    pub fn iterate_mac_entries(&self, dpid: DatapathId, limit: usize) -> Vec<MacEntry> {
        self.bridge(dpid)
            .map(|b| b.mac_table.for_each_entry(limit))
            .unwrap_or_default()
    }

    /// Bounded snapshot of every RIB route rule currently visible on the
    /// bridge's read side. Route mutation itself only happens through the
    /// `NotificationSource` the updater drains (spec.md §4.6) — there is no
    /// single-entry write path here because the RIB has no direct-write
    /// counterpart to `MacTable::datastore_update`.
    pub fn iterate_routes(&self, dpid: DatapathId, limit: usize) -> Vec<RouteEntry> {
        self.bridge(dpid)
            .map(|b| b.rib.for_each_route(limit))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use of_forwarding::RibConfig;

    fn dpid(n: u64) -> DatapathId {
        DatapathId::new(n)
    }

    #[test]
    fn create_then_destroy_bridge_round_trips() {
        let ds = Datastore::new();
        ds.create_bridge(dpid(1), MacTableConfig::default(), RibConfig::default(), FailMode::Secure);
        assert!(ds.bridge(dpid(1)).is_some());
        let destroyed = ds.destroy_bridge(dpid(1));
        assert!(destroyed.is_some());
        assert!(ds.bridge(dpid(1)).is_none());
    }

    #[test]
    fn mac_table_config_get_set_round_trips() {
        let ds = Datastore::new();
        ds.create_bridge(dpid(2), MacTableConfig::default(), RibConfig::default(), FailMode::Secure);
        let mut config = ds.mac_table_config(dpid(2)).unwrap();
        config.max_entries = 42;
        assert!(ds.set_mac_table_config(dpid(2), config));
        assert_eq!(ds.mac_table_config(dpid(2)).unwrap().max_entries, 42);
    }

    #[test]
    fn add_mac_entry_is_visible_after_updater_tick() {
        let ds = Datastore::new();
        let bridge = ds.create_bridge(dpid(3), MacTableConfig::default(), RibConfig::default(), FailMode::Secure);
        assert!(ds.add_mac_entry(dpid(3), 0x0102_0304_0506, 7));
        bridge.mac_table.update().unwrap();
        let entries = ds.iterate_mac_entries(dpid(3), 16);
        assert!(entries.iter().any(|e| e.addr == 0x0102_0304_0506 && e.port == 7));
    }

    #[test]
    fn delete_mac_entry_removes_it_after_updater_tick() {
        let ds = Datastore::new();
        let bridge = ds.create_bridge(dpid(4), MacTableConfig::default(), RibConfig::default(), FailMode::Secure);
        ds.add_mac_entry(dpid(4), 0xaa, 1);
        bridge.mac_table.update().unwrap();
        assert!(ds.delete_mac_entry(dpid(4), 0xaa));
        bridge.mac_table.update().unwrap();
        let entries = ds.iterate_mac_entries(dpid(4), 16);
        assert!(!entries.iter().any(|e| e.addr == 0xaa));
    }

    #[test]
    fn operations_on_unknown_bridge_report_failure() {
        let ds = Datastore::new();
        assert!(!ds.add_mac_entry(dpid(99), 1, 1));
        assert!(!ds.set_mac_table_config(dpid(99), MacTableConfig::default()));
        assert!(ds.iterate_routes(dpid(99), 16).is_empty());
    }
}
