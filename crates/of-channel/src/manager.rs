//! Channel manager (spec.md §4.4): `dpid → list<Channel>`,
//! `(dpid, channel_id) → Channel`, and the per-dpid generation-id store.
//!
//! spec.md §5 is explicit that "The channel-manager lock protects the dpid
//! index and generation-id store," so this is a single `std::sync::Mutex`
//! over one inner struct rather than a lock-free map — the manager's own
//! operations are register/lookup/iterate, none of which sit on any hot
//! per-packet path (that's the MAC table and RIB, which really do need to
//! be lock-free per spec.md §5's "MAC-table and RIB reads require no
//! lock").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use of_core::{ChannelId, ChannelIdAllocator, DatapathId};

use crate::error::OfpError;
use crate::fsm::ChannelState;
use crate::model::{Channel, Role};

/// spec.md §3 "Generation-id store": "Per-bridge `(defined: bool, value:
/// u64)`; guards master-election requests."
#[derive(Clone, Copy, Debug, Default)]
struct GenerationId {
    defined: bool,
    value: u64,
}

struct ManagerInner {
    by_key: HashMap<(DatapathId, ChannelId), Arc<Channel>>,
    by_dpid: HashMap<DatapathId, Vec<ChannelId>>,
    generation: HashMap<DatapathId, GenerationId>,
}

/// Owns every [`Channel`] in the process, indexed both by `(dpid,
/// channel_id)` and by `dpid` alone.
pub struct ChannelManager {
    id_alloc: ChannelIdAllocator,
    inner: Mutex<ManagerInner>,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            id_alloc: ChannelIdAllocator::new(),
            inner: Mutex::new(ManagerInner {
                by_key: HashMap::new(),
                by_dpid: HashMap::new(),
                generation: HashMap::new(),
            }),
        }
    }

    /// Allocates the next process-unique channel id. Exposed separately from
    /// [`register`](Self::register) because callers construct the
    /// [`Channel`] (which needs its id up front) before the manager has
    /// anywhere to put it.
    pub fn allocate_channel_id(&self) -> ChannelId {
        self.id_alloc.allocate()
    }

    /// Inserts into both mappings atomically under the manager lock (spec.md
    /// §4.4: "inserts into both mappings atomically under a manager lock.").
    pub fn register(&self, channel: Arc<Channel>) -> Result<(), OfpError> {
        let key = (channel.datapath_id, channel.channel_id);
        let mut inner = self.inner.lock().unwrap();
        if inner.by_key.contains_key(&key) {
            return Err(OfpError::Internal {
                detail: format!("channel already registered for {key:?}"),
            });
        }
        inner
            .by_dpid
            .entry(channel.datapath_id)
            .or_default()
            .push(channel.channel_id);
        inner.by_key.insert(key, channel);
        Ok(())
    }

    /// Removes a channel from both mappings; does not wait for its
    /// reference count to drop (callers must confirm `ref_count() == 0`
    /// themselves per spec.md §3's destruction invariant before actually
    /// dropping the `Arc`'s last strong reference).
    pub fn unregister(&self, dpid: DatapathId, channel_id: ChannelId) -> Option<Arc<Channel>> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.by_key.remove(&(dpid, channel_id));
        if removed.is_some() {
            if let Some(list) = inner.by_dpid.get_mut(&dpid) {
                list.retain(|&id| id != channel_id);
            }
        }
        removed
    }

    /// Looks up a channel, incrementing its reference count on success
    /// (spec.md §4.4: "`lookup(dpid, channel_id) -> Option<Channel>` —
    /// increments the channel's refcount on success.").
    pub fn lookup(&self, dpid: DatapathId, channel_id: ChannelId) -> Option<Arc<Channel>> {
        let inner = self.inner.lock().unwrap();
        let channel = inner.by_key.get(&(dpid, channel_id))?.clone();
        channel.increment_ref();
        Some(channel)
    }

    /// Counts channels whose FSM is in `Established` or `HelloSent` and
    /// whose session is live (spec.md §4.4).
    pub fn alive_count(&self, dpid: DatapathId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .by_dpid
            .get(&dpid)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.by_key.get(&(dpid, *id)))
            .filter(|c| {
                matches!(c.state(), ChannelState::Established | ChannelState::HelloSent) && c.is_live()
            })
            .count()
    }

    /// Applies `f` to every channel for `dpid` under the manager lock
    /// (spec.md §4.4: "callback applied to each channel under the manager
    /// lock.").
    pub fn iterate(&self, dpid: DatapathId, mut f: impl FnMut(&Arc<Channel>)) {
        let inner = self.inner.lock().unwrap();
        if let Some(ids) = inner.by_dpid.get(&dpid) {
            for id in ids {
                if let Some(channel) = inner.by_key.get(&(dpid, *id)) {
                    f(channel);
                }
            }
        }
    }

    /// Validates a role-request's `generation_id` against the stored value
    /// (spec.md §4.4): a `Master`/`Slave` request with
    /// `generation_id < stored value` is stale; `Equal` requests never
    /// consult the store; a successful `Master` request replaces the stored
    /// value, but a `Slave` request only ever checks it — writing the store
    /// on a Slave request would let a Slave's non-stale generation_id bump
    /// the stored value past a still-valid intermediate Master generation_id.
    pub fn check_and_apply_generation_id(
        &self,
        dpid: DatapathId,
        role: Role,
        generation_id: u64,
    ) -> Result<(), OfpError> {
        if role == Role::Equal {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.generation.entry(dpid).or_default();
        if entry.defined && generation_id < entry.value {
            return Err(OfpError::RoleStale {
                stored: entry.value,
                got: generation_id,
            });
        }
        if role == Role::Master {
            entry.defined = true;
            entry.value = generation_id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_channel_with_ids;

    #[test]
    fn register_then_lookup_increments_ref_count() {
        let manager = ChannelManager::new();
        let dpid = DatapathId::new(1);
        let id = manager.allocate_channel_id();
        let chan = Arc::new(fixture_channel_with_ids(id, dpid));
        manager.register(chan.clone()).unwrap();

        let looked_up = manager.lookup(dpid, id).unwrap();
        assert_eq!(looked_up.ref_count(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let manager = ChannelManager::new();
        let dpid = DatapathId::new(1);
        let id = manager.allocate_channel_id();
        let chan = Arc::new(fixture_channel_with_ids(id, dpid));
        manager.register(chan.clone()).unwrap();
        let err = manager.register(chan).unwrap_err();
        assert!(matches!(err, OfpError::Internal { .. }));
    }

    #[test]
    fn alive_count_only_counts_established_and_hellosent_live_channels() {
        let manager = ChannelManager::new();
        let dpid = DatapathId::new(2);
        let id1 = manager.allocate_channel_id();
        let chan1 = Arc::new(fixture_channel_with_ids(id1, dpid));
        chan1.with_state(|g| g.state = ChannelState::Established);
        manager.register(chan1).unwrap();

        let id2 = manager.allocate_channel_id();
        let chan2 = Arc::new(fixture_channel_with_ids(id2, dpid));
        // left in Idle
        manager.register(chan2).unwrap();

        assert_eq!(manager.alive_count(dpid), 1);
    }

    #[test]
    fn generation_id_monotonicity() {
        let manager = ChannelManager::new();
        let dpid = DatapathId::new(3);
        manager
            .check_and_apply_generation_id(dpid, Role::Master, 10)
            .unwrap();
        let err = manager
            .check_and_apply_generation_id(dpid, Role::Master, 5)
            .unwrap_err();
        assert!(matches!(err, OfpError::RoleStale { stored: 10, got: 5 }));
        manager
            .check_and_apply_generation_id(dpid, Role::Master, 11)
            .unwrap();
    }

    #[test]
    fn equal_role_request_never_consults_generation_store() {
        let manager = ChannelManager::new();
        let dpid = DatapathId::new(4);
        manager
            .check_and_apply_generation_id(dpid, Role::Master, 100)
            .unwrap();
        // An "Equal" role request with a lower id must not error, because
        // Equal requests never consult the store.
        manager
            .check_and_apply_generation_id(dpid, Role::Equal, 1)
            .unwrap();
    }

    #[test]
    fn slave_request_checks_but_never_writes_the_store() {
        let manager = ChannelManager::new();
        let dpid = DatapathId::new(5);
        manager
            .check_and_apply_generation_id(dpid, Role::Master, 10)
            .unwrap();
        // A Slave request with a non-stale id must not bump the stored
        // value: a later Master request using an intermediate id must
        // still succeed.
        manager
            .check_and_apply_generation_id(dpid, Role::Slave, 20)
            .unwrap();
        manager
            .check_and_apply_generation_id(dpid, Role::Master, 15)
            .unwrap();
    }
}
