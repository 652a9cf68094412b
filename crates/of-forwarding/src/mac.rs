//! Double-buffered MAC learning table (spec §4.5): learns source MAC → port
//! mappings from observed traffic and answers destination lookups with
//! at-most-one-hop reads on the fast path.
//!
//! Double buffering is realized with `arc_swap::ArcSwap` rather than a raw
//! pointer pair: each side is an immutable snapshot (`Arc<MacSide>`), workers
//! load a snapshot lock-free, and the updater builds a brand new `MacSide`
//! for the inactive slot before swapping it in. This gives the same
//! "writers to the inactive side need no lock, readers never block"
//! property the three-way `read_index`/`referred_side`/`referring` protocol
//! requires, using a crate already in the workspace's dependency stack.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::warn;

use crate::config::MacTableConfig;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressType {
    Static,
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct MacEntry {
    pub addr: u64,
    pub port: u32,
    pub address_type: AddressType,
    pub update_time: Instant,
}

/// One immutable snapshot of the table: the full entry map plus the
/// insertion-ordered list of dynamic entries used for aging.
#[derive(Clone, Debug, Default)]
struct MacSide {
    table: HashMap<u64, MacEntry>,
    dynamic_order: VecDeque<u64>,
}

enum WorkerRecord {
    Learn {
        addr: u64,
        port: u32,
        address_type: AddressType,
    },
    Touch {
        addr: u64,
    },
    Delete {
        addr: u64,
    },
}

/// Atomics a worker owns and the updater inspects without taking any lock.
#[derive(Default)]
struct WorkerShared {
    referred_side: AtomicUsize,
    referring: AtomicBool,
}

/// The fast-path state owned exclusively by one pipeline worker: an exact
/// local replica of recently observed entries, a small ring to dedupe queue
/// inserts, and the sending half of its queue to the updater.
pub struct LocalWorkerData {
    worker_id: usize,
    shared: Arc<WorkerShared>,
    cache: HashMap<u64, MacEntry>,
    ring: VecDeque<u64>,
    ring_capacity: usize,
    tx: SyncSender<WorkerRecord>,
}

impl LocalWorkerData {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MacLookup {
    Hit { port: u32, address_type: AddressType },
    Flood,
}

pub struct MacTable {
    sides: [arc_swap::ArcSwap<MacSide>; 2],
    read_index: AtomicUsize,
    workers: Mutex<Vec<Arc<WorkerShared>>>,
    queues: Mutex<Vec<Receiver<WorkerRecord>>>,
    clear_requested: AtomicBool,
    config: Mutex<MacTableConfig>,
}

const RING_CAPACITY: usize = 64;

impl MacTable {
    pub fn new(config: MacTableConfig) -> Self {
        Self {
            sides: [
                arc_swap::ArcSwap::from_pointee(MacSide::default()),
                arc_swap::ArcSwap::from_pointee(MacSide::default()),
            ],
            read_index: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
            queues: Mutex::new(Vec::new()),
            clear_requested: AtomicBool::new(false),
            config: Mutex::new(config),
        }
    }

    /// Current table sizing/ageing configuration (datastore "config get").
    pub fn config(&self) -> MacTableConfig {
        *self.config.lock().unwrap()
    }

    /// Replaces the table sizing/ageing configuration (datastore "config
    /// set"); takes effect from the next updater cycle onward.
    pub fn set_config(&self, config: MacTableConfig) {
        *self.config.lock().unwrap() = config;
    }

    /// Registers a new pipeline worker (or datastore-write caller) and
    /// returns the local state it owns exclusively from then on.
    pub fn register_worker(&self, queue_capacity: usize) -> LocalWorkerData {
        let shared = Arc::new(WorkerShared::default());
        let (tx, rx) = sync_channel(queue_capacity);
        let mut workers = self.workers.lock().unwrap();
        let mut queues = self.queues.lock().unwrap();
        let worker_id = workers.len();
        workers.push(shared.clone());
        queues.push(rx);
        LocalWorkerData {
            worker_id,
            shared,
            cache: HashMap::new(),
            ring: VecDeque::new(),
            ring_capacity: RING_CAPACITY,
            tx,
        }
    }

    fn reconcile(&self, local: &mut LocalWorkerData) {
        let current = self.read_index.load(Ordering::Acquire);
        if local.shared.referred_side.load(Ordering::Acquire) != current {
            local.cache.clear();
            local.ring.clear();
            local.shared.referred_side.store(current, Ordering::Release);
        }
    }

    /// spec §4.5 "Learning": observed source MAC `mac` on ingress port `port`.
    pub fn learn(&self, local: &mut LocalWorkerData, port: u32, mac: u64) {
        self.reconcile(local);
        if !local.cache.contains_key(&mac) {
            local.cache.insert(
                mac,
                MacEntry {
                    addr: mac,
                    port,
                    address_type: AddressType::Dynamic,
                    update_time: Instant::now(),
                },
            );
        }
        if !local.ring.contains(&mac) {
            self.enqueue(
                local,
                WorkerRecord::Learn {
                    addr: mac,
                    port,
                    address_type: AddressType::Dynamic,
                },
            );
            local.ring.push_back(mac);
            while local.ring.len() > local.ring_capacity {
                local.ring.pop_front();
            }
        }
    }

    /// spec §4.5 "Lookup": resolve the egress port for destination MAC `dst`.
    pub fn lookup(&self, local: &mut LocalWorkerData, dst: u64) -> MacLookup {
        local.shared.referring.store(true, Ordering::Release);
        self.reconcile(local);

        let result = if let Some(entry) = local.cache.get(&dst) {
            MacLookup::Hit {
                port: entry.port,
                address_type: entry.address_type,
            }
        } else {
            let read_idx = self.read_index.load(Ordering::Acquire);
            let snapshot = self.sides[read_idx].load();
            match snapshot.table.get(&dst) {
                Some(entry) => {
                    local.cache.insert(dst, entry.clone());
                    MacLookup::Hit {
                        port: entry.port,
                        address_type: entry.address_type,
                    }
                }
                None => MacLookup::Flood,
            }
        };

        if matches!(result, MacLookup::Hit { .. }) && !local.ring.contains(&dst) {
            self.enqueue(local, WorkerRecord::Touch { addr: dst });
            local.ring.push_back(dst);
            while local.ring.len() > local.ring_capacity {
                local.ring.pop_front();
            }
        }

        local.shared.referring.store(false, Ordering::Release);
        result
    }

    /// `mactable_entry_update` (spec §4.5 "Datastore writes"): enqueues a
    /// static record on the calling thread's local queue; the updater
    /// processes it identically to a worker-originated record but tags it
    /// `Static`.
    pub fn datastore_update(&self, local: &mut LocalWorkerData, mac: u64, port: u32) {
        self.enqueue(
            local,
            WorkerRecord::Learn {
                addr: mac,
                port,
                address_type: AddressType::Static,
            },
        );
    }

    /// `mactable_entry_delete`: removes a single entry regardless of whether
    /// it is static or dynamic.
    pub fn datastore_delete(&self, local: &mut LocalWorkerData, mac: u64) {
        self.enqueue(local, WorkerRecord::Delete { addr: mac });
    }

    /// `mactable_clear`: drops every entry on the next updater cycle. Takes
    /// effect atomically with that cycle's swap rather than mutating either
    /// side directly, so a lookup never observes a half-cleared table.
    pub fn request_clear(&self) {
        self.clear_requested.store(true, Ordering::Release);
    }

    fn enqueue(&self, local: &LocalWorkerData, record: WorkerRecord) {
        if let Err(TrySendError::Full(_)) = local.tx.try_send(record) {
            warn!(worker_id = local.worker_id, "mac table worker queue full, dropping record");
        }
    }

    /// spec §4.5 "Updater cycle". Returns `Err` (cycle aborted, re-armed
    /// unconditionally by the caller per §4.8) if any worker is mid-operation
    /// on the side about to be reclaimed.
    pub fn update(&self) -> Result<(), crate::error::ForwardingError> {
        let read_idx = self.read_index.load(Ordering::Acquire);
        let write_idx = read_idx ^ 1;

        {
            let workers = self.workers.lock().unwrap();
            for (worker_id, worker) in workers.iter().enumerate() {
                let stale = worker.referred_side.load(Ordering::Acquire) != read_idx;
                if stale && worker.referring.load(Ordering::Acquire) {
                    return Err(crate::error::ForwardingError::UpdaterCycleAborted { worker_id });
                }
            }
        }

        let config = self.config();
        let read_side = self.sides[read_idx].load();
        let mut write_side = MacSide::default();
        let cleared = self.clear_requested.swap(false, Ordering::AcqRel);

        if !cleared {
            let mut count = 0usize;
            for &addr in &read_side.dynamic_order {
                if count >= config.max_entries {
                    warn!(max_entries = config.max_entries, "mac table truncated while copying dynamic entries");
                    break;
                }
                if let Some(entry) = read_side.table.get(&addr) {
                    write_side.table.insert(addr, entry.clone());
                    write_side.dynamic_order.push_back(addr);
                    count += 1;
                }
            }
            for (&addr, entry) in read_side.table.iter() {
                if entry.address_type != AddressType::Static {
                    continue;
                }
                if count >= config.max_entries {
                    warn!(max_entries = config.max_entries, "mac table truncated while copying static entries");
                    break;
                }
                write_side.table.insert(addr, entry.clone());
                count += 1;
            }
        }

        let mut queues = self.queues.lock().unwrap();
        for rx in queues.iter_mut() {
            while let Ok(record) = rx.try_recv() {
                apply_record(&mut write_side, record);
            }
        }
        drop(queues);

        age_out(&mut write_side, config.ageing_time);

        self.sides[write_idx].store(Arc::new(write_side));
        self.read_index.store(write_idx, Ordering::Release);
        Ok(())
    }

    /// Bounded snapshot of every entry, for the datastore's `iterate_entries`
    /// API (modeled on lagopus `macentry_args`/`copy_macentry`).
    pub fn for_each_entry(&self, limit: usize) -> Vec<MacEntry> {
        let read_idx = self.read_index.load(Ordering::Acquire);
        let snapshot = self.sides[read_idx].load();
        snapshot.table.values().take(limit).cloned().collect()
    }
}

fn apply_record(side: &mut MacSide, record: WorkerRecord) {
    match record {
        WorkerRecord::Learn {
            addr,
            port,
            address_type,
        } => match side.table.get_mut(&addr) {
            Some(existing) if existing.address_type == AddressType::Static => {
                if address_type == AddressType::Static {
                    existing.port = port;
                    existing.update_time = Instant::now();
                }
                // A dynamic write never overwrites a static entry.
            }
            Some(existing) => {
                existing.port = port;
                existing.update_time = Instant::now();
                if address_type == AddressType::Static {
                    existing.address_type = AddressType::Static;
                    side.dynamic_order.retain(|&a| a != addr);
                } else {
                    side.dynamic_order.retain(|&a| a != addr);
                    side.dynamic_order.push_back(addr);
                }
            }
            None => {
                side.table.insert(
                    addr,
                    MacEntry {
                        addr,
                        port,
                        address_type,
                        update_time: Instant::now(),
                    },
                );
                if address_type == AddressType::Dynamic {
                    side.dynamic_order.push_back(addr);
                }
            }
        },
        WorkerRecord::Touch { addr } => {
            if let Some(entry) = side.table.get_mut(&addr) {
                if entry.address_type == AddressType::Dynamic {
                    entry.update_time = Instant::now();
                    side.dynamic_order.retain(|&a| a != addr);
                    side.dynamic_order.push_back(addr);
                }
            }
        }
        WorkerRecord::Delete { addr } => {
            side.table.remove(&addr);
            side.dynamic_order.retain(|&a| a != addr);
        }
    }
}

fn age_out(side: &mut MacSide, ageing_time: std::time::Duration) {
    let now = Instant::now();
    while let Some(&addr) = side.dynamic_order.front() {
        let expired = side
            .table
            .get(&addr)
            .map(|e| now.duration_since(e.update_time) > ageing_time)
            .unwrap_or(true);
        if !expired {
            break;
        }
        side.dynamic_order.pop_front();
        side.table.remove(&addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn table(ageing_time: Duration) -> MacTable {
        MacTable::new(MacTableConfig {
            max_entries: 1024,
            ageing_time,
        })
    }

    #[test]
    fn learn_then_update_makes_entry_visible_to_a_fresh_worker() {
        let table = table(Duration::from_secs(300));
        let mut writer = table.register_worker(16);
        table.learn(&mut writer, 1, 0xAABBCCDDEEFF);
        table.update().unwrap();

        let mut reader = table.register_worker(16);
        assert_eq!(
            table.lookup(&mut reader, 0xAABBCCDDEEFF),
            MacLookup::Hit {
                port: 1,
                address_type: AddressType::Dynamic
            }
        );
    }

    #[test]
    fn lookup_before_update_floods() {
        let table = table(Duration::from_secs(300));
        let mut worker = table.register_worker(16);
        table.learn(&mut worker, 1, 0x1111);
        // Not yet merged by the updater, and the learning worker's own
        // cache already has it locally so use a second, unreconciled worker.
        let mut other = table.register_worker(16);
        assert_eq!(table.lookup(&mut other, 0x1111), MacLookup::Flood);
    }

    #[test]
    fn datastore_write_is_not_overwritten_by_dynamic_learn() {
        let table = table(Duration::from_secs(300));
        let mut ds = table.register_worker(16);
        table.datastore_update(&mut ds, 0x2222, 5);
        table.update().unwrap();

        let mut worker = table.register_worker(16);
        table.learn(&mut worker, 9, 0x2222);
        table.update().unwrap();

        let mut reader = table.register_worker(16);
        assert_eq!(
            table.lookup(&mut reader, 0x2222),
            MacLookup::Hit {
                port: 5,
                address_type: AddressType::Static
            }
        );
    }

    #[test]
    fn ageing_removes_stale_dynamic_entries() {
        let table = table(Duration::from_millis(1));
        let mut worker = table.register_worker(16);
        table.learn(&mut worker, 1, 0x3333);
        table.update().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        table.update().unwrap();

        let mut reader = table.register_worker(16);
        assert_eq!(table.lookup(&mut reader, 0x3333), MacLookup::Flood);
    }

    #[test]
    fn truncates_at_max_entries_and_keeps_oldest_dynamic_order() {
        let table = MacTable::new(MacTableConfig {
            max_entries: 2,
            ageing_time: Duration::from_secs(300),
        });
        let mut worker = table.register_worker(16);
        for mac in [1u64, 2, 3] {
            table.learn(&mut worker, 1, mac);
        }
        table.update().unwrap();
        assert_eq!(table.for_each_entry(10).len(), 2);
    }

    #[test]
    fn datastore_delete_removes_static_and_dynamic_entries() {
        let table = table(Duration::from_secs(300));
        let mut ds = table.register_worker(16);
        table.datastore_update(&mut ds, 0x4444, 1);
        table.update().unwrap();

        table.datastore_delete(&mut ds, 0x4444);
        table.update().unwrap();

        let mut reader = table.register_worker(16);
        assert_eq!(table.lookup(&mut reader, 0x4444), MacLookup::Flood);
    }

    #[test]
    fn request_clear_empties_the_table_on_next_update() {
        let table = table(Duration::from_secs(300));
        let mut worker = table.register_worker(16);
        table.learn(&mut worker, 1, 0x5555);
        table.update().unwrap();
        assert_eq!(table.for_each_entry(10).len(), 1);

        table.request_clear();
        table.update().unwrap();
        assert_eq!(table.for_each_entry(10).len(), 0);
    }
}
