//! Configuration constants for the forwarding core. Defaults are grounded
//! in the lagopus dataplane's `mactable.c`/`updater_timer.c` constants
//! rather than invented: `mactable_init()`'s table-wide `maxentries` (8192)
//! and a fixed 1s updater tick regardless of `ageing_time`. `NR_MAX_ENTRIES`
//! names a different constant in the original — the fixed size of each
//! worker's bbq notification queue, not the table-wide cap — so it is not
//! the source for this default.

use std::time::Duration;

/// `mactable.c`'s `mactable_init()` default `maxentries`.
pub const DEFAULT_MAX_MAC_ENTRIES: usize = 8192;

/// Common default MAC/ARP ageing window.
pub const DEFAULT_AGEING_TIME: Duration = Duration::from_secs(300);

/// Fixed updater tick, independent of `ageing_time`.
pub const DEFAULT_UPDATER_TICK: Duration = Duration::from_secs(1);

/// Forwarding pipeline batch size.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Bounded queue length between pipeline stages and from worker to updater.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

#[derive(Clone, Copy, Debug)]
pub struct MacTableConfig {
    pub max_entries: usize,
    pub ageing_time: Duration,
}

impl Default for MacTableConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_MAC_ENTRIES,
            ageing_time: DEFAULT_AGEING_TIME,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RibConfig {
    pub max_routes: usize,
    pub arp_ageing_time: Duration,
}

impl Default for RibConfig {
    fn default() -> Self {
        Self {
            max_routes: DEFAULT_MAX_MAC_ENTRIES,
            arp_ageing_time: DEFAULT_AGEING_TIME,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub workers_per_stage: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers_per_stage: 2,
        }
    }
}
