//! The `Channel` data model (spec.md §3 "Channel").

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;

use of_core::scheduler::TimerHandle;
use of_core::{ChannelId, DatapathId};
use of_transport::{Channel as TransportChannel, TransportAddr};
use parking_lot_compat::Mutex;

use crate::fsm::{ChannelState, RetryBackoff};
use crate::multipart::MultipartTable;
use crate::pbuf::PBuf;

/// Minimal `parking_lot`-shaped mutex so `of-channel` does not need to pull
/// in `parking_lot` just for this one struct's hot field; `std::sync::Mutex`
/// is exactly the right tool here since channel-lock critical sections are
/// short and never cross an `.await` point (spec.md §5: "The channel lock
/// protects per-channel mutable state.").
mod parking_lot_compat {
    pub use std::sync::Mutex;
}

/// spec.md §3: "role (Equal/Master/Slave)".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    Equal,
    Master,
    Slave,
}

/// spec.md §3: "async-config bitmasks for packet-in / port-status /
/// flow-removed". Each field is the raw `ofp_packet_in_reason` /
/// `ofp_port_reason` / `ofp_flow_removed_reason` bitmask the channel has
/// asked to receive, as set by `OFPT_SET_ASYNC`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AsyncConfig {
    pub packet_in_mask: u32,
    pub port_status_mask: u32,
    pub flow_removed_mask: u32,
}

/// Mutable state guarded by the channel lock (spec.md §3 invariant: "state
/// mutations take the channel lock").
pub struct ChannelGuarded {
    pub state: ChannelState,
    pub version: u8,
    pub role: Role,
    pub async_config: AsyncConfig,
    pub retry: RetryBackoff,
    pub inbound: PBuf,
    pub outbound_queue: VecDeque<Vec<u8>>,
    pub multipart: MultipartTable,
    /// The channel's 1-second periodic echo timer, armed by `hello_confirm`
    /// on entering `Established` (spec.md §4.1: "starts a 1-second periodic
    /// echo timer; any outstanding timer is cancelled first, releasing the
    /// channel lock before cancel to avoid the inverse lock order"). Held
    /// here rather than in a sibling field so `take()`-ing it out is one
    /// lock acquisition; callers must drop the `with_state` guard before
    /// calling [`TimerHandle::cancel`] on the value they took out.
    pub echo_timer: Option<TimerHandle>,
    /// The single-shot reconnect timer armed on entering `Idle` (spec.md
    /// §4.1: "a single-shot timer of `interval` seconds schedules the next
    /// `ChannelStart`"). Same take-then-cancel-outside-the-lock discipline
    /// as `echo_timer`.
    pub retry_timer: Option<TimerHandle>,
}

impl ChannelGuarded {
    fn new() -> Self {
        Self {
            state: ChannelState::Idle,
            version: 0,
            role: Role::Equal,
            async_config: AsyncConfig::default(),
            retry: RetryBackoff::default(),
            inbound: PBuf::new(),
            outbound_queue: VecDeque::new(),
            multipart: MultipartTable::new(),
            echo_timer: None,
            retry_timer: None,
        }
    }
}

/// One controller-to-switch OpenFlow session (spec.md §3 "Channel").
///
/// Invariants upheld by construction and by every mutating method:
/// - `version == 0` iff `state` is `Idle`, `Connect`, or `HelloSent` before a
///   Hello has been received (enforced: `version` is only ever written by
///   the dispatcher's Hello handler, which also drives the FSM to
///   `Established`);
/// - `auxiliary_id != 0 ⇒ is_auxiliary` (enforced in [`Channel::new`]: the
///   constructor derives `is_auxiliary` from whether `auxiliary_id` is
///   nonzero, so the two can never disagree);
/// - reference count `>= 0`, must reach `0` before destruction (tracked with
///   an `AtomicI64` rather than `AtomicU64` so an erroneous extra decrement
///   is observable as negative instead of wrapping silently).
pub struct Channel {
    pub channel_id: ChannelId,
    pub datapath_id: DatapathId,
    pub remote_addr: SocketAddr,
    pub transport_addr: TransportAddr,
    pub auxiliary_id: u8,
    pub socket: Arc<dyn TransportChannel>,
    guarded: Mutex<ChannelGuarded>,
    ref_count: AtomicI64,
    alive: AtomicU8,
}

const ALIVE: u8 = 1;
const DEAD: u8 = 0;

impl Channel {
    pub fn new(
        channel_id: ChannelId,
        datapath_id: DatapathId,
        transport_addr: TransportAddr,
        auxiliary_id: u8,
        socket: Arc<dyn TransportChannel>,
    ) -> Self {
        let remote_addr = socket.peer_addr();
        Self {
            channel_id,
            datapath_id,
            remote_addr,
            transport_addr,
            auxiliary_id,
            socket,
            guarded: Mutex::new(ChannelGuarded::new()),
            ref_count: AtomicI64::new(0),
            alive: AtomicU8::new(ALIVE),
        }
    }

    pub fn is_auxiliary(&self) -> bool {
        self.auxiliary_id != 0
    }

    /// Runs `f` with the channel lock held (spec.md §3: "state mutations
    /// take the channel lock"). The closure must not `.await` — callers
    /// needing to perform async I/O under a "logical" lock should copy out
    /// what they need, drop the guard, then act, the same pattern spec.md
    /// §4.1's `hello_confirm` uses to avoid holding the channel lock across
    /// a timer cancellation.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ChannelGuarded) -> R) -> R {
        let mut guard = self.guarded.lock().unwrap();
        f(&mut guard)
    }

    pub fn state(&self) -> ChannelState {
        self.with_state(|g| g.state)
    }

    pub fn version(&self) -> u8 {
        self.with_state(|g| g.version)
    }

    pub fn role(&self) -> Role {
        self.with_state(|g| g.role)
    }

    pub fn increment_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrement_ref(&self) {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "channel ref_count underflowed");
    }

    pub fn ref_count(&self) -> i64 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Whether the session is live (spec.md §4.4's `alive_count`:
    /// "channels whose FSM is in Established or HelloSent and whose session
    /// is live").
    pub fn is_live(&self) -> bool {
        self.alive.load(Ordering::Acquire) == ALIVE
    }

    pub fn mark_dead(&self) {
        self.alive.store(DEAD, Ordering::Release);
    }
}
