//! Callback-driven timer primitive.
//!
//! spec.md §9 ("Design Notes — Callback-driven timers") asks for a scheduler
//! exposing `schedule_once(duration, task)` and
//! `schedule_periodic(interval, task)`, where the returned handle is `Send`
//! and cancellable from any thread without that thread holding a foreign
//! lock. `tokio::task::JoinHandle` already has exactly that shape, so this
//! module is a thin wrapper rather than a hand-rolled timer wheel — the
//! teacher reaches for `tokio` wherever a runtime primitive already covers
//! the need (see `spark-transport-tcp`'s use of `tokio::select!` for
//! cancellation) instead of re-implementing one.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a scheduled task. Dropping the handle does *not* cancel the
/// task (matching `tokio::task::JoinHandle` semantics); call [`cancel`]
/// explicitly, which is exactly the shape spec.md §4.1's `hello_confirm`
/// needs: release the channel lock, then cancel, without the cancelling
/// thread needing to reacquire any lock the timer callback itself might take.
///
/// [`cancel`]: TimerHandle::cancel
#[derive(Debug)]
pub struct TimerHandle {
    join: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the scheduled task. Safe to call from any thread; never blocks
    /// on the task's own progress.
    pub fn cancel(&self) {
        self.join.abort();
    }

    /// Whether the task has already completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Runs a single task once after `delay` elapses.
///
/// Used by `of-channel::fsm` to arm the single-shot reconnect timer the FSM
/// schedules on entering `Idle` (spec.md §4.1: "On entering Idle a
/// single-shot timer of `interval` seconds schedules the next
/// `ChannelStart`").
pub fn schedule_once<F, Fut>(delay: Duration, task: F) -> TimerHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let join = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task().await;
    });
    TimerHandle { join }
}

/// Runs `task` repeatedly every `interval`, re-arming unconditionally after
/// each execution (spec.md §4.8: "The tick is re-armed unconditionally
/// after execution."). Used for the channel's 1-second echo timer (§4.1)
/// and the bridge-wide updater tick (§4.8).
pub fn schedule_periodic<F, Fut>(interval: Duration, mut task: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            task().await;
        }
    });
    TimerHandle { join }
}
