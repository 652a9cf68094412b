//! Thin observability facade over `tracing`, modeled on
//! `spark-core::observability::facade`. Kept deliberately small: the covered
//! core needs consistent span naming at FSM transitions and updater cycles,
//! not a full metrics/trace pipeline (out of scope per spec.md §1).

use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide `tracing` subscriber: `RUST_LOG`-driven
/// filtering with a sane default, human-readable `fmt` output. Mirrors the
/// teacher's own binary-entrypoint logging setup; embedding binaries call
/// this once before constructing a [`crate::scheduler`] or any channel/
/// updater task so FSM and updater spans are actually observed.
///
/// A second call is a no-op (the underlying `set_global_default` error is
/// swallowed) so tests and examples can call it unconditionally.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Opens a span for one channel-FSM event dispatch. Fields mirror the
/// vocabulary spec.md uses for the FSM (`state`, `event`), so log output can
/// be grepped directly against the transition table in spec.md §4.1.
pub fn channel_span(channel_id: u64, dpid: u64, state: &'static str, event: &'static str) -> Span {
    tracing::debug_span!(
        "channel.fsm",
        channel_id,
        dpid = format_args!("{dpid:016x}"),
        state,
        event
    )
}

/// Opens a span for one updater cycle over a single double-buffered table
/// (`"mac"` or `"rib"`), matching spec.md §4.5/§4.6's "Updater cycle".
pub fn updater_span(table: &'static str, dpid: u64) -> Span {
    tracing::debug_span!("updater.cycle", table, dpid = format_args!("{dpid:016x}"))
}
