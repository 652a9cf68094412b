//! The channel finite-state machine (spec.md §4.1).
//!
//! Modeled on spec.md §9's "FSM table of function pointers" design note:
//! "Replace with a pure function `transition(state, event) -> (Action,
//! State)` plus a dispatcher that invokes the action; sum types for state
//! and event, and a variant enum for action." The lagopus original
//! (`src/agent/channel.c`) drives this with a table of function pointers
//! indexed by `(status, event)`; here it is a pure match expression instead,
//! which the compiler checks for exhaustiveness — spec.md §8 property 1
//! ("FSM completeness") for free.

use std::time::Duration;

/// spec.md §4.1 states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ChannelState {
    Idle,
    Connect,
    HelloSent,
    Established,
    Disable,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Idle => "Idle",
            ChannelState::Connect => "Connect",
            ChannelState::HelloSent => "HelloSent",
            ChannelState::Established => "Established",
            ChannelState::Disable => "Disable",
        }
    }
}

/// spec.md §4.1 events.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ChannelEvent {
    ChannelStart,
    ChannelStop,
    ChannelExpired,
    TcpOpen,
    TcpClosed,
    TcpFailed,
    HelloReceived,
    MessageReceived,
}

impl ChannelEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelEvent::ChannelStart => "ChannelStart",
            ChannelEvent::ChannelStop => "ChannelStop",
            ChannelEvent::ChannelExpired => "ChannelExpired",
            ChannelEvent::TcpOpen => "TcpOpen",
            ChannelEvent::TcpClosed => "TcpClosed",
            ChannelEvent::TcpFailed => "TcpFailed",
            ChannelEvent::HelloReceived => "HelloReceived",
            ChannelEvent::MessageReceived => "MessageReceived",
        }
    }
}

/// The side effect the FSM dispatcher must perform alongside a state
/// transition. Kept as data rather than as a function pointer (spec.md §9)
/// so `transition` stays a pure, independently-testable function; the
/// dispatcher (in `of-channel::manager`/the embedding channel task)
/// interprets each variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// No side effect.
    Ignore,
    /// Begin a TCP/TLS connect attempt.
    StartConnect,
    /// Re-check an in-flight connect attempt; no-op placeholder state.
    ConnectCheck,
    /// Tear down the channel's socket and any pending timers.
    Stop,
    /// Apply backoff, then stop; the caller doubles the retry interval.
    ConnectFail,
    /// Send the local Hello and arm nothing further yet.
    SendHello,
    /// Negotiate version against the peer's Hello and, on success, confirm
    /// establishment (spec.md §4.1 "`hello_confirm`").
    HelloConfirm,
    /// Route a received message to the dispatcher.
    Process,
    /// Release all channel resources permanently.
    Expire,
}

/// Pure transition function implementing spec.md §4.1's 8(event)×5(state)
/// table in full. Every `(state, event)` pair is covered, which is what
/// spec.md §8 property 1 ("FSM completeness... no panic path exists")
/// requires; the exhaustive `match` on `state` with an exhaustive `match` on
/// `event` inside each arm is what the compiler uses to prove that for us.
pub fn transition(state: ChannelState, event: ChannelEvent) -> (Action, ChannelState) {
    use ChannelEvent::*;
    use ChannelState::*;

    match state {
        Idle => match event {
            ChannelStart => (Action::StartConnect, Connect),
            ChannelStop => (Action::Stop, Idle),
            ChannelExpired => (Action::Expire, Disable),
            TcpOpen | TcpClosed | TcpFailed => (Action::Stop, Idle),
            HelloReceived | MessageReceived => (Action::Ignore, Idle),
        },
        Connect => match event {
            ChannelStart => (Action::ConnectCheck, Connect),
            TcpOpen => (Action::SendHello, HelloSent),
            ChannelStop => (Action::Stop, Idle),
            TcpClosed | TcpFailed => (Action::ConnectFail, Idle),
            ChannelExpired => (Action::Expire, Disable),
            HelloReceived | MessageReceived => (Action::Ignore, Connect),
        },
        HelloSent => match event {
            TcpOpen => (Action::Ignore, HelloSent),
            ChannelStop | TcpClosed | TcpFailed => (Action::Stop, Idle),
            HelloReceived => (Action::HelloConfirm, Established),
            ChannelExpired => (Action::Expire, Disable),
            ChannelStart | MessageReceived => (Action::Ignore, HelloSent),
        },
        Established => match event {
            TcpOpen => (Action::Ignore, Established),
            ChannelStop | TcpClosed | TcpFailed => (Action::Stop, Idle),
            HelloReceived | MessageReceived => (Action::Process, Established),
            ChannelExpired => (Action::Expire, Disable),
            ChannelStart => (Action::Ignore, Established),
        },
        Disable => (Action::Ignore, Disable),
    }
}

/// Default and maximum reconnect backoff, taken verbatim from the original
/// (`CHANNEL_CONNECT_INTERVAL_DEFAULT` / `CHANNEL_CONNECT_INTERVAL_MAX` in
/// lagopus `src/agent/channel.c`) and restated in spec.md §4.1.
pub const RETRY_INTERVAL_DEFAULT: Duration = Duration::from_secs(1);
pub const RETRY_INTERVAL_MAX: Duration = Duration::from_secs(60);

/// Tracks the reconnect backoff across `TcpFailed` events (spec.md §4.1:
/// "Connection retry interval starts at 1s, doubles on `TcpFailed` up to
/// 60s, and resets to 1s on successful `TcpOpen`.").
#[derive(Clone, Copy, Debug)]
pub struct RetryBackoff {
    interval: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            interval: RETRY_INTERVAL_DEFAULT,
        }
    }
}

impl RetryBackoff {
    pub fn current(self) -> Duration {
        self.interval
    }

    /// Doubles the interval, capped at [`RETRY_INTERVAL_MAX`].
    pub fn on_failure(&mut self) {
        self.interval = (self.interval * 2).min(RETRY_INTERVAL_MAX);
    }

    /// Resets to the default interval.
    pub fn on_success(&mut self) {
        self.interval = RETRY_INTERVAL_DEFAULT;
    }
}
