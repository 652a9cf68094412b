//! The per-channel task (spec.md §4.1, §5, §9): drives one [`Channel`]'s
//! FSM from real socket and timer events, performing the side effects
//! `fsm::transition` names as data (`SendHello`, `HelloConfirm`, `Process`,
//! ...).
//!
//! This is the "per-channel I/O worker" of spec.md §5: one task per
//! channel, reading/writing its socket and running the FSM under the
//! owning channel's lock ("per-channel I/O workers that read/write sockets
//! and run the FSM under the owning channel's lock"). `fsm::transition`
//! stays pure and frame-free; this module is the dispatcher spec.md §9
//! describes sitting next to it, interpreting each [`Action`] against a
//! real socket, the real [`Dispatcher`], and the scheduler.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use of_core::scheduler::schedule_periodic;
use of_core::CoreError;
use of_transport::ReadOutcome;

use crate::dispatch::Dispatcher;
use crate::error::{self, OfpError};
use crate::fsm::{transition, Action, ChannelEvent, ChannelState};
use crate::model::Channel;
use crate::pbuf::FramedMessage;
use crate::wire::{Header, OfpType, VersionBitmap, HEADER_LEN, OFP_VERSION_1_3};

/// spec.md §4.1: "starts a 1-second periodic echo timer".
pub const ECHO_INTERVAL: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 4096;

/// spec.md §4.1 "Version negotiation": "on Hello receipt, if the peer's
/// announced version matches the bridge's version, use it. Otherwise
/// inspect a `VersionBitmap` Hello element for a common version; the
/// highest common version wins."
///
/// Pure and independently testable against spec.md §8 property 3
/// ("the negotiated version equals `max(local ∩ peer)` when non-empty;
/// otherwise negotiation fails") and scenarios S1/S2.
pub fn negotiate_version(
    local_primary: u8,
    local_bitmap: &VersionBitmap,
    peer_header_version: u8,
    peer_bitmap: Option<&VersionBitmap>,
) -> Option<u8> {
    if peer_header_version == local_primary {
        return Some(local_primary);
    }
    local_bitmap.highest_common(peer_bitmap?)
}

/// Scans a Hello body for the first `OFPHET_VERSIONBITMAP` element. Hello
/// elements are laid out back to back, each individually 8-byte padded on
/// the wire; unknown element types are skipped rather than rejected, since
/// spec.md only requires inspecting the bitmap element when present.
pub fn find_version_bitmap(mut body: &[u8]) -> Option<VersionBitmap> {
    while body.len() >= 4 {
        let elem_len = u16::from_be_bytes([body[2], body[3]]) as usize;
        if elem_len < 4 || elem_len > body.len() {
            return None;
        }
        if let Some(bitmap) = VersionBitmap::decode(&body[..elem_len]) {
            return Some(bitmap);
        }
        let padded = elem_len.div_ceil(8) * 8;
        if padded == 0 || padded > body.len() {
            return None;
        }
        body = &body[padded..];
    }
    None
}

fn encode_message(version: u8, message_type: OfpType, xid: u32, body: &[u8]) -> Vec<u8> {
    let header = Header {
        version,
        raw_type: message_type.as_u8(),
        length: (HEADER_LEN + body.len()) as u16,
        xid,
    };
    let mut out = header.encode().to_vec();
    out.extend_from_slice(body);
    out
}

/// Builds the `OFPT_ERROR` / `OFPET_HELLO_FAILED` / `OFPHFC_INCOMPATIBLE`
/// reply spec.md §4.1 sends when no common version exists, carrying the
/// textual reason spec.md §4.3 calls for ("a textual reason for
/// HelloFailed").
fn build_hello_failed(xid: u32, reason: &str) -> Vec<u8> {
    let code = error::codes::HELLO_INCOMPATIBLE;
    let mut body = Vec::with_capacity(4 + reason.len());
    body.extend_from_slice(&(code.error_type as u16).to_be_bytes());
    body.extend_from_slice(&code.code.to_be_bytes());
    body.extend_from_slice(reason.as_bytes());
    encode_message(OFP_VERSION_1_3, OfpType::Error, xid, &body)
}

/// Builds an `OFPT_ERROR` reply for a dispatch-time [`OfpError`], embedding
/// up to the first 64 bytes of the offending request (spec.md §4.3: "the
/// original request buffer (first 64 bytes)").
fn build_error_reply(version: u8, xid: u32, err: &OfpError, original: &[u8]) -> Vec<u8> {
    let code = err.wire_code();
    let keep = original.len().min(64);
    let mut body = Vec::with_capacity(4 + keep);
    body.extend_from_slice(&(code.error_type as u16).to_be_bytes());
    body.extend_from_slice(&code.code.to_be_bytes());
    body.extend_from_slice(&original[..keep]);
    encode_message(version, OfpType::Error, xid, &body)
}

/// Drives one [`Channel`] end to end over an already-connected socket: sends
/// the local Hello, negotiates the wire version on the peer's Hello, arms
/// and tears down the echo timer across `hello_confirm`/shutdown, and
/// dispatches every subsequent message.
///
/// Reconnection is out of scope here: spec.md §4.1's `Action::StartConnect`
/// is about dialing a *new* socket, which belongs to whatever supervisor
/// constructs a fresh `Channel` (and `ChannelRunner`) after backoff — this
/// task owns exactly one socket for exactly one connection attempt.
pub struct ChannelRunner {
    channel: Arc<Channel>,
    dispatcher: Arc<Dispatcher>,
    local_versions: VersionBitmap,
}

impl ChannelRunner {
    pub fn new(channel: Arc<Channel>, dispatcher: Arc<Dispatcher>, local_versions: VersionBitmap) -> Self {
        Self {
            channel,
            dispatcher,
            local_versions,
        }
    }

    /// Runs until the socket closes or fails, or the FSM reaches `Disable`.
    pub async fn run(self) -> Result<(), CoreError> {
        self.apply_event(ChannelEvent::ChannelStart).await;
        self.apply_event(ChannelEvent::TcpOpen).await;

        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.channel.state() {
                ChannelState::Disable | ChannelState::Idle => break,
                _ => {}
            }
            match self.channel.socket.read(&mut buf).await {
                Ok(ReadOutcome::Data(n)) => {
                    let frames = self.channel.with_state(|g| {
                        g.inbound.extend(&buf[..n]);
                        g.inbound.drain_messages()
                    });
                    for frame in frames {
                        self.handle_frame(frame).await;
                    }
                }
                Ok(ReadOutcome::Closed) => {
                    self.apply_event(ChannelEvent::TcpClosed).await;
                    break;
                }
                Err(err) => {
                    warn!(channel_id = %self.channel.channel_id, %err, "channel socket read failed");
                    self.apply_event(ChannelEvent::TcpFailed).await;
                    break;
                }
            }
        }
        self.cancel_all_timers();
        Ok(())
    }

    async fn handle_frame(&self, frame: FramedMessage) {
        let header = frame.header();
        let event = match header.message_type() {
            Some(OfpType::Hello) => ChannelEvent::HelloReceived,
            _ => ChannelEvent::MessageReceived,
        };

        let (action, next) = transition(self.channel.state(), event);
        self.channel.with_state(|g| g.state = next);

        match action {
            Action::HelloConfirm => self.hello_confirm(&frame).await,
            Action::Process => self.process(&frame).await,
            Action::Stop => self.stop().await,
            Action::Expire => self.expire().await,
            Action::Ignore => {}
            other => debug!(?other, "action not expected for a received frame"),
        }
    }

    async fn send(&self, bytes: Vec<u8>) {
        if let Err(err) = self.channel.socket.write_all(&bytes).await {
            warn!(channel_id = %self.channel.channel_id, %err, "failed to write to channel socket");
        }
    }

    /// `Action::SendHello` (spec.md §4.1 Connect×TcpOpen cell): emits the
    /// local Hello carrying this bridge's version bitmap.
    async fn send_hello(&self) {
        let body = self.local_versions.encode();
        self.send(encode_message(OFP_VERSION_1_3, OfpType::Hello, 0, &body)).await;
    }

    /// `Action::HelloConfirm` (spec.md §4.1): negotiate the wire version
    /// against the peer's Hello; on success, set the channel version and
    /// arm the echo timer — cancelling whatever timer was previously
    /// running first, with the channel lock released before that cancel
    /// ("releasing the channel lock before cancel to avoid the inverse
    /// lock order (timer-callback-lock -> channel-lock)"). On failure, send
    /// `OFPHFC_INCOMPATIBLE` and disable the channel.
    async fn hello_confirm(&self, frame: &FramedMessage) {
        let header = frame.header();
        let peer_bitmap = find_version_bitmap(frame.payload());
        let negotiated = negotiate_version(
            OFP_VERSION_1_3,
            &self.local_versions,
            header.version,
            peer_bitmap.as_ref(),
        );

        let Some(version) = negotiated else {
            warn!(channel_id = %self.channel.channel_id, "no common OpenFlow version with peer");
            self.send(build_hello_failed(header.xid, "no common OpenFlow version"))
                .await;
            self.channel.with_state(|g| g.state = ChannelState::Disable);
            return;
        };

        self.channel.with_state(|g| {
            g.version = version;
            g.state = ChannelState::Established;
        });
        info!(channel_id = %self.channel.channel_id, version, "channel established");

        // Take the stale timer out from under the lock, then drop the guard
        // (implicit in `with_state` returning) before cancelling it — this
        // is the exact ordering spec.md §4.1/§5 requires.
        if let Some(timer) = self.channel.with_state(|g| g.echo_timer.take()) {
            timer.cancel();
        }

        let channel = self.channel.clone();
        let handle = schedule_periodic(ECHO_INTERVAL, move || {
            let channel = channel.clone();
            async move {
                let bytes = encode_message(channel.version(), OfpType::EchoRequest, 0, &[]);
                if channel.socket.write_all(&bytes).await.is_err() {
                    channel.mark_dead();
                }
            }
        });
        self.channel.with_state(|g| g.echo_timer = Some(handle));
    }

    /// `Action::Process`: validated dispatch of an established channel's
    /// message, replying with `OFPT_ERROR` on a dispatcher rejection
    /// (spec.md §4.3/§7) and disabling the channel only when the specific
    /// error implies the byte stream is no longer trustworthy.
    async fn process(&self, frame: &FramedMessage) {
        let header = frame.header();
        if let Err(err) = self.dispatcher.dispatch(&self.channel, frame).await {
            warn!(channel_id = %self.channel.channel_id, %err, "dispatch rejected message");
            self.send(build_error_reply(self.channel.version(), header.xid, &err, frame.as_bytes()))
                .await;
            if err.disables_channel() {
                self.channel.with_state(|g| g.state = ChannelState::Disable);
            }
        }
    }

    async fn stop(&self) {
        self.cancel_all_timers();
        self.channel.mark_dead();
    }

    async fn expire(&self) {
        self.cancel_all_timers();
        self.channel.mark_dead();
    }

    fn cancel_all_timers(&self) {
        let (echo, retry) = self
            .channel
            .with_state(|g| (g.echo_timer.take(), g.retry_timer.take()));
        if let Some(t) = echo {
            t.cancel();
        }
        if let Some(t) = retry {
            t.cancel();
        }
    }

    /// Drives one FSM event that has no associated frame (`ChannelStart`,
    /// `TcpOpen`, `TcpClosed`, `TcpFailed`, `ChannelExpired`).
    async fn apply_event(&self, event: ChannelEvent) {
        let (action, next) = transition(self.channel.state(), event);
        self.channel.with_state(|g| g.state = next);
        match action {
            Action::SendHello => self.send_hello().await,
            Action::Stop | Action::ConnectFail => self.stop().await,
            Action::Expire => self.expire().await,
            Action::StartConnect | Action::ConnectCheck | Action::Ignore | Action::HelloConfirm | Action::Process => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_version_uses_header_version_when_it_matches_local_primary() {
        let local = VersionBitmap::new([0x01, 0x04]);
        let got = negotiate_version(0x04, &local, 0x04, None);
        assert_eq!(got, Some(0x04));
    }

    /// S1: peer Hello v0x05 with bitmap {0x01, 0x04}; local supports
    /// {0x04}. Expect negotiated version 0x04.
    #[test]
    fn negotiate_version_s1_falls_back_to_bitmap_intersection() {
        let local = VersionBitmap::new([0x04]);
        let peer = VersionBitmap::new([0x01, 0x04]);
        let got = negotiate_version(0x04, &local, 0x05, Some(&peer));
        assert_eq!(got, Some(0x04));
    }

    /// S2: peer Hello v0x05 with bitmap {0x05}; local supports {0x04}.
    /// Expect negotiation failure.
    #[test]
    fn negotiate_version_s2_disjoint_bitmaps_fail() {
        let local = VersionBitmap::new([0x04]);
        let peer = VersionBitmap::new([0x05]);
        let got = negotiate_version(0x04, &local, 0x05, Some(&peer));
        assert_eq!(got, None);
    }

    #[test]
    fn negotiate_version_without_peer_bitmap_fails_on_mismatch() {
        let local = VersionBitmap::new([0x04]);
        let got = negotiate_version(0x04, &local, 0x05, None);
        assert_eq!(got, None);
    }

    #[test]
    fn find_version_bitmap_locates_element_after_padding() {
        let bitmap = VersionBitmap::new([0x01, 0x04, 0x05]);
        let mut body = bitmap.encode();
        // Pad to an 8-byte boundary the way a second, unrelated element
        // would start, to exercise the padded-skip path even though there
        // is nothing after it here.
        while body.len() % 8 != 0 {
            body.push(0);
        }
        let decoded = find_version_bitmap(&body).unwrap();
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn find_version_bitmap_none_on_empty_body() {
        assert!(find_version_bitmap(&[]).is_none());
    }

    proptest::proptest! {
        /// spec.md §8 property 3: for any pair of local/peer supported
        /// version sets, the negotiated version equals `max(local ∩ peer)`
        /// when non-empty, otherwise negotiation fails — never panics.
        #[test]
        fn negotiated_version_matches_max_intersection(
            local_versions in proptest::collection::btree_set(1u8..=8, 0..6),
            peer_versions in proptest::collection::btree_set(1u8..=8, 0..6),
        ) {
            let local = VersionBitmap::new(local_versions.iter().copied());
            let peer = VersionBitmap::new(peer_versions.iter().copied());
            // Force the bitmap path: choose a header version that never
            // equals the local primary so negotiation always falls through
            // to bitmap intersection.
            let got = negotiate_version(0, &local, 0xff, Some(&peer));
            let expected = local_versions.intersection(&peer_versions).max().copied();
            proptest::prop_assert_eq!(got, expected);
        }
    }

    mod end_to_end {
        use super::*;
        use crate::test_support::ScriptedTransportChannel;
        use of_core::{ChannelId, DatapathId};
        use of_transport::{TransportAddr, TransportProtocol};
        use std::sync::Arc as StdArc;

        fn encode_hello(version: u8, versions: &[u8]) -> Vec<u8> {
            let bitmap = VersionBitmap::new(versions.iter().copied());
            encode_message(version, OfpType::Hello, 7, &bitmap.encode())
        }

        fn channel_over(socket: StdArc<ScriptedTransportChannel>) -> Channel {
            Channel::new(
                ChannelId::new(1),
                DatapathId::new(0x42),
                TransportAddr::new(TransportProtocol::Tcp, "127.0.0.1:6633".parse().unwrap()),
                0,
                socket,
            )
        }

        #[tokio::test]
        async fn full_handshake_reaches_established_and_writes_local_hello() {
            let peer_hello = encode_hello(OFP_VERSION_1_3, &[OFP_VERSION_1_3]);
            let scripted = StdArc::new(ScriptedTransportChannel::new(peer_hello));
            let channel = StdArc::new(channel_over(scripted.clone()));
            let dispatcher = StdArc::new(Dispatcher::new(StdArc::new(crate::handler::NullHandler)));
            let runner = ChannelRunner::new(
                channel.clone(),
                dispatcher,
                VersionBitmap::new([OFP_VERSION_1_3]),
            );

            runner.run().await.unwrap();

            assert_eq!(channel.state(), ChannelState::Established);
            assert_eq!(channel.version(), OFP_VERSION_1_3);
            let written = scripted.written();
            assert_eq!(Header::parse(&written[0]).unwrap().message_type(), Some(OfpType::Hello));
        }

        #[tokio::test]
        async fn incompatible_hello_disables_channel() {
            let peer_hello = encode_hello(0x05, &[0x05]);
            let scripted = StdArc::new(ScriptedTransportChannel::new(peer_hello));
            let channel = StdArc::new(channel_over(scripted.clone()));
            let dispatcher = StdArc::new(Dispatcher::new(StdArc::new(crate::handler::NullHandler)));
            let runner = ChannelRunner::new(
                channel.clone(),
                dispatcher,
                VersionBitmap::new([OFP_VERSION_1_3]),
            );

            runner.run().await.unwrap();

            assert_eq!(channel.state(), ChannelState::Disable);
        }
    }
}
