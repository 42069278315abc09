//! Peer transport abstraction under the realtime client.
//!
//! The transport owns the WebRTC mechanics (peer connection, microphone
//! track, data channel); the client owns the protocol. Keeping the seam here
//! lets the protocol state machine run against a scripted transport in tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::base::RealtimeResult;

/// Events surfaced by a peer transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The data channel is open for sending.
    ChannelOpen,
    /// A text payload arrived on the data channel.
    Message(String),
    /// The underlying connection ended.
    Closed,
}

/// WebRTC-shaped peer transport.
///
/// Lifecycle: `open` acquires every local resource (peer connection,
/// microphone media, data channel) and returns the ICE-gathered offer SDP;
/// `accept_answer` completes the handshake; `close` releases everything and
/// is idempotent. `open` tears its own partial state down on failure; a
/// failed open never leaks tracks or connections.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create the peer connection, acquire microphone media, create the data
    /// channel and return the local offer SDP.
    async fn open(&mut self) -> RealtimeResult<String>;

    /// Apply the remote answer SDP.
    async fn accept_answer(&mut self, answer_sdp: &str) -> RealtimeResult<()>;

    /// Send a text payload over the data channel.
    async fn send(&self, payload: &str) -> RealtimeResult<()>;

    /// Take the transport event stream. Yields `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Release all resources. Safe to call repeatedly.
    async fn close(&mut self) -> RealtimeResult<()>;
}
