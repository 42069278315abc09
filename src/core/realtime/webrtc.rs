//! WebRTC implementation of [`PeerTransport`].
//!
//! Owns the peer connection, the local G.711 µ-law microphone track and the
//! JSON data channel. Remote audio content is carried by the data-channel
//! PCM16 deltas (handled in the client); the negotiated media track is kept
//! alive for protocol compliance and drained without decoding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_PCMU, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::base::{RealtimeError, RealtimeResult};
use super::capture::MicrophoneSource;
use super::transport::{PeerTransport, TransportEvent};

/// Data channel label carrying the JSON protocol events.
const DATA_CHANNEL_LABEL: &str = "oai-events";
/// Sample rate of the local G.711 µ-law track.
const CAPTURE_SAMPLE_RATE: u32 = 8000;
/// Capacity of the transport event channel.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// WebRTC peer transport with CPAL microphone input.
pub struct WebRtcTransport {
    microphone: Box<dyn MicrophoneSource>,
    peer_connection: Option<Arc<RTCPeerConnection>>,
    data_channel: Option<Arc<RTCDataChannel>>,
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
    mic_task: Option<JoinHandle<()>>,
}

impl WebRtcTransport {
    pub fn new(microphone: Box<dyn MicrophoneSource>) -> Self {
        Self {
            microphone,
            peer_connection: None,
            data_channel: None,
            events_rx: None,
            mic_task: None,
        }
    }

    /// Release everything `open` acquired. Used both for teardown on a
    /// failed handshake and for a normal close.
    async fn teardown(&mut self) {
        self.microphone.stop();
        if let Some(task) = self.mic_task.take() {
            task.abort();
        }
        if let Some(channel) = self.data_channel.take() {
            let _ = channel.close().await;
        }
        if let Some(peer_connection) = self.peer_connection.take() {
            let _ = peer_connection.close().await;
        }
        self.events_rx = None;
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn open(&mut self) -> RealtimeResult<String> {
        if self.peer_connection.is_some() {
            return Err(RealtimeError::SessionActive);
        }

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|error| RealtimeError::ConnectionFailed(error.to_string()))?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|error| RealtimeError::ConnectionFailed(error.to_string()))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|error| RealtimeError::ConnectionFailed(error.to_string()))?,
        );
        self.peer_connection = Some(Arc::clone(&peer_connection));

        // Microphone next: a denied device must not leak the connection.
        let frames = match self.microphone.start(CAPTURE_SAMPLE_RATE) {
            Ok(frames) => frames,
            Err(error) => {
                self.teardown().await;
                return Err(error);
            }
        };

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_PCMU.to_owned(),
                clock_rate: CAPTURE_SAMPLE_RATE,
                channels: 1,
                ..Default::default()
            },
            "audio".to_owned(),
            "charivo-mic".to_owned(),
        ));
        if let Err(error) = peer_connection
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
        {
            self.teardown().await;
            return Err(RealtimeError::ConnectionFailed(error.to_string()));
        }
        self.mic_task = Some(spawn_mic_pump(frames, track));

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let data_channel = match peer_connection
            .create_data_channel(DATA_CHANNEL_LABEL, None)
            .await
        {
            Ok(channel) => channel,
            Err(error) => {
                self.teardown().await;
                return Err(RealtimeError::ConnectionFailed(error.to_string()));
            }
        };

        let open_tx = event_tx.clone();
        data_channel.on_open(Box::new(move || {
            let open_tx = open_tx.clone();
            Box::pin(async move {
                let _ = open_tx.send(TransportEvent::ChannelOpen).await;
            })
        }));

        let message_tx = event_tx.clone();
        data_channel.on_message(Box::new(move |message| {
            let message_tx = message_tx.clone();
            Box::pin(async move {
                match String::from_utf8(message.data.to_vec()) {
                    Ok(text) => {
                        let _ = message_tx.send(TransportEvent::Message(text)).await;
                    }
                    Err(error) => warn!("dropping non-utf8 data channel payload: {error}"),
                }
            })
        }));

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(move |state| {
            let state_tx = state_tx.clone();
            Box::pin(async move {
                debug!(%state, "peer connection state changed");
                if matches!(
                    state,
                    RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Closed
                        | RTCPeerConnectionState::Disconnected
                ) {
                    let _ = state_tx.send(TransportEvent::Closed).await;
                }
            })
        }));

        // The remote track only exists to satisfy negotiation; audio content
        // arrives as data-channel deltas. Drain RTP so the stack stays
        // healthy.
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            Box::pin(async move {
                info!(id = %track.id(), "remote audio track received");
                tokio::spawn(async move {
                    while track.read_rtp().await.is_ok() {}
                    trace!("remote track drain ended");
                });
            })
        }));

        // Build the offer and wait for ICE gathering so the exported SDP is
        // complete (no trickle over the signaling endpoint).
        let offer = match peer_connection.create_offer(None).await {
            Ok(offer) => offer,
            Err(error) => {
                self.teardown().await;
                return Err(RealtimeError::ConnectionFailed(error.to_string()));
            }
        };
        let mut gather_complete = peer_connection.gathering_complete_promise().await;
        if let Err(error) = peer_connection.set_local_description(offer).await {
            self.teardown().await;
            return Err(RealtimeError::ConnectionFailed(error.to_string()));
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), gather_complete.recv()).await;

        let local = match peer_connection.local_description().await {
            Some(local) => local,
            None => {
                self.teardown().await;
                return Err(RealtimeError::ConnectionFailed(
                    "no local description after gathering".to_string(),
                ));
            }
        };

        self.data_channel = Some(data_channel);
        self.events_rx = Some(event_rx);
        Ok(local.sdp)
    }

    async fn accept_answer(&mut self, answer_sdp: &str) -> RealtimeResult<()> {
        let peer_connection = self
            .peer_connection
            .as_ref()
            .ok_or(RealtimeError::NotConnected)?
            .clone();
        let answer = RTCSessionDescription::answer(answer_sdp.to_string())
            .map_err(|error| RealtimeError::ConnectionFailed(error.to_string()))?;
        if let Err(error) = peer_connection.set_remote_description(answer).await {
            self.teardown().await;
            return Err(RealtimeError::ConnectionFailed(error.to_string()));
        }
        Ok(())
    }

    async fn send(&self, payload: &str) -> RealtimeResult<()> {
        let channel = self
            .data_channel
            .as_ref()
            .ok_or(RealtimeError::NotConnected)?;
        if channel.ready_state() != RTCDataChannelState::Open {
            return Err(RealtimeError::NotConnected);
        }
        channel
            .send_text(payload.to_string())
            .await
            .map_err(|error| RealtimeError::ChannelClosed(error.to_string()))?;
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.take()
    }

    async fn close(&mut self) -> RealtimeResult<()> {
        self.teardown().await;
        Ok(())
    }
}

/// Forward microphone frames to the local track as µ-law samples.
fn spawn_mic_pump(
    mut frames: mpsc::Receiver<Vec<f32>>,
    track: Arc<TrackLocalStaticSample>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let duration =
                Duration::from_millis(frame.len() as u64 * 1000 / CAPTURE_SAMPLE_RATE as u64);
            let payload: Vec<u8> = frame
                .iter()
                .map(|sample| {
                    linear_to_ulaw((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                })
                .collect();
            let sample = Sample {
                data: payload.into(),
                duration,
                ..Default::default()
            };
            if track.write_sample(&sample).await.is_err() {
                break;
            }
        }
        trace!("microphone pump ended");
    })
}

/// G.711 µ-law companding of one 16-bit sample.
fn linear_to_ulaw(sample: i16) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    let mut value = sample as i32;
    let sign: u8 = if value < 0 {
        value = -value;
        0x80
    } else {
        0
    };
    if value > CLIP {
        value = CLIP;
    }
    value += BIAS;

    let mut exponent: u8 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (value & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = ((value >> (exponent + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ulaw_known_values() {
        // Silence encodes to 0xFF, full negative scale to 0x00 region.
        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_ulaw(-1), 0x7F);
        assert_eq!(linear_to_ulaw(i16::MAX), 0x80);
        assert_eq!(linear_to_ulaw(i16::MIN + 1), 0x00);
    }

    #[test]
    fn test_ulaw_is_monotone_in_magnitude() {
        // Larger positive magnitudes decode to smaller codewords (after the
        // final complement), so the raw encoded exponent must not decrease.
        let low = linear_to_ulaw(100);
        let high = linear_to_ulaw(20000);
        assert_ne!(low, high);
        // Both positive: sign bit clear after complement means top bit set.
        assert_eq!(low & 0x80, 0x80);
        assert_eq!(high & 0x80, 0x80);
    }
}
