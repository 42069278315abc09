//! Realtime protocol client.
//!
//! Orchestrates the connection handshake over a [`PeerTransport`], then runs
//! a dispatch task that turns raw data-channel traffic into a typed
//! [`RealtimeEvent`] stream. Remote PCM16 audio deltas are routed to device
//! playback and to the lip-sync sampler; they are never "played" by the
//! dispatcher itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::{Mutex as PlMutex, RwLock as PlRwLock};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::base::{
    ConnectionState, REMOTE_AUDIO_SAMPLE_RATE, RealtimeConfig, RealtimeError, RealtimeEvent,
    RealtimeResult, ToolCallRequest, ToolHandler,
};
use super::protocol::{
    ClientEvent, ConversationItem, InputAudioTranscription, ServerEvent, SessionConfig,
};
use super::signaling::SignalingClient;
use super::transport::{PeerTransport, TransportEvent};
use crate::core::audio::{AudioData, AudioPlayback, AudioRing};
use crate::core::lipsync::{FFT_SIZE, RmsSampler};

type SharedTransport = Arc<Mutex<Box<dyn PeerTransport>>>;

/// Client half of the realtime voice protocol.
pub struct RealtimeClient {
    config: RealtimeConfig,
    signaling: SignalingClient,
    transport: SharedTransport,
    state: Arc<PlRwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    response_in_progress: Arc<AtomicBool>,
    tool_handler: Option<ToolHandler>,
    playback: AudioPlayback,
    ring: Arc<AudioRing>,
    sampler_slot: Arc<PlMutex<Option<RmsSampler>>>,
    dispatch_task: Option<JoinHandle<()>>,
    event_tx: Option<mpsc::UnboundedSender<RealtimeEvent>>,
    disconnect_emitted: Arc<AtomicBool>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig, transport: Box<dyn PeerTransport>) -> RealtimeResult<Self> {
        config.validate()?;
        let signaling = SignalingClient::new(config.signaling_url.clone(), config.signaling_timeout)?;
        Ok(Self {
            config,
            signaling,
            transport: Arc::new(Mutex::new(transport)),
            state: Arc::new(PlRwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            response_in_progress: Arc::new(AtomicBool::new(false)),
            tool_handler: None,
            playback: AudioPlayback::spawn(),
            ring: AudioRing::new(FFT_SIZE * 8),
            sampler_slot: Arc::new(PlMutex::new(None)),
            dispatch_task: None,
            event_tx: None,
            disconnect_emitted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register the hook answering tool calls. Must be set before `connect`.
    pub fn set_tool_handler(&mut self, handler: ToolHandler) {
        self.tool_handler = Some(handler);
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_response_in_progress(&self) -> bool {
        self.response_in_progress.load(Ordering::SeqCst)
    }

    /// Establish the session: open the transport (peer connection +
    /// microphone + data channel), exchange SDP through the signaling
    /// endpoint, and start the dispatch loop.
    ///
    /// Any step failure tears down every acquired resource before the error
    /// returns; a partial connection never leaks.
    pub async fn connect(
        &mut self,
    ) -> RealtimeResult<mpsc::UnboundedReceiver<RealtimeEvent>> {
        if self.dispatch_task.is_some() {
            return Err(RealtimeError::SessionActive);
        }
        *self.state.write() = ConnectionState::Connecting;
        self.disconnect_emitted.store(false, Ordering::SeqCst);
        self.ring.clear();

        let offer = match self.transport.lock().await.open().await {
            Ok(offer) => offer,
            Err(error) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(error);
            }
        };

        let answer = match self.signaling.exchange(&offer).await {
            Ok(answer) => answer,
            Err(error) => {
                let _ = self.transport.lock().await.close().await;
                *self.state.write() = ConnectionState::Disconnected;
                return Err(error);
            }
        };

        if let Err(error) = self.transport.lock().await.accept_answer(&answer).await {
            let _ = self.transport.lock().await.close().await;
            *self.state.write() = ConnectionState::Disconnected;
            return Err(error);
        }

        let transport_events = match self.transport.lock().await.take_events() {
            Some(events) => events,
            None => {
                let _ = self.transport.lock().await.close().await;
                *self.state.write() = ConnectionState::Disconnected;
                return Err(RealtimeError::ConnectionFailed(
                    "transport event stream unavailable".to_string(),
                ));
            }
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.event_tx = Some(event_tx.clone());

        let dispatcher = Dispatcher {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            event_tx,
            state: Arc::clone(&self.state),
            connected: Arc::clone(&self.connected),
            response_in_progress: Arc::clone(&self.response_in_progress),
            playback: self.playback.clone(),
            ring: Arc::clone(&self.ring),
            sampler_slot: Arc::clone(&self.sampler_slot),
            tool_handler: self.tool_handler.clone(),
            disconnect_emitted: Arc::clone(&self.disconnect_emitted),
            pending_calls: HashMap::new(),
        };
        self.dispatch_task = Some(tokio::spawn(dispatcher.run(transport_events)));

        Ok(event_rx)
    }

    /// Send a user text turn.
    ///
    /// Fails fast when the data channel is not open. When a response is
    /// already in progress the call logs and no-ops instead of queueing an
    /// overlapping generation. Exactly one `conversation.item.create` /
    /// `response.create` pair goes out per turn.
    pub async fn send_text(&self, text: &str) -> RealtimeResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RealtimeError::NotConnected);
        }
        if self
            .response_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("response already in progress, ignoring send_text");
            return Ok(());
        }

        let result = async {
            let transport = self.transport.lock().await;
            let item = ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(text),
            };
            transport.send(&item.to_json()?).await?;
            transport
                .send(&ClientEvent::ResponseCreate {}.to_json()?)
                .await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            self.response_in_progress.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Tear the session down: close the transport, stop playback and the
    /// sampler (which delivers its final zero), reset all flags.
    ///
    /// Idempotent; disconnecting an already-disconnected client is a no-op.
    pub async fn disconnect(&mut self) -> RealtimeResult<()> {
        self.transport.lock().await.close().await?;

        let sampler = self.sampler_slot.lock().take();
        if let Some(sampler) = sampler {
            sampler.stop();
        }
        self.playback.stop();

        self.connected.store(false, Ordering::SeqCst);
        self.response_in_progress.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Disconnected;

        if let Some(event_tx) = self.event_tx.take()
            && !self.disconnect_emitted.swap(true, Ordering::SeqCst)
        {
            let _ = event_tx.send(RealtimeEvent::Disconnected);
        }
        if let Some(task) = self.dispatch_task.take() {
            task.abort();
        }
        Ok(())
    }
}

// =============================================================================
// Dispatch loop
// =============================================================================

struct Dispatcher {
    config: RealtimeConfig,
    transport: SharedTransport,
    event_tx: mpsc::UnboundedSender<RealtimeEvent>,
    state: Arc<PlRwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    response_in_progress: Arc<AtomicBool>,
    playback: AudioPlayback,
    ring: Arc<AudioRing>,
    sampler_slot: Arc<PlMutex<Option<RmsSampler>>>,
    tool_handler: Option<ToolHandler>,
    disconnect_emitted: Arc<AtomicBool>,
    /// call_id -> function name, filled by `response.output_item.added`.
    pending_calls: HashMap<String, String>,
}

impl Dispatcher {
    async fn run(mut self, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::ChannelOpen => self.on_channel_open().await,
                TransportEvent::Message(text) => self.on_message(&text).await,
                TransportEvent::Closed => break,
            }
        }
        self.shutdown();
    }

    fn shutdown(&self) {
        let sampler = self.sampler_slot.lock().take();
        if let Some(sampler) = sampler {
            sampler.stop();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.response_in_progress.store(false, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Disconnected;
        if !self.disconnect_emitted.swap(true, Ordering::SeqCst) {
            let _ = self.event_tx.send(RealtimeEvent::Disconnected);
        }
        debug!("realtime dispatch loop ended");
    }

    async fn on_channel_open(&mut self) {
        info!("data channel open, session usable");
        self.connected.store(true, Ordering::SeqCst);
        *self.state.write() = ConnectionState::Connected;

        // Configure the session before anything else goes out.
        if let Err(error) = self.send_event(&self.session_update()).await {
            error!(%error, "failed to push session configuration");
        }
        let _ = self.event_tx.send(RealtimeEvent::Connected);

        // Remote audio starts flowing after this point; begin sampling.
        let sampler_tx = self.event_tx.clone();
        let sampler = RmsSampler::spawn(
            Arc::clone(&self.ring),
            Arc::new(move |rms| {
                let _ = sampler_tx.send(RealtimeEvent::Rms(rms));
            }),
        );
        if let Some(previous) = self.sampler_slot.lock().replace(sampler) {
            previous.stop();
        }
    }

    fn session_update(&self) -> ClientEvent {
        ClientEvent::SessionUpdate {
            session: SessionConfig {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                instructions: self.config.instructions.clone(),
                voice: self.config.voice.clone(),
                output_audio_format: Some("pcm16".to_string()),
                input_audio_transcription: Some(InputAudioTranscription {
                    model: "whisper-1".to_string(),
                }),
                tools: (!self.config.tools.is_empty()).then(|| self.config.tools.clone()),
            },
        }
    }

    async fn send_event(&self, event: &ClientEvent) -> RealtimeResult<()> {
        let payload = event.to_json()?;
        self.transport.lock().await.send(&payload).await
    }

    async fn on_message(&mut self, text: &str) {
        let event = match serde_json::from_str::<ServerEvent>(text) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "failed to parse server event");
                return;
            }
        };

        match event {
            ServerEvent::SessionCreated { session } => {
                info!(session_id = %session.id, "realtime session created");
            }

            ServerEvent::AudioDelta { delta, .. } => match BASE64.decode(&delta) {
                Ok(bytes) => {
                    let audio = AudioData::new(bytes, REMOTE_AUDIO_SAMPLE_RATE, 1);
                    self.ring.push(&audio.samples_mono_f32());
                    self.playback.append(audio);
                }
                Err(error) => warn!(%error, "failed to decode audio delta"),
            },

            ServerEvent::AudioDone => trace!("response audio complete"),

            ServerEvent::AudioTranscriptDelta { delta } => {
                let _ = self.event_tx.send(RealtimeEvent::TextDelta(delta));
            }

            ServerEvent::InputTranscriptionCompleted { transcript, .. } => {
                let _ = self
                    .event_tx
                    .send(RealtimeEvent::UserTranscript(transcript));
            }

            ServerEvent::OutputItemAdded { item } => {
                if item.item_type == "function_call"
                    && let (Some(call_id), Some(name)) = (item.call_id, item.name)
                {
                    debug!(%call_id, %name, "tracking pending function call");
                    self.pending_calls.insert(call_id, name);
                }
            }

            ServerEvent::FunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => {
                self.on_function_call(call_id, name, &arguments).await;
            }

            ServerEvent::ResponseDone { response } => {
                debug!(?response, "response done");
                self.response_in_progress.store(false, Ordering::SeqCst);
                let _ = self.event_tx.send(RealtimeEvent::ResponseDone);
            }

            ServerEvent::Error { error } => {
                error!(
                    error_type = ?error.error_type,
                    message = %error.message,
                    "realtime provider error"
                );
                // Clear the in-progress flag so one failed response cannot
                // lock the session out permanently.
                self.response_in_progress.store(false, Ordering::SeqCst);
                let _ = self.event_tx.send(RealtimeEvent::Error(error.message));
            }

            ServerEvent::Unknown => trace!("unhandled server event"),
        }
    }

    /// Tool-call round trip: surface the call, run the handler, and answer
    /// with a function-call output plus a fresh `response.create` so the
    /// conversation keeps moving.
    async fn on_function_call(
        &mut self,
        call_id: Option<String>,
        name: Option<String>,
        arguments: &str,
    ) {
        let name = name.or_else(|| {
            call_id
                .as_ref()
                .and_then(|id| self.pending_calls.remove(id))
        });
        let Some(name) = name else {
            warn!("function call without a resolvable name, skipping");
            return;
        };

        let arguments: serde_json::Value = match serde_json::from_str(arguments) {
            Ok(value) => value,
            Err(error) => {
                let _ = self.event_tx.send(RealtimeEvent::Error(format!(
                    "malformed tool arguments for {name}: {error}"
                )));
                return;
            }
        };

        let _ = self.event_tx.send(RealtimeEvent::ToolCall {
            name: name.clone(),
            arguments: arguments.clone(),
        });

        let Some(handler) = &self.tool_handler else {
            debug!(%name, "no tool handler registered, not answering call");
            return;
        };
        let result = handler(ToolCallRequest {
            call_id: call_id.clone(),
            name: name.clone(),
            arguments,
        })
        .await;

        if let Some(call_id) = call_id {
            let output = ClientEvent::ConversationItemCreate {
                item: ConversationItem::function_output(call_id, result.to_string()),
            };
            if let Err(error) = self.send_event(&output).await {
                error!(%error, "failed to send function call output");
                return;
            }
            if let Err(error) = self.send_event(&ClientEvent::ResponseCreate {}).await {
                error!(%error, "failed to request follow-up response");
                return;
            }
            self.response_in_progress.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted transport: records outbound payloads, lets tests inject
    /// inbound events, counts closes.
    struct MockTransport {
        sent: Arc<PlMutex<Vec<String>>>,
        closes: Arc<PlMutex<usize>>,
        inject: Option<mpsc::Receiver<TransportEvent>>,
        fail_open: bool,
    }

    struct MockHandles {
        sent: Arc<PlMutex<Vec<String>>>,
        closes: Arc<PlMutex<usize>>,
        inject: mpsc::Sender<TransportEvent>,
    }

    fn mock_transport(fail_open: bool) -> (MockTransport, MockHandles) {
        let (inject_tx, inject_rx) = mpsc::channel(32);
        let sent = Arc::new(PlMutex::new(Vec::new()));
        let closes = Arc::new(PlMutex::new(0));
        (
            MockTransport {
                sent: Arc::clone(&sent),
                closes: Arc::clone(&closes),
                inject: Some(inject_rx),
                fail_open,
            },
            MockHandles {
                sent,
                closes,
                inject: inject_tx,
            },
        )
    }

    #[async_trait]
    impl PeerTransport for MockTransport {
        async fn open(&mut self) -> RealtimeResult<String> {
            if self.fail_open {
                *self.closes.lock() += 1;
                return Err(RealtimeError::MediaError("mic denied".to_string()));
            }
            Ok("v=0\r\noffer".to_string())
        }

        async fn accept_answer(&mut self, _answer_sdp: &str) -> RealtimeResult<()> {
            Ok(())
        }

        async fn send(&self, payload: &str) -> RealtimeResult<()> {
            self.sent.lock().push(payload.to_string());
            Ok(())
        }

        fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
            self.inject.take()
        }

        async fn close(&mut self) -> RealtimeResult<()> {
            *self.closes.lock() += 1;
            Ok(())
        }
    }

    async fn signaling_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("v=0\r\nanswer"))
            .mount(&server)
            .await;
        server
    }

    async fn connected_client(
        server: &MockServer,
    ) -> (
        RealtimeClient,
        MockHandles,
        mpsc::UnboundedReceiver<RealtimeEvent>,
    ) {
        let (transport, handles) = mock_transport(false);
        let config = RealtimeConfig {
            signaling_url: server.uri(),
            ..Default::default()
        };
        let mut client = RealtimeClient::new(config, Box::new(transport)).unwrap();
        let events = client.connect().await.unwrap();
        handles.inject.send(TransportEvent::ChannelOpen).await.unwrap();
        // Let the dispatch task process the open.
        tokio::time::sleep(Duration::from_millis(20)).await;
        (client, handles, events)
    }

    fn sent_types(handles: &MockHandles) -> Vec<String> {
        handles
            .sent
            .lock()
            .iter()
            .map(|payload| {
                serde_json::from_str::<Value>(payload).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_connect_opens_session_and_pushes_config() {
        let server = signaling_server().await;
        let (client, handles, mut events) = connected_client(&server).await;

        assert!(client.is_connected());
        assert_eq!(client.connection_state(), ConnectionState::Connected);
        assert!(matches!(events.recv().await, Some(RealtimeEvent::Connected)));
        assert_eq!(sent_types(&handles), vec!["session.update"]);
    }

    #[tokio::test]
    async fn test_send_text_before_channel_open_fails_fast() {
        let server = signaling_server().await;
        let (transport, _handles) = mock_transport(false);
        let config = RealtimeConfig {
            signaling_url: server.uri(),
            ..Default::default()
        };
        let mut client = RealtimeClient::new(config, Box::new(transport)).unwrap();
        let _events = client.connect().await.unwrap();

        let error = client.send_text("hi").await.err().unwrap();
        assert!(matches!(error, RealtimeError::NotConnected));
    }

    #[tokio::test]
    async fn test_double_send_text_emits_exactly_one_pair() {
        let server = signaling_server().await;
        let (client, handles, _events) = connected_client(&server).await;

        client.send_text("first").await.unwrap();
        // Second call while the response is in progress: logged no-op.
        client.send_text("second").await.unwrap();

        let types = sent_types(&handles);
        assert_eq!(
            types,
            vec![
                "session.update",
                "conversation.item.create",
                "response.create"
            ]
        );
        assert!(client.is_response_in_progress());
    }

    #[tokio::test]
    async fn test_response_done_reopens_the_turn() {
        let server = signaling_server().await;
        let (client, handles, _events) = connected_client(&server).await;

        client.send_text("first").await.unwrap();
        handles
            .inject
            .send(TransportEvent::Message(
                r#"{"type":"response.done"}"#.to_string(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!client.is_response_in_progress());

        client.send_text("second").await.unwrap();
        let types = sent_types(&handles);
        assert_eq!(types.iter().filter(|t| *t == "response.create").count(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_clears_in_progress_flag() {
        let server = signaling_server().await;
        let (client, handles, mut events) = connected_client(&server).await;

        client.send_text("first").await.unwrap();
        handles
            .inject
            .send(TransportEvent::Message(
                r#"{"type":"error","error":{"message":"boom"}}"#.to_string(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!client.is_response_in_progress());
        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if let RealtimeEvent::Error(message) = event {
                assert_eq!(message, "boom");
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_tool_call_round_trip() {
        let server = signaling_server().await;
        let (transport, handles) = mock_transport(false);
        let config = RealtimeConfig {
            signaling_url: server.uri(),
            ..Default::default()
        };
        let mut client = RealtimeClient::new(config, Box::new(transport)).unwrap();
        let calls: Arc<PlMutex<Vec<String>>> = Arc::new(PlMutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        client.set_tool_handler(Arc::new(move |request| {
            seen.lock().push(request.name.clone());
            Box::pin(async move { json!({"ok": true}) })
        }));
        let mut events = client.connect().await.unwrap();
        handles.inject.send(TransportEvent::ChannelOpen).await.unwrap();

        handles
            .inject
            .send(TransportEvent::Message(
                r#"{"type":"response.function_call_arguments.done","call_id":"c1","name":"lookup","arguments":"{\"q\":\"weather\"}"}"#
                    .to_string(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(*calls.lock(), vec!["lookup".to_string()]);
        let types = sent_types(&handles);
        // session.update, then the function output + follow-up response.
        assert_eq!(
            types,
            vec![
                "session.update",
                "conversation.item.create",
                "response.create"
            ]
        );
        let output: Value =
            serde_json::from_str(&handles.sent.lock()[1]).unwrap();
        assert_eq!(output["item"]["type"], "function_call_output");
        assert_eq!(output["item"]["call_id"], "c1");
        assert!(client.is_response_in_progress());

        let mut saw_tool_call = false;
        while let Ok(event) = events.try_recv() {
            if let RealtimeEvent::ToolCall { name, arguments } = event {
                assert_eq!(name, "lookup");
                assert_eq!(arguments["q"], "weather");
                saw_tool_call = true;
            }
        }
        assert!(saw_tool_call);
    }

    #[tokio::test]
    async fn test_function_name_resolved_from_output_item() {
        let server = signaling_server().await;
        let (client, handles, mut events) = connected_client(&server).await;
        drop(client);

        handles
            .inject
            .send(TransportEvent::Message(
                r#"{"type":"response.output_item.added","item":{"type":"function_call","call_id":"c9","name":"set_emotion"}}"#
                    .to_string(),
            ))
            .await
            .unwrap();
        handles
            .inject
            .send(TransportEvent::Message(
                r#"{"type":"response.function_call_arguments.done","call_id":"c9","arguments":"{\"emotion\":\"happy\"}"}"#
                    .to_string(),
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RealtimeEvent::ToolCall { name, .. } = event {
                names.push(name);
            }
        }
        assert_eq!(names, vec!["set_emotion".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_open_does_not_leak() {
        let server = signaling_server().await;
        let (transport, handles) = mock_transport(true);
        let config = RealtimeConfig {
            signaling_url: server.uri(),
            ..Default::default()
        };
        let mut client = RealtimeClient::new(config, Box::new(transport)).unwrap();
        let error = client.connect().await.err().unwrap();
        assert!(matches!(error, RealtimeError::MediaError(_)));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        // The transport reported cleanup (mock counts its own teardown).
        assert_eq!(*handles.closes.lock(), 1);
        // The session can be retried... but the mock's event stream is gone,
        // which is the transport's concern, not the client's.
    }

    #[tokio::test]
    async fn test_failed_signaling_closes_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("nope"))
            .mount(&server)
            .await;

        let (transport, handles) = mock_transport(false);
        let config = RealtimeConfig {
            signaling_url: server.uri(),
            ..Default::default()
        };
        let mut client = RealtimeClient::new(config, Box::new(transport)).unwrap();
        let error = client.connect().await.err().unwrap();
        assert!(matches!(
            error,
            RealtimeError::SignalingFailed { status: 500, .. }
        ));
        assert_eq!(*handles.closes.lock(), 1);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_delivers_final_zero() {
        let server = signaling_server().await;
        let (mut client, handles, mut events) = connected_client(&server).await;

        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        let closes_after_first = *handles.closes.lock();

        client.disconnect().await.unwrap();
        assert_eq!(*handles.closes.lock(), closes_after_first + 1);

        let mut samples = Vec::new();
        let mut disconnects = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                RealtimeEvent::Rms(value) => samples.push(value),
                RealtimeEvent::Disconnected => disconnects += 1,
                _ => {}
            }
        }
        assert_eq!(disconnects, 1);
        assert_eq!(samples.last().copied(), Some(0.0));
    }

    #[tokio::test]
    async fn test_transport_closed_ends_session() {
        let server = signaling_server().await;
        let (client, handles, mut events) = connected_client(&server).await;

        handles.inject.send(TransportEvent::Closed).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!client.is_connected());
        let mut saw_disconnected = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RealtimeEvent::Disconnected) {
                saw_disconnected = true;
            }
        }
        assert!(saw_disconnected);
    }
}
