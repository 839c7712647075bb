//! WebSocket playback sessions.
//!
//! The browser side owns the real media buffer. This module adapts it to a
//! [`PlaybackSink`]: audio chunks go out as binary frames, and the client
//! answers each one with an `updateend` message once its buffer finished
//! updating. Every speak request first sends a `reset` telling the client to
//! tear down its media container and open a fresh one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use playback_core::{
    FeedOutcome, PlaybackRequest, PlaybackSession, PlaybackSink, PlaybackTask,
    SinkError,
};
use serde::Deserialize;
use serde_json::json;
use speech_api::TokenProvider;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::validation::validate_speak_request;
use crate::AppState;

/// Messages the client sends over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "speak")]
    Speak {
        text: String,
        voice_id: String,
        #[serde(default)]
        token: Option<String>,
    },
    #[serde(rename = "sourceopen")]
    SourceOpen,
    #[serde(rename = "updateend")]
    UpdateEnd,
    #[serde(rename = "append_error")]
    AppendError {
        #[serde(default)]
        message: String,
    },
    #[serde(rename = "stop")]
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Complete,
    NoPlayback,
    Skipped,
}

impl PlaybackStatus {
    fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Complete => "complete",
            PlaybackStatus::NoPlayback => "no_playback",
            PlaybackStatus::Skipped => "skipped",
        }
    }
}

/// Messages the server sends besides binary audio frames.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Reset { mime: String },
    Play,
    Status(PlaybackStatus),
    Error { error: String, code: u16 },
}

impl ServerMessage {
    pub fn to_message(&self) -> Message {
        let value = match self {
            ServerMessage::Reset { mime } => json!({ "type": "reset", "mime": mime }),
            ServerMessage::Play => json!({ "type": "play" }),
            ServerMessage::Status(status) => json!({ "type": "status", "status": status.as_str() }),
            ServerMessage::Error { error, code } => {
                json!({ "type": "error", "error": error, "code": code })
            }
        };
        Message::Text(value.to_string().into())
    }

    fn from_api_error(err: &ApiError) -> Self {
        ServerMessage::Error {
            error: err.to_string(),
            code: err.status_code().as_u16(),
        }
    }
}

/// Control signals routed from the client to the sink of the current request.
#[derive(Debug)]
pub enum SinkEvent {
    Open,
    UpdateEnd,
    AppendFailed(String),
}

/// Outgoing half of a connection.
///
/// Every sink is stamped with the generation it was created for. A send
/// from an older generation is refused, and the check happens under the
/// same lock that `advance` takes to send `reset`, so no stale frame can
/// follow a reset on the wire.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Message>,
    generation: Arc<Mutex<u64>>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            tx,
            generation: Arc::new(Mutex::new(0)),
        }
    }

    pub async fn send(&self, message: &ServerMessage) -> Result<(), SinkError> {
        self.tx
            .send(message.to_message())
            .await
            .map_err(|_| SinkError::Closed)
    }

    pub async fn send_for(&self, generation: u64, message: Message) -> Result<(), SinkError> {
        let current = self.generation.lock().await;
        if *current != generation {
            return Err(SinkError::Detached);
        }
        self.tx.send(message).await.map_err(|_| SinkError::Closed)
    }

    /// Start a new generation, optionally announcing it to the client.
    pub async fn advance(&self, announce: Option<&ServerMessage>) -> u64 {
        let mut current = self.generation.lock().await;
        *current += 1;
        if let Some(message) = announce {
            if self.tx.send(message.to_message()).await.is_err() {
                debug!("client gone before reset");
            }
        }
        *current
    }
}

/// Sender side for one sink's control events. Dropping it detaches the sink.
pub struct SinkControl {
    tx: mpsc::UnboundedSender<SinkEvent>,
    open: Arc<AtomicBool>,
}

impl SinkControl {
    pub fn deliver(&self, event: SinkEvent) {
        if matches!(event, SinkEvent::Open) {
            self.open.store(true, Ordering::SeqCst);
        }
        if let Err(e) = self.tx.send(event) {
            debug!(event = ?e.0, "sink detached, dropping event");
        }
    }
}

/// [`PlaybackSink`] backed by a browser media buffer on the other end of a
/// WebSocket.
pub struct WsSink {
    outbound: Outbound,
    generation: u64,
    open: Arc<AtomicBool>,
    events: Mutex<mpsc::UnboundedReceiver<SinkEvent>>,
}

impl WsSink {
    pub fn new(outbound: Outbound, generation: u64) -> (Self, SinkControl) {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let sink = Self {
            outbound,
            generation,
            open: open.clone(),
            events: Mutex::new(rx),
        };
        (sink, SinkControl { tx, open })
    }
}

#[async_trait]
impl PlaybackSink for WsSink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn opened(&self) -> Result<(), SinkError> {
        let mut events = self.events.lock().await;
        while !self.is_open() {
            match events.recv().await {
                Some(SinkEvent::Open) => break,
                Some(SinkEvent::UpdateEnd) => continue,
                Some(SinkEvent::AppendFailed(reason)) => return Err(SinkError::Rejected(reason)),
                None => return Err(SinkError::Detached),
            }
        }
        Ok(())
    }

    async fn append(&self, chunk: Bytes) -> Result<(), SinkError> {
        let mut events = self.events.lock().await;
        // Nothing is outstanding yet, so a queued updateend belongs to a
        // buffer the client already tore down.
        while let Ok(event) = events.try_recv() {
            match event {
                SinkEvent::AppendFailed(reason) => return Err(SinkError::Rejected(reason)),
                stale => debug!(event = ?stale, "discarding event queued before append"),
            }
        }
        self.outbound
            .send_for(self.generation, Message::Binary(chunk))
            .await?;
        loop {
            match events.recv().await {
                Some(SinkEvent::UpdateEnd) => return Ok(()),
                Some(SinkEvent::Open) => continue,
                Some(SinkEvent::AppendFailed(reason)) => return Err(SinkError::Rejected(reason)),
                None => return Err(SinkError::Detached),
            }
        }
    }

    async fn start_playback(&self) -> Result<(), SinkError> {
        self.outbound
            .send_for(self.generation, ServerMessage::Play.to_message())
            .await
    }
}

/// Per-connection bearer token, fetched lazily and dropped when upstream
/// rejects it.
pub struct Credentials {
    provider: Arc<dyn TokenProvider>,
    cached: Mutex<Option<String>>,
}

impl Credentials {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.provider.issue_token().await.map_err(|e| {
            warn!("token request failed: {e}");
            ApiError::Unauthorized
        })?;
        *cached = Some(token.clone());
        Ok(token)
    }

    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}

/// State of one connected client.
struct Connection {
    state: AppState,
    session: PlaybackSession<WsSink>,
    outbound: Outbound,
    control: Option<SinkControl>,
    credentials: Arc<Credentials>,
}

impl Connection {
    fn new(state: AppState, outbound: Outbound) -> Self {
        let session = PlaybackSession::new(state.audio.clone(), state.config.feeder_config());
        let credentials = Arc::new(Credentials::new(state.tokens.clone()));
        Self {
            state,
            session,
            outbound,
            control: None,
            credentials,
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                let err = ApiError::InvalidInput(format!("Invalid message: {e}"));
                let _ = self.outbound.send(&ServerMessage::from_api_error(&err)).await;
                return;
            }
        };

        match message {
            ClientMessage::Speak {
                text,
                voice_id,
                token,
            } => self.speak(text, voice_id, token).await,
            ClientMessage::SourceOpen => self.deliver(SinkEvent::Open),
            ClientMessage::UpdateEnd => self.deliver(SinkEvent::UpdateEnd),
            ClientMessage::AppendError { message } => self.deliver(SinkEvent::AppendFailed(message)),
            ClientMessage::Stop => self.stop().await,
        }
    }

    fn deliver(&self, event: SinkEvent) {
        match &self.control {
            Some(control) => control.deliver(event),
            None => debug!(?event, "no active sink, dropping event"),
        }
    }

    async fn speak(&mut self, text: String, voice_id: String, token: Option<String>) {
        self.state.count_request();

        if let Err(e) = validate_speak_request(&text, &voice_id) {
            let _ = self.outbound.send(&ServerMessage::from_api_error(&e)).await;
            return;
        }
        if text.trim().is_empty() {
            let _ = self
                .outbound
                .send(&ServerMessage::Status(PlaybackStatus::Skipped))
                .await;
            return;
        }

        let token = match token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => match self.credentials.token().await {
                Ok(token) => token,
                Err(e) => {
                    let _ = self.outbound.send(&ServerMessage::from_api_error(&e)).await;
                    return;
                }
            },
        };

        let reset = ServerMessage::Reset {
            mime: self.session.config().mime_type.clone(),
        };
        let generation = self.outbound.advance(Some(&reset)).await;
        let (sink, control) = WsSink::new(self.outbound.clone(), generation);
        // Dropping the previous control detaches whatever feeder was waiting
        // on the old sink.
        self.control = Some(control);

        info!(generation, voice_id = %voice_id, text_len = text.len(), "starting playback");
        let task = self
            .session
            .speak(PlaybackRequest::new(token, text, voice_id), sink);
        tokio::spawn(report(
            task,
            self.outbound.clone(),
            generation,
            self.credentials.clone(),
        ));
    }

    async fn stop(&mut self) {
        self.outbound.advance(None).await;
        self.control = None;
        self.session.stop();
    }
}

/// Wait for a feeder run and tell the client how it ended.
async fn report(task: PlaybackTask, outbound: Outbound, generation: u64, credentials: Arc<Credentials>) {
    let result = match task.handle.await {
        Ok(result) => result,
        Err(e) => {
            warn!("playback task failed: {e}");
            let err = ApiError::InternalError(format!("Task join error: {e}"));
            let _ = outbound
                .send_for(generation, ServerMessage::from_api_error(&err).to_message())
                .await;
            return;
        }
    };

    let message = match result {
        Ok(FeedOutcome::Closed { chunks, bytes }) => {
            debug!(generation, chunks, bytes, "playback stream complete");
            ServerMessage::Status(PlaybackStatus::Complete)
        }
        Ok(FeedOutcome::InsufficientPrime { .. }) => ServerMessage::Status(PlaybackStatus::NoPlayback),
        Ok(FeedOutcome::Skipped) => ServerMessage::Status(PlaybackStatus::Skipped),
        Err(e) if e.is_superseded() => return,
        Err(e) => {
            if e.is_unauthorized() {
                credentials.invalidate().await;
            }
            ServerMessage::from_api_error(&ApiError::from(e))
        }
    };
    let _ = outbound.send_for(generation, message.to_message()).await;
}

pub async fn speak_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, state))
}

async fn run_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(32);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sender.send(message).await {
                warn!("Failed to send WS message: {e}");
                break;
            }
        }
        let _ = sender.close().await;
    });

    let sessions = state.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
    info!(sessions, "playback session opened");

    let mut connection = Connection::new(state.clone(), Outbound::new(tx));
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_text(text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WS receive error: {e}");
                break;
            }
        }
    }

    connection.stop().await;
    drop(connection);
    writer.abort();

    let sessions = state.active_sessions.fetch_sub(1, Ordering::Relaxed) - 1;
    info!(sessions, "playback session closed");
}
