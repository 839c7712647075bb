//! Chunked streaming playback.
//!
//! A [`StreamPlaybackFeeder`] pulls an audio byte stream from an
//! [`AudioStreamSource`] and pushes it into a [`PlaybackSink`] one chunk at a
//! time. Playback is gated behind a small priming window so that the sink
//! has a few chunks queued before it starts consuming, and every append waits
//! for the sink's update-complete signal before the next network read, so the
//! reader never runs ahead of the sink.
//!
//! Sinks are owned by the caller through a [`SinkSlot`]. The feeder only
//! holds a weak [`SinkHandle`], which means replacing the sink in the slot is
//! enough to retire an in-flight feeder.
mod error;
mod feeder;
mod session;
mod sink;
mod source;

use std::fmt;

pub use error::FeederError;
pub use feeder::{BufferState, FeedOutcome, FeederConfig, StreamPlaybackFeeder};
pub use session::{PlaybackSession, PlaybackTask};
pub use sink::{PlaybackSink, SinkError, SinkHandle, SinkSlot};
pub use source::{AudioStreamSource, ChunkStream, SourceError};

/// MIME type of every audio stream handled by the system.
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// Number of chunks buffered before the first append.
pub const DEFAULT_PRIME_CHUNKS: usize = 3;

/// A single synthesis request. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    auth_token: String,
    text: String,
    voice_id: String,
}

impl PlaybackRequest {
    pub fn new(
        auth_token: impl Into<String>,
        text: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            text: text.into(),
            voice_id: voice_id.into(),
        }
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }

    /// Whitespace-only text never reaches the network.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

// The bearer token must not end up in logs.
impl fmt::Debug for PlaybackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackRequest")
            .field("auth_token", &"<redacted>")
            .field("text_len", &self.text.len())
            .field("voice_id", &self.voice_id)
            .finish()
    }
}
