use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::FeederError;
use crate::sink::{PlaybackSink, SinkHandle};
use crate::source::AudioStreamSource;
use crate::{PlaybackRequest, AUDIO_MIME_TYPE, DEFAULT_PRIME_CHUNKS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Collecting the priming window.
    Priming,
    /// Flushing the primed window into the sink.
    Draining,
    /// Playback started, chunks go straight to the sink.
    Playing,
    Closed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FeederConfig {
    /// Chunks buffered before the first append. Picked to absorb initial
    /// network jitter; it has no relation to the audio encoding.
    pub prime_chunks: usize,
    pub mime_type: String,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            prime_chunks: DEFAULT_PRIME_CHUNKS,
            mime_type: AUDIO_MIME_TYPE.to_string(),
        }
    }
}

impl FeederConfig {
    /// A window of zero would never trigger playback, so it is clamped to one.
    pub fn with_prime_chunks(mut self, prime_chunks: usize) -> Self {
        self.prime_chunks = prime_chunks.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Blank text; nothing was requested.
    Skipped,
    /// The stream ended after playback started.
    Closed { chunks: usize, bytes: usize },
    /// The stream ended inside the priming window. The buffered chunks were
    /// dropped and playback never started.
    InsufficientPrime { buffered: usize },
}

/// Feeds one synthesis stream into one sink.
///
/// A feeder is single use: [`run`](Self::run) consumes it. Its
/// [`BufferState`] can be followed through [`subscribe`](Self::subscribe).
pub struct StreamPlaybackFeeder<Src: ?Sized> {
    source: Arc<Src>,
    config: FeederConfig,
    state: watch::Sender<BufferState>,
}

impl<Src> StreamPlaybackFeeder<Src>
where
    Src: AudioStreamSource + ?Sized,
{
    pub fn new(source: Arc<Src>, config: FeederConfig) -> Self {
        let (state, _) = watch::channel(BufferState::Priming);
        Self {
            source,
            config,
            state,
        }
    }

    pub fn state(&self) -> BufferState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BufferState> {
        self.state.subscribe()
    }

    pub async fn run<S>(
        self,
        request: &PlaybackRequest,
        sink: &SinkHandle<S>,
    ) -> Result<FeedOutcome, FeederError>
    where
        S: PlaybackSink + ?Sized,
    {
        match self.feed(request, sink).await {
            Ok(outcome) => {
                self.transition(BufferState::Closed);
                Ok(outcome)
            }
            Err(err) => {
                self.transition(BufferState::Failed);
                if err.is_superseded() {
                    debug!("feeder superseded: {err}");
                } else {
                    warn!(voice_id = request.voice_id(), "playback failed: {err}");
                }
                Err(err)
            }
        }
    }

    async fn feed<S>(
        &self,
        request: &PlaybackRequest,
        sink: &SinkHandle<S>,
    ) -> Result<FeedOutcome, FeederError>
    where
        S: PlaybackSink + ?Sized,
    {
        if request.is_blank() {
            debug!("blank text, nothing to play");
            return Ok(FeedOutcome::Skipped);
        }
        if request.auth_token().is_empty() {
            return Err(FeederError::Credential);
        }

        let target = sink.get().map_err(FeederError::SinkUnavailable)?;
        if !target.is_open() {
            debug!("waiting for sink to open");
            target.opened().await.map_err(FeederError::SinkUnavailable)?;
        }
        drop(target);

        let mut stream = self.source.open_stream(request).await?;
        debug!(mime = %self.config.mime_type, "audio stream opened");

        let window = self.config.prime_chunks;
        let mut primed: Vec<Bytes> = Vec::with_capacity(window);
        let mut started = false;
        let mut chunks = 0usize;
        let mut bytes = 0usize;

        while let Some(next) = stream.next().await {
            let chunk = next.map_err(FeederError::from)?;
            chunks += 1;
            bytes += chunk.len();

            if started {
                append(sink, chunk).await?;
                continue;
            }

            primed.push(chunk);
            if primed.len() == window {
                self.transition(BufferState::Draining);
                for chunk in primed.drain(..) {
                    append(sink, chunk).await?;
                }
                self.transition(BufferState::Playing);
                sink.get()
                    .map_err(FeederError::PlaybackRejected)?
                    .start_playback()
                    .await
                    .map_err(FeederError::PlaybackRejected)?;
                started = true;
            }
        }

        if started {
            debug!(chunks, bytes, "audio stream finished");
            Ok(FeedOutcome::Closed { chunks, bytes })
        } else {
            warn!(
                buffered = primed.len(),
                window, "stream ended inside the priming window, dropping buffered audio"
            );
            Ok(FeedOutcome::InsufficientPrime {
                buffered: primed.len(),
            })
        }
    }

    fn transition(&self, next: BufferState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(?previous, ?next, "buffer state");
        }
    }
}

/// Append one chunk and wait for the sink's update-complete signal.
async fn append<S>(sink: &SinkHandle<S>, chunk: Bytes) -> Result<(), FeederError>
where
    S: PlaybackSink + ?Sized,
{
    let target = sink.get().map_err(FeederError::AppendRejected)?;
    target
        .append(chunk)
        .await
        .map_err(FeederError::AppendRejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FeederConfig::default();
        assert_eq!(config.prime_chunks, 3);
        assert_eq!(config.mime_type, "audio/mpeg");
    }

    #[test]
    fn test_prime_window_is_at_least_one() {
        assert_eq!(FeederConfig::default().with_prime_chunks(0).prime_chunks, 1);
        assert_eq!(FeederConfig::default().with_prime_chunks(5).prime_chunks, 5);
    }
}
