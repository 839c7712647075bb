use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::FeederError;
use crate::feeder::{BufferState, FeedOutcome, FeederConfig, StreamPlaybackFeeder};
use crate::sink::{PlaybackSink, SinkSlot};
use crate::source::AudioStreamSource;
use crate::PlaybackRequest;

/// One listener's playback context: a source, a sink slot and the feeder
/// currently writing into it.
///
/// Nothing here is global. Each connection gets its own session, and a new
/// request supersedes the previous one by installing a fresh sink.
pub struct PlaybackSession<S> {
    source: Arc<dyn AudioStreamSource>,
    config: FeederConfig,
    slot: SinkSlot<S>,
}

/// A spawned feeder run.
pub struct PlaybackTask {
    pub state: watch::Receiver<BufferState>,
    pub handle: JoinHandle<Result<FeedOutcome, FeederError>>,
}

impl<S> PlaybackSession<S>
where
    S: PlaybackSink + 'static,
{
    pub fn new(source: Arc<dyn AudioStreamSource>, config: FeederConfig) -> Self {
        Self {
            source,
            config,
            slot: SinkSlot::new(),
        }
    }

    pub fn config(&self) -> &FeederConfig {
        &self.config
    }

    /// The sink the live feeder is writing to, if any.
    pub fn current_sink(&self) -> Option<Arc<S>> {
        self.slot.current()
    }

    /// Replace the sink and start feeding `request` into it.
    ///
    /// Whatever feeder was running against the previous sink loses its
    /// target and fails at its next sink operation.
    pub fn speak(&self, request: PlaybackRequest, sink: S) -> PlaybackTask {
        let handle = self.slot.install(sink);
        let feeder = StreamPlaybackFeeder::new(self.source.clone(), self.config.clone());
        let state = feeder.subscribe();
        let handle = tokio::spawn(async move { feeder.run(&request, &handle).await });
        PlaybackTask { state, handle }
    }

    /// Drop the current sink, retiring any in-flight feeder.
    pub fn stop(&self) -> bool {
        self.slot.clear()
    }
}
