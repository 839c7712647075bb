use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink closed")]
    Closed,

    #[error("sink rejected the operation: {0}")]
    Rejected(String),

    #[error("sink was replaced or torn down")]
    Detached,
}

/// A media buffer that accepts one outstanding append at a time.
///
/// `append` resolves only once the sink reports that the update finished,
/// so callers awaiting it never have two appends in flight.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Whether the underlying media container is open for appends.
    fn is_open(&self) -> bool;

    /// Resolves once the container is open. Returns immediately if it
    /// already is.
    async fn opened(&self) -> Result<(), SinkError>;

    async fn append(&self, chunk: Bytes) -> Result<(), SinkError>;

    async fn start_playback(&self) -> Result<(), SinkError>;
}

/// Non-owning reference to a sink held in a [`SinkSlot`].
pub struct SinkHandle<S: ?Sized> {
    target: Weak<S>,
}

impl<S: ?Sized> SinkHandle<S> {
    pub fn get(&self) -> Result<Arc<S>, SinkError> {
        self.target.upgrade().ok_or(SinkError::Detached)
    }

    pub fn is_attached(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl<S: ?Sized> Clone for SinkHandle<S> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

/// Holds the only owning reference to the current sink.
///
/// Installing a sink drops the previous one, so handles given out for it
/// stop resolving and whichever feeder was writing to it fails with
/// [`SinkError::Detached`] on its next operation.
pub struct SinkSlot<S: ?Sized> {
    current: Mutex<Option<Arc<S>>>,
}

impl<S> SinkSlot<S> {
    pub fn install(&self, sink: S) -> SinkHandle<S> {
        self.install_arc(Arc::new(sink))
    }
}

impl<S: ?Sized> SinkSlot<S> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    pub fn install_arc(&self, sink: Arc<S>) -> SinkHandle<S> {
        let handle = SinkHandle {
            target: Arc::downgrade(&sink),
        };
        let previous = self.lock().replace(sink);
        if previous.is_some() {
            tracing::debug!("replaced playback sink");
        }
        handle
    }

    pub fn current(&self) -> Option<Arc<S>> {
        self.lock().clone()
    }

    /// Tear down the current sink without installing a new one.
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<S>>> {
        // The slot only ever holds an Option<Arc>; a poisoned lock still has
        // a consistent value.
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: ?Sized> Default for SinkSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}
