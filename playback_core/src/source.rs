use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use thiserror::Error;

use crate::PlaybackRequest;

/// Live audio byte stream, yielded in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

#[derive(Debug, Error)]
pub enum SourceError {
    /// Upstream answered with a non-success status, or could not be reached
    /// at all (`status` is `None` then).
    #[error("remote error (status {status:?}): {details}")]
    Remote {
        status: Option<u16>,
        details: String,
    },

    #[error("response carried no body")]
    EmptyBody,

    #[error("stream read failed: {0}")]
    Read(String),
}

impl SourceError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SourceError::Remote { status: Some(401), .. })
    }
}

/// Starts a synthesis request and hands back its audio stream.
#[async_trait]
pub trait AudioStreamSource: Send + Sync {
    async fn open_stream(&self, request: &PlaybackRequest) -> Result<ChunkStream, SourceError>;
}
