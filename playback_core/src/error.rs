use thiserror::Error;

use crate::sink::SinkError;
use crate::source::SourceError;

/// Terminal failures of a single feeder run. None of them are retried.
#[derive(Debug, Error)]
pub enum FeederError {
    #[error("missing credential")]
    Credential,

    #[error("remote error (status {status:?}): {details}")]
    Remote {
        status: Option<u16>,
        details: String,
    },

    #[error("response carried no body")]
    EmptyBody,

    #[error("stream read failed: {0}")]
    Read(String),

    #[error("sink unavailable: {0}")]
    SinkUnavailable(SinkError),

    #[error("append rejected: {0}")]
    AppendRejected(SinkError),

    #[error("playback start rejected: {0}")]
    PlaybackRejected(SinkError),
}

impl FeederError {
    /// The sink was swapped out from under the feeder by a newer request.
    pub fn is_superseded(&self) -> bool {
        matches!(
            self,
            FeederError::SinkUnavailable(SinkError::Detached)
                | FeederError::AppendRejected(SinkError::Detached)
                | FeederError::PlaybackRejected(SinkError::Detached)
        )
    }

    /// Upstream refused the credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            FeederError::Credential | FeederError::Remote { status: Some(401), .. }
        )
    }
}

impl From<SourceError> for FeederError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Remote { status, details } => FeederError::Remote { status, details },
            SourceError::EmptyBody => FeederError::EmptyBody,
            SourceError::Read(msg) => FeederError::Read(msg),
        }
    }
}
