use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("SPEECHIFY_API_KEY must be set in the environment")]
    MissingApiKey,

    #[error("Unauthorized")]
    Unauthorized { details: String },

    #[error("upstream returned {status}: {details}")]
    Upstream { status: u16, details: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}
