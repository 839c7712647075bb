mod error;
mod stream;
mod voices;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, warn};

pub use error::ClientError;
pub use voices::{promote_voice, Voice, VoiceLanguage, VoiceModel};

/// Upstream used when `SPEECHIFY_API` is not set.
pub const DEFAULT_API_BASE: &str = "https://api.sws.speechify.com";

/// Scopes requested for client-side access tokens.
pub const TOKEN_SCOPE: &str = "audio:all voices:all";

/// Hands out short-lived bearer tokens for the synthesis endpoint.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn issue_token(&self) -> Result<String, ClientError>;
}

/// Lists the voices the upstream offers, in upstream order.
#[async_trait]
pub trait VoiceCatalog: Send + Sync {
    async fn list_voices(&self) -> Result<Vec<Voice>, ClientError>;
}

/// Body of the client-credentials token request
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    scope: &'a str,
}

/// Token endpoint response
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for a Speechify-compatible speech API.
///
/// The API key only ever leaves the process towards the upstream. Browsers
/// get a scoped access token from [`TokenProvider::issue_token`] instead.
#[derive(Clone)]
pub struct SpeechClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SpeechClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Reads `SPEECHIFY_API` (optional) and `SPEECHIFY_API_KEY`.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = env::var("SPEECHIFY_API")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = env::var("SPEECHIFY_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ClientError::MissingApiKey)?;
        Ok(Self::new(&base_url, &api_key))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl TokenProvider for SpeechClient {
    async fn issue_token(&self) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url("/v1/auth/token"))
            .bearer_auth(&self.api_key)
            .form(&TokenRequest {
                grant_type: "client_credentials",
                scope: TOKEN_SCOPE,
            })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let details = response.text().await.unwrap_or_default();
            warn!("Token error: {details}");
            return Err(ClientError::Unauthorized { details });
        }

        let token = response.json::<TokenResponse>().await?;
        debug!("issued access token");
        Ok(token.access_token)
    }
}

#[async_trait]
impl VoiceCatalog for SpeechClient {
    async fn list_voices(&self) -> Result<Vec<Voice>, ClientError> {
        let response = self
            .http
            .get(self.url("/v1/voices"))
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "*/*")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let details = response.text().await.unwrap_or_default();
            return Err(ClientError::Upstream {
                status: status.as_u16(),
                details,
            });
        }

        let voices = response.json::<Vec<Voice>>().await?;
        debug!("fetched {} voices", voices.len());
        Ok(voices)
    }
}
