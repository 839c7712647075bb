//! Synthesis stream endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use playback_core::{AudioStreamSource, ChunkStream, PlaybackRequest, SourceError, AUDIO_MIME_TYPE};
use reqwest::header;
use serde::Serialize;
use tracing::debug;

use crate::SpeechClient;

#[derive(Serialize)]
struct StreamRequest<'a> {
    input: &'a str,
    voice_id: &'a str,
}

#[async_trait]
impl AudioStreamSource for SpeechClient {
    /// Starts `POST /v1/audio/stream` with the caller's access token, not
    /// the API key, the same call a browser would make directly.
    async fn open_stream(&self, request: &PlaybackRequest) -> Result<ChunkStream, SourceError> {
        let response = self
            .http
            .post(self.url("/v1/audio/stream"))
            .bearer_auth(request.auth_token())
            .header(header::ACCEPT, AUDIO_MIME_TYPE)
            .json(&StreamRequest {
                input: request.text(),
                voice_id: request.voice_id(),
            })
            .send()
            .await
            .map_err(|e| SourceError::Remote {
                status: None,
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(SourceError::Remote {
                status: Some(status.as_u16()),
                details,
            });
        }
        if response.content_length() == Some(0) {
            return Err(SourceError::EmptyBody);
        }

        let mut body = Box::pin(response.bytes_stream());
        let voice_id = request.voice_id().to_string();
        Ok(Box::pin(async_stream::stream! {
            let mut total = 0usize;
            while let Some(item) = body.next().await {
                match item {
                    Ok(chunk) => {
                        total += chunk.len();
                        yield Ok::<Bytes, SourceError>(chunk);
                    }
                    Err(e) => {
                        yield Err(SourceError::Read(e.to_string()));
                        break;
                    }
                }
            }
            debug!(voice_id = %voice_id, total, "upstream audio stream ended");
        }))
    }
}
