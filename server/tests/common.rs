//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use playback_core::{AudioStreamSource, ChunkStream, PlaybackRequest, SourceError};
use server::{build_router, config::ServerConfig, AppState};
use speech_api::{ClientError, TokenProvider, Voice, VoiceCatalog};
use tokio::net::TcpListener;

pub const VALID_TOKEN: &str = "tok-1";

pub struct FakeTokens {
    pub fail: bool,
    pub issued: AtomicUsize,
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn issue_token(&self) -> Result<String, ClientError> {
        if self.fail {
            return Err(ClientError::Unauthorized {
                details: "bad api key".to_string(),
            });
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(VALID_TOKEN.to_string())
    }
}

pub struct FakeVoices {
    pub fail: bool,
}

fn voice(id: &str, name: &str) -> Voice {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "display_name": name,
        "models": [{ "name": "simba-english", "languages": [{ "locale": "en-US" }] }]
    }))
    .unwrap()
}

#[async_trait]
impl VoiceCatalog for FakeVoices {
    async fn list_voices(&self) -> Result<Vec<Voice>, ClientError> {
        if self.fail {
            return Err(ClientError::Upstream {
                status: 503,
                details: "maintenance".to_string(),
            });
        }
        Ok(vec![
            voice("henry", "Henry"),
            voice("lisa", "Lisa"),
            voice("silky", "SilkyJohnson2"),
        ])
    }
}

/// Chunk sizes the fake upstream streams back for a given text.
pub fn script_for(text: &str) -> Vec<usize> {
    match text {
        "Hello" => vec![10, 10, 10, 5, 5],
        "Hi" => vec![4, 4],
        "Long" => vec![2; 6],
        _ => vec![1, 1, 1],
    }
}

pub struct FakeAudio;

#[async_trait]
impl AudioStreamSource for FakeAudio {
    async fn open_stream(&self, request: &PlaybackRequest) -> Result<ChunkStream, SourceError> {
        if request.auth_token() != VALID_TOKEN {
            return Err(SourceError::Remote {
                status: Some(401),
                details: "token expired".to_string(),
            });
        }
        let chunks: Vec<Result<Bytes, SourceError>> = script_for(request.text())
            .into_iter()
            .map(|size| Ok(Bytes::from(vec![7u8; size])))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(chunks)))
    }
}

pub struct TestApp {
    pub router: Router,
    pub tokens: Arc<FakeTokens>,
    pub state: AppState,
}

pub fn create_test_app_with(tokens_fail: bool, voices_fail: bool) -> TestApp {
    let tokens = Arc::new(FakeTokens {
        fail: tokens_fail,
        issued: AtomicUsize::new(0),
    });
    let state = AppState::with_providers(
        tokens.clone(),
        Arc::new(FakeVoices { fail: voices_fail }),
        Arc::new(FakeAudio),
        ServerConfig::default(),
    );
    let router = build_router(state.clone()).expect("router should build");
    TestApp {
        router,
        tokens,
        state,
    }
}

/// Create a test app instance
pub fn create_test_app() -> TestApp {
    create_test_app_with(false, false)
}

/// Serve the app on an ephemeral port and return its address.
pub async fn spawn_server(app: &TestApp) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("{addr}")
}
