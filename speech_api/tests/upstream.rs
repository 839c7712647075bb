//! Client tests against a local fake of the speech API.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use playback_core::{AudioStreamSource, PlaybackRequest, SourceError};
use serde_json::json;
use speech_api::{ClientError, SpeechClient, TokenProvider, VoiceCatalog};
use tokio::net::TcpListener;

const API_KEY: &str = "test-key";
const ACCESS_TOKEN: &str = "access-123";

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn token(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
    if bearer(&headers) != Some(API_KEY) {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    if form.get("grant_type").map(String::as_str) != Some("client_credentials")
        || form.get("scope").map(String::as_str) != Some("audio:all voices:all")
    {
        return (StatusCode::BAD_REQUEST, "bad form").into_response();
    }
    Json(json!({ "access_token": ACCESS_TOKEN, "token_type": "bearer", "expires_in": 3600 }))
        .into_response()
}

async fn voices(headers: HeaderMap) -> Response {
    if bearer(&headers) != Some(API_KEY) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([
        { "id": "henry", "display_name": "Henry", "models": [] },
        { "id": "silky", "display_name": "SilkyJohnson2", "type": "shared",
          "models": [{ "name": "simba-english", "languages": [{ "locale": "en-US" }] }] }
    ]))
    .into_response()
}

async fn audio_stream(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Response {
    if bearer(&headers) != Some(ACCESS_TOKEN) {
        return (StatusCode::UNAUTHORIZED, "token expired").into_response();
    }
    if headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) != Some("audio/mpeg") {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }
    if body["input"] == "" {
        return StatusCode::OK.into_response();
    }
    let voice = body["voice_id"].as_str().unwrap_or_default().to_string();
    let parts = vec![
        Ok::<_, std::io::Error>(Bytes::from(format!("ID3{voice}"))),
        Ok(Bytes::from_static(b"-frame-1")),
        Ok(Bytes::from_static(b"-frame-2")),
    ];
    (
        [(header::CONTENT_TYPE, "audio/mpeg")],
        Body::from_stream(futures::stream::iter(parts)),
    )
        .into_response()
}

async fn broken() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded").into_response()
}

async fn spawn_upstream() -> String {
    let broken_api = Router::new()
        .route("/v1/auth/token", post(broken))
        .route("/v1/voices", get(broken))
        .route("/v1/audio/stream", post(broken));
    let app = Router::new()
        .route("/v1/auth/token", post(token))
        .route("/v1/voices", get(voices))
        .route("/v1/audio/stream", post(audio_stream))
        .nest("/broken", broken_api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_issue_token() {
    let base = spawn_upstream().await;
    let client = SpeechClient::new(&base, API_KEY);
    assert_eq!(client.issue_token().await.unwrap(), ACCESS_TOKEN);
}

#[tokio::test]
async fn test_issue_token_with_bad_key_is_unauthorized() {
    let base = spawn_upstream().await;
    let client = SpeechClient::new(&base, "wrong");
    match client.issue_token().await {
        Err(ClientError::Unauthorized { details }) => assert_eq!(details, "invalid api key"),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_voices_keeps_upstream_order() {
    let base = spawn_upstream().await;
    let client = SpeechClient::new(&base, API_KEY);
    let voices = client.list_voices().await.unwrap();
    let ids: Vec<_> = voices.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["henry", "silky"]);
    assert_eq!(voices[1].extra["type"], "shared");
}

#[tokio::test]
async fn test_list_voices_upstream_failure() {
    let base = spawn_upstream().await;
    let client = SpeechClient::new(&format!("{base}/broken"), API_KEY);
    match client.list_voices().await {
        Err(ClientError::Upstream { status, details }) => {
            assert_eq!(status, 500);
            assert_eq!(details, "upstream exploded");
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
}

#[tokio::test]
async fn test_audio_stream_delivers_bytes_in_order() {
    let base = spawn_upstream().await;
    let client = SpeechClient::new(&base, API_KEY);
    let request = PlaybackRequest::new(ACCESS_TOKEN, "Hello", "henry");

    let mut stream = client.open_stream(&request).await.unwrap();
    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(received, b"ID3henry-frame-1-frame-2");
}

#[tokio::test]
async fn test_audio_stream_rejected_token() {
    let base = spawn_upstream().await;
    let client = SpeechClient::new(&base, API_KEY);
    let request = PlaybackRequest::new("stale", "Hello", "henry");

    let err = client.open_stream(&request).await.err().unwrap();
    assert!(err.is_unauthorized());
    match err {
        SourceError::Remote { status, details } => {
            assert_eq!(status, Some(401));
            assert_eq!(details, "token expired");
        }
        other => panic!("expected Remote, got {other:?}"),
    }
}

#[tokio::test]
async fn test_audio_stream_empty_body() {
    let base = spawn_upstream().await;
    let client = SpeechClient::new(&base, API_KEY);
    let request = PlaybackRequest::new(ACCESS_TOKEN, "", "henry");

    let err = client.open_stream(&request).await.err().unwrap();
    assert!(matches!(err, SourceError::EmptyBody));
}

#[tokio::test]
async fn test_audio_stream_unreachable_upstream() {
    // Bind and drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = SpeechClient::new(&format!("http://{addr}"), API_KEY);
    let request = PlaybackRequest::new(ACCESS_TOKEN, "Hello", "henry");
    let err = client.open_stream(&request).await.err().unwrap();
    assert!(matches!(err, SourceError::Remote { status: None, .. }));
}
