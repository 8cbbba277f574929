//! Router and request helpers

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cantor_common::events::EventBus;
use cantor_server::models::{Note, Part, Project, TempoMarker, Track};
use cantor_server::services::{JsonProjectFormat, ProjectSerializer, SingerCatalog};
use cantor_server::{build_router, AppState, Collaborators};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

/// Low sample rate keeps exports fast
pub const TEST_SAMPLE_RATE: u32 = 8000;

const BOUNDARY: &str = "cantor-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

/// App with "Alice" installed and the default collaborators
pub fn test_app() -> TestApp {
    let state = AppState::new(
        SingerCatalog::from_names(["Alice"]),
        EventBus::new(100),
        Collaborators::defaults(TEST_SAMPLE_RATE),
    );
    TestApp {
        router: build_router(state.clone()),
        state,
    }
}

/// Send one request; returns status and JSON body (Null when empty)
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&body).into_owned())
        })
    };
    (status, json)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub enum MultipartPart {
    Text(&'static str, String),
    File(&'static str, String, Vec<u8>),
}

pub fn multipart(uri: &str, parts: Vec<MultipartPart>) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            MultipartPart::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            MultipartPart::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                body.extend_from_slice(&bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Serialized one-track project: `bars` bars of quarter notes at `bpm`
pub fn simple_project_json(name: &str, bpm: f64, bars: u32) -> String {
    let mut project = Project::new(name);
    project.tempos = vec![TempoMarker::new(0, bpm)];
    project.tracks.push(Track::new(0));
    project.parts.push(Part {
        track_no: 0,
        name: "Lead".to_string(),
        position: 0,
        duration: bars * 1920,
        notes: (0..bars * 4)
            .map(|i| Note {
                position: i * 480,
                duration: 240,
                tone: 60 + (i % 12) as u8,
                lyric: "la".to_string(),
                phonemes: Vec::new(),
            })
            .collect(),
    });
    JsonProjectFormat.serialize(&project).unwrap()
}
