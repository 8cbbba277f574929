//! Import → serialize → load round trip

mod helpers;

use axum::http::StatusCode;
use cantor_server::services::{ImportRequest, ProjectSerializer, ScoreFile};
use helpers::{midi_file, post_json, send, test_app, VoiceSpec};
use serde_json::json;

#[tokio::test]
async fn test_imported_project_survives_serialize_and_load() {
    let app = test_app();

    let bytes = midi_file(
        240,
        Some(400_000),
        &[
            VoiceSpec::new("Lead", vec![(0, 240, 60), (240, 120, 62), (480, 360, 64)]),
            VoiceSpec::pulse("Harmony", 3, 240, 200, 55),
        ],
    );
    let imported = app
        .state
        .importer
        .import(&ImportRequest {
            files: vec![ScoreFile::new("round.mid", bytes)],
            voices: vec!["Alice".to_string(), "Ghost".to_string()],
            phonemizers: vec!["DefaultPhonemizer".to_string()],
            bpm: None,
        })
        .unwrap();
    let serialized = app.state.serializer.serialize(&imported).unwrap();

    let (status, body) = send(
        &app.router,
        post_json("/api/project/load", json!({"ustxContent": serialized})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["project"]["name"], "round");

    let snapshot = app.state.session.snapshot().await.unwrap();
    let loaded = &snapshot.project;

    assert_eq!(loaded.tracks.len(), imported.tracks.len());
    assert_eq!(loaded.tracks, imported.tracks);
    assert_eq!(loaded.tempos, imported.tempos);
    assert!((loaded.tempos[0].bpm - 150.0).abs() < 1e-9);
    assert_eq!(loaded.parts, imported.parts);
    assert_eq!(loaded.expressions, imported.expressions);
    assert!(loaded.tracks[1].singer.as_ref().unwrap().missing);
}

#[tokio::test]
async fn test_saved_file_round_trip() {
    let app = test_app();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("saved.json");

    let bytes = midi_file(480, None, &[VoiceSpec::pulse("Lead", 8, 240, 120, 67)]);
    let imported = app
        .state
        .importer
        .import(&ImportRequest {
            files: vec![ScoreFile::new("pulse.mid", bytes)],
            voices: vec!["Alice".to_string()],
            phonemizers: vec![],
            bpm: None,
        })
        .unwrap();
    app.state.serializer.write(&path, &imported).unwrap();

    let (status, body) = send(
        &app.router,
        post_json("/api/project/load", json!({"filePath": path.to_str().unwrap()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["project"]["name"], "saved");

    let notes = app
        .state
        .session
        .with_active_project(|p| p.parts[0].notes.clone())
        .await
        .unwrap();
    assert_eq!(notes, imported.parts[0].notes);
}
