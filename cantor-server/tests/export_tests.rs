//! Render/export pipeline tests
//!
//! HTTP-level checks of the exported WAV plus orchestrator-level tests of
//! cancellation, busy destinations and snapshot isolation.

mod helpers;

use axum::http::StatusCode;
use cantor_common::events::{CantorEvent, EventBus, ExportPhase, RenderState};
use cantor_server::models::Project;
use cantor_server::services::{
    GuideToneMixdown, JsonProjectFormat, MixdownEngine, MixdownError, PcmBuffer, PcmWriter,
    ProjectSerializer, RenderOrchestrator, SessionStore, WavPcmWriter,
};
use cantor_server::Error;
use helpers::{post_json, send, simple_project_json, test_app};
use serde_json::json;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Mixdown that spins until released or cancelled
#[derive(Default)]
struct GatedMixdown {
    started: AtomicBool,
    release: AtomicBool,
    calls: AtomicUsize,
}

impl MixdownEngine for GatedMixdown {
    fn mix(&self, _project: &Project, cancel: &CancellationToken) -> Result<PcmBuffer, MixdownError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        loop {
            if cancel.is_cancelled() {
                return Err(MixdownError::Cancelled);
            }
            if self.release.load(Ordering::SeqCst) {
                return Ok(PcmBuffer::silent(8000, 2, 8000));
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

struct FailingMixdown;

impl MixdownEngine for FailingMixdown {
    fn mix(&self, _project: &Project, _cancel: &CancellationToken) -> Result<PcmBuffer, MixdownError> {
        Err(MixdownError::Failed("voicebank exploded".to_string()))
    }
}

struct FailingWriter;

impl PcmWriter for FailingWriter {
    fn write(&self, path: &Path, _buffer: &PcmBuffer) -> io::Result<()> {
        std::fs::write(path, b"RIFF partial")?;
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }
}

/// Writer that blocks until released, then writes a real WAV
#[derive(Default)]
struct GatedWriter {
    started: AtomicBool,
    release: AtomicBool,
}

impl PcmWriter for GatedWriter {
    fn write(&self, path: &Path, buffer: &PcmBuffer) -> io::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        while !self.release.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(2));
        }
        WavPcmWriter.write(path, buffer)
    }
}

fn project(bars: u32) -> Project {
    JsonProjectFormat
        .parse(&simple_project_json("song", 120.0, bars))
        .unwrap()
}

async fn orchestrator_with(
    engine: Arc<dyn MixdownEngine>,
    writer: Arc<dyn PcmWriter>,
    bus: EventBus,
) -> (Arc<SessionStore>, Arc<RenderOrchestrator>) {
    let session = Arc::new(SessionStore::new(bus.clone()));
    session.load(project(1)).await.unwrap();
    let orchestrator = Arc::new(RenderOrchestrator::new(
        Arc::clone(&session),
        engine,
        writer,
        bus,
    ));
    (session, orchestrator)
}

async fn wait_until_started(engine: &GatedMixdown) {
    for _ in 0..500 {
        if engine.started.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("mixdown never started");
}

#[tokio::test]
async fn test_export_writes_16_bit_wav_of_project_length() {
    let app = test_app();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("renders").join("song.wav");

    send(
        &app.router,
        post_json(
            "/api/project/load",
            json!({"ustxContent": simple_project_json("song", 120.0, 2)}),
        ),
    )
    .await;

    let (status, body) = send(
        &app.router,
        post_json("/api/project/export", json!({"outputPath": target.to_str().unwrap()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["outputPath"], target.to_str().unwrap());

    let reader = hound::WavReader::open(&target).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);
    assert_eq!(spec.channels, 2);
    // Two bars of 4/4 at 120 bpm
    let seconds = reader.duration() as f64 / spec.sample_rate as f64;
    assert!((seconds - 4.0).abs() < 1e-3, "got {}s", seconds);
}

#[tokio::test]
async fn test_export_to_locked_destination_is_busy() {
    let app = test_app();
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("held.wav");
    std::fs::write(&target, b"original bytes").unwrap();

    let holder = OpenOptions::new().read(true).write(true).open(&target).unwrap();
    holder.lock().unwrap();

    send(
        &app.router,
        post_json(
            "/api/project/load",
            json!({"ustxContent": simple_project_json("song", 120.0, 1)}),
        ),
    )
    .await;

    let (status, body) = send(
        &app.router,
        post_json("/api/project/export", json!({"outputPath": target.to_str().unwrap()})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DESTINATION_BUSY");

    drop(holder);
    assert_eq!(std::fs::read(&target).unwrap(), b"original bytes");
}

#[tokio::test]
async fn test_export_overwrites_unlocked_existing_file() {
    let bus = EventBus::new(100);
    let (_session, orchestrator) = orchestrator_with(
        Arc::new(GuideToneMixdown::new(8000)),
        Arc::new(WavPcmWriter),
        bus,
    )
    .await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("old.wav");
    std::fs::write(&target, b"stale").unwrap();

    let report = orchestrator
        .export(&target, CancellationToken::new())
        .await
        .unwrap();
    assert!((report.duration_seconds - 2.0).abs() < 1e-9);
    assert!(hound::WavReader::open(&target).is_ok());
}

#[tokio::test]
async fn test_progress_events_and_state_order() {
    let bus = EventBus::new(100);
    let mut rx = bus.subscribe();
    let (_session, orchestrator) = orchestrator_with(
        Arc::new(GuideToneMixdown::new(8000)),
        Arc::new(WavPcmWriter),
        bus,
    )
    .await;
    let dir = TempDir::new().unwrap();

    orchestrator
        .export(&dir.path().join("out.wav"), CancellationToken::new())
        .await
        .unwrap();

    let mut states = Vec::new();
    let mut phases = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            CantorEvent::RenderStateChanged { new_state, .. } => states.push(new_state),
            CantorEvent::ExportProgress { phase, percentage, .. } => phases.push((phase, percentage)),
            _ => {}
        }
    }
    assert_eq!(
        states,
        vec![RenderState::Rendering, RenderState::Writing, RenderState::Succeeded]
    );
    assert_eq!(
        phases,
        vec![(ExportPhase::WriteStarted, 0.0), (ExportPhase::WriteCompleted, 100.0)]
    );
}

#[tokio::test]
async fn test_unchanged_session_reuses_mixdown() {
    let engine = Arc::new(GatedMixdown::default());
    engine.release.store(true, Ordering::SeqCst);
    let (session, orchestrator) =
        orchestrator_with(engine.clone(), Arc::new(WavPcmWriter), EventBus::new(100)).await;
    let dir = TempDir::new().unwrap();

    let first = orchestrator
        .export(&dir.path().join("a.wav"), CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .export(&dir.path().join("b.wav"), CancellationToken::new())
        .await
        .unwrap();
    assert!(!first.reused_mixdown);
    assert!(second.reused_mixdown);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

    // A reload invalidates the cached mixdown
    session.load(project(1)).await.unwrap();
    let third = orchestrator
        .export(&dir.path().join("c.wav"), CancellationToken::new())
        .await
        .unwrap();
    assert!(!third.reused_mixdown);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancel_during_mixdown() {
    let engine = Arc::new(GatedMixdown::default());
    let bus = EventBus::new(100);
    let mut rx = bus.subscribe();
    let (_session, orchestrator) =
        orchestrator_with(engine.clone(), Arc::new(WavPcmWriter), bus).await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("never.wav");

    let token = CancellationToken::new();
    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = target.clone();
        let token = token.clone();
        tokio::spawn(async move { orchestrator.export(&target, token).await })
    };

    wait_until_started(&engine).await;
    token.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!target.exists());

    let mut last_state = None;
    while let Ok(event) = rx.try_recv() {
        if let CantorEvent::RenderStateChanged { new_state, .. } = event {
            last_state = Some(new_state);
        }
    }
    assert_eq!(last_state, Some(RenderState::Cancelled));
}

#[tokio::test]
async fn test_cancel_after_write_started_has_no_effect() {
    let writer = Arc::new(GatedWriter::default());
    let bus = EventBus::new(100);
    let mut rx = bus.subscribe();
    let (_session, orchestrator) =
        orchestrator_with(Arc::new(GuideToneMixdown::new(8000)), writer.clone(), bus).await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("complete.wav");

    let token = CancellationToken::new();
    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = target.clone();
        let token = token.clone();
        tokio::spawn(async move { orchestrator.export(&target, token).await })
    };

    for _ in 0..500 {
        if writer.started.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(writer.started.load(Ordering::SeqCst), "write never started");

    token.cancel();
    assert!(orchestrator.cancel_active());
    writer.release.store(true, Ordering::SeqCst);

    let report = task.await.unwrap().unwrap();
    let reader = hound::WavReader::open(&target).unwrap();
    assert_eq!(reader.duration() as usize, report.frames);
    assert!((report.duration_seconds - 2.0).abs() < 1e-9);

    let mut states = Vec::new();
    let mut saw_write_started = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            CantorEvent::RenderStateChanged { new_state, .. } => states.push(new_state),
            CantorEvent::ExportProgress { phase, .. } => {
                saw_write_started |= phase == ExportPhase::WriteStarted
            }
            _ => {}
        }
    }
    assert!(saw_write_started);
    assert_eq!(states.last(), Some(&RenderState::Succeeded));
    assert!(!states.contains(&RenderState::Cancelled));
}

#[tokio::test]
async fn test_cancelled_token_skips_cached_mixdown() {
    let engine = Arc::new(GatedMixdown::default());
    engine.release.store(true, Ordering::SeqCst);
    let (_session, orchestrator) =
        orchestrator_with(engine.clone(), Arc::new(WavPcmWriter), EventBus::new(100)).await;
    let dir = TempDir::new().unwrap();

    orchestrator
        .export(&dir.path().join("warm.wav"), CancellationToken::new())
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let target = dir.path().join("cancelled.wav");
    let result = orchestrator.export(&target, token).await;
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!target.exists());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_active_export_by_request() {
    let engine = Arc::new(GatedMixdown::default());
    let (_session, orchestrator) =
        orchestrator_with(engine.clone(), Arc::new(WavPcmWriter), EventBus::new(100)).await;
    let dir = TempDir::new().unwrap();

    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = dir.path().join("x.wav");
        tokio::spawn(async move { orchestrator.export(&target, CancellationToken::new()).await })
    };

    wait_until_started(&engine).await;
    assert!(orchestrator.cancel_active());
    assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
    assert!(!orchestrator.cancel_active());
}

#[tokio::test]
async fn test_second_export_while_rendering_is_rejected() {
    let engine = Arc::new(GatedMixdown::default());
    let (_session, orchestrator) =
        orchestrator_with(engine.clone(), Arc::new(WavPcmWriter), EventBus::new(100)).await;
    let dir = TempDir::new().unwrap();

    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = dir.path().join("first.wav");
        tokio::spawn(async move { orchestrator.export(&target, CancellationToken::new()).await })
    };
    wait_until_started(&engine).await;
    assert!(orchestrator.is_busy());

    let second = orchestrator
        .export(&dir.path().join("second.wav"), CancellationToken::new())
        .await;
    assert!(matches!(second, Err(Error::RenderInProgress)));

    engine.release.store(true, Ordering::SeqCst);
    assert!(task.await.unwrap().is_ok());
    assert!(dir.path().join("first.wav").exists());
}

#[tokio::test]
async fn test_unload_during_export_does_not_affect_it() {
    let engine = Arc::new(GatedMixdown::default());
    let (session, orchestrator) =
        orchestrator_with(engine.clone(), Arc::new(WavPcmWriter), EventBus::new(100)).await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("snapshot.wav");

    let task = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = target.clone();
        tokio::spawn(async move { orchestrator.export(&target, CancellationToken::new()).await })
    };
    wait_until_started(&engine).await;

    session.unload().await;
    assert!(session.status().await.is_none());

    engine.release.store(true, Ordering::SeqCst);
    let report = task.await.unwrap().unwrap();
    assert_eq!(report.frames, 8000);
    assert!(target.exists());
}

#[tokio::test]
async fn test_mixdown_failure_is_render_failed() {
    let bus = EventBus::new(100);
    let mut rx = bus.subscribe();
    let (_session, orchestrator) =
        orchestrator_with(Arc::new(FailingMixdown), Arc::new(WavPcmWriter), bus).await;
    let dir = TempDir::new().unwrap();

    let err = orchestrator
        .export(&dir.path().join("x.wav"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RenderFailed(ref m) if m.contains("voicebank")));

    let failed = std::iter::from_fn(|| rx.try_recv().ok())
        .find_map(|e| match e {
            CantorEvent::ExportFailed { kind, .. } => Some(kind),
            _ => None,
        });
    assert_eq!(failed.as_deref(), Some("RENDER_FAILED"));
}

#[tokio::test]
async fn test_write_failure_keeps_partial_file() {
    let (_session, orchestrator) = orchestrator_with(
        Arc::new(GuideToneMixdown::new(8000)),
        Arc::new(FailingWriter),
        EventBus::new(100),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("partial.wav");

    let err = orchestrator
        .export(&target, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExportWriteFailed(_)));
    assert_eq!(std::fs::read(&target).unwrap(), b"RIFF partial");
}

#[cfg(unix)]
#[tokio::test]
async fn test_unwritable_directory_is_permission_denied() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let locked_dir = dir.path().join("ro");
    std::fs::create_dir(&locked_dir).unwrap();
    std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o555)).unwrap();

    // Privileged users bypass directory permissions
    if std::fs::write(locked_dir.join("probe"), b"x").is_ok() {
        return;
    }

    let (_session, orchestrator) = orchestrator_with(
        Arc::new(GuideToneMixdown::new(8000)),
        Arc::new(WavPcmWriter),
        EventBus::new(100),
    )
    .await;
    let err = orchestrator
        .export(&locked_dir.join("out.wav"), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    std::fs::set_permissions(&locked_dir, std::fs::Permissions::from_mode(0o755)).unwrap();
}
