//! Render-to-file pipeline
//!
//! An export captures a snapshot of the active project, checks the
//! destination, runs the mixdown on the blocking pool (cancellable), then
//! writes the buffer as 16-bit PCM. Only one export runs at a time.
//!
//! ```text
//! Pending → Rendering → Writing → Succeeded
//!              │           └────→ Failed
//!              ├─────────────────→ Failed
//!              └─────────────────→ Cancelled
//! ```

use cantor_common::events::{CantorEvent, EventBus, ExportPhase, RenderState};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::render_job::RenderJob;
use crate::services::mixdown::{MixdownEngine, MixdownError, PcmBuffer};
use crate::services::session_store::SessionStore;
use crate::services::wav_writer::PcmWriter;

/// Outcome of a successful export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub job_id: Uuid,
    pub output_path: PathBuf,
    pub duration_seconds: f64,
    pub frames: usize,
    /// The mixdown came from the render cache
    pub reused_mixdown: bool,
}

pub struct RenderOrchestrator {
    session: Arc<SessionStore>,
    engine: Arc<dyn MixdownEngine>,
    writer: Arc<dyn PcmWriter>,
    event_bus: EventBus,
    /// Held for the whole export
    render_slot: tokio::sync::Mutex<()>,
    /// Token of the export currently running, if any
    active_token: Mutex<Option<CancellationToken>>,
}

/// Clears the registered token on every exit path
struct ActiveTokenGuard<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for ActiveTokenGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = None;
        }
    }
}

impl RenderOrchestrator {
    pub fn new(
        session: Arc<SessionStore>,
        engine: Arc<dyn MixdownEngine>,
        writer: Arc<dyn PcmWriter>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            session,
            engine,
            writer,
            event_bus,
            render_slot: tokio::sync::Mutex::new(()),
            active_token: Mutex::new(None),
        }
    }

    /// Export the active project to `destination`
    ///
    /// `cancel` only affects the mixdown; once writing has started the
    /// export runs to completion.
    pub async fn export(&self, destination: &Path, cancel: CancellationToken) -> Result<ExportReport> {
        let snapshot = self.session.snapshot().await?;

        if destination.as_os_str().is_empty() {
            return Err(Error::MissingInput("outputPath".to_string()));
        }

        let _slot = self
            .render_slot
            .try_lock()
            .map_err(|_| Error::RenderInProgress)?;

        prepare_destination(destination)?;

        if let Ok(mut slot) = self.active_token.lock() {
            *slot = Some(cancel.clone());
        }
        let _token_guard = ActiveTokenGuard(&self.active_token);

        let mut job = RenderJob::new(
            Arc::clone(&snapshot.project),
            snapshot.revision,
            destination.to_path_buf(),
            cancel,
        );
        tracing::info!(
            job_id = %job.job_id,
            project = %job.project.name,
            path = %destination.display(),
            "Export started"
        );

        self.transition(&mut job, RenderState::Rendering);
        let (buffer, reused_mixdown) = match self.mixdown(&job).await {
            Ok(result) => result,
            Err(e) => {
                let state = if matches!(e, Error::Cancelled) {
                    RenderState::Cancelled
                } else {
                    RenderState::Failed
                };
                self.fail(&mut job, state, &e);
                return Err(e);
            }
        };

        self.transition(&mut job, RenderState::Writing);
        self.progress(&job, ExportPhase::WriteStarted, 0.0);

        let writer = Arc::clone(&self.writer);
        let path = job.output_path.clone();
        let write_buffer = Arc::clone(&buffer);
        let written = tokio::task::spawn_blocking(move || writer.write(&path, &write_buffer))
            .await
            .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e.to_string())));

        if let Err(e) = written {
            let err = Error::ExportWriteFailed(format!("{}: {}", job.output_path.display(), e));
            self.fail(&mut job, RenderState::Failed, &err);
            return Err(err);
        }

        self.progress(&job, ExportPhase::WriteCompleted, 100.0);
        self.transition(&mut job, RenderState::Succeeded);

        tracing::info!(
            job_id = %job.job_id,
            path = %job.output_path.display(),
            seconds = buffer.duration_seconds(),
            elapsed_ms = job.elapsed_ms().unwrap_or(0),
            reused_mixdown,
            "Export completed"
        );

        Ok(ExportReport {
            job_id: job.job_id,
            output_path: job.output_path,
            duration_seconds: buffer.duration_seconds(),
            frames: buffer.frames(),
            reused_mixdown,
        })
    }

    /// Cancel the running export's mixdown
    ///
    /// Returns `false` when no export is running.
    pub fn cancel_active(&self) -> bool {
        match self.active_token.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// True while an export holds the render slot
    pub fn is_busy(&self) -> bool {
        self.render_slot.try_lock().is_err()
    }

    async fn mixdown(&self, job: &RenderJob) -> Result<(Arc<PcmBuffer>, bool)> {
        if job.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let cache = self.session.cache();
        if let Some(buffer) = cache.get(job.revision) {
            tracing::debug!(job_id = %job.job_id, "Reusing cached mixdown");
            return Ok((buffer, true));
        }

        let engine = Arc::clone(&self.engine);
        let project = Arc::clone(&job.project);
        let token = job.cancel.clone();
        let handle = tokio::task::spawn_blocking(move || engine.mix(&project, &token));

        let mixed = tokio::select! {
            biased;
            joined = handle => joined.map_err(|e| Error::RenderFailed(e.to_string()))?,
            _ = job.cancel.cancelled() => Err(MixdownError::Cancelled),
        };

        let buffer = match mixed {
            Ok(buffer) => Arc::new(buffer),
            Err(MixdownError::Cancelled) => return Err(Error::Cancelled),
            Err(MixdownError::Failed(msg)) => return Err(Error::RenderFailed(msg)),
        };

        cache.store(job.revision, Arc::clone(&buffer));
        Ok((buffer, false))
    }

    fn transition(&self, job: &mut RenderJob, state: RenderState) {
        match job.transition_to(state) {
            Some(transition) => {
                tracing::debug!(
                    job_id = %job.job_id,
                    from = %transition.old_state,
                    to = %transition.new_state,
                    "Render state changed"
                );
                self.event_bus.emit_lossy(transition.to_event());
            }
            None => tracing::warn!(
                job_id = %job.job_id,
                from = %job.state,
                to = %state,
                "Invalid render state transition ignored"
            ),
        }
    }

    fn fail(&self, job: &mut RenderJob, state: RenderState, err: &Error) {
        match state {
            RenderState::Cancelled => tracing::info!(job_id = %job.job_id, "Export cancelled"),
            _ => tracing::error!(job_id = %job.job_id, error = %err, "Export failed"),
        }
        self.transition(job, state);
        self.event_bus.emit_lossy(CantorEvent::ExportFailed {
            job_id: job.job_id,
            kind: err.kind().code().to_string(),
            message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn progress(&self, job: &RenderJob, phase: ExportPhase, percentage: f64) {
        self.event_bus.emit_lossy(CantorEvent::ExportProgress {
            job_id: job.job_id,
            phase,
            percentage,
            output_path: job.output_path.display().to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Check that `path` can be written before any rendering happens
///
/// Creates the parent directory if needed, probes it with a scratch
/// write/delete and, for an existing file, checks it is not locked by
/// another writer.
fn prepare_destination(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(Error::ExportWriteFailed(format!(
            "{} is a directory",
            path.display()
        )));
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| {
        Error::PermissionDenied(format!("cannot create {}: {}", parent.display(), e))
    })?;

    probe_directory(&parent)?;

    if path.exists() {
        ensure_not_locked(path)?;
    }
    Ok(())
}

/// Provisional write/delete in `dir`
fn probe_directory(dir: &Path) -> Result<()> {
    let probe = dir.join(format!(".cantor-probe-{}", Uuid::new_v4().simple()));
    let denied =
        |e: io::Error| Error::PermissionDenied(format!("{} is not writable: {}", dir.display(), e));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&probe)
        .map_err(denied)?;
    let written = file.write_all(b"probe");
    drop(file);

    if let Err(e) = std::fs::remove_file(&probe) {
        tracing::warn!(path = %probe.display(), "Failed to remove write probe: {}", e);
    }
    written.map_err(denied)
}

fn is_sharing_violation(e: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(e.raw_os_error(), Some(32) | Some(33))
}

/// Fail with `DestinationBusy` if another writer holds `path` exclusively
fn ensure_not_locked(path: &Path) -> Result<()> {
    let file: File = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            if is_sharing_violation(&e) {
                Error::DestinationBusy(path.display().to_string())
            } else if e.kind() == io::ErrorKind::PermissionDenied {
                Error::PermissionDenied(format!("{}: {}", path.display(), e))
            } else {
                Error::ExportWriteFailed(format!("{}: {}", path.display(), e))
            }
        })?;

    match file.try_lock() {
        Ok(()) => Ok(()),
        Err(TryLockError::WouldBlock) => Err(Error::DestinationBusy(path.display().to_string())),
        Err(TryLockError::Error(e)) => {
            tracing::warn!(path = %path.display(), "Lock check unavailable: {}", e);
            Ok(())
        }
    }
}
