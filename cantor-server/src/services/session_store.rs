//! Active project session
//!
//! The session holds at most one project. Load, unload and snapshot all go
//! through one async mutex, so no caller ever sees a half-replaced project.
//! Exports work on an `Arc` snapshot, so a load or unload that happens while
//! an export is running does not affect that export.

use cantor_common::events::{CantorEvent, EventBus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::project::{Project, ProjectSummary};
use crate::services::render_cache::RenderCache;

/// Consistent view of the active project
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub project: Arc<Project>,
    /// Changes on every load; identifies cached mixdowns
    pub revision: Uuid,
}

/// Result of [`SessionStore::unload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded(ProjectSummary),
    NothingLoaded,
}

pub struct SessionStore {
    active: Mutex<Option<SessionSnapshot>>,
    cache: Arc<RenderCache>,
    event_bus: EventBus,
}

impl SessionStore {
    pub fn new(event_bus: EventBus) -> Self {
        Self::with_cache(event_bus, Arc::new(RenderCache::new()))
    }

    pub fn with_cache(event_bus: EventBus, cache: Arc<RenderCache>) -> Self {
        Self {
            active: Mutex::new(None),
            cache,
            event_bus,
        }
    }

    /// Mixdown cache tied to this session
    pub fn cache(&self) -> &Arc<RenderCache> {
        &self.cache
    }

    /// Summary of the active project, `None` when empty
    pub async fn status(&self) -> Option<ProjectSummary> {
        self.active.lock().await.as_ref().map(|s| s.project.summary())
    }

    /// Make `project` the active project, replacing any previous one
    ///
    /// The project is validated first; an invalid project leaves the session
    /// untouched.
    pub async fn load(&self, project: Project) -> Result<ProjectSummary> {
        project.validate()?;
        let summary = project.summary();
        let snapshot = SessionSnapshot {
            project: Arc::new(project),
            revision: Uuid::new_v4(),
        };

        let previous = {
            let mut active = self.active.lock().await;
            let previous = active.take();
            self.invalidate_cache();
            *active = Some(snapshot);
            previous
        };

        if let Some(previous) = previous {
            tracing::info!(name = %previous.project.name, "Replaced active project");
        }
        tracing::info!(name = %summary.name, path = ?summary.file_path, "Project loaded");

        self.event_bus.emit_lossy(CantorEvent::ProjectLoaded {
            name: summary.name.clone(),
            file_path: summary.file_path.clone(),
            timestamp: Utc::now(),
        });

        Ok(summary)
    }

    /// Clear the active project; a no-op when nothing is loaded
    pub async fn unload(&self) -> UnloadOutcome {
        let previous = {
            let mut active = self.active.lock().await;
            let previous = active.take();
            if previous.is_some() {
                self.invalidate_cache();
            }
            previous
        };

        match previous {
            Some(previous) => {
                let summary = previous.project.summary();
                tracing::info!(name = %summary.name, "Project unloaded");
                self.event_bus.emit_lossy(CantorEvent::ProjectUnloaded {
                    name: summary.name.clone(),
                    timestamp: Utc::now(),
                });
                UnloadOutcome::Unloaded(summary)
            }
            None => {
                tracing::debug!("Unload requested with nothing loaded");
                UnloadOutcome::NothingLoaded
            }
        }
    }

    /// Run `f` against the active project while holding the session lock
    pub async fn with_active_project<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Project) -> T,
    {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(snapshot) => Ok(f(&snapshot.project)),
            None => Err(Error::NoActiveProject),
        }
    }

    /// Capture the active project for long-running work
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.active
            .lock()
            .await
            .clone()
            .ok_or(Error::NoActiveProject)
    }

    fn invalidate_cache(&self) {
        if let Err(e) = self.cache.invalidate() {
            tracing::warn!("Render cache invalidation failed: {}", e);
        }
    }
}
