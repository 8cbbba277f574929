//! Render job state machine
//!
//! `Pending → Rendering → Writing → Succeeded | Failed | Cancelled`

use cantor_common::events::{CantorEvent, RenderState};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::project::Project;

/// State transition record
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTransition {
    pub job_id: Uuid,
    pub old_state: RenderState,
    pub new_state: RenderState,
    pub transitioned_at: DateTime<Utc>,
}

impl RenderTransition {
    pub fn to_event(&self) -> CantorEvent {
        CantorEvent::RenderStateChanged {
            job_id: self.job_id,
            old_state: self.old_state,
            new_state: self.new_state,
            timestamp: self.transitioned_at,
        }
    }
}

/// One export of a captured project snapshot
#[derive(Debug)]
pub struct RenderJob {
    pub job_id: Uuid,

    /// Snapshot taken when the job was created; later loads do not touch it
    pub project: Arc<Project>,

    /// Session revision the snapshot belongs to
    pub revision: Uuid,

    pub cancel: CancellationToken,

    pub output_path: PathBuf,

    pub state: RenderState,

    pub created_at: DateTime<Utc>,

    /// Set when a terminal state is reached
    pub ended_at: Option<DateTime<Utc>>,
}

impl RenderJob {
    pub fn new(
        project: Arc<Project>,
        revision: Uuid,
        output_path: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            project,
            revision,
            cancel,
            output_path,
            state: RenderState::Pending,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Whether the state machine allows moving from the current state to
    /// `new_state`
    pub fn can_transition_to(&self, new_state: RenderState) -> bool {
        use RenderState::*;
        matches!(
            (self.state, new_state),
            (Pending, Rendering)
                | (Rendering, Writing)
                | (Rendering, Failed)
                | (Rendering, Cancelled)
                | (Writing, Succeeded)
                | (Writing, Failed)
        )
    }

    /// Transition to new state
    ///
    /// Returns `None` and leaves the job untouched when the move is not
    /// allowed.
    pub fn transition_to(&mut self, new_state: RenderState) -> Option<RenderTransition> {
        if !self.can_transition_to(new_state) {
            return None;
        }

        let transition = RenderTransition {
            job_id: self.job_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        Some(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Wall time from creation to the terminal state, if reached
    pub fn elapsed_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.created_at).num_milliseconds())
    }
}
