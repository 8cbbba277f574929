//! Data models for cantor-server

pub mod project;
pub mod render_job;
pub mod score;

pub use project::{
    ExpressionDescriptor, Note, Part, Project, ProjectSummary, SingerBinding, TempoMarker, Track,
};
pub use render_job::{RenderJob, RenderTransition};
pub use score::{NoteEvent, Score, ScoreNote, ScoreVoice, TempoChange};
