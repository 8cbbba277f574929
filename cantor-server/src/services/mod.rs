//! Core services: session, rendering, import and their collaborators

pub mod import_pipeline;
pub mod mixdown;
pub mod phonemizers;
pub mod project_format;
pub mod render_cache;
pub mod render_orchestrator;
pub mod score_reader;
pub mod session_store;
pub mod singers;
pub mod tempo;
pub mod wav_writer;

pub use import_pipeline::{ImportPipeline, ImportRequest, ScoreFile};
pub use mixdown::{GuideToneMixdown, MixdownEngine, MixdownError, PcmBuffer};
pub use phonemizers::{Phonemizer, PhonemizerFactory, PhonemizerRegistry};
pub use project_format::{JsonProjectFormat, ProjectSerializer};
pub use render_cache::RenderCache;
pub use render_orchestrator::{ExportReport, RenderOrchestrator};
pub use score_reader::{MidiScoreReader, ScoreReader};
pub use session_store::{SessionSnapshot, SessionStore, UnloadOutcome};
pub use singers::SingerCatalog;
pub use wav_writer::{PcmWriter, WavPcmWriter};
