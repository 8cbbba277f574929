//! cantor-server library interface
//!
//! Project session and render orchestration service. Exposes the core
//! services and the HTTP router for the binary and integration tests.

pub mod api;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{Error, ErrorKind, Result};

use axum::Router;
use cantor_common::events::EventBus;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::{
    GuideToneMixdown, ImportPipeline, JsonProjectFormat, MidiScoreReader, MixdownEngine,
    PcmWriter, PhonemizerRegistry, ProjectSerializer, RenderOrchestrator, ScoreReader,
    SessionStore, SingerCatalog, WavPcmWriter,
};

/// Replaceable collaborators of the core services
pub struct Collaborators {
    pub score_reader: Arc<dyn ScoreReader>,
    pub serializer: Arc<dyn ProjectSerializer>,
    pub mixdown: Arc<dyn MixdownEngine>,
    pub pcm_writer: Arc<dyn PcmWriter>,
    pub phonemizers: PhonemizerRegistry,
}

impl Collaborators {
    /// MIDI reader, JSON projects, guide-tone mixdown at `sample_rate`, WAV
    /// output and the built-in phonemizers
    pub fn defaults(sample_rate: u32) -> Self {
        Self {
            score_reader: Arc::new(MidiScoreReader::new()),
            serializer: Arc::new(JsonProjectFormat),
            mixdown: Arc::new(GuideToneMixdown::new(sample_rate)),
            pcm_writer: Arc::new(WavPcmWriter),
            phonemizers: PhonemizerRegistry::with_builtins(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The single active-project session
    pub session: Arc<SessionStore>,
    pub orchestrator: Arc<RenderOrchestrator>,
    pub importer: Arc<ImportPipeline>,
    pub serializer: Arc<dyn ProjectSerializer>,
    pub singers: Arc<SingerCatalog>,
    pub phonemizers: Arc<PhonemizerRegistry>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(singers: SingerCatalog, event_bus: EventBus, collaborators: Collaborators) -> Self {
        let singers = Arc::new(singers);
        let phonemizers = Arc::new(collaborators.phonemizers);
        let session = Arc::new(SessionStore::new(event_bus.clone()));
        let orchestrator = Arc::new(RenderOrchestrator::new(
            Arc::clone(&session),
            collaborators.mixdown,
            collaborators.pcm_writer,
            event_bus.clone(),
        ));
        let importer = Arc::new(ImportPipeline::new(
            collaborators.score_reader,
            Arc::clone(&singers),
            Arc::clone(&phonemizers),
        ));

        Self {
            session,
            orchestrator,
            importer,
            serializer: collaborators.serializer,
            singers,
            phonemizers,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::project_routes())
        .merge(api::convert_routes())
        .merge(api::event_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
