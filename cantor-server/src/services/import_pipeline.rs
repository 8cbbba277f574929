//! Score import
//!
//! Builds a brand-new project from score files. The result is returned to
//! the caller and never touches the session; a failed import leaves nothing
//! behind.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::project::{
    Note, Part, Project, TempoMarker, Track, DEFAULT_LYRIC, TICKS_PER_QUARTER,
};
use crate::models::score::Score;
use crate::services::phonemizers::PhonemizerRegistry;
use crate::services::score_reader::ScoreReader;
use crate::services::singers::SingerCatalog;
use crate::services::tempo;

/// One score file held in memory
#[derive(Debug, Clone)]
pub struct ScoreFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ScoreFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a score file from disk into memory
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::PermissionDenied(format!("{}: {}", path.display(), e)),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Inputs of one import
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub files: Vec<ScoreFile>,
    /// Singer names, consumed by track index
    pub voices: Vec<String>,
    /// Phonemizer keys, consumed by track index
    pub phonemizers: Vec<String>,
    /// Explicit tempo; overrides file metadata and inference
    pub bpm: Option<f64>,
}

pub struct ImportPipeline {
    reader: Arc<dyn ScoreReader>,
    singers: Arc<SingerCatalog>,
    phonemizers: Arc<PhonemizerRegistry>,
}

fn rescale(tick: u32, from_tpq: u32) -> u32 {
    if from_tpq == TICKS_PER_QUARTER {
        return tick;
    }
    let from = from_tpq.max(1) as u64;
    let scaled = (tick as u64 * TICKS_PER_QUARTER as u64 + from / 2) / from;
    scaled.min(u32::MAX as u64) as u32
}

impl ImportPipeline {
    pub fn new(
        reader: Arc<dyn ScoreReader>,
        singers: Arc<SingerCatalog>,
        phonemizers: Arc<PhonemizerRegistry>,
    ) -> Self {
        Self {
            reader,
            singers,
            phonemizers,
        }
    }

    /// Convert score files into a new project
    ///
    /// Needs at least one file and one voice. Every file must parse and
    /// contribute at least one part; one unsupported or empty file fails the
    /// whole import.
    pub fn import(&self, request: &ImportRequest) -> Result<Project> {
        if request.files.is_empty() {
            return Err(Error::MissingInput("at least one score file is required".to_string()));
        }
        if request.voices.is_empty() {
            return Err(Error::MissingInput("at least one voice is required".to_string()));
        }
        if let Some(bpm) = request.bpm {
            if !(bpm.is_finite() && bpm > 0.0) {
                return Err(Error::InvalidProject(format!("tempo {} is not a positive number", bpm)));
            }
        }

        let scores = request
            .files
            .iter()
            .map(|f| self.reader.read(&f.name, &f.bytes))
            .collect::<Result<Vec<Score>>>()?;

        if let Some((file, _)) = request
            .files
            .iter()
            .zip(&scores)
            .find(|(_, score)| score.voices.is_empty())
        {
            return Err(Error::InvalidProject(format!("{}: score contains no notes", file.name)));
        }

        let mut project = Project::new(request.files[0].stem());
        self.apply_tempo(&mut project, &scores[0], request.bpm);

        for (file, score) in request.files.iter().zip(&scores) {
            for voice in &score.voices {
                let index = project.tracks.len();
                project.tracks.push(self.bind_track(index, request));

                let notes: Vec<Note> = voice
                    .notes
                    .iter()
                    .map(|n| {
                        let start = rescale(n.start, score.ticks_per_quarter);
                        let end = rescale(n.start.saturating_add(n.duration), score.ticks_per_quarter);
                        Note {
                            position: start,
                            duration: end - start,
                            tone: n.key,
                            lyric: n.lyric.clone().unwrap_or_else(|| DEFAULT_LYRIC.to_string()),
                            phonemes: Vec::new(),
                        }
                    })
                    .collect();
                let duration = notes.iter().map(Note::end).max().unwrap_or(0);

                project.parts.push(Part {
                    track_no: index,
                    name: voice.name.clone(),
                    position: 0,
                    duration,
                    notes,
                });
            }
            tracing::debug!(file = %file.name, voices = score.voices.len(), "Score imported");
        }

        project.phonemize(&self.phonemizers);
        project.validate()?;

        tracing::info!(
            name = %project.name,
            files = request.files.len(),
            tracks = project.tracks.len(),
            bpm = project.tempos[0].bpm,
            "Import completed"
        );
        Ok(project)
    }

    /// Explicit tempo, else the first file's tempo map, else inference on
    /// the first file's notes
    fn apply_tempo(&self, project: &mut Project, first: &Score, explicit: Option<f64>) {
        if let Some(bpm) = explicit {
            project.set_tempo(bpm);
        } else if !first.tempo_changes.is_empty() {
            let markers = first
                .tempo_changes
                .iter()
                .map(|t| TempoMarker::new(rescale(t.tick, first.ticks_per_quarter), t.bpm))
                .collect();
            project.set_tempo_map(markers);
        } else {
            let bpm = tempo::infer_bpm(&first.note_events(), first.ticks_per_quarter);
            tracing::info!(bpm, "No tempo in score, inferred from note timing");
            project.set_tempo(bpm);
        }
    }

    fn bind_track(&self, index: usize, request: &ImportRequest) -> Track {
        let mut track = Track::new(index);
        track.singer = request.voices.get(index).map(|name| self.singers.resolve(name));
        track.phonemizer = request.phonemizers.get(index).and_then(|id| {
            if self.phonemizers.contains(id) {
                Some(id.clone())
            } else {
                tracing::warn!(track = index, phonemizer = %id, "Unknown phonemizer, binding left unset");
                None
            }
        });
        track
    }
}
