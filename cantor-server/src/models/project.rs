//! In-memory project model
//!
//! A project is an ordered list of tracks, the parts bound to them, a tempo
//! map, and the expression definitions used by its notes. All positions are
//! in ticks at [`Project::resolution`] ticks per quarter note.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::services::phonemizers::{Phonemizer, PhonemizerRegistry};
use crate::services::singers::SingerCatalog;

/// Ticks per quarter note used for every project
pub const TICKS_PER_QUARTER: u32 = 480;

/// Tempo used when nothing else defines one
pub const DEFAULT_BPM: f64 = 120.0;

/// Default lyric for notes that carry none
pub const DEFAULT_LYRIC: &str = "a";

/// Tempo marker: `bpm` applies from `position` onward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoMarker {
    pub position: u32,
    pub bpm: f64,
}

impl TempoMarker {
    pub fn new(position: u32, bpm: f64) -> Self {
        Self { position, bpm }
    }
}

/// Voice bound to a track
///
/// `missing` marks a placeholder for a singer that is not installed; the
/// name is kept so the binding survives a later install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingerBinding {
    pub name: String,
    #[serde(default)]
    pub missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Position of this track in `Project::tracks`
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub singer: Option<SingerBinding>,
    /// Phonemizer registry key
    #[serde(default)]
    pub phonemizer: Option<String>,
}

impl Track {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            singer: None,
            phonemizer: None,
        }
    }
}

/// Note inside a part; `position` is relative to the part start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub position: u32,
    pub duration: u32,
    /// MIDI key number (60 = C4)
    pub tone: u8,
    #[serde(default = "default_lyric")]
    pub lyric: String,
    /// Output of the track's phonemizer; empty when the track has none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phonemes: Vec<String>,
}

impl Note {
    pub fn end(&self) -> u32 {
        self.position.saturating_add(self.duration)
    }
}

fn default_lyric() -> String {
    DEFAULT_LYRIC.to_string()
}

/// Time-localized block of notes owned by one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub track_no: usize,
    #[serde(default)]
    pub name: String,
    pub position: u32,
    pub duration: u32,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl Part {
    /// Absolute end tick, covering notes that run past `duration`
    pub fn end(&self) -> u32 {
        let notes_end = self.notes.iter().map(Note::end).max().unwrap_or(0);
        self.position.saturating_add(self.duration.max(notes_end))
    }
}

/// Expression definition (velocity, volume, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDescriptor {
    pub name: String,
    pub abbr: String,
    pub min: f32,
    pub max: f32,
    pub default_value: f32,
}

impl ExpressionDescriptor {
    fn new(name: &str, abbr: &str, min: f32, max: f32, default_value: f32) -> Self {
        Self {
            name: name.to_string(),
            abbr: abbr.to_string(),
            min,
            max,
            default_value,
        }
    }
}

/// Expressions every new project starts with
pub fn default_expressions() -> BTreeMap<String, ExpressionDescriptor> {
    [
        ExpressionDescriptor::new("velocity", "vel", 0.0, 200.0, 100.0),
        ExpressionDescriptor::new("volume", "vol", 0.0, 200.0, 100.0),
        ExpressionDescriptor::new("pitch deviation", "pit", -1200.0, 1200.0, 0.0),
        ExpressionDescriptor::new("breathiness", "bre", 0.0, 100.0, 0.0),
        ExpressionDescriptor::new("gender", "gen", -100.0, 100.0, 0.0),
    ]
    .into_iter()
    .map(|e| (e.abbr.clone(), e))
    .collect()
}

fn default_resolution() -> u32 {
    TICKS_PER_QUARTER
}

/// Identity shown to callers: `{name, filePath}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub name: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    /// Where the project was read from; not part of the serialized content
    #[serde(skip)]
    pub file_path: Option<PathBuf>,
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default)]
    pub tempos: Vec<TempoMarker>,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub expressions: BTreeMap<String, ExpressionDescriptor>,
}

impl Project {
    /// Empty project at the default tempo
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: None,
            resolution: TICKS_PER_QUARTER,
            tempos: vec![TempoMarker::new(0, DEFAULT_BPM)],
            tracks: Vec::new(),
            parts: Vec::new(),
            expressions: default_expressions(),
        }
    }

    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            name: self.name.clone(),
            file_path: self
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }
    }

    /// Replace the tempo map with a single marker at tick 0
    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempos.clear();
        self.tempos.push(TempoMarker::new(0, bpm));
    }

    /// Replace the tempo map, keeping the tick-0 invariant
    pub fn set_tempo_map(&mut self, markers: Vec<TempoMarker>) {
        self.tempos = markers;
        self.normalize_tempos();
    }

    /// Sort markers, drop duplicate positions (last one wins) and make sure
    /// tick 0 is defined
    pub fn normalize_tempos(&mut self) {
        self.tempos.sort_by_key(|t| t.position);

        let mut deduped: Vec<TempoMarker> = Vec::with_capacity(self.tempos.len());
        for marker in self.tempos.drain(..) {
            match deduped.last_mut() {
                Some(last) if last.position == marker.position => *last = marker,
                _ => deduped.push(marker),
            }
        }
        self.tempos = deduped;

        match self.tempos.first().map(|t| (t.position, t.bpm)) {
            None => self.tempos.push(TempoMarker::new(0, DEFAULT_BPM)),
            Some((position, bpm)) if position != 0 => {
                self.tempos.insert(0, TempoMarker::new(0, bpm));
            }
            Some(_) => {}
        }
    }

    /// End of the last part or note, in ticks
    pub fn duration_ticks(&self) -> u32 {
        self.parts.iter().map(Part::end).max().unwrap_or(0)
    }

    /// Convert an absolute tick to seconds through the tempo map
    pub fn tick_to_seconds(&self, tick: u32) -> f64 {
        let resolution = self.resolution.max(1) as f64;
        let mut seconds = 0.0;
        let mut segment_start = 0u32;
        let mut bpm = self.tempos.first().map(|t| t.bpm).unwrap_or(DEFAULT_BPM);

        for marker in self.tempos.iter().skip_while(|t| t.position == 0) {
            if marker.position >= tick {
                break;
            }
            seconds += (marker.position - segment_start) as f64 * 60.0 / (bpm * resolution);
            segment_start = marker.position;
            bpm = marker.bpm;
        }

        seconds + (tick - segment_start) as f64 * 60.0 / (bpm * resolution)
    }

    /// Total timeline length in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.tick_to_seconds(self.duration_ticks())
    }

    /// Structural checks applied before a project becomes active
    pub fn validate(&self) -> Result<()> {
        if self.resolution == 0 {
            return Err(Error::InvalidProject("resolution must be positive".to_string()));
        }
        if self.tempos.is_empty() {
            return Err(Error::InvalidProject("tempo map is empty".to_string()));
        }
        if self.tempos[0].position != 0 {
            return Err(Error::InvalidProject("no tempo marker at tick 0".to_string()));
        }
        if self.tempos.windows(2).any(|w| w[0].position >= w[1].position) {
            return Err(Error::InvalidProject(
                "tempo markers are not sorted by position".to_string(),
            ));
        }
        if let Some(bad) = self.tempos.iter().find(|t| !(t.bpm.is_finite() && t.bpm > 0.0)) {
            return Err(Error::InvalidProject(format!(
                "tempo at tick {} has invalid bpm {}",
                bad.position, bad.bpm
            )));
        }
        for (i, track) in self.tracks.iter().enumerate() {
            if track.index != i {
                return Err(Error::InvalidProject(format!(
                    "track at position {} reports index {}",
                    i, track.index
                )));
            }
        }
        if let Some(part) = self.parts.iter().find(|p| p.track_no >= self.tracks.len()) {
            return Err(Error::InvalidProject(format!(
                "part '{}' is bound to missing track {}",
                part.name, part.track_no
            )));
        }
        Ok(())
    }

    /// Binding pass run on every freshly read project
    ///
    /// Renumbers tracks, normalizes the tempo map, resolves singers against
    /// the catalog (unknown names become missing placeholders), drops
    /// phonemizer keys the registry does not know and phonemizes the notes.
    pub fn after_load(&mut self, singers: &SingerCatalog, phonemizers: &PhonemizerRegistry) {
        if self.resolution == 0 {
            self.resolution = TICKS_PER_QUARTER;
        }
        self.normalize_tempos();
        if self.expressions.is_empty() {
            self.expressions = default_expressions();
        }

        for (i, track) in self.tracks.iter_mut().enumerate() {
            track.index = i;
            track.singer = track
                .singer
                .take()
                .map(|binding| singers.resolve(&binding.name));
            if let Some(id) = &track.phonemizer {
                if !phonemizers.contains(id) {
                    tracing::warn!(track = i, phonemizer = %id, "Unknown phonemizer, binding cleared");
                    track.phonemizer = None;
                }
            }
        }

        self.phonemize(phonemizers);
    }

    /// Run each part's notes through its track's phonemizer
    ///
    /// Notes on tracks without a phonemizer end up with no phonemes.
    pub fn phonemize(&mut self, phonemizers: &PhonemizerRegistry) {
        let instances: Vec<Option<Box<dyn Phonemizer>>> = self
            .tracks
            .iter()
            .map(|t| t.phonemizer.as_deref().and_then(|id| phonemizers.create(id)))
            .collect();

        for part in &mut self.parts {
            let phonemizer = instances.get(part.track_no).and_then(Option::as_ref);
            for note in &mut part.notes {
                note.phonemes = match phonemizer {
                    Some(p) => p.phonemize(&note.lyric),
                    None => Vec::new(),
                };
            }
        }
    }
}
