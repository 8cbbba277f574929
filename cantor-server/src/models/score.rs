//! Score data produced by score readers
//!
//! Ticks here are in the source file's own resolution
//! (`Score::ticks_per_quarter`); the import pipeline rescales them.

/// Timing of one note, the only input tempo inference needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub start: u32,
    pub duration: u32,
}

impl NoteEvent {
    pub fn new(start: u32, duration: u32) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> u64 {
        self.start as u64 + self.duration as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreNote {
    pub start: u32,
    pub duration: u32,
    pub key: u8,
    pub lyric: Option<String>,
}

impl ScoreNote {
    pub fn event(&self) -> NoteEvent {
        NoteEvent::new(self.start, self.duration)
    }
}

/// One instrument/voice line; becomes one part on its own track
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVoice {
    pub name: String,
    pub notes: Vec<ScoreNote>,
}

/// Tempo change metadata found in the file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoChange {
    pub tick: u32,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub ticks_per_quarter: u32,
    pub tempo_changes: Vec<TempoChange>,
    pub voices: Vec<ScoreVoice>,
}

impl Score {
    /// Timing of every note across all voices, in start order
    pub fn note_events(&self) -> Vec<NoteEvent> {
        let mut events: Vec<NoteEvent> = self
            .voices
            .iter()
            .flat_map(|v| v.notes.iter().map(ScoreNote::event))
            .collect();
        events.sort_by_key(|e| (e.start, e.duration));
        events
    }
}
