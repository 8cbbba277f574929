//! Score file reading
//!
//! Score files are parsed from in-memory buffers. Detection is by content
//! (magic bytes), not by file extension.

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::models::score::{Score, ScoreNote, ScoreVoice, TempoChange};

const MIDI_MIME: &str = "audio/midi";

/// Parses one score container into timed note data
pub trait ScoreReader: Send + Sync {
    /// `name` identifies the file in errors; `bytes` is its full content
    fn read(&self, name: &str, bytes: &[u8]) -> Result<Score>;
}

/// True when `bytes` look like a Standard MIDI File
pub fn is_midi(bytes: &[u8]) -> bool {
    infer::get(bytes).is_some_and(|kind| kind.mime_type() == MIDI_MIME)
}

/// Standard MIDI File reader
#[derive(Debug, Default, Clone, Copy)]
pub struct MidiScoreReader;

impl MidiScoreReader {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Default)]
struct VoiceBuilder {
    notes: Vec<ScoreNote>,
}

impl ScoreReader for MidiScoreReader {
    fn read(&self, name: &str, bytes: &[u8]) -> Result<Score> {
        if !is_midi(bytes) {
            return Err(Error::UnsupportedFormat(name.to_string()));
        }

        let smf = Smf::parse(bytes).map_err(|e| {
            tracing::warn!(file = %name, error = %e, "Malformed MIDI file");
            Error::UnsupportedFormat(name.to_string())
        })?;

        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(tpq) if tpq.as_int() > 0 => tpq.as_int() as u32,
            Timing::Metrical(_) | Timing::Timecode(..) => {
                tracing::warn!(file = %name, "MIDI file without metrical timing");
                return Err(Error::UnsupportedFormat(name.to_string()));
            }
        };

        let mut tempo_changes = Vec::new();
        let mut voices = Vec::new();

        for (track_index, track) in smf.tracks.iter().enumerate() {
            let mut tick: u32 = 0;
            let mut track_name: Option<String> = None;
            let mut lyrics: HashMap<u32, String> = HashMap::new();
            // Open notes per (channel, key), paired first-in first-out
            let mut open: HashMap<(u8, u8), VecDeque<u32>> = HashMap::new();
            let mut groups: BTreeMap<u8, VoiceBuilder> = BTreeMap::new();

            for event in track {
                tick = tick.saturating_add(event.delta.as_int());
                match event.kind {
                    TrackEventKind::Midi { channel, message } => {
                        let channel = channel.as_int();
                        match message {
                            MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                                open.entry((channel, key.as_int()))
                                    .or_default()
                                    .push_back(tick);
                            }
                            MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                                let key = key.as_int();
                                if let Some(start) =
                                    open.get_mut(&(channel, key)).and_then(VecDeque::pop_front)
                                {
                                    groups.entry(channel).or_default().notes.push(ScoreNote {
                                        start,
                                        duration: tick - start,
                                        key,
                                        lyric: None,
                                    });
                                }
                            }
                            _ => {}
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                        let us = us_per_quarter.as_int();
                        if us > 0 {
                            tempo_changes.push(TempoChange {
                                tick,
                                bpm: 60_000_000.0 / us as f64,
                            });
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                        let text = String::from_utf8_lossy(raw).trim().to_string();
                        if !text.is_empty() {
                            track_name = Some(text);
                        }
                    }
                    TrackEventKind::Meta(MetaMessage::Lyric(raw)) => {
                        let text = String::from_utf8_lossy(raw).trim().to_string();
                        if !text.is_empty() {
                            lyrics.insert(tick, text);
                        }
                    }
                    _ => {}
                }
            }

            // Unterminated notes end with their track
            for ((channel, key), starts) in open {
                for start in starts {
                    groups.entry(channel).or_default().notes.push(ScoreNote {
                        start,
                        duration: tick - start,
                        key,
                        lyric: None,
                    });
                }
            }

            let multi_channel = groups.len() > 1;
            for (channel, mut builder) in groups {
                builder.notes.sort_by_key(|n| (n.start, n.key));
                for note in &mut builder.notes {
                    note.lyric = lyrics.get(&note.start).cloned();
                }

                let base = track_name
                    .clone()
                    .unwrap_or_else(|| format!("Track {}", track_index + 1));
                let name = if multi_channel {
                    format!("{} (ch {})", base, channel + 1)
                } else {
                    base
                };
                voices.push(ScoreVoice {
                    name,
                    notes: builder.notes,
                });
            }
        }

        tempo_changes.sort_by_key(|t| t.tick);

        tracing::debug!(
            file = %name,
            ticks_per_quarter,
            voices = voices.len(),
            tempo_changes = tempo_changes.len(),
            "Parsed MIDI score"
        );

        Ok(Score {
            ticks_per_quarter,
            tempo_changes,
            voices,
        })
    }
}
