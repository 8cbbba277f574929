//! Standard MIDI File fixtures

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

/// One instrument line, written as its own track
#[derive(Debug, Clone)]
pub struct VoiceSpec {
    pub name: &'static str,
    pub channel: u8,
    /// (start tick, duration, key)
    pub notes: Vec<(u32, u32, u8)>,
}

impl VoiceSpec {
    pub fn new(name: &'static str, notes: Vec<(u32, u32, u8)>) -> Self {
        Self {
            name,
            channel: 0,
            notes,
        }
    }

    /// Evenly spaced notes of one pitch
    pub fn pulse(name: &'static str, count: u32, spacing: u32, duration: u32, key: u8) -> Self {
        Self::new(
            name,
            (0..count).map(|i| (i * spacing, duration, key)).collect(),
        )
    }
}

/// Encode a format-1 MIDI file: an optional conductor track carrying
/// `tempo_us` (microseconds per quarter), then one track per voice
pub fn midi_file(ticks_per_quarter: u16, tempo_us: Option<u32>, voices: &[VoiceSpec]) -> Vec<u8> {
    let mut tracks: Vec<Vec<TrackEvent<'static>>> = Vec::new();

    if let Some(us) = tempo_us {
        tracks.push(vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us))),
            },
            end_of_track(0),
        ]);
    }

    for voice in voices {
        // (tick, is_note_on, key); note-offs sort before note-ons at one tick
        let mut timeline: Vec<(u32, bool, u8)> = Vec::new();
        for &(start, duration, key) in &voice.notes {
            timeline.push((start, true, key));
            timeline.push((start + duration, false, key));
        }
        timeline.sort();

        let mut events = vec![TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(voice.name.as_bytes())),
        }];
        let mut last = 0;
        for (tick, on, key) in timeline {
            let message = if on {
                MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(100),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                }
            };
            events.push(TrackEvent {
                delta: u28::new(tick - last),
                kind: TrackEventKind::Midi {
                    channel: u4::new(voice.channel),
                    message,
                },
            });
            last = tick;
        }
        events.push(end_of_track(0));
        tracks.push(events);
    }

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(ticks_per_quarter)),
    ));
    smf.tracks = tracks;

    let mut bytes = Vec::new();
    smf.write(&mut bytes).expect("MIDI fixture encodes");
    bytes
}

fn end_of_track(delta: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}
