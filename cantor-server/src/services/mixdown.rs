//! Mixdown engines
//!
//! A mixdown turns a whole project into one interleaved PCM buffer. Engines
//! are blocking and check the cancellation token as they go; the render
//! orchestrator runs them on the blocking pool.

use std::f64::consts::TAU;
use tokio_util::sync::CancellationToken;

use crate::models::project::Project;

/// Longest timeline the guide-tone engine will render
const MAX_RENDER_SECONDS: f64 = 3600.0;

/// Interleaved PCM samples in `[-1.0, 1.0]`
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    pub fn silent(sample_rate: u32, channels: u16, frames: usize) -> Self {
        Self {
            sample_rate,
            channels,
            samples: vec![0.0; frames * channels as usize],
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MixdownError {
    #[error("mixdown cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),
}

/// Renders a project to PCM
pub trait MixdownEngine: Send + Sync {
    fn mix(&self, project: &Project, cancel: &CancellationToken) -> Result<PcmBuffer, MixdownError>;
}

/// Stereo sine guide tones, one per note
///
/// Each note sounds at its MIDI pitch with a short linear attack and
/// release; the sum is soft-limited with `tanh`. The buffer spans exactly
/// the project timeline.
#[derive(Debug, Clone)]
pub struct GuideToneMixdown {
    sample_rate: u32,
    amplitude: f32,
    ramp_seconds: f64,
}

impl GuideToneMixdown {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            amplitude: 0.25,
            ramp_seconds: 0.005,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Default for GuideToneMixdown {
    fn default() -> Self {
        Self::new(44_100)
    }
}

fn key_to_hz(key: u8) -> f64 {
    440.0 * 2f64.powf((key as f64 - 69.0) / 12.0)
}

impl MixdownEngine for GuideToneMixdown {
    fn mix(&self, project: &Project, cancel: &CancellationToken) -> Result<PcmBuffer, MixdownError> {
        let total_seconds = project.duration_seconds();
        if !total_seconds.is_finite() || total_seconds > MAX_RENDER_SECONDS {
            return Err(MixdownError::Failed(format!(
                "timeline of {:.1}s exceeds the {}s render limit",
                total_seconds, MAX_RENDER_SECONDS
            )));
        }

        let rate = self.sample_rate as f64;
        let frames = (total_seconds * rate).round() as usize;
        let mut mono = vec![0f32; frames];
        let ramp = ((self.ramp_seconds * rate) as usize).max(1);

        for part in &project.parts {
            for note in &part.notes {
                if cancel.is_cancelled() {
                    return Err(MixdownError::Cancelled);
                }

                let start_tick = part.position.saturating_add(note.position);
                let end_tick = start_tick.saturating_add(note.duration);
                let first = (project.tick_to_seconds(start_tick) * rate).round() as usize;
                let last = ((project.tick_to_seconds(end_tick) * rate).round() as usize).min(frames);
                if first >= last {
                    continue;
                }

                let len = last - first;
                let step = TAU * key_to_hz(note.tone) / rate;
                for (i, sample) in mono[first..last].iter_mut().enumerate() {
                    let envelope = (i.min(len - 1 - i) as f32 / ramp as f32).min(1.0);
                    *sample += self.amplitude * envelope * (step * i as f64).sin() as f32;
                }
            }
        }

        let mut samples = Vec::with_capacity(frames * 2);
        for s in mono {
            let limited = s.tanh();
            samples.push(limited);
            samples.push(limited);
        }

        Ok(PcmBuffer {
            sample_rate: self.sample_rate,
            channels: 2,
            samples,
        })
    }
}
