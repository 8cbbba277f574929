//! PCM file writing

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io;
use std::path::Path;

use crate::services::mixdown::PcmBuffer;

/// Writes a PCM buffer to an audio file
pub trait PcmWriter: Send + Sync {
    fn write(&self, path: &Path, buffer: &PcmBuffer) -> io::Result<()>;
}

/// 16-bit integer PCM WAV
#[derive(Debug, Default, Clone, Copy)]
pub struct WavPcmWriter;

fn to_io(e: hound::Error) -> io::Error {
    match e {
        hound::Error::IoError(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}

impl PcmWriter for WavPcmWriter {
    fn write(&self, path: &Path, buffer: &PcmBuffer) -> io::Result<()> {
        if buffer.channels == 0 || buffer.sample_rate == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer has no channels or sample rate",
            ));
        }

        let spec = WavSpec {
            channels: buffer.channels,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec).map_err(to_io)?;
        for s in &buffer.samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .map_err(to_io)?;
        }
        writer.finalize().map_err(to_io)
    }
}
