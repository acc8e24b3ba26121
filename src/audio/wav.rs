//! 16-bit PCM to WAV framing.
//!
//! Raw model output is a flat run of little-endian `i16` samples. The encoder
//! reshapes it into whole frames for the requested channel count and wraps it
//! in a RIFF/WAVE container. Trailing data that does not fill a whole frame
//! (an odd byte, or an odd sample count for stereo) is dropped.

use std::io::Cursor;
use std::time::Duration;

use log::debug;

use crate::error::AudioError;

/// Layout of raw PCM input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    /// Bytes per sample (only 2 is supported)
    pub sample_width: u16,
    pub frame_rate: u32,
}

impl PcmFormat {
    /// Raw output of the music model: 48 kHz, 16-bit, stereo
    pub const GENERATED_MUSIC: PcmFormat = PcmFormat {
        channels: 2,
        sample_width: 2,
        frame_rate: 48_000,
    };

    pub fn mono(frame_rate: u32) -> Self {
        Self { channels: 1, sample_width: 2, frame_rate }
    }

    pub fn stereo(frame_rate: u32) -> Self {
        Self { channels: 2, sample_width: 2, frame_rate }
    }

    fn validate(&self) -> Result<(), AudioError> {
        if self.sample_width != 2 {
            return Err(AudioError::UnsupportedSampleWidth { width: self.sample_width });
        }
        if self.channels == 0 {
            return Err(AudioError::InvalidFormat("channel count must be at least 1".to_string()));
        }
        if self.frame_rate == 0 {
            return Err(AudioError::InvalidFormat("frame rate must be positive".to_string()));
        }
        Ok(())
    }

    fn spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.frame_rate,
            bits_per_sample: self.sample_width * 8,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Frames raw PCM bytes into a WAV container
#[derive(Debug, Clone, Copy)]
pub struct AudioFrameEncoder {
    format: PcmFormat,
}

impl AudioFrameEncoder {
    pub fn new(format: PcmFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Encode little-endian 16-bit PCM bytes
    pub fn encode(&self, raw: &[u8]) -> Result<Vec<u8>, AudioError> {
        self.format.validate()?;
        if raw.len() % 2 != 0 {
            debug!("Ignoring trailing odd byte in {}-byte PCM buffer", raw.len());
        }
        let samples = pcm16_samples(raw);
        self.encode_samples(&samples)
    }

    /// Encode interleaved samples, dropping any trailing partial frame
    pub fn encode_samples(&self, samples: &[i16]) -> Result<Vec<u8>, AudioError> {
        self.format.validate()?;

        let channels = self.format.channels as usize;
        let usable = samples.len() - samples.len() % channels;
        if usable < samples.len() {
            debug!(
                "Truncating {} trailing sample(s) so {} samples fit {} channels",
                samples.len() - usable,
                samples.len(),
                channels
            );
        }

        let mut buffer = Vec::with_capacity(44 + usable * 2);
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), self.format.spec())
                .map_err(|e| AudioError::EncodeFailed(e.to_string()))?;

            for &sample in &samples[..usable] {
                writer
                    .write_sample(sample)
                    .map_err(|e| AudioError::EncodeFailed(e.to_string()))?;
            }

            writer.finalize().map_err(|e| AudioError::EncodeFailed(e.to_string()))?;
        }

        Ok(buffer)
    }
}

/// Reinterpret little-endian byte pairs as samples
pub fn pcm16_samples(raw: &[u8]) -> Vec<i16> {
    raw.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Most 16-bit mono frames whose data chunk fits the 32-bit RIFF size fields
const MAX_MONO_FRAMES: u64 = (u32::MAX as u64 - 44) / 2;

/// All-zero mono WAV of the given length. Never fails: an encoding error
/// yields an empty buffer.
pub fn silence(duration: Duration, sample_rate: u32) -> Vec<u8> {
    let frames = (duration.as_secs_f64() * sample_rate as f64).round();
    if frames > MAX_MONO_FRAMES as f64 {
        log::error!(
            "Could not synthesize silence: {}s at {} Hz exceeds the WAV size limit",
            duration.as_secs(),
            sample_rate
        );
        return Vec::new();
    }
    let samples = vec![0i16; frames as usize];
    AudioFrameEncoder::new(PcmFormat::mono(sample_rate))
        .encode_samples(&samples)
        .unwrap_or_else(|e| {
            log::error!("Could not synthesize silence: {}", e);
            Vec::new()
        })
}
