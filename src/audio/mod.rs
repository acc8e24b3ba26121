pub mod wav;

#[cfg(feature = "playback")]
pub mod playback;

use std::io::Cursor;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;
use crate::models::AudioAsset;

pub use wav::{silence, AudioFrameEncoder, PcmFormat};

/// Read the declared format of an in-memory WAV container
pub fn probe(bytes: &[u8]) -> Result<AudioAsset, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::ProbeFailed("empty audio buffer".to_string()));
    }

    let media_source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioError::ProbeFailed(e.to_string()))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| AudioError::ProbeFailed("no audio track found".to_string()))?;
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| AudioError::ProbeFailed("missing sample rate".to_string()))?;
    let channel_count = params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| AudioError::ProbeFailed("missing channel layout".to_string()))?;

    Ok(AudioAsset {
        sample_rate,
        channel_count,
        bit_depth: params.bits_per_sample.map(|b| b as u16).unwrap_or(16),
        frame_count: params.n_frames.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_probe_generated_music() {
        let raw: Vec<u8> = (0..960i16).flat_map(|s| s.to_le_bytes()).collect();
        let wav = AudioFrameEncoder::new(PcmFormat::GENERATED_MUSIC).encode(&raw).unwrap();

        let asset = probe(&wav).unwrap();
        assert_eq!(asset.sample_rate, 48000);
        assert_eq!(asset.channel_count, 2);
        assert_eq!(asset.bit_depth, 16);
        assert_eq!(asset.frame_count, 480);
        assert_eq!(asset.payload_len(), raw.len() as u64);
    }

    #[test]
    fn test_probe_silence() {
        let asset = probe(&silence(Duration::from_secs(2), 44100)).unwrap();
        assert_eq!(asset.channel_count, 1);
        assert_eq!(asset.frame_count, 88200);
        assert_eq!(asset.duration_secs(), 2.0);
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(probe(&[]).is_err());
        assert!(matches!(probe(b"definitely not a wav file"), Err(AudioError::ProbeFailed(_))));
    }
}
