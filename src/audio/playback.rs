//! Background playback of a generated section track on the default output
//! device. The cpal stream is not `Send`, so it lives on its own thread and is
//! torn down when the player is stopped or dropped.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use log::{info, warn};

use crate::error::AudioError;
use crate::models::Volume;

/// Output gain for each preferred volume level
pub fn gain_for(volume: Volume) -> f32 {
    match volume {
        Volume::VeryQuiet => 0.2,
        Volume::Quiet => 0.4,
        Volume::Moderate => 0.6,
        Volume::Loud => 0.8,
        Volume::VeryLoud => 1.0,
    }
}

/// Loops a WAV asset until stopped
pub struct BackgroundPlayer {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundPlayer {
    /// Start looping `wav` on the default output device
    pub fn start(wav: &[u8], volume: Volume) -> Result<Self, AudioError> {
        let (samples, channels, sample_rate) = decode(wav)?;
        if samples.is_empty() {
            return Err(AudioError::PlaybackFailed("nothing to play".to_string()));
        }

        let gain = gain_for(volume);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_flag);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

        let handle = std::thread::Builder::new()
            .name("section-playback".to_string())
            .spawn(move || {
                let stream = match open_stream(samples, channels, sample_rate, gain) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::PlaybackFailed(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while !thread_stop.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(100));
                }
                let _ = stream.pause();
            })
            .map_err(|e| AudioError::PlaybackFailed(format!("Failed to create playback thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Background playback started ({} Hz, {} ch)", sample_rate, channels);
                Ok(Self {
                    stop_flag,
                    handle: Some(handle),
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(AudioError::PlaybackFailed("playback thread exited".to_string())),
        }
    }

    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decode(wav: &[u8]) -> Result<(Vec<f32>, u16, u32), AudioError> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| AudioError::PlaybackFailed(e.to_string()))?;
    let spec = reader.spec();
    let samples = reader
        .into_samples::<i16>()
        .map(|s| s.map(|v| v as f32 / 32768.0))
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| AudioError::PlaybackFailed(e.to_string()))?;
    Ok((samples, spec.channels, spec.sample_rate))
}

fn open_stream(samples: Vec<f32>, channels: u16, sample_rate: u32, gain: f32) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::PlaybackFailed("no output device available".to_string()))?;

    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut position = 0usize;
    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    *out = samples[position] * gain;
                    position = (position + 1) % samples.len();
                }
            },
            move |err| warn!("Playback stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::PlaybackFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_increases_with_volume() {
        let gains: Vec<f32> = Volume::ALL.iter().map(|v| gain_for(*v)).collect();
        assert!(gains.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(gain_for(Volume::VeryLoud), 1.0);
    }

    #[test]
    fn test_decode_wav() {
        let wav = crate::audio::silence(Duration::from_millis(10), 8000);
        let (samples, channels, rate) = decode(&wav).unwrap();
        assert_eq!(samples.len(), 80);
        assert_eq!(channels, 1);
        assert_eq!(rate, 8000);
    }
}
