//! Alarm sound files and playback
//!
//! WAV files are decoded with `hound`. Playback on the default output device
//! needs the `sound` feature (cpal); without it `SoundClip` reports the
//! device as unsupported and `FallbackTone` switches to the terminal bell.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::actuator::{AlarmConfig, TerminalBell, ToneOutput};
use crate::AlertError;

/// Decoded alarm sound, samples interleaved and scaled to [-1, 1]
#[derive(Debug, Clone)]
pub struct SoundClip {
    path: PathBuf,
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl SoundClip {
    /// Load a WAV file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AlertError> {
        let path = path.as_ref().to_path_buf();
        let mut reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        Ok(Self {
            path,
            samples: samples.into(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Playing time of the clip
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.max(1)))
    }
}

impl ToneOutput for SoundClip {
    #[cfg(feature = "sound")]
    fn play_tone(&mut self) -> io::Result<()> {
        playback::play(self)
    }

    #[cfg(not(feature = "sound"))]
    fn play_tone(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "built without the `sound` feature",
        ))
    }
}

/// Plays `primary`, switching to `fallback` for good after its first failure
pub struct FallbackTone<P, F> {
    primary: P,
    fallback: F,
    primary_failed: bool,
}

impl<P: ToneOutput, F: ToneOutput> FallbackTone<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            primary_failed: false,
        }
    }

    pub fn using_fallback(&self) -> bool {
        self.primary_failed
    }
}

impl<P: ToneOutput, F: ToneOutput> ToneOutput for FallbackTone<P, F> {
    fn play_tone(&mut self) -> io::Result<()> {
        if !self.primary_failed {
            match self.primary.play_tone() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Alarm sound unavailable ({}), using fallback tone", e);
                    self.primary_failed = true;
                }
            }
        }
        self.fallback.play_tone()
    }
}

/// Tone output for the configured alarm: the sound file when it loads,
/// otherwise the terminal bell
pub fn open_tone_output(config: &AlarmConfig) -> Box<dyn ToneOutput> {
    let Some(path) = &config.sound_path else {
        return Box::new(TerminalBell);
    };

    match SoundClip::load(path) {
        Ok(clip) => {
            info!(
                "Alarm sound {} ({:?}, {} Hz, {} ch)",
                clip.path().display(),
                clip.duration(),
                clip.sample_rate(),
                clip.channels()
            );
            Box::new(FallbackTone::new(clip, TerminalBell))
        }
        Err(e) => {
            warn!("Cannot load alarm sound {}: {}", path.display(), e);
            Box::new(TerminalBell)
        }
    }
}

#[cfg(feature = "sound")]
mod playback {
    use std::io;
    use std::sync::Arc;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{FromSample, Sample, SizedSample};
    use tracing::warn;

    use super::SoundClip;

    /// Play the clip once on the default output device, blocking until done
    pub(super) fn play(clip: &SoundClip) -> io::Result<()> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no audio output device"))?;
        let supported = device.default_output_config().map_err(device_error)?;
        let config = supported.config();

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build::<f32>(&device, &config, clip)?,
            cpal::SampleFormat::I16 => build::<i16>(&device, &config, clip)?,
            cpal::SampleFormat::U16 => build::<u16>(&device, &config, clip)?,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unsupported output sample format {:?}", other),
                ))
            }
        };

        stream.play().map_err(device_error)?;
        std::thread::sleep(clip.duration());
        Ok(())
    }

    fn build<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        clip: &SoundClip,
    ) -> io::Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let samples: Arc<[f32]> = clip.samples.clone();
        let clip_channels = usize::from(clip.channels.max(1));
        let clip_rate = u64::from(clip.sample_rate.max(1));
        let out_channels = usize::from(config.channels.max(1));
        let out_rate = u64::from(config.sample_rate.0.max(1));
        let mut out_frame: u64 = 0;

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(out_channels) {
                        // Nearest-sample rate conversion
                        let clip_frame = (out_frame * clip_rate / out_rate) as usize;
                        for (ch, sample) in frame.iter_mut().enumerate() {
                            let idx = clip_frame * clip_channels + ch.min(clip_channels - 1);
                            *sample = T::from_sample(samples.get(idx).copied().unwrap_or(0.0));
                        }
                        out_frame += 1;
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(device_error)
    }

    fn device_error<E: std::fmt::Display>(e: E) -> io::Error {
        io::Error::new(io::ErrorKind::Other, e.to_string())
    }
}
