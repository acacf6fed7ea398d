//! Bundled reference backend.
//!
//! A deterministic tone synthesizer that honours the [`SpeechModel`]
//! contract without model weights, so the server can run and be tested
//! anywhere. Each non-space character becomes a short enveloped tone and
//! whitespace becomes a pause. In clone mode the reference recording is
//! decoded and its loudness is matched; temperature scales a seeded
//! variation term.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use tts_core::{TtsError, TtsResult, VoiceMode};

use crate::model::{ModelLoader, SpeechModel};
use crate::wav::read_wav_mono;

/// Output sample rate of the reference backend.
pub const REFERENCE_SAMPLE_RATE: u32 = 24_000;

const SEGMENT_MS: u32 = 60;
const MIN_OUTPUT_MS: u32 = 100;
const BASE_FREQ_HZ: f32 = 120.0;
const FREQ_STEP_HZ: f32 = 15.0;
const AMPLITUDE: f32 = 0.3;
const VARIATION: f32 = 0.005;

/// Loader for [`ReferenceModel`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceLoader;

impl ModelLoader for ReferenceLoader {
    fn name(&self) -> &str {
        "reference"
    }

    fn load(&self, device: &Device) -> TtsResult<Box<dyn SpeechModel>> {
        Ok(Box::new(ReferenceModel::new(device.clone())))
    }
}

/// Deterministic tone synthesizer placed on a device.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    device: Device,
    sample_rate: u32,
}

impl ReferenceModel {
    /// Create a reference model on `device`.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            sample_rate: REFERENCE_SAMPLE_RATE,
        }
    }

    fn render(&self, text: &str) -> Vec<f32> {
        let segment = (self.sample_rate * SEGMENT_MS / 1000) as usize;
        let mut pcm = Vec::with_capacity(segment * text.chars().count());

        for c in text.chars() {
            if c.is_whitespace() {
                pcm.extend(std::iter::repeat(0.0).take(segment));
                continue;
            }

            let freq = BASE_FREQ_HZ + (u32::from(c) % 24) as f32 * FREQ_STEP_HZ;
            for i in 0..segment {
                let t = i as f32 / self.sample_rate as f32;
                let window =
                    0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / segment as f32).cos());
                pcm.push(AMPLITUDE * window * (2.0 * std::f32::consts::PI * freq * t).sin());
            }
        }

        let min_len = (self.sample_rate * MIN_OUTPUT_MS / 1000) as usize;
        if pcm.len() < min_len {
            pcm.resize(min_len, 0.0);
        }
        pcm
    }
}

impl SpeechModel for ReferenceModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&self, text: &str, voice: &VoiceMode) -> TtsResult<Tensor> {
        let mut pcm = self.render(text);

        if let VoiceMode::Clone {
            reference,
            temperature,
        } = voice
        {
            let (prompt, prompt_rate) = read_wav_mono(reference).map_err(|e| {
                TtsError::inference(format!(
                    "failed to read voice prompt {}: {e}",
                    reference.display()
                ))
            })?;

            let target = rms(&prompt).clamp(0.01, 0.9);
            let current = rms(&pcm);
            let gain = if current > 0.0 { target / current } else { 1.0 };

            let mut rng = StdRng::seed_from_u64(seed_for(text));
            let spread = VARIATION * temperature;
            for s in pcm.iter_mut() {
                let jitter = if spread > 0.0 {
                    rng.gen_range(-spread..spread)
                } else {
                    0.0
                };
                *s = (*s * gain + jitter).clamp(-1.0, 1.0);
            }

            debug!(
                prompt_samples = prompt.len(),
                prompt_rate,
                gain,
                "Applied voice prompt"
            );
        }

        let len = pcm.len();
        Tensor::from_vec(pcm, (1, len), &self.device).map_err(|e| TtsError::inference(e.to_string()))
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

fn seed_for(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::to_mono;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_prompt(path: &std::path::Path, amplitude: f32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..1600 {
            let s = if i % 2 == 0 { amplitude } else { -amplitude };
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_loader_places_model_on_device() {
        let model = ReferenceLoader.load(&Device::Cpu).unwrap();
        assert_eq!(model.sample_rate(), REFERENCE_SAMPLE_RATE);
    }

    #[test]
    fn test_default_voice_length_tracks_text() {
        let model = ReferenceModel::new(Device::Cpu);
        let wav = model.generate("ab c", &VoiceMode::Default).unwrap();

        let (channels, samples) = wav.dims2().unwrap();
        assert_eq!(channels, 1);
        assert_eq!(samples, 4 * 1440);
    }

    #[test]
    fn test_empty_text_yields_short_silence() {
        let model = ReferenceModel::new(Device::Cpu);
        let pcm = to_mono(&model.generate("", &VoiceMode::Default).unwrap()).unwrap();
        assert_eq!(pcm.len(), 2400);
        assert!(pcm.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_default_voice_is_deterministic_and_bounded() {
        let model = ReferenceModel::new(Device::Cpu);
        let a = to_mono(&model.generate("Hello", &VoiceMode::Default).unwrap()).unwrap();
        let b = to_mono(&model.generate("Hello", &VoiceMode::Default).unwrap()).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_clone_matches_prompt_loudness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.wav");
        write_prompt(&path, 0.2);

        let model = ReferenceModel::new(Device::Cpu);
        let voice = VoiceMode::Clone {
            reference: path,
            temperature: 0.8,
        };
        let pcm = to_mono(&model.generate("Hello", &voice).unwrap()).unwrap();

        assert!((rms(&pcm) - 0.2).abs() < 0.01, "rms was {}", rms(&pcm));
    }

    #[test]
    fn test_clone_with_unreadable_prompt_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"nope").unwrap();

        let model = ReferenceModel::new(Device::Cpu);
        let voice = VoiceMode::Clone {
            reference: path,
            temperature: 0.8,
        };
        let err = model.generate("Hello", &voice).unwrap_err();
        assert!(matches!(err, TtsError::Inference(_)));
        assert!(err.to_string().contains("failed to read voice prompt"));
    }
}
