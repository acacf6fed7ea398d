//! Pretrained Parler-TTS backend.
//!
//! Loads a Parler-TTS checkpoint from a local directory laid out the way
//! the published checkpoints are:
//!
//! - `config.json`
//! - `tokenizer.json`
//! - `model.safetensors`, or shards listed in `model.safetensors.index.json`
//!
//! Parler conditions the voice on a text description instead of a recorded
//! sample. A voice prompt therefore keeps only its sampling temperature; the
//! speaker comes from the configured description.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::parler_tts::{Config, Model};
use parking_lot::Mutex;
use serde_json::Value;
use tokenizers::Tokenizer;
use tracing::{debug, info, instrument, warn};

use tts_core::{TtsError, TtsResult, VoiceMode};

use crate::model::{ModelLoader, SpeechModel};

/// Speaker description used when none is configured.
pub const DEFAULT_DESCRIPTION: &str = "A female speaker delivers a slightly expressive and \
    animated speech with a moderate speed and pitch. The recording is of very high quality, \
    with the speaker's voice sounding clear and very close up.";

/// Upper bound on decoder steps per request.
pub const DEFAULT_MAX_STEPS: usize = 512;

/// DAC rate of the published checkpoints, used if `config.json` omits it.
const FALLBACK_SAMPLE_RATE: u32 = 44_100;

const SAMPLING_SEED: u64 = 299_792_458;

/// Loads a Parler-TTS checkpoint from `model_dir`.
#[derive(Debug, Clone)]
pub struct ParlerLoader {
    model_dir: PathBuf,
    description: String,
    max_steps: usize,
}

impl ParlerLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            description: DEFAULT_DESCRIPTION.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Replace the speaker description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Limit the number of decoder steps, and thus the output duration.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}

impl ModelLoader for ParlerLoader {
    fn name(&self) -> &str {
        "parler-tts"
    }

    #[instrument(skip_all, fields(model_dir = %self.model_dir.display()))]
    fn load(&self, device: &Device) -> TtsResult<Box<dyn SpeechModel>> {
        let dir = &self.model_dir;
        if !dir.is_dir() {
            return Err(TtsError::model_load(format!(
                "model directory {} does not exist",
                dir.display()
            )));
        }

        let raw_config = read_json(&dir.join("config.json"))?;
        let sample_rate = sample_rate_of(&raw_config);
        let config: Config = serde_json::from_value(raw_config)
            .map_err(|e| TtsError::model_load(format!("invalid Parler-TTS config: {e}")))?;

        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            TtsError::model_load(format!(
                "failed to load tokenizer {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let mut tensors = HashMap::new();
        for path in weight_files(dir)? {
            debug!(path = %path.display(), "Loading weights");
            let shard = candle_core::safetensors::load(&path, device).map_err(|e| {
                TtsError::model_load(format!("failed to load {}: {e}", path.display()))
            })?;
            tensors.extend(shard);
        }
        info!(tensors = tensors.len(), "Weights loaded");

        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        let model = Model::new(&config, vb)
            .map_err(|e| TtsError::model_load(format!("failed to build Parler-TTS: {e}")))?;

        let description = encode(&tokenizer, &self.description, device)
            .map_err(|e| TtsError::model_load(format!("failed to encode description: {e}")))?;

        info!(sample_rate, max_steps = self.max_steps, "Parler-TTS ready");

        Ok(Box::new(ParlerModel {
            model: Mutex::new(model),
            tokenizer,
            description,
            device: device.clone(),
            sample_rate,
            max_steps: self.max_steps,
        }))
    }
}

/// A loaded Parler-TTS model.
pub struct ParlerModel {
    /// Generation mutates the decoder's KV cache.
    model: Mutex<Model>,
    tokenizer: Tokenizer,
    description: Tensor,
    device: Device,
    sample_rate: u32,
    max_steps: usize,
}

impl SpeechModel for ParlerModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&self, text: &str, voice: &VoiceMode) -> TtsResult<Tensor> {
        let temperature = match voice {
            VoiceMode::Default => None,
            VoiceMode::Clone {
                reference,
                temperature,
            } => {
                warn!(
                    reference = %reference.display(),
                    "Parler-TTS cannot condition on audio, using the configured description"
                );
                Some(f64::from(*temperature))
            }
        };

        let prompt = encode(&self.tokenizer, text, &self.device)?;
        let logits = LogitsProcessor::new(SAMPLING_SEED, temperature, None);

        let mut model = self.model.lock();
        let codes = model
            .generate(&prompt, &self.description, logits, self.max_steps)
            .map_err(|e| TtsError::inference(e.to_string()))?;
        debug!(shape = ?codes.shape(), "Audio codes generated");

        let codes = codes
            .to_dtype(DType::I64)
            .and_then(|codes| codes.unsqueeze(0))
            .and_then(|codes| codes.to_device(&self.device))
            .map_err(|e| TtsError::inference(e.to_string()))?;

        model
            .audio_encoder
            .decode_codes(&codes)
            .map_err(|e| TtsError::inference(format!("codec decode failed: {e}")))
    }
}

impl std::fmt::Debug for ParlerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParlerModel")
            .field("device", &self.device)
            .field("sample_rate", &self.sample_rate)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Tokenize `text` into a `(1, tokens)` tensor.
fn encode(tokenizer: &Tokenizer, text: &str, device: &Device) -> TtsResult<Tensor> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| TtsError::inference(format!("tokenization failed: {e}")))?;

    Tensor::new(encoding.get_ids(), device)
        .and_then(|ids| ids.unsqueeze(0))
        .map_err(|e| TtsError::inference(e.to_string()))
}

fn read_json(path: &Path) -> TtsResult<Value> {
    let file = File::open(path)
        .map_err(|e| TtsError::model_load(format!("failed to open {}: {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| TtsError::model_load(format!("invalid JSON in {}: {e}", path.display())))
}

fn sample_rate_of(config: &Value) -> u32 {
    config
        .pointer("/audio_encoder/sampling_rate")
        .and_then(Value::as_u64)
        .and_then(|rate| u32::try_from(rate).ok())
        .unwrap_or(FALLBACK_SAMPLE_RATE)
}

/// Resolve the safetensors files of a checkpoint, single-file or sharded.
fn weight_files(dir: &Path) -> TtsResult<Vec<PathBuf>> {
    let single = dir.join("model.safetensors");
    if single.is_file() {
        return Ok(vec![single]);
    }

    let index = dir.join("model.safetensors.index.json");
    if !index.is_file() {
        return Err(TtsError::model_load(format!(
            "no model.safetensors or model.safetensors.index.json in {}",
            dir.display()
        )));
    }

    let index_json = read_json(&index)?;
    let weight_map = index_json
        .get("weight_map")
        .and_then(Value::as_object)
        .ok_or_else(|| TtsError::model_load(format!("{} has no weight_map", index.display())))?;

    let mut files: Vec<PathBuf> = weight_map
        .values()
        .filter_map(Value::as_str)
        .map(|name| dir.join(name))
        .collect();
    files.sort();
    files.dedup();

    if files.is_empty() {
        return Err(TtsError::model_load(format!(
            "{} lists no weight files",
            index.display()
        )));
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_directory_is_load_error() {
        let loader = ParlerLoader::new("/no/such/parler/checkpoint");
        let err = loader.load(&Device::Cpu).err().unwrap();
        assert!(matches!(err, TtsError::ModelLoad(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_missing_config_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ParlerLoader::new(dir.path()).load(&Device::Cpu).err().unwrap();
        assert!(matches!(err, TtsError::ModelLoad(_)));
        assert!(err.to_string().contains("config.json"), "{err}");
    }

    #[test]
    fn test_incomplete_config_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            json!({"audio_encoder": {"sampling_rate": 44100}}).to_string(),
        )
        .unwrap();

        let err = ParlerLoader::new(dir.path()).load(&Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("invalid Parler-TTS config"), "{err}");
    }

    #[test]
    fn test_sample_rate_from_config() {
        let config = json!({"audio_encoder": {"sampling_rate": 24000}});
        assert_eq!(sample_rate_of(&config), 24000);
        assert_eq!(sample_rate_of(&json!({})), FALLBACK_SAMPLE_RATE);
    }

    #[test]
    fn test_weight_files_single() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.safetensors"), b"").unwrap();

        let files = weight_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("model.safetensors")]);
    }

    #[test]
    fn test_weight_files_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let index = json!({
            "weight_map": {
                "decoder.a": "model-00002-of-00002.safetensors",
                "decoder.b": "model-00001-of-00002.safetensors",
                "text_encoder.c": "model-00001-of-00002.safetensors",
            }
        });
        std::fs::write(
            dir.path().join("model.safetensors.index.json"),
            index.to_string(),
        )
        .unwrap();

        let files = weight_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_weight_files_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = weight_files(dir.path()).unwrap_err();
        assert!(matches!(err, TtsError::ModelLoad(_)));
    }
}
