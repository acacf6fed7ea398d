//! Core data types shared by the lifecycle service and the HTTP layer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{TtsError, TtsResult};

/// Message returned when the request body lacks usable text.
pub const MISSING_TEXT: &str = "Missing 'text' in body";

/// A synthesis request as accepted by `/tts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Request identifier, used for log correlation only.
    #[serde(skip_deserializing, default = "Uuid::new_v4")]
    pub request_id: Uuid,
    /// Text to synthesize. Empty strings are accepted.
    pub text: String,
    /// Optional path to a reference recording on the server's filesystem.
    #[serde(default)]
    pub voice_prompt: Option<String>,
}

impl SynthesisRequest {
    /// Create a new request for the default voice.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            text: text.into(),
            voice_prompt: None,
        }
    }

    /// Attach a voice prompt path.
    pub fn with_voice_prompt(mut self, path: impl Into<String>) -> Self {
        self.voice_prompt = Some(path.into());
        self
    }

    /// Parse and validate a raw JSON request body.
    ///
    /// Only the presence of `text` is checked; an empty string passes.
    pub fn from_json(body: &[u8]) -> TtsResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(TtsError::invalid_input(MISSING_TEXT));
        }

        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|_| TtsError::invalid_input(MISSING_TEXT))?;

        let object = match value {
            serde_json::Value::Object(map) if map.contains_key("text") => map,
            _ => return Err(TtsError::invalid_input(MISSING_TEXT)),
        };

        serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| {
            TtsError::invalid_input(format!("Invalid request body: {e}"))
        })
    }

    /// Decide which voice to synthesize with.
    ///
    /// A prompt that is empty or does not exist on disk falls back to the
    /// default voice without error.
    pub fn voice_mode(&self, clone_temperature: f32) -> VoiceMode {
        match self.voice_prompt.as_deref() {
            Some(path) if !path.is_empty() && Path::new(path).exists() => VoiceMode::Clone {
                reference: PathBuf::from(path),
                temperature: clone_temperature,
            },
            _ => VoiceMode::Default,
        }
    }
}

/// How the model should voice the output.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceMode {
    /// The model's built-in voice.
    Default,
    /// Mimic the speaker in a reference recording.
    Clone {
        /// Path to the reference recording.
        reference: PathBuf,
        /// Sampling temperature for cloned generation.
        temperature: f32,
    },
}

impl VoiceMode {
    /// Check if this mode clones a reference voice.
    pub fn is_clone(&self) -> bool {
        matches!(self, Self::Clone { .. })
    }
}

/// Model readiness as reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Readiness {
    /// The model is still being constructed.
    Loading,
    /// The model is loaded on `device`.
    Ready {
        /// Device identifier (`cuda`, `metal` or `cpu`).
        device: String,
    },
}

impl Readiness {
    /// Check if the model is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}
