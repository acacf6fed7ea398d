//! Model lifecycle and synthesis service.
//!
//! `SpeechService` owns the single model handle of the process. It starts
//! in the loading state, is loaded exactly once, and afterwards serves
//! synthesis requests one at a time.

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use tokio::sync::Mutex;
use tracing::{Span, debug, info, instrument};

use tts_core::{
    DEFAULT_MAX_TEXT_CHARS, Readiness, SynthesisRequest, TtsError, TtsResult, VoiceMode,
};

use crate::device::{DevicePreference, device_label, select_device};
use crate::model::{ModelLoader, SpeechModel};
use crate::wav;

struct LoadedModel {
    model: Arc<dyn SpeechModel>,
    device: &'static str,
    sample_rate: u32,
}

/// Process-wide speech synthesis service.
pub struct SpeechService {
    model: OnceCell<LoadedModel>,
    /// Held for the whole inference, including the blocking task.
    gate: Arc<Mutex<()>>,
    clone_temperature: f32,
    max_text_chars: usize,
}

impl SpeechService {
    /// Create an unloaded service.
    ///
    /// `clone_temperature` is passed to the model whenever a request
    /// carries a usable voice prompt.
    pub fn new(clone_temperature: f32) -> Self {
        Self {
            model: OnceCell::new(),
            gate: Arc::new(Mutex::new(())),
            clone_temperature,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }

    /// Set the longest text, in characters, a single request may carry.
    pub fn with_max_text_chars(mut self, max_text_chars: usize) -> Self {
        self.max_text_chars = max_text_chars;
        self
    }

    /// Select a device and construct the model on it.
    ///
    /// Only the first successful call has any effect; later calls return
    /// immediately. A failure leaves the service in the loading state.
    /// Blocks the calling thread for the duration of the load.
    pub fn load(&self, loader: &dyn ModelLoader, preference: DevicePreference) -> TtsResult<()> {
        if self.model.get().is_some() {
            debug!("Model already loaded, skipping");
            return Ok(());
        }

        self.model.get_or_try_init(|| {
            info!(backend = loader.name(), device = %preference, "Loading speech model");
            let start = Instant::now();

            let device = select_device(preference)?;
            let model = loader.load(&device)?;
            let sample_rate = model.sample_rate();
            let label = device_label(&device);

            info!(
                device = label,
                sample_rate,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Speech model loaded"
            );

            Ok::<_, TtsError>(LoadedModel {
                model: Arc::from(model),
                device: label,
                sample_rate,
            })
        })?;

        Ok(())
    }

    /// Current readiness.
    pub fn readiness(&self) -> Readiness {
        match self.model.get() {
            Some(loaded) => Readiness::Ready {
                device: loaded.device.to_string(),
            },
            None => Readiness::Loading,
        }
    }

    /// Check if the model is loaded.
    pub fn is_ready(&self) -> bool {
        self.model.get().is_some()
    }

    /// Sample rate of the loaded model.
    pub fn sample_rate(&self) -> Option<u32> {
        self.model.get().map(|loaded| loaded.sample_rate)
    }

    /// Synthesize a request into WAV bytes.
    ///
    /// Requests are serialized: the next inference starts only after the
    /// previous one has finished, even if its caller has gone away.
    #[instrument(
        skip(self, request),
        fields(request_id = %request.request_id, text_len = request.text.len())
    )]
    pub async fn synthesize(&self, request: SynthesisRequest) -> TtsResult<Vec<u8>> {
        let loaded = self.model.get().ok_or(TtsError::NotReady)?;
        let model = Arc::clone(&loaded.model);
        let sample_rate = loaded.sample_rate;

        let chars = request.text.chars().count();
        if chars > self.max_text_chars {
            return Err(TtsError::invalid_input(format!(
                "text too long ({chars} chars, max {})",
                self.max_text_chars
            )));
        }

        let voice = request.voice_mode(self.clone_temperature);
        match &voice {
            VoiceMode::Clone { reference, .. } => {
                info!(reference = %reference.display(), "Generating with voice clone")
            }
            VoiceMode::Default => info!("Generating with default voice"),
        }

        let guard = Arc::clone(&self.gate).lock_owned().await;
        let span = Span::current();
        let start = Instant::now();

        let bytes = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let _entered = span.enter();

            let waveform = model.generate(&request.text, &voice)?;
            let samples = wav::to_mono(&waveform)?;
            wav::encode_wav(&samples, sample_rate)
        })
        .await
        .map_err(|e| TtsError::internal(format!("synthesis task failed: {e}")))??;

        debug!(
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Synthesis completed"
        );

        Ok(bytes)
    }
}

impl std::fmt::Debug for SpeechService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechService")
            .field("readiness", &self.readiness())
            .field("clone_temperature", &self.clone_temperature)
            .field("max_text_chars", &self.max_text_chars)
            .finish()
    }
}
