//! Trait seam between the lifecycle service and a speech model backend.

use candle_core::{Device, Tensor};
use tts_core::{TtsResult, VoiceMode};

/// A loaded text-to-speech model.
///
/// Implementations are shared read-only across requests. The service never
/// calls `generate` concurrently, so backends need not be reentrant.
pub trait SpeechModel: Send + Sync {
    /// Native output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Synthesize `text`, returning a waveform tensor of shape
    /// `(samples)` or `(channels, samples)`.
    fn generate(&self, text: &str, voice: &VoiceMode) -> TtsResult<Tensor>;
}

/// Constructs a [`SpeechModel`] on a device.
pub trait ModelLoader: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Build the model on `device`.
    fn load(&self, device: &Device) -> TtsResult<Box<dyn SpeechModel>>;
}
