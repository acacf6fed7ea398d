//! Integration tests for the speech service.
//!
//! These drive `SpeechService` through the public API with custom backends.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use candle_core::{Device, Tensor};
use runtime::{DevicePreference, ModelLoader, ReferenceLoader, SpeechModel, SpeechService};
use tts_core::{SynthesisRequest, TtsError, TtsResult, VoiceMode};

/// Records how many `generate` calls overlap.
#[derive(Default)]
struct Overlap {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

struct SlowModel {
    overlap: Arc<Overlap>,
}

impl SpeechModel for SlowModel {
    fn sample_rate(&self) -> u32 {
        16000
    }

    fn generate(&self, text: &str, _voice: &VoiceMode) -> TtsResult<Tensor> {
        let now = self.overlap.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.overlap.peak.fetch_max(now, Ordering::SeqCst);
        self.overlap.calls.fetch_add(1, Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(20));

        // Encode the text length so outputs can be told apart
        let samples = vec![0.1f32; 100 + text.len()];
        self.overlap.active.fetch_sub(1, Ordering::SeqCst);
        Tensor::from_vec(samples, (1, 100 + text.len()), &Device::Cpu)
            .map_err(|e| TtsError::inference(e.to_string()))
    }
}

struct SlowLoader {
    overlap: Arc<Overlap>,
}

impl ModelLoader for SlowLoader {
    fn name(&self) -> &str {
        "slow"
    }

    fn load(&self, _device: &Device) -> TtsResult<Box<dyn SpeechModel>> {
        Ok(Box::new(SlowModel {
            overlap: Arc::clone(&self.overlap),
        }))
    }
}

/// Emits a stereo waveform.
struct StereoModel;

impl SpeechModel for StereoModel {
    fn sample_rate(&self) -> u32 {
        22050
    }

    fn generate(&self, _text: &str, _voice: &VoiceMode) -> TtsResult<Tensor> {
        Tensor::from_vec(vec![0.5f32, 0.5, -0.5, 0.5], (2, 2), &Device::Cpu)
            .map_err(|e| TtsError::inference(e.to_string()))
    }
}

struct StereoLoader;

impl ModelLoader for StereoLoader {
    fn name(&self) -> &str {
        "stereo"
    }

    fn load(&self, _device: &Device) -> TtsResult<Box<dyn SpeechModel>> {
        Ok(Box::new(StereoModel))
    }
}

fn decode(bytes: Vec<u8>) -> (u32, Vec<i16>) {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let rate = reader.spec().sample_rate;
    let samples = reader.samples::<i16>().map(Result::unwrap).collect();
    (rate, samples)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_serialized() {
    let overlap = Arc::new(Overlap::default());
    let service = Arc::new(SpeechService::new(0.8));
    service
        .load(
            &SlowLoader {
                overlap: Arc::clone(&overlap),
            },
            DevicePreference::Cpu,
        )
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let text = "x".repeat(i);
            let bytes = service.synthesize(SynthesisRequest::new(text)).await.unwrap();
            (i, bytes)
        }));
    }

    for handle in handles {
        let (i, bytes) = handle.await.unwrap();
        let (rate, samples) = decode(bytes);
        assert_eq!(rate, 16000);
        assert_eq!(samples.len(), 100 + i, "output of request {i} was mixed up");
    }

    assert_eq!(overlap.calls.load(Ordering::SeqCst), 6);
    assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_request_still_holds_the_gate() {
    let overlap = Arc::new(Overlap::default());
    let service = Arc::new(SpeechService::new(0.8));
    service
        .load(
            &SlowLoader {
                overlap: Arc::clone(&overlap),
            },
            DevicePreference::Cpu,
        )
        .unwrap();

    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.synthesize(SynthesisRequest::new("first")).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    first.abort();

    service
        .synthesize(SynthesisRequest::new("second"))
        .await
        .unwrap();
    assert_eq!(overlap.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_multichannel_output_is_downmixed() {
    let service = SpeechService::new(0.8);
    service.load(&StereoLoader, DevicePreference::Cpu).unwrap();

    let bytes = service
        .synthesize(SynthesisRequest::new("stereo"))
        .await
        .unwrap();
    let (rate, samples) = decode(bytes);

    assert_eq!(rate, 22050);
    assert_eq!(samples, vec![0, i16::MAX / 2]);
}

#[tokio::test]
async fn test_missing_voice_prompt_falls_back_to_default() {
    let service = SpeechService::new(0.8);
    service
        .load(&ReferenceLoader, DevicePreference::Cpu)
        .unwrap();

    let with_missing = service
        .synthesize(SynthesisRequest::new("Hello").with_voice_prompt("/no/such/voice.wav"))
        .await
        .unwrap();
    let default = service
        .synthesize(SynthesisRequest::new("Hello"))
        .await
        .unwrap();

    assert_eq!(with_missing, default);
}

#[tokio::test]
async fn test_unreadable_voice_prompt_is_an_inference_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voice.wav");
    std::fs::write(&path, b"garbage").unwrap();

    let service = SpeechService::new(0.8);
    service
        .load(&ReferenceLoader, DevicePreference::Cpu)
        .unwrap();

    let err = service
        .synthesize(SynthesisRequest::new("Hello").with_voice_prompt(path.to_string_lossy()))
        .await
        .unwrap_err();
    assert!(matches!(err, TtsError::Inference(_)));
}
