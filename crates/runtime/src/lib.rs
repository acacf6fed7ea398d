//! # runtime
//!
//! Model lifecycle for the speech synthesis server.
//!
//! This crate provides:
//! - Device selection (CUDA → Metal → CPU)
//! - The `SpeechModel` / `ModelLoader` seam, a pretrained Parler-TTS
//!   backend and a bundled reference backend
//! - `SpeechService`, which loads the model once and serializes inference
//! - WAV encoding of model output
//! - Structured logging setup

pub mod device;
pub mod logging;
pub mod model;
pub mod parler;
pub mod reference;
pub mod service;
pub mod wav;

pub use device::{DevicePreference, device_label, select_device};
pub use model::{ModelLoader, SpeechModel};
pub use parler::{ParlerLoader, ParlerModel};
pub use reference::{REFERENCE_SAMPLE_RATE, ReferenceLoader, ReferenceModel};
pub use service::SpeechService;
