//! # tts-core
//!
//! Core types, configuration and error definitions for the speech
//! synthesis server.
//!
//! This crate provides the foundational abstractions shared by the other
//! crates in the workspace:
//!
//! - Request and voice types (`SynthesisRequest`, `VoiceMode`, `Readiness`)
//! - Unified error handling via `TtsError`
//! - Server configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::{DEFAULT_CLONE_TEMPERATURE, DEFAULT_MAX_TEXT_CHARS, DEFAULT_PORT, ServerConfig};
pub use error::{TtsError, TtsResult};
pub use types::{Readiness, SynthesisRequest, VoiceMode};
