//! # tts-server
//!
//! HTTP server for a single loaded speech model.
//!
//! Provides:
//! - `GET /health` readiness probe
//! - `POST /tts` synthesis endpoint returning WAV audio

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{TtsServer, create_router};
