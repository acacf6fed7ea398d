//! Configuration structures for the synthesis server.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::error::{TtsError, TtsResult};

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5050;

/// Sampling temperature used when cloning a reference voice.
pub const DEFAULT_CLONE_TEMPERATURE: f32 = 0.8;

/// Longest text accepted in a single request, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 10_000;

/// Server configuration (for tts-server).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address.
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Request body size limit in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Temperature passed to the model in voice-cloning mode.
    #[serde(default = "default_clone_temperature")]
    pub clone_temperature: f32,
    /// Longest accepted text, in characters.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Directory with pretrained weights. `None` selects the built-in
    /// reference synthesizer.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_clone_temperature() -> f32 {
    DEFAULT_CLONE_TEMPERATURE
}

fn default_max_text_chars() -> usize {
    DEFAULT_MAX_TEXT_CHARS
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            max_body_size: default_max_body_size(),
            clone_temperature: default_clone_temperature(),
            max_text_chars: default_max_text_chars(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            model_dir: None,
        }
    }
}

impl ServerConfig {
    /// Resolve the address to bind.
    pub fn socket_addr(&self) -> TtsResult<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| TtsError::config(format!("invalid host {:?}: {e}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Check values that serde and clap cannot constrain.
    pub fn validate(&self) -> TtsResult<()> {
        self.socket_addr()?;

        if self.max_body_size == 0 {
            return Err(TtsError::config("max_body_size must be greater than zero"));
        }

        if self.max_text_chars == 0 {
            return Err(TtsError::config("max_text_chars must be greater than zero"));
        }

        if let Some(dir) = &self.model_dir {
            if !dir.is_dir() {
                return Err(TtsError::config(format!(
                    "model directory {} does not exist",
                    dir.display()
                )));
            }
        }

        if !self.clone_temperature.is_finite() || self.clone_temperature <= 0.0 {
            return Err(TtsError::config(format!(
                "clone_temperature must be positive, got {}",
                self.clone_temperature
            )));
        }

        Ok(())
    }
}
