//! Speech synthesis HTTP server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use runtime::logging::{LogFormat, init_logging};
use runtime::parler::{DEFAULT_DESCRIPTION, DEFAULT_MAX_STEPS};
use runtime::{DevicePreference, ModelLoader, ParlerLoader, ReferenceLoader, SpeechService};
use tts_core::{DEFAULT_CLONE_TEMPERATURE, DEFAULT_MAX_TEXT_CHARS, DEFAULT_PORT, ServerConfig};
use tts_server::TtsServer;

/// Speech synthesis HTTP server
#[derive(Debug, Parser)]
#[command(name = "tts-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(long, env = "TTS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(short, long, env = "TTS_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Compute device (auto, cuda, metal, cpu)
    #[arg(short, long, env = "TTS_DEVICE", default_value = "auto")]
    device: DevicePreference,

    /// Parler-TTS checkpoint directory (config.json, tokenizer.json, safetensors).
    /// Without it the built-in reference synthesizer is served.
    #[arg(short, long, env = "TTS_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// Speaker description for the pretrained model
    #[arg(long, env = "TTS_VOICE_DESCRIPTION", default_value = DEFAULT_DESCRIPTION)]
    voice_description: String,

    /// Maximum decoder steps per request for the pretrained model
    #[arg(long, env = "TTS_MAX_STEPS", default_value_t = DEFAULT_MAX_STEPS)]
    max_steps: usize,

    /// Sampling temperature used when cloning a voice prompt
    #[arg(long, env = "TTS_CLONE_TEMPERATURE", default_value_t = DEFAULT_CLONE_TEMPERATURE)]
    clone_temperature: f32,

    /// Maximum request body size in bytes
    #[arg(long, env = "TTS_MAX_BODY_SIZE", default_value_t = 1024 * 1024)]
    max_body_size: usize,

    /// Maximum text length in characters
    #[arg(long, env = "TTS_MAX_TEXT_CHARS", default_value_t = DEFAULT_MAX_TEXT_CHARS)]
    max_text_chars: usize,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value_t = 30)]
    shutdown_timeout: u64,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_body_size: self.max_body_size,
            clone_temperature: self.clone_temperature,
            max_text_chars: self.max_text_chars,
            shutdown_timeout_secs: self.shutdown_timeout,
            model_dir: self.model_dir.clone(),
        }
    }

    /// Pretrained weights when a model directory is given, the reference
    /// synthesizer otherwise.
    fn model_loader(&self) -> Box<dyn ModelLoader> {
        match &self.model_dir {
            Some(dir) => {
                info!(model_dir = %dir.display(), "Using pretrained Parler-TTS weights");
                Box::new(
                    ParlerLoader::new(dir)
                        .with_description(self.voice_description.clone())
                        .with_max_steps(self.max_steps),
                )
            }
            None => {
                warn!("No model directory configured, serving the reference synthesizer");
                Box::new(ReferenceLoader)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let format = if args.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_logging(&args.log_level, format);

    let config = args.server_config();
    config.validate().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        device = %args.device,
        "Starting speech server"
    );

    let service = Arc::new(
        SpeechService::new(config.clone_temperature).with_max_text_chars(config.max_text_chars),
    );

    let loader = args.model_loader();
    let loading = Arc::clone(&service);
    let preference = args.device;
    let loaded = tokio::task::spawn_blocking(move || loading.load(loader.as_ref(), preference))
        .await
        .context("Model loading task panicked")?;

    if let Err(e) = loaded {
        error!(error = %e, "FATAL: Could not load model");
        return Err(e).context("Failed to load model");
    }

    TtsServer::new(config, service)
        .run()
        .await
        .context("Server failed")?;

    info!("Server shutdown complete");
    Ok(())
}
