//! Request handlers for `/health` and `/tts`.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use runtime::SpeechService;
use runtime::wav::WAV_CONTENT_TYPE;
use tts_core::{SynthesisRequest, TtsError};

use crate::error::ApiError;

/// Readiness probe: 200 with the device once loaded, 503 before.
pub async fn health(State(service): State<Arc<SpeechService>>) -> Response {
    let readiness = service.readiness();
    let status = if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(readiness)).into_response()
}

/// Synthesize the JSON request body into a WAV response.
///
/// Body extraction failures (such as exceeding the size limit) keep their
/// status but are reported in the same JSON shape as every other error.
pub async fn tts(
    State(service): State<Arc<SpeechService>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body?;

    if !service.is_ready() {
        return Err(TtsError::NotReady.into());
    }

    let request = SynthesisRequest::from_json(&body)?;
    let wav = service.synthesize(request).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, WAV_CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, "inline; filename=\"output.wav\""),
        ],
        wav,
    )
        .into_response())
}
