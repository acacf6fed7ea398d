//! WAV encoding and decoding.

use std::io::{self, Cursor};
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tts_core::{TtsError, TtsResult};

/// MIME type of encoded responses.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

fn tensor_err(e: candle_core::Error) -> TtsError {
    TtsError::audio_encode(e.to_string())
}

/// Reduce a waveform tensor to mono `f32` samples on the host.
///
/// Accepts `(samples)`, `(channels, samples)` or `(1, channels, samples)`.
/// A single channel is squeezed; several channels are averaged.
pub fn to_mono(waveform: &Tensor) -> TtsResult<Vec<f32>> {
    let mut wav = waveform
        .to_device(&Device::Cpu)
        .and_then(|t| t.to_dtype(DType::F32))
        .map_err(tensor_err)?;

    while wav.rank() > 2 && wav.dim(0).map_err(tensor_err)? == 1 {
        wav = wav.squeeze(0).map_err(tensor_err)?;
    }

    let mono = match wav.rank() {
        1 => wav,
        2 => {
            let (channels, _) = wav.dims2().map_err(tensor_err)?;
            if channels == 1 {
                wav.squeeze(0).map_err(tensor_err)?
            } else {
                wav.mean(0).map_err(tensor_err)?
            }
        }
        _ => {
            return Err(TtsError::audio_encode(format!(
                "unsupported waveform shape {:?}",
                wav.dims()
            )))
        }
    };

    mono.to_vec1::<f32>().map_err(tensor_err)
}

/// Encode mono samples as a 16-bit PCM WAV byte stream.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> TtsResult<Vec<u8>> {
    if sample_rate == 0 {
        return Err(TtsError::audio_encode("sample rate must be non-zero"));
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer =
        WavWriter::new(&mut cursor, spec).map_err(|e| TtsError::audio_encode(e.to_string()))?;

    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| TtsError::audio_encode(e.to_string()))?;
    }

    writer
        .finalize()
        .map_err(|e| TtsError::audio_encode(e.to_string()))?;

    Ok(cursor.into_inner())
}

/// Read a WAV file as mono `f32` samples in `[-1, 1]`.
///
/// Returns the samples and the file's sample rate.
pub fn read_wav_mono(path: impl AsRef<Path>) -> TtsResult<(Vec<f32>, u32)> {
    let reader =
        WavReader::open(path.as_ref()).map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok((mono, spec.sample_rate))
}
