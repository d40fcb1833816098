//! Audio upload handling.
//!
//! Uploaded bytes are written to a temporary file, decoded with symphonia,
//! mixed down to mono and resampled to the model's sample rate.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::audio::ALLOWED_EXTENSIONS;
use crate::error::{AppError, Result};

/// Lower-cased extension after the last `.`, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Whether the file name carries an accepted audio extension.
pub fn allowed_file(filename: &str) -> bool {
    file_extension(filename).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Length of mono audio in seconds.
pub fn audio_len(samples: &[f32], sample_rate: u32) -> f32 {
    samples.len() as f32 / sample_rate as f32
}

/// Upload spooled to disk; the file is removed when the guard drops.
pub struct TempAudioFile {
    file: NamedTempFile,
}

impl TempAudioFile {
    pub fn write(bytes: &[u8], extension: &str) -> Result<Self> {
        let suffix = format!(".{}", extension);
        let mut file = tempfile::Builder::new()
            .prefix("stt-upload-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| preprocessing_error("temp file", e))?;
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|e| preprocessing_error("temp file write", e))?;
        debug!(path = %file.path().display(), bytes = bytes.len(), "Wrote temporary audio file");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Decode a file to mono samples at `target_rate`.
///
/// Returns the samples and their rate. Any decode or resample failure fails the
/// whole call.
pub fn preprocess(path: &Path, target_rate: u32) -> Result<(Vec<f32>, u32)> {
    let (samples, source_rate) = decode_file(path)?;

    let samples = if source_rate == target_rate {
        samples
    } else {
        resample(&samples, source_rate, target_rate)?
    };

    debug!(
        source_rate,
        target_rate,
        samples = samples.len(),
        seconds = audio_len(&samples, target_rate),
        "Audio preprocessed"
    );
    Ok((samples, target_rate))
}

fn preprocessing_error(stage: &str, e: impl std::fmt::Display) -> AppError {
    AppError::PreprocessingFailed(format!("{}: {}", stage, e))
}

/// Decode every packet of the first audio track, mixed down to mono.
pub fn decode_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = File::open(path).map_err(|e| preprocessing_error("open", e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| preprocessing_error("probe failed", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AppError::PreprocessingFailed("no audio track found".into()))?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| preprocessing_error("codec init failed", e))?;

    let mut source_rate = codec_params.sample_rate;
    let mut mono: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(preprocessing_error("packet read", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| preprocessing_error("decode", e))?;

        let spec = *decoded.spec();
        source_rate.get_or_insert(spec.rate);
        let channels = spec.channels.count().max(1);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let samples = sample_buf.samples();

        if channels > 1 {
            mono.extend(
                samples
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        } else {
            mono.extend_from_slice(samples);
        }
    }

    if mono.is_empty() {
        return Err(AppError::PreprocessingFailed("no audio samples decoded".into()));
    }

    let source_rate = source_rate
        .ok_or_else(|| AppError::PreprocessingFailed("unknown sample rate".into()))?;
    Ok((mono, source_rate))
}

/// Resample mono audio with a sinc resampler.
///
/// The filter's warm-up delay is dropped and the tail flushed, so output
/// sample `i` lines up with input time `i / to_rate` and the length is
/// `ceil(n * to_rate / from_rate)`.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let chunk_size = 1024;
    let expected_len = (samples.len() as f64 * ratio).ceil() as usize;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| preprocessing_error("resampler init", e))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected_len;
    let mut output = Vec::with_capacity(wanted + chunk_size);

    let mut chunks = samples.chunks(chunk_size);
    while output.len() < wanted {
        // The last chunk is zero padded, then silence flushes the filter.
        let mut input = chunks.next().map(<[f32]>::to_vec).unwrap_or_default();
        input.resize(chunk_size, 0.0);

        let resampled = resampler
            .process(&[input], None)
            .map_err(|e| preprocessing_error("resample", e))?;

        match resampled.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => break,
        }
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected_len);
    Ok(output)
}
