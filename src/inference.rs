//! Per-request transcription pipeline.
//!
//! `Received → Validated → ModelEnsured → Preprocessed → Generated → Decoded →
//! Responded`, with any stage able to fail the request.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::audio::{self, TempAudioFile};
use crate::config::audio::ALLOWED_EXTENSIONS;
use crate::config::Config;
use crate::error::{AppError, ErrorContext, Result};
use crate::languages;
use crate::model::{decode_first_sequence, ModelBundle, ModelState};
use crate::server::metrics;

/// One upload to transcribe.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub file_name: String,
    pub audio: Bytes,
    /// Display name, e.g. `"English"`
    pub target_lang: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionResult {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    ModelEnsured,
    Preprocessed,
    Generated,
    Decoded,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::ModelEnsured => "model_ensured",
            Stage::Preprocessed => "preprocessed",
            Stage::Generated => "generated",
            Stage::Decoded => "decoded",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Request facts established by validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub extension: String,
    pub language_code: &'static str,
}

pub struct InferenceHandler {
    model_state: Arc<ModelState>,
    max_content_length: usize,
    target_sample_rate: u32,
}

impl InferenceHandler {
    pub fn new(model_state: Arc<ModelState>, config: &Config) -> Self {
        Self {
            model_state,
            max_content_length: config.max_content_length,
            target_sample_rate: config.target_sample_rate,
        }
    }

    pub fn model_state(&self) -> &Arc<ModelState> {
        &self.model_state
    }

    /// Client-side checks; none of them touch the model.
    pub fn validate(&self, request: &TranscriptionRequest) -> Result<ValidatedRequest> {
        let extension = audio::file_extension(&request.file_name)
            .filter(|_| audio::allowed_file(&request.file_name))
            .ok_or_else(|| AppError::InvalidFile(ALLOWED_EXTENSIONS.join(", ")))?;

        let language_code = languages::name_to_code(&request.target_lang)
            .ok_or_else(|| AppError::UnsupportedLanguage(request.target_lang.clone()))?;

        if request.audio.len() > self.max_content_length {
            return Err(AppError::PayloadTooLarge {
                size: request.audio.len(),
                limit: self.max_content_length,
            });
        }

        Ok(ValidatedRequest {
            extension,
            language_code,
        })
    }

    /// Run the whole pipeline for one request.
    pub async fn transcribe(&self, request: TranscriptionRequest) -> Result<TranscriptionResult> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "transcribe",
            %request_id,
            file = %request.file_name,
            target_lang = %request.target_lang,
            bytes = request.audio.len()
        );

        async move {
            let started = Instant::now();
            let mut stage = Stage::Received;
            debug!(%stage, "Transcription request received");

            let outcome = self.run_stages(request, &mut stage).await;
            match &outcome {
                Ok(result) => {
                    let elapsed = started.elapsed();
                    metrics::record_transcription_duration(elapsed);
                    info!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        chars = result.text.chars().count(),
                        "Transcription completed"
                    );
                }
                Err(e) => {
                    metrics::record_failure("speech_to_text", e.kind());
                    error!(
                        failed_after = %stage,
                        error = %e,
                        error_detail = ?e,
                        error_type = e.kind(),
                        "Transcription failed"
                    );
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        request: TranscriptionRequest,
        stage: &mut Stage,
    ) -> Result<TranscriptionResult> {
        let validated = self.validate(&request)?;
        advance(stage, Stage::Validated);

        let bundle = self.model_state.ensure_loaded().await?;
        advance(stage, Stage::ModelEnsured);

        let target_rate = self.target_sample_rate;
        let extension = validated.extension;
        let audio_bytes = request.audio;
        let (samples, sample_rate) = tokio::task::spawn_blocking(move || {
            let temp = TempAudioFile::write(&audio_bytes, &extension)?;
            audio::preprocess(temp.path(), target_rate)
        })
        .await
        .with_static_context("preprocessing task")??;
        advance(stage, Stage::Preprocessed);

        let generated = {
            let bundle = Arc::clone(&bundle);
            let code = validated.language_code;
            tokio::task::spawn_blocking(move || generate(&bundle, &samples, sample_rate, code))
                .await
                .with_static_context("generation task")??
        };
        advance(stage, Stage::Generated);

        let type_name = generated.type_name();
        let len = generated.len();
        let text = decode_first_sequence(bundle.tokenizer.as_ref(), generated).map_err(|e| {
            error!(output_type = type_name, output_len = len, error = %e, "Failed to decode generated tokens");
            AppError::DecodeFailed(e)
        })?;
        advance(stage, Stage::Decoded);

        advance(stage, Stage::Responded);
        Ok(TranscriptionResult { text })
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!(from = %stage, to = %next, "Stage transition");
    *stage = next;
}

fn generate(
    bundle: &ModelBundle,
    samples: &[f32],
    sample_rate: u32,
    language_code: &str,
) -> Result<crate::model::GeneratedTokens> {
    let features = bundle.feature_extractor.extract(samples, sample_rate)?;
    debug!(frames = features.frames(), dims = features.dims(), "Features extracted");
    Ok(bundle.model.generate(&features, language_code)?)
}
