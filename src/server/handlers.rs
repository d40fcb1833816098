//! HTTP request handlers.
//!
//! This module provides the HTTP handlers and the router for the
//! speech-to-text service.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::config::{model::DEFAULT_TARGET_LANGUAGE, service, Config};
use crate::error::{AppError, Result};
use crate::inference::TranscriptionRequest;
use crate::languages;
use crate::model::Device;
use crate::server::metrics;
use crate::server::AppState;

/// Response body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub device: Option<Device>,
    pub supported_languages: BTreeMap<&'static str, &'static str>,
}

/// Response body of `GET /supported-languages`.
#[derive(Debug, Serialize)]
pub struct LanguagesResponse {
    pub languages: BTreeMap<&'static str, &'static str>,
    pub count: usize,
}

/// Response body of `POST /speech-to-text`.
#[derive(Debug, Serialize)]
pub struct TranscriptionResponse {
    pub transcription: String,
}

/// Service information endpoint.
pub async fn root() -> impl IntoResponse {
    metrics::record_request("root");
    Json(json!({
        "service": service::TITLE,
        "version": service::VERSION,
        "description": service::DESCRIPTION,
        "health": "/health",
        "supported_languages": "/supported-languages",
        "endpoints": {
            "speech_to_text": "/speech-to-text",
            "health": "/health",
            "supported_languages": "/supported-languages",
            "metrics": "/metrics",
        },
    }))
}

/// Health check endpoint.
///
/// Makes a best-effort load attempt first; a failed load still reports healthy.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    metrics::record_request("health");

    if state.config.health_triggers_load && !state.model_state.is_ready() {
        if let Err(e) = state.model_state.ensure_loaded().await {
            warn!(error = %e, "Model load attempt from health check failed");
        }
    }

    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.model_state.is_ready(),
        device: state.model_state.device(),
        supported_languages: languages::supported_languages(),
    })
}

/// Supported target languages, code to display name.
pub async fn supported_languages() -> Json<LanguagesResponse> {
    metrics::record_request("supported_languages");
    let languages = languages::supported_languages();
    Json(LanguagesResponse {
        count: languages.len(),
        languages,
    })
}

/// Transcribe an uploaded audio file.
///
/// Multipart fields: `audio` (file, required) and `target_lang` (display
/// name, defaults to English).
pub async fn speech_to_text(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<TranscriptionResponse>> {
    metrics::record_request("speech_to_text");

    let request = read_upload(multipart, &state.config).await.map_err(|e| {
        metrics::record_failure("speech_to_text", e.kind());
        warn!(error = %e, "Rejected speech-to-text upload");
        e
    })?;

    let result = state.inference.transcribe(request).await?;
    Ok(Json(TranscriptionResponse {
        transcription: result.text,
    }))
}

async fn read_upload(
    multipart: std::result::Result<Multipart, MultipartRejection>,
    config: &Config,
) -> Result<TranscriptionRequest> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;

    let mut audio: Option<(String, Bytes)> = None;
    let mut target_lang: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, config))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("audio") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, config))?;
                debug!(file = %file_name, bytes = bytes.len(), "Received audio field");
                audio = Some((file_name, bytes));
            }
            Some("target_lang") => {
                target_lang = Some(field.text().await.map_err(|e| multipart_error(e, config))?);
            }
            other => debug!(field = ?other, "Ignoring unknown multipart field"),
        }
    }

    let (file_name, audio) =
        audio.ok_or_else(|| AppError::Validation("Field required: audio".to_string()))?;

    Ok(TranscriptionRequest {
        file_name,
        audio,
        target_lang: target_lang.unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string()),
    })
}

fn multipart_error(err: MultipartError, config: &Config) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BodyTooLarge {
            limit: config.body_limit(),
        }
    } else {
        AppError::Validation(err.body_text())
    }
}

/// Prometheus exposition endpoint.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Metrics recorder not installed" })),
        )
            .into_response(),
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_is_permissive() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.body_limit();
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/supported-languages", get(supported_languages))
        .route("/speech-to-text", post(speech_to_text))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::{wav_bytes, EchoModel, FakeLoader};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "stt-test-boundary";

    fn app_with(loader: Arc<FakeLoader>, config: Config) -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(Arc::new(config), loader));
        (create_router(Arc::clone(&state)), state)
    }

    fn app(loader: Arc<FakeLoader>) -> (Router, Arc<AppState>) {
        app_with(loader, Config::default())
    }

    fn multipart_body(file_name: &str, audio: &[u8], target_lang: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(audio);
        body.extend_from_slice(b"\r\n");
        if let Some(lang) = target_lang {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"target_lang\"\r\n\r\n{lang}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(file_name: &str, audio: &[u8], target_lang: Option<&str>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/speech-to-text")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(file_name, audio, target_lang)))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let (app, _) = app(Arc::new(FakeLoader::succeeding()));
        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["service"], service::TITLE);
        assert_eq!(body["endpoints"]["speech_to_text"], "/speech-to-text");
    }

    #[tokio::test]
    async fn supported_languages_reports_catalog() {
        let (app, _) = app(Arc::new(FakeLoader::succeeding()));
        let response = app.oneshot(get_request("/supported-languages")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["count"], languages::len());
        assert_eq!(body["languages"]["eng"], "English");
        assert_eq!(body["languages"]["cmn_Hant"], "Traditional Chinese");
    }

    #[tokio::test]
    async fn health_reports_unloaded_until_transcription() {
        let loader = Arc::new(FakeLoader::succeeding());
        let config = Config {
            health_triggers_load: false,
            ..Config::default()
        };
        let (app, _) = app_with(loader.clone(), config);

        let response = app.clone().oneshot(get_request("/health")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], false);
        assert!(body["device"].is_null());
        assert_eq!(loader.calls(), 0);

        let audio = wav_bytes(16000, 1, 0.5);
        let response = app.clone().oneshot(upload("clip.wav", &audio, Some("English"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["transcription"], "hello world!");

        let body = json_body(app.oneshot(get_request("/health")).await.unwrap()).await;
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["device"], "cpu");
    }

    #[tokio::test]
    async fn health_survives_failed_load() {
        let loader = Arc::new(FakeLoader::always_failing());
        let (app, _) = app(loader.clone());

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["model_loaded"], false);
        assert_eq!(loader.calls(), 1);
    }

    #[tokio::test]
    async fn text_file_is_rejected_regardless_of_content() {
        let (app, state) = app(Arc::new(FakeLoader::succeeding()));
        let audio = wav_bytes(16000, 1, 0.5);

        let response = app.oneshot(upload("clip.txt", &audio, Some("English"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("Invalid file format"));
        assert!(!state.model_state.is_ready());
    }

    #[tokio::test]
    async fn unknown_language_is_rejected() {
        let (app, _) = app(Arc::new(FakeLoader::succeeding()));
        let audio = wav_bytes(16000, 1, 0.5);

        let response = app.oneshot(upload("clip.wav", &audio, Some("Klingon"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Unsupported language: Klingon");
    }

    #[tokio::test]
    async fn language_names_are_not_normalised() {
        let (app, state) = app(Arc::new(FakeLoader::succeeding()));
        let audio = wav_bytes(16000, 1, 0.5);

        for lang in [" English", "English ", "english", ""] {
            let response = app
                .clone()
                .oneshot(upload("clip.wav", &audio, Some(lang)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{lang:?}");
            let body = json_body(response).await;
            assert_eq!(body["detail"], format!("Unsupported language: {lang}"));
        }
        assert!(!state.model_state.is_ready());
    }

    #[tokio::test]
    async fn target_language_defaults_to_english() {
        let (app, _) = app(Arc::new(FakeLoader::succeeding()));
        let audio = wav_bytes(16000, 1, 0.5);

        let response = app.oneshot(upload("clip.wav", &audio, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_audio_field_is_bad_request() {
        let (app, _) = app(Arc::new(FakeLoader::succeeding()));
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"target_lang\"\r\n\r\nEnglish\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/speech-to-text")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_size_limit_is_inclusive() {
        let audio = wav_bytes(16000, 1, 0.5);
        let config = Config {
            max_content_length: audio.len(),
            ..Config::default()
        };
        let (app, _) = app_with(Arc::new(FakeLoader::succeeding()), config);

        let response = app
            .clone()
            .oneshot(upload("clip.wav", &audio, Some("English")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut oversized = audio.clone();
        oversized.push(0);
        let response = app
            .oneshot(upload("clip.wav", &oversized, Some("English")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn failing_loader_returns_service_unavailable() {
        let (app, _) = app(Arc::new(FakeLoader::always_failing()));
        let audio = wav_bytes(16000, 1, 0.5);

        let response = app.oneshot(upload("clip.wav", &audio, Some("English"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Failed to load model. Please try again later.");
    }

    #[tokio::test]
    async fn corrupt_audio_is_internal_error() {
        let (app, _) = app(Arc::new(FakeLoader::succeeding()));
        let response = app
            .oneshot(upload("clip.flac", b"garbage bytes", Some("English")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unrecognised_output_shape_is_internal_error() {
        let loader = FakeLoader::succeeding().with_model(|| Arc::new(EchoModel::batched_cube()));
        let (app, _) = app(Arc::new(loader));
        let audio = wav_bytes(16000, 1, 0.5);

        let response = app.oneshot(upload("clip.wav", &audio, Some("English"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().starts_with("Decoding failed"));
    }

    #[tokio::test]
    async fn clip_shorter_than_one_feature_frame_is_internal_error() {
        let (app, state) = app(Arc::new(FakeLoader::succeeding()));
        // 480 samples at 16 kHz, under the 560 the extractor needs
        let audio = wav_bytes(16000, 1, 0.03);

        let response = app.oneshot(upload("clip.wav", &audio, Some("English"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().starts_with("Generation failed"));
        assert!(state.model_state.is_ready());
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let (app, _) = app(Arc::new(FakeLoader::succeeding()));
        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
