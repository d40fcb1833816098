//! The `seamless_stt_server` core library.
//!
//! A multilingual speech-to-text HTTP service. Uploaded audio is decoded,
//! resampled to 16 kHz, turned into filter-bank features and transcribed by a
//! SeamlessM4T v2 speech encoder/decoder running on ONNX Runtime. The model is
//! fetched from the Hugging Face hub and loaded lazily on first use.

pub mod audio;
pub mod config;
pub mod error;
pub mod inference;
pub mod languages;
pub mod model;
pub mod server;
pub mod shutdown;
pub mod telemetry;
