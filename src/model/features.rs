//! Encoder input features.
//!
//! Kaldi-compatible log-mel filterbank: 25 ms Povey-windowed frames every
//! 10 ms, DC removal, pre-emphasis, 80 triangular filters on the Kaldi mel
//! scale, per-bin normalisation over time and stacking of `stride` adjacent
//! frames.

use ndarray::{Array2, Array3};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::Deserialize;
use std::path::Path;

use crate::model::types::{FeatureError, LoadError};

const PREEMPH: f32 = 0.97;
const POVEY_POWER: f64 = 0.85;
const WINDOW_MS: u32 = 25;
const HOP_MS: u32 = 10;
const MIN_FREQUENCY: f64 = 20.0;
const INT16_SCALE: f32 = 32768.0;
const NORMALIZE_EPS: f32 = 1e-7;

fn default_feature_size() -> usize { 80 }
fn default_sampling_rate() -> u32 { 16000 }
fn default_stride() -> usize { 2 }

/// Subset of `preprocessor_config.json` the extractor uses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeatureConfig {
    /// Mel bins per frame
    #[serde(default = "default_feature_size")]
    pub feature_size: usize,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u32,
    /// Adjacent frames stacked into one encoder step
    #[serde(default = "default_stride")]
    pub stride: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            feature_size: default_feature_size(),
            sampling_rate: default_sampling_rate(),
            stride: default_stride(),
        }
    }
}

/// Encoder inputs for a single utterance.
#[derive(Debug, Clone)]
pub struct FeatureBatch {
    /// `[1, frames, feature_size * stride]`
    pub features: Array3<f32>,
    /// `[1, frames]`, all ones for a single unpadded utterance
    pub attention_mask: Array2<i64>,
}

impl FeatureBatch {
    pub fn frames(&self) -> usize {
        self.features.shape()[1]
    }

    pub fn dims(&self) -> usize {
        self.features.shape()[2]
    }
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
    window: Vec<f32>,      // [win_length]
    mel_filters: Vec<f32>, // [n_mels * n_freqs]
    win_length: usize,
    hop_length: usize,
    n_fft: usize,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        if config.feature_size == 0 || config.stride == 0 {
            return Err(FeatureError::Config(format!(
                "feature_size and stride must be positive (got {} and {})",
                config.feature_size, config.stride
            )));
        }
        if config.sampling_rate < 8000 {
            return Err(FeatureError::Config(format!(
                "sampling_rate {} is too low",
                config.sampling_rate
            )));
        }

        let win_length = (config.sampling_rate * WINDOW_MS / 1000) as usize;
        let hop_length = (config.sampling_rate * HOP_MS / 1000) as usize;
        let n_fft = win_length.next_power_of_two();
        let window = povey_window(win_length);
        let mel_filters = kaldi_mel_filters(
            config.feature_size,
            n_fft,
            config.sampling_rate as f64,
            MIN_FREQUENCY,
            config.sampling_rate as f64 / 2.0,
        );

        Ok(Self {
            config,
            window,
            mel_filters,
            win_length,
            hop_length,
            n_fft,
        })
    }

    /// Build from a registry `preprocessor_config.json`.
    pub fn from_config_file(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Config(format!("{}: {}", path.display(), e)))?;
        let config: FeatureConfig = serde_json::from_str(&raw)
            .map_err(|e| LoadError::Config(format!("{}: {}", path.display(), e)))?;
        Self::new(config).map_err(|e| LoadError::Config(e.to_string()))
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Minimum number of samples that yields one stacked frame.
    pub fn min_samples(&self) -> usize {
        self.win_length + self.hop_length * (self.config.stride - 1)
    }

    /// Compute normalised, stacked features for mono samples in `[-1, 1]`.
    pub fn extract(&self, samples: &[f32], sampling_rate: u32) -> Result<FeatureBatch, FeatureError> {
        if sampling_rate != self.config.sampling_rate {
            return Err(FeatureError::SampleRate {
                expected: self.config.sampling_rate,
                actual: sampling_rate,
            });
        }
        if samples.len() < self.min_samples() {
            return Err(FeatureError::TooShort {
                samples: samples.len(),
                required: self.min_samples(),
            });
        }

        let n_mels = self.config.feature_size;
        let mut fbank = self.log_mel_frames(samples);
        let frame_count = fbank.len() / n_mels;
        normalize_per_bin(&mut fbank, n_mels, frame_count);

        let stride = self.config.stride;
        let stacked_frames = frame_count / stride;
        let dims = n_mels * stride;
        // Frames are contiguous rows, so stacking is a reshape of the prefix.
        fbank.truncate(stacked_frames * dims);

        let features = Array3::from_shape_vec((1, stacked_frames, dims), fbank)
            .map_err(|e| FeatureError::Config(e.to_string()))?;
        let attention_mask = Array2::ones((1, stacked_frames));

        Ok(FeatureBatch {
            features,
            attention_mask,
        })
    }

    /// Row-major `[frames, n_mels]` log-mel energies.
    fn log_mel_frames(&self, samples: &[f32]) -> Vec<f32> {
        let n_mels = self.config.feature_size;
        let n_freqs = self.n_fft / 2 + 1;
        let frame_count = 1 + (samples.len() - self.win_length) / self.hop_length;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.n_fft);

        let mut frame = vec![0f32; self.win_length];
        let mut buffer = vec![Complex::<f32>::new(0.0, 0.0); self.n_fft];
        let mut power = vec![0f32; n_freqs];
        let mut out = Vec::with_capacity(frame_count * n_mels);

        for t in 0..frame_count {
            let start = t * self.hop_length;
            for (dst, src) in frame.iter_mut().zip(&samples[start..start + self.win_length]) {
                *dst = src * INT16_SCALE;
            }

            let mean = frame.iter().sum::<f32>() / frame.len() as f32;
            frame.iter_mut().for_each(|x| *x -= mean);
            preemphasis(&mut frame, PREEMPH);

            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = if i < self.win_length {
                    Complex::new(frame[i] * self.window[i], 0.0)
                } else {
                    Complex::new(0.0, 0.0)
                };
            }
            fft.process(&mut buffer);

            for (k, p) in power.iter_mut().enumerate() {
                *p = buffer[k].norm_sqr();
            }

            for m in 0..n_mels {
                let filter = &self.mel_filters[m * n_freqs..(m + 1) * n_freqs];
                let energy: f32 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                out.push(energy.max(f32::EPSILON).ln());
            }
        }

        out
    }
}

/// Kaldi pre-emphasis, first sample uses itself as its predecessor.
fn preemphasis(x: &mut [f32], coeff: f32) {
    for i in (1..x.len()).rev() {
        x[i] -= coeff * x[i - 1];
    }
    if let Some(first) = x.first_mut() {
        *first -= coeff * *first;
    }
}

/// Symmetric Hann window raised to 0.85.
fn povey_window(length: usize) -> Vec<f32> {
    let denom = (length.max(2) - 1) as f64;
    (0..length)
        .map(|n| {
            let hann = 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / denom).cos();
            hann.powf(POVEY_POWER) as f32
        })
        .collect()
}

fn kaldi_mel(freq: f64) -> f64 {
    1127.0 * (1.0 + freq / 700.0).ln()
}

/// Triangular filters evenly spaced on the Kaldi mel scale, `[n_mels * n_freqs]`.
fn kaldi_mel_filters(n_mels: usize, n_fft: usize, sample_rate: f64, fmin: f64, fmax: f64) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let mel_min = kaldi_mel(fmin);
    let mel_max = kaldi_mel(fmax);
    let step = (mel_max - mel_min) / (n_mels + 1) as f64;

    let bin_mels: Vec<f64> = (0..n_freqs)
        .map(|k| kaldi_mel(k as f64 * sample_rate / n_fft as f64))
        .collect();

    let mut filters = vec![0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let left = mel_min + m as f64 * step;
        let center = left + step;
        let right = center + step;
        for (k, &mel) in bin_mels.iter().enumerate() {
            let up = (mel - left) / (center - left);
            let down = (right - mel) / (right - center);
            filters[m * n_freqs + k] = up.min(down).max(0.0) as f32;
        }
    }
    filters
}

/// Zero-mean, unit-variance per mel bin across frames (sample variance).
fn normalize_per_bin(fbank: &mut [f32], n_mels: usize, frames: usize) {
    if frames == 0 {
        return;
    }

    for m in 0..n_mels {
        let mean = (0..frames).map(|t| fbank[t * n_mels + m]).sum::<f32>() / frames as f32;
        let var = if frames > 1 {
            (0..frames)
                .map(|t| {
                    let d = fbank[t * n_mels + m] - mean;
                    d * d
                })
                .sum::<f32>()
                / (frames - 1) as f32
        } else {
            0.0
        };

        let std = (var + NORMALIZE_EPS).sqrt();
        for t in 0..frames {
            let v = &mut fbank[t * n_mels + m];
            *v = (*v - mean) / std;
        }
    }
}
