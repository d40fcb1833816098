//! In-process fakes for the model seams.

use async_trait::async_trait;
use ndarray::{ArrayD, IxDyn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::model::features::{FeatureBatch, FeatureConfig, FeatureExtractor};
use crate::model::generation::GeneratedTokens;
use crate::model::loader::ModelLoader;
use crate::model::strategy::{LoadStrategy, Precision, StrategyKind};
use crate::model::traits::{SpeechModel, TokenDecoder};
use crate::model::types::{DecodeError, Device, GenerationError, LoadError, ModelBundle};

/// Vocabulary of whitespace-joined words; `<...>` and `__xxx__` are special.
pub(crate) struct WordDecoder {
    words: Vec<&'static str>,
}

impl WordDecoder {
    pub(crate) fn new() -> Self {
        Self {
            words: vec![
                "<pad>", "<unk>", "<s>", "</s>", "hello", "world", "!", "__eng__", "__hin__",
            ],
        }
    }

    fn is_special(word: &str) -> bool {
        word.starts_with('<') || (word.starts_with("__") && word.ends_with("__"))
    }
}

impl TokenDecoder for WordDecoder {
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, DecodeError> {
        let mut words = Vec::with_capacity(ids.len());
        for &id in ids {
            let word = self
                .words
                .get(id as usize)
                .ok_or(DecodeError::InvalidTokenId(i64::from(id)))?;
            if !(skip_special_tokens && Self::is_special(word)) {
                words.push(*word);
            }
        }
        Ok(words.join(" "))
    }

    fn vocab_size(&self) -> usize {
        self.words.len()
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.words.iter().position(|w| *w == token).map(|i| i as u32)
    }
}

/// Emits `</s> __lang__ hello world ! </s>` for any input.
pub(crate) struct EchoModel {
    tokenizer: WordDecoder,
    batched_cube: bool,
}

impl EchoModel {
    pub(crate) fn new() -> Self {
        Self {
            tokenizer: WordDecoder::new(),
            batched_cube: false,
        }
    }

    /// Same ids wrapped in a `[1, 1, n]` tensor, a shape no decoder accepts.
    pub(crate) fn batched_cube() -> Self {
        Self {
            batched_cube: true,
            ..Self::new()
        }
    }
}

impl SpeechModel for EchoModel {
    fn generate(
        &self,
        features: &FeatureBatch,
        tgt_lang: &str,
    ) -> Result<GeneratedTokens, GenerationError> {
        if features.frames() == 0 {
            return Err(GenerationError::InvalidInput("no frames".into()));
        }
        let lang = self
            .tokenizer
            .token_to_id(&format!("__{}__", tgt_lang))
            .ok_or_else(|| GenerationError::UnknownLanguage(tgt_lang.to_string()))?;
        let ids = vec![3, i64::from(lang), 4, 5, 6, 3];
        if self.batched_cube {
            let cube = ArrayD::from_shape_vec(IxDyn(&[1, 1, ids.len()]), ids)
                .map_err(|e| GenerationError::Inference(e.to_string()))?;
            return Ok(GeneratedTokens::Tensor(cube));
        }
        Ok(GeneratedTokens::Nested(vec![ids]))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

pub(crate) fn cpu_strategy() -> LoadStrategy {
    LoadStrategy::new(StrategyKind::MemoryEfficient, Device::Cpu, Precision::Full)
}

pub(crate) fn fake_bundle(strategy: LoadStrategy) -> ModelBundle {
    bundle_with_model(strategy, Arc::new(EchoModel::new()))
}

pub(crate) fn bundle_with_model(strategy: LoadStrategy, model: Arc<dyn SpeechModel>) -> ModelBundle {
    ModelBundle {
        model,
        feature_extractor: FeatureExtractor::new(FeatureConfig::default())
            .expect("default feature config"),
        tokenizer: Arc::new(WordDecoder::new()),
        device: strategy.device,
        strategy,
    }
}

/// Loader that fails a fixed number of times before succeeding.
pub(crate) struct FakeLoader {
    calls: AtomicUsize,
    failures_before_success: usize,
    delay: Duration,
    model: fn() -> Arc<dyn SpeechModel>,
}

impl FakeLoader {
    pub(crate) fn succeeding() -> Self {
        Self::failing(0)
    }

    pub(crate) fn failing(times: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_before_success: times,
            delay: Duration::ZERO,
            model: || Arc::new(EchoModel::new()),
        }
    }

    pub(crate) fn always_failing() -> Self {
        Self::failing(usize::MAX)
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_model(mut self, model: fn() -> Arc<dyn SpeechModel>) -> Self {
        self.model = model;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self) -> Result<ModelBundle, LoadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call < self.failures_before_success {
            return Err(LoadError::Exhausted(vec![format!(
                "{}: simulated failure {}",
                cpu_strategy(),
                call + 1
            )]));
        }
        Ok(bundle_with_model(cpu_strategy(), (self.model)()))
    }

    fn target(&self) -> &str {
        "fake/model"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}

/// 16-bit PCM WAV with a 440 Hz tone on every channel.
pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
    let frames = (sample_rate as f32 * seconds) as usize;
    let data_len = frames * channels as usize * 2;
    let byte_rate = sample_rate * u32::from(channels) * 2;

    let mut out = Vec::with_capacity(44 + data_len);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data_len as u32).to_le_bytes());

    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
    out
}
