//! Model artifacts fetched from the Hugging Face registry.

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::model::strategy::Precision;
use crate::model::types::LoadError;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";
pub const GENERATION_CONFIG_FILE: &str = "generation_config.json";
pub const ENCODER_FILE: &str = "onnx/encoder_model.onnx";
pub const DECODER_FILE: &str = "onnx/decoder_model.onnx";
pub const ENCODER_FP16_FILE: &str = "onnx/encoder_model_fp16.onnx";
pub const DECODER_FP16_FILE: &str = "onnx/decoder_model_fp16.onnx";

/// Local paths of the always-required files.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub tokenizer: PathBuf,
    pub preprocessor_config: PathBuf,
    pub generation_config: Option<PathBuf>,
    pub graphs: GraphPaths,
}

/// Encoder and decoder graphs for one precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPaths {
    pub encoder: PathBuf,
    pub decoder: PathBuf,
}

impl GraphPaths {
    /// Combined on-disk size in MiB, counting external-data siblings.
    pub fn size_mb(&self) -> u64 {
        let bytes: u64 = [&self.encoder, &self.decoder]
            .iter()
            .map(|graph| {
                let data = external_data_path(graph);
                file_len(graph) + file_len(&data)
            })
            .sum();
        bytes / (1024 * 1024)
    }
}

/// ONNX runtime resolves external weights relative to the graph file.
fn external_data_path(graph: &Path) -> PathBuf {
    let mut name = graph.as_os_str().to_owned();
    name.push("_data");
    PathBuf::from(name)
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

enum Source {
    Hub(ApiRepo),
    /// Local directory laid out like a registry snapshot
    Local(PathBuf),
}

/// Handle on a model repository: a registry id backed by the local download
/// cache, or a directory on disk.
pub struct ModelRepository {
    model_name: String,
    source: Source,
}

impl ModelRepository {
    /// `model_name` naming an existing directory is read in place; anything
    /// else is treated as a registry id.
    pub fn open(config: &Config) -> Result<Self, LoadError> {
        let local = Path::new(&config.model_name);
        if local.is_dir() {
            return Ok(Self::local(local));
        }

        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(config.hf_token.clone());
        if let Some(dir) = &config.model_cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| LoadError::Artifacts(format!("hf-hub api: {e}")))?;

        Ok(Self {
            model_name: config.model_name.clone(),
            source: Source::Hub(api.model(config.model_name.clone())),
        })
    }

    pub fn local(dir: &Path) -> Self {
        Self {
            model_name: dir.display().to_string(),
            source: Source::Local(dir.to_path_buf()),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Download (or reuse cached) tokenizer, configs and full-precision graphs.
    pub fn fetch(&self) -> Result<ArtifactPaths, LoadError> {
        debug!(model = %self.model_name, "Fetching model artifacts");

        let paths = ArtifactPaths {
            tokenizer: self.get(TOKENIZER_FILE)?,
            preprocessor_config: self.get(PREPROCESSOR_CONFIG_FILE)?,
            generation_config: self.get_optional(GENERATION_CONFIG_FILE),
            graphs: self.fetch_graphs(ENCODER_FILE, DECODER_FILE)?,
        };

        info!(
            model = %self.model_name,
            encoder = %paths.graphs.encoder.display(),
            size_mb = paths.graphs.size_mb(),
            "Model artifacts ready"
        );
        Ok(paths)
    }

    /// Graphs for the requested precision; half precision is fetched on demand.
    pub fn graphs(&self, precision: Precision, base: &ArtifactPaths) -> Result<GraphPaths, LoadError> {
        match precision {
            Precision::Full => Ok(base.graphs.clone()),
            Precision::Half => self.fetch_graphs(ENCODER_FP16_FILE, DECODER_FP16_FILE),
        }
    }

    fn fetch_graphs(&self, encoder: &str, decoder: &str) -> Result<GraphPaths, LoadError> {
        Ok(GraphPaths {
            encoder: self.fetch_graph(encoder)?,
            decoder: self.fetch_graph(decoder)?,
        })
    }

    /// The graph plus its `_data` sibling when the export stores weights
    /// externally. Both land in the same snapshot directory.
    fn fetch_graph(&self, file: &str) -> Result<PathBuf, LoadError> {
        let graph = self.get(file).map_err(|e| {
            LoadError::Artifacts(format!(
                "{} has no ONNX export of the speech model ({}); expected {} and {}: {}",
                self.model_name, file, ENCODER_FILE, DECODER_FILE, e
            ))
        })?;
        if let Some(data) = self.get_optional(&format!("{file}_data")) {
            debug!(file, data = %data.display(), "External weights available");
        }
        Ok(graph)
    }

    fn get(&self, file: &str) -> Result<PathBuf, LoadError> {
        match &self.source {
            Source::Hub(repo) => repo
                .get(file)
                .map_err(|e| LoadError::Artifacts(format!("{} ({}): {}", self.model_name, file, e))),
            Source::Local(dir) => {
                let path = dir.join(file);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(LoadError::Artifacts(format!(
                        "{} ({}): file not found",
                        self.model_name, file
                    )))
                }
            }
        }
    }

    fn get_optional(&self, file: &str) -> Option<PathBuf> {
        match self.get(file) {
            Ok(path) => Some(path),
            Err(e) => {
                debug!(model = %self.model_name, file, error = %e, "Optional artifact not available");
                None
            }
        }
    }
}

/// Special token ids driving greedy decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSettings {
    pub decoder_start_token_id: u32,
    pub eos_token_id: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            decoder_start_token_id: 3,
            eos_token_id: 3,
        }
    }
}

impl GenerationSettings {
    /// Read ids from `generation_config.json`, keeping defaults for absent keys.
    pub fn from_file(path: Option<&Path>) -> Result<Self, LoadError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, LoadError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| LoadError::Config(format!("{GENERATION_CONFIG_FILE}: {e}")))?;
        let defaults = Self::default();
        Ok(Self {
            decoder_start_token_id: token_id(&value, "decoder_start_token_id")
                .unwrap_or(defaults.decoder_start_token_id),
            eos_token_id: token_id(&value, "eos_token_id").unwrap_or(defaults.eos_token_id),
        })
    }
}

/// Integer id, or the first element when the config lists several.
fn token_id(value: &Value, key: &str) -> Option<u32> {
    let field = value.get(key)?;
    let id = match field {
        Value::Array(items) => items.first()?.as_u64()?,
        other => other.as_u64()?,
    };
    u32::try_from(id).ok()
}
