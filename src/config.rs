use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::DEFAULT_EXTENSIONS;
use crate::schema::Schema;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("ANTHROPO_CONFIG_PATH").unwrap_or("/usr/local/etc/anthropo/config.toml"))
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelPaths,
    pub detection: Detection,
    pub batch: BatchConfig,
    pub server: Server,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub landmarks68: PathBuf,
    pub face_mesh: PathBuf,
    pub classifier: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        let dir = Path::new("models");
        Self {
            face_detector: dir.join("face_detection_yunet.onnx"),
            landmarks68: dir.join("landmarks_68.onnx"),
            face_mesh: dir.join("face_mesh.onnx"),
            classifier: dir.join("autism_classifier.onnx"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Detection {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub extensions: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind: String,
    pub schema: Schema,
    pub expected_features: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            schema: Schema::Mesh,
            expected_features: Schema::Mesh.catalogue().len(),
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
