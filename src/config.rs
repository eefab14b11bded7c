use anyhow::{Context, Result};
use facematch_vision::{model, DetectorSettings, Metric};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEMATCH_CONFIG_PATH").unwrap_or("/usr/local/etc/facematch/config.toml"))
});

pub static MODEL_DIR: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEMATCH_MODEL_DIR").unwrap_or("/usr/local/share/facematch/models"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Every Nth decoded frame is handed to the extractor.
    pub sampling_interval: usize,
    /// Largest distance still counted as the same face.
    pub match_tolerance: f32,
    pub metric: Metric,
    pub detector: DetectorConfig,
    pub models: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling_interval: 10,
            match_tolerance: 0.45,
            metric: Metric::Euclidean,
            detector: DetectorConfig::default(),
            models: ModelConfig::default(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let s = DetectorSettings::default();
        Self {
            score_threshold: s.score_threshold,
            nms_threshold: s.nms_threshold,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector: MODEL_DIR.join(model::DETECTOR_MODEL_FILE),
            recognizer: MODEL_DIR.join(model::RECOGNIZER_MODEL_FILE),
        }
    }
}

impl DetectorConfig {
    pub fn settings(&self) -> DetectorSettings {
        DetectorSettings {
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval == 0 {
            anyhow::bail!("sampling_interval must be at least 1");
        }
        if !self.match_tolerance.is_finite() || self.match_tolerance < 0.0 {
            anyhow::bail!(
                "match_tolerance must be a non-negative number, got {}",
                self.match_tolerance
            );
        }
        for (name, value) in [
            ("detector.score_threshold", self.detector.score_threshold),
            ("detector.nms_threshold", self.detector.nms_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
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
