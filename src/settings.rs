//! Typed run settings, validated at load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::algorithms::rl::{ComputeDevice, Method, RLConfig, TrainerSetup, TrainingConfig};
use crate::constraints::PenaltyWeights;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("single-file mode needs data.file")]
    MissingFile,

    #[error("data folder {0} does not exist")]
    MissingFolder(PathBuf),

    #[error("{field} must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be finite and non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("method {0} is not available in this build (enable the `rl-nn` feature)")]
    MethodUnavailable(Method),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodSettings {
    pub name: Method,
    #[serde(default)]
    pub quickrun: bool,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSettings {
    /// Process every instance in `folder`.
    #[serde(default)]
    pub isthrough: bool,
    pub folder: PathBuf,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_output() -> PathBuf {
    PathBuf::from("output")
}

/// Settings for one invocation: the method, where instances come from and
/// the hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    pub method: MethodSettings,
    pub data: DataSettings,
    #[serde(default)]
    pub device: ComputeDevice,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub environment: RLConfig,
    #[serde(default)]
    pub penalties: PenaltyWeights,
}

impl RunSettings {
    /// Reads and validates a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        let settings: RunSettings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks the settings, including that this build can run the method.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.method.name.is_available() {
            return Err(SettingsError::MethodUnavailable(self.method.name));
        }
        if !self.data.isthrough && self.data.file.is_none() {
            return Err(SettingsError::MissingFile);
        }
        if !self.data.folder.is_dir() {
            return Err(SettingsError::MissingFolder(self.data.folder.clone()));
        }

        let t = &self.training;
        positive("training.epochs", t.epochs as f64)?;
        positive("training.episodes_per_epoch", t.episodes_per_epoch as f64)?;
        positive("training.quickrun_epochs", t.quickrun_epochs as f64)?;
        positive("training.quickrun_episodes", t.quickrun_episodes as f64)?;
        positive("training.gamma", t.gamma)?;
        positive("training.clip_eps", t.clip_eps)?;
        positive("training.learning_rate", t.learning_rate)?;
        positive("training.n_epochs", t.n_epochs as f64)?;
        positive("training.max_grad_norm", t.max_grad_norm)?;
        positive("training.reward_scale", t.reward_scale)?;
        positive("training.hidden_dim", t.hidden_dim as f64)?;
        non_negative("training.gae_lambda", t.gae_lambda)?;
        non_negative("training.entropy_coef", t.entropy_coef)?;
        non_negative("training.value_coef", t.value_coef)?;

        let e = &self.environment;
        positive("environment.top_m", e.top_m as f64)?;
        positive("environment.step_budget_factor", e.step_budget_factor)?;
        non_negative("environment.illegal_action_penalty", e.illegal_action_penalty)?;
        non_negative("environment.unplaced_penalty", e.unplaced_penalty)?;

        let p = &self.penalties;
        non_negative("penalties.hard", p.hard)?;
        non_negative("penalties.time", p.time)?;
        non_negative("penalties.room", p.room)?;
        non_negative("penalties.distribution", p.distribution)?;

        if self.device == ComputeDevice::Gpu && !cfg!(feature = "rl-nn") {
            warn!("device gpu has no effect without the rl-nn feature");
        }
        Ok(())
    }

    /// Instance files to process, in order.
    pub fn instances(&self) -> Result<Vec<PathBuf>, SettingsError> {
        if !self.data.isthrough {
            return self
                .data
                .file
                .as_ref()
                .map(|f| vec![self.data.folder.join(f)])
                .ok_or(SettingsError::MissingFile);
        }
        let io_err = |source: std::io::Error| SettingsError::Io {
            path: self.data.folder.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.data.folder).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn trainer_setup(&self) -> TrainerSetup {
        TrainerSetup {
            method: self.method.name,
            seed: self.method.seed,
            quickrun: self.method.quickrun,
            environment: self.environment.clone(),
            training: self.training.clone(),
            penalties: self.penalties,
            device: self.device,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SettingsError::Negative { field, value })
    }
}
