use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ConfigError;

/// Settings for the external YOLOv5 detector process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Program used to run the entry script (`python`, or a stub in tests).
    pub interpreter: String,
    pub entry_script: String,
    /// Directory holding the detector script and weights; used as the child's working directory.
    pub script_dir: PathBuf,
    /// Weights path, relative to `script_dir`.
    pub weights: String,
    pub confidence: f32,
    /// Output project directory, relative to `script_dir`.
    pub project: String,
    pub run_name: String,
    pub csv_file_name: String,
    pub timeout_secs: u64,
    pub fail_on_nonzero_exit: bool,
    /// Keep each run's output directory after the artifact is published.
    pub retain_outputs: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            entry_script: "detect.py".to_string(),
            script_dir: PathBuf::from("yolov5"),
            weights: "runs/train/yolov-202405-last.pt".to_string(),
            confidence: 0.25,
            project: "runs/detect".to_string(),
            run_name: "yolo_road_det".to_string(),
            csv_file_name: "predictions.csv".to_string(),
            timeout_secs: 600,
            fail_on_nonzero_exit: true,
            retain_outputs: false,
        }
    }
}

impl DetectorSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let settings: DetectorSettings = serde_yaml::from_str(config_str)?;
        if settings.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be greater than zero".into()));
        }
        if !(0.0..=1.0).contains(&settings.confidence) {
            return Err(ConfigError::Invalid(format!(
                "confidence must be within [0, 1], got {}",
                settings.confidence
            )));
        }
        Ok(settings)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Run name for one invocation. Suffixing the instance id keeps concurrent runs apart.
    pub fn run_name_for(&self, instance_id: &str) -> String {
        format!("{}_{}", self.run_name, instance_id)
    }

    pub fn output_dir_for(&self, run_name: &str) -> PathBuf {
        self.script_dir.join(&self.project).join(run_name)
    }

    pub fn csv_path_for(&self, run_name: &str) -> PathBuf {
        self.output_dir_for(run_name).join(&self.csv_file_name)
    }
}
