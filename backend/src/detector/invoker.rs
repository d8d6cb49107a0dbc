use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::process::Command;

use super::config::DetectorSettings;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Detector working directory does not exist: {0}")]
    MissingWorkDir(PathBuf),
    #[error("Failed to launch detector '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Detector timed out after {0} s")]
    TimedOut(u64),
    #[error("Detector exited with status {0}")]
    NonZeroExit(i32),
    #[error("Detector was terminated by a signal")]
    Terminated,
    #[error("Predictions CSV file not found at {0}")]
    CsvNotFound(PathBuf),
    #[error("Detector IO error: {0}")]
    Io(#[from] io::Error),
}

/// Contents of the predictions CSV after the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvContent {
    Found(String),
    NotFound,
}

/// Record of a single detector run. Never persisted.
#[derive(Debug, Clone)]
pub struct DetectorInvocation {
    pub input_path: PathBuf,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub csv_path: PathBuf,
    pub args: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
    pub csv: CsvContent,
}

impl DetectorInvocation {
    pub fn csv_first_line(&self) -> Option<&str> {
        match &self.csv {
            CsvContent::Found(content) => content.lines().next(),
            CsvContent::NotFound => None,
        }
    }

    /// Where the detector writes its annotated copy of the input image.
    pub fn artifact_path(&self) -> PathBuf {
        match self.input_path.file_name() {
            Some(name) => self.output_dir.join(name),
            None => self.output_dir.clone(),
        }
    }

    /// Classifies the finished run. A missing CSV always fails; a non-zero exit fails when
    /// `fail_on_nonzero_exit` is set.
    pub fn check(&self, fail_on_nonzero_exit: bool) -> Result<&str, DetectorError> {
        if fail_on_nonzero_exit {
            match self.exit_code {
                Some(0) => {}
                Some(code) => return Err(DetectorError::NonZeroExit(code)),
                None => return Err(DetectorError::Terminated),
            }
        }
        match &self.csv {
            CsvContent::Found(content) => Ok(content),
            CsvContent::NotFound => Err(DetectorError::CsvNotFound(self.csv_path.clone())),
        }
    }
}

/// Runs the external detector as a child process with a fixed argument vector.
#[derive(Debug, Clone)]
pub struct DetectorInvoker {
    settings: DetectorSettings,
}

impl DetectorInvoker {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn build_args(&self, source: &Path, run_name: &str) -> Vec<String> {
        vec![
            self.settings.entry_script.clone(),
            "--source".to_string(),
            source.display().to_string(),
            "--weights".to_string(),
            self.settings.weights.clone(),
            "--conf".to_string(),
            self.settings.confidence.to_string(),
            "--project".to_string(),
            self.settings.project.clone(),
            "--name".to_string(),
            run_name.to_string(),
            "--save-csv".to_string(),
        ]
    }

    pub async fn invoke(&self, image_path: &Path, run_name: &str) -> Result<DetectorInvocation, DetectorError> {
        let work_dir = self.settings.script_dir.clone();
        let work_dir_present = tokio::fs::metadata(&work_dir)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false);
        if !work_dir_present {
            return Err(DetectorError::MissingWorkDir(work_dir));
        }

        let output_dir = self.settings.output_dir_for(run_name);
        let csv_path = self.settings.csv_path_for(run_name);
        match tokio::fs::remove_dir_all(&output_dir).await {
            Ok(()) => debug!("Removed stale detector output {}", output_dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(DetectorError::Io(e)),
        }

        // The child runs inside `work_dir`, so the source must not be relative to ours.
        let input_path = std::path::absolute(image_path)?;
        let args = self.build_args(&input_path, run_name);
        debug!("Detector command: {} {:?}", self.settings.interpreter, args);

        let mut command = Command::new(&self.settings.interpreter);
        command
            .args(&args)
            .current_dir(&work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = command.spawn().map_err(|e| DetectorError::Launch {
            program: self.settings.interpreter.clone(),
            source: e,
        })?;
        let output = match tokio::time::timeout(self.settings.timeout(), child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "Detector run '{}' exceeded {} s and was killed",
                    run_name, self.settings.timeout_secs
                );
                return Err(DetectorError::TimedOut(self.settings.timeout_secs));
            }
        };
        let elapsed = start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stdout.trim().is_empty() {
            info!("Detector output: {}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            warn!("Detector errors: {}", stderr.trim_end());
        }
        info!(
            "Detector run '{}' finished with {:?} in {:.3} s",
            run_name,
            output.status.code(),
            elapsed.as_secs_f64()
        );

        let csv = match tokio::fs::read_to_string(&csv_path).await {
            Ok(content) => CsvContent::Found(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Predictions CSV file not found at {}", csv_path.display());
                CsvContent::NotFound
            }
            Err(e) => return Err(DetectorError::Io(e)),
        };

        Ok(DetectorInvocation {
            input_path,
            work_dir,
            output_dir,
            csv_path,
            args,
            stdout,
            stderr,
            exit_code: output.status.code(),
            elapsed,
            csv,
        })
    }
}
