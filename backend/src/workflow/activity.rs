use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use shared::{DetectionRequest, PredictionResult, ResultArtifact};

use crate::detector::{
    parse_prediction_row, tag_artifact, ArtifactError, CsvParseError, DetectorError, DetectorInvoker,
};
use crate::storage::{self, ObjectStore, StorageError};

pub const UNSUPPORTED_DETECTOR: &str = "unsupported detector type";

/// Failure classes of the detect-and-publish pipeline. The `Display` text becomes the
/// result's `errors` field.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("{0}")]
    RequestValidation(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Detector invocation failed: {0}")]
    DetectorInvocation(#[from] DetectorError),
    #[error("Failed to parse prediction output: {0}")]
    OutputParse(#[from] CsvParseError),
    #[error("{0}")]
    Artifact(#[from] ArtifactError),
}

/// Fetch, detect, tag, publish. One instance is shared by all orchestrations.
pub struct DetectionActivity {
    source_store: Arc<dyn ObjectStore>,
    predictions_store: Arc<dyn ObjectStore>,
    invoker: DetectorInvoker,
    scratch_dir: PathBuf,
}

impl DetectionActivity {
    pub fn new(
        source_store: Arc<dyn ObjectStore>,
        predictions_store: Arc<dyn ObjectStore>,
        invoker: DetectorInvoker,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            source_store,
            predictions_store,
            invoker,
            scratch_dir,
        }
    }

    /// Runs the whole pipeline for one request. Every failure is folded into the returned
    /// result; this never errors.
    pub async fn run(&self, instance_id: &str, request: &DetectionRequest) -> PredictionResult {
        info!(
            "[{}] Running {:?} detection for '{}'",
            instance_id, request.detector_type, request.file_name
        );
        let mut elapsed = Duration::ZERO;
        let outcome = self.execute(instance_id, request, &mut elapsed).await;

        self.cleanup(instance_id, request).await;

        match outcome {
            Ok(result) => {
                info!(
                    "[{}] Detection finished: {:?} {:.4} in {:.3} s",
                    instance_id,
                    result.classification(),
                    result.prediction(),
                    result.time_taken().as_secs_f64()
                );
                result
            }
            Err(e) => {
                error!("[{}] Detection failed for '{}': {}", instance_id, request.file_name, e);
                PredictionResult::failure(request.file_name.clone(), request.detector_type, e.to_string())
                    .with_time_taken(elapsed)
            }
        }
    }

    async fn execute(
        &self,
        instance_id: &str,
        request: &DetectionRequest,
        elapsed: &mut Duration,
    ) -> Result<PredictionResult, ActivityError> {
        let detector_type = request.detector_type;
        if !detector_type.is_implemented() {
            return Err(ActivityError::RequestValidation(UNSUPPORTED_DETECTOR.to_string()));
        }

        let input_dir = self.input_dir(instance_id, request);
        let input_path = storage::download_to(self.source_store.as_ref(), &request.file_name, &input_dir).await?;

        let run_name = self.invoker.settings().run_name_for(instance_id);
        let invocation = self.invoker.invoke(&input_path, &run_name).await?;
        *elapsed = invocation.elapsed;
        let csv = invocation.check(self.invoker.settings().fail_on_nonzero_exit)?;

        let artifact = tag_artifact(&invocation.artifact_path(), detector_type).await?;
        let row = parse_prediction_row(csv)?;

        storage::upload_from(self.predictions_store.as_ref(), &artifact.path, &artifact.name).await?;

        Ok(PredictionResult::success(
            row.image_name,
            detector_type,
            row.classification,
            row.score,
            ResultArtifact {
                name: artifact.name,
                path: artifact.path.display().to_string(),
            },
            invocation.elapsed,
        ))
    }

    fn input_dir(&self, instance_id: &str, request: &DetectionRequest) -> PathBuf {
        let detector_dir = request.detector_type.artifact_prefix().trim_end_matches('_');
        self.scratch_dir.join(detector_dir).join(instance_id)
    }

    /// The downloaded input is never read again and always goes. The run output directory is
    /// kept only with `retain_outputs`.
    async fn cleanup(&self, instance_id: &str, request: &DetectionRequest) {
        remove_dir_if_exists(&self.input_dir(instance_id, request)).await;
        let settings = self.invoker.settings();
        if !settings.retain_outputs {
            let output_dir = settings.output_dir_for(&settings.run_name_for(instance_id));
            remove_dir_if_exists(&output_dir).await;
        }
    }
}

async fn remove_dir_if_exists(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => info!("Removed {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorSettings;
    use crate::storage::MemoryObjectStore;
    use shared::DetectorType;

    fn activity(scratch: &Path, script_dir: &Path) -> (DetectionActivity, Arc<MemoryObjectStore>) {
        let source = Arc::new(MemoryObjectStore::new());
        let predictions = Arc::new(MemoryObjectStore::new());
        let settings = DetectorSettings {
            script_dir: script_dir.to_path_buf(),
            ..DetectorSettings::default()
        };
        let activity = DetectionActivity::new(
            source.clone(),
            predictions,
            DetectorInvoker::new(settings),
            scratch.to_path_buf(),
        );
        (activity, source)
    }

    #[tokio::test]
    async fn unsupported_detector_performs_no_io() {
        let temp_dir = tempfile::tempdir().unwrap();
        let scratch = temp_dir.path().join("scratch");
        let (activity, _) = activity(&scratch, temp_dir.path());

        for detector_type in [DetectorType::Ssd, DetectorType::MaskRcnn, DetectorType::Unknown] {
            let request = DetectionRequest::new("a.jpg", "http://x/a.jpg", detector_type);
            let result = activity.run("inst", &request).await;
            assert!(result.has_errors());
            assert_eq!(result.errors(), Some(UNSUPPORTED_DETECTOR));
            assert_eq!(result.detector_type(), detector_type);
        }
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn missing_source_object_is_a_storage_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (activity, _) = activity(&temp_dir.path().join("scratch"), temp_dir.path());
        let request = DetectionRequest::new("absent.jpg", "http://x/absent.jpg", DetectorType::YoloV5);

        let result = activity.run("inst", &request).await;
        assert!(result.has_errors());
        assert_eq!(result.image_name(), "absent.jpg");
        assert!(result.errors().unwrap().starts_with("Storage error"), "{:?}", result.errors());
    }

    #[tokio::test]
    async fn unsafe_file_name_is_rejected_before_download() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (activity, source) = activity(&temp_dir.path().join("scratch"), temp_dir.path());
        source.put("../a.jpg", b"x".to_vec()).await.unwrap();
        let request = DetectionRequest::new("../a.jpg", "http://x/a.jpg", DetectorType::YoloV5);

        let result = activity.run("inst", &request).await;
        assert!(result.has_errors());
        assert!(result.errors().unwrap().contains("Invalid object key"));
    }

    #[tokio::test]
    async fn missing_detector_directory_is_a_detector_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (activity, source) = activity(&temp_dir.path().join("scratch"), &temp_dir.path().join("nope"));
        source.put("a.jpg", b"jpeg".to_vec()).await.unwrap();
        let request = DetectionRequest::new("a.jpg", "http://x/a.jpg", DetectorType::YoloV5);

        let result = activity.run("inst", &request).await;
        assert!(result.has_errors());
        assert!(result.errors().unwrap().starts_with("Detector invocation failed"));
        assert_eq!(result.result_image_name(), None);
    }
}
