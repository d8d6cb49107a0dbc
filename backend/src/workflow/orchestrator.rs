use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde_json::Value;
use shared::{DetectionRequest, DetectorType, OrchestrationStatus, PredictionResult};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::ddb::{InstanceStore, InstanceStoreError, InvalidTransition, OrchestrationRecord};
use crate::workflow::activity::DetectionActivity;

pub const INCORRECT_DETECTOR_TYPE: &str = "the detector type is incorrect";

/// Handle to a started orchestration instance.
pub struct OrchestrationHandle {
    pub instance_id: String,
    completion: oneshot::Receiver<PredictionResult>,
}

impl OrchestrationHandle {
    /// Waits for the instance to finish, up to `timeout`. On timeout the instance keeps running
    /// and its record can be polled.
    pub async fn wait(self, timeout: Duration) -> Option<PredictionResult> {
        match tokio::time::timeout(timeout, self.completion).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(_)) => {
                error!("Orchestration {} dropped without a result", self.instance_id);
                None
            }
            Err(_) => None,
        }
    }

    pub async fn join(self) -> Option<PredictionResult> {
        self.completion.await.ok()
    }
}

/// Drives each request through `Pending → Dispatched → AwaitingActivity → Completed`, or to
/// `Failed`, persisting the record after every step.
#[derive(Clone)]
pub struct Orchestrator {
    activity: Arc<DetectionActivity>,
    instances: Arc<dyn InstanceStore>,
}

impl Orchestrator {
    pub fn new(activity: Arc<DetectionActivity>, instances: Arc<dyn InstanceStore>) -> Self {
        Self { activity, instances }
    }

    /// Records a new instance for `payload` and runs it in the background.
    pub async fn start(&self, payload: String) -> Result<OrchestrationHandle, InstanceStoreError> {
        let instance_id = Uuid::new_v4().to_string();
        let record = OrchestrationRecord::new(instance_id.clone(), payload);
        self.instances.create(&record).await?;
        info!("Started orchestration with ID = '{}'", instance_id);

        let (tx, rx) = oneshot::channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let result = orchestrator.run_instance(record).await;
            if tx.send(result).is_err() {
                info!("Orchestration result has no waiting caller; record holds it");
            }
        });

        Ok(OrchestrationHandle {
            instance_id,
            completion: rx,
        })
    }

    pub async fn status(&self, instance_id: &str) -> Result<Option<OrchestrationRecord>, InstanceStoreError> {
        self.instances.get(instance_id).await
    }

    /// Runs a recorded instance to a terminal state. Always yields a result.
    pub async fn run_instance(&self, mut record: OrchestrationRecord) -> PredictionResult {
        let request = match decode_request(&record.request) {
            Ok(request) => request,
            Err(failure) => {
                warn!("[{}] Malformed request: {:?}", record.id, failure.errors());
                return self.finish(&mut record, OrchestrationStatus::Failed, failure).await;
            }
        };

        if let Err(e) = self.advance(&mut record, OrchestrationStatus::Dispatched).await {
            return self.fail_unexpected(&mut record, &request, e).await;
        }

        if !request.detector_type.is_implemented() {
            info!("[{}] Rejecting detector type {:?}", record.id, request.detector_type);
            let failure =
                PredictionResult::failure(request.file_name.clone(), request.detector_type, INCORRECT_DETECTOR_TYPE);
            return self.finish(&mut record, OrchestrationStatus::Failed, failure).await;
        }

        if let Err(e) = self.advance(&mut record, OrchestrationStatus::AwaitingActivity).await {
            return self.fail_unexpected(&mut record, &request, e).await;
        }

        // Sole suspension point: the activity runs as its own task.
        let activity = self.activity.clone();
        let instance_id = record.id.clone();
        let activity_request = request.clone();
        let dispatched = tokio::spawn(async move { activity.run(&instance_id, &activity_request).await });

        match dispatched.await {
            Ok(result) => self.finish(&mut record, OrchestrationStatus::Completed, result).await,
            Err(e) => {
                error!("[{}] Activity dispatch failed: {}", record.id, e);
                let failure = PredictionResult::failure(
                    request.file_name.clone(),
                    request.detector_type,
                    format!("Activity dispatch failed: {}", e),
                );
                self.finish(&mut record, OrchestrationStatus::Failed, failure).await
            }
        }
    }

    async fn advance(
        &self,
        record: &mut OrchestrationRecord,
        status: OrchestrationStatus,
    ) -> Result<(), InvalidTransition> {
        let from = record.status;
        record.set_status(status)?;
        info!("[{}] {:?} -> {:?}", record.id, from, status);
        self.persist(record).await;
        Ok(())
    }

    async fn fail_unexpected(
        &self,
        record: &mut OrchestrationRecord,
        request: &DetectionRequest,
        e: InvalidTransition,
    ) -> PredictionResult {
        error!("[{}] {}", record.id, e);
        let failure = PredictionResult::failure(request.file_name.clone(), request.detector_type, e.to_string());
        self.finish(record, OrchestrationStatus::Failed, failure).await
    }

    async fn finish(
        &self,
        record: &mut OrchestrationRecord,
        status: OrchestrationStatus,
        result: PredictionResult,
    ) -> PredictionResult {
        let from = record.status;
        match record.finish(status, result.clone()) {
            Ok(()) => {
                info!(
                    "[{}] {:?} -> {:?} (hasErrors: {})",
                    record.id,
                    from,
                    status,
                    result.has_errors()
                );
                self.persist(record).await;
            }
            Err(e) => error!("[{}] Could not record final state: {}", record.id, e),
        }
        result
    }

    async fn persist(&self, record: &OrchestrationRecord) {
        if let Err(e) = self.instances.update(record).await {
            error!("[{}] Failed to persist {:?} record: {}", record.id, record.status, e);
        }
    }
}

/// Decodes the inbound payload. On failure the returned result keeps whatever file name and
/// detector type could be salvaged from the raw JSON.
pub fn decode_request(payload: &str) -> Result<DetectionRequest, PredictionResult> {
    let value: Value = serde_json::from_str(payload).map_err(|e| {
        PredictionResult::failure(String::new(), DetectorType::Unknown, format!("Invalid request payload: {}", e))
    })?;

    serde_json::from_value::<DetectionRequest>(value.clone()).map_err(|e| {
        let file_name = value
            .get("fileName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let detector_type = value
            .get("detectorType")
            .map(DetectorType::from_json)
            .unwrap_or(DetectorType::Unknown);
        PredictionResult::failure(file_name, detector_type, format!("Invalid request payload: {}", e))
    })
}
