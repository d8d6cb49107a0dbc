use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{OrchestrationStatus, PredictionResult};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid transition for instance {id}: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub id: String,
    pub from: OrchestrationStatus,
    pub to: OrchestrationStatus,
}

/// Write-ahead record of one orchestration instance, rewritten on every transition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrchestrationRecord {
    pub id: String,
    pub status: OrchestrationStatus,
    pub created_at: String,
    pub updated_at: String,
    /// Raw inbound payload, kept verbatim.
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PredictionResult>,
}

impl OrchestrationRecord {
    pub fn new(id: String, request: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id,
            status: OrchestrationStatus::default(),
            created_at: now.clone(),
            updated_at: now,
            request,
            result: None,
        }
    }

    pub fn set_status(&mut self, status: OrchestrationStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(status) {
            return Err(InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.updated_at = Utc::now().to_rfc3339();
        Ok(())
    }

    /// Moves to `Completed` or `Failed` and stores the result.
    pub fn finish(&mut self, status: OrchestrationStatus, result: PredictionResult) -> Result<(), InvalidTransition> {
        debug_assert!(status.is_terminal());
        self.set_status(status)?;
        self.result = Some(result);
        Ok(())
    }
}
