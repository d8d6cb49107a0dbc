pub mod activity;
pub mod orchestrator;

pub use activity::{ActivityError, DetectionActivity};
pub use orchestrator::{OrchestrationHandle, Orchestrator};
