pub mod dynamodb_store;
pub mod instance_store;
pub mod model;

pub use dynamodb_store::DynamoDbInstanceStore;
pub use instance_store::{InstanceStore, InstanceStoreError, MemoryInstanceStore};
pub use model::{InvalidTransition, OrchestrationRecord};
