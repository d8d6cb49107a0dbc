use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use log::{debug, error, info, warn};
use shared::OrchestrationStatus;
use std::collections::HashMap;

use crate::ddb::instance_store::{InstanceStore, InstanceStoreError};
use crate::ddb::model::OrchestrationRecord;

#[derive(Clone)]
pub struct DynamoDbInstanceStore {
    client: Client,
    table_name: String,
}

impl DynamoDbInstanceStore {
    pub fn new(client: Client, table_name: String) -> Self {
        info!("Using DynamoDB table '{}' for orchestration records", table_name);
        Self { client, table_name }
    }

    async fn put(&self, record: &OrchestrationRecord, must_be_new: bool) -> Result<(), InstanceStoreError> {
        let attributes = record_to_attributes(record)?;
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(attributes));
        if must_be_new {
            request = request.condition_expression("attribute_not_exists(id)");
        }
        request.send().await.map_err(|e| {
            if e.as_service_error()
                .is_some_and(|se| se.is_conditional_check_failed_exception())
            {
                InstanceStoreError::AlreadyExists(record.id.clone())
            } else {
                error!("AWS SDK error during put_item for instance {}: {:?}", record.id, e);
                InstanceStoreError::DynamoDb(e.to_string())
            }
        })?;
        debug!("Instance {} stored with status {:?}", record.id, record.status);
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for DynamoDbInstanceStore {
    async fn create(&self, record: &OrchestrationRecord) -> Result<(), InstanceStoreError> {
        self.put(record, true).await
    }

    async fn update(&self, record: &OrchestrationRecord) -> Result<(), InstanceStoreError> {
        self.put(record, false).await
    }

    async fn get(&self, id: &str) -> Result<Option<OrchestrationRecord>, InstanceStoreError> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| {
                error!("AWS SDK error during get_item for instance {}: {:?}", id, e);
                InstanceStoreError::DynamoDb(e.to_string())
            })?;
        match response.item {
            Some(item) => Ok(Some(attributes_to_record(item)?)),
            None => {
                warn!("Instance {} not found in DynamoDB", id);
                Ok(None)
            }
        }
    }
}

pub fn record_to_attributes(
    record: &OrchestrationRecord,
) -> Result<HashMap<String, AttributeValue>, InstanceStoreError> {
    let mut attributes = HashMap::new();
    attributes.insert("id".to_string(), AttributeValue::S(record.id.clone()));
    attributes.insert(
        "status".to_string(),
        AttributeValue::S(record.status.as_ref().to_string()),
    );
    attributes.insert("created_at".to_string(), AttributeValue::S(record.created_at.clone()));
    attributes.insert("updated_at".to_string(), AttributeValue::S(record.updated_at.clone()));
    attributes.insert("request".to_string(), AttributeValue::S(record.request.clone()));
    if let Some(result) = &record.result {
        let json = serde_json::to_string(result)?;
        attributes.insert("result".to_string(), AttributeValue::S(json));
    }
    Ok(attributes)
}

fn string_attribute(attributes: &HashMap<String, AttributeValue>, name: &str) -> Result<String, InstanceStoreError> {
    attributes
        .get(name)
        .and_then(|av| av.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| InstanceStoreError::InvalidData(format!("Missing {} attribute", name)))
}

pub fn attributes_to_record(
    attributes: HashMap<String, AttributeValue>,
) -> Result<OrchestrationRecord, InstanceStoreError> {
    let id = string_attribute(&attributes, "id")?;
    let status_str = string_attribute(&attributes, "status")?;
    let status: OrchestrationStatus = status_str
        .parse()
        .map_err(|_| InstanceStoreError::InvalidData(format!("Unknown status '{}'", status_str)))?;
    let result = match attributes.get("result").and_then(|av| av.as_s().ok()) {
        Some(json) => Some(serde_json::from_str(json)?),
        None => None,
    };
    Ok(OrchestrationRecord {
        status,
        created_at: string_attribute(&attributes, "created_at")?,
        updated_at: string_attribute(&attributes, "updated_at")?,
        request: string_attribute(&attributes, "request").unwrap_or_default(),
        result,
        id,
    })
}
