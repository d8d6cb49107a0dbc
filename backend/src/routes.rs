use actix_web::{web, HttpRequest, HttpResponse};
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use shared::{OrchestrationStatus, PredictionResult};
use std::time::Duration;

use crate::workflow::Orchestrator;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// How long `POST /api/yolov/detect` waits before answering with a status link.
#[derive(Clone, Copy)]
pub struct WaitSettings {
    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceStatusResponse {
    id: String,
    runtime_status: OrchestrationStatus,
    created_at: String,
    updated_at: String,
    output: Option<PredictionResult>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/yolov/detect").route(web::post().to(start_detection)))
        .service(
            web::resource("/api/yolov/detect/{instance_id}")
                .name("instance_status")
                .route(web::get().to(get_instance_status)),
        )
        .service(web::resource("/api/health").route(web::get().to(health)));
}

async fn start_detection(
    req: HttpRequest,
    body: web::Bytes,
    orchestrator: web::Data<Orchestrator>,
    wait: web::Data<WaitSettings>,
) -> HttpResponse {
    let payload = String::from_utf8_lossy(&body).into_owned();
    info!("Received detection request: {}", payload);

    let handle = match orchestrator.start(payload).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start orchestration: {:?}", e);
            return HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("An error occurred: {}", e),
            });
        }
    };

    let instance_id = handle.instance_id.clone();
    match handle.wait(wait.timeout).await {
        Some(result) => {
            info!("Orchestration {} returned hasErrors={}", instance_id, result.has_errors());
            HttpResponse::Ok().json(result)
        }
        None => {
            let status_uri = req
                .url_for("instance_status", [&instance_id])
                .map(|url| url.to_string())
                .unwrap_or_else(|_| format!("/api/yolov/detect/{}", instance_id));
            info!("Orchestration {} still running; returning status link", instance_id);
            HttpResponse::Accepted().json(json!({
                "id": instance_id,
                "statusQueryGetUri": status_uri,
            }))
        }
    }
}

async fn get_instance_status(orchestrator: web::Data<Orchestrator>, path: web::Path<String>) -> HttpResponse {
    let instance_id = path.into_inner();
    match orchestrator.status(&instance_id).await {
        Ok(Some(record)) => HttpResponse::Ok().json(InstanceStatusResponse {
            id: record.id,
            runtime_status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            output: record.result,
        }),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error: format!("Orchestration '{}' not found.", instance_id),
        }),
        Err(e) => {
            error!("Error retrieving orchestration {}: {:?}", instance_id, e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: format!("Error retrieving orchestration: {}", e),
            })
        }
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
