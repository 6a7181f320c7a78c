use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use tracing::trace;

use crate::api::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: String,
    pub pending_views: usize,
}

pub struct HealthService;

impl HealthService {
    pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
        trace!("Received health check request");
        let status = if state.recorder.is_disposed() {
            "draining"
        } else {
            "healthy"
        };
        HttpResponse::Ok().json(HealthResponse {
            status,
            backend: state.store.backend_name().to_string(),
            pending_views: state.recorder.pending_views(),
        })
    }

    // 活跃性检查
    pub async fn liveness_check() -> impl Responder {
        HttpResponse::NoContent().finish()
    }
}

/// Health 路由 `/health`
pub fn health_routes() -> actix_web::Scope {
    web::scope("/health")
        .route("", web::get().to(HealthService::health_check))
        .route("", web::head().to(HealthService::health_check))
        .route("/live", web::get().to(HealthService::liveness_check))
}
