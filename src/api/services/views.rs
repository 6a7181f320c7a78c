use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::analytics::{DailyViews, RecordOutcome};
use crate::api::AppState;

const DEFAULT_DAILY_DAYS: usize = 7;
const MAX_DAILY_DAYS: usize = 90;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordViewRequest {
    #[serde(default)]
    pub viewer_id: Option<String>,
    /// 浏览发生的站点，服务端渲染代码调用时由其显式传入
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordViewResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<RecordOutcome> for RecordViewResponse {
    fn from(outcome: RecordOutcome) -> Self {
        Self {
            outcome: outcome.label(),
            reason: outcome.skip_reason().map(|r| r.as_str()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    pub days: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyResponse {
    pub page_id: String,
    pub days: Vec<DailyViews>,
}

pub struct ViewsService;

impl ViewsService {
    /// 记录一次浏览，结果只用于观测，调用方无需处理
    pub async fn record_view(
        req: HttpRequest,
        path: web::Path<String>,
        body: Option<web::Json<RecordViewRequest>>,
        state: web::Data<AppState>,
    ) -> impl Responder {
        let page_id = path.into_inner();
        let body = body.map(web::Json::into_inner).unwrap_or_default();
        let origin = body.origin.or_else(|| request_origin(&req));
        let viewer_id = body.viewer_id;

        let outcome = state
            .recorder
            .record_view(&page_id, viewer_id.as_deref(), origin.as_deref())
            .await;
        trace!("View of {} -> {:?}", page_id, outcome);

        HttpResponse::Accepted().json(RecordViewResponse::from(outcome))
    }

    pub async fn last_24_hours(
        path: web::Path<String>,
        state: web::Data<AppState>,
    ) -> impl Responder {
        let window = state.windows.get_last_24_hours(&path).await;
        HttpResponse::Ok().json(window)
    }

    pub async fn daily(
        path: web::Path<String>,
        query: web::Query<DailyQuery>,
        state: web::Data<AppState>,
    ) -> impl Responder {
        let page_id = path.into_inner();
        let days = query
            .days
            .unwrap_or(DEFAULT_DAILY_DAYS)
            .clamp(1, MAX_DAILY_DAYS);
        let days = state.windows.daily_totals(&page_id, days).await;
        HttpResponse::Ok().json(DailyResponse { page_id, days })
    }
}

/// 来源站点：优先 Origin，其次 Referer
///
/// Host 指向本服务自身，不能代表浏览发生的站点。
fn request_origin(req: &HttpRequest) -> Option<String> {
    let headers = req.headers();
    headers
        .get(header::ORIGIN)
        .or_else(|| headers.get(header::REFERER))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// 浏览路由 `/pages/{id}/views`
pub fn views_routes() -> actix_web::Scope {
    web::scope("/pages/{id}/views")
        .route("", web::post().to(ViewsService::record_view))
        .route("/24h", web::get().to(ViewsService::last_24_hours))
        .route("/daily", web::get().to(ViewsService::daily))
}
