use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;

use crate::api::AppState;

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub limit: Option<usize>,
}

pub struct TrendingService;

impl TrendingService {
    pub async fn get_trending(
        query: web::Query<TrendingQuery>,
        state: web::Data<AppState>,
    ) -> impl Responder {
        let limit = state.trending_limit(query.limit);
        HttpResponse::Ok().json(state.trending.get_trending(limit).await)
    }
}

/// 热门路由 `/trending`
pub fn trending_routes() -> actix_web::Scope {
    web::scope("/trending").route("", web::get().to(TrendingService::get_trending))
}
