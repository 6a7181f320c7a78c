pub mod health;
pub mod trending;
pub mod views;

pub use health::{HealthService, health_routes};
pub use trending::{TrendingService, trending_routes};
pub use views::{ViewsService, views_routes};

use actix_web::web;

/// 注册全部路由
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api").service(views_routes()).service(trending_routes()))
        .service(health_routes());
}
