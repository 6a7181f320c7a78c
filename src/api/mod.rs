//! HTTP 接口
//!
//! 浏览记录、24 小时统计、每日统计与热门排行，均为 JSON（camelCase）。

pub mod services;
mod state;

pub use services::{configure_routes, health_routes, trending_routes, views_routes};
pub use state::AppState;
