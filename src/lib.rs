//! WeWrite views - page-view aggregation and trending service
//!
//! Records page views into per-page per-day hourly buckets, reconstructs the
//! trailing 24-hour window for a page, and ranks pages by recent views.
//!
//! # Architecture
//! - `storage`: `ViewStore` boundary, in-memory and SeaORM backends
//! - `analytics`: session dedup, write batching, recorder, rolling window, trending
//! - `api`: HTTP services
//! - `config`: Configuration management
//! - `runtime`: Server lifecycle
//! - `system`: Logging

pub mod analytics;
pub mod api;
pub mod config;
pub mod errors;
pub mod runtime;
pub mod storage;
pub mod system;
