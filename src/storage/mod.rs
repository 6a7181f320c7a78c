use std::sync::Arc;

use tracing::info;

use crate::errors::Result;

pub mod backend;
pub mod memory;
pub mod models;
pub mod store;

pub use backend::SeaOrmStore;
pub use memory::{FaultPlan, MemoryStore};
pub use models::{
    HOURS_PER_DAY, Page, PageOrder, UserProfile, ViewBucket, bucket_doc_id, date_key,
    parse_date_key,
};
pub use store::ViewStore;

pub struct StorageFactory;

impl StorageFactory {
    /// 根据全局配置创建存储后端
    pub async fn create() -> Result<Arc<dyn ViewStore>> {
        let config = crate::config::get_config();
        let database = &config.database;

        // 从 URL 自动推断数据库类型
        let backend_type = backend::infer_backend_from_url(&database.database_url)?;
        info!("Using storage backend: {}", backend_type);

        if backend_type == "memory" {
            return Ok(Arc::new(MemoryStore::new()));
        }

        let store = SeaOrmStore::new(
            &database.database_url,
            &backend_type,
            database.pool_size,
            backend::retry::RetryConfig::from(database),
        )
        .await?;
        Ok(Arc::new(store))
    }
}
