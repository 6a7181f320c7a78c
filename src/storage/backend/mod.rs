//! SeaORM storage backend
//!
//! Relational rendition of the page-view documents, supporting SQLite,
//! MySQL/MariaDB and PostgreSQL. A `pageViews/${pageId}_${date}` document
//! maps to one `page_views` row plus up to 24 `page_view_hours` rows.

mod buckets;
mod connection;
pub mod converters;
mod pages;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use tracing::warn;

use crate::errors::{Result, ViewsError};
use crate::storage::models::{Page, PageOrder, UserProfile, ViewBucket};
use crate::storage::store::ViewStore;

pub use connection::{connect_generic, connect_sqlite, run_migrations};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("memory://") {
        Ok("memory".to_string())
    } else if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(ViewsError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: memory://, sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based view store
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
    backend_name: String,
    retry_config: retry::RetryConfig,
}

impl SeaOrmStore {
    pub async fn new(
        database_url: &str,
        backend_name: &str,
        pool_size: u32,
        retry_config: retry::RetryConfig,
    ) -> Result<Self> {
        if database_url.is_empty() {
            return Err(ViewsError::database_config("DATABASE_URL 未设置"));
        }

        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, backend_name, pool_size).await?
        };

        run_migrations(&db).await?;

        warn!("{} view store initialized.", backend_name.to_uppercase());
        Ok(Self::from_connection(db, backend_name, retry_config))
    }

    /// 基于已迁移的连接创建存储
    pub fn from_connection(
        db: DatabaseConnection,
        backend_name: &str,
        retry_config: retry::RetryConfig,
    ) -> Self {
        Self {
            db,
            backend_name: backend_name.to_string(),
            retry_config,
        }
    }

    /// 获取数据库连接
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl ViewStore for SeaOrmStore {
    fn backend_name(&self) -> &str {
        &self.backend_name
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<Page>> {
        self.find_page(page_id).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.find_user(user_id).await
    }

    async fn get_bucket(&self, page_id: &str, date: NaiveDate) -> Result<Option<ViewBucket>> {
        self.find_bucket(page_id, date).await
    }

    async fn increment_bucket(
        &self,
        page_id: &str,
        date: NaiveDate,
        hours: &[(u8, u64)],
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.upsert_bucket_increment(page_id, date, hours, at).await
    }

    async fn increment_page_views(&self, page_id: &str, amount: u64) -> Result<()> {
        self.add_page_views(page_id, amount).await
    }

    async fn set_page_views_24h(&self, page_id: &str, views_24h: u64) -> Result<()> {
        self.update_views_24h(page_id, views_24h).await
    }

    async fn top_buckets_for_date(
        &self,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ViewBucket>> {
        self.find_top_buckets(date, limit).await
    }

    async fn top_public_pages(&self, order: PageOrder, limit: usize) -> Result<Vec<Page>> {
        self.find_top_pages(order, limit).await
    }

    async fn upsert_page(&self, page: &Page) -> Result<()> {
        self.save_page(page).await
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.save_user(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_backend_from_url() {
        assert_eq!(infer_backend_from_url("memory://").unwrap(), "memory");
        assert_eq!(infer_backend_from_url("sqlite://views.db").unwrap(), "sqlite");
        assert_eq!(infer_backend_from_url("pageviews.db").unwrap(), "sqlite");
        assert_eq!(infer_backend_from_url(":memory:").unwrap(), "sqlite");
        assert_eq!(infer_backend_from_url("mariadb://db/views").unwrap(), "mysql");
        assert_eq!(
            infer_backend_from_url("postgresql://db/views").unwrap(),
            "postgres"
        );
        assert!(infer_backend_from_url("redis://localhost").is_err());
    }
}
