//! 存储边界
//!
//! 浏览统计只通过 `ViewStore` 访问底层文档存储。所有方法返回
//! `Result`，是否降级为默认值由上层调用方决定。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::errors::Result;
use crate::storage::models::{Page, PageOrder, UserProfile, ViewBucket};

#[async_trait]
pub trait ViewStore: Send + Sync {
    /// 后端名称（用于日志和健康检查）
    fn backend_name(&self) -> &str;

    async fn get_page(&self, page_id: &str) -> Result<Option<Page>>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn get_bucket(&self, page_id: &str, date: NaiveDate) -> Result<Option<ViewBucket>>;

    /// 原子累加某页某天若干小时的计数
    ///
    /// 桶不存在时先以 24 个零小时创建，再累加；`total_views` 同步增加
    /// 所有小时的总和，`last_updated` 设为 `at`。
    async fn increment_bucket(
        &self,
        page_id: &str,
        date: NaiveDate,
        hours: &[(u8, u64)],
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// 原子累加页面的累计浏览数
    async fn increment_page_views(&self, page_id: &str, amount: u64) -> Result<()>;

    async fn set_page_views_24h(&self, page_id: &str, views_24h: u64) -> Result<()>;

    /// 某天的浏览桶，按 total_views 降序，同值按 page_id 升序
    async fn top_buckets_for_date(&self, date: NaiveDate, limit: usize)
    -> Result<Vec<ViewBucket>>;

    /// 公开且未删除的页面，按指定字段降序
    async fn top_public_pages(&self, order: PageOrder, limit: usize) -> Result<Vec<Page>>;

    async fn upsert_page(&self, page: &Page) -> Result<()>;

    async fn upsert_user(&self, user: &UserProfile) -> Result<()>;
}
