//! 内存存储
//!
//! 基于 DashMap 的 `ViewStore` 实现，用于测试与 `memory://` 部署。
//! 通过 `FaultPlan` 可以模拟离线、权限拒绝等故障。

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::{DashMap, DashSet};
use tracing::trace;

use crate::errors::{Result, ViewsError};
use crate::storage::models::{Page, PageOrder, UserProfile, ViewBucket, bucket_doc_id};
use crate::storage::store::ViewStore;

/// 故障注入开关
#[derive(Default)]
pub struct FaultPlan {
    /// 所有操作都返回 StoreUnavailable
    pub offline: AtomicBool,
    /// get_bucket 失败
    pub fail_bucket_reads: AtomicBool,
    /// top_buckets_for_date 失败
    pub fail_bucket_queries: AtomicBool,
    /// top_public_pages 失败
    pub fail_page_queries: AtomicBool,
    /// get_user 失败
    pub fail_user_reads: AtomicBool,
    /// 所有写操作失败
    pub fail_writes: AtomicBool,
    /// 读取这些页面（页面本身及其浏览桶）返回 PermissionDenied
    pub denied_pages: DashSet<String>,
}

impl FaultPlan {
    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) || flag.load(Ordering::SeqCst) {
            return Err(ViewsError::store_unavailable(format!(
                "memory store: {} unavailable",
                op
            )));
        }
        Ok(())
    }

    fn check_denied(&self, page_id: &str) -> Result<()> {
        if self.denied_pages.contains(page_id) {
            return Err(ViewsError::permission_denied(format!(
                "missing or insufficient permissions for page {}",
                page_id
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pages: DashMap<String, Page>,
    users: DashMap<String, UserProfile>,
    /// key: `${pageId}_${date}`
    buckets: DashMap<String, ViewBucket>,
    faults: FaultPlan,
    bucket_writes: AtomicUsize,
    page_view_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// increment_bucket 成功调用次数
    pub fn bucket_writes(&self) -> usize {
        self.bucket_writes.load(Ordering::Relaxed)
    }

    /// increment_page_views 成功调用次数
    pub fn page_view_writes(&self) -> usize {
        self.page_view_writes.load(Ordering::Relaxed)
    }

    /// 直接读取页面（绕过故障注入，测试断言用）
    pub fn page_snapshot(&self, page_id: &str) -> Option<Page> {
        self.pages.get(page_id).map(|p| p.clone())
    }

    /// 直接读取浏览桶（绕过故障注入，测试断言用）
    pub fn bucket_snapshot(&self, page_id: &str, date: NaiveDate) -> Option<ViewBucket> {
        self.buckets
            .get(&bucket_doc_id(page_id, date))
            .map(|b| b.clone())
    }

    /// 直接写入浏览桶（测试数据准备用）
    pub fn put_bucket(&self, bucket: ViewBucket) {
        self.buckets.insert(bucket.doc_id(), bucket);
    }
}

#[async_trait]
impl ViewStore for MemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn get_page(&self, page_id: &str) -> Result<Option<Page>> {
        self.faults.check(&self.faults.offline, "get_page")?;
        self.faults.check_denied(page_id)?;
        Ok(self.pages.get(page_id).map(|p| p.clone()))
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.faults.check(&self.faults.fail_user_reads, "get_user")?;
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn get_bucket(&self, page_id: &str, date: NaiveDate) -> Result<Option<ViewBucket>> {
        self.faults.check(&self.faults.fail_bucket_reads, "get_bucket")?;
        self.faults.check_denied(page_id)?;
        Ok(self.bucket_snapshot(page_id, date))
    }

    async fn increment_bucket(
        &self,
        page_id: &str,
        date: NaiveDate,
        hours: &[(u8, u64)],
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.faults.check(&self.faults.fail_writes, "increment_bucket")?;

        // entry() 持有分片写锁，保证同一个桶的累加是原子的
        self.buckets
            .entry(bucket_doc_id(page_id, date))
            .or_insert_with(|| ViewBucket::empty(page_id, date, at))
            .apply(hours, at);
        self.bucket_writes.fetch_add(1, Ordering::Relaxed);

        trace!(
            "MemoryStore: incremented bucket {} ({} hours)",
            bucket_doc_id(page_id, date),
            hours.len()
        );
        Ok(())
    }

    async fn increment_page_views(&self, page_id: &str, amount: u64) -> Result<()> {
        self.faults.check(&self.faults.fail_writes, "increment_page_views")?;
        match self.pages.get_mut(page_id) {
            Some(mut page) => {
                page.views += amount;
                self.page_view_writes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(ViewsError::not_found(format!("pages/{}", page_id))),
        }
    }

    async fn set_page_views_24h(&self, page_id: &str, views_24h: u64) -> Result<()> {
        self.faults.check(&self.faults.fail_writes, "set_page_views_24h")?;
        match self.pages.get_mut(page_id) {
            Some(mut page) => {
                page.views_24h = Some(views_24h);
                Ok(())
            }
            None => Err(ViewsError::not_found(format!("pages/{}", page_id))),
        }
    }

    async fn top_buckets_for_date(
        &self,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<ViewBucket>> {
        self.faults
            .check(&self.faults.fail_bucket_queries, "top_buckets_for_date")?;

        let mut buckets: Vec<ViewBucket> = self
            .buckets
            .iter()
            .filter(|b| b.date == date)
            .map(|b| b.clone())
            .collect();
        buckets.sort_by(|a, b| {
            b.total_views
                .cmp(&a.total_views)
                .then_with(|| a.page_id.cmp(&b.page_id))
        });
        buckets.truncate(limit);
        Ok(buckets)
    }

    async fn top_public_pages(&self, order: PageOrder, limit: usize) -> Result<Vec<Page>> {
        self.faults
            .check(&self.faults.fail_page_queries, "top_public_pages")?;

        let mut pages: Vec<Page> = self
            .pages
            .iter()
            .filter(|p| p.is_visible())
            .map(|p| p.clone())
            .collect();
        match order {
            PageOrder::Views24h => pages.sort_by(|a, b| {
                // None 排在所有 Some 之后
                let ka = a.views_24h.map(Reverse);
                let kb = b.views_24h.map(Reverse);
                match (ka, kb) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then_with(|| b.views.cmp(&a.views))
                .then_with(|| a.id.cmp(&b.id))
            }),
            PageOrder::Lifetime => {
                pages.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.id.cmp(&b.id)))
            }
        }
        pages.truncate(limit);
        Ok(pages)
    }

    async fn upsert_page(&self, page: &Page) -> Result<()> {
        self.faults.check(&self.faults.fail_writes, "upsert_page")?;
        self.pages.insert(page.id.clone(), page.clone());
        Ok(())
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.faults.check(&self.faults.fail_writes, "upsert_user")?;
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}
