//! 最近 24 小时浏览数
//!
//! 读取今天和昨天两个桶，按当前小时拼接成最早在前的 24 个槽位。
//! 读取时顺带校准页面上缓存的 `views24h`。

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::recorder::ViewsSettings;
use super::{splice_trailing_window, window_anchor};
use crate::errors::{Result, ViewsError};
use crate::storage::ViewStore;
use crate::storage::models::{HOURS_PER_DAY, date_key};

/// 最近 24 小时的浏览总数与小时分布（最早的小时在前，当前小时在最后）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyWindow {
    pub total: u64,
    pub hourly: [u64; HOURS_PER_DAY],
}

impl HourlyWindow {
    pub fn empty() -> Self {
        Self {
            total: 0,
            hourly: [0; HOURS_PER_DAY],
        }
    }

    pub fn from_hourly(hourly: [u64; HOURS_PER_DAY]) -> Self {
        Self {
            total: hourly.iter().sum(),
            hourly,
        }
    }
}

/// 某一天的浏览总数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyViews {
    pub date: String,
    pub views: u64,
}

pub struct RollingWindowReader {
    store: Arc<dyn ViewStore>,
    reconcile_threshold: u64,
}

impl RollingWindowReader {
    pub fn new(store: Arc<dyn ViewStore>, settings: &ViewsSettings) -> Self {
        Self {
            store,
            reconcile_threshold: settings.reconcile_threshold,
        }
    }

    pub fn from_config(store: Arc<dyn ViewStore>) -> Self {
        Self::new(store, &ViewsSettings::from_config())
    }

    /// 读取失败时返回全零窗口
    pub async fn get_last_24_hours(&self, page_id: &str) -> HourlyWindow {
        self.get_last_24_hours_at(page_id, Utc::now()).await
    }

    pub async fn get_last_24_hours_at(&self, page_id: &str, now: DateTime<Utc>) -> HourlyWindow {
        match self.try_last_24_hours_at(page_id, now).await {
            Ok(window) => window,
            Err(e) => {
                log_read_failure("get_last_24_hours", page_id, &e);
                HourlyWindow::empty()
            }
        }
    }

    pub async fn try_last_24_hours(&self, page_id: &str) -> Result<HourlyWindow> {
        self.try_last_24_hours_at(page_id, Utc::now()).await
    }

    pub async fn try_last_24_hours_at(
        &self,
        page_id: &str,
        now: DateTime<Utc>,
    ) -> Result<HourlyWindow> {
        let (today, yesterday, current_hour) = window_anchor(now);
        let (today_bucket, yesterday_bucket) = tokio::join!(
            self.store.get_bucket(page_id, today),
            self.store.get_bucket(page_id, yesterday)
        );
        let today_bucket = today_bucket?;
        let yesterday_bucket = yesterday_bucket?;

        let window = HourlyWindow::from_hourly(splice_trailing_window(
            today_bucket.as_ref(),
            yesterday_bucket.as_ref(),
            current_hour,
        ));
        trace!(
            "RollingWindowReader: {} has {} views in the last 24h",
            page_id, window.total
        );

        self.reconcile(page_id, window.total).await;
        Ok(window)
    }

    /// 缓存值缺失或偏差超过阈值时写回 `views24h`，失败只记录日志
    async fn reconcile(&self, page_id: &str, total: u64) {
        let page = match self.store.get_page(page_id).await {
            Ok(Some(page)) => page,
            Ok(None) => return,
            Err(e) => {
                log_read_failure("reconcile", page_id, &e);
                return;
            }
        };

        let stale = match page.views_24h {
            None => true,
            Some(cached) => cached.abs_diff(total) > self.reconcile_threshold,
        };
        if !stale {
            return;
        }

        match self.store.set_page_views_24h(page_id, total).await {
            Ok(()) => debug!(
                "RollingWindowReader: views24h of {} reconciled {:?} -> {}",
                page_id, page.views_24h, total
            ),
            Err(e) => log_read_failure("set_page_views_24h", page_id, &e),
        }
    }

    /// 最近 `days` 天（含今天）每天的浏览总数，最早的在前；读取失败的天按 0 计算
    pub async fn daily_totals(&self, page_id: &str, days: usize) -> Vec<DailyViews> {
        self.daily_totals_at(page_id, days, Utc::now()).await
    }

    pub async fn daily_totals_at(
        &self,
        page_id: &str,
        days: usize,
        now: DateTime<Utc>,
    ) -> Vec<DailyViews> {
        let dates = trailing_dates(now.date_naive(), days);
        let reads = join_all(
            dates
                .iter()
                .map(|date| self.store.get_bucket(page_id, *date)),
        )
        .await;

        dates
            .into_iter()
            .zip(reads)
            .map(|(date, read)| {
                let views = match read {
                    Ok(bucket) => bucket.map_or(0, |b| b.total_views),
                    Err(e) => {
                        log_read_failure("daily_totals", page_id, &e);
                        0
                    }
                };
                DailyViews {
                    date: date_key(date),
                    views,
                }
            })
            .collect()
    }
}

fn trailing_dates(today: NaiveDate, days: usize) -> Vec<NaiveDate> {
    (0..days as u64)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .collect()
}

/// 权限拒绝视为“没有数据”，只在 debug 级别记录
fn log_read_failure(operation: &str, page_id: &str, err: &ViewsError) {
    if err.is_permission_denied() {
        debug!(
            "RollingWindowReader: {} denied for {}: {}",
            operation, page_id, err
        );
    } else {
        warn!(
            "RollingWindowReader: {} failed for {}: {}",
            operation, page_id, err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FaultPlan, MemoryStore, Page};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 14, 30, 0).unwrap()
    }

    fn reader(store: &Arc<MemoryStore>) -> RollingWindowReader {
        RollingWindowReader::new(
            Arc::clone(store) as Arc<dyn ViewStore>,
            &ViewsSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_no_views_is_empty_window() {
        let store = Arc::new(MemoryStore::new());
        let window = reader(&store).get_last_24_hours_at("p1", now()).await;
        assert_eq!(window, HourlyWindow::empty());
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_zero() {
        let store = Arc::new(MemoryStore::new());
        store
            .increment_bucket("p1", now().date_naive(), &[(14, 5)], now())
            .await
            .unwrap();
        FaultPlan::set(&store.faults().fail_bucket_reads, true);

        let reader = reader(&store);
        assert_eq!(
            reader.get_last_24_hours_at("p1", now()).await,
            HourlyWindow::empty()
        );
        assert!(reader.try_last_24_hours_at("p1", now()).await.is_err());
    }

    #[tokio::test]
    async fn test_reconcile_respects_threshold() {
        let store = Arc::new(MemoryStore::new());
        let mut page = Page::new("p1", "u1");
        page.views_24h = Some(10);
        store.upsert_page(&page).await.unwrap();
        store
            .increment_bucket("p1", now().date_naive(), &[(3, 14)], now())
            .await
            .unwrap();

        let reader = reader(&store);
        reader.get_last_24_hours_at("p1", now()).await;
        // |10 - 14| <= 5，不写回
        assert_eq!(store.page_snapshot("p1").unwrap().views_24h, Some(10));

        store
            .increment_bucket("p1", now().date_naive(), &[(4, 2)], now())
            .await
            .unwrap();
        reader.get_last_24_hours_at("p1", now()).await;
        assert_eq!(store.page_snapshot("p1").unwrap().views_24h, Some(16));
    }

    #[tokio::test]
    async fn test_daily_totals_oldest_first() {
        let store = Arc::new(MemoryStore::new());
        let today = now().date_naive();
        let two_days_ago = today.checked_sub_days(Days::new(2)).unwrap();
        store
            .increment_bucket("p1", today, &[(1, 3)], now())
            .await
            .unwrap();
        store
            .increment_bucket("p1", two_days_ago, &[(1, 7)], now())
            .await
            .unwrap();

        let totals = reader(&store).daily_totals_at("p1", 3, now()).await;
        let views: Vec<u64> = totals.iter().map(|d| d.views).collect();
        assert_eq!(views, vec![7, 0, 3]);
        assert_eq!(totals[2].date, "2026-10-16");
        assert_eq!(totals[0].date, "2026-10-14");
    }
}
