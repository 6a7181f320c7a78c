//! 热门页面排行
//!
//! 1. 取今天、昨天各自浏览数最高的 `candidate_multiplier × limit` 个桶
//! 2. 按当前小时计算每个桶对最近 24 小时的贡献，按页面合并
//! 3. 候选不足时用公开页面的 views24h 排序补齐
//! 4. 并发补充标题、用户名与小时分布，剔除已转为私有或已删除的页面
//!
//! 查询桶失败时退化为按累计浏览数排序的公开页面。

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use moka::future::Cache;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use super::recorder::ViewsSettings;
use super::window::RollingWindowReader;
use super::{trailing_contribution, window_anchor};
use crate::errors::{Result, ViewsError};
use crate::storage::ViewStore;
use crate::storage::models::{HOURS_PER_DAY, Page, PageOrder};

/// 页面没有标题时显示的标题
pub const UNTITLED: &str = "Untitled";
/// 用户名缺失或读取失败时显示的用户名
pub const MISSING_USERNAME: &str = "Missing username";

const TRENDING_CACHE_MAX_CAPACITY: u64 = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingPage {
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub username: String,
    /// 累计浏览数
    pub views: u64,
    /// 最近 24 小时浏览数
    pub views_24h: u64,
    pub hourly_views: [u64; HOURS_PER_DAY],
}

#[derive(Debug)]
struct Candidate {
    id: String,
    /// 最近 24 小时浏览数；补齐的页面取其缓存的 views24h
    trailing: Option<u64>,
    /// 补齐查询已经读到的页面
    page: Option<Page>,
}

pub struct TrendingRanker {
    store: Arc<dyn ViewStore>,
    windows: RollingWindowReader,
    candidate_multiplier: usize,
    max_limit: usize,
    /// limit -> 排行结果；TTL 为 0 时不缓存
    cache: Option<Cache<usize, Arc<Vec<TrendingPage>>>>,
}

impl TrendingRanker {
    pub fn new(store: Arc<dyn ViewStore>, settings: &ViewsSettings) -> Self {
        let cache = (!settings.trending_cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .time_to_live(settings.trending_cache_ttl)
                .max_capacity(TRENDING_CACHE_MAX_CAPACITY)
                .build()
        });
        Self {
            windows: RollingWindowReader::new(Arc::clone(&store), settings),
            store,
            candidate_multiplier: settings.candidate_multiplier.max(1),
            max_limit: settings.max_trending_limit.max(1),
            cache,
        }
    }

    pub fn from_config(store: Arc<dyn ViewStore>) -> Self {
        Self::new(store, &ViewsSettings::from_config())
    }

    /// 获取热门页面（结果按 limit 缓存）
    ///
    /// 不会失败：桶查询失败时退化为累计浏览数排行，再失败时返回空列表。
    pub async fn get_trending(&self, limit: usize) -> Vec<TrendingPage> {
        let limit = limit.min(self.max_limit);
        if limit == 0 {
            return Vec::new();
        }

        match &self.cache {
            Some(cache) => {
                let ranked = cache
                    .get_with(limit, async {
                        trace!("TrendingRanker: cache miss for limit {}", limit);
                        Arc::new(self.rank(limit, Utc::now()).await)
                    })
                    .await;
                ranked.as_ref().clone()
            }
            None => self.rank(limit, Utc::now()).await,
        }
    }

    /// 以 `now` 为当前时间计算排行（不经过缓存）
    pub async fn get_trending_at(&self, limit: usize, now: DateTime<Utc>) -> Vec<TrendingPage> {
        let limit = limit.min(self.max_limit);
        if limit == 0 {
            return Vec::new();
        }
        self.rank(limit, now).await
    }

    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    async fn rank(&self, limit: usize, now: DateTime<Utc>) -> Vec<TrendingPage> {
        let (today, yesterday, current_hour) = window_anchor(now);

        let mut candidates = match self
            .bucket_candidates(today, yesterday, current_hour, limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(
                    "TrendingRanker: bucket query failed, falling back to lifetime views: {}",
                    e
                );
                return self.lifetime_fallback(limit).await;
            }
        };

        if candidates.len() < limit {
            self.backfill(&mut candidates, limit).await;
        }

        let mut scored: Vec<(u64, TrendingPage)> = join_all(
            candidates
                .into_iter()
                .map(|candidate| self.enrich(candidate, now)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        // 没有最近 24 小时数据的页面按累计浏览数参与排序
        scored.sort_by(|(score_a, a), (score_b, b)| {
            (Reverse(*score_a), Reverse(a.views), &a.id).cmp(&(
                Reverse(*score_b),
                Reverse(b.views),
                &b.id,
            ))
        });
        let mut ranked: Vec<TrendingPage> = scored.into_iter().map(|(_, page)| page).collect();
        ranked.truncate(limit);
        debug!(
            "TrendingRanker: ranked {} pages for limit {}",
            ranked.len(),
            limit
        );
        ranked
    }

    /// 合并今天与昨天的候选桶，返回最近 24 小时浏览数最高的 `limit` 个页面
    async fn bucket_candidates(
        &self,
        today: NaiveDate,
        yesterday: NaiveDate,
        current_hour: u8,
        limit: usize,
    ) -> Result<Vec<Candidate>> {
        let per_day = limit.saturating_mul(self.candidate_multiplier);
        let (today_buckets, yesterday_buckets) = tokio::join!(
            self.store.top_buckets_for_date(today, per_day),
            self.store.top_buckets_for_date(yesterday, per_day)
        );
        let today_buckets = today_buckets?;
        let yesterday_buckets = yesterday_buckets?;

        let mut totals: HashMap<String, u64> = HashMap::new();
        for bucket in &today_buckets {
            *totals.entry(bucket.page_id.clone()).or_insert(0) +=
                trailing_contribution(bucket, true, current_hour);
        }
        for bucket in &yesterday_buckets {
            *totals.entry(bucket.page_id.clone()).or_insert(0) +=
                trailing_contribution(bucket, false, current_hour);
        }

        let mut ranked: Vec<(String, u64)> =
            totals.into_iter().filter(|(_, views)| *views > 0).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);

        trace!(
            "TrendingRanker: {} candidates from {} + {} buckets",
            ranked.len(),
            today_buckets.len(),
            yesterday_buckets.len()
        );
        Ok(ranked
            .into_iter()
            .map(|(id, views)| Candidate {
                id,
                trailing: Some(views),
                page: None,
            })
            .collect())
    }

    /// 候选不足时按 views24h 补齐，失败只记录日志
    async fn backfill(&self, candidates: &mut Vec<Candidate>, limit: usize) {
        let wanted = limit + candidates.len();
        let pages = match self.store.top_public_pages(PageOrder::Views24h, wanted).await {
            Ok(pages) => pages,
            Err(e) => {
                warn!("TrendingRanker: backfill query failed: {}", e);
                return;
            }
        };

        let mut selected: HashSet<String> = candidates.iter().map(|c| c.id.clone()).collect();
        for page in pages {
            if candidates.len() >= limit {
                break;
            }
            if !selected.insert(page.id.clone()) {
                continue;
            }
            candidates.push(Candidate {
                id: page.id.clone(),
                trailing: page.views_24h,
                page: Some(page),
            });
        }
    }

    /// 补充标题、用户名与小时分布，同时返回排序分值
    ///
    /// 分值为最近 24 小时浏览数，缺失时取累计浏览数。页面缺失、不可见或读取失败时返回 None。
    async fn enrich(
        &self,
        candidate: Candidate,
        now: DateTime<Utc>,
    ) -> Option<(u64, TrendingPage)> {
        let page = match candidate.page {
            Some(page) => page,
            None => match self.store.get_page(&candidate.id).await {
                Ok(Some(page)) => page,
                Ok(None) => {
                    debug!("TrendingRanker: page {} no longer exists", candidate.id);
                    return None;
                }
                Err(e) => {
                    log_page_failure(&candidate.id, &e);
                    return None;
                }
            },
        };
        if !page.is_visible() {
            trace!("TrendingRanker: page {} is not public, omitted", page.id);
            return None;
        }

        let (username, window) = tokio::join!(
            self.username(&page.user_id),
            self.windows.get_last_24_hours_at(&page.id, now)
        );

        let score = candidate.trailing.unwrap_or(page.views);
        Some((
            score,
            TrendingPage {
                title: display_title(&page),
                username,
                views_24h: candidate.trailing.unwrap_or(0),
                hourly_views: window.hourly,
                views: page.views,
                user_id: page.user_id,
                id: page.id,
            },
        ))
    }

    async fn username(&self, user_id: &str) -> String {
        match self.store.get_user(user_id).await {
            Ok(user) => user
                .and_then(|u| u.username)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| MISSING_USERNAME.to_string()),
            Err(e) => {
                debug!("TrendingRanker: username lookup for {} failed: {}", user_id, e);
                MISSING_USERNAME.to_string()
            }
        }
    }

    /// 累计浏览数排行，小时分布为全零
    async fn lifetime_fallback(&self, limit: usize) -> Vec<TrendingPage> {
        let pages = match self.store.top_public_pages(PageOrder::Lifetime, limit).await {
            Ok(pages) => pages,
            Err(e) => {
                error!("TrendingRanker: fallback query failed: {}", e);
                return Vec::new();
            }
        };

        let usernames = join_all(pages.iter().map(|p| self.username(&p.user_id))).await;
        pages
            .into_iter()
            .zip(usernames)
            .map(|(page, username)| TrendingPage {
                title: display_title(&page),
                username,
                views_24h: page.views_24h.unwrap_or(0),
                hourly_views: [0; HOURS_PER_DAY],
                views: page.views,
                user_id: page.user_id,
                id: page.id,
            })
            .collect()
    }
}

fn display_title(page: &Page) -> String {
    page.title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string()
}

fn log_page_failure(page_id: &str, err: &ViewsError) {
    if err.is_permission_denied() {
        debug!("TrendingRanker: page {} is not readable: {}", page_id, err);
    } else {
        warn!("TrendingRanker: reading page {} failed: {}", page_id, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, UserProfile};
    use chrono::TimeZone;
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 10, 0, 0).unwrap()
    }

    fn ranker(store: &Arc<MemoryStore>) -> TrendingRanker {
        let mut settings = ViewsSettings::default();
        settings.trending_cache_ttl = Duration::ZERO;
        TrendingRanker::new(Arc::clone(store) as Arc<dyn ViewStore>, &settings)
    }

    #[tokio::test]
    async fn test_merges_today_and_yesterday() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_page(&Page::new("a", "u1")).await.unwrap();
        store.upsert_page(&Page::new("b", "u1").with_title("B")).await.unwrap();
        store.upsert_user(&UserProfile::new("u1", "alice")).await.unwrap();

        let today = now().date_naive();
        let yesterday = today.pred_opt().unwrap();
        // a: 昨天 11 点 4 次 + 今天 2 次；b: 今天 5 次；昨天 9 点不在窗口内
        store.increment_bucket("a", yesterday, &[(11, 4), (9, 50)], now()).await.unwrap();
        store.increment_bucket("a", today, &[(1, 2)], now()).await.unwrap();
        store.increment_bucket("b", today, &[(10, 5)], now()).await.unwrap();

        let trending = ranker(&store).get_trending_at(10, now()).await;
        let ids: Vec<_> = trending.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(trending[0].views_24h, 6);
        assert_eq!(trending[0].title, UNTITLED);
        assert_eq!(trending[0].username, "alice");
        assert_eq!(trending[1].title, "B");
        assert_eq!(trending[1].hourly_views[23], 5);
    }

    #[tokio::test]
    async fn test_missing_user_gets_sentinel() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_page(&Page::new("a", "ghost")).await.unwrap();
        store
            .increment_bucket("a", now().date_naive(), &[(3, 1)], now())
            .await
            .unwrap();

        let trending = ranker(&store).get_trending_at(5, now()).await;
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].username, MISSING_USERNAME);
    }

    #[tokio::test]
    async fn test_zero_limit_is_empty() {
        let store = Arc::new(MemoryStore::new());
        assert!(ranker(&store).get_trending(0).await.is_empty());
    }
}
