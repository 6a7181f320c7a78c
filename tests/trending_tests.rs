//! TrendingRanker tests
//!
//! 覆盖 limit 上限、私有页面过滤、幂等性、补齐与降级路径。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike, Utc};
use wewrite_views::analytics::trending::{MISSING_USERNAME, UNTITLED};
use wewrite_views::analytics::{TrendingRanker, ViewsSettings};
use wewrite_views::storage::{FaultPlan, MemoryStore, Page, UserProfile, ViewStore};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
}

fn uncached_settings() -> ViewsSettings {
    let mut settings = ViewsSettings::default();
    settings.trending_cache_ttl = Duration::ZERO;
    settings
}

fn ranker(store: &Arc<MemoryStore>) -> TrendingRanker {
    TrendingRanker::new(Arc::clone(store) as Arc<dyn ViewStore>, &uncached_settings())
}

/// 写入页面与今天 `hour` 点的浏览数，views24h 与实际窗口一致
async fn seed_page(store: &MemoryStore, id: &str, views_today: u64, lifetime: u64) {
    let mut page = Page::new(id, "u1").with_title(format!("Page {}", id));
    page.views = lifetime;
    page.views_24h = Some(views_today);
    store.upsert_page(&page).await.unwrap();
    if views_today > 0 {
        store
            .increment_bucket(id, now().date_naive(), &[(9, views_today)], now())
            .await
            .unwrap();
    }
}

async fn seed_user(store: &MemoryStore) {
    store
        .upsert_user(&UserProfile::new("u1", "writer"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_never_exceeds_limit() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    for i in 0..15u64 {
        seed_page(&store, &format!("p{:02}", i), i + 1, 0).await;
    }

    let ranker = ranker(&store);
    for limit in [1, 5, 10] {
        let trending = ranker.get_trending_at(limit, now()).await;
        assert_eq!(trending.len(), limit);
    }
    let top = ranker.get_trending_at(3, now()).await;
    let ids: Vec<_> = top.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p14", "p13", "p12"]);
    assert_eq!(top[0].views_24h, 15);
    assert_eq!(top[0].username, "writer");
    assert_eq!(top[0].hourly_views.iter().sum::<u64>(), 15);
}

#[tokio::test]
async fn test_private_and_deleted_pages_are_omitted() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "public", 2, 0).await;
    seed_page(&store, "hidden", 50, 0).await;
    seed_page(&store, "gone", 40, 0).await;

    let hidden = store.page_snapshot("hidden").unwrap().private();
    store.upsert_page(&hidden).await.unwrap();
    let mut gone = store.page_snapshot("gone").unwrap();
    gone.deleted = true;
    store.upsert_page(&gone).await.unwrap();

    let trending = ranker(&store).get_trending_at(10, now()).await;
    let ids: Vec<_> = trending.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["public"]);
}

#[tokio::test]
async fn test_repeated_calls_are_stable() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "a", 5, 10).await;
    seed_page(&store, "b", 5, 30).await;
    seed_page(&store, "c", 1, 0).await;
    seed_page(&store, "d", 0, 900).await;
    seed_page(&store, "e", 0, 100).await;

    let ranker = ranker(&store);
    let first = ranker.get_trending_at(4, now()).await;
    let second = ranker.get_trending_at(4, now()).await;
    assert_eq!(first, second);

    let ids: Vec<_> = first.iter().map(|p| p.id.as_str()).collect();
    // 同为 5 次时累计浏览数高的在前；补齐页面按累计浏览数排序
    assert_eq!(ids, vec!["b", "a", "c", "d"]);
}

#[tokio::test]
async fn test_sparse_day_backfills_from_pages() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "hot", 3, 0).await;

    let mut cached = Page::new("cached", "u1");
    cached.views_24h = Some(2);
    cached.views = 7;
    store.upsert_page(&cached).await.unwrap();
    let mut old = Page::new("old", "u1");
    old.views = 1_000;
    store.upsert_page(&old).await.unwrap();

    let trending = ranker(&store).get_trending_at(3, now()).await;
    let ids: Vec<_> = trending.iter().map(|p| p.id.as_str()).collect();
    // old 没有 views24h，按累计浏览数 1000 排序
    assert_eq!(ids, vec!["old", "hot", "cached"]);
    assert_eq!(trending[0].views_24h, 0);
    assert_eq!(trending[0].views, 1_000);
    assert_eq!(trending[2].title, UNTITLED);
    assert_eq!(trending[2].views_24h, 2);
}

#[tokio::test]
async fn test_backfilled_page_without_trailing_ranks_by_lifetime() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "a", 1, 0).await;
    let mut b = Page::new("b", "u1");
    b.views = 1_000;
    store.upsert_page(&b).await.unwrap();

    let trending = ranker(&store).get_trending_at(2, now()).await;
    let ranked: Vec<_> = trending
        .iter()
        .map(|p| (p.id.as_str(), p.views_24h, p.views))
        .collect();
    assert_eq!(ranked, vec![("b", 0, 1_000), ("a", 1, 0)]);
}

#[tokio::test]
async fn test_bucket_query_failure_falls_back_to_lifetime() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "a", 5, 10).await;
    seed_page(&store, "b", 1, 300).await;
    FaultPlan::set(&store.faults().fail_bucket_queries, true);

    let trending = ranker(&store).get_trending_at(5, now()).await;
    let ids: Vec<_> = trending.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert!(trending.iter().all(|p| p.hourly_views == [0; 24]));
    assert_eq!(trending[0].username, "writer");
}

#[tokio::test]
async fn test_total_failure_returns_empty() {
    let store = Arc::new(MemoryStore::new());
    seed_page(&store, "a", 5, 10).await;
    FaultPlan::set(&store.faults().fail_bucket_queries, true);
    FaultPlan::set(&store.faults().fail_page_queries, true);

    assert!(ranker(&store).get_trending_at(5, now()).await.is_empty());
}

#[tokio::test]
async fn test_username_failure_uses_sentinel() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "a", 5, 10).await;
    FaultPlan::set(&store.faults().fail_user_reads, true);

    let trending = ranker(&store).get_trending_at(5, now()).await;
    assert_eq!(trending.len(), 1);
    assert_eq!(trending[0].username, MISSING_USERNAME);
}

#[tokio::test]
async fn test_histogram_failure_degrades_to_flat() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "a", 5, 10).await;
    FaultPlan::set(&store.faults().fail_bucket_reads, true);

    let trending = ranker(&store).get_trending_at(5, now()).await;
    assert_eq!(trending.len(), 1);
    assert_eq!(trending[0].views_24h, 5);
    assert_eq!(trending[0].hourly_views, [0; 24]);
}

#[tokio::test]
async fn test_results_are_cached_per_limit() {
    let store = Arc::new(MemoryStore::new());
    let current = Utc::now();
    let hour = current.hour() as u8;
    store.upsert_page(&Page::new("a", "u1")).await.unwrap();
    store.upsert_page(&Page::new("b", "u1")).await.unwrap();
    store
        .increment_bucket("a", current.date_naive(), &[(hour, 2)], current)
        .await
        .unwrap();

    let mut settings = ViewsSettings::default();
    settings.trending_cache_ttl = Duration::from_secs(300);
    let ranker = TrendingRanker::new(Arc::clone(&store) as Arc<dyn ViewStore>, &settings);

    let first = ranker.get_trending(1).await;
    assert_eq!(first[0].id, "a");

    store
        .increment_bucket("b", current.date_naive(), &[(hour, 9)], current)
        .await
        .unwrap();
    assert_eq!(ranker.get_trending(1).await, first);

    ranker.invalidate_cache();
    assert_eq!(ranker.get_trending(1).await[0].id, "b");
}

#[tokio::test]
async fn test_trending_json_shape() {
    let store = Arc::new(MemoryStore::new());
    seed_user(&store).await;
    seed_page(&store, "a", 5, 10).await;

    let trending = ranker(&store).get_trending_at(1, now()).await;
    let json = serde_json::to_value(&trending[0]).unwrap();
    assert_eq!(json["id"], "a");
    assert_eq!(json["userId"], "u1");
    assert_eq!(json["views24h"], 5);
    assert_eq!(json["hourlyViews"].as_array().unwrap().len(), 24);
}
