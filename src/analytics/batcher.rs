//! 浏览写缓冲区
//!
//! 负责合并待写入的浏览记录并批量刷盘，支持：
//! - 高并发入队（使用 DashMap，按 (page, date, hour) 合并计数）
//! - 定时刷盘到存储后端
//! - 阈值触发刷盘
//! - 按采样率更新页面累计浏览数

use std::collections::BTreeMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use tracing::{debug, trace, warn};

use crate::storage::ViewStore;
use crate::storage::models::bucket_doc_id;

/// 等待刷盘的单次浏览
#[derive(Debug, Clone)]
pub struct PendingView {
    pub page_id: String,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub hour: u8,
    pub date: NaiveDate,
}

impl PendingView {
    pub fn new(page_id: impl Into<String>, user_id: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            page_id: page_id.into(),
            user_id,
            timestamp: at,
            hour: at.hour() as u8,
            date: at.date_naive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    page_id: Arc<str>,
    date: NaiveDate,
    hour: u8,
}

/// 单次刷盘的结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// 成功写入的浏览数
    pub views: u64,
    /// 成功写入的桶数（每个 page+date 一次写入）
    pub buckets: usize,
    /// 写入失败并被丢弃的桶数
    pub dropped_buckets: usize,
    /// 被采样并更新了累计浏览数的页面数
    pub lifetime_updates: usize,
}

/// 缓冲区状态，封装所有可变状态
struct ViewBuffer {
    data: DashMap<PendingKey, u64>,
    /// 缓冲区中的总浏览数（用于阈值判断）
    total_views: AtomicUsize,
    /// 刷盘锁，防止并发刷盘
    flush_lock: Mutex<()>,
    /// 是否有 flush 任务待处理（防止重复 spawn）
    flush_pending: AtomicBool,
    /// 停止后台定时刷盘
    stopped: AtomicBool,
}

impl ViewBuffer {
    fn new() -> Self {
        Self {
            data: DashMap::new(),
            total_views: AtomicUsize::new(0),
            flush_lock: Mutex::new(()),
            flush_pending: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    fn push(&self, key: PendingKey) -> usize {
        *self.data.entry(key).or_insert(0) += 1;
        self.total_views.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 收集所有待写入计数并清空缓冲区（逐个 remove，不影响窗口期新增）
    fn drain(&self) -> Vec<(PendingKey, u64)> {
        let keys: Vec<PendingKey> = self.data.iter().map(|r| r.key().clone()).collect();

        let mut updates = Vec::with_capacity(keys.len());
        let mut total_removed = 0usize;
        for key in keys {
            if let Some((k, v)) = self.data.remove(&key) {
                total_removed += v as usize;
                updates.push((k, v));
            }
        }

        if total_removed > 0 {
            self.total_views
                .fetch_update(Ordering::Release, Ordering::Relaxed, |current| {
                    Some(current.saturating_sub(total_removed))
                })
                .ok();
        }

        updates
    }

    fn total(&self) -> usize {
        self.total_views.load(Ordering::Relaxed)
    }
}

/// 浏览批量写入器
///
/// 同一页面同一天的所有小时合并为一次 `increment_bucket` 写入；
/// 页面累计浏览数只在以 `lifetime_sample_rate` 概率抽中时更新。
#[derive(Clone)]
pub struct ViewBatcher {
    buffer: Arc<ViewBuffer>,
    store: Arc<dyn ViewStore>,
    flush_interval: Duration,
    max_pending_before_flush: usize,
    lifetime_sample_rate: f64,
}

impl ViewBatcher {
    pub fn new(
        store: Arc<dyn ViewStore>,
        flush_interval: Duration,
        max_pending_before_flush: usize,
        lifetime_sample_rate: f64,
    ) -> Self {
        Self {
            buffer: Arc::new(ViewBuffer::new()),
            store,
            flush_interval,
            max_pending_before_flush,
            lifetime_sample_rate: lifetime_sample_rate.clamp(0.0, 1.0),
        }
    }

    /// 加入一次浏览（无锁）
    pub fn push(&self, view: PendingView) {
        let key = PendingKey {
            page_id: Arc::from(view.page_id.as_str()),
            date: view.date,
            hour: view.hour,
        };
        let current_size = self.buffer.push(key);
        trace!(
            "ViewBatcher: queued view for {} at hour {}, pending: {}",
            view.page_id, view.hour, current_size
        );

        if current_size >= self.max_pending_before_flush
            && self
                .buffer
                .flush_pending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
        {
            let batcher = self.clone();
            tokio::spawn(async move {
                if let Ok(_guard) = batcher.buffer.flush_lock.try_lock() {
                    batcher.flush_buffer().await;
                } else {
                    trace!("ViewBatcher: flush already in progress, skipping");
                }
                batcher.buffer.flush_pending.store(false, Ordering::Release);
            });
        }
    }

    /// 启动后台刷盘任务，`stop()` 之后在下一个周期退出
    pub async fn start_background_task(&self) {
        loop {
            sleep(self.flush_interval).await;
            if self.buffer.stopped.load(Ordering::Acquire) {
                debug!("ViewBatcher: background task stopped");
                break;
            }

            if let Ok(_guard) = self.buffer.flush_lock.try_lock() {
                trace!("ViewBatcher: Starting scheduled flush");
                self.flush_buffer().await;
            } else {
                trace!("ViewBatcher: flush already in progress, skipping scheduled flush");
            }
        }
    }

    /// 停止后台定时刷盘（不影响手动 flush）
    pub fn stop(&self) {
        self.buffer.stopped.store(true, Ordering::Release);
    }

    /// 手动触发刷盘（等待正在进行的刷盘完成）
    pub async fn flush(&self) -> FlushStats {
        debug!("ViewBatcher: Manual flush triggered");
        let _guard = self.buffer.flush_lock.lock().await;
        self.flush_buffer().await
    }

    async fn flush_buffer(&self) -> FlushStats {
        let updates = self.buffer.drain();
        let mut stats = FlushStats::default();
        if updates.is_empty() {
            trace!("ViewBatcher: No views to flush");
            return stats;
        }

        // (page, date) -> [(hour, count)]
        let mut grouped: BTreeMap<(Arc<str>, NaiveDate), Vec<(u8, u64)>> = BTreeMap::new();
        for (key, count) in updates {
            grouped
                .entry((key.page_id, key.date))
                .or_default()
                .push((key.hour, count));
        }

        let at = Utc::now();
        let mut per_page: BTreeMap<Arc<str>, u64> = BTreeMap::new();
        for ((page_id, date), mut hours) in grouped {
            hours.sort_unstable();
            let count: u64 = hours.iter().map(|(_, c)| c).sum();
            match self.store.increment_bucket(&page_id, date, &hours, at).await {
                Ok(()) => {
                    stats.views += count;
                    stats.buckets += 1;
                    *per_page.entry(page_id).or_insert(0) += count;
                }
                Err(e) => {
                    stats.dropped_buckets += 1;
                    warn!(
                        "ViewBatcher: increment_bucket failed for {}: {}, {} views dropped",
                        bucket_doc_id(&page_id, date),
                        e,
                        count
                    );
                }
            }
        }

        for (page_id, count) in per_page {
            if !self.sample_lifetime() {
                continue;
            }
            match self.store.increment_page_views(&page_id, count).await {
                Ok(()) => stats.lifetime_updates += 1,
                Err(e) => warn!(
                    "ViewBatcher: increment_page_views failed for {}: {}",
                    page_id, e
                ),
            }
        }

        debug!(
            "ViewBatcher: flushed {} views into {} buckets ({} dropped, {} lifetime updates)",
            stats.views, stats.buckets, stats.dropped_buckets, stats.lifetime_updates
        );
        stats
    }

    fn sample_lifetime(&self) -> bool {
        self.lifetime_sample_rate > 0.0 && rand::random::<f64>() < self.lifetime_sample_rate
    }

    /// 当前缓冲区中的浏览数（用于监控）
    pub fn pending(&self) -> usize {
        self.buffer.total()
    }
}
