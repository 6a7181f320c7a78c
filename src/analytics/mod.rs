//! 浏览统计
//!
//! - `session`: 进程内的 (page, viewer) 去重集合
//! - `batcher`: 按 (page, date, hour) 合并的写缓冲区
//! - `recorder`: 浏览记录入口（校验、去重、写入或入队）
//! - `window`: 最近 24 小时浏览数与小时分布
//! - `trending`: 基于最近 24 小时浏览数的热门页面排行

pub mod batcher;
pub mod recorder;
pub mod session;
pub mod trending;
pub mod window;

pub use batcher::{FlushStats, PendingView, ViewBatcher};
pub use recorder::{OriginPolicy, RecordOutcome, SkipReason, ViewRecorder, ViewsSettings};
pub use session::SessionDeduplicator;
pub use trending::{TrendingPage, TrendingRanker};
pub use window::{DailyViews, HourlyWindow, RollingWindowReader};

use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};

use crate::storage::models::{HOURS_PER_DAY, ViewBucket};

/// `now` 所在的日期、前一天和当前小时
pub fn window_anchor(now: DateTime<Utc>) -> (NaiveDate, NaiveDate, u8) {
    let today = now.date_naive();
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    (today, yesterday, now.hour() as u8)
}

/// 拼接最近 24 小时的小时分布（最早的小时在前）
///
/// 昨天 `current_hour` 之后的小时填充前面的槽位，今天 0..=current_hour
/// 填充剩余槽位，因此当前小时总在下标 23。缺失的桶按 0 计算。
pub fn splice_trailing_window(
    today: Option<&ViewBucket>,
    yesterday: Option<&ViewBucket>,
    current_hour: u8,
) -> [u64; HOURS_PER_DAY] {
    let current = (current_hour as usize).min(HOURS_PER_DAY - 1);
    let mut hourly = [0u64; HOURS_PER_DAY];
    let mut slot = 0;

    for hour in (current + 1)..HOURS_PER_DAY {
        hourly[slot] = yesterday.map_or(0, |b| b.hours[hour]);
        slot += 1;
    }
    for hour in 0..=current {
        hourly[slot] = today.map_or(0, |b| b.hours[hour]);
        slot += 1;
    }
    hourly
}

/// 单个桶对最近 24 小时窗口的贡献
///
/// `is_today` 为 true 时取 0..=current_hour，否则取 current_hour 之后的小时。
pub fn trailing_contribution(bucket: &ViewBucket, is_today: bool, current_hour: u8) -> u64 {
    let current = (current_hour as usize).min(HOURS_PER_DAY - 1);
    if is_today {
        bucket.hours[..=current].iter().sum()
    } else {
        bucket.hours[current + 1..].iter().sum()
    }
}
