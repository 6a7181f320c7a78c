use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 每天的小时数
pub const HOURS_PER_DAY: usize = 24;

/// 日期键格式（文档 ID 与 date 字段共用）
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// 格式化日期键：YYYY-MM-DD
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// 解析日期键
pub fn parse_date_key(key: &str) -> crate::errors::Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(key, DATE_KEY_FORMAT)?)
}

/// 浏览桶文档 ID：`${pageId}_${YYYY-MM-DD}`
pub fn bucket_doc_id(page_id: &str, date: NaiveDate) -> String {
    format!("{}_{}", page_id, date_key(date))
}

/// 单个页面单日的浏览记录
///
/// `total_views == sum(hours)` 只是建议性约束，并发累加下可能短暂不一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewBucket {
    pub page_id: String,
    pub date: NaiveDate,
    #[serde(with = "hours_map")]
    pub hours: [u64; HOURS_PER_DAY],
    #[serde(default)]
    pub total_views: u64,
    pub last_updated: DateTime<Utc>,
}

impl ViewBucket {
    /// 创建 24 小时全零的空桶
    pub fn empty(page_id: impl Into<String>, date: NaiveDate, at: DateTime<Utc>) -> Self {
        Self {
            page_id: page_id.into(),
            date,
            hours: [0; HOURS_PER_DAY],
            total_views: 0,
            last_updated: at,
        }
    }

    pub fn doc_id(&self) -> String {
        bucket_doc_id(&self.page_id, self.date)
    }

    /// 累加若干小时的计数（超出 0..24 的小时被忽略）
    pub fn apply(&mut self, hours: &[(u8, u64)], at: DateTime<Utc>) {
        for &(hour, amount) in hours {
            if let Some(slot) = self.hours.get_mut(hour as usize) {
                *slot += amount;
                self.total_views += amount;
            }
        }
        self.last_updated = at;
    }

    /// 各小时计数之和
    pub fn hours_sum(&self) -> u64 {
        self.hours.iter().sum()
    }
}

/// 页面（只包含浏览统计涉及的字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default)]
    pub deleted: bool,
    /// 累计浏览数
    #[serde(default)]
    pub views: u64,
    /// 24 小时浏览数缓存，由读取时的校准写回
    #[serde(default)]
    pub views_24h: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Page {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            title: None,
            is_public: true,
            deleted: false,
            views: 0,
            views_24h: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// 公开且未删除
    pub fn is_visible(&self) -> bool {
        self.is_public && !self.deleted
    }
}

/// 用户资料（只读）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: Some(username.into()),
            display_name: None,
        }
    }
}

/// 公开页面排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOrder {
    /// 按 views24h 降序（空值排最后）
    Views24h,
    /// 按累计浏览数降序
    Lifetime,
}

/// 小时计数的文档形态：`{"0": n, ..., "23": n}`，缺失的小时视为 0
mod hours_map {
    use std::collections::HashMap;

    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::HOURS_PER_DAY;

    pub fn serialize<S: Serializer>(
        hours: &[u64; HOURS_PER_DAY],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(HOURS_PER_DAY))?;
        for (hour, count) in hours.iter().enumerate() {
            map.serialize_entry(&hour.to_string(), count)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u64; HOURS_PER_DAY], D::Error> {
        let raw: HashMap<String, u64> = HashMap::deserialize(deserializer)?;
        let mut hours = [0; HOURS_PER_DAY];
        for (key, count) in raw {
            if let Ok(hour) = key.parse::<usize>()
                && let Some(slot) = hours.get_mut(hour)
            {
                *slot = count;
            }
        }
        Ok(hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_doc_id_format() {
        assert_eq!(bucket_doc_id("p1", day()), "p1_2026-10-16");
        let bucket = ViewBucket::empty("p1", day(), Utc::now());
        assert_eq!(bucket.doc_id(), "p1_2026-10-16");
    }

    #[test]
    fn test_parse_date_key() {
        assert_eq!(parse_date_key("2026-10-16").unwrap(), day());
        assert!(parse_date_key("16/10/2026").is_err());
    }

    #[test]
    fn test_apply_keeps_total_in_sync() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 14, 0, 0).unwrap();
        let mut bucket = ViewBucket::empty("p1", day(), at);
        bucket.apply(&[(14, 2), (3, 1), (30, 9)], at);
        assert_eq!(bucket.hours[14], 2);
        assert_eq!(bucket.hours[3], 1);
        assert_eq!(bucket.total_views, 3);
        assert_eq!(bucket.hours_sum(), bucket.total_views);
    }

    #[test]
    fn test_hours_serialize_as_string_keyed_map() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 14, 0, 0).unwrap();
        let mut bucket = ViewBucket::empty("p1", day(), at);
        bucket.apply(&[(14, 1)], at);

        let json = serde_json::to_value(&bucket).unwrap();
        assert_eq!(json["pageId"], "p1");
        assert_eq!(json["date"], "2026-10-16");
        assert_eq!(json["hours"]["14"], 1);
        assert_eq!(json["hours"]["0"], 0);
        assert_eq!(json["hours"].as_object().unwrap().len(), 24);
        assert_eq!(json["totalViews"], 1);
    }

    #[test]
    fn test_missing_hours_default_to_zero() {
        let bucket: ViewBucket = serde_json::from_str(
            r#"{"pageId":"p1","date":"2026-10-16","hours":{"5":3,"bogus":1},
                "lastUpdated":"2026-10-16T05:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(bucket.hours[5], 3);
        assert_eq!(bucket.hours_sum(), 3);
        assert_eq!(bucket.total_views, 0);
    }

    #[test]
    fn test_page_visibility() {
        let page = Page::new("p1", "u1");
        assert!(page.is_visible());
        assert!(!page.clone().private().is_visible());
        let deleted = Page {
            deleted: true,
            ..page
        };
        assert!(!deleted.is_visible());
    }
}
