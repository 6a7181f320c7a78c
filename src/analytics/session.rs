//! 进程内浏览去重
//!
//! 同一个 (page, viewer) 在一个 `ViewRecorder` 生命周期内只记录一次。
//! 多实例部署时每个实例各自维护，去重保证只在实例内成立。

use dashmap::DashSet;

/// 匿名访客使用的 viewer 标识
pub const ANONYMOUS_VIEWER: &str = "anonymous";

#[derive(Debug, Default)]
pub struct SessionDeduplicator {
    seen: DashSet<String>,
}

impl SessionDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 去重键：`{pageId}:{viewerId|anonymous}`
    pub fn key(page_id: &str, viewer_id: Option<&str>) -> String {
        format!("{}:{}", page_id, viewer_id.unwrap_or(ANONYMOUS_VIEWER))
    }

    pub fn contains(&self, page_id: &str, viewer_id: Option<&str>) -> bool {
        self.seen.contains(&Self::key(page_id, viewer_id))
    }

    /// 加入集合，返回是否为新键
    pub fn insert(&self, page_id: &str, viewer_id: Option<&str>) -> bool {
        self.seen.insert(Self::key(page_id, viewer_id))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_viewers_share_key() {
        let dedup = SessionDeduplicator::new();
        assert!(dedup.insert("p1", None));
        assert!(!dedup.insert("p1", None));
        assert!(dedup.contains("p1", None));
        assert_eq!(SessionDeduplicator::key("p1", None), "p1:anonymous");
    }

    #[test]
    fn test_keys_are_per_page_and_viewer() {
        let dedup = SessionDeduplicator::new();
        assert!(dedup.insert("p1", Some("u2")));
        assert!(dedup.insert("p2", Some("u2")));
        assert!(dedup.insert("p1", Some("u3")));
        assert!(!dedup.contains("p1", None));
        assert_eq!(dedup.len(), 3);

        dedup.clear();
        assert!(dedup.is_empty());
    }
}
