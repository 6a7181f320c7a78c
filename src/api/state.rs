use std::sync::Arc;

use crate::analytics::{RollingWindowReader, TrendingRanker, ViewRecorder, ViewsSettings};
use crate::storage::ViewStore;

/// 接口共享状态（通过 `web::Data` 注入）
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ViewStore>,
    pub recorder: Arc<ViewRecorder>,
    pub windows: Arc<RollingWindowReader>,
    pub trending: Arc<TrendingRanker>,
    pub settings: Arc<ViewsSettings>,
}

impl AppState {
    pub fn new(store: Arc<dyn ViewStore>, settings: ViewsSettings) -> Self {
        Self {
            recorder: Arc::new(ViewRecorder::new(Arc::clone(&store), &settings)),
            windows: Arc::new(RollingWindowReader::new(Arc::clone(&store), &settings)),
            trending: Arc::new(TrendingRanker::new(Arc::clone(&store), &settings)),
            settings: Arc::new(settings),
            store,
        }
    }

    /// 热门排行的 limit：缺省使用默认值，并限制在 1..=max
    pub fn trending_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.settings.default_trending_limit)
            .clamp(1, self.settings.max_trending_limit.max(1))
    }
}
