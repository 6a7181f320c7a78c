use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info};

use crate::analytics::ViewRecorder;

/// 关闭时刷盘的超时时间（秒）
const DRAIN_TIMEOUT_SECS: u64 = 10;

/// 停止接收浏览并刷出缓冲区
pub async fn drain_recorder(recorder: &ViewRecorder) {
    let pending = recorder.pending_views();
    info!("Shutdown: flushing {} pending views", pending);

    match timeout(Duration::from_secs(DRAIN_TIMEOUT_SECS), recorder.dispose()).await {
        Ok(stats) => info!(
            "ViewRecorder disposed: {} views flushed, {} buckets dropped",
            stats.views, stats.dropped_buckets
        ),
        Err(_) => error!(
            "ViewRecorder flush timed out after {} seconds, {} views may be lost",
            DRAIN_TIMEOUT_SECS,
            recorder.pending_views()
        ),
    }
}
