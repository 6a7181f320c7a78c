//! 浏览记录入口
//!
//! `record_view` 按顺序检查：页面 ID 为空、非生产来源、会话内重复、
//! 页面所有者自己浏览。全部通过后加入去重集合，并立即写入或放入批量缓冲区。
//! 调用方永远不会收到错误，失败只记录日志。

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::{Host, Url};

use super::batcher::{FlushStats, PendingView, ViewBatcher};
use super::session::SessionDeduplicator;
use crate::config::ViewsConfig;
use crate::errors::{Result, ViewsError};
use crate::storage::ViewStore;

/// 浏览统计运行参数
///
/// 由 `[views]` 配置段转换而来；组件只依赖这里的值，不直接读取全局配置。
#[derive(Debug, Clone)]
pub struct ViewsSettings {
    pub batching_enabled: bool,
    pub flush_interval: Duration,
    pub max_pending_before_flush: usize,
    pub lifetime_sample_rate: f64,
    pub reconcile_threshold: u64,
    pub candidate_multiplier: usize,
    pub trending_cache_ttl: Duration,
    pub default_trending_limit: usize,
    pub max_trending_limit: usize,
    pub non_production_hosts: Vec<String>,
    pub record_non_production: bool,
}

impl From<&ViewsConfig> for ViewsSettings {
    fn from(config: &ViewsConfig) -> Self {
        Self {
            batching_enabled: config.batching_enabled,
            flush_interval: Duration::from_secs(config.flush_interval_secs.max(1)),
            max_pending_before_flush: config.max_pending_before_flush.max(1),
            lifetime_sample_rate: config.lifetime_sample_rate.clamp(0.0, 1.0),
            reconcile_threshold: config.reconcile_threshold,
            candidate_multiplier: config.candidate_multiplier.max(1),
            trending_cache_ttl: Duration::from_secs(config.trending_cache_ttl_secs),
            default_trending_limit: config.default_trending_limit.max(1),
            max_trending_limit: config.max_trending_limit.max(1),
            non_production_hosts: config.non_production_hosts.clone(),
            record_non_production: config.record_non_production,
        }
    }
}

impl Default for ViewsSettings {
    fn default() -> Self {
        Self::from(&ViewsConfig::default())
    }
}

impl ViewsSettings {
    /// 从全局配置读取
    pub fn from_config() -> Self {
        Self::from(&crate::config::get_config().views)
    }

    /// 立即写入（关闭批量缓冲区）
    pub fn immediate(mut self) -> Self {
        self.batching_enabled = false;
        self
    }
}

/// 来源主机判定
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    patterns: Vec<String>,
    record_non_production: bool,
}

impl OriginPolicy {
    pub fn new(patterns: &[String], record_non_production: bool) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.trim().to_lowercase()).collect(),
            record_non_production,
        }
    }

    /// 来源是否计入统计；没有来源信息时视为生产环境
    pub fn is_production(&self, origin: Option<&str>) -> bool {
        if self.record_non_production {
            return true;
        }
        let Some(origin) = origin.map(str::trim).filter(|o| !o.is_empty()) else {
            return true;
        };
        match parse_host(origin) {
            Some(host) => !self.is_non_production_host(&host),
            None => {
                debug!("OriginPolicy: unparsable origin {:?}, treated as production", origin);
                true
            }
        }
    }

    fn is_non_production_host(&self, host: &Host<String>) -> bool {
        match host {
            Host::Ipv4(ip) => is_local_ip(IpAddr::V4(*ip)) || self.matches(&ip.to_string()),
            Host::Ipv6(ip) => is_local_ip(IpAddr::V6(*ip)) || self.matches(&ip.to_string()),
            Host::Domain(domain) => self.matches(domain),
        }
    }

    fn matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        self.patterns.iter().any(|pattern| match pattern.strip_prefix("*.") {
            Some(suffix) => {
                host == suffix
                    || host
                        .strip_suffix(suffix)
                        .is_some_and(|rest| rest.ends_with('.'))
            }
            None => host == *pattern,
        })
    }
}

/// 接受 `https://host:port/...` 或裸 `host:port`
fn parse_host(origin: &str) -> Option<Host<String>> {
    let url = if origin.contains("://") {
        Url::parse(origin).ok()?
    } else {
        Url::parse(&format!("http://{}", origin)).ok()?
    };
    url.host().map(|h| h.to_owned())
}

fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// 跳过记录的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyPageId,
    NonProductionOrigin,
    Duplicate,
    OwnerView,
    PageNotFound,
    Disposed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::EmptyPageId => "empty_page_id",
            SkipReason::NonProductionOrigin => "non_production_origin",
            SkipReason::Duplicate => "duplicate",
            SkipReason::OwnerView => "owner_view",
            SkipReason::PageNotFound => "page_not_found",
            SkipReason::Disposed => "disposed",
        }
    }
}

/// 单次 `record_view` 的结果，调用方可以忽略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// 已立即写入存储
    Recorded,
    /// 已放入批量缓冲区
    Queued,
    Skipped(SkipReason),
    /// 存储失败（已记录日志）
    Failed,
}

impl RecordOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Recorded => "recorded",
            RecordOutcome::Queued => "queued",
            RecordOutcome::Skipped(_) => "skipped",
            RecordOutcome::Failed => "failed",
        }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            RecordOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }

    /// 是否计入了统计（立即写入或入队）
    pub fn is_counted(&self) -> bool {
        matches!(self, RecordOutcome::Recorded | RecordOutcome::Queued)
    }
}

/// 浏览记录器
///
/// 持有会话去重集合与批量缓冲区，一个宿主上下文（进程、连接或测试）一个实例。
/// 生命周期结束时调用 `dispose()` 刷出缓冲区。
pub struct ViewRecorder {
    store: Arc<dyn ViewStore>,
    session: SessionDeduplicator,
    batcher: Option<ViewBatcher>,
    origin_policy: OriginPolicy,
    disposed: AtomicBool,
}

impl ViewRecorder {
    pub fn new(store: Arc<dyn ViewStore>, settings: &ViewsSettings) -> Self {
        let batcher = settings.batching_enabled.then(|| {
            ViewBatcher::new(
                Arc::clone(&store),
                settings.flush_interval,
                settings.max_pending_before_flush,
                settings.lifetime_sample_rate,
            )
        });
        Self {
            store,
            session: SessionDeduplicator::new(),
            batcher,
            origin_policy: OriginPolicy::new(
                &settings.non_production_hosts,
                settings.record_non_production,
            ),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn from_config(store: Arc<dyn ViewStore>) -> Self {
        Self::new(store, &ViewsSettings::from_config())
    }

    pub fn session(&self) -> &SessionDeduplicator {
        &self.session
    }

    pub fn batcher(&self) -> Option<&ViewBatcher> {
        self.batcher.as_ref()
    }

    /// 在后台运行定时刷盘；未启用批量写入时返回 None
    pub fn spawn_background_flush(&self) -> Option<JoinHandle<()>> {
        let batcher = self.batcher.clone()?;
        info!("ViewRecorder: batching enabled, starting background flush task");
        Some(tokio::spawn(async move {
            batcher.start_background_task().await;
        }))
    }

    pub async fn record_view(
        &self,
        page_id: &str,
        viewer_id: Option<&str>,
        origin: Option<&str>,
    ) -> RecordOutcome {
        self.record_view_at(page_id, viewer_id, origin, Utc::now())
            .await
    }

    pub async fn record_view_at(
        &self,
        page_id: &str,
        viewer_id: Option<&str>,
        origin: Option<&str>,
        now: DateTime<Utc>,
    ) -> RecordOutcome {
        let page_id = page_id.trim();
        let viewer_id = viewer_id.map(str::trim).filter(|v| !v.is_empty());

        if page_id.is_empty() {
            return RecordOutcome::Skipped(SkipReason::EmptyPageId);
        }
        if self.disposed.load(Ordering::Acquire) {
            return RecordOutcome::Skipped(SkipReason::Disposed);
        }
        if !self.origin_policy.is_production(origin) {
            trace!("ViewRecorder: skipping {} from non-production origin", page_id);
            return RecordOutcome::Skipped(SkipReason::NonProductionOrigin);
        }
        if self.session.contains(page_id, viewer_id) {
            trace!("ViewRecorder: duplicate view of {} in this session", page_id);
            return RecordOutcome::Skipped(SkipReason::Duplicate);
        }

        match self.check_owner(page_id, viewer_id).await {
            Ok(None) => {}
            Ok(Some(reason)) => return RecordOutcome::Skipped(reason),
            Err(e) => {
                log_failure("get_page", page_id, &e);
                return RecordOutcome::Failed;
            }
        }

        // 并发的同一 viewer 只有一个能插入成功
        if !self.session.insert(page_id, viewer_id) {
            return RecordOutcome::Skipped(SkipReason::Duplicate);
        }

        match &self.batcher {
            Some(batcher) => {
                batcher.push(PendingView::new(
                    page_id,
                    viewer_id.map(str::to_string),
                    now,
                ));
                RecordOutcome::Queued
            }
            None => match self.write_now(page_id, now).await {
                Ok(()) => RecordOutcome::Recorded,
                Err(e) => {
                    log_failure("record_view", page_id, &e);
                    RecordOutcome::Failed
                }
            },
        }
    }

    async fn check_owner(
        &self,
        page_id: &str,
        viewer_id: Option<&str>,
    ) -> Result<Option<SkipReason>> {
        let Some(page) = self.store.get_page(page_id).await? else {
            debug!("ViewRecorder: page {} not found, view ignored", page_id);
            return Ok(Some(SkipReason::PageNotFound));
        };
        if viewer_id.is_some_and(|viewer| viewer == page.user_id) {
            trace!("ViewRecorder: owner view of {} ignored", page_id);
            return Ok(Some(SkipReason::OwnerView));
        }
        Ok(None)
    }

    async fn write_now(&self, page_id: &str, now: DateTime<Utc>) -> Result<()> {
        let hour = now.hour() as u8;
        self.store
            .increment_bucket(page_id, now.date_naive(), &[(hour, 1)], now)
            .await?;
        self.store.increment_page_views(page_id, 1).await
    }

    /// 刷出批量缓冲区
    pub async fn flush(&self) -> FlushStats {
        match &self.batcher {
            Some(batcher) => batcher.flush().await,
            None => FlushStats::default(),
        }
    }

    /// 停止接收新的浏览并刷出缓冲区（可重复调用）
    pub async fn dispose(&self) -> FlushStats {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            info!("ViewRecorder: disposing, flushing pending views");
        }
        if let Some(batcher) = &self.batcher {
            batcher.stop();
        }
        self.flush().await
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// 等待刷盘的浏览数
    pub fn pending_views(&self) -> usize {
        self.batcher.as_ref().map_or(0, |b| b.pending())
    }
}

fn log_failure(operation: &str, page_id: &str, err: &ViewsError) {
    if err.is_permission_denied() {
        debug!("ViewRecorder: {} denied for {}: {}", operation, page_id, err);
    } else {
        warn!("ViewRecorder: {} failed for {}: {}", operation, page_id, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> OriginPolicy {
        OriginPolicy::new(&ViewsSettings::default().non_production_hosts, false)
    }

    #[test]
    fn test_origin_policy_defaults() {
        let policy = policy();
        assert!(policy.is_production(None));
        assert!(policy.is_production(Some("")));
        assert!(policy.is_production(Some("https://www.getwewrite.app")));
        assert!(policy.is_production(Some("getwewrite.app:443")));

        assert!(!policy.is_production(Some("http://localhost:3000")));
        assert!(!policy.is_production(Some("localhost")));
        assert!(!policy.is_production(Some("https://wewrite-git-feature.vercel.app")));
        assert!(!policy.is_production(Some("devbox.local")));
        assert!(!policy.is_production(Some("http://192.168.1.20:8080")));
        assert!(!policy.is_production(Some("http://[::1]:3000")));
    }

    #[test]
    fn test_origin_policy_wildcard_needs_label_boundary() {
        let policy = OriginPolicy::new(&["*.preview.dev".to_string()], false);
        assert!(!policy.is_production(Some("a.preview.dev")));
        assert!(!policy.is_production(Some("preview.dev")));
        assert!(policy.is_production(Some("notpreview.dev")));
    }

    #[test]
    fn test_record_non_production_overrides() {
        let policy = OriginPolicy::new(&["localhost".to_string()], true);
        assert!(policy.is_production(Some("localhost")));
    }

    #[test]
    fn test_settings_from_config_clamps() {
        let config = ViewsConfig {
            lifetime_sample_rate: 3.0,
            max_pending_before_flush: 0,
            flush_interval_secs: 0,
            ..Default::default()
        };
        let settings = ViewsSettings::from(&config);
        assert_eq!(settings.lifetime_sample_rate, 1.0);
        assert_eq!(settings.max_pending_before_flush, 1);
        assert_eq!(settings.flush_interval, Duration::from_secs(1));
        assert!(!settings.clone().immediate().batching_enabled);
    }

    #[test]
    fn test_outcome_labels() {
        let outcome = RecordOutcome::Skipped(SkipReason::OwnerView);
        assert_eq!(outcome.label(), "skipped");
        assert_eq!(outcome.skip_reason().map(|r| r.as_str()), Some("owner_view"));
        assert!(!outcome.is_counted());
        assert!(RecordOutcome::Queued.is_counted());
    }
}
