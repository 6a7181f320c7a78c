use serde::{Deserialize, Serialize};

/// 累计浏览数的默认采样率：批量刷盘时只有约 10% 的批次会更新 pages.views
pub const DEFAULT_LIFETIME_SAMPLE_RATE: f64 = 0.1;

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 服务器地址、端口
/// - database: 数据库连接配置
/// - logging: 日志配置
/// - views: 浏览统计与热门排行配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub views: ViewsConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：WW，分隔符：__
    /// 示例：WW__SERVER__PORT=9999
    pub fn load(path: Option<&str>) -> Self {
        use config::{Config, Environment, File};

        let path = path.unwrap_or("config.toml");

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖，前缀 WW，分隔符 __
            .add_source(
                Environment::with_prefix("WW")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("views.non_production_hosts")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 浏览统计配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewsConfig {
    /// 是否通过批量缓冲区写入（false 时每次浏览立即写库）
    #[serde(default = "default_batching_enabled")]
    pub batching_enabled: bool,
    /// 定时刷盘间隔（秒）
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// 缓冲区待写条目达到该值时立即刷盘
    #[serde(default = "default_max_pending_before_flush")]
    pub max_pending_before_flush: usize,
    /// 批量刷盘时更新累计浏览数的概率，取值 [0, 1]
    #[serde(default = "default_lifetime_sample_rate")]
    pub lifetime_sample_rate: f64,
    /// views24h 缓存与实时计算值相差超过该值时回写
    #[serde(default = "default_reconcile_threshold")]
    pub reconcile_threshold: u64,
    /// 每天候选桶数量 = limit × candidate_multiplier
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// 热门结果缓存时间（秒），0 表示不缓存
    #[serde(default = "default_trending_cache_ttl_secs")]
    pub trending_cache_ttl_secs: u64,
    #[serde(default = "default_trending_limit")]
    pub default_trending_limit: usize,
    #[serde(default = "default_max_trending_limit")]
    pub max_trending_limit: usize,
    /// 非生产环境主机（支持 `*.suffix` 通配）
    #[serde(default = "default_non_production_hosts")]
    pub non_production_hosts: Vec<String>,
    /// 是否仍然记录来自非生产环境的浏览（本地调试用）
    #[serde(default)]
    pub record_non_production: bool,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "pageviews.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_batching_enabled() -> bool {
    true
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_max_pending_before_flush() -> usize {
    10
}

fn default_lifetime_sample_rate() -> f64 {
    DEFAULT_LIFETIME_SAMPLE_RATE
}

fn default_reconcile_threshold() -> u64 {
    5
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_trending_cache_ttl_secs() -> u64 {
    60
}

fn default_trending_limit() -> usize {
    10
}

fn default_max_trending_limit() -> usize {
    100
}

fn default_non_production_hosts() -> Vec<String> {
    vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "0.0.0.0".to_string(),
        "*.local".to_string(),
        "*.vercel.app".to_string(),
    ]
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            batching_enabled: default_batching_enabled(),
            flush_interval_secs: default_flush_interval_secs(),
            max_pending_before_flush: default_max_pending_before_flush(),
            lifetime_sample_rate: default_lifetime_sample_rate(),
            reconcile_threshold: default_reconcile_threshold(),
            candidate_multiplier: default_candidate_multiplier(),
            trending_cache_ttl_secs: default_trending_cache_ttl_secs(),
            default_trending_limit: default_trending_limit(),
            max_trending_limit: default_max_trending_limit(),
            non_production_hosts: default_non_production_hosts(),
            record_non_production: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_defaults() {
        let config = ViewsConfig::default();
        assert!(config.batching_enabled);
        assert_eq!(config.flush_interval_secs, 30);
        assert_eq!(config.max_pending_before_flush, 10);
        assert_eq!(config.lifetime_sample_rate, DEFAULT_LIFETIME_SAMPLE_RATE);
        assert_eq!(config.reconcile_threshold, 5);
        assert_eq!(config.candidate_multiplier, 3);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: StaticConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [views]
            lifetime_sample_rate = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.views.lifetime_sample_rate, 0.5);
        assert_eq!(config.views.max_pending_before_flush, 10);
        assert_eq!(config.database.retry_count, 3);
    }

    #[test]
    fn test_sample_config_round_trips() {
        let sample = StaticConfig::generate_sample_config();
        assert!(sample.contains("[views]"));
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.views.non_production_hosts.len(), 5);
    }
}
