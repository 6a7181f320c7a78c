//! 数据库操作重试与错误分类
//!
//! 可重试错误（连接、死锁、SQLite BUSY）使用指数退避重试；
//! 最终失败时把 `DbErr` 归类为浏览统计使用的错误类型。

use sea_orm::DbErr;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::errors::ViewsError;

/// 从数据库错误中提取驱动错误码
fn db_error_code(err: &DbErr) -> Option<String> {
    use sea_orm::error::RuntimeErr;

    let runtime_err = match err {
        DbErr::Conn(e) | DbErr::Exec(e) | DbErr::Query(e) => e,
        _ => return None,
    };
    match runtime_err {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            sqlx_err
                .deref()
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .map(|code| code.to_string())
        }
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// 判断数据库错误是否可重试
pub fn is_retryable_error(err: &DbErr) -> bool {
    if matches!(err, DbErr::ConnectionAcquire(_) | DbErr::Conn(_)) {
        return true;
    }
    // MySQL 死锁/锁超时，PostgreSQL 序列化失败/死锁，SQLite BUSY/LOCKED（含扩展码）
    if let Some(code) = db_error_code(err)
        && matches!(
            code.as_str(),
            "1213" | "1205" | "40001" | "40P01" | "5" | "6" | "261" | "517"
        )
    {
        return true;
    }
    match err {
        DbErr::Exec(e) | DbErr::Query(e) => is_retryable_error_message(&e.to_string()),
        _ => false,
    }
}

/// 通过错误消息判断是否可重试（回退方案）
fn is_retryable_error_message(err_str: &str) -> bool {
    let err_str = err_str.to_lowercase();
    err_str.contains("deadlock")
        || err_str.contains("lock wait timeout")
        || err_str.contains("database is locked")
        || err_str.contains("serialization failure")
}

/// 把数据库错误归类为存储层错误
///
/// - 权限不足（PostgreSQL 42501，MySQL 1142/1044）→ PermissionDenied
/// - 类型/JSON 解析失败 → MalformedDocument
/// - 其它 → StoreUnavailable
pub fn classify_db_error(operation: &str, err: DbErr) -> ViewsError {
    if let Some(code) = db_error_code(&err)
        && matches!(code.as_str(), "42501" | "1142" | "1044")
    {
        return ViewsError::permission_denied(format!("{}: {}", operation, err));
    }
    match err {
        DbErr::Type(_) | DbErr::Json(_) | DbErr::TryIntoErr { .. } => {
            ViewsError::malformed_document(format!("{}: {}", operation, err))
        }
        other => ViewsError::store_unavailable(format!("{}: {}", operation, other)),
    }
}

/// 重试配置
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl From<&DatabaseConfig> for RetryConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

/// 指数退避重试执行器
///
/// 对可重试错误自动进行重试，使用指数退避 + 随机抖动避免惊群效应
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "Operation '{}' succeeded after {} retries",
                        operation_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(e) if is_retryable_error(&e) && attempt < config.max_retries => {
                attempt += 1;
                let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}; retrying in {} ms",
                    operation_name,
                    attempt,
                    config.max_retries + 1,
                    e,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 计算指数退避延迟（带 0-25% 抖动）
fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    use rand::RngExt;
    let exp_delay = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = exp_delay.min(max_ms);
    let jitter = rand::rng().random_range(0..=capped / 4);
    capped.saturating_add(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable_error(&DbErr::ConnectionAcquire(
            sea_orm::error::ConnAcquireErr::Timeout
        )));
        assert!(is_retryable_error(&DbErr::Query(
            sea_orm::error::RuntimeErr::Internal("database is locked".to_string())
        )));
        assert!(!is_retryable_error(&DbErr::RecordNotFound(
            "pages/p1".to_string()
        )));
    }

    #[test]
    fn test_classify_db_error() {
        let err = classify_db_error("get_bucket", DbErr::Type("bad hour".to_string()));
        assert_eq!(err.code(), "E003");

        let err = classify_db_error(
            "get_bucket",
            DbErr::Conn(sea_orm::error::RuntimeErr::Internal("offline".to_string())),
        );
        assert_eq!(err.code(), "E001");
        assert!(err.message().starts_with("get_bucket"));
    }

    #[test]
    fn test_from_database_config() {
        let db = DatabaseConfig {
            retry_count: 7,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 20,
            ..Default::default()
        };
        let config = RetryConfig::from(&db);
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.max_delay_ms, 20);
    }

    #[test]
    fn test_calculate_backoff_capped_at_max() {
        let delay1 = calculate_backoff(1, 100, 2000);
        assert!((100..=125).contains(&delay1));
        let delay = calculate_backoff(10, 100, 2000);
        assert!((2000..=2500).contains(&delay));
    }

    #[tokio::test]
    async fn test_with_retry_success_after_retries() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        };
        let call_count = AtomicU32::new(0);

        let result = with_retry("increment_bucket", config, || {
            let count = call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(DbErr::ConnectionAcquire(
                        sea_orm::error::ConnAcquireErr::Timeout,
                    ))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_error_no_retry() {
        let call_count = AtomicU32::new(0);

        let result = with_retry("get_page", RetryConfig::default(), || {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(DbErr::RecordNotFound("pages/p1".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
