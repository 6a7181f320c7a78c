use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewsError {
    StoreUnavailable(String),
    PermissionDenied(String),
    MalformedDocument(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    FileOperation(String),
    Validation(String),
    NotFound(String),
    Serialization(String),
    DateParse(String),
}

impl ViewsError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ViewsError::StoreUnavailable(_) => "E001",
            ViewsError::PermissionDenied(_) => "E002",
            ViewsError::MalformedDocument(_) => "E003",
            ViewsError::DatabaseConfig(_) => "E004",
            ViewsError::DatabaseConnection(_) => "E005",
            ViewsError::FileOperation(_) => "E006",
            ViewsError::Validation(_) => "E007",
            ViewsError::NotFound(_) => "E008",
            ViewsError::Serialization(_) => "E009",
            ViewsError::DateParse(_) => "E010",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ViewsError::StoreUnavailable(_) => "Store Unavailable",
            ViewsError::PermissionDenied(_) => "Permission Denied",
            ViewsError::MalformedDocument(_) => "Malformed Document",
            ViewsError::DatabaseConfig(_) => "Database Configuration Error",
            ViewsError::DatabaseConnection(_) => "Database Connection Error",
            ViewsError::FileOperation(_) => "File Operation Error",
            ViewsError::Validation(_) => "Validation Error",
            ViewsError::NotFound(_) => "Resource Not Found",
            ViewsError::Serialization(_) => "Serialization Error",
            ViewsError::DateParse(_) => "Date Parse Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ViewsError::StoreUnavailable(msg) => msg,
            ViewsError::PermissionDenied(msg) => msg,
            ViewsError::MalformedDocument(msg) => msg,
            ViewsError::DatabaseConfig(msg) => msg,
            ViewsError::DatabaseConnection(msg) => msg,
            ViewsError::FileOperation(msg) => msg,
            ViewsError::Validation(msg) => msg,
            ViewsError::NotFound(msg) => msg,
            ViewsError::Serialization(msg) => msg,
            ViewsError::DateParse(msg) => msg,
        }
    }

    /// 是否为权限拒绝（读取私有页面时常见，只在 debug 级别记录）
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ViewsError::PermissionDenied(_))
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ViewsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ViewsError {}

// 便捷的构造函数
impl ViewsError {
    pub fn store_unavailable<T: Into<String>>(msg: T) -> Self {
        ViewsError::StoreUnavailable(msg.into())
    }

    pub fn permission_denied<T: Into<String>>(msg: T) -> Self {
        ViewsError::PermissionDenied(msg.into())
    }

    pub fn malformed_document<T: Into<String>>(msg: T) -> Self {
        ViewsError::MalformedDocument(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        ViewsError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        ViewsError::DatabaseConnection(msg.into())
    }

    pub fn file_operation<T: Into<String>>(msg: T) -> Self {
        ViewsError::FileOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ViewsError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ViewsError::NotFound(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        ViewsError::Serialization(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        ViewsError::DateParse(msg.into())
    }
}

// 数据库错误统一视为存储暂不可用，由上层决定降级策略
impl From<sea_orm::DbErr> for ViewsError {
    fn from(err: sea_orm::DbErr) -> Self {
        ViewsError::StoreUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for ViewsError {
    fn from(err: std::io::Error) -> Self {
        ViewsError::FileOperation(err.to_string())
    }
}

impl From<serde_json::Error> for ViewsError {
    fn from(err: serde_json::Error) -> Self {
        ViewsError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for ViewsError {
    fn from(err: chrono::ParseError) -> Self {
        ViewsError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ViewsError>;
