//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
///
/// 数据缺失（编码不存在、无适用参考值等）不属于错误，由各解析器以结构化结果返回；
/// 这里只收纳真正的故障。
#[derive(Error, Debug)]
pub enum MedrefError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("参考数据存储故障: {0}")]
    StoreFault(String),

    #[error("快照加载失败 ({path}): {reason}")]
    SnapshotLoad { path: String, reason: String },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl MedrefError {
    /// 是否属于存储层故障（需要向调用方显式报告的硬错误）
    pub fn is_store_fault(&self) -> bool {
        matches!(
            self,
            MedrefError::StoreFault(_) | MedrefError::SnapshotLoad { .. } | MedrefError::Io(_)
        )
    }

    /// 错误类别名称，用于响应信封
    pub fn kind(&self) -> &'static str {
        match self {
            MedrefError::Config(_) => "config",
            MedrefError::StoreFault(_) | MedrefError::SnapshotLoad { .. } | MedrefError::Io(_) => {
                "store_fault"
            }
            MedrefError::Serialization(_) => "serialization",
            MedrefError::Validation(_) => "validation",
            MedrefError::Internal(_) => "internal",
        }
    }
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, MedrefError>;
