//! 统一错误类型定义.
//!
//! 所有 Qin crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Qin 框架统一错误类型
#[derive(Debug, Error)]
pub enum QinError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 编解码器错误
    #[error("编解码器错误: {0}")]
    Codec(String),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 无效数据 (损坏的码流、越界的配置索引等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Qin 框架统一 Result 类型
pub type QinResult<T> = Result<T, QinError>;
