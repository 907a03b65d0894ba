//! # qin-core
//!
//! Qin 感知音频编解码框架核心库, 提供错误类型与位流基础设施.
//!
//! 编解码核心 (`qin-codec`) 的所有位级序列化都经由本 crate 的
//! LSB-first 位流读写器完成, 不依赖任何本机字节布局技巧.

pub mod bitio;
pub mod error;

// 重导出常用类型
pub use bitio::{LsbBitReader, LsbBitWriter, ilog};
pub use error::{QinError, QinResult};
