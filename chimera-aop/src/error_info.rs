//! 错误信息结构
//!
//! 提供结构化的错误信息传递给切面

use crate::error::Thrown;
use std::error::Error;

/// 结构化的错误信息
///
/// 用于在 after_throwing 通知中记录更丰富的错误信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误类型名称
    pub error_type: String,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,

    /// 是否来自目标方法（否则为通知或引擎的错误）
    pub from_target: bool,
}

impl ErrorInfo {
    /// 从标准错误创建 ErrorInfo
    pub fn from_error<E: Error>(error: &E) -> Self {
        Self {
            message: error.to_string(),
            error_type: std::any::type_name::<E>().to_string(),
            source_chain: source_chain(error.source()),
            from_target: true,
        }
    }

    /// 从通知链上传播的失败创建 ErrorInfo
    ///
    /// 类型名取自原始错误，而不是类型擦除后的包装
    pub fn from_thrown(thrown: &Thrown) -> Self {
        Self {
            message: thrown.to_string(),
            error_type: thrown.type_name().to_string(),
            source_chain: source_chain(thrown.source()),
            from_target: thrown.is_target(),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

fn source_chain(mut current: Option<&(dyn Error + 'static)>) -> Vec<String> {
    let mut chain = Vec::new();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain
}
