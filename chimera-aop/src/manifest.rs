//! 切面清单
//!
//! 以 TOML 或 JSON 声明命名切点与通知，通知处理器按名称从 [`HandlerCatalog`] 中查找。
//!
//! ```toml
//! [[pointcut]]
//! name = "Pointcuts.allOrder"
//! expression = "execution(* hello.aop.order..*(..))"
//!
//! [[advice]]
//! aspect = "LogAspect"
//! pointcut = "Pointcuts.allOrder()"
//! kind = "before"
//! handler = "log_entry"
//! order = 1
//! ```

use crate::advice::{AdviceHandler, AdviceType, LOWEST_PRECEDENCE};
use crate::aspect::{ExceptionLoggingAspect, LoggingAspect, PerformanceAspect, ReturnLoggingAspect};
use crate::error::{AopError, AopResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 切面清单
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AspectManifest {
    #[serde(default, rename = "pointcut")]
    pub pointcuts: Vec<PointcutEntry>,

    #[serde(default, rename = "advice")]
    pub advices: Vec<AdviceEntry>,
}

/// 命名切点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointcutEntry {
    pub name: String,
    pub expression: String,
}

/// 通知声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceEntry {
    pub aspect: String,
    pub pointcut: String,
    pub kind: AdviceType,
    pub handler: String,
    #[serde(default = "default_order")]
    pub order: i32,
}

fn default_order() -> i32 {
    LOWEST_PRECEDENCE
}

impl AspectManifest {
    pub fn from_toml_str(content: &str) -> AopResult<Self> {
        toml::from_str(content).map_err(|e| AopError::Manifest(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> AopResult<Self> {
        serde_json::from_str(content).map_err(|e| AopError::Manifest(e.to_string()))
    }

    /// 从文件加载，按扩展名选择格式（`.toml` / `.json`）
    pub fn from_file(path: impl AsRef<Path>) -> AopResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AopError::Manifest(format!("failed to read {}: {}", path.display(), e)))?;

        tracing::debug!("Loading aspect manifest from {}", path.display());
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(AopError::Manifest(format!(
                "unsupported manifest format: {}",
                path.display()
            ))),
        }
    }
}

/// 具名通知处理器目录
#[derive(Debug, Clone, Default)]
pub struct HandlerCatalog {
    handlers: HashMap<String, AdviceHandler>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含内置处理器的目录
    ///
    /// - `log_entry`：前置，记录进入
    /// - `log_exit`：后置，记录退出与耗时
    /// - `log_return`：返回后，记录返回类型
    /// - `log_exception`：异常，记录错误与源链
    /// - `timing`：环绕，超过 1 秒记录警告
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.insert("log_entry", AdviceHandler::before(LoggingAspect::new()));
        catalog.insert("log_exit", AdviceHandler::after(LoggingAspect::new()));
        catalog.insert("log_return", AdviceHandler::after_returning(ReturnLoggingAspect));
        catalog.insert("log_exception", AdviceHandler::after_throwing(ExceptionLoggingAspect));
        catalog.insert("timing", AdviceHandler::around(PerformanceAspect::default()));
        catalog
    }

    /// 注册处理器，同名覆盖
    pub fn insert(&mut self, name: impl Into<String>, handler: AdviceHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&AdviceHandler> {
        self.handlers.get(name)
    }

    /// 查找处理器并校验其通知类型
    pub fn resolve(&self, name: &str, kind: AdviceType) -> AopResult<AdviceHandler> {
        let handler = self
            .get(name)
            .ok_or_else(|| AopError::UnknownHandler(name.to_string()))?;
        if handler.kind() != kind {
            return Err(AopError::HandlerKindMismatch {
                handler: name.to_string(),
                expected: kind,
                found: handler.kind(),
            });
        }
        Ok(handler.clone())
    }
}
