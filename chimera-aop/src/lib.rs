//! Chimera AOP - 面向切面编程支持
//!
//! 提供类似 Spring Boot 的 AOP 功能，支持：
//! - 切点表达式语言（`execution(...)`、`within(...)`、`&&`、`||`、`!`、命名切点引用）
//! - 多种通知类型（Before、After、Around、AfterReturning、AfterThrowing）
//! - 按优先级嵌套执行的通知链，按签名缓存
//! - 编程式注册、切面清单（TOML / JSON）与 inventory 编译时注册
//! - `#[aop]` 属性宏生成调用点
//!
//! 使用示例：
//! ```ignore
//! let mut registry = AspectRegistry::new();
//! registry.register_pointcut("Pointcuts.allOrder", "execution(* hello.aop.order..*(..))")?;
//! registry.register_advice(
//!     AdviceDeclaration::new("LogAspect", "Pointcuts.allOrder()", AdviceHandler::before(LoggingAspect::new())),
//! )?;
//! let interceptor = registry.build()?;
//!
//! let result = interceptor
//!     .intercept(&signature, Arguments::new(), || async { order_service.order_item("itemA").await })
//!     .await;
//! ```

pub mod advice;
pub mod aspect;
pub mod chain;
pub mod error;
pub mod error_info;
pub mod interceptor;
pub mod joinpoint;
pub mod manifest;
pub mod parser;
pub mod pattern;
pub mod pointcut;
pub mod pointcut_registry;
pub mod registry;
pub mod signature;

// 重新导出核心类型
pub use advice::{
    AdviceDeclaration, AdviceHandler, AdviceResult, AdviceType, AfterAdvice, AfterReturningAdvice,
    AfterThrowingAdvice, AroundAdvice, BeforeAdvice, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE,
};
pub use aspect::{
    Aspect, AspectRegistration, ExceptionLoggingAspect, LoggingAspect, PerformanceAspect,
    ReturnLoggingAspect,
};
pub use chain::{AdviceChain, Advisor};
pub use error::{
    AdviceExecutionError, AopError, AopResult, BoxError, InterceptError, ParseError,
    ReturnTypeMismatch, TargetError, Thrown, UnresolvedPointcutError,
};
pub use error_info::ErrorInfo;
pub use interceptor::{AopInterceptor, Intercepted};
pub use joinpoint::{Arguments, JoinPoint, Outcome, ProceedingJoinPoint, ReturnValue};
pub use manifest::{AspectManifest, HandlerCatalog};
pub use pointcut::PointcutExpression;
pub use pointcut_registry::PointcutRegistry;
pub use registry::{global_interceptor, intercept_global, AspectRegistry};
pub use signature::{Signature, SignatureBuilder, Visibility};

// 导出 inventory 与 once_cell 供宏使用
pub use inventory;
pub use once_cell;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::aspect::{
        Aspect, AspectRegistration, ExceptionLoggingAspect, LoggingAspect, PerformanceAspect,
        ReturnLoggingAspect,
    };
    pub use crate::error::{AopError, AopResult, InterceptError, Thrown};
    pub use crate::interceptor::AopInterceptor;
    pub use crate::joinpoint::{Arguments, JoinPoint, Outcome, ProceedingJoinPoint, ReturnValue};
    pub use crate::registry::{global_interceptor, AspectRegistry};
    pub use crate::signature::Signature;
}
