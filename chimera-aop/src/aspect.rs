//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化：一组命名切点与通知声明

use crate::advice::{
    AdviceResult, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AroundAdvice,
    BeforeAdvice,
};
use crate::error::{AopResult, Thrown};
use crate::error_info::ErrorInfo;
use crate::joinpoint::{JoinPoint, Outcome, ProceedingJoinPoint, ReturnValue};
use crate::registry::AspectRegistry;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// 切面 Trait
///
/// 实现此 trait 以定义切面逻辑
pub trait Aspect: Send + Sync {
    /// 切面名称，同时作为短切点引用的作用域
    fn name(&self) -> &str;

    /// 向注册表注册本切面的切点与通知
    fn configure(&self, registry: &mut AspectRegistry) -> AopResult<()>;
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 创建切面实例的函数
    pub creator: fn() -> Box<dyn Aspect>,
}

impl AspectRegistration {
    /// 创建新的切面注册器
    pub const fn new(name: &'static str, creator: fn() -> Box<dyn Aspect>) -> Self {
        Self { name, creator }
    }

    /// 创建切面实例
    pub fn create_instance(&self) -> Box<dyn Aspect> {
        (self.creator)()
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

// ============================================================================
// 预定义的常用通知
// ============================================================================

/// 日志切面 - 记录方法进入与退出
#[derive(Debug, Clone, Default)]
pub struct LoggingAspect {
    log_args: bool,
}

impl LoggingAspect {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入时同时记录参数类型
    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

#[async_trait]
impl BeforeAdvice for LoggingAspect {
    async fn before(&self, join_point: &JoinPoint) -> AdviceResult {
        if self.log_args {
            tracing::info!("→ Entering: {} args={:?}", join_point, join_point.args());
        } else {
            tracing::info!("→ Entering: {}", join_point);
        }
        Ok(())
    }
}

#[async_trait]
impl AfterAdvice for LoggingAspect {
    async fn after(&self, join_point: &JoinPoint) -> AdviceResult {
        tracing::info!("← Exiting: {} (took {:?})", join_point, join_point.elapsed());
        Ok(())
    }
}

/// 性能监控切面
#[derive(Debug, Clone)]
pub struct PerformanceAspect {
    threshold: Duration,
}

impl PerformanceAspect {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl Default for PerformanceAspect {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[async_trait]
impl AroundAdvice for PerformanceAspect {
    async fn around(&self, pjp: ProceedingJoinPoint<'_>) -> Outcome {
        let start = Instant::now();
        let outcome = pjp.proceed().await;
        let elapsed = start.elapsed();

        if elapsed > self.threshold {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {:?} (threshold: {:?})",
                pjp.signature(),
                elapsed,
                self.threshold
            );
        } else {
            tracing::debug!("{} took {:?}", pjp.signature(), elapsed);
        }
        outcome
    }
}

/// 异常日志切面
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionLoggingAspect;

#[async_trait]
impl AfterThrowingAdvice for ExceptionLoggingAspect {
    async fn after_throwing(&self, join_point: &JoinPoint, error: &Thrown) -> AdviceResult {
        let info = ErrorInfo::from_thrown(error);
        tracing::error!(
            "❌ Exception in {} [{}]: {}",
            join_point,
            info.error_type,
            info.full_description()
        );
        Ok(())
    }
}

/// 返回值日志切面
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnLoggingAspect;

#[async_trait]
impl AfterReturningAdvice for ReturnLoggingAspect {
    async fn after_returning(
        &self,
        join_point: &JoinPoint,
        result: &ReturnValue,
    ) -> AdviceResult {
        tracing::info!("↩ Returned from {}: {}", join_point, result.type_name());
        Ok(())
    }
}
