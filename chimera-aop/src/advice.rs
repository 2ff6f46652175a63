//! 通知（Advice）定义
//!
//! 定义了在连接点执行的各种动作

use crate::error::{BoxError, Thrown};
use crate::joinpoint::{JoinPoint, Outcome, ProceedingJoinPoint, ReturnValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 默认优先级（最低）
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 最高优先级
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 通知处理器的返回值
pub type AdviceResult = Result<(), BoxError>;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdviceType::Before => "before",
            AdviceType::After => "after",
            AdviceType::AfterReturning => "after-returning",
            AdviceType::AfterThrowing => "after-throwing",
            AdviceType::Around => "around",
        };
        f.write_str(name)
    }
}

/// 前置通知 Trait
///
/// 在目标方法执行前调用，返回错误会中止调用
#[async_trait]
pub trait BeforeAdvice: Send + Sync {
    async fn before(&self, join_point: &JoinPoint) -> AdviceResult;
}

/// 后置通知 Trait
///
/// 在目标方法执行后调用（无论成功还是失败）
#[async_trait]
pub trait AfterAdvice: Send + Sync {
    async fn after(&self, join_point: &JoinPoint) -> AdviceResult;
}

/// 返回后通知 Trait
///
/// 在目标方法成功返回后调用
#[async_trait]
pub trait AfterReturningAdvice: Send + Sync {
    async fn after_returning(&self, join_point: &JoinPoint, result: &ReturnValue)
        -> AdviceResult;
}

/// 异常通知 Trait
///
/// 在目标方法失败时调用，失败会继续向外传播
#[async_trait]
pub trait AfterThrowingAdvice: Send + Sync {
    async fn after_throwing(&self, join_point: &JoinPoint, error: &Thrown) -> AdviceResult;
}

/// 环绕通知 Trait
///
/// 可以完全控制目标方法的执行
#[async_trait]
pub trait AroundAdvice: Send + Sync {
    async fn around(&self, pjp: ProceedingJoinPoint<'_>) -> Outcome;
}

#[async_trait]
impl<F> BeforeAdvice for F
where
    F: Fn(&JoinPoint) -> AdviceResult + Send + Sync,
{
    async fn before(&self, join_point: &JoinPoint) -> AdviceResult {
        self(join_point)
    }
}

#[async_trait]
impl<F> AfterAdvice for F
where
    F: Fn(&JoinPoint) -> AdviceResult + Send + Sync,
{
    async fn after(&self, join_point: &JoinPoint) -> AdviceResult {
        self(join_point)
    }
}

#[async_trait]
impl<F> AfterReturningAdvice for F
where
    F: Fn(&JoinPoint, &ReturnValue) -> AdviceResult + Send + Sync,
{
    async fn after_returning(
        &self,
        join_point: &JoinPoint,
        result: &ReturnValue,
    ) -> AdviceResult {
        self(join_point, result)
    }
}

#[async_trait]
impl<F> AfterThrowingAdvice for F
where
    F: Fn(&JoinPoint, &Thrown) -> AdviceResult + Send + Sync,
{
    async fn after_throwing(&self, join_point: &JoinPoint, error: &Thrown) -> AdviceResult {
        self(join_point, error)
    }
}

/// 通知处理器
///
/// 通知类型由变体决定
#[derive(Clone)]
pub enum AdviceHandler {
    Before(Arc<dyn BeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    Around(Arc<dyn AroundAdvice>),
}

impl AdviceHandler {
    pub fn before(advice: impl BeforeAdvice + 'static) -> Self {
        AdviceHandler::Before(Arc::new(advice))
    }

    pub fn after(advice: impl AfterAdvice + 'static) -> Self {
        AdviceHandler::After(Arc::new(advice))
    }

    pub fn after_returning(advice: impl AfterReturningAdvice + 'static) -> Self {
        AdviceHandler::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing(advice: impl AfterThrowingAdvice + 'static) -> Self {
        AdviceHandler::AfterThrowing(Arc::new(advice))
    }

    pub fn around(advice: impl AroundAdvice + 'static) -> Self {
        AdviceHandler::Around(Arc::new(advice))
    }

    // 以下构造函数直接约束闭包签名，便于推断引用参数的生命周期

    pub fn before_fn<F>(handler: F) -> Self
    where
        F: Fn(&JoinPoint) -> AdviceResult + Send + Sync + 'static,
    {
        AdviceHandler::Before(Arc::new(handler))
    }

    pub fn after_fn<F>(handler: F) -> Self
    where
        F: Fn(&JoinPoint) -> AdviceResult + Send + Sync + 'static,
    {
        AdviceHandler::After(Arc::new(handler))
    }

    pub fn after_returning_fn<F>(handler: F) -> Self
    where
        F: Fn(&JoinPoint, &ReturnValue) -> AdviceResult + Send + Sync + 'static,
    {
        AdviceHandler::AfterReturning(Arc::new(handler))
    }

    pub fn after_throwing_fn<F>(handler: F) -> Self
    where
        F: Fn(&JoinPoint, &Thrown) -> AdviceResult + Send + Sync + 'static,
    {
        AdviceHandler::AfterThrowing(Arc::new(handler))
    }

    /// 通知类型
    pub fn kind(&self) -> AdviceType {
        match self {
            AdviceHandler::Before(_) => AdviceType::Before,
            AdviceHandler::After(_) => AdviceType::After,
            AdviceHandler::AfterReturning(_) => AdviceType::AfterReturning,
            AdviceHandler::AfterThrowing(_) => AdviceType::AfterThrowing,
            AdviceHandler::Around(_) => AdviceType::Around,
        }
    }
}

impl fmt::Debug for AdviceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdviceHandler::{:?}", self.kind())
    }
}

/// 通知声明
///
/// 切点通常是对命名切点的引用，例如 `Pointcuts.allOrder()`
#[derive(Debug, Clone)]
pub struct AdviceDeclaration {
    aspect: String,
    pointcut: String,
    handler: AdviceHandler,
    order: i32,
}

impl AdviceDeclaration {
    pub fn new(
        aspect: impl Into<String>,
        pointcut: impl Into<String>,
        handler: AdviceHandler,
    ) -> Self {
        Self {
            aspect: aspect.into(),
            pointcut: pointcut.into(),
            handler,
            order: LOWEST_PRECEDENCE,
        }
    }

    /// 设置切面优先级，数值越小越先进入、越后退出
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    /// 切点表达式原文
    pub fn pointcut(&self) -> &str {
        &self.pointcut
    }

    pub fn handler(&self) -> &AdviceHandler {
        &self.handler
    }

    pub fn kind(&self) -> AdviceType {
        self.handler.kind()
    }

    pub fn priority(&self) -> i32 {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advice_type_display_and_serde() {
        assert_eq!(AdviceType::AfterReturning.to_string(), "after-returning");
        assert_eq!(
            serde_json::from_str::<AdviceType>(r#""after_throwing""#).unwrap(),
            AdviceType::AfterThrowing
        );
        assert_eq!(serde_json::to_string(&AdviceType::Around).unwrap(), r#""around""#);
    }

    #[test]
    fn test_declaration_defaults() {
        let decl = AdviceDeclaration::new(
            "LogAspect",
            "Pointcuts.allOrder()",
            AdviceHandler::before_fn(|_| Ok(())),
        );
        assert_eq!(decl.kind(), AdviceType::Before);
        assert_eq!(decl.priority(), LOWEST_PRECEDENCE);
        assert_eq!(decl.order(1).priority(), 1);
    }

    #[test]
    fn test_handler_kinds() {
        let handlers = [
            AdviceHandler::after_fn(|_| Ok(())),
            AdviceHandler::after_returning_fn(|_, _| Ok(())),
            AdviceHandler::after_throwing_fn(|_, _| Ok(())),
        ];
        let kinds: Vec<_> = handlers.iter().map(AdviceHandler::kind).collect();
        assert_eq!(
            kinds,
            vec![
                AdviceType::After,
                AdviceType::AfterReturning,
                AdviceType::AfterThrowing
            ]
        );
        assert_eq!(format!("{:?}", handlers[0]), "AdviceHandler::After");
    }
}
