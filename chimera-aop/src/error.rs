//! AOP 错误类型
//!
//! 区分三类错误：切点表达式解析错误、切点引用解析错误、通知执行错误。
//! 目标方法自身的错误始终以原始类型传回调用方。

use crate::advice::AdviceType;
use std::error::Error;
use std::fmt;
use thiserror::Error;

/// 通知处理器可以返回的任意错误
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// AOP 操作结果
pub type AopResult<T> = Result<T, AopError>;

/// 切点表达式解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pointcut expression `{expression}` at offset {offset}: {message}")]
pub struct ParseError {
    /// 原始表达式
    pub expression: String,

    /// 出错位置（字节偏移）
    pub offset: usize,

    /// 错误描述
    pub message: String,
}

impl ParseError {
    pub fn new(expression: &str, offset: usize, message: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            offset,
            message: message.into(),
        }
    }
}

/// 切点引用无法解析
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnresolvedPointcutError {
    #[error("pointcut `{name}` referenced from `{referenced_from}` is not registered")]
    Dangling {
        name: String,
        referenced_from: String,
    },

    #[error("cyclic pointcut reference: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// 通知处理器自身抛出的错误
///
/// 与目标方法抛出的错误区分开
#[derive(Debug, Error)]
#[error("{advice_type} advice of aspect `{aspect}` failed at {signature}: {source}")]
pub struct AdviceExecutionError {
    aspect: String,
    advice_type: AdviceType,
    signature: String,
    source: BoxError,
}

impl AdviceExecutionError {
    pub fn new(
        aspect: impl Into<String>,
        advice_type: AdviceType,
        signature: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            aspect: aspect.into(),
            advice_type,
            signature: signature.into(),
            source: source.into(),
        }
    }

    /// 出错通知所属的切面
    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    pub fn advice_type(&self) -> AdviceType {
        self.advice_type
    }

    /// 出错时的连接点签名
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// 处理器返回的原始错误
    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// 通知链产生的值与目标方法的返回类型不一致
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected a value of type `{expected}`, got `{found}`")]
pub struct ReturnTypeMismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

/// AOP 统一错误
#[derive(Debug, Error)]
pub enum AopError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Unresolved(#[from] UnresolvedPointcutError),

    #[error(transparent)]
    Advice(#[from] AdviceExecutionError),

    #[error("pointcut `{0}` is already registered")]
    DuplicatePointcut(String),

    #[error(transparent)]
    ReturnTypeMismatch(#[from] ReturnTypeMismatch),

    #[error("the target of {signature} can only be invoked once")]
    TargetConsumed { signature: String },

    #[error("no advice handler named `{0}`")]
    UnknownHandler(String),

    #[error("advice handler `{handler}` is {found} advice, but the declaration asks for {expected}")]
    HandlerKindMismatch {
        handler: String,
        expected: AdviceType,
        found: AdviceType,
    },

    #[error("invalid aspect manifest: {0}")]
    Manifest(String),
}

/// 目标方法抛出的错误（类型擦除后）
///
/// 保留原始错误对象与其类型名，调用方最终拿到的仍是原始类型
pub struct TargetError {
    error: BoxError,
    type_name: &'static str,
}

impl TargetError {
    pub(crate) fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            error: Box::new(error),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// 原始错误的类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 尝试以原始类型访问错误
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    pub(crate) fn into_inner<E: Error + 'static>(self) -> Result<E, Self> {
        let type_name = self.type_name;
        self.error
            .downcast::<E>()
            .map(|error| *error)
            .map_err(|error| Self { error, type_name })
    }
}

impl fmt::Debug for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetError")
            .field("type_name", &self.type_name)
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl Error for TargetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error.source()
    }
}

/// 沿通知链向外传播的失败
///
/// 异常通知（AfterThrowing）观察到的就是它
#[derive(Debug, Error)]
pub enum Thrown {
    /// 目标方法抛出的错误
    #[error(transparent)]
    Target(TargetError),

    /// 通知或引擎产生的错误
    #[error(transparent)]
    Aop(AopError),
}

impl Thrown {
    /// 是否来自目标方法
    pub fn is_target(&self) -> bool {
        matches!(self, Thrown::Target(_))
    }

    /// 以原始类型访问目标方法的错误
    pub fn target_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Thrown::Target(target) => target.downcast_ref::<E>(),
            Thrown::Aop(_) => None,
        }
    }

    /// 错误类型名
    pub fn type_name(&self) -> &'static str {
        match self {
            Thrown::Target(target) => target.type_name(),
            Thrown::Aop(_) => std::any::type_name::<AopError>(),
        }
    }
}

impl From<AdviceExecutionError> for Thrown {
    fn from(error: AdviceExecutionError) -> Self {
        Thrown::Aop(AopError::Advice(error))
    }
}

impl From<AopError> for Thrown {
    fn from(error: AopError) -> Self {
        Thrown::Aop(error)
    }
}

/// `intercept` 的错误
///
/// `Target` 为目标方法的原始错误，类型与内容都不变
#[derive(Debug)]
pub enum InterceptError<E> {
    Target(E),
    Aop(AopError),
}

impl<E> InterceptError<E> {
    pub fn is_target(&self) -> bool {
        matches!(self, InterceptError::Target(_))
    }

    /// 取出目标方法的错误
    pub fn into_target(self) -> Option<E> {
        match self {
            InterceptError::Target(error) => Some(error),
            InterceptError::Aop(_) => None,
        }
    }

    pub fn as_aop(&self) -> Option<&AopError> {
        match self {
            InterceptError::Target(_) => None,
            InterceptError::Aop(error) => Some(error),
        }
    }

    /// 将 AOP 错误折叠进目标错误类型
    ///
    /// 供生成的调用点使用，使被包装方法保持原有签名
    pub fn flatten(self) -> E
    where
        E: From<AopError>,
    {
        match self {
            InterceptError::Target(error) => error,
            InterceptError::Aop(error) => E::from(error),
        }
    }
}

impl<E: fmt::Display> fmt::Display for InterceptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptError::Target(error) => fmt::Display::fmt(error, f),
            InterceptError::Aop(error) => fmt::Display::fmt(error, f),
        }
    }
}

impl<E: Error + 'static> Error for InterceptError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InterceptError::Target(error) => error.source(),
            InterceptError::Aop(error) => error.source(),
        }
    }
}
