//! 连接点（JoinPoint）定义
//!
//! 连接点表示程序执行的特定点，比如方法调用

use crate::advice::AdviceType;
use crate::error::{AdviceExecutionError, BoxError, Thrown};
use crate::signature::Signature;
use futures::future::BoxFuture;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 通知链的执行结果
pub type Outcome = Result<ReturnValue, Thrown>;

/// 方法参数
///
/// 类型擦除后按位置保存，通知可以按原始类型取回
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<Arc<dyn Any + Send + Sync>>,
    type_names: Vec<&'static str>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个参数
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    pub fn push<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.push(Arc::new(value));
        self.type_names.push(std::any::type_name::<T>());
    }

    /// 按位置和类型获取参数
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index)?.downcast_ref::<T>()
    }

    /// 参数的类型名
    pub fn type_names(&self) -> &[&'static str] {
        &self.type_names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.type_names).finish()
    }
}

/// 连接点信息
///
/// 包含方法调用时的上下文信息
#[derive(Clone)]
pub struct JoinPoint {
    signature: Arc<Signature>,
    args: Arguments,
    timestamp: Instant,
}

impl JoinPoint {
    /// 创建新的连接点
    pub fn new(signature: Arc<Signature>, args: Arguments) -> Self {
        Self {
            signature,
            args,
            timestamp: Instant::now(),
        }
    }

    /// 方法签名
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn args(&self) -> &Arguments {
        &self.args
    }

    /// 按位置和类型获取参数
    pub fn arg<T: Any>(&self, index: usize) -> Option<&T> {
        self.args.get(index)
    }

    /// 调用开始的时间
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// 自调用开始以来经过的时间
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature.to_string())
            .field("args", &self.args)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.signature, f)
    }
}

/// 目标方法的返回值（类型擦除后）
pub struct ReturnValue {
    value: Box<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ReturnValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn value_type_id(&self) -> TypeId {
        self.type_id
    }

    /// 取回原始类型的值
    pub fn into_inner<T: Any>(self) -> Result<T, Self> {
        let Self {
            value,
            type_id,
            type_name,
        } = self;
        value.downcast::<T>().map(|value| *value).map_err(|value| Self {
            value,
            type_id,
            type_name,
        })
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 通知链中“继续执行”的能力
pub(crate) trait Proceed: Send + Sync {
    /// 从第 `index` 个通知开始执行剩余的链
    fn proceed_from(&self, index: usize) -> BoxFuture<'_, Outcome>;
}

/// 环绕通知的执行链
///
/// 允许切面控制是否继续执行目标方法。`proceed` 可以不调用（短路）、
/// 调用一次，或多次调用（重试）。
pub struct ProceedingJoinPoint<'a> {
    join_point: &'a JoinPoint,
    chain: &'a dyn Proceed,
    next: usize,
    aspect: &'a str,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub(crate) fn new(
        join_point: &'a JoinPoint,
        chain: &'a dyn Proceed,
        next: usize,
        aspect: &'a str,
    ) -> Self {
        Self {
            join_point,
            chain,
            next,
            aspect,
        }
    }

    /// 继续执行链中剩余的通知与目标方法
    pub async fn proceed(&self) -> Outcome {
        self.chain.proceed_from(self.next).await
    }

    /// 获取连接点信息
    pub fn join_point(&self) -> &JoinPoint {
        self.join_point
    }

    pub fn signature(&self) -> &Signature {
        self.join_point.signature()
    }

    /// 以环绕通知自身的错误结束调用
    pub fn fail(&self, error: impl Into<BoxError>) -> Thrown {
        AdviceExecutionError::new(
            self.aspect,
            AdviceType::Around,
            self.join_point.signature().to_string(),
            error,
        )
        .into()
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", self.join_point)
            .field("aspect", &self.aspect)
            .field("next", &self.next)
            .finish()
    }
}
