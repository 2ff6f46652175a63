//! 拦截引擎
//!
//! 按通知链嵌套执行目标方法调用。链按签名缓存，引擎本身构建后不可变。

use crate::advice::AdviceHandler;
use crate::chain::{AdviceChain, Advisor};
use crate::error::{
    AdviceExecutionError, AopError, BoxError, InterceptError, ReturnTypeMismatch, TargetError,
    Thrown,
};
use crate::joinpoint::{Arguments, JoinPoint, Outcome, Proceed, ProceedingJoinPoint, ReturnValue};
use crate::pointcut_registry::PointcutRegistry;
use crate::signature::Signature;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

/// 类型擦除后的目标方法
type Target<'a> = dyn Fn() -> BoxFuture<'a, Outcome> + Send + Sync + 'a;

/// 带报告的拦截结果
///
/// `suppressed` 中是退出阶段通知（AfterReturning / AfterThrowing / After）的失败，
/// 它们被记录但不会影响 `result`
#[derive(Debug)]
pub struct Intercepted<T, E> {
    pub result: Result<T, InterceptError<E>>,
    pub suppressed: Vec<AdviceExecutionError>,
}

/// AOP 拦截器
///
/// 由 [`AspectRegistry::build`](crate::AspectRegistry::build) 创建
pub struct AopInterceptor {
    pointcuts: PointcutRegistry,
    advisors: Vec<Arc<Advisor>>,
    chains: RwLock<HashMap<Arc<Signature>, Arc<AdviceChain>>>,
}

impl AopInterceptor {
    pub(crate) fn new(pointcuts: PointcutRegistry, advisors: Vec<Arc<Advisor>>) -> Self {
        Self {
            pointcuts,
            advisors,
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// 命名切点
    pub fn pointcuts(&self) -> &PointcutRegistry {
        &self.pointcuts
    }

    /// 所有通知，按注册顺序
    pub fn advisors(&self) -> &[Arc<Advisor>] {
        &self.advisors
    }

    /// 已缓存的通知链数量
    pub fn cached_chains(&self) -> usize {
        self.chains.read().len()
    }

    /// 获取签名对应的通知链
    ///
    /// 首次访问时计算并缓存；并发计算时保留先写入的结果
    pub fn chain_for(&self, signature: &Arc<Signature>) -> Arc<AdviceChain> {
        if let Some(chain) = self.chains.read().get(signature.as_ref()) {
            return Arc::clone(chain);
        }

        let chain = Arc::new(AdviceChain::build(Arc::clone(signature), &self.advisors));
        let mut chains = self.chains.write();
        let cached = chains.entry(Arc::clone(signature)).or_insert(chain);
        tracing::debug!(
            "Cached advice chain for {} ({} advice(s))",
            signature,
            cached.len()
        );
        Arc::clone(cached)
    }

    /// 拦截一次方法调用
    ///
    /// `thunk` 可能被环绕通知多次调用（重试），也可能一次都不调用（短路）。
    /// 目标方法的错误以原始类型放在 [`InterceptError::Target`] 中返回。
    pub async fn intercept<T, E, F, Fut>(
        &self,
        signature: &Arc<Signature>,
        args: Arguments,
        thunk: F,
    ) -> Result<T, InterceptError<E>>
    where
        T: Any + Send + Sync,
        E: Error + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let chain = self.chain_for(signature);
        if chain.is_empty() {
            return thunk().await.map_err(InterceptError::Target);
        }

        let target = || erase(thunk());
        self.run::<T, E>(chain, args, &target).await.result
    }

    /// 拦截一次方法调用，目标方法最多执行一次
    ///
    /// 适用于会移动参数的调用点；再次 `proceed` 得到 [`AopError::TargetConsumed`]
    pub async fn intercept_once<T, E, F, Fut>(
        &self,
        signature: &Arc<Signature>,
        args: Arguments,
        thunk: F,
    ) -> Result<T, InterceptError<E>>
    where
        T: Any + Send + Sync,
        E: Error + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let chain = self.chain_for(signature);
        if chain.is_empty() {
            return thunk().await.map_err(InterceptError::Target);
        }

        let slot = Mutex::new(Some(thunk));
        let target = || {
            let thunk = slot.lock().take();
            match thunk {
                Some(thunk) => erase(thunk()),
                None => {
                    let consumed = AopError::TargetConsumed {
                        signature: signature.to_string(),
                    };
                    futures::future::ready(Err(Thrown::Aop(consumed))).boxed()
                }
            }
        };
        self.run::<T, E>(chain, args, &target).await.result
    }

    /// 与 [`intercept`](Self::intercept) 相同，同时返回被记录的退出阶段通知失败
    pub async fn intercept_with_report<T, E, F, Fut>(
        &self,
        signature: &Arc<Signature>,
        args: Arguments,
        thunk: F,
    ) -> Intercepted<T, E>
    where
        T: Any + Send + Sync,
        E: Error + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let chain = self.chain_for(signature);
        let target = || erase(thunk());
        self.run::<T, E>(chain, args, &target).await
    }

    async fn run<'a, T, E>(
        &self,
        chain: Arc<AdviceChain>,
        args: Arguments,
        target: &'a Target<'a>,
    ) -> Intercepted<T, E>
    where
        T: Any + Send + Sync,
        E: Error + Send + Sync + 'static,
    {
        let context = ChainContext {
            join_point: JoinPoint::new(Arc::clone(chain.signature()), args),
            chain,
            target,
            expected: TypeId::of::<T>(),
            expected_name: std::any::type_name::<T>(),
            suppressed: Mutex::new(Vec::new()),
        };

        let outcome = context.invoke(0).await;
        Intercepted {
            result: restore(outcome),
            suppressed: context.suppressed.into_inner(),
        }
    }
}

impl std::fmt::Debug for AopInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AopInterceptor")
            .field("pointcuts", &self.pointcuts.len())
            .field("advisors", &self.advisors)
            .field("cached_chains", &self.cached_chains())
            .finish()
    }
}

/// 把目标方法的结果擦除为 [`Outcome`]
fn erase<'a, T, E, Fut>(future: Fut) -> BoxFuture<'a, Outcome>
where
    T: Any + Send + Sync,
    E: Error + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'a,
{
    async move {
        match future.await {
            Ok(value) => Ok(ReturnValue::new(value)),
            Err(error) => Err(Thrown::Target(TargetError::new(error))),
        }
    }
    .boxed()
}

/// 把 [`Outcome`] 还原为调用方的类型
fn restore<T, E>(outcome: Outcome) -> Result<T, InterceptError<E>>
where
    T: Any,
    E: Error + 'static,
{
    match outcome {
        Ok(value) => value.into_inner::<T>().map_err(|value| {
            InterceptError::Aop(AopError::ReturnTypeMismatch(ReturnTypeMismatch {
                expected: std::any::type_name::<T>(),
                found: value.type_name(),
            }))
        }),
        Err(Thrown::Target(target)) => Err(match target.into_inner::<E>() {
            Ok(error) => InterceptError::Target(error),
            Err(target) => InterceptError::Aop(AopError::ReturnTypeMismatch(ReturnTypeMismatch {
                expected: std::any::type_name::<E>(),
                found: target.type_name(),
            })),
        }),
        Err(Thrown::Aop(error)) => Err(InterceptError::Aop(error)),
    }
}

/// 一次调用的执行上下文
struct ChainContext<'a> {
    join_point: JoinPoint,
    chain: Arc<AdviceChain>,
    target: &'a Target<'a>,
    expected: TypeId,
    expected_name: &'static str,
    suppressed: Mutex<Vec<AdviceExecutionError>>,
}

impl ChainContext<'_> {
    /// 执行第 `index` 个通知；越过链尾时调用目标方法
    fn invoke(&self, index: usize) -> BoxFuture<'_, Outcome> {
        async move {
            let Some(advisor) = self.chain.advisors().get(index) else {
                return (self.target)().await;
            };

            match advisor.handler() {
                AdviceHandler::Before(advice) => {
                    if let Err(source) = advice.before(&self.join_point).await {
                        let error = self.advice_error(advisor, source);
                        tracing::debug!("Aborting call: {}", error);
                        return Err(error.into());
                    }
                    self.invoke(index + 1).await
                }

                AdviceHandler::Around(advice) => {
                    let pjp = ProceedingJoinPoint::new(
                        &self.join_point,
                        self,
                        index + 1,
                        advisor.aspect(),
                    );
                    match advice.around(pjp).await {
                        Ok(value) if value.value_type_id() != self.expected => {
                            let mismatch = ReturnTypeMismatch {
                                expected: self.expected_name,
                                found: value.type_name(),
                            };
                            Err(self.advice_error(advisor, mismatch).into())
                        }
                        outcome => outcome,
                    }
                }

                AdviceHandler::AfterReturning(advice) => {
                    let outcome = self.invoke(index + 1).await;
                    if let Ok(value) = &outcome {
                        if let Err(source) = advice.after_returning(&self.join_point, value).await {
                            self.suppress(advisor, source);
                        }
                    }
                    outcome
                }

                AdviceHandler::AfterThrowing(advice) => {
                    let outcome = self.invoke(index + 1).await;
                    if let Err(thrown) = &outcome {
                        if let Err(source) = advice.after_throwing(&self.join_point, thrown).await {
                            self.suppress(advisor, source);
                        }
                    }
                    outcome
                }

                AdviceHandler::After(advice) => {
                    let outcome = self.invoke(index + 1).await;
                    if let Err(source) = advice.after(&self.join_point).await {
                        self.suppress(advisor, source);
                    }
                    outcome
                }
            }
        }
        .boxed()
    }

    fn advice_error(
        &self,
        advisor: &Advisor,
        source: impl Into<BoxError>,
    ) -> AdviceExecutionError {
        AdviceExecutionError::new(
            advisor.aspect(),
            advisor.kind(),
            self.join_point.signature().to_string(),
            source,
        )
    }

    /// 退出阶段的失败只记录，不替换调用结果
    fn suppress(&self, advisor: &Advisor, source: BoxError) {
        let error = self.advice_error(advisor, source);
        tracing::warn!("Suppressed advice failure: {}", error);
        self.suppressed.lock().push(error);
    }
}

impl Proceed for ChainContext<'_> {
    fn proceed_from(&self, index: usize) -> BoxFuture<'_, Outcome> {
        self.invoke(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{AdviceDeclaration, AdviceResult, AdviceType, AroundAdvice};
    use crate::registry::AspectRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    #[error("{0}")]
    struct OrderError(String);

    impl From<AopError> for OrderError {
        fn from(error: AopError) -> Self {
            OrderError(error.to_string())
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    fn order_item() -> Arc<Signature> {
        Signature::builder("hello.aop.order.OrderService", "orderItem")
            .param("String")
            .returns("String")
            .build()
    }

    fn repository_save() -> Arc<Signature> {
        Signature::builder("hello.aop.order.OrderRepository", "save")
            .param("String")
            .returns("String")
            .build()
    }

    fn recording_before(log: &Log, label: &'static str) -> AdviceHandler {
        let log = Arc::clone(log);
        AdviceHandler::before_fn(move |_| {
            log.lock().push(label.to_string());
            Ok(())
        })
    }

    fn recording_after(log: &Log, label: &'static str) -> AdviceHandler {
        let log = Arc::clone(log);
        AdviceHandler::after_fn(move |_| {
            log.lock().push(label.to_string());
            Ok(())
        })
    }

    /// 记录进入与退出的环绕通知
    struct Recording {
        log: Log,
        label: &'static str,
    }

    #[async_trait]
    impl AroundAdvice for Recording {
        async fn around(&self, pjp: ProceedingJoinPoint<'_>) -> Outcome {
            self.log.lock().push(format!("{} enter", self.label));
            let outcome = pjp.proceed().await;
            self.log.lock().push(format!("{} exit", self.label));
            outcome
        }
    }

    fn recording_around(log: &Log, label: &'static str) -> AdviceHandler {
        AdviceHandler::around(Recording {
            log: Arc::clone(log),
            label,
        })
    }

    async fn order(
        interceptor: &AopInterceptor,
        log: &Log,
        item: &str,
    ) -> Result<String, InterceptError<OrderError>> {
        let item = item.to_string();
        interceptor
            .intercept(&order_item(), Arguments::new().with(item.clone()), || {
                let log = Arc::clone(log);
                let item = item.clone();
                async move {
                    log.lock().push("call".to_string());
                    if item == "ex" {
                        Err(OrderError("order failed".to_string()))
                    } else {
                        Ok(format!("ordered {}", item))
                    }
                }
            })
            .await
    }

    fn build(declarations: Vec<AdviceDeclaration>) -> AopInterceptor {
        let mut registry = AspectRegistry::new();
        registry
            .register_pointcut("Pointcuts.allOrder", "execution(* hello.aop.order..*(..))")
            .unwrap();
        registry
            .register_pointcut("Pointcuts.allService", "execution(* *..*Service.*(..))")
            .unwrap();
        registry
            .register_pointcut("Pointcuts.orderAndService", "allOrder() && allService()")
            .unwrap();
        for declaration in declarations {
            registry.register_advice(declaration).unwrap();
        }
        registry.build().unwrap()
    }

    #[tokio::test]
    async fn test_around_priorities_nest() {
        let log = log();
        let interceptor = build(vec![
            AdviceDeclaration::new("Log", "Pointcuts.allOrder()", recording_around(&log, "log"))
                .order(2),
            AdviceDeclaration::new(
                "Tx",
                "Pointcuts.orderAndService()",
                recording_around(&log, "tx"),
            )
            .order(1),
        ]);

        let result = order(&interceptor, &log, "itemA").await.unwrap();
        assert_eq!(result, "ordered itemA");
        assert_eq!(
            entries(&log),
            vec!["tx enter", "log enter", "call", "log exit", "tx exit"]
        );
    }

    #[tokio::test]
    async fn test_before_and_timing_around() {
        let log = log();
        let mut registry = AspectRegistry::new();
        registry
            .register_pointcut("exec", "execution(* hello.aop.order.*Service.*(..))")
            .unwrap();
        registry
            .register_advice(AdviceDeclaration::new(
                "Audit",
                "exec()",
                recording_before(&log, "before"),
            ))
            .unwrap();
        registry
            .register_advice(AdviceDeclaration::new(
                "Audit",
                "exec()",
                recording_around(&log, "timing"),
            ))
            .unwrap();
        let interceptor = registry.build().unwrap();

        let result = order(&interceptor, &log, "itemA").await.unwrap();
        assert_eq!(result, "ordered itemA");
        assert_eq!(
            entries(&log),
            vec!["before", "timing enter", "call", "timing exit"]
        );
    }

    const V6_POINTCUT: &str = "Pointcuts.orderAndService()";

    #[tokio::test]
    async fn test_full_advice_set_on_failure() {
        let log = log();
        let returning = {
            let log = Arc::clone(&log);
            AdviceHandler::after_returning_fn(move |_, _| {
                log.lock().push("returning".to_string());
                Ok(())
            })
        };
        let throwing = {
            let log = Arc::clone(&log);
            AdviceHandler::after_throwing_fn(move |_, thrown| {
                let message = thrown
                    .target_ref::<OrderError>()
                    .map(|error| error.0.clone())
                    .unwrap_or_default();
                log.lock().push(format!("throwing {}", message));
                Ok(())
            })
        };
        let interceptor = build(vec![
            AdviceDeclaration::new("V6", V6_POINTCUT, recording_before(&log, "before")),
            AdviceDeclaration::new("V6", V6_POINTCUT, recording_after(&log, "after")),
            AdviceDeclaration::new("V6", V6_POINTCUT, returning),
            AdviceDeclaration::new("V6", V6_POINTCUT, throwing),
        ]);

        let err = order(&interceptor, &log, "ex").await.unwrap_err();
        assert_eq!(err.into_target(), Some(OrderError("order failed".to_string())));
        assert_eq!(
            entries(&log),
            vec!["before", "call", "throwing order failed", "after"]
        );

        log.lock().clear();
        order(&interceptor, &log, "itemA").await.unwrap();
        assert_eq!(entries(&log), vec!["before", "call", "returning", "after"]);
    }

    #[tokio::test]
    async fn test_unmatched_signature_is_called_directly() {
        let log = log();
        let interceptor = build(vec![AdviceDeclaration::new(
            "Tx",
            "Pointcuts.orderAndService()",
            recording_before(&log, "before"),
        )]);

        let saved: Result<String, InterceptError<OrderError>> = interceptor
            .intercept(&repository_save(), Arguments::new(), || async {
                Ok("saved".to_string())
            })
            .await;
        assert_eq!(saved.unwrap(), "saved");
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_before_failure_aborts_but_enclosing_after_runs() {
        let log = log();
        let failing = AdviceHandler::before_fn(|_| Err("connection refused".into()));
        let interceptor = build(vec![
            AdviceDeclaration::new("Outer", "Pointcuts.allOrder()", recording_after(&log, "after"))
                .order(0),
            AdviceDeclaration::new("Tx", "Pointcuts.allOrder()", failing).order(1),
            AdviceDeclaration::new("Inner", "Pointcuts.allOrder()", recording_before(&log, "inner"))
                .order(2),
        ]);

        let err = order(&interceptor, &log, "itemA").await.unwrap_err();
        match err.as_aop() {
            Some(AopError::Advice(advice)) => {
                assert_eq!(advice.aspect(), "Tx");
                assert_eq!(advice.advice_type(), AdviceType::Before);
                assert_eq!(advice.cause().to_string(), "connection refused");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(entries(&log), vec!["after"]);
    }

    #[tokio::test]
    async fn test_after_failure_is_reported_not_propagated() {
        let log = log();
        let failing =
            AdviceHandler::after_fn(|_| Err(anyhow::anyhow!("audit log unavailable").into()));
        let interceptor = build(vec![AdviceDeclaration::new(
            "Audit",
            "Pointcuts.allOrder()",
            failing,
        )]);

        let report: Intercepted<String, OrderError> = interceptor
            .intercept_with_report(&order_item(), Arguments::new(), || async {
                Ok("ordered".to_string())
            })
            .await;
        assert_eq!(report.result.unwrap(), "ordered");
        assert_eq!(report.suppressed.len(), 1);
        assert_eq!(report.suppressed[0].advice_type(), AdviceType::After);
        assert_eq!(report.suppressed[0].cause().to_string(), "audit log unavailable");

        // 目标方法的错误也不会被替换
        let report: Intercepted<String, OrderError> = interceptor
            .intercept_with_report(&order_item(), Arguments::new(), || async {
                Err(OrderError("ex".into()))
            })
            .await;
        assert_eq!(
            report.result.unwrap_err().into_target(),
            Some(OrderError("ex".into()))
        );
        assert_eq!(report.suppressed.len(), 1);
    }

    #[tokio::test]
    async fn test_returning_runs_before_after_regardless_of_declaration() {
        let log = log();
        let returning = {
            let log = Arc::clone(&log);
            AdviceHandler::after_returning_fn(move |_, _| {
                log.lock().push("returning".to_string());
                Ok(())
            })
        };
        let interceptor = build(vec![
            AdviceDeclaration::new("V6", "Pointcuts.allOrder()", returning),
            AdviceDeclaration::new("V6", "Pointcuts.allOrder()", recording_after(&log, "after")),
        ]);

        order(&interceptor, &log, "itemA").await.unwrap();
        assert_eq!(entries(&log), vec!["call", "returning", "after"]);
    }

    #[tokio::test]
    async fn test_throwing_runs_before_after_regardless_of_declaration() {
        let log = log();
        let throwing = {
            let log = Arc::clone(&log);
            AdviceHandler::after_throwing_fn(move |_, _| {
                log.lock().push("throwing".to_string());
                Ok(())
            })
        };
        let interceptor = build(vec![
            AdviceDeclaration::new("V6", "Pointcuts.allOrder()", throwing),
            AdviceDeclaration::new("V6", "Pointcuts.allOrder()", recording_after(&log, "after")),
        ]);

        let err = order(&interceptor, &log, "ex").await.unwrap_err();
        assert_eq!(err.into_target(), Some(OrderError("order failed".to_string())));
        assert_eq!(entries(&log), vec!["call", "throwing", "after"]);
    }

    #[tokio::test]
    async fn test_after_returning_failure_keeps_result() {
        let failing = AdviceHandler::after_returning_fn(|_, _| Err("metrics sink closed".into()));
        let interceptor = build(vec![AdviceDeclaration::new(
            "Metrics",
            "Pointcuts.allOrder()",
            failing,
        )]);

        let report: Intercepted<String, OrderError> = interceptor
            .intercept_with_report(&order_item(), Arguments::new(), || async {
                Ok("ordered".to_string())
            })
            .await;
        assert_eq!(report.result.unwrap(), "ordered");
        assert_eq!(report.suppressed.len(), 1);
        assert_eq!(report.suppressed[0].aspect(), "Metrics");
        assert_eq!(report.suppressed[0].advice_type(), AdviceType::AfterReturning);
        assert_eq!(report.suppressed[0].cause().to_string(), "metrics sink closed");
    }

    #[tokio::test]
    async fn test_after_throwing_failure_keeps_target_error() {
        let failing = AdviceHandler::after_throwing_fn(|_, _| Err("alerting unavailable".into()));
        let interceptor = build(vec![AdviceDeclaration::new(
            "Alert",
            "Pointcuts.allOrder()",
            failing,
        )]);

        let report: Intercepted<String, OrderError> = interceptor
            .intercept_with_report(&order_item(), Arguments::new(), || async {
                Err(OrderError("order failed".into()))
            })
            .await;
        assert_eq!(
            report.result.unwrap_err().into_target(),
            Some(OrderError("order failed".into()))
        );
        assert_eq!(report.suppressed.len(), 1);
        assert_eq!(report.suppressed[0].advice_type(), AdviceType::AfterThrowing);
        assert_eq!(report.suppressed[0].cause().to_string(), "alerting unavailable");
    }

    struct ShortCircuit;

    #[async_trait]
    impl AroundAdvice for ShortCircuit {
        async fn around(&self, _pjp: ProceedingJoinPoint<'_>) -> Outcome {
            Ok(ReturnValue::new("cached".to_string()))
        }
    }

    #[tokio::test]
    async fn test_around_short_circuit() {
        let log = log();
        let interceptor = build(vec![AdviceDeclaration::new(
            "Cache",
            "Pointcuts.allOrder()",
            AdviceHandler::around(ShortCircuit),
        )]);

        assert_eq!(order(&interceptor, &log, "itemA").await.unwrap(), "cached");
        assert!(entries(&log).is_empty());
    }

    /// 失败后重试一次
    struct Retry {
        attempts: usize,
    }

    #[async_trait]
    impl AroundAdvice for Retry {
        async fn around(&self, pjp: ProceedingJoinPoint<'_>) -> Outcome {
            let mut outcome = pjp.proceed().await;
            for _ in 1..self.attempts {
                if outcome.is_ok() {
                    break;
                }
                outcome = pjp.proceed().await;
            }
            outcome
        }
    }

    #[tokio::test]
    async fn test_around_retry() {
        let interceptor = build(vec![AdviceDeclaration::new(
            "Retry",
            "Pointcuts.allOrder()",
            AdviceHandler::around(Retry { attempts: 3 }),
        )]);

        let calls = &AtomicUsize::new(0);
        let result: Result<String, InterceptError<OrderError>> = interceptor
            .intercept(&order_item(), Arguments::new(), || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(OrderError("flaky".into()))
                } else {
                    Ok("ordered".to_string())
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ordered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_intercept_once_rejects_second_proceed() {
        let interceptor = build(vec![AdviceDeclaration::new(
            "Retry",
            "Pointcuts.allOrder()",
            AdviceHandler::around(Retry { attempts: 2 }),
        )]);

        let item = String::from("itemA");
        let result: Result<String, InterceptError<OrderError>> = interceptor
            .intercept_once(&order_item(), Arguments::new(), move || async move {
                Err(OrderError(item))
            })
            .await;
        match result.unwrap_err().as_aop() {
            Some(AopError::TargetConsumed { signature }) => {
                assert_eq!(signature, "String hello.aop.order.OrderService.orderItem(String)")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    struct WrongType;

    #[async_trait]
    impl AroundAdvice for WrongType {
        async fn around(&self, pjp: ProceedingJoinPoint<'_>) -> Outcome {
            pjp.proceed().await?;
            Ok(ReturnValue::new(42u32))
        }
    }

    #[tokio::test]
    async fn test_around_return_type_mismatch() {
        let log = log();
        let interceptor = build(vec![AdviceDeclaration::new(
            "Broken",
            "Pointcuts.allOrder()",
            AdviceHandler::around(WrongType),
        )]);

        let err = order(&interceptor, &log, "itemA").await.unwrap_err();
        match err.as_aop() {
            Some(AopError::Advice(advice)) => {
                assert_eq!(advice.aspect(), "Broken");
                assert_eq!(advice.advice_type(), AdviceType::Around);
                assert!(advice.cause().is::<ReturnTypeMismatch>());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    struct Guard;

    #[async_trait]
    impl AroundAdvice for Guard {
        async fn around(&self, pjp: ProceedingJoinPoint<'_>) -> Outcome {
            match pjp.join_point().arg::<String>(0) {
                Some(item) if item.is_empty() => Err(pjp.fail("empty item")),
                _ => pjp.proceed().await,
            }
        }
    }

    #[tokio::test]
    async fn test_around_failure_names_the_advice() {
        let log = log();
        let interceptor = build(vec![AdviceDeclaration::new(
            "Guard",
            "Pointcuts.allOrder()",
            AdviceHandler::around(Guard),
        )]);

        let err = order(&interceptor, &log, "").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "around advice of aspect `Guard` failed at String hello.aop.order.OrderService.orderItem(String): empty item"
        );
        assert!(entries(&log).is_empty());
        assert!(order(&interceptor, &log, "itemA").await.is_ok());
    }

    #[tokio::test]
    async fn test_chain_is_cached_per_signature() {
        let log = log();
        let interceptor = build(vec![AdviceDeclaration::new(
            "Log",
            "Pointcuts.allOrder()",
            recording_before(&log, "before"),
        )]);

        let first = interceptor.chain_for(&order_item());
        let second = interceptor.chain_for(&order_item());
        assert!(Arc::ptr_eq(&first, &second));
        interceptor.chain_for(&repository_save());
        assert_eq!(interceptor.cached_chains(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_interception() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counting: AdviceHandler = {
            let counter = Arc::clone(&counter);
            AdviceHandler::before_fn(move |_| -> AdviceResult {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        let interceptor = Arc::new(build(vec![AdviceDeclaration::new(
            "Count",
            "Pointcuts.allOrder()",
            counting,
        )]));

        let signature = order_item();
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let interceptor = Arc::clone(&interceptor);
                let signature = Arc::clone(&signature);
                tokio::spawn(async move {
                    interceptor
                        .intercept(&signature, Arguments::new().with(i), || async move {
                            Ok::<_, OrderError>(i * 2)
                        })
                        .await
                })
            })
            .collect();

        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap().unwrap(), i * 2);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert_eq!(interceptor.cached_chains(), 1);
    }
}
