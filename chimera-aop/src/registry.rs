//! 切面注册表
//!
//! 负责在启动阶段收集命名切点与通知声明，并构建不可变的拦截器

use crate::advice::AdviceDeclaration;
use crate::aspect::Aspect;
use crate::chain::Advisor;
use crate::error::{AopError, AopResult, InterceptError};
use crate::interceptor::AopInterceptor;
use crate::joinpoint::Arguments;
use crate::manifest::{AspectManifest, HandlerCatalog};
use crate::pointcut::PointcutExpression;
use crate::pointcut_registry::PointcutRegistry;
use crate::signature::Signature;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

/// 全局拦截器
///
/// 首次使用时加载所有通过 inventory 注册的切面
static GLOBAL_INTERCEPTOR: OnceCell<AopInterceptor> = OnceCell::new();

/// 获取全局拦截器
///
/// 构建失败时返回错误，下次调用会重新尝试
///
/// 使用示例：
/// ```ignore
/// use chimera_aop::global_interceptor;
///
/// let interceptor = global_interceptor()?;
/// interceptor.intercept(&SIGNATURE, Arguments::new(), || async {
///     // your code here
/// }).await
/// ```
pub fn global_interceptor() -> AopResult<&'static AopInterceptor> {
    GLOBAL_INTERCEPTOR.get_or_try_init(|| {
        let mut registry = AspectRegistry::new();
        registry.auto_load_aspects()?;
        registry.build()
    })
}

/// 通过全局拦截器执行一次调用
///
/// `#[aop]` 生成的调用点使用此函数；AOP 错误折叠进目标方法的错误类型
pub async fn intercept_global<T, E, F, Fut>(
    signature: &Arc<Signature>,
    args: Arguments,
    thunk: F,
) -> Result<T, E>
where
    T: Any + Send + Sync,
    E: Error + From<AopError> + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
{
    let interceptor = global_interceptor()?;
    interceptor
        .intercept_once(signature, args, thunk)
        .await
        .map_err(InterceptError::flatten)
}

/// 待构建的通知
struct PendingAdvice {
    declaration: AdviceDeclaration,
    expression: PointcutExpression,
}

/// 切面注册表
///
/// 启动阶段可变；[`build`](Self::build) 之后得到不可变的 [`AopInterceptor`]
#[derive(Default)]
pub struct AspectRegistry {
    pointcuts: PointcutRegistry,
    advices: Vec<PendingAdvice>,
}

impl AspectRegistry {
    /// 创建新的切面注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命名切点
    pub fn register_pointcut(
        &mut self,
        name: impl Into<String>,
        expression: &str,
    ) -> AopResult<()> {
        self.pointcuts.register(name, expression)
    }

    /// 注册通知
    ///
    /// 切点表达式立即解析，引用在 [`build`](Self::build) 时解析
    pub fn register_advice(&mut self, declaration: AdviceDeclaration) -> AopResult<()> {
        let expression = PointcutExpression::parse(declaration.pointcut())?;
        tracing::debug!(
            "Registering {} advice of aspect {}: {}",
            declaration.kind(),
            declaration.aspect(),
            declaration.pointcut()
        );
        self.advices.push(PendingAdvice {
            declaration,
            expression,
        });
        Ok(())
    }

    /// 注册切面
    pub fn register_aspect(&mut self, aspect: &dyn Aspect) -> AopResult<()> {
        tracing::debug!("Registering aspect: {}", aspect.name());
        aspect.configure(self)
    }

    /// 应用切面清单
    pub fn apply_manifest(
        &mut self,
        manifest: &AspectManifest,
        catalog: &HandlerCatalog,
    ) -> AopResult<()> {
        for pointcut in &manifest.pointcuts {
            self.register_pointcut(pointcut.name.clone(), &pointcut.expression)?;
        }
        for advice in &manifest.advices {
            let handler = catalog.resolve(&advice.handler, advice.kind)?;
            self.register_advice(
                AdviceDeclaration::new(advice.aspect.clone(), advice.pointcut.clone(), handler)
                    .order(advice.order),
            )?;
        }
        tracing::info!(
            "Applied aspect manifest: {} pointcut(s), {} advice(s)",
            manifest.pointcuts.len(),
            manifest.advices.len()
        );
        Ok(())
    }

    pub fn pointcuts(&self) -> &PointcutRegistry {
        &self.pointcuts
    }

    /// 已注册的通知数量
    pub fn advice_count(&self) -> usize {
        self.advices.len()
    }

    /// 从 inventory 自动加载所有注册的切面
    ///
    /// 这个方法会扫描所有通过 `inventory::submit!` 提交的 [`AspectRegistration`](crate::AspectRegistration)
    /// 并将它们添加到切面注册表中
    ///
    /// 使用示例：
    /// ```ignore
    /// let mut registry = AspectRegistry::new();
    /// registry.auto_load_aspects()?;
    /// ```
    pub fn auto_load_aspects(&mut self) -> AopResult<usize> {
        let registrations: Vec<_> = crate::aspect::get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        for registration in &registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            let aspect = registration.create_instance();
            self.register_aspect(aspect.as_ref())?;
        }

        tracing::info!(
            "Auto-loaded {} aspect(s), {} advice(s)",
            registrations.len(),
            self.advices.len()
        );
        Ok(registrations.len())
    }

    /// 校验切点引用并构建拦截器
    pub fn build(self) -> AopResult<AopInterceptor> {
        self.pointcuts.validate()?;

        let mut advisors = Vec::with_capacity(self.advices.len());
        for (sequence, pending) in self.advices.into_iter().enumerate() {
            let declaration = pending.declaration;
            let resolved = self.pointcuts.resolve(
                &pending.expression,
                Some(declaration.aspect()),
                declaration.aspect(),
            )?;
            advisors.push(Arc::new(Advisor::new(
                declaration.aspect().to_string(),
                declaration.pointcut().to_string(),
                resolved,
                declaration.handler().clone(),
                declaration.priority(),
                sequence,
            )));
        }

        tracing::info!(
            "Built AOP interceptor with {} pointcut(s) and {} advice(s)",
            self.pointcuts.len(),
            advisors.len()
        );
        Ok(AopInterceptor::new(self.pointcuts, advisors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::AdviceHandler;
    use crate::error::UnresolvedPointcutError;

    fn noop() -> AdviceHandler {
        AdviceHandler::before_fn(|_| Ok(()))
    }

    #[test]
    fn test_build_resolves_cross_aspect_references() {
        let mut registry = AspectRegistry::new();
        registry
            .register_pointcut(
                "hello.aop.order.aop.Pointcuts.allOrder",
                "execution(* hello.aop.order..*(..))",
            )
            .unwrap();
        registry
            .register_pointcut(
                "hello.aop.order.aop.Pointcuts.allService",
                "execution(* *..*Service.*(..))",
            )
            .unwrap();
        // 完整名称
        registry
            .register_advice(AdviceDeclaration::new(
                "hello.aop.order.aop.AspectV4Pointcut",
                "hello.aop.order.aop.Pointcuts.allOrder()",
                noop(),
            ))
            .unwrap();
        // 相对切面所在包的名称
        registry
            .register_advice(AdviceDeclaration::new(
                "hello.aop.order.aop.AspectV4Pointcut",
                "Pointcuts.allOrder() && Pointcuts.allService()",
                noop(),
            ))
            .unwrap();
        assert_eq!(registry.advice_count(), 2);

        let interceptor = registry.build().unwrap();
        let repository = Signature::builder("hello.aop.order.OrderRepository", "save")
            .param("String")
            .build();
        let matched: Vec<_> = interceptor
            .advisors()
            .iter()
            .map(|advisor| advisor.matches(&repository))
            .collect();
        assert_eq!(matched, vec![true, false]);
    }

    #[test]
    fn test_parse_error_at_registration() {
        let mut registry = AspectRegistry::new();
        let err = registry
            .register_advice(AdviceDeclaration::new("Log", "execution(* *(..)", noop()))
            .unwrap_err();
        assert!(matches!(err, AopError::Parse(_)));
        assert_eq!(registry.advice_count(), 0);
    }

    #[test]
    fn test_dangling_advice_reference() {
        let mut registry = AspectRegistry::new();
        registry
            .register_advice(AdviceDeclaration::new("Log", "allOrder()", noop()))
            .unwrap();
        match registry.build() {
            Err(AopError::Unresolved(UnresolvedPointcutError::Dangling {
                name,
                referenced_from,
            })) => {
                assert_eq!(name, "allOrder");
                assert_eq!(referenced_from, "Log");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_cycle_fails_build() {
        let mut registry = AspectRegistry::new();
        registry.register_pointcut("P.a", "b()").unwrap();
        registry.register_pointcut("P.b", "a()").unwrap();
        assert!(matches!(
            registry.build(),
            Err(AopError::Unresolved(UnresolvedPointcutError::Cycle { .. }))
        ));
    }
}
