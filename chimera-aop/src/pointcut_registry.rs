//! 命名切点注册表
//!
//! 保存可复用的命名切点，并在构建阶段把引用展开为完整的谓词树

use crate::error::{AopError, AopResult, UnresolvedPointcutError};
use crate::pointcut::PointcutExpression;
use std::collections::HashMap;

/// 已注册的命名切点
#[derive(Debug, Clone)]
struct NamedPointcut {
    source: String,
    expression: PointcutExpression,
}

/// 切点注册表
///
/// 名称区分大小写且唯一。引用既可以写完整名称（`hello.aop.order.aop.Pointcuts.allOrder()`），
/// 也可以写相对于引用方作用域的短名称（在 `Pointcuts.orderAndService` 中写 `allOrder()`，
/// 在切面 `hello.aop.order.aop.AspectV4` 中写 `Pointcuts.allOrder()`）。
#[derive(Debug, Clone, Default)]
pub struct PointcutRegistry {
    entries: HashMap<String, NamedPointcut>,
    /// 注册顺序
    names: Vec<String>,
}

impl PointcutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命名切点
    ///
    /// 表达式立即解析；引用的切点可以稍后再注册
    pub fn register(&mut self, name: impl Into<String>, expression: &str) -> AopResult<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(AopError::DuplicatePointcut(name));
        }

        let parsed = PointcutExpression::parse(expression)?;
        tracing::debug!("Registering pointcut: {} = {}", name, expression);

        self.entries.insert(
            name.clone(),
            NamedPointcut {
                source: expression.to_string(),
                expression: parsed,
            },
        );
        self.names.push(name);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 获取未展开的切点表达式
    pub fn get(&self, name: &str) -> Option<&PointcutExpression> {
        self.entries.get(name).map(|entry| &entry.expression)
    }

    /// 获取切点的原始表达式文本
    pub fn source(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.source.as_str())
    }

    /// 按注册顺序返回所有名称
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 查找引用对应的注册名
    ///
    /// 从最内层作用域向外逐级尝试 `作用域.名称`，最后按完整名称查找
    pub fn lookup(&self, name: &str, scope: Option<&str>) -> Option<&str> {
        let mut scope = scope;
        while let Some(current) = scope {
            let candidate = format!("{}.{}", current, name);
            if let Some((key, _)) = self.entries.get_key_value(candidate.as_str()) {
                return Some(key.as_str());
            }
            scope = scope_of(current);
        }
        self.entries
            .get_key_value(name)
            .map(|(key, _)| key.as_str())
    }

    /// 展开表达式中的所有引用
    ///
    /// `scope` 为引用方所在的作用域（通常是切面名），`referenced_from` 用于错误信息。
    /// 同一命名切点只展开一次，多处引用共享同一棵子树
    pub fn resolve(
        &self,
        expression: &PointcutExpression,
        scope: Option<&str>,
        referenced_from: &str,
    ) -> Result<PointcutExpression, UnresolvedPointcutError> {
        Resolver::new(self).resolve(expression, scope, referenced_from)
    }

    /// 展开命名切点
    pub fn resolve_named(&self, name: &str) -> Result<PointcutExpression, UnresolvedPointcutError> {
        Resolver::new(self).resolve_named(name)
    }

    /// 校验所有命名切点的引用都能解析且没有循环
    pub fn validate(&self) -> Result<(), UnresolvedPointcutError> {
        let mut resolver = Resolver::new(self);
        for name in &self.names {
            resolver.resolve_named(name)?;
        }
        Ok(())
    }
}

/// 引用展开的工作状态
///
/// `stack` 为正在展开的名称链，用于检测循环；`resolved` 缓存已展开的命名切点
struct Resolver<'r> {
    registry: &'r PointcutRegistry,
    stack: Vec<String>,
    resolved: HashMap<String, PointcutExpression>,
}

impl<'r> Resolver<'r> {
    fn new(registry: &'r PointcutRegistry) -> Self {
        Self {
            registry,
            stack: Vec::new(),
            resolved: HashMap::new(),
        }
    }

    fn resolve_named(&mut self, name: &str) -> Result<PointcutExpression, UnresolvedPointcutError> {
        self.resolve(&PointcutExpression::Reference(name.to_string()), None, name)
    }

    fn resolve(
        &mut self,
        expression: &PointcutExpression,
        scope: Option<&str>,
        referenced_from: &str,
    ) -> Result<PointcutExpression, UnresolvedPointcutError> {
        match expression {
            PointcutExpression::Reference(name) => {
                let registry = self.registry;
                let resolved = registry.lookup(name, scope).ok_or_else(|| {
                    UnresolvedPointcutError::Dangling {
                        name: name.clone(),
                        referenced_from: referenced_from.to_string(),
                    }
                })?;

                if let Some(expanded) = self.resolved.get(resolved) {
                    return Ok(expanded.clone());
                }

                if let Some(start) = self.stack.iter().position(|entry| entry == resolved) {
                    let mut path = self.stack[start..].to_vec();
                    path.push(resolved.to_string());
                    return Err(UnresolvedPointcutError::Cycle { path });
                }

                let target = &registry.entries[resolved].expression;
                self.stack.push(resolved.to_string());
                let expanded = self.resolve(target, scope_of(resolved), resolved);
                self.stack.pop();

                let expanded = expanded?;
                self.resolved.insert(resolved.to_string(), expanded.clone());
                Ok(expanded)
            }
            PointcutExpression::And(left, right) => {
                let left = self.resolve(left, scope, referenced_from)?;
                Ok(left.and(self.resolve(right, scope, referenced_from)?))
            }
            PointcutExpression::Or(left, right) => {
                let left = self.resolve(left, scope, referenced_from)?;
                Ok(left.or(self.resolve(right, scope, referenced_from)?))
            }
            PointcutExpression::Not(inner) => {
                Ok(self.resolve(inner, scope, referenced_from)?.not())
            }
            leaf => Ok(leaf.clone()),
        }
    }
}

/// 命名切点的作用域：去掉最后一段后的前缀
fn scope_of(name: &str) -> Option<&str> {
    name.rsplit_once('.').map(|(scope, _)| scope)
}
