//! 切点（Pointcut）表达式系统
//!
//! 定义了如何匹配连接点的规则

use crate::error::ParseError;
use crate::pattern::{NamePattern, ParamPattern, TypePattern};
use crate::signature::{Signature, Visibility};
use std::fmt;
use std::sync::Arc;

/// 切点表达式
///
/// 由解析器编译得到的谓词树，`execution(...)` 会被编译为若干条件的 `And`。
/// 子树以 `Arc` 共享，展开命名切点时同一切点只保留一份
#[derive(Debug, Clone)]
pub enum PointcutExpression {
    /// 访问修饰符，例如 `execution(public * *(..))` 中的 `public`
    Modifier(Visibility),

    /// 返回类型
    ReturnType(TypePattern),

    /// 声明类型（同时考虑声明了该方法的父类型）
    DeclaringType(TypePattern),

    /// `within(...)`：只看声明类型本身
    Within(TypePattern),

    /// 方法名
    MethodName(NamePattern),

    /// 参数列表
    Params(ParamPattern),

    /// 与运算（AND）
    And(Arc<PointcutExpression>, Arc<PointcutExpression>),

    /// 或运算（OR）
    Or(Arc<PointcutExpression>, Arc<PointcutExpression>),

    /// 非运算（NOT）
    Not(Arc<PointcutExpression>),

    /// 引用已注册的命名切点，例如 `Pointcuts.allOrder()`
    Reference(String),
}

impl PointcutExpression {
    /// 解析切点表达式
    ///
    /// 例如：`execution(* hello.aop.order..*(..)) && !within(*Repository)`
    pub fn parse(expression: &str) -> Result<Self, ParseError> {
        crate::parser::parse(expression)
    }

    /// 检查签名是否匹配
    ///
    /// 纯函数，不会失败；未解析的引用视为不匹配
    pub fn matches(&self, signature: &Signature) -> bool {
        match self {
            PointcutExpression::Modifier(visibility) => signature.visibility() == *visibility,

            PointcutExpression::ReturnType(pattern) => pattern.matches(signature.return_type()),

            PointcutExpression::DeclaringType(pattern) => {
                // 父类型模式只匹配在父类型上声明过的方法
                pattern.matches(signature.declaring_type())
                    || signature.declared_in().any(|ty| pattern.matches(ty))
            }

            PointcutExpression::Within(pattern) => pattern.matches(signature.declaring_type()),

            PointcutExpression::MethodName(pattern) => pattern.matches(signature.method_name()),

            PointcutExpression::Params(pattern) => pattern.matches(signature.parameter_types()),

            PointcutExpression::And(left, right) => {
                left.matches(signature) && right.matches(signature)
            }

            PointcutExpression::Or(left, right) => {
                left.matches(signature) || right.matches(signature)
            }

            PointcutExpression::Not(expr) => !expr.matches(signature),

            PointcutExpression::Reference(_) => false,
        }
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Arc::new(self), Arc::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Arc::new(self), Arc::new(other))
    }

    /// 非运算
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        PointcutExpression::Not(Arc::new(self))
    }

    /// 表达式中出现的所有引用名
    pub fn references(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            PointcutExpression::Reference(name) => names.push(name),
            PointcutExpression::And(left, right) | PointcutExpression::Or(left, right) => {
                left.collect_references(names);
                right.collect_references(names);
            }
            PointcutExpression::Not(expr) => expr.collect_references(names),
            _ => {}
        }
    }
}

impl fmt::Display for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::Modifier(visibility) => write!(f, "modifier({})", visibility),
            PointcutExpression::ReturnType(p) => write!(f, "returns({})", p),
            PointcutExpression::DeclaringType(p) => write!(f, "type({})", p),
            PointcutExpression::Within(p) => write!(f, "within({})", p),
            PointcutExpression::MethodName(p) => write!(f, "method({})", p),
            PointcutExpression::Params(p) => write!(f, "params{}", p),
            PointcutExpression::And(l, r) => write!(f, "({} && {})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "({} || {})", l, r),
            PointcutExpression::Not(e) => write!(f, "!{}", e),
            PointcutExpression::Reference(name) => write!(f, "{}()", name),
        }
    }
}
