//! 方法签名（Signature）模型
//!
//! 以与语言无关的方式描述一个可调用方法：声明类型、方法名、参数类型、
//! 返回类型以及声明类型的祖先类型

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 没有返回值的方法使用的返回类型名
pub const VOID: &str = "void";

/// 方法可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Package,
    Private,
}

impl Visibility {
    /// 解析切点表达式中的修饰符关键字
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "public" => Some(Visibility::Public),
            "protected" => Some(Visibility::Protected),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Protected => write!(f, "protected"),
            Visibility::Package => write!(f, "package"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// 方法签名
///
/// 不可变值，一个方法只需创建一次，之后通过 `Arc<Signature>` 共享。
/// 相等性与哈希只取决于 `(声明类型, 方法名, 参数类型)`。
#[derive(Clone)]
pub struct Signature {
    declaring_type: String,
    method_name: String,
    parameter_types: Vec<String>,
    return_type: String,
    visibility: Visibility,
    supertypes: BTreeSet<String>,
    declared_in: BTreeSet<String>,
}

impl Signature {
    /// 创建签名构建器
    ///
    /// `declaring_type` 为完整限定名，例如 `hello.aop.order.OrderService`
    pub fn builder(
        declaring_type: impl Into<String>,
        method_name: impl Into<String>,
    ) -> SignatureBuilder {
        SignatureBuilder {
            signature: Signature {
                declaring_type: declaring_type.into(),
                method_name: method_name.into(),
                parameter_types: Vec::new(),
                return_type: VOID.to_string(),
                visibility: Visibility::Public,
                supertypes: BTreeSet::new(),
                declared_in: BTreeSet::new(),
            },
        }
    }

    /// 声明类型的完整限定名
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// 声明类型的包名（顶层类型返回空字符串）
    pub fn package(&self) -> &str {
        self.declaring_type
            .rsplit_once('.')
            .map(|(package, _)| package)
            .unwrap_or("")
    }

    /// 声明类型的简单名
    pub fn simple_type_name(&self) -> &str {
        simple_name(&self.declaring_type)
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// 所有祖先类型（直接与间接）
    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.supertypes.iter().map(String::as_str)
    }

    /// 同样声明了该方法的祖先类型
    pub fn declared_in(&self) -> impl Iterator<Item = &str> {
        self.declared_in.iter().map(String::as_str)
    }

    /// 检查 `type_name` 是否是声明类型的祖先
    pub fn is_subtype_of(&self, type_name: &str) -> bool {
        self.supertypes.contains(type_name)
    }

    /// 检查方法是否在 `type_name` 上声明（声明类型本身或声明了该方法的祖先）
    pub fn is_declared_on(&self, type_name: &str) -> bool {
        self.declaring_type == type_name || self.declared_in.contains(type_name)
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type
            && self.method_name == other.method_name
            && self.parameter_types == other.parameter_types
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.method_name.hash(state);
        self.parameter_types.hash(state);
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}({})",
            simple_name(&self.return_type),
            self.declaring_type,
            self.method_name,
            self.parameter_types
                .iter()
                .map(|ty| simple_name(ty))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("declaring_type", &self.declaring_type)
            .field("method_name", &self.method_name)
            .field("parameter_types", &self.parameter_types)
            .field("return_type", &self.return_type)
            .field("visibility", &self.visibility)
            .field("supertypes", &self.supertypes)
            .field("declared_in", &self.declared_in)
            .finish()
    }
}

/// 签名构建器
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    signature: Signature,
}

impl SignatureBuilder {
    /// 追加一个参数类型
    pub fn param(mut self, type_name: impl Into<String>) -> Self {
        self.signature.parameter_types.push(type_name.into());
        self
    }

    /// 追加多个参数类型
    pub fn params<I, S>(mut self, type_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature
            .parameter_types
            .extend(type_names.into_iter().map(Into::into));
        self
    }

    /// 设置返回类型（默认 `void`）
    pub fn returns(mut self, type_name: impl Into<String>) -> Self {
        self.signature.return_type = type_name.into();
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.signature.visibility = visibility;
        self
    }

    /// 登记一个不声明该方法的祖先类型
    pub fn extends(mut self, type_name: impl Into<String>) -> Self {
        self.signature.supertypes.insert(type_name.into());
        self
    }

    /// 登记一个同样声明了该方法的祖先类型（例如实现的接口）
    pub fn declared_in(mut self, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        self.signature.supertypes.insert(type_name.clone());
        self.signature.declared_in.insert(type_name);
        self
    }

    pub fn build(self) -> Arc<Signature> {
        Arc::new(self.signature)
    }
}

/// 取限定名的最后一段
pub(crate) fn simple_name(type_name: &str) -> &str {
    type_name
        .rsplit_once('.')
        .map(|(_, name)| name)
        .unwrap_or(type_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn hello() -> Arc<Signature> {
        Signature::builder("hello.aop.member.MemberServiceImpl", "hello")
            .param("java.lang.String")
            .returns("java.lang.String")
            .declared_in("hello.aop.member.MemberService")
            .build()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            hello().to_string(),
            "String hello.aop.member.MemberServiceImpl.hello(String)"
        );
    }

    #[test]
    fn test_package_and_simple_name() {
        let sig = hello();
        assert_eq!(sig.package(), "hello.aop.member");
        assert_eq!(sig.simple_type_name(), "MemberServiceImpl");

        let top_level = Signature::builder("Main", "run").build();
        assert_eq!(top_level.package(), "");
        assert_eq!(top_level.return_type(), VOID);
    }

    #[test]
    fn test_declared_on() {
        let sig = hello();
        assert!(sig.is_declared_on("hello.aop.member.MemberServiceImpl"));
        assert!(sig.is_declared_on("hello.aop.member.MemberService"));
        assert!(sig.is_subtype_of("hello.aop.member.MemberService"));

        let internal = Signature::builder("hello.aop.member.MemberServiceImpl", "internal")
            .param("String")
            .extends("hello.aop.member.MemberService")
            .build();
        assert!(internal.is_subtype_of("hello.aop.member.MemberService"));
        assert!(!internal.is_declared_on("hello.aop.member.MemberService"));
    }

    #[test]
    fn test_identity_ignores_return_type_and_ancestry() {
        let a = Signature::builder("demo.OrderService", "orderItem")
            .param("String")
            .returns("String")
            .build();
        let b = Signature::builder("demo.OrderService", "orderItem")
            .param("String")
            .extends("demo.Base")
            .build();
        let c = Signature::builder("demo.OrderService", "orderItem")
            .params(["String", "int"])
            .build();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Signature> = [(*a).clone(), (*b).clone(), (*c).clone()]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }
}
