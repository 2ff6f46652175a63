//! Chimera AOP 过程宏
//!
//! 提供 `#[aop]` 属性宏，把方法调用交给全局拦截器执行

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, ItemFn};

mod aop_method;
mod utils;

/// `#[aop]` 属性宏
///
/// 为方法自动应用 AOP 切面，类似 Spring Boot 的声明式 AOP。
/// 方法必须是 `async fn`，返回 `Result<T, E>`，且 `E: From<chimera_aop::AopError>`。
///
/// 参数：
/// - 第一个参数为声明类型的完整名称
/// - `name = "..."`：方法名（默认取函数名）
/// - `declared_in = "..."`：声明了该方法的父类型，可重复
/// - `extends = "..."`：其他父类型，可重复
/// - `visibility = "public" | "protected" | "package" | "private"`：默认按 Rust 可见性推断
/// - `capture_args`：把参数的克隆放入连接点（借用参数取 `to_owned()` 的结果）
///
/// 参数与返回类型按路径记为点分名称，泛型参数被擦除：
/// `Vec<String>` 在切点中写作 `Vec`，`&[u8]` 写作 `u8[]`。
///
/// 使用示例：
/// ```ignore
/// impl OrderService {
///     #[aop("hello.aop.order.OrderService", name = "orderItem", capture_args)]
///     pub async fn order_item(&self, item_id: String) -> Result<(), OrderError> {
///         // 业务逻辑
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn aop(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as aop_method::AopArgs);
    let item_fn = parse_macro_input!(item as ItemFn);

    aop_method::impl_aop_method(args, item_fn)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
