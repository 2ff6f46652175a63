//! 工具函数

use quote::ToTokens;
use syn::{GenericArgument, PathArguments, Type};

/// 将 Rust 类型渲染为切点使用的类型名
///
/// 引用被去掉，`()` 为 `void`，切片与数组写作 `T[]`，路径以 `.` 分隔。
/// 泛型参数被擦除（`Vec<String>` 记为 `Vec`），切点语法可以直接写出这些名称
pub fn type_name(ty: &Type) -> String {
    match ty {
        Type::Reference(reference) => type_name(&reference.elem),
        Type::Paren(paren) => type_name(&paren.elem),
        Type::Group(group) => type_name(&group.elem),
        Type::Tuple(tuple) if tuple.elems.is_empty() => "void".to_string(),
        Type::Slice(slice) => format!("{}[]", type_name(&slice.elem)),
        Type::Array(array) => format!("{}[]", type_name(&array.elem)),
        Type::Path(path) if path.qself.is_none() => path
            .path
            .segments
            .iter()
            .map(|segment| segment.ident.to_string())
            .collect::<Vec<_>>()
            .join("."),
        other => other.to_token_stream().to_string().replace(' ', ""),
    }
}

/// 取出 `Result<T, E>` 中的 `T`
pub fn result_ok_type(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(generics) => generics.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    }
}
