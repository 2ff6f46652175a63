//! 通配符模式
//!
//! - `*` 匹配单个名称段中的任意字符（不跨越 `.`）
//! - 类型路径中的 `..` 匹配零个或多个包名段
//! - 参数列表中的 `..` 匹配零个或多个任意类型的参数

use crate::signature::simple_name;
use regex::Regex;
use std::fmt;

/// 单个名称段的通配符模式，例如 `hel*`、`*Service`
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    /// 不含 `*` 时为 None，直接比较字符串
    regex: Option<Regex>,
}

impl NamePattern {
    pub fn new(glob: &str) -> Result<Self, String> {
        if glob.is_empty() {
            return Err("empty name pattern".to_string());
        }
        if glob.contains("**") {
            return Err(format!("`**` is not a valid glob in `{}`", glob));
        }
        if let Some(c) = glob
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '$' | '*' | '[' | ']')))
        {
            return Err(format!("unexpected character `{}` in `{}`", c, glob));
        }
        let stem = glob.trim_end_matches("[]");
        if stem.is_empty() || stem.contains('[') || stem.contains(']') {
            return Err(format!("misplaced brackets in `{}`", glob));
        }

        if !glob.contains('*') {
            return Ok(Self {
                source: glob.to_string(),
                regex: None,
            });
        }

        // 将 * 转换为不跨越 `.` 的正则片段
        let body = glob
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("[^.]*");
        let regex = Regex::new(&format!("^{}$", body))
            .map_err(|e| format!("invalid glob `{}`: {}", glob, e))?;

        Ok(Self {
            source: glob.to_string(),
            regex: Some(regex),
        })
    }

    /// 是否为单独的 `*`
    pub fn is_wildcard(&self) -> bool {
        self.source == "*"
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(name),
            None => self.source == name,
        }
    }
}

impl fmt::Debug for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamePattern({})", self.source)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// 点分路径中的一段
#[derive(Debug, Clone)]
pub enum PathSegment {
    Name(NamePattern),
    /// `..`：零个或多个包名段
    AnyPackages,
}

/// 把 `hello.aop..*Service` 这样的路径拆成段
pub(crate) fn split_path(path: &str) -> Result<Vec<PathSegment>, String> {
    let mut segments = Vec::new();
    let mut rest = path;

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("..") {
            if !matches!(segments.last(), Some(PathSegment::Name(_))) {
                return Err(format!("misplaced `..` in `{}`", path));
            }
            segments.push(PathSegment::AnyPackages);
            rest = tail;
            continue;
        }

        if let Some(tail) = rest.strip_prefix('.') {
            if !matches!(segments.last(), Some(PathSegment::Name(_))) || tail.is_empty() {
                return Err(format!("misplaced `.` in `{}`", path));
            }
            rest = tail;
            continue;
        }

        let end = rest.find('.').unwrap_or(rest.len());
        let (name, tail) = rest.split_at(end);
        segments.push(PathSegment::Name(NamePattern::new(name)?));
        rest = tail;
    }

    if segments.is_empty() {
        return Err("empty path".to_string());
    }
    Ok(segments)
}

/// 类型模式
///
/// 不含 `.` 的模式（如 `*Service`、`String`）匹配类型的简单名；
/// 含 `.` 或 `..` 的模式匹配完整限定名。
#[derive(Clone)]
pub struct TypePattern {
    segments: Vec<PathSegment>,
    qualified: bool,
}

impl TypePattern {
    /// 解析类型模式，结尾的 `..` 视为 `..*`
    pub fn parse(path: &str) -> Result<Self, String> {
        Self::from_segments(split_path(path)?)
    }

    pub(crate) fn from_segments(mut segments: Vec<PathSegment>) -> Result<Self, String> {
        if segments.is_empty() {
            return Err("empty type pattern".to_string());
        }
        if matches!(segments.last(), Some(PathSegment::AnyPackages)) {
            segments.push(PathSegment::Name(NamePattern::new("*")?));
        }
        let qualified = segments.len() > 1;
        Ok(Self {
            segments,
            qualified,
        })
    }

    /// 是否包含子包（模式中出现 `..`）
    pub fn includes_subpackages(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, PathSegment::AnyPackages))
    }

    /// 是否为单独的 `*`
    pub fn is_wildcard(&self) -> bool {
        matches!(self.segments.as_slice(), [PathSegment::Name(name)] if name.is_wildcard())
    }

    pub fn matches(&self, type_name: &str) -> bool {
        if !self.qualified {
            return match_segments(&self.segments, &[simple_name(type_name)]);
        }
        let parts: Vec<&str> = type_name.split('.').collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[PathSegment], parts: &[&str]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((PathSegment::AnyPackages, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((PathSegment::Name(name), rest)) => match parts.split_first() {
            Some((head, tail)) => name.matches(head) && match_segments(rest, tail),
            None => false,
        },
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut previous_was_name = false;
        for segment in &self.segments {
            match segment {
                PathSegment::Name(name) => {
                    if previous_was_name {
                        f.write_str(".")?;
                    }
                    write!(f, "{}", name)?;
                    previous_was_name = true;
                }
                PathSegment::AnyPackages => {
                    f.write_str("..")?;
                    previous_was_name = false;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypePattern({})", self)
    }
}

/// 参数列表中的一项
#[derive(Debug, Clone)]
pub enum ParamSegment {
    /// 指定类型
    Exact(TypePattern),
    /// `*`：恰好一个任意类型的参数
    Any,
    /// `..`：零个或多个任意类型的参数
    AnyRemaining,
}

/// 参数列表模式：`()`、`(*)`、`(..)`、`(String, ..)` 等
#[derive(Debug, Clone, Default)]
pub struct ParamPattern {
    segments: Vec<ParamSegment>,
}

impl ParamPattern {
    pub fn new(segments: Vec<ParamSegment>) -> Self {
        Self { segments }
    }

    /// `(..)`
    pub fn any() -> Self {
        Self::new(vec![ParamSegment::AnyRemaining])
    }

    pub fn segments(&self) -> &[ParamSegment] {
        &self.segments
    }

    pub fn matches<S: AsRef<str>>(&self, parameter_types: &[S]) -> bool {
        match_params(&self.segments, parameter_types)
    }
}

fn match_params<S: AsRef<str>>(pattern: &[ParamSegment], params: &[S]) -> bool {
    match pattern.split_first() {
        None => params.is_empty(),
        Some((ParamSegment::AnyRemaining, rest)) => {
            (0..=params.len()).any(|skip| match_params(rest, &params[skip..]))
        }
        Some((ParamSegment::Any, rest)) => {
            !params.is_empty() && match_params(rest, &params[1..])
        }
        Some((ParamSegment::Exact(ty), rest)) => match params.split_first() {
            Some((head, tail)) => ty.matches(head.as_ref()) && match_params(rest, tail),
            None => false,
        },
    }
}

impl fmt::Display for ParamPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment {
                ParamSegment::Exact(ty) => ty.to_string(),
                ParamSegment::Any => "*".to_string(),
                ParamSegment::AnyRemaining => "..".to_string(),
            })
            .collect();
        write!(f, "({})", rendered.join(", "))
    }
}
