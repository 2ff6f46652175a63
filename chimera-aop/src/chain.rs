//! 通知链构建
//!
//! 为每个签名挑选切点匹配的通知，并按优先级排序

use crate::advice::{AdviceHandler, AdviceType};
use crate::pointcut::PointcutExpression;
use crate::signature::Signature;
use std::fmt;
use std::sync::Arc;

/// 已解析的通知
///
/// 切点中的引用已全部展开
pub struct Advisor {
    aspect: String,
    source: String,
    pointcut: PointcutExpression,
    handler: AdviceHandler,
    order: i32,
    sequence: usize,
}

impl Advisor {
    pub(crate) fn new(
        aspect: String,
        source: String,
        pointcut: PointcutExpression,
        handler: AdviceHandler,
        order: i32,
        sequence: usize,
    ) -> Self {
        Self {
            aspect,
            source,
            pointcut,
            handler,
            order,
            sequence,
        }
    }

    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    /// 切点表达式原文
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 展开后的切点
    pub fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    pub fn handler(&self) -> &AdviceHandler {
        &self.handler
    }

    pub fn kind(&self) -> AdviceType {
        self.handler.kind()
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// 注册顺序，用于同优先级时保持稳定
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn matches(&self, signature: &Signature) -> bool {
        self.pointcut.matches(signature)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("aspect", &self.aspect)
            .field("kind", &self.kind())
            .field("pointcut", &self.source)
            .field("order", &self.order)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// 某个签名的通知链
///
/// 第一个元素在最外层：最先进入、最后退出
#[derive(Debug)]
pub struct AdviceChain {
    signature: Arc<Signature>,
    advisors: Vec<Arc<Advisor>>,
}

impl AdviceChain {
    /// 按 `(order, 退出阶段位次, sequence)` 排序匹配的通知
    ///
    /// 同一优先级下 AfterReturning / AfterThrowing 排在 After 之内，
    /// 退出时先于 After 执行；其余通知保持注册顺序
    pub fn build(signature: Arc<Signature>, advisors: &[Arc<Advisor>]) -> Self {
        let mut matched: Vec<Arc<Advisor>> = advisors
            .iter()
            .filter(|advisor| advisor.matches(&signature))
            .cloned()
            .collect();
        matched.sort_by_key(|advisor| {
            (advisor.order, exit_rank(advisor.kind()), advisor.sequence)
        });

        tracing::trace!(
            "Built advice chain for {}: {} advice(s)",
            signature,
            matched.len()
        );

        Self {
            signature,
            advisors: matched,
        }
    }

    pub fn signature(&self) -> &Arc<Signature> {
        &self.signature
    }

    pub fn advisors(&self) -> &[Arc<Advisor>] {
        &self.advisors
    }

    pub fn len(&self) -> usize {
        self.advisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }

    /// 按链顺序列出 `切面:通知类型`
    pub fn describe(&self) -> Vec<String> {
        self.advisors
            .iter()
            .map(|advisor| format!("{}:{}", advisor.aspect, advisor.kind()))
            .collect()
    }
}

fn exit_rank(kind: AdviceType) -> u8 {
    match kind {
        AdviceType::AfterReturning | AdviceType::AfterThrowing => 1,
        AdviceType::Before | AdviceType::Around | AdviceType::After => 0,
    }
}
