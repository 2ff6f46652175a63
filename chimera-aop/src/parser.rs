//! 切点表达式解析器
//!
//! 语法：
//!
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" expr ")"
//!          | "execution" "(" [modifier] return namepath "(" params ")" ")"
//!          | "within" "(" typepath ")"
//!          | refname "(" ")"
//! ```

use crate::error::ParseError;
use crate::pattern::{split_path, NamePattern, ParamPattern, ParamSegment, PathSegment, TypePattern};
use crate::pointcut::PointcutExpression;
use crate::signature::Visibility;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    Comma,
    AndAnd,
    OrOr,
    Bang,
    /// 名称、点分路径与通配符，例如 `hello.aop..*Service`、`..`、`*`
    Word(String),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '*' | '.' | '[' | ']')
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '!' => TokenKind::Bang,
            '&' | '|' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, next)) if next == c => {}
                    _ => {
                        return Err(ParseError::new(
                            expression,
                            offset,
                            format!("expected `{}{}`", c, c),
                        ))
                    }
                }
                if c == '&' {
                    TokenKind::AndAnd
                } else {
                    TokenKind::OrOr
                }
            }
            c if is_word_char(c) => {
                let mut end = offset;
                while let Some(&(i, next)) = chars.peek() {
                    if !is_word_char(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Word(expression[offset..end].to_string()),
                    offset,
                });
                continue;
            }
            other => {
                return Err(ParseError::new(
                    expression,
                    offset,
                    format!("unexpected character `{}`", other),
                ))
            }
        };

        chars.next();
        tokens.push(Token { kind, offset });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: expression.len(),
    });
    Ok(tokens)
}

/// 解析切点表达式
pub fn parse(expression: &str) -> Result<PointcutExpression, ParseError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        expression,
        tokens,
        pos: 0,
    };

    if parser.peek() == &TokenKind::Eof {
        return Err(parser.error_here("empty pointcut expression"));
    }

    let expr = parser.parse_or()?;
    match parser.peek() {
        TokenKind::Eof => Ok(expr),
        TokenKind::RParen => Err(parser.error_here("unbalanced `)`")),
        _ => Err(parser.error_here("unexpected trailing input")),
    }
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.expression, self.offset(), message)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(self.expression, offset, message)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if *self.peek() == kind {
            Ok(self.advance())
        } else if *self.peek() == TokenKind::Eof && kind == TokenKind::RParen {
            Err(self.error_here("unbalanced `(`: missing `)`"))
        } else {
            Err(self.error_here(format!("expected {}", what)))
        }
    }

    fn parse_or(&mut self) -> Result<PointcutExpression, ParseError> {
        let mut left = self.parse_and()?;
        while *self.peek() == TokenKind::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<PointcutExpression, ParseError> {
        let mut left = self.parse_unary()?;
        while *self.peek() == TokenKind::AndAnd {
            self.advance();
            let right = self.parse_unary()?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<PointcutExpression, ParseError> {
        if *self.peek() == TokenKind::Bang {
            self.advance();
            return Ok(self.parse_unary()?.not());
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<PointcutExpression, ParseError> {
        let token = self.advance();
        match token.kind {
            TokenKind::LParen => {
                let expr = self.parse_or()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            TokenKind::Word(word) => {
                if *self.peek() != TokenKind::LParen {
                    return Err(self.error_here(format!("expected `(` after `{}`", word)));
                }
                self.advance();

                match word.as_str() {
                    "execution" => self.parse_execution(),
                    "within" => self.parse_within(),
                    _ if *self.peek() == TokenKind::RParen => {
                        self.advance();
                        self.reference(word, token.offset)
                    }
                    _ => Err(self.error_at(
                        token.offset,
                        format!("unknown pointcut directive `{}`", word),
                    )),
                }
            }
            TokenKind::Eof => Err(self.error_at(token.offset, "unexpected end of expression")),
            TokenKind::RParen => Err(self.error_at(token.offset, "unbalanced `)`")),
            _ => Err(self.error_at(token.offset, "expected a pointcut")),
        }
    }

    fn reference(&self, name: String, offset: usize) -> Result<PointcutExpression, ParseError> {
        let valid = name.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        });
        if !valid {
            return Err(self.error_at(offset, format!("invalid pointcut reference `{}`", name)));
        }
        Ok(PointcutExpression::Reference(name))
    }

    /// `execution([modifier] return namepath(params))`，左括号已消费
    fn parse_execution(&mut self) -> Result<PointcutExpression, ParseError> {
        let mut words = Vec::new();
        while let TokenKind::Word(word) = self.peek().clone() {
            words.push((word, self.offset()));
            self.advance();
        }
        if *self.peek() != TokenKind::LParen {
            return Err(self.error_here("expected `(` to open the parameter list"));
        }

        let (modifier, return_word, name_word) = match words.as_slice() {
            [ret, name] => (None, ret.clone(), name.clone()),
            [modifier, ret, name] => {
                let visibility = Visibility::from_keyword(&modifier.0).ok_or_else(|| {
                    self.error_at(modifier.1, format!("unknown modifier `{}`", modifier.0))
                })?;
                (Some(visibility), ret.clone(), name.clone())
            }
            _ => {
                return Err(self.error_here(
                    "execution expects `[modifier] <return-type> <name-pattern>(<params>)`",
                ))
            }
        };

        let return_type = self.type_pattern(&return_word.0, return_word.1)?;
        let (declaring_type, method_name) = self.name_path(&name_word.0, name_word.1)?;

        self.advance();
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen, "`)` to close execution")?;

        let mut expr = PointcutExpression::ReturnType(return_type);
        if let Some(visibility) = modifier {
            expr = PointcutExpression::Modifier(visibility).and(expr);
        }
        if let Some(declaring_type) = declaring_type {
            expr = expr.and(PointcutExpression::DeclaringType(declaring_type));
        }
        Ok(expr
            .and(PointcutExpression::MethodName(method_name))
            .and(PointcutExpression::Params(params)))
    }

    /// `within(typepath)`，左括号已消费
    fn parse_within(&mut self) -> Result<PointcutExpression, ParseError> {
        let token = self.advance();
        let TokenKind::Word(word) = token.kind else {
            return Err(self.error_at(token.offset, "within expects a type pattern"));
        };
        let pattern = self.type_pattern(&word, token.offset)?;
        self.expect(TokenKind::RParen, "`)` to close within")?;
        Ok(PointcutExpression::Within(pattern))
    }

    /// 参数列表，左括号已消费，消费到右括号为止
    fn parse_params(&mut self) -> Result<ParamPattern, ParseError> {
        let mut segments = Vec::new();
        if *self.peek() == TokenKind::RParen {
            self.advance();
            return Ok(ParamPattern::new(segments));
        }

        loop {
            let token = self.advance();
            let segment = match token.kind {
                TokenKind::Word(word) if word == ".." => ParamSegment::AnyRemaining,
                TokenKind::Word(word) if word == "*" => ParamSegment::Any,
                TokenKind::Word(word) => {
                    ParamSegment::Exact(self.type_pattern(&word, token.offset)?)
                }
                TokenKind::Eof => {
                    return Err(self.error_at(token.offset, "unbalanced `(`: missing `)`"))
                }
                _ => return Err(self.error_at(token.offset, "expected a parameter type")),
            };
            segments.push(segment);

            match self.advance().kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => break,
                TokenKind::Eof => return Err(self.error_here("unbalanced `(`: missing `)`")),
                _ => return Err(self.error_here("expected `,` or `)` in parameter list")),
            }
        }

        Ok(ParamPattern::new(segments))
    }

    fn type_pattern(&self, word: &str, offset: usize) -> Result<TypePattern, ParseError> {
        TypePattern::parse(word).map_err(|message| self.error_at(offset, message))
    }

    /// 拆分 `hello.aop..*Service.order*` 为声明类型模式与方法名模式
    fn name_path(
        &self,
        word: &str,
        offset: usize,
    ) -> Result<(Option<TypePattern>, NamePattern), ParseError> {
        let mut segments = split_path(word).map_err(|message| self.error_at(offset, message))?;
        let method = match segments.pop() {
            Some(PathSegment::Name(method)) => method,
            _ => {
                return Err(self.error_at(
                    offset,
                    format!("`{}` does not end with a method name", word),
                ))
            }
        };
        if segments.is_empty() {
            return Ok((None, method));
        }
        let declaring_type = TypePattern::from_segments(segments)
            .map_err(|message| self.error_at(offset, message))?;
        Ok((Some(declaring_type), method))
    }
}
