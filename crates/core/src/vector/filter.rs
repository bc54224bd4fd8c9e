//! Attribute filter expressions
//!
//! A small SQL-style `WHERE` language evaluated per feature:
//!
//! ```text
//! expr    := or
//! or      := and ( OR and )*
//! and     := not ( AND not )*
//! not     := NOT not | pred
//! pred    := sum [ cmp sum | IS [NOT] NULL | [NOT] IN ( sum, ... )
//!                | [NOT] LIKE sum | [NOT] BETWEEN sum AND sum ]
//! sum     := product ( (+|-) product )*
//! product := unary ( (*|/) unary )*
//! unary   := - unary | primary
//! primary := number | 'string' | NULL | TRUE | FALSE | field | "field" | ( expr )
//! ```
//!
//! Comparisons involving NULL are unknown, and a feature only passes the
//! filter when the expression is definitely true.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature};

/// Runtime value of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl Value {
    fn from_attribute(attr: &AttributeValue) -> Self {
        match attr {
            AttributeValue::Null => Value::Null,
            AttributeValue::Bool(b) => Value::Bool(*b),
            AttributeValue::Int(v) => Value::Num(*v as f64),
            AttributeValue::Float(v) => Value::Num(*v),
            AttributeValue::String(s) => Value::Str(s.clone()),
        }
    }

    fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    fn truth(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(*b),
            Value::Num(v) => Some(*v != 0.0),
            Value::Str(s) => Some(!s.is_empty()),
        }
    }

    fn from_truth(t: Option<bool>) -> Self {
        t.map_or(Value::Null, Value::Bool)
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Str(a), b) | (b, Value::Str(a)) if a.trim().parse::<f64>().is_err() => {
                // Non-numeric text compared with a number: compare as text
                let b = match b {
                    Value::Num(v) => v.to_string(),
                    Value::Bool(v) => v.to_string(),
                    _ => return None,
                };
                let ord = a.as_str().cmp(b.as_str());
                Some(if matches!(self, Value::Str(_)) { ord } else { ord.reverse() })
            }
            _ => self.as_num()?.partial_cmp(&other.as_num()?),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn test(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    In { expr: Box<Expr>, list: Vec<Expr>, negated: bool },
    Like { expr: Box<Expr>, pattern: Box<Expr>, negated: bool },
    Between { expr: Box<Expr>, low: Box<Expr>, high: Box<Expr>, negated: bool },
}

impl Expr {
    /// Parse a complete expression
    pub fn parse(text: &str) -> Result<Expr> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            Token::Eof => Ok(expr),
            tok => Err(Error::ExpressionParse(format!(
                "unexpected {} in \"{}\"",
                tok.describe(),
                text
            ))),
        }
    }

    /// Resolve field references against a schema.
    ///
    /// Fields match case-insensitively and are rewritten to the schema's
    /// spelling. Fails on the first unknown field.
    pub fn bind(mut self, fields: &[String]) -> Result<Expr> {
        self.bind_in_place(fields)?;
        Ok(self)
    }

    fn bind_in_place(&mut self, fields: &[String]) -> Result<()> {
        match self {
            Expr::Literal(_) => Ok(()),
            Expr::Field(name) => {
                let resolved = fields
                    .iter()
                    .find(|f| f.eq_ignore_ascii_case(name))
                    .ok_or_else(|| Error::FieldNotFound(name.clone()))?;
                *name = resolved.clone();
                Ok(())
            }
            Expr::Neg(e) | Expr::Not(e) => e.bind_in_place(fields),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Compare(_, a, b) | Expr::Arith(_, a, b) => {
                a.bind_in_place(fields)?;
                b.bind_in_place(fields)
            }
            Expr::IsNull { expr, .. } => expr.bind_in_place(fields),
            Expr::In { expr, list, .. } => {
                expr.bind_in_place(fields)?;
                list.iter_mut().try_for_each(|e| e.bind_in_place(fields))
            }
            Expr::Like { expr, pattern, .. } => {
                expr.bind_in_place(fields)?;
                pattern.bind_in_place(fields)
            }
            Expr::Between { expr, low, high, .. } => {
                expr.bind_in_place(fields)?;
                low.bind_in_place(fields)?;
                high.bind_in_place(fields)
            }
        }
    }

    /// Whether the feature passes the filter
    pub fn matches(&self, feature: &Feature) -> bool {
        self.evaluate(feature).truth() == Some(true)
    }

    /// Evaluate against a feature's attributes. Missing attributes are NULL.
    pub fn evaluate(&self, feature: &Feature) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Field(name) => feature
                .get_property(name)
                .map_or(Value::Null, Value::from_attribute),
            Expr::Neg(e) => match e.evaluate(feature).as_num() {
                Some(v) => Value::Num(-v),
                None => Value::Null,
            },
            Expr::Not(e) => Value::from_truth(e.evaluate(feature).truth().map(|b| !b)),
            Expr::And(a, b) => {
                let (a, b) = (a.evaluate(feature).truth(), b.evaluate(feature).truth());
                Value::from_truth(match (a, b) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                })
            }
            Expr::Or(a, b) => {
                let (a, b) = (a.evaluate(feature).truth(), b.evaluate(feature).truth());
                Value::from_truth(match (a, b) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                })
            }
            Expr::Compare(op, a, b) => {
                let ord = a.evaluate(feature).compare(&b.evaluate(feature));
                Value::from_truth(ord.map(|o| op.test(o)))
            }
            Expr::Arith(op, a, b) => {
                let (Some(a), Some(b)) = (a.evaluate(feature).as_num(), b.evaluate(feature).as_num())
                else {
                    return Value::Null;
                };
                match op {
                    ArithOp::Add => Value::Num(a + b),
                    ArithOp::Sub => Value::Num(a - b),
                    ArithOp::Mul => Value::Num(a * b),
                    ArithOp::Div if b == 0.0 => Value::Null,
                    ArithOp::Div => Value::Num(a / b),
                }
            }
            Expr::IsNull { expr, negated } => {
                let is_null = expr.evaluate(feature) == Value::Null;
                Value::Bool(is_null != *negated)
            }
            Expr::In { expr, list, negated } => {
                let v = expr.evaluate(feature);
                if v == Value::Null {
                    return Value::Null;
                }
                let found = list
                    .iter()
                    .any(|item| v.compare(&item.evaluate(feature)) == Some(Ordering::Equal));
                Value::Bool(found != *negated)
            }
            Expr::Like { expr, pattern, negated } => {
                match (expr.evaluate(feature), pattern.evaluate(feature)) {
                    (Value::Null, _) | (_, Value::Null) => Value::Null,
                    (v, p) => {
                        let matched = like(&text_of(&v), &text_of(&p));
                        Value::Bool(matched != *negated)
                    }
                }
            }
            Expr::Between { expr, low, high, negated } => {
                let v = expr.evaluate(feature);
                let lo = v.compare(&low.evaluate(feature));
                let hi = v.compare(&high.evaluate(feature));
                match (lo, hi) {
                    (Some(lo), Some(hi)) => {
                        let inside = lo != Ordering::Less && hi != Ordering::Greater;
                        Value::Bool(inside != *negated)
                    }
                    _ => Value::Null,
                }
            }
        }
    }
}

fn text_of(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Num(n) => n.to_string(),
        Value::Str(s) => s.clone(),
    }
}

/// Case-insensitive LIKE with `%` and `_` wildcards
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // Classic two-pointer wildcard match with backtracking to the last '%'
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

// Tokenizer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    QuotedIdent(String),
    Str(String),
    Num(f64),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Star,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("token '{}'", s),
            Token::QuotedIdent(s) => format!("identifier \"{}\"", s),
            Token::Str(s) => format!("string '{}'", s),
            Token::Num(n) => format!("number {}", n),
            Token::Op(op) => format!("operator '{}'", op),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Comma => "','".into(),
            Token::Star => "'*'".into(),
            Token::Eof => "end of input".into(),
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '+' | '-' | '/' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    _ => "/",
                }));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => ("=", 2),
                    ('=', _) => ("=", 1),
                    ('!', Some('=')) => ("!=", 2),
                    ('<', Some('>')) => ("!=", 2),
                    ('<', Some('=')) => ("<=", 2),
                    ('<', _) => ("<", 1),
                    ('>', Some('=')) => (">=", 2),
                    ('>', _) => (">", 1),
                    _ => {
                        return Err(Error::ExpressionParse(format!(
                            "unexpected character '{}' at offset {}",
                            c, i
                        )))
                    }
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(Error::ExpressionParse(format!(
                                "unterminated {} literal",
                                if quote == '\'' { "string" } else { "identifier" }
                            )))
                        }
                        Some(&ch) if ch == quote => {
                            // Doubled quote is an escaped quote
                            if chars.get(i + 1) == Some(&quote) {
                                value.push(quote);
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(if quote == '\'' {
                    Token::Str(value)
                } else {
                    Token::QuotedIdent(value)
                });
            }
            c if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal.parse().map_err(|_| {
                    Error::ExpressionParse(format!("invalid number '{}'", literal))
                })?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                return Err(Error::ExpressionParse(format!(
                    "unexpected character '{}' at offset {}",
                    c, i
                )))
            }
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

// Parser

const RESERVED: &[&str] = &[
    "AND", "OR", "NOT", "IS", "NULL", "IN", "LIKE", "BETWEEN", "TRUE", "FALSE", "SELECT", "FROM",
    "WHERE",
];

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let tok = self.advance();
        if tok == expected {
            Ok(())
        } else {
            Err(Error::ExpressionParse(format!(
                "expected {}, found {}",
                expected.describe(),
                tok.describe()
            )))
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("OR") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("AND") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_predicate()
    }

    fn parse_predicate(&mut self) -> Result<Expr> {
        let lhs = self.parse_sum()?;

        if let Token::Op(op) = self.peek().clone() {
            let cmp = match op {
                "=" => Some(CompareOp::Eq),
                "!=" => Some(CompareOp::Ne),
                "<" => Some(CompareOp::Lt),
                "<=" => Some(CompareOp::Le),
                ">" => Some(CompareOp::Gt),
                ">=" => Some(CompareOp::Ge),
                _ => None,
            };
            if let Some(cmp) = cmp {
                self.advance();
                let rhs = self.parse_sum()?;
                return Ok(Expr::Compare(cmp, Box::new(lhs), Box::new(rhs)));
            }
        }

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if !self.eat_keyword("NULL") {
                return Err(Error::ExpressionParse(format!(
                    "expected NULL after IS, found {}",
                    self.peek().describe()
                )));
            }
            return Ok(Expr::IsNull {
                expr: Box::new(lhs),
                negated,
            });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect(Token::LParen)?;
            let mut list = vec![self.parse_sum()?];
            while *self.peek() == Token::Comma {
                self.advance();
                list.push(self.parse_sum()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Expr::In {
                expr: Box::new(lhs),
                list,
                negated,
            });
        }
        if self.eat_keyword("LIKE") {
            let pattern = self.parse_sum()?;
            return Ok(Expr::Like {
                expr: Box::new(lhs),
                pattern: Box::new(pattern),
                negated,
            });
        }
        if self.eat_keyword("BETWEEN") {
            let low = self.parse_sum()?;
            if !self.eat_keyword("AND") {
                return Err(Error::ExpressionParse(format!(
                    "expected AND in BETWEEN, found {}",
                    self.peek().describe()
                )));
            }
            let high = self.parse_sum()?;
            return Ok(Expr::Between {
                expr: Box::new(lhs),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }
        if negated {
            return Err(Error::ExpressionParse(format!(
                "expected IN, LIKE or BETWEEN after NOT, found {}",
                self.peek().describe()
            )));
        }

        Ok(lhs)
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Token::Op("+") => ArithOp::Add,
                Token::Op("-") => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_product()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Op("/") => ArithOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if *self.peek() == Token::Op("-") {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Num(n) => Ok(Expr::Literal(Value::Num(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::QuotedIdent(name) => Ok(Expr::Field(name)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(word) => {
                if word.eq_ignore_ascii_case("NULL") {
                    Ok(Expr::Literal(Value::Null))
                } else if word.eq_ignore_ascii_case("TRUE") {
                    Ok(Expr::Literal(Value::Bool(true)))
                } else if word.eq_ignore_ascii_case("FALSE") {
                    Ok(Expr::Literal(Value::Bool(false)))
                } else if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(&word)) {
                    Err(Error::ExpressionParse(format!(
                        "unexpected keyword '{}'",
                        word
                    )))
                } else {
                    Ok(Expr::Field(word))
                }
            }
            tok => Err(Error::ExpressionParse(format!(
                "unexpected {}",
                tok.describe()
            ))),
        }
    }
}

// Entry points shared with the SELECT parser

impl Parser {
    pub(crate) fn new(text: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    pub(crate) fn keyword(&mut self, kw: &str) -> bool {
        self.eat_keyword(kw)
    }

    pub(crate) fn star(&mut self) -> bool {
        if *self.peek() == Token::Star {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn comma(&mut self) -> bool {
        if *self.peek() == Token::Comma {
            self.advance();
            true
        } else {
            false
        }
    }

    /// A bare or double-quoted identifier that is not a reserved word
    pub(crate) fn identifier(&mut self, what: &str) -> Result<String> {
        match self.advance() {
            Token::QuotedIdent(name) => Ok(name),
            Token::Ident(name) if !RESERVED.iter().any(|r| r.eq_ignore_ascii_case(&name)) => Ok(name),
            tok => Err(Error::ExpressionParse(format!(
                "expected {}, found {}",
                what,
                tok.describe()
            ))),
        }
    }

    pub(crate) fn expression(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    pub(crate) fn finish(&mut self) -> Result<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            tok => Err(Error::ExpressionParse(format!("unexpected {}", tok.describe()))),
        }
    }
}
