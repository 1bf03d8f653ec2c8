//! Expression parsing
//!
//! A small expression language with infix operators and builtins. Conditions, return
//! transforms, argument expressions and log-template fields are all parsed
//! here into an [`Expr`] tree and evaluated against a
//! [`Context`](crate::runner::Context) by the evaluator.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and (("or" | "||") and)*
//! and        := not (("and" | "&&") not)*
//! not        := ("not" | "!") not | comparison
//! comparison := additive (cmp_op additive)*
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/" | "//" | "%") unary)*
//! unary      := ("-" | "+") unary | power
//! power      := postfix ("**" unary)?
//! postfix    := primary ("[" or "]" | "." NAME | "(" args ")")*
//! primary    := NUMBER | STRING | NAME | "(" or ")" | "[" items "]"
//! ```

use crate::error::{ExpressionError, ExpressionResult};
use serde_json::Value;

/// Words with a meaning of their own in the expression language
pub const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "True", "False", "None", "true", "false", "null",
];

/// A parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `a < b <= c` holds when every adjacent pair holds
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    Index(Box<Expr>, Box<Expr>),
    Attribute(Box<Expr>, String),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    /// Same type and value; JSON values carry no identity
    Is,
    IsNot,
}

/// A parsed expression together with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parse an expression
    pub fn parse(source: &str) -> ExpressionResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or()?;
        match parser.peek() {
            Token::End => Ok(Expression {
                source: source.to_string(),
                root,
            }),
            other => Err(ExpressionError::syntax(
                parser.position(),
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    /// The original source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root of the parsed tree
    pub fn root(&self) -> &Expr {
        &self.root
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    End,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(n) => format!("number {}", n),
            Token::Float(n) => format!("number {}", n),
            Token::Str(s) => format!("string {:?}", s),
            Token::Name(n) => format!("name '{}'", n),
            Token::Op(op) => format!("'{}'", op),
            Token::End => "end of expression".to_string(),
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self, Token::Op(o) if *o == op)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Name(n) if n == word)
    }
}

/// Longest operators first so `**` wins over `*`
const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "(",
    ")", "[", "]", ",", ".",
];

fn tokenize(source: &str) -> ExpressionResult<Vec<(usize, Token)>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            if i + 1 < chars.len() && chars[i].1 == '.' && chars[i + 1].1.is_ascii_digit() {
                is_float = true;
                i += 1;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            }
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    is_float = true;
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let token = if is_float {
                Token::Float(
                    text.parse()
                        .map_err(|_| ExpressionError::syntax(pos, "invalid number"))?,
                )
            } else {
                match text.parse::<i64>() {
                    Ok(n) => Token::Int(n),
                    // Too large for i64, keep it as a float
                    Err(_) => Token::Float(
                        text.parse()
                            .map_err(|_| ExpressionError::syntax(pos, "invalid number"))?,
                    ),
                }
            };
            tokens.push((pos, token));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
            tokens.push((pos, Token::Name(text)));
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                let Some(&(_, ch)) = chars.get(i) else {
                    return Err(ExpressionError::syntax(pos, "unterminated string"));
                };
                i += 1;
                if ch == quote {
                    break;
                }
                if ch == '\\' {
                    let Some(&(_, escaped)) = chars.get(i) else {
                        return Err(ExpressionError::syntax(pos, "unterminated string"));
                    };
                    i += 1;
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '\'' | '"' => value.push(escaped),
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                } else {
                    value.push(ch);
                }
            }
            tokens.push((pos, Token::Str(value)));
            continue;
        }

        let rest = &source[pos..];
        match OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            Some(&op) => {
                tokens.push((pos, Token::Op(op)));
                i += op.chars().count();
            }
            None => {
                return Err(ExpressionError::syntax(
                    pos,
                    format!("unexpected character '{}'", c),
                ))
            }
        }
    }

    tokens.push((source.len(), Token::End));
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // `tokenize` always terminates the stream with `End`
        &self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].1
    }

    fn position(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.peek().is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.peek().is_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> ExpressionResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                self.position(),
                format!("expected '{}', found {}", op, self.peek().describe()),
            ))
        }
    }

    fn parse_or(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_word("or") || self.eat_op("||") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_word("and") || self.eat_op("&&") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ExpressionResult<Expr> {
        if self.eat_word("not") || self.eat_op("!") {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let (op, width) = match self.peek() {
            Token::Op("==") => (CompareOp::Eq, 1),
            Token::Op("!=") => (CompareOp::Ne, 1),
            Token::Op("<") => (CompareOp::Lt, 1),
            Token::Op("<=") => (CompareOp::Le, 1),
            Token::Op(">") => (CompareOp::Gt, 1),
            Token::Op(">=") => (CompareOp::Ge, 1),
            Token::Name(n) if n == "in" => (CompareOp::In, 1),
            Token::Name(n) if n == "not" && self.peek_next().is_word("in") => (CompareOp::NotIn, 2),
            Token::Name(n) if n == "is" && self.peek_next().is_word("not") => (CompareOp::IsNot, 2),
            Token::Name(n) if n == "is" => (CompareOp::Is, 1),
            _ => return None,
        };
        for _ in 0..width {
            self.advance();
        }
        Some(op)
    }

    fn parse_comparison(&mut self) -> ExpressionResult<Expr> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_additive(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.eat_op("+") {
                BinaryOp::Add
            } else if self.eat_op("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_term(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_op("*") {
                BinaryOp::Mul
            } else if self.eat_op("//") {
                BinaryOp::FloorDiv
            } else if self.eat_op("/") {
                BinaryOp::Div
            } else if self.eat_op("%") {
                BinaryOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> ExpressionResult<Expr> {
        if self.eat_op("-") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)));
        }
        if self.eat_op("+") {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(operand)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ExpressionResult<Expr> {
        let base = self.parse_postfix()?;
        if self.eat_op("**") {
            // Right-associative, and `2 ** -1` is allowed
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ExpressionResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_op("[") {
                let index = self.parse_or()?;
                self.expect_op("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_op(".") {
                let position = self.position();
                match self.advance() {
                    Token::Name(field) => expr = Expr::Attribute(Box::new(expr), field),
                    other => {
                        return Err(ExpressionError::syntax(
                            position,
                            format!("expected attribute name, found {}", other.describe()),
                        ))
                    }
                }
            } else if self.peek().is_op("(") {
                let position = self.position();
                let Expr::Name(name) = expr else {
                    return Err(ExpressionError::syntax(
                        position,
                        "only builtin functions can be called",
                    ));
                };
                self.advance();
                let args = self.parse_items(")")?;
                expr = Expr::Call(name, args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to `close`, trailing comma allowed
    fn parse_items(&mut self, close: &str) -> ExpressionResult<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.eat_op(close) {
                return Ok(items);
            }
            items.push(self.parse_or()?);
            if !self.eat_op(",") {
                self.expect_op(close)?;
                return Ok(items);
            }
        }
    }

    fn parse_primary(&mut self) -> ExpressionResult<Expr> {
        let position = self.position();
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(n) => serde_json::Number::from_f64(n)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| ExpressionError::syntax(position, "invalid number")),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Name(name) => match name.as_str() {
                "True" | "true" => Ok(Expr::Literal(Value::Bool(true))),
                "False" | "false" => Ok(Expr::Literal(Value::Bool(false))),
                "None" | "null" => Ok(Expr::Literal(Value::Null)),
                "and" | "or" | "not" | "in" | "is" => Err(ExpressionError::syntax(
                    position,
                    format!("unexpected keyword '{}'", name),
                )),
                _ => Ok(Expr::Name(name)),
            },
            Token::Op("(") => {
                let inner = self.parse_or()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Token::Op("[") => Ok(Expr::List(self.parse_items("]")?)),
            Token::End => Err(ExpressionError::syntax(position, "unexpected end of expression")),
            other => Err(ExpressionError::syntax(
                position,
                format!("unexpected {}", other.describe()),
            )),
        }
    }
}
