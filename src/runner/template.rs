//! Log template rendering
//!
//! Templates use f-string syntax: `{expr}` is replaced with the displayed
//! value of `expr` evaluated against the context, `{expr:.2f}` applies a
//! format spec, and `{{` / `}}` produce literal braces.

use crate::error::{ExpressionError, ExpressionResult};
use crate::runner::evaluate::display;
use crate::runner::{Context, Expression};
use serde_json::Value;

/// A parsed log template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Field {
        expr: Expression,
        spec: Option<FormatSpec>,
    },
}

/// Largest precision a format spec may ask for
pub const MAX_PRECISION: usize = 100;

/// Supported subset of the format-spec mini language: `[,][.N][f|%|d]`
#[derive(Debug, Clone, PartialEq, Eq)]
struct FormatSpec {
    raw: String,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Template {
    /// Parse a template string
    pub fn parse(template: &str) -> ExpressionResult<Self> {
        let chars: Vec<(usize, char)> = template.char_indices().collect();
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut i = 0;

        while i < chars.len() {
            let (pos, c) = chars[i];
            let next = chars.get(i + 1).map(|(_, c)| *c);
            match c {
                '{' if next == Some('{') => {
                    text.push('{');
                    i += 2;
                }
                '}' if next == Some('}') => {
                    text.push('}');
                    i += 2;
                }
                '}' => return Err(ExpressionError::syntax(pos, "single '}' is not allowed")),
                '{' => {
                    let close = find_field_end(&chars, i + 1)
                        .ok_or_else(|| ExpressionError::syntax(pos, "unmatched '{'"))?;
                    let inner = &template[pos + 1..chars[close].0];
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(parse_field(inner, pos + 1)?);
                    i = close + 1;
                }
                _ => {
                    text.push(c);
                    i += 1;
                }
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(Template { segments })
    }

    /// Render against a context
    pub fn render(&self, ctx: &Context) -> ExpressionResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field { expr, spec } => {
                    let value = expr.evaluate(ctx)?;
                    match spec {
                        Some(spec) => out.push_str(&spec.apply(&value)?),
                        None => out.push_str(&display(&value)),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Parse and render in one step
pub fn render(template: &str, ctx: &Context) -> ExpressionResult<String> {
    Template::parse(template)?.render(ctx)
}

/// Index of the `}` closing a field, skipping quoted strings and brackets
fn find_field_end(chars: &[(usize, char)], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i].1;
        match quote {
            Some(q) => {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '[' | '(' => depth += 1,
                ']' | ')' => depth = depth.saturating_sub(1),
                '}' if depth == 0 => return Some(i),
                '{' if depth == 0 => return None,
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Split `expr:spec` at the first top-level colon
fn parse_field(inner: &str, offset: usize) -> ExpressionResult<Segment> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut split = None;
    for (i, c) in inner.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => {
                split = Some(i);
                break;
            }
            _ => {}
        }
    }

    let (source, spec) = match split {
        Some(i) => (&inner[..i], Some(FormatSpec::parse(&inner[i + 1..])?)),
        None => (inner, None),
    };
    if source.trim().is_empty() {
        return Err(ExpressionError::syntax(offset, "empty expression in template"));
    }
    let expr = Expression::parse(source.trim()).map_err(|e| match e {
        ExpressionError::Syntax { position, message } => ExpressionError::Syntax {
            position: position + offset,
            message,
        },
        other => other,
    })?;
    Ok(Segment::Field { expr, spec })
}

impl FormatSpec {
    fn parse(raw: &str) -> ExpressionResult<Self> {
        let invalid = || ExpressionError::Format(raw.to_string());
        let mut rest = raw;

        let grouping = rest.starts_with(',');
        if grouping {
            rest = &rest[1..];
        }

        let mut precision = None;
        if let Some(after_dot) = rest.strip_prefix('.') {
            let digits: String = after_dot.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Err(invalid());
            }
            let digits_len = digits.len();
            let value: usize = digits.parse().map_err(|_| invalid())?;
            if value > MAX_PRECISION {
                return Err(invalid());
            }
            precision = Some(value);
            rest = &after_dot[digits_len..];
        }

        let kind = match rest {
            "" => None,
            "f" | "F" => Some('f'),
            "%" => Some('%'),
            "d" => Some('d'),
            _ => return Err(invalid()),
        };
        // `.N` needs a float presentation type
        if precision.is_some() && matches!(kind, None | Some('d')) {
            return Err(invalid());
        }

        Ok(FormatSpec {
            raw: raw.to_string(),
            grouping,
            precision,
            kind,
        })
    }

    fn apply(&self, value: &Value) -> ExpressionResult<String> {
        let Value::Number(n) = value else {
            if self.kind.is_none() && !self.grouping {
                return Ok(display(value));
            }
            return Err(ExpressionError::Format(self.raw.clone()));
        };

        let formatted = match self.kind {
            Some('f') => format!("{:.*}", self.precision.unwrap_or(6), n.as_f64().unwrap_or(0.0)),
            Some('%') => format!(
                "{:.*}%",
                self.precision.unwrap_or(6),
                n.as_f64().unwrap_or(0.0) * 100.0
            ),
            Some('d') => match n.as_i64() {
                Some(i) => i.to_string(),
                None => return Err(ExpressionError::Format(self.raw.clone())),
            },
            _ => display(value),
        };

        if self.grouping {
            Ok(group_thousands(&formatted))
        } else {
            Ok(formatted)
        }
    }
}

/// Insert `,` separators into the integer part of a formatted number
fn group_thousands(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let split = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let (int_part, tail) = unsigned.split_at(split);

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}{}{}", sign, grouped, tail)
}
