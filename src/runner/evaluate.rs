//! Expression evaluation
//!
//! Evaluates a parsed [`Expression`] against a [`Context`]. Values are plain
//! `serde_json::Value`s, so whatever a provider function returns can be
//! indexed, compared and reshaped without conversion.

use crate::error::{ExpressionError, ExpressionResult};
use crate::runner::expression::{BinaryOp, CompareOp, Expr, Expression, UnaryOp};
use crate::runner::Context;
use serde_json::Value;
use std::cmp::Ordering;

/// Builtin functions callable from expressions
pub const BUILTINS: &[&str] = &[
    "abs", "min", "max", "round", "len", "float", "int", "str", "bool", "sum",
];

impl Expression {
    /// Evaluate against a context
    pub fn evaluate(&self, ctx: &Context) -> ExpressionResult<Value> {
        eval(self.root(), ctx)
    }
}

/// Parse and evaluate in one step
pub fn evaluate(source: &str, ctx: &Context) -> ExpressionResult<Value> {
    Expression::parse(source)?.evaluate(ctx)
}

/// Truthiness: null, false, zero and empty containers are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value the way `str()` does
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) if n.is_f64() => n.as_f64().map(format_float).unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(value: &Value) -> Option<Num> {
        let Value::Number(n) = value else {
            return None;
        };
        match n.as_i64() {
            Some(i) => Some(Num::Int(i)),
            None => n.as_f64().map(Num::Float),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn into_value(self) -> ExpressionResult<Value> {
        match self {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or(ExpressionError::InvalidNumber),
        }
    }

    fn cmp(self, other: Num) -> Option<Ordering> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

fn eval(expr: &Expr, ctx: &Context) -> ExpressionResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => ctx
            .get_var(name)
            .cloned()
            .ok_or_else(|| ExpressionError::UndefinedName(name.clone())),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, ctx))
            .collect::<ExpressionResult<Vec<Value>>>()
            .map(Value::Array),
        Expr::Unary(op, operand) => unary(*op, eval(operand, ctx)?),
        Expr::Binary(op, left, right) => binary(*op, eval(left, ctx)?, eval(right, ctx)?),
        Expr::And(left, right) => {
            let left = eval(left, ctx)?;
            if is_truthy(&left) {
                eval(right, ctx)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, ctx)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                eval(right, ctx)
            }
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(first, ctx)?;
            for (op, right) in rest {
                let right = eval(right, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::Index(target, index) => index_value(eval(target, ctx)?, &eval(index, ctx)?),
        Expr::Attribute(target, field) => match eval(target, ctx)? {
            Value::Object(mut map) => map
                .remove(field)
                .ok_or_else(|| ExpressionError::KeyNotFound(field.clone())),
            other => Err(ExpressionError::type_error(format!(
                "'{}' object has no attribute '{}'",
                type_name(&other),
                field
            ))),
        },
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, ctx))
                .collect::<ExpressionResult<Vec<Value>>>()?;
            call_builtin(name, args)
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> ExpressionResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
        UnaryOp::Pos => match Num::from_value(&value) {
            Some(_) => Ok(value),
            None => Err(ExpressionError::type_error(format!(
                "bad operand type for unary +: '{}'",
                type_name(&value)
            ))),
        },
        UnaryOp::Neg => match Num::from_value(&value) {
            Some(Num::Int(i)) => match i.checked_neg() {
                Some(n) => Num::Int(n).into_value(),
                None => Num::Float(-(i as f64)).into_value(),
            },
            Some(Num::Float(f)) => Num::Float(-f).into_value(),
            None => Err(ExpressionError::type_error(format!(
                "bad operand type for unary -: '{}'",
                type_name(&value)
            ))),
        },
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> ExpressionResult<Value> {
    match (op, left, right) {
        (BinaryOp::Add, Value::String(mut a), Value::String(b)) => {
            a.push_str(&b);
            Ok(Value::String(a))
        }
        (BinaryOp::Add, Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (op, left, right) => match (Num::from_value(&left), Num::from_value(&right)) {
            (Some(a), Some(b)) => arithmetic(op, a, b)?.into_value(),
            _ => Err(ExpressionError::type_error(format!(
                "unsupported operand types for {}: '{}' and '{}'",
                op_symbol(op),
                type_name(&left),
                type_name(&right)
            ))),
        },
    }
}

fn arithmetic(op: BinaryOp, a: Num, b: Num) -> ExpressionResult<Num> {
    if let (Num::Int(a), Num::Int(b)) = (a, b) {
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => None,
            BinaryOp::FloorDiv => {
                if b == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                a.checked_div(b).map(|q| {
                    if a % b != 0 && ((a < 0) != (b < 0)) {
                        q - 1
                    } else {
                        q
                    }
                })
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                a.checked_rem(b).map(|r| {
                    if r != 0 && ((r < 0) != (b < 0)) {
                        r + b
                    } else {
                        r
                    }
                })
            }
            BinaryOp::Pow => u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp)),
        };
        if let Some(n) = exact {
            return Ok(Num::Int(n));
        }
    }

    let (a, b) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(ExpressionError::DivisionByZero)
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
    };
    Ok(Num::Float(result))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            matches!(
                Num::from_value(left).zip(Num::from_value(right)).and_then(|(a, b)| a.cmp(b)),
                Some(Ordering::Equal)
            )
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value, symbol: &str) -> ExpressionResult<Ordering> {
    let ordered = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => Num::from_value(left)
            .zip(Num::from_value(right))
            .and_then(|(a, b)| a.cmp(b)),
    };
    ordered.ok_or_else(|| {
        ExpressionError::type_error(format!(
            "'{}' not supported between '{}' and '{}'",
            symbol,
            type_name(left),
            type_name(right)
        ))
    })
}

fn contains(container: &Value, item: &Value) -> ExpressionResult<bool> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Array(items), item) => Ok(items.iter().any(|x| values_equal(x, item))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        (container, item) => Err(ExpressionError::type_error(format!(
            "'in' not supported between '{}' and '{}'",
            type_name(item),
            type_name(container)
        ))),
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> ExpressionResult<bool> {
    Ok(match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::Ne => !values_equal(left, right),
        CompareOp::Lt => ordering(left, right, "<")? == Ordering::Less,
        CompareOp::Le => ordering(left, right, "<=")? != Ordering::Greater,
        CompareOp::Gt => ordering(left, right, ">")? == Ordering::Greater,
        CompareOp::Ge => ordering(left, right, ">=")? != Ordering::Less,
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
        CompareOp::Is => left == right,
        CompareOp::IsNot => left != right,
    })
}

fn index_value(target: Value, index: &Value) -> ExpressionResult<Value> {
    match (target, index) {
        (Value::Object(mut map), Value::String(key)) => map
            .remove(key)
            .ok_or_else(|| ExpressionError::KeyNotFound(key.clone())),
        (Value::Array(mut items), index) => {
            let i = match Num::from_value(index) {
                Some(Num::Int(i)) => i,
                _ => {
                    return Err(ExpressionError::type_error(format!(
                        "list indices must be integers, not '{}'",
                        type_name(index)
                    )))
                }
            };
            let resolved = if i < 0 { items.len() as i64 + i } else { i };
            if resolved < 0 || resolved >= items.len() as i64 {
                return Err(ExpressionError::IndexOutOfRange(i));
            }
            Ok(items.swap_remove(resolved as usize))
        }
        (Value::String(s), index) => {
            let Some(Num::Int(i)) = Num::from_value(index) else {
                return Err(ExpressionError::type_error(format!(
                    "string indices must be integers, not '{}'",
                    type_name(index)
                )));
            };
            let len = s.chars().count() as i64;
            let resolved = if i < 0 { len + i } else { i };
            if resolved < 0 || resolved >= len {
                return Err(ExpressionError::IndexOutOfRange(i));
            }
            Ok(s.chars()
                .nth(resolved as usize)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null))
        }
        (target, _) => Err(ExpressionError::type_error(format!(
            "'{}' object is not subscriptable",
            type_name(&target)
        ))),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> ExpressionResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(ExpressionError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn number_arg(name: &str, value: &Value) -> ExpressionResult<Num> {
    Num::from_value(value).ok_or_else(|| {
        ExpressionError::type_error(format!(
            "{}() argument must be a number, not '{}'",
            name,
            type_name(value)
        ))
    })
}

fn call_builtin(name: &str, mut args: Vec<Value>) -> ExpressionResult<Value> {
    match name {
        "abs" => {
            arity(name, &args, 1, 1)?;
            match number_arg(name, &args[0])? {
                Num::Int(i) => match i.checked_abs() {
                    Some(n) => Num::Int(n).into_value(),
                    None => Num::Float((i as f64).abs()).into_value(),
                },
                Num::Float(f) => Num::Float(f.abs()).into_value(),
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(ExpressionError::Arity {
                    name: name.to_string(),
                    expected: "at least 1".to_string(),
                    got: 0,
                });
            }
            let items = match args.pop() {
                Some(Value::Array(items)) if args.is_empty() => items,
                Some(last) => {
                    args.push(last);
                    args
                }
                None => Vec::new(),
            };
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = items.into_iter();
            let mut best = iter.next().ok_or_else(|| {
                ExpressionError::type_error(format!("{}() arg is an empty sequence", name))
            })?;
            for item in iter {
                if ordering(&item, &best, if name == "min" { "<" } else { ">" })? == wanted {
                    best = item;
                }
            }
            Ok(best)
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            let value = number_arg(name, &args[0])?;
            let digits = match args.get(1) {
                None | Some(Value::Null) => None,
                Some(d) => match number_arg(name, d)? {
                    Num::Int(d) => Some(d),
                    Num::Float(_) => {
                        return Err(ExpressionError::type_error(
                            "round() digits must be an integer",
                        ))
                    }
                },
            };
            match (value, digits) {
                (Num::Int(i), None) => Ok(Value::from(i)),
                (Num::Int(i), Some(d)) if d >= 0 => Ok(Value::from(i)),
                (value, None) => {
                    let rounded = value.as_f64().round_ties_even();
                    if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                        Ok(Value::from(rounded as i64))
                    } else {
                        Err(ExpressionError::InvalidNumber)
                    }
                }
                (value, Some(d)) => {
                    let scale = 10f64.powi(d.clamp(-308, 308) as i32);
                    Num::Float((value.as_f64() * scale).round_ties_even() / scale).into_value()
                }
            }
        }
        "len" => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => {
                    return Err(ExpressionError::type_error(format!(
                        "object of type '{}' has no len()",
                        type_name(other)
                    )))
                }
            };
            Ok(Value::from(len))
        }
        "float" => {
            arity(name, &args, 1, 1)?;
            let f = match &args[0] {
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                    ExpressionError::type_error(format!("could not convert string to float: '{}'", s))
                })?,
                Value::Bool(b) => f64::from(u8::from(*b)),
                other => number_arg(name, other)?.as_f64(),
            };
            Num::Float(f).into_value()
        }
        "int" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| {
                    ExpressionError::type_error(format!("invalid literal for int(): '{}'", s))
                }),
                Value::Bool(b) => Ok(Value::from(i64::from(*b))),
                other => match number_arg(name, other)? {
                    Num::Int(i) => Ok(Value::from(i)),
                    Num::Float(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                        Ok(Value::from(f.trunc() as i64))
                    }
                    Num::Float(_) => Err(ExpressionError::InvalidNumber),
                },
            }
        }
        "str" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::String(display(&args[0])))
        }
        "bool" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(is_truthy(&args[0])))
        }
        "sum" => {
            arity(name, &args, 1, 1)?;
            let Value::Array(items) = &args[0] else {
                return Err(ExpressionError::type_error(format!(
                    "'{}' object is not iterable",
                    type_name(&args[0])
                )));
            };
            let mut total = Num::Int(0);
            for item in items {
                total = arithmetic(BinaryOp::Add, total, number_arg(name, item)?)?;
            }
            total.into_value()
        }
        _ => Err(ExpressionError::UnknownFunction(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::new()
            .with_var("price_btc", json!({"last": 42000, "bid": 41999.5, "symbol": "BTC/USDT"}))
            .with_var("price_eth", json!({"last": 2500.25}))
            .with_var("prices", json!([3, 1, 2]))
            .with_var("missing", Value::Null)
    }

    fn eval_ok(src: &str) -> Value {
        evaluate(src, &ctx()).unwrap()
    }

    #[test]
    fn test_index_into_result() {
        assert_eq!(eval_ok(r#"price_btc["last"]"#), json!(42000));
        assert_eq!(eval_ok("price_btc.bid"), json!(41999.5));
        assert_eq!(eval_ok("prices[-1]"), json!(2));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_ok("price_btc['last'] - price_eth['last'] * 2"), json!(36999.5));
        assert_eq!(eval_ok("7 // 2"), json!(3));
        assert_eq!(eval_ok("-7 // 2"), json!(-4));
        assert_eq!(eval_ok("-7 % 3"), json!(2));
        assert_eq!(eval_ok("7 / 2"), json!(3.5));
        assert_eq!(eval_ok("2 ** 10"), json!(1024));
        assert_eq!(eval_ok("2 ** -1"), json!(0.5));
        assert_eq!(eval_ok("'BTC' + '/' + 'USDT'"), json!("BTC/USDT"));
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        assert_eq!(
            eval_ok("9223372036854775807 + 1"),
            json!(9223372036854775808.0)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            evaluate("1 / 0", &ctx()),
            Err(ExpressionError::DivisionByZero)
        );
        assert_eq!(
            evaluate("1.5 % 0", &ctx()),
            Err(ExpressionError::DivisionByZero)
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval_ok("price_btc['last'] > 40000"), json!(true));
        assert_eq!(eval_ok("1 == 1.0"), json!(true));
        assert_eq!(eval_ok("1 < 2 < 3"), json!(true));
        assert_eq!(eval_ok("1 < 3 < 2"), json!(false));
        assert_eq!(eval_ok("'last' in price_btc"), json!(true));
        assert_eq!(eval_ok("'USDT' in price_btc.symbol"), json!(true));
        assert_eq!(eval_ok("4 not in prices"), json!(true));
        assert_eq!(eval_ok("missing == None"), json!(true));
    }

    #[test]
    fn test_is_compares_type_and_value() {
        assert_eq!(eval_ok("missing is None"), json!(true));
        assert_eq!(eval_ok("price_btc is not None"), json!(true));
        assert_eq!(eval_ok("1 is 1"), json!(true));
        assert_eq!(eval_ok("1 is 1.0"), json!(false));
        assert_eq!(eval_ok("True is not False"), json!(true));
    }

    #[test]
    fn test_ordering_type_error() {
        assert!(matches!(
            evaluate("'a' < 1", &ctx()),
            Err(ExpressionError::Type(_))
        ));
        assert!(matches!(
            evaluate("missing > 100", &ctx()),
            Err(ExpressionError::Type(_))
        ));
    }

    #[test]
    fn test_boolean_operators_return_operands() {
        assert_eq!(eval_ok("missing or 0"), json!(0));
        assert_eq!(eval_ok("prices and len(prices)"), json!(3));
        assert_eq!(eval_ok("not missing"), json!(true));
        // Short-circuit skips the undefined name
        assert_eq!(eval_ok("False and undefined_name"), json!(false));
    }

    #[test]
    fn test_undefined_name() {
        assert_eq!(
            evaluate("spread > 100", &Context::new()),
            Err(ExpressionError::UndefinedName("spread".to_string()))
        );
    }

    #[test]
    fn test_missing_key_and_index() {
        assert_eq!(
            evaluate("price_btc['ask']", &ctx()),
            Err(ExpressionError::KeyNotFound("ask".to_string()))
        );
        assert_eq!(
            evaluate("prices[5]", &ctx()),
            Err(ExpressionError::IndexOutOfRange(5))
        );
        assert!(matches!(
            evaluate("missing['last']", &ctx()),
            Err(ExpressionError::Type(_))
        ));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval_ok("abs(-3)"), json!(3));
        assert_eq!(eval_ok("min(prices)"), json!(1));
        assert_eq!(eval_ok("max(1, 5.5, 2)"), json!(5.5));
        assert_eq!(eval_ok("round(2.5)"), json!(2));
        assert_eq!(eval_ok("round(price_eth['last'], 1)"), json!(2500.2));
        assert_eq!(eval_ok("len(price_btc)"), json!(3));
        assert_eq!(eval_ok("float('1.25')"), json!(1.25));
        assert_eq!(eval_ok("int(3.9)"), json!(3));
        assert_eq!(eval_ok("str(1.0)"), json!("1.0"));
        assert_eq!(eval_ok("bool([])"), json!(false));
        assert_eq!(eval_ok("sum(prices)"), json!(6));
    }

    #[test]
    fn test_builtin_errors() {
        assert_eq!(
            evaluate("open('/etc/passwd')", &ctx()),
            Err(ExpressionError::UnknownFunction("open".to_string()))
        );
        assert!(matches!(
            evaluate("abs(1, 2)", &ctx()),
            Err(ExpressionError::Arity { .. })
        ));
        assert!(matches!(
            evaluate("max([])", &ctx()),
            Err(ExpressionError::Type(_))
        ));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!(-1)));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([0])));
    }

    #[test]
    fn test_display() {
        assert_eq!(display(&Value::Null), "None");
        assert_eq!(display(&json!(true)), "True");
        assert_eq!(display(&json!(42000)), "42000");
        assert_eq!(display(&json!(42000.0)), "42000.0");
        assert_eq!(display(&json!(0.25)), "0.25");
        assert_eq!(display(&json!("BTC")), "BTC");
        assert_eq!(display(&json!([1, "a"])), r#"[1,"a"]"#);
    }
}
