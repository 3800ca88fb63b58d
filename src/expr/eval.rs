//! Expression evaluation against a variable scope

use std::cmp::Ordering;

use thiserror::Error;

use super::grammar::{parse_tokens, BinaryOp, Expr, UnaryOp};
use super::lexer::{lex, Span};
use super::scope::Scope;
use super::value::Value;

/// Reasons an expression degrades to `Value::Undefined`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("unrecognised character at {0:?}")]
    Lex(Span),

    #[error("unexpected {} at {span:?}", found.as_deref().unwrap_or("end of expression"))]
    Syntax { span: Span, found: Option<String> },

    #[error("undefined variable '{0}'")]
    Undefined(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,
}

/// Parse expression source into an `Expr`
pub fn compile(source: &str) -> Result<Expr, EvalError> {
    let tokens = lex(source).map_err(EvalError::Lex)?;
    parse_tokens(tokens, source.len()).map_err(|e| EvalError::Syntax {
        span: e.span,
        found: e.found,
    })
}

/// Evaluate expression source against `scope`
///
/// Never fails: malformed syntax, unknown names and type errors all yield
/// `Value::Undefined` so the surrounding render can continue.
pub fn evaluate(source: &str, scope: &Scope<'_>) -> Value {
    match try_evaluate(source, scope) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(expr = source, error = %err, "expression evaluated to undefined");
            Value::Undefined
        }
    }
}

/// Evaluate expression source, reporting why it failed
pub fn try_evaluate(source: &str, scope: &Scope<'_>) -> Result<Value, EvalError> {
    let expr = compile(source)?;
    eval(&expr, scope)
}

/// Evaluate a compiled expression
pub fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Ident(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalError::Undefined(name.clone())),
        // A missing property is undefined; only a property of nothing is an error
        Expr::Field(target, name) => {
            let target = eval(target, scope)?;
            if is_nothing(&target) {
                return Err(EvalError::Type(format!(
                    "cannot read property '{}' of {}",
                    name,
                    target.type_name()
                )));
            }
            Ok(target.field(name).unwrap_or_default())
        }
        Expr::Index(target, key) => {
            let target = eval(target, scope)?;
            let key = eval(key, scope)?;
            if is_nothing(&target) {
                return Err(EvalError::Type(format!(
                    "cannot index {} with {}",
                    target.type_name(),
                    key.type_name()
                )));
            }
            Ok(target.index(&key).unwrap_or_default())
        }
        Expr::Unary(op, operand) => {
            let value = eval(operand, scope)?;
            match (op, value) {
                (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                (UnaryOp::Neg, other) => Err(EvalError::Type(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            }
        }
        // Logical operators short-circuit and yield the deciding operand
        Expr::Binary(lhs, BinaryOp::And, rhs) => {
            let left = eval(lhs, scope)?;
            if left.is_truthy() {
                eval(rhs, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Binary(lhs, BinaryOp::Or, rhs) => {
            let left = eval(lhs, scope)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval(rhs, scope)
            }
        }
        Expr::Binary(lhs, op, rhs) => {
            let left = eval(lhs, scope)?;
            let right = eval(rhs, scope)?;
            apply(*op, left, right)
        }
    }
}

fn apply(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;

    match op {
        Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (l @ Value::String(_), r) | (l, r @ Value::String(_)) => {
                Ok(Value::String(format!("{l}{r}")))
            }
            (l, r) => Err(type_mismatch("+", &l, &r)),
        },
        Sub | Mul | Div | Rem => match (left, right) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            (l, r) => Err(type_mismatch(symbol(op), &l, &r)),
        },
        Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        NotEq => Ok(Value::Bool(!loose_eq(&left, &right))),
        Less | LessOrEqual | Greater | GreaterOrEqual => {
            let ordering = compare(&left, &right)
                .ok_or_else(|| type_mismatch(symbol(op), &left, &right))?;
            Ok(Value::Bool(match op {
                Less => ordering == Ordering::Less,
                LessOrEqual => ordering != Ordering::Greater,
                Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        // Only reached for already-evaluated operands; `eval` short-circuits
        And => Ok(if left.is_truthy() { right } else { left }),
        Or => Ok(if left.is_truthy() { left } else { right }),
    }
}

fn is_nothing(value: &Value) -> bool {
    matches!(value, Value::Undefined | Value::Null)
}

/// Structural equality, with `null` and undefined equal to each other
fn loose_eq(left: &Value, right: &Value) -> bool {
    (is_nothing(left) && is_nothing(right)) || left == right
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => a / b,
        _ => a % b,
    };
    Ok(Value::Number(result))
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Eq => "==",
        BinaryOp::NotEq => "!=",
        BinaryOp::Less => "<",
        BinaryOp::LessOrEqual => "<=",
        BinaryOp::Greater => ">",
        BinaryOp::GreaterOrEqual => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

fn type_mismatch(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::Type(format!(
        "unsupported operands for '{}': {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}
