//! Expression language used by variable tags and directives
//!
//! Expressions are a bounded grammar (literals, names, property access,
//! arithmetic, comparison and short-circuit logic) evaluated against a
//! chained [`Scope`]. Evaluation never aborts a render: anything that goes
//! wrong produces [`Value::Undefined`].

mod eval;
mod grammar;
pub mod lexer;
mod scope;
mod value;

pub use eval::{compile, eval, evaluate, try_evaluate, EvalError};
pub use grammar::{BinaryOp, Expr, UnaryOp};
pub use scope::{Scope, Variables};
pub use value::Value;
