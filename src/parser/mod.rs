//! Compiler from template text to a node tree

pub mod ast;
mod scanner;

pub use ast::*;
pub use scanner::{parse, parse_with, ParseOptions};
