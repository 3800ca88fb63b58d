//! Node tree produced by compiling template text

use std::collections::HashMap;

/// Ordered sequence of nodes; order is significant
pub type NodeSeq = Vec<Node>;

/// A single element of a compiled template
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, emitted verbatim
    Data(String),
    /// `{{ expr }}`, emits the evaluated expression
    Variable(String),
    Conditional(Conditional),
    Loop(Loop),
    Block(Block),
}

/// Position of a branch within an if / else if / else run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondKind {
    If,
    ElseIf,
    Else,
}

impl CondKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            CondKind::If => "if",
            CondKind::ElseIf => "else if",
            CondKind::Else => "else",
        }
    }
}

/// One branch of a conditional run
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub kind: CondKind,
    /// Condition expression; `None` for `else`
    pub expr: Option<String>,
    pub body: NodeSeq,
}

/// `{% for var in iterable %}`
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub var: String,
    pub iterable: String,
    pub body: NodeSeq,
}

/// A named, overridable region
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub body: NodeSeq,
}

/// Output of compiling one template's text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledTemplate {
    /// Top-level node sequence
    pub root: NodeSeq,
    /// Resolvable blocks by name; the last definition of a name wins
    pub blocks: HashMap<String, Block>,
    /// Name of the ancestor declared by `{% extends %}`
    pub extends: Option<String>,
}

impl CompiledTemplate {
    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    /// Block names in definition-independent (sorted) order
    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.blocks.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
