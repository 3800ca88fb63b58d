//! Tag scanner and directive dispatch
//!
//! Template text is scanned left to right for `{{ ... }}` and `{% ... %}`
//! tags. Directives open and close frames on a stack that is local to one
//! parse; closing a frame folds it into a node of its parent frame.

use std::collections::{HashMap, HashSet};

use crate::config::DuplicateBlocks;
use crate::error::{ParseError, Span};
use crate::parser::ast::*;

const VARIABLE_OPEN: &str = "{{";
const VARIABLE_CLOSE: &str = "}}";
const DIRECTIVE_OPEN: &str = "{%";
const DIRECTIVE_CLOSE: &str = "%}";

/// Options controlling how strictly template text is compiled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject unknown directive keywords instead of ignoring them
    pub strict_directives: bool,
    /// Policy for two blocks sharing a name in one template
    pub duplicate_blocks: DuplicateBlocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Variable,
    Directive,
}

/// Compile template text with default options
pub fn parse(source: &str) -> Result<CompiledTemplate, ParseError> {
    parse_with(source, &ParseOptions::default())
}

/// Compile template text into a node tree
pub fn parse_with(source: &str, options: &ParseOptions) -> Result<CompiledTemplate, ParseError> {
    let mut builder = TreeBuilder::new(*options);
    let mut cursor = 0;

    loop {
        let rest = &source[cursor..];
        // Whichever opening marker comes first is processed next
        let next = match (rest.find(VARIABLE_OPEN), rest.find(DIRECTIVE_OPEN)) {
            (None, None) => None,
            (Some(v), Some(d)) if d < v => Some((d, TagKind::Directive)),
            (Some(v), _) => Some((v, TagKind::Variable)),
            (None, Some(d)) => Some((d, TagKind::Directive)),
        };

        let Some((offset, kind)) = next else {
            builder.data(rest);
            break;
        };

        let start = cursor + offset;
        builder.data(&source[cursor..start]);

        let (close_marker, unterminated) = match kind {
            TagKind::Variable => (VARIABLE_CLOSE, "unterminated variable tag"),
            TagKind::Directive => (DIRECTIVE_CLOSE, "unterminated directive tag"),
        };
        let inner_start = start + 2;
        let inner_end = source[inner_start..]
            .find(close_marker)
            .map(|i| inner_start + i)
            .ok_or_else(|| ParseError::syntax(unterminated, start..source.len()))?;
        let span = start..inner_end + 2;
        let inner = &source[inner_start..inner_end];

        match kind {
            TagKind::Variable => builder.variable(inner.trim()),
            TagKind::Directive => builder.directive(inner.trim(), span)?,
        }
        cursor = inner_end + 2;
    }

    builder.finish()
}

/// What opened a frame, and therefore which node it becomes when closed
#[derive(Debug)]
enum Opener {
    Root,
    Conditional { kind: CondKind, expr: Option<String> },
    Loop { var: String, iterable: String },
    Block { name: String, order: usize },
}

impl Opener {
    fn describe(&self) -> &'static str {
        match self {
            Opener::Root => "template",
            Opener::Conditional { kind, .. } => kind.keyword(),
            Opener::Loop { .. } => "for",
            Opener::Block { .. } => "block",
        }
    }
}

#[derive(Debug)]
struct Frame {
    opener: Opener,
    nodes: NodeSeq,
    span: Span,
}

/// Which frames an end directive may close
#[derive(Debug, Clone, Copy)]
enum Closes {
    /// `else` / `else if`: an if or else-if body
    OpenBranch,
    /// `endif`: any branch of a conditional
    AnyBranch,
    Loop,
    Block,
}

impl Closes {
    fn accepts(&self, opener: &Opener) -> bool {
        match (self, opener) {
            (Closes::OpenBranch, Opener::Conditional { kind, .. }) => *kind != CondKind::Else,
            (Closes::AnyBranch, Opener::Conditional { .. }) => true,
            (Closes::Loop, Opener::Loop { .. }) => true,
            (Closes::Block, Opener::Block { .. }) => true,
            _ => false,
        }
    }
}

struct TreeBuilder {
    options: ParseOptions,
    stack: Vec<Frame>,
    /// Block name -> (opening order, block); later openings win
    blocks: HashMap<String, (usize, Block)>,
    declared: HashSet<String>,
    next_block: usize,
    extends: Option<String>,
}

impl TreeBuilder {
    fn new(options: ParseOptions) -> Self {
        Self {
            options,
            stack: vec![Frame {
                opener: Opener::Root,
                nodes: Vec::new(),
                span: 0..0,
            }],
            blocks: HashMap::new(),
            declared: HashSet::new(),
            next_block: 0,
            extends: None,
        }
    }

    fn push_node(&mut self, node: Node) {
        if let Some(frame) = self.stack.last_mut() {
            frame.nodes.push(node);
        }
    }

    fn data(&mut self, text: &str) {
        if !text.is_empty() {
            self.push_node(Node::Data(text.to_string()));
        }
    }

    fn variable(&mut self, expr: &str) {
        self.push_node(Node::Variable(expr.to_string()));
    }

    fn open(&mut self, opener: Opener, span: Span) {
        self.stack.push(Frame {
            opener,
            nodes: Vec::new(),
            span,
        });
    }

    /// Pop the top frame and fold it into its parent
    fn close(&mut self, closes: Closes, keyword: &str, span: &Span) -> Result<(), ParseError> {
        if self.stack.len() <= 1 {
            return Err(ParseError::structure(
                format!("'{keyword}' without an open frame"),
                span.clone(),
            ));
        }
        let top = self
            .stack
            .last()
            .map(|frame| &frame.opener)
            .filter(|opener| closes.accepts(opener));
        if top.is_none() {
            let open = self
                .stack
                .last()
                .map(|frame| frame.opener.describe())
                .unwrap_or("template");
            return Err(ParseError::structure(
                format!("'{keyword}' cannot close an open '{open}'"),
                span.clone(),
            ));
        }

        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        let node = match frame.opener {
            Opener::Conditional { kind, expr } => Node::Conditional(Conditional {
                kind,
                expr,
                body: frame.nodes,
            }),
            Opener::Loop { var, iterable } => Node::Loop(Loop {
                var,
                iterable,
                body: frame.nodes,
            }),
            Opener::Block { name, order } => {
                let block = Block {
                    name: name.clone(),
                    body: frame.nodes,
                };
                let replace = self
                    .blocks
                    .get(&name)
                    .map_or(true, |(existing, _)| *existing < order);
                if replace {
                    self.blocks.insert(name, (order, block.clone()));
                }
                Node::Block(block)
            }
            Opener::Root => return Ok(()),
        };
        self.push_node(node);
        Ok(())
    }

    fn directive(&mut self, content: &str, span: Span) -> Result<(), ParseError> {
        let (keyword, rest) = split_keyword(content);

        match keyword {
            "if" => {
                let expr = require(rest, "'if' requires a condition", &span)?;
                self.open(
                    Opener::Conditional {
                        kind: CondKind::If,
                        expr: Some(expr),
                    },
                    span,
                );
            }
            "else" => {
                let (kind, expr) = match split_keyword(rest) {
                    _ if rest.is_empty() => (CondKind::Else, None),
                    ("if", cond) => (
                        CondKind::ElseIf,
                        Some(require(cond, "'else if' requires a condition", &span)?),
                    ),
                    _ => {
                        return Err(ParseError::syntax(
                            format!("unexpected '{rest}' after 'else'"),
                            span,
                        ))
                    }
                };
                self.close(Closes::OpenBranch, kind.keyword(), &span)?;
                self.open(Opener::Conditional { kind, expr }, span);
            }
            "elseif" | "elif" => {
                return Err(ParseError::syntax(
                    format!("unknown directive '{keyword}', did you mean 'else if'?"),
                    span,
                ))
            }
            "endif" => self.close(Closes::AnyBranch, keyword, &span)?,
            "for" => {
                let Some((var, iterable)) = rest.split_once(" in ") else {
                    return Err(ParseError::syntax("'for' requires 'in'", span));
                };
                let var = require(var, "'for' requires a loop variable", &span)?;
                let iterable = require(iterable, "'for' requires an iterable", &span)?;
                self.open(Opener::Loop { var, iterable }, span);
            }
            "endfor" => self.close(Closes::Loop, keyword, &span)?,
            "block" => {
                let name = require(rest, "'block' requires a name", &span)?;
                if !self.declared.insert(name.clone())
                    && self.options.duplicate_blocks == DuplicateBlocks::Reject
                {
                    return Err(ParseError::structure(
                        format!("block '{name}' is defined more than once"),
                        span,
                    ));
                }
                let order = self.next_block;
                self.next_block += 1;
                self.open(Opener::Block { name, order }, span);
            }
            "endblock" => self.close(Closes::Block, keyword, &span)?,
            "extends" => {
                let name = require(unquote(rest), "'extends' requires a template name", &span)?;
                self.extends = Some(name);
            }
            _ if self.options.strict_directives => {
                return Err(ParseError::syntax(
                    format!("unknown directive '{keyword}'"),
                    span,
                ));
            }
            _ => {
                tracing::warn!(directive = keyword, span = ?span, "ignoring unknown directive");
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<CompiledTemplate, ParseError> {
        if self.stack.len() > 1 {
            if let Some(frame) = self.stack.last() {
                return Err(ParseError::structure(
                    format!("'{}' is never closed", frame.opener.describe()),
                    frame.span.clone(),
                ));
            }
        }
        let root = self.stack.pop().map(|frame| frame.nodes).unwrap_or_default();

        Ok(CompiledTemplate {
            root,
            blocks: self
                .blocks
                .into_iter()
                .map(|(name, (_, block))| (name, block))
                .collect(),
            extends: self.extends,
        })
    }
}

/// Split a directive into its leading word and the trimmed remainder
///
/// The keyword ends at the first character that cannot be part of a word,
/// so `if(x)` splits as `if` and `(x)`.
fn split_keyword(content: &str) -> (&str, &str) {
    let content = content.trim();
    let end = content
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(content.len());
    let (keyword, rest) = content.split_at(end);
    (keyword, rest.trim())
}

fn require(text: &str, message: &str, span: &Span) -> Result<String, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        Err(ParseError::syntax(message, span.clone()))
    } else {
        Ok(text.to_string())
    }
}

/// Strip one pair of matching quotes
fn unquote(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}
