//! Output generation from linked templates

use std::collections::HashMap;

use crate::expr::{compile, eval, EvalError, Expr, Scope, Value, Variables};
use crate::parser::ast::{Block, CondKind, Conditional, Loop, Node};
use crate::template::Template;

/// Render a linked template against caller variables
pub fn render_template(template: &Template, variables: Variables) -> String {
    TemplateRenderer::new(template).render(&Scope::root(variables))
}

/// Walks a template's effective root and accumulates output
///
/// Block references are always resolved against the template the renderer
/// was created for, whichever ancestor's sequence contains the reference.
pub struct TemplateRenderer<'t> {
    template: &'t Template,
    output: String,
    /// Expressions compiled so far, keyed by their source text
    compiled: HashMap<&'t str, Result<Expr, EvalError>>,
}

impl<'t> TemplateRenderer<'t> {
    pub fn new(template: &'t Template) -> Self {
        Self {
            template,
            output: String::new(),
            compiled: HashMap::new(),
        }
    }

    /// Render the template, consuming the renderer
    pub fn render(mut self, scope: &Scope<'_>) -> String {
        let root = self.template.effective_root();
        self.render_seq(root, scope);
        self.output
    }

    fn render_seq(&mut self, seq: &'t [Node], scope: &Scope<'_>) {
        // Whether a branch of the current if / else if / else run has rendered
        let mut matched = false;

        for node in seq {
            match node {
                Node::Data(text) => self.output.push_str(text),
                Node::Variable(expr) => {
                    let value = self.evaluate(expr, scope);
                    self.output.push_str(&value.to_string());
                }
                Node::Conditional(cond) => {
                    self.render_conditional(cond, scope, &mut matched);
                }
                Node::Loop(l) => self.render_loop(l, scope),
                Node::Block(block) => self.render_block(block, scope),
            }
        }
    }

    fn render_conditional(&mut self, cond: &'t Conditional, scope: &Scope<'_>, matched: &mut bool) {
        let take = match cond.kind {
            CondKind::If => {
                *matched = self.condition(cond, scope);
                *matched
            }
            CondKind::ElseIf if !*matched => {
                *matched = self.condition(cond, scope);
                *matched
            }
            CondKind::Else if !*matched => {
                *matched = true;
                true
            }
            _ => false,
        };
        if take {
            self.render_seq(&cond.body, scope);
        }
    }

    fn condition(&mut self, cond: &'t Conditional, scope: &Scope<'_>) -> bool {
        cond.expr
            .as_deref()
            .map(|expr| self.evaluate(expr, scope).is_truthy())
            .unwrap_or(false)
    }

    /// Evaluate an expression, degrading any failure to `Value::Undefined`
    fn evaluate(&mut self, source: &'t str, scope: &Scope<'_>) -> Value {
        let result = match self
            .compiled
            .entry(source)
            .or_insert_with(|| compile(source))
        {
            Ok(expr) => eval(expr, scope),
            Err(err) => Err(err.clone()),
        };
        result.unwrap_or_else(|err| {
            tracing::debug!(expr = source, error = %err, "expression evaluated to undefined");
            Value::Undefined
        })
    }

    fn render_loop(&mut self, l: &'t Loop, scope: &Scope<'_>) {
        let items = match self.evaluate(&l.iterable, scope) {
            Value::Array(items) => items,
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            other => {
                tracing::debug!(
                    iterable = %l.iterable,
                    kind = other.type_name(),
                    "loop over non-iterable renders nothing"
                );
                return;
            }
        };

        // Every element is visited, falsy ones included
        for item in items {
            let iteration = scope.with(l.var.clone(), item);
            self.render_seq(&l.body, &iteration);
        }
    }

    fn render_block(&mut self, block: &'t Block, scope: &Scope<'_>) {
        // Overrides render under the current scope, so loop variables stay visible
        if let Some(resolved) = self.template.resolve_block(&block.name) {
            self.render_seq(&resolved.body, scope);
        }
    }
}
