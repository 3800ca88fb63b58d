//! Stencil - a text templating engine with template inheritance
//!
//! This library compiles markup containing `{{ expression }}` tags and
//! `{% directive %}` tags (if / else if / else, for, block, extends) into a
//! node tree, and renders that tree against a set of variables.
//!
//! # Example
//!
//! ```rust
//! use stencil::{render_str, Value, Variables};
//!
//! let mut vars = Variables::new();
//! vars.insert("items".to_string(), Value::from(vec!["a", "b"]));
//!
//! let out = render_str("{% for x in items %}<{{ x }}>{% endfor %}", vars).unwrap();
//! assert_eq!(out, "<a><b>");
//! ```
//!
//! Named templates with inheritance are loaded through a [`Registry`]:
//!
//! ```rust
//! use stencil::{MemorySource, Registry, Variables};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let source = MemorySource::new()
//!     .with_template("base", "A{% block content %}Y{% endblock %}B")
//!     .with_template("child", r#"{% extends "base" %}{% block content %}X{% endblock %}"#);
//!
//! let registry = Registry::new(source);
//! let out = registry.render("child", Variables::new()).await.unwrap();
//! assert_eq!(out, "AXB");
//! # }
//! ```

pub mod config;
pub mod error;
pub mod expr;
pub mod parser;
pub mod renderer;
pub mod template;

pub use config::{ConfigError, DuplicateBlocks, EngineConfig};
pub use error::ParseError;
pub use expr::{evaluate, Scope, Value, Variables};
pub use parser::{parse, CompiledTemplate, Node, NodeSeq};
pub use renderer::render_template;
pub use template::{
    DirectorySource, EntryState, ErrorKind, Gate, MemorySource, Registry, SourceError, Template,
    TemplateError, TemplateSource,
};

/// Compile and render a standalone template (no `extends` resolution)
///
/// # Example
///
/// ```rust
/// use stencil::{render_str, Variables};
///
/// assert_eq!(render_str("{{ 1 + 2 }}", Variables::new()).unwrap(), "3");
/// ```
pub fn render_str(source: &str, variables: Variables) -> Result<String, ParseError> {
    let compiled = parse(source)?;
    let template = Template::new("<string>", compiled, None);
    Ok(render_template(&template, variables))
}
