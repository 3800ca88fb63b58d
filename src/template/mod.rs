//! Named templates, their loading and their inheritance
//!
//! Templates are fetched by name from a [`TemplateSource`], compiled once and
//! cached in a [`Registry`]. A template may declare an ancestor with
//! `{% extends %}`; it only becomes ready once the whole ancestor chain is
//! loaded.
//!
//! # Example
//!
//! A template named `base`:
//!
//! ```text
//! <title>{% block title %}Site{% endblock %}</title>
//! ```
//!
//! and one named `page` that overrides its title:
//!
//! ```text
//! {% extends "base" %}
//! {% block title %}{{ heading }}{% endblock %}
//! ```

mod registry;
mod resolver;
mod source;

pub use registry::{EntryState, ErrorKind, Gate, Registry, TemplateError};
pub use resolver::Template;
pub use source::{DirectorySource, MemorySource, SourceError, TemplateSource};
