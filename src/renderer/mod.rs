//! Tree-walking renderer
//!
//! This module takes a linked [`Template`](crate::template::Template) and a
//! set of variables and produces output text, resolving blocks through the
//! template's inheritance chain.

mod walk;

pub use walk::{render_template, TemplateRenderer};
