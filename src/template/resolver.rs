//! Inheritance resolution - effective root and block overrides

use std::collections::HashMap;
use std::sync::Arc;

use crate::parser::ast::{Block, CompiledTemplate, NodeSeq};

/// A compiled template linked to its loaded ancestor chain
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    root: NodeSeq,
    blocks: HashMap<String, Block>,
    extends: Option<String>,
    parent: Option<Arc<Template>>,
}

impl Template {
    /// Link a compiled template to its (already loaded) ancestor
    pub fn new(name: impl Into<String>, compiled: CompiledTemplate, parent: Option<Arc<Template>>) -> Self {
        Self {
            name: name.into(),
            root: compiled.root,
            blocks: compiled.blocks,
            extends: compiled.extends,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// This template's own top-level sequence
    pub fn root(&self) -> &NodeSeq {
        &self.root
    }

    /// Blocks defined directly in this template
    pub fn own_blocks(&self) -> &HashMap<String, Block> {
        &self.blocks
    }

    /// Name given to `{% extends %}`, if any
    pub fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<Template>> {
        self.parent.as_ref()
    }

    /// This template followed by each ancestor, most derived first
    pub fn chain(&self) -> impl Iterator<Item = &Template> {
        std::iter::successors(Some(self), |t| t.parent.as_deref())
    }

    /// The structural sequence rendering starts from: the top-most ancestor's root
    pub fn effective_root(&self) -> &NodeSeq {
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            current = parent;
        }
        &current.root
    }

    /// Find the most-derived definition of a block along the chain
    pub fn resolve_block(&self, name: &str) -> Option<&Block> {
        self.chain().find_map(|t| t.blocks.get(name))
    }
}
