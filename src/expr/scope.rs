//! Chained variable environment used during rendering

use std::collections::HashMap;

use super::value::Value;

/// Variables supplied by the caller of a render
pub type Variables = HashMap<String, Value>;

/// An immutable, shadowable name -> value environment
///
/// Child scopes borrow their parent, so a loop iteration's bindings live
/// exactly as long as the iteration that created them.
#[derive(Debug)]
pub struct Scope<'a> {
    bindings: Variables,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// Create a root scope from caller variables
    pub fn root(bindings: Variables) -> Self {
        Self {
            bindings,
            parent: None,
        }
    }

    /// Layer new bindings over this scope without modifying it
    pub fn extend(&'a self, bindings: Variables) -> Scope<'a> {
        Scope {
            bindings,
            parent: Some(self),
        }
    }

    /// Bind a single name over this scope
    pub fn with(&'a self, name: impl Into<String>, value: Value) -> Scope<'a> {
        let mut bindings = Variables::with_capacity(1);
        bindings.insert(name.into(), value);
        self.extend(bindings)
    }

    /// Resolve a name, innermost binding first
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.bindings.get(name) {
                return Some(value);
            }
            scope = current.parent;
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

impl Default for Scope<'_> {
    fn default() -> Self {
        Self::root(Variables::new())
    }
}
