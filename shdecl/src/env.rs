//! Variable bindings seen while walking a script
//!
//! Two layers: `globals` for `NAME=VALUE` / `export` bindings and `scoped`
//! for loop variables. Scoped bindings shadow globals and only live as long
//! as the [`ScopeGuard`] that introduced them.

use crate::ast::is_identifier;
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

/// How a bound `$name` reference is rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Substitute the bound value
    Interpret,
    /// Substitute a `{{ name }}` placeholder resolved by the automation engine
    Template,
}

#[derive(Debug, Clone, Default)]
pub struct VariableEnv {
    globals: HashMap<String, String>,
    scoped: HashMap<String, String>,
    exported: HashSet<String>,
}

impl VariableEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` globally. References in `raw` are resolved first, so the
    /// stored value never refers to other variables.
    pub fn set(&mut self, name: &str, raw: &str) {
        let value = self.interpolate(raw, Interpolation::Interpret);
        self.set_value(name, value);
    }

    /// Bind `name` to an already resolved value
    pub fn set_value(&mut self, name: &str, value: String) {
        tracing::debug!(name, value = %value, "bind variable");
        self.globals.insert(name.to_string(), value);
    }

    /// As [`set`](Self::set), and mark the name exported.
    pub fn export(&mut self, name: &str, raw: &str) {
        self.set(name, raw);
        self.exported.insert(name.to_string());
    }

    pub fn export_value(&mut self, name: &str, value: String) {
        self.set_value(name, value);
        self.exported.insert(name.to_string());
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.exported.contains(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.scoped
            .get(name)
            .or_else(|| self.globals.get(name))
            .map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Introduce loop bindings until the returned guard is dropped.
    pub fn push_scope<I>(&mut self, bindings: I) -> ScopeGuard<'_, Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        ScopeGuard::new(self, bindings)
    }

    /// Rewrite `${name}` and `$name` references. Unbound names stay as
    /// written.
    pub fn interpolate(&self, text: &str, mode: Interpolation) -> String {
        substitute(text, |name| {
            self.get(name).map(|value| match mode {
                Interpolation::Interpret => value.to_string(),
                Interpolation::Template => placeholder(name),
            })
        })
    }

    /// Rewrite references for task output: loop and plain bindings are
    /// substituted, exported ones become placeholders.
    pub fn expand(&self, text: &str) -> String {
        substitute(text, |name| {
            if let Some(value) = self.scoped.get(name) {
                Some(value.clone())
            } else if self.exported.contains(name) {
                Some(placeholder(name))
            } else {
                self.globals.get(name).cloned()
            }
        })
    }
}

impl AsMut<VariableEnv> for VariableEnv {
    fn as_mut(&mut self) -> &mut VariableEnv {
        self
    }
}

fn placeholder(name: &str) -> String {
    format!("{{{{ {} }}}}", name)
}

fn substitute(text: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        // ${name}
        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                let consumed = end + 2;
                match resolve(name).filter(|_| is_identifier(name)) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[pos..pos + 1 + consumed]),
                }
                rest = &after[consumed..];
                continue;
            }
        }

        // $name, ends at the first non-identifier char
        let len = after
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_alphanumeric() || c == '_') || (i == 0 && c.is_ascii_digit()))
            .map_or(after.len(), |(i, _)| i);
        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        let name = &after[..len];
        match resolve(name) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

/// Restores the scoped layer of `T`'s environment when dropped, including
/// during unwinding. Derefs to `T` so the owner stays usable inside the
/// scope.
pub struct ScopeGuard<'a, T: AsMut<VariableEnv>> {
    owner: &'a mut T,
    saved: Vec<(String, Option<String>)>,
}

impl<'a, T: AsMut<VariableEnv>> ScopeGuard<'a, T> {
    pub fn new<I>(owner: &'a mut T, bindings: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env = owner.as_mut();
        let saved = bindings
            .into_iter()
            .map(|(name, value)| {
                let previous = env.scoped.insert(name.clone(), value);
                (name, previous)
            })
            .collect();
        Self { owner, saved }
    }
}

impl<T: AsMut<VariableEnv>> Deref for ScopeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.owner
    }
}

impl<T: AsMut<VariableEnv>> DerefMut for ScopeGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.owner
    }
}

impl<T: AsMut<VariableEnv>> Drop for ScopeGuard<'_, T> {
    fn drop(&mut self) {
        let env = self.owner.as_mut();
        // Reverse order so a name bound twice ends up at its oldest value
        for (name, previous) in self.saved.drain(..).rev() {
            match previous {
                Some(value) => env.scoped.insert(name, value),
                None => env.scoped.remove(&name),
            };
        }
    }
}
