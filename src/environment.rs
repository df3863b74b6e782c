use std::hash::{BuildHasherDefault, Hasher};

use indexmap::IndexMap;
use tracing::trace;

use crate::{diagnostics::Diagnostic, value::Value};

/// Initial bucket count of every scope table.
pub const SCOPE_BUCKETS: usize = 64;

/// The classic 33-multiplier string hash (djb2).
#[derive(Debug, Clone, Copy)]
pub struct Djb2Hasher(u64);

impl Default for Djb2Hasher {
    fn default() -> Self {
        Self(5381)
    }
}

impl Hasher for Djb2Hasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 = self.0.wrapping_mul(33).wrapping_add(u64::from(*byte));
        }
    }
}

type Bindings = IndexMap<String, Value, BuildHasherDefault<Djb2Hasher>>;

/// One name → value table. Names are unique; redefinition overwrites.
#[derive(Debug)]
pub struct Scope {
    bindings: Bindings,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            bindings: Bindings::with_capacity_and_hasher(SCOPE_BUCKETS, Default::default()),
        }
    }

    /// Upserts `name`, storing a deep copy of `value`.
    pub fn define(&mut self, name: &str, value: &Value) -> Result<(), Diagnostic> {
        let stored = value.deep_copy()?;
        match self.bindings.get_mut(name) {
            Some(slot) => *slot = stored,
            None => {
                self.bindings.insert(name.to_string(), stored);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// The active scope chain.
///
/// Every new scope is parented on the scope current at its creation and is
/// released before its parent, so the chain child → parent → … → global is
/// exactly this stack read from the top. The global scope sits at the bottom
/// and is never popped.
#[derive(Debug)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeChain {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    /// Number of scopes on the chain, the global scope included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::new());
        trace!(depth = self.scopes.len(), "enter scope");
    }

    /// Releases the innermost scope and every value stored in it.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
            trace!(depth = self.scopes.len(), "leave scope");
        }
    }

    pub fn global(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn global_mut(&mut self) -> &mut Scope {
        &mut self.scopes[0]
    }

    pub fn current_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Defines `name` in the innermost scope.
    pub fn define(&mut self, name: &str, value: &Value) -> Result<(), Diagnostic> {
        self.current_mut().define(name, value)
    }

    fn find(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Whether `name` is bound anywhere on the chain.
    pub fn resolves(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Resolves `name` innermost-first and hands back a deep copy.
    pub fn lookup(&self, name: &str) -> Result<Value, Diagnostic> {
        match self.find(name) {
            Some(value) => value.deep_copy(),
            None => Err(Diagnostic::undefined(name)),
        }
    }
}
