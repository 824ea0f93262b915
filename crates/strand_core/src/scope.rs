//! Reactive scopes
//!
//! A scope owns signals, computations and cleanup callbacks. Disposing a scope
//! tears down everything it owns, children first, exactly once.

use crate::reactive::{dispose_owner, with_runtime, OwnerId};

/// Handle to an owner in the reactive runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Scope {
    id: OwnerId,
}

impl Scope {
    pub(crate) fn from_id(id: OwnerId) -> Self {
        Self { id }
    }

    /// The underlying owner id
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// The scope currently receiving new reactive nodes, if any
    pub fn current() -> Option<Scope> {
        with_runtime(|rt| rt.owner).map(Scope::from_id)
    }

    /// Whether the scope has not been disposed yet
    pub fn is_alive(&self) -> bool {
        with_runtime(|rt| rt.owners.contains_key(self.id))
    }

    /// Run `f` with this scope as the owner. Reads inside `f` are untracked.
    pub fn run_in<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = with_runtime(|rt| {
            let previous = (rt.owner, rt.observer);
            rt.owner = Some(self.id);
            rt.observer = None;
            previous
        });
        let result = f();
        with_runtime(|rt| {
            rt.owner = previous.0;
            rt.observer = previous.1;
        });
        result
    }

    /// Create a child scope of this one and run `f` inside it
    pub fn create_child<R>(&self, f: impl FnOnce() -> R) -> (R, Scope) {
        let id = with_runtime(|rt| rt.create_owner(Some(self.id), None));
        let child = Scope::from_id(id);
        (child.run_in(f), child)
    }

    /// Dispose the scope, its children and its signals, running cleanups once
    pub fn dispose(self) {
        dispose_owner(self.id);
    }
}

/// Create a detached root scope and run `f` inside it
///
/// The returned scope lives until [`Scope::dispose`] is called.
pub fn create_root<R>(f: impl FnOnce() -> R) -> (R, Scope) {
    let id = with_runtime(|rt| rt.create_owner(None, None));
    let scope = Scope::from_id(id);
    (scope.run_in(f), scope)
}

/// Create a scope owned by the current scope (or a root if there is none)
pub fn create_scope<R>(f: impl FnOnce() -> R) -> (R, Scope) {
    match Scope::current() {
        Some(parent) => parent.create_child(f),
        None => create_root(f),
    }
}
