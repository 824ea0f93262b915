//! Async resources
//!
//! [`Deferred`] is a single-settle cell that producers resolve or reject
//! later. [`create_resource`] turns a reactive source plus a fetcher into a
//! signal of [`ResourceState`], refetching whenever the source changes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::reactive::{create_effect, create_signal, on_cleanup, untrack, Signal};

type Waiter<T, E> = Box<dyn FnOnce(Result<T, E>)>;

enum DeferredState<T, E> {
    Pending(Vec<Waiter<T, E>>),
    Settled(Result<T, E>),
}

/// A value that settles at most once, shared by every clone
pub struct Deferred<T, E> {
    inner: Rc<RefCell<DeferredState<T, E>>>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Deferred<T, E> {
    /// A pending deferred
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredState::Pending(Vec::new()))),
        }
    }

    /// An already resolved deferred
    pub fn resolved(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredState::Settled(Ok(value)))),
        }
    }

    /// An already rejected deferred
    pub fn rejected(error: E) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DeferredState::Settled(Err(error)))),
        }
    }

    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `error`. Returns `false` if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, result: Result<T, E>) -> bool {
        let waiters = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                DeferredState::Pending(waiters) => {
                    let waiters = std::mem::take(waiters);
                    *state = DeferredState::Settled(result.clone());
                    waiters
                }
                DeferredState::Settled(_) => return false,
            }
        };
        for waiter in waiters {
            waiter(result.clone());
        }
        true
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.borrow(), DeferredState::Pending(_))
    }

    /// The settled result, if any
    pub fn result(&self) -> Option<Result<T, E>> {
        match &*self.inner.borrow() {
            DeferredState::Pending(_) => None,
            DeferredState::Settled(result) => Some(result.clone()),
        }
    }

    /// Run `f` once the deferred settles (immediately if it already has)
    pub fn on_settle(&self, f: impl FnOnce(Result<T, E>) + 'static) {
        let settled = {
            let mut state = self.inner.borrow_mut();
            match &mut *state {
                DeferredState::Pending(waiters) => {
                    waiters.push(Box::new(f));
                    return;
                }
                DeferredState::Settled(result) => result.clone(),
            }
        };
        f(settled);
    }

    /// Whether two handles share the same underlying cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Observable state of a resource
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceState<T, E> {
    Pending,
    Ready(T),
    Failed(E),
}

/// Reactive handle to an async resource
pub struct Resource<T, E> {
    state: Signal<ResourceState<T, E>>,
}

impl<T, E> Clone for Resource<T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for Resource<T, E> {}

impl<T: Clone + 'static, E: Clone + 'static> Resource<T, E> {
    /// Current state, recorded as a dependency
    pub fn state(&self) -> ResourceState<T, E> {
        self.state.get()
    }

    /// The loaded value, if ready
    pub fn get(&self) -> Option<T> {
        self.state.with(|s| match s {
            ResourceState::Ready(value) => Some(value.clone()),
            _ => None,
        })
    }

    pub fn loading(&self) -> bool {
        self.state.with(|s| matches!(s, ResourceState::Pending))
    }

    /// The load error, if the last fetch failed
    pub fn error(&self) -> Option<E> {
        self.state.with(|s| match s {
            ResourceState::Failed(error) => Some(error.clone()),
            _ => None,
        })
    }
}

/// Create a resource that calls `fetcher` with the value of `source` and
/// re-fetches when `source` changes
///
/// A result arriving after its fetch was superseded, or after the owning
/// scope was disposed, is discarded.
pub fn create_resource<S, T, E, Src, Fetch>(source: Src, fetcher: Fetch) -> Resource<T, E>
where
    S: 'static,
    T: Clone + 'static,
    E: Clone + 'static,
    Src: Fn() -> S + 'static,
    Fetch: Fn(S) -> Deferred<T, E> + 'static,
{
    let state = create_signal(ResourceState::<T, E>::Pending);

    create_effect(move || {
        let input = source();
        let deferred = untrack(|| fetcher(input));

        let alive = Rc::new(Cell::new(true));
        {
            let alive = alive.clone();
            on_cleanup(move || alive.set(false));
        }

        let already_pending = state.with_untracked(|s| matches!(s, ResourceState::Pending));
        if deferred.is_pending() && !already_pending {
            state.set(ResourceState::Pending);
        }

        deferred.on_settle(move |result| {
            if !alive.get() {
                tracing::debug!("discarding result of a superseded or disposed resource");
                return;
            }
            state.set(match result {
                Ok(value) => ResourceState::Ready(value),
                Err(error) => ResourceState::Failed(error),
            });
        });
    });

    Resource { state }
}
