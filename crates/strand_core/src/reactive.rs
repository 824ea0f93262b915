//! Fine-grained reactive runtime
//!
//! Inspired by Leptos/SolidJS signals with automatic dependency tracking.
//! This implements a push-based reactive system owned by a thread-local
//! runtime:
//! - Signals push invalidation notifications to the computations that read them
//! - Memos are computations that write their result into a signal
//! - Effects are scheduled, sorted by depth and flushed after the outermost batch
//!
//! Every computation is also an *owner*: signals, child computations, cleanup
//! callbacks and context values created while it runs belong to it and are
//! torn down before it re-runs or when it is disposed.
//!
//! ```
//! use strand_core::{create_effect, create_root, create_signal};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let (count, scope) = create_root(|| {
//!     let count = create_signal(0i32);
//!     let seen = seen.clone();
//!     create_effect(move || seen.borrow_mut().push(count.get()));
//!     count
//! });
//!
//! count.set(5);
//! assert_eq!(*seen.borrow(), vec![0, 5]);
//! scope.dispose();
//! ```

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::scope::Scope;

new_key_type! {
    /// Unique identifier for a signal
    pub struct SignalId;
    /// Unique identifier for an owner (scope or computation)
    pub struct OwnerId;
}

pub(crate) type Cleanup = Box<dyn FnOnce()>;
type SharedValue = Rc<RefCell<Box<dyn Any>>>;

/// Internal signal node storage
pub(crate) struct SignalNode {
    /// The signal value (type-erased)
    value: SharedValue,
    /// Version counter for change detection
    version: u64,
    /// Computations to notify on change
    subscribers: SmallVec<[OwnerId; 4]>,
}

/// A re-runnable computation attached to an owner
pub(crate) struct Computation {
    /// Taken out of the node while it runs
    run: Option<Box<dyn FnMut()>>,
    /// Signals read during the last run
    sources: SmallVec<[SignalId; 4]>,
    dirty: bool,
}

/// Internal owner node storage
pub(crate) struct OwnerNode {
    pub(crate) parent: Option<OwnerId>,
    children: SmallVec<[OwnerId; 4]>,
    signals: SmallVec<[SignalId; 4]>,
    cleanups: Vec<Cleanup>,
    pub(crate) contexts: FxHashMap<TypeId, Rc<dyn Any>>,
    computation: Option<Computation>,
}

struct PreparedRun {
    run: Box<dyn FnMut()>,
    children: SmallVec<[OwnerId; 4]>,
    cleanups: Vec<Cleanup>,
    signals: Vec<SignalNode>,
}

/// The reactive runtime that owns all signals, owners and pending computations
pub(crate) struct Runtime {
    signals: SlotMap<SignalId, SignalNode>,
    pub(crate) owners: SlotMap<OwnerId, OwnerNode>,
    /// Owner that receives newly created nodes
    pub(crate) owner: Option<OwnerId>,
    /// Computation currently recording dependencies
    pub(crate) observer: Option<OwnerId>,
    pending: VecDeque<OwnerId>,
    batch_depth: u32,
    flushing: bool,
}

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// Run `f` with exclusive access to the thread's runtime.
///
/// Callers must never invoke user code from inside `f`.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

impl Runtime {
    fn new() -> Self {
        Self {
            signals: SlotMap::with_key(),
            owners: SlotMap::with_key(),
            owner: None,
            observer: None,
            pending: VecDeque::new(),
            batch_depth: 0,
            flushing: false,
        }
    }

    pub(crate) fn create_owner(
        &mut self,
        parent: Option<OwnerId>,
        computation: Option<Computation>,
    ) -> OwnerId {
        let id = self.owners.insert(OwnerNode {
            parent,
            children: SmallVec::new(),
            signals: SmallVec::new(),
            cleanups: Vec::new(),
            contexts: FxHashMap::default(),
            computation,
        });
        if let Some(node) = parent.and_then(|p| self.owners.get_mut(p)) {
            node.children.push(id);
        }
        id
    }

    fn create_signal_node(&mut self, value: Box<dyn Any>) -> SignalId {
        let id = self.signals.insert(SignalNode {
            value: Rc::new(RefCell::new(value)),
            version: 0,
            subscribers: SmallVec::new(),
        });
        if let Some(node) = self.owner.and_then(|o| self.owners.get_mut(o)) {
            node.signals.push(id);
        }
        id
    }

    /// Record `signal` as a dependency of the current observer
    fn track(&mut self, signal: SignalId) {
        let Some(observer) = self.observer else {
            return;
        };
        let Some(comp) = self
            .owners
            .get_mut(observer)
            .and_then(|n| n.computation.as_mut())
        else {
            return;
        };
        if !comp.sources.contains(&signal) {
            comp.sources.push(signal);
        }
        if let Some(node) = self.signals.get_mut(signal) {
            if !node.subscribers.contains(&observer) {
                node.subscribers.push(observer);
            }
        }
    }

    /// Mark every subscriber of `signal` dirty and queue it
    fn notify(&mut self, signal: SignalId) {
        let subscribers = match self.signals.get(signal) {
            Some(node) => node.subscribers.clone(),
            None => return,
        };
        for sub in subscribers {
            if let Some(comp) = self
                .owners
                .get_mut(sub)
                .and_then(|n| n.computation.as_mut())
            {
                if !comp.dirty {
                    comp.dirty = true;
                    self.pending.push_back(sub);
                }
            }
        }
    }

    fn unsubscribe(&mut self, owner: OwnerId, sources: &[SignalId]) {
        for source in sources {
            if let Some(node) = self.signals.get_mut(*source) {
                node.subscribers.retain(|s| *s != owner);
            }
        }
    }

    fn depth(&self, mut id: OwnerId) -> u32 {
        let mut depth = 0;
        while let Some(parent) = self.owners.get(id).and_then(|n| n.parent) {
            depth += 1;
            id = parent;
        }
        depth
    }

    fn begin_run(&mut self, id: OwnerId) -> Option<PreparedRun> {
        let node = self.owners.get_mut(id)?;
        let comp = node.computation.as_mut()?;
        if !comp.dirty {
            return None;
        }
        let run = comp.run.take()?;
        comp.dirty = false;
        let sources = std::mem::take(&mut comp.sources);
        let children = std::mem::take(&mut node.children);
        let cleanups = std::mem::take(&mut node.cleanups);
        let owned = std::mem::take(&mut node.signals);
        node.contexts.clear();

        self.unsubscribe(id, &sources);
        let signals = owned
            .iter()
            .filter_map(|s| self.signals.remove(*s))
            .collect();

        Some(PreparedRun {
            run,
            children,
            cleanups,
            signals,
        })
    }

    pub(crate) fn detach_owner(&mut self, id: OwnerId) -> Option<OwnerNode> {
        let node = self.owners.remove(id)?;
        if let Some(parent) = node.parent.and_then(|p| self.owners.get_mut(p)) {
            parent.children.retain(|c| *c != id);
        }
        if let Some(comp) = &node.computation {
            self.unsubscribe(id, &comp.sources);
        }
        self.pending.retain(|p| *p != id);
        Some(node)
    }
}

/// Run a dirty computation, tearing down whatever its previous run owned
pub(crate) fn run_computation(id: OwnerId) {
    let Some(prepared) = with_runtime(|rt| rt.begin_run(id)) else {
        return;
    };
    let PreparedRun {
        mut run,
        children,
        cleanups,
        signals,
    } = prepared;

    for child in children {
        dispose_owner(child);
    }
    run_cleanups(cleanups);
    drop(signals);

    let previous = with_runtime(|rt| (rt.owner.replace(id), rt.observer.replace(id)));
    run();

    let orphaned = with_runtime(move |rt| {
        rt.owner = previous.0;
        rt.observer = previous.1;
        match rt.owners.get_mut(id).and_then(|n| n.computation.as_mut()) {
            Some(comp) => {
                comp.run = Some(run);
                None
            }
            // Disposed while running
            None => Some(run),
        }
    });
    drop(orphaned);
}

/// Dispose an owner and everything it owns
pub(crate) fn dispose_owner(id: OwnerId) {
    let Some(node) = with_runtime(|rt| rt.detach_owner(id)) else {
        return;
    };
    let OwnerNode {
        children,
        signals,
        cleanups,
        computation,
        contexts,
        ..
    } = node;

    for child in children {
        dispose_owner(child);
    }
    run_cleanups(cleanups);

    let removed: Vec<SignalNode> =
        with_runtime(|rt| signals.iter().filter_map(|s| rt.signals.remove(*s)).collect());
    drop(removed);
    drop(computation);
    drop(contexts);
}

fn run_cleanups(cleanups: Vec<Cleanup>) {
    if cleanups.is_empty() {
        return;
    }
    untrack(|| {
        for cleanup in cleanups {
            cleanup();
        }
    });
}

/// Flush all pending computations
fn flush() {
    let started = with_runtime(|rt| {
        if rt.flushing || rt.batch_depth > 0 {
            false
        } else {
            rt.flushing = true;
            true
        }
    });
    if !started {
        return;
    }

    loop {
        // Sort by depth so parents re-run (and dispose stale children) first
        let queue: Vec<OwnerId> = with_runtime(|rt| {
            let mut ids: Vec<OwnerId> = rt.pending.drain(..).collect();
            ids.sort_by_key(|id| rt.depth(*id));
            ids
        });
        if queue.is_empty() {
            break;
        }
        for id in queue {
            run_computation(id);
        }
    }

    with_runtime(|rt| rt.flushing = false);
}

// =============================================================================
// SIGNALS
// =============================================================================

/// A reactive signal handle (cheap to copy)
pub struct Signal<T> {
    id: SignalId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Signal").field(&self.id).finish()
    }
}

fn disposed(id: SignalId) -> ! {
    panic!("signal {id:?} was read after its owning scope was disposed")
}

/// Create a new signal owned by the current scope
pub fn create_signal<T: 'static>(initial: T) -> Signal<T> {
    let id = with_runtime(|rt| rt.create_signal_node(Box::new(initial)));
    Signal {
        id,
        _marker: PhantomData,
    }
}

impl<T: 'static> Signal<T> {
    /// Get the signal's internal ID
    pub fn id(&self) -> SignalId {
        self.id
    }

    fn shared_value(&self, tracked: bool) -> Option<SharedValue> {
        with_runtime(|rt| {
            if tracked {
                rt.track(self.id);
            }
            rt.signals.get(self.id).map(|n| n.value.clone())
        })
    }

    /// Borrow the value, recording a dependency. `None` once disposed.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let value = self.shared_value(true)?;
        let guard = value.borrow();
        guard.downcast_ref::<T>().map(f)
    }

    /// Borrow the value without recording a dependency
    pub fn try_with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let value = self.shared_value(false)?;
        let guard = value.borrow();
        guard.downcast_ref::<T>().map(f)
    }

    /// Borrow the value, recording a dependency
    ///
    /// # Panics
    /// Panics if the owning scope has been disposed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let id = self.id;
        self.try_with(f).unwrap_or_else(|| disposed(id))
    }

    /// Borrow the value without recording a dependency
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let id = self.id;
        self.try_with_untracked(f).unwrap_or_else(|| disposed(id))
    }

    /// Get the current value
    ///
    /// If called within a computation, this signal is recorded as a dependency.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Get the current value without tracking as a dependency
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Get the current value, or `None` if the signal was disposed
    pub fn try_get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Set the value of a signal, triggering reactive updates
    pub fn set(&self, value: T) {
        let outcome = with_runtime(|rt| {
            let node = rt.signals.get_mut(self.id)?;
            let old = std::mem::replace(&mut *node.value.borrow_mut(), Box::new(value));
            node.version += 1;
            rt.notify(self.id);
            Some(old)
        });
        match outcome {
            Some(old) => {
                drop(old);
                flush();
            }
            None => tracing::debug!(signal = ?self.id, "write to a disposed signal ignored"),
        }
    }

    /// Update a signal in place
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let Some(value) = self.shared_value(false) else {
            tracing::debug!(signal = ?self.id, "update of a disposed signal ignored");
            return;
        };
        {
            let mut guard = value.borrow_mut();
            match guard.downcast_mut::<T>() {
                Some(inner) => f(inner),
                None => return,
            }
        }
        with_runtime(|rt| {
            if let Some(node) = rt.signals.get_mut(self.id) {
                node.version += 1;
            }
            rt.notify(self.id);
        });
        flush();
    }

    /// Get the version of a signal (for change detection)
    pub fn version(&self) -> Option<u64> {
        with_runtime(|rt| rt.signals.get(self.id).map(|n| n.version))
    }
}

// =============================================================================
// MEMOS
// =============================================================================

/// A derived value that only notifies dependents when its result changes
pub struct Memo<T> {
    signal: Signal<T>,
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Memo<T> {}

impl<T> std::fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Memo").field(&self.signal.id).finish()
    }
}

impl<T: Clone + 'static> Memo<T> {
    /// Read the memoised value, recording a dependency
    pub fn get(&self) -> T {
        self.signal.get()
    }

    /// Read without recording a dependency
    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    /// Borrow the memoised value
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// Read the value, or `None` if the owning scope was disposed
    pub fn try_get(&self) -> Option<T> {
        self.signal.try_get()
    }
}

/// Create a memoised computation
///
/// `compute` runs immediately and again whenever a signal it read changes;
/// dependents are only notified when the new result differs.
pub fn create_memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    // Placeholder until the first evaluation stores a `T`
    let id = with_runtime(|rt| rt.create_signal_node(Box::new(())));
    let signal = Signal::<T> {
        id,
        _marker: PhantomData,
    };
    create_effect(move || {
        let next = compute();
        let changed = signal
            .try_with_untracked(|current| current != &next)
            .unwrap_or(true);
        if changed {
            signal.set(next);
        }
    });
    Memo { signal }
}

// =============================================================================
// EFFECTS
// =============================================================================

/// Create an effect that runs now and again whenever its dependencies change
///
/// Returns the effect's scope; disposing it stops the effect and runs its
/// cleanups.
pub fn create_effect<F>(run: F) -> Scope
where
    F: FnMut() + 'static,
{
    let id = with_runtime(|rt| {
        let parent = rt.owner;
        rt.create_owner(
            parent,
            Some(Computation {
                run: Some(Box::new(run)),
                sources: SmallVec::new(),
                dirty: true,
            }),
        )
    });
    batch(|| run_computation(id));
    Scope::from_id(id)
}

/// Register a callback that runs once when the current scope is disposed
/// (or before the current computation re-runs)
pub fn on_cleanup<F>(cleanup: F)
where
    F: FnOnce() + 'static,
{
    let rejected = with_runtime(|rt| match rt.owner.and_then(|o| rt.owners.get_mut(o)) {
        Some(node) => {
            node.cleanups.push(Box::new(cleanup));
            None
        }
        None => Some(cleanup),
    });
    if rejected.is_some() {
        tracing::warn!("on_cleanup called outside a reactive scope; the callback will never run");
    }
}

/// Run `f` without recording dependencies
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let previous = with_runtime(|rt| rt.observer.take());
    let result = f();
    with_runtime(|rt| rt.observer = previous);
    result
}

/// Run a function in a batch context; effects flush when the outermost
/// batch ends
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    with_runtime(|rt| rt.batch_depth += 1);
    let result = f();
    let outermost = with_runtime(|rt| {
        rt.batch_depth -= 1;
        rt.batch_depth == 0
    });
    if outermost {
        flush();
    }
    result
}

/// Statistics about the reactive runtime of the current thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactiveStats {
    pub signal_count: usize,
    pub owner_count: usize,
    pub pending_effects: usize,
}

/// Get statistics about the current thread's runtime
pub fn stats() -> ReactiveStats {
    with_runtime(|rt| ReactiveStats {
        signal_count: rt.signals.len(),
        owner_count: rt.owners.len(),
        pending_effects: rt.pending.len(),
    })
}
