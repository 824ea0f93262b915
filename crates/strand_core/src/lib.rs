//! Strand Core Runtime
//!
//! This crate provides the reactive primitives the Strand reconciler is built
//! on:
//!
//! - **Signals and memos**: fine-grained reactivity with automatic dependency tracking
//! - **Effects and scopes**: computations that own cleanup callbacks and child scopes
//! - **Context**: values provided by a scope and consumed by its descendants
//! - **Keyed lists**: stable per-key rows for reactive collections
//! - **Resources**: async values with pending/ready/failed states
//!
//! The runtime is thread-local and single-threaded. Each thread gets its own
//! independent graph.
//!
//! # Example
//!
//! ```rust
//! use strand_core::{create_memo, create_root, create_signal};
//!
//! let ((count, doubled), scope) = create_root(|| {
//!     let count = create_signal(2i32);
//!     let doubled = create_memo(move || count.get() * 2);
//!     (count, doubled)
//! });
//!
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! scope.dispose();
//! ```

pub mod context;
pub mod list;
pub mod reactive;
pub mod resource;
pub mod scope;

pub use context::{on_error, provide_context, report_error, use_context};
pub use list::map_keyed;
pub use reactive::{
    batch, create_effect, create_memo, create_signal, on_cleanup, stats, untrack, Memo, OwnerId,
    ReactiveStats, Signal, SignalId,
};
pub use resource::{create_resource, Deferred, Resource, ResourceState};
pub use scope::{create_root, create_scope, Scope};
