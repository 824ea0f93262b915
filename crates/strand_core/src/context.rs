//! Context propagation and error reporting
//!
//! Context values are stored on the owner that provided them and found by
//! walking up the owner chain, so a nested scope can shadow an outer value.

use std::any::TypeId;
use std::error::Error;
use std::rc::Rc;

use crate::reactive::with_runtime;

/// Provide a value of type `T` to the current scope and its descendants
///
/// Returns `false` (and drops the value) when called outside any scope.
pub fn provide_context<T: Clone + 'static>(value: T) -> bool {
    let rejected = with_runtime(|rt| match rt.owner.and_then(|o| rt.owners.get_mut(o)) {
        Some(node) => {
            node.contexts.insert(TypeId::of::<T>(), Rc::new(value));
            None
        }
        None => Some(value),
    });
    if rejected.is_some() {
        tracing::warn!(
            context = std::any::type_name::<T>(),
            "provide_context called outside a reactive scope"
        );
        return false;
    }
    true
}

/// Look up the nearest value of type `T` provided by this scope or an ancestor
pub fn use_context<T: Clone + 'static>() -> Option<T> {
    with_runtime(|rt| {
        let mut cursor = rt.owner;
        while let Some(id) = cursor {
            let node = rt.owners.get(id)?;
            if let Some(value) = node.contexts.get(&TypeId::of::<T>()) {
                return value.downcast_ref::<T>().cloned();
            }
            cursor = node.parent;
        }
        None
    })
}

type ErrorCallback = Rc<dyn Fn(&(dyn Error + 'static))>;

#[derive(Clone)]
struct ErrorHandler(ErrorCallback);

/// Install an error handler for the current scope
///
/// Errors reported from this scope or any descendant reach the nearest
/// handler.
pub fn on_error<F>(handler: F)
where
    F: Fn(&(dyn Error + 'static)) + 'static,
{
    provide_context(ErrorHandler(Rc::new(handler)));
}

/// Report an error to the nearest handler
///
/// Falls back to logging when no handler is installed. Returns whether a
/// handler received the error.
pub fn report_error(error: &(dyn Error + 'static)) -> bool {
    match use_context::<ErrorHandler>() {
        Some(handler) => {
            (handler.0)(error);
            true
        }
        None => {
            tracing::error!(%error, "unhandled error in reactive scope");
            false
        }
    }
}
