//! Asset loading
//!
//! Loads are cached per `(loader type, url)`. Requests for an entry that is
//! still loading share the same [`Deferred`], so a url is fetched once no
//! matter how many components ask for it. Failed loads are evicted, which
//! lets a later request try again.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use strand_core::{create_resource, Deferred, Resource};
use thiserror::Error;

use crate::context::require_context;
use crate::error::Result;

/// Why a load failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to load {url}: {reason}")]
    Failed { url: String, reason: String },
}

/// Something that can fetch an asset by url
pub trait Loader: 'static {
    type Output: 'static;

    fn load(&self, url: &str) -> Deferred<Rc<Self::Output>, LoadError>;
}

type Key = (TypeId, String);
type Entries = FxHashMap<Key, Rc<dyn Any>>;

/// Shared cache of loads, keyed by loader type and url
#[derive(Clone, Default)]
pub struct LoaderCache {
    entries: Rc<RefCell<Entries>>,
}

impl LoaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `url`, or join the load already cached for it
    pub fn load<L: Loader>(&self, loader: &L, url: &str) -> Deferred<Rc<L::Output>, LoadError> {
        let key: Key = (TypeId::of::<L>(), url.to_string());
        let cached = self
            .entries
            .borrow()
            .get(&key)
            .and_then(|entry| entry.downcast_ref::<Deferred<Rc<L::Output>, LoadError>>().cloned());
        if let Some(deferred) = cached {
            tracing::trace!(url, "loader cache hit");
            return deferred;
        }

        tracing::debug!(url, "loading");
        let deferred = loader.load(url);
        self.entries
            .borrow_mut()
            .insert(key.clone(), Rc::new(deferred.clone()));

        let entries = Rc::downgrade(&self.entries);
        let watched = deferred.clone();
        deferred.on_settle(move |result| {
            let Err(err) = result else {
                return;
            };
            tracing::warn!(%err, "load failed; evicting cache entry");
            let Some(entries) = entries.upgrade() else {
                return;
            };
            let mut entries = entries.borrow_mut();
            let same = entries
                .get(&key)
                .and_then(|entry| entry.downcast_ref::<Deferred<Rc<L::Output>, LoadError>>())
                .is_some_and(|entry| entry.ptr_eq(&watched));
            if same {
                entries.remove(&key);
            }
        });
        deferred
    }

    /// Start loading `url` ahead of use
    pub fn preload<L: Loader>(&self, loader: &L, url: &str) {
        self.load(loader, url);
    }

    /// Forget the entry for `url` loaded by `L`
    pub fn evict<L: Loader>(&self, url: &str) -> bool {
        self.entries
            .borrow_mut()
            .remove(&(TypeId::of::<L>(), url.to_string()))
            .is_some()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for LoaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderCache")
            .field("entries", &self.len())
            .finish()
    }
}

thread_local! {
    static DEFAULT_LOADERS: LoaderCache = LoaderCache::new();
}

/// This thread's shared loader cache
pub fn default_loader_cache() -> LoaderCache {
    DEFAULT_LOADERS.with(LoaderCache::clone)
}

/// Load the asset at `url` through the root's cache
///
/// `url` is tracked: when what it reads changes, the new url is loaded and
/// the resource goes back to pending until it settles.
pub fn use_loader<L, U>(loader: L, url: U) -> Result<Resource<Rc<L::Output>, LoadError>>
where
    L: Loader,
    U: Fn() -> String + 'static,
{
    let cx = require_context("use_loader")?;
    let cache = cx.loaders().clone();
    Ok(create_resource(url, move |url: String| cache.load(&loader, &url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Manual {
        calls: Rc<Cell<usize>>,
        pending: Rc<RefCell<Vec<Deferred<Rc<String>, LoadError>>>>,
    }

    impl Loader for Manual {
        type Output = String;

        fn load(&self, _url: &str) -> Deferred<Rc<String>, LoadError> {
            self.calls.set(self.calls.get() + 1);
            let deferred = Deferred::new();
            self.pending.borrow_mut().push(deferred.clone());
            deferred
        }
    }

    #[test]
    fn test_in_flight_loads_are_shared() {
        let cache = LoaderCache::new();
        let loader = Manual::default();
        let a = cache.load(&loader, "a.png");
        let b = cache.load(&loader, "a.png");
        assert!(a.ptr_eq(&b));
        assert_eq!(loader.calls.get(), 1);

        loader.pending.borrow()[0].resolve(Rc::new("texture".into()));
        let c = cache.load(&loader, "a.png");
        assert!(c.ptr_eq(&a));
        assert_eq!(c.result().unwrap().unwrap().as_str(), "texture");
        assert_eq!(loader.calls.get(), 1);
    }

    #[test]
    fn test_failed_loads_are_evicted() {
        let cache = LoaderCache::new();
        let loader = Manual::default();
        cache.load(&loader, "missing.png");
        loader.pending.borrow()[0].reject(LoadError::NotFound("missing.png".into()));
        assert!(cache.is_empty());

        cache.load(&loader, "missing.png");
        assert_eq!(loader.calls.get(), 2);
    }

    #[test]
    fn test_urls_and_loader_types_are_separate_entries() {
        struct Other;
        impl Loader for Other {
            type Output = u32;
            fn load(&self, _url: &str) -> Deferred<Rc<u32>, LoadError> {
                Deferred::resolved(Rc::new(7))
            }
        }

        let cache = LoaderCache::new();
        let loader = Manual::default();
        cache.load(&loader, "a");
        cache.load(&loader, "b");
        cache.load(&Other, "a");
        assert_eq!(cache.len(), 3);
        assert!(cache.evict::<Other>("a"));
        assert_eq!(cache.len(), 2);
    }
}
