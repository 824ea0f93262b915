//! Element catalogue
//!
//! Maps element names to engine constructors. Each thread has a default
//! catalogue seeded with the `strand_3d` built-ins; roots can be handed a
//! private one through [`RootConfig::with_catalogue`](crate::RootConfig::with_catalogue).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use strand_3d::{builtins, Constructor, EngineError, ObjectRef, Value};

use crate::error::{FiberError, Result};

#[derive(Default)]
struct CatalogueInner {
    constructors: IndexMap<String, Constructor>,
    components: FxHashMap<String, Component>,
}

/// Shared, mutable name → constructor registry
#[derive(Clone, Default)]
pub struct Catalogue {
    inner: Rc<RefCell<CatalogueInner>>,
}

impl Catalogue {
    /// An empty catalogue
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalogue holding the engine built-ins
    pub fn with_builtins() -> Self {
        let catalogue = Self::new();
        catalogue.extend(builtins());
        catalogue
    }

    /// Merge `mapping` into the catalogue. Later registrations under the same
    /// name replace earlier ones.
    pub fn extend<I>(&self, mapping: I)
    where
        I: IntoIterator<Item = (String, Constructor)>,
    {
        let mut inner = self.inner.borrow_mut();
        for (name, constructor) in mapping {
            tracing::debug!(element = %name, "catalogue entry registered");
            inner.constructors.insert(name, constructor);
        }
    }

    /// Register a single constructor
    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&[Value]) -> strand_3d::Result<ObjectRef> + 'static,
    {
        self.extend([(name.into(), Rc::new(constructor) as Constructor)]);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.borrow().constructors.keys().cloned().collect()
    }

    /// Component factory for `name` (`mesh` and `Mesh` both resolve)
    ///
    /// Factories are created once per name and cached. The constructor itself
    /// is looked up at construction time, so a later [`extend`](Self::extend)
    /// takes effect for existing factories too.
    pub fn resolve_component(&self, name: &str) -> Option<Component> {
        if let Some(component) = self.inner.borrow().components.get(name) {
            return Some(component.clone());
        }
        let resolved = self.lookup(name)?;
        let component = Component {
            name: Rc::from(resolved.as_str()),
            catalogue: self.clone(),
        };
        self.inner
            .borrow_mut()
            .components
            .insert(name.to_string(), component.clone());
        Some(component)
    }

    /// Constructor registered under `name`, accepting a lower-case first
    /// letter
    pub fn constructor(&self, name: &str) -> Option<Constructor> {
        let resolved = self.lookup(name)?;
        self.inner.borrow().constructors.get(&resolved).cloned()
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let inner = self.inner.borrow();
        if inner.constructors.contains_key(name) {
            return Some(name.to_string());
        }
        let capitalized = capitalize(name);
        inner
            .constructors
            .contains_key(&capitalized)
            .then_some(capitalized)
    }

    pub fn ptr_eq(&self, other: &Catalogue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Catalogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalogue")
            .field("names", &self.names())
            .finish()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Factory for one catalogue entry
#[derive(Clone)]
pub struct Component {
    name: Rc<str>,
    catalogue: Catalogue,
}

impl Component {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a new engine object from constructor arguments
    pub fn construct(&self, args: &[Value]) -> Result<ObjectRef> {
        let constructor = self
            .catalogue
            .constructor(&self.name)
            .ok_or_else(|| FiberError::UnknownElement(self.name.to_string()))?;
        constructor(args).map_err(|source: EngineError| {
            tracing::error!(element = %self.name, error = %source, "construction failed");
            FiberError::Construction {
                element: self.name.to_string(),
                source,
            }
        })
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

thread_local! {
    static DEFAULT_CATALOGUE: Catalogue = Catalogue::with_builtins();
}

/// This thread's default catalogue
pub fn default_catalogue() -> Catalogue {
    DEFAULT_CATALOGUE.with(Catalogue::clone)
}

/// Register constructors in the default catalogue
pub fn extend<I>(mapping: I)
where
    I: IntoIterator<Item = (String, Constructor)>,
{
    default_catalogue().extend(mapping);
}

/// Resolve a component in the default catalogue
pub fn resolve_component(name: &str) -> Option<Component> {
    default_catalogue().resolve_component(name)
}
