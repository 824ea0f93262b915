//! Instance model
//!
//! Every engine object the reconciler manages gets an [`Instance`] record in
//! the [`SceneStore`] arena. Parent and child links are arena handles, and a
//! side table maps engine object ids back to their instance, so engine objects
//! never carry reconciler metadata themselves.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use strand_3d::{ObjectId, ObjectRef, Value};
use strand_core::Signal;

use crate::events::{EventKind, Handler};

new_key_type! {
    /// Stable handle to an instance in the arena
    pub struct InstanceId;
}

/// Custom attach callback: performs the attachment and returns the detach
pub type AttachFn = Rc<dyn Fn(&ObjectRef, &ObjectRef) -> Box<dyn FnOnce()>>;

/// Declared attach instruction
#[derive(Clone)]
pub enum Attach {
    /// Dashed slot path on the parent (`"material"`, `"material-0"`)
    Path(String),
    /// Callback attach
    Callback(AttachFn),
}

impl fmt::Debug for Attach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attach::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Attach::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Metadata supplied when an object is first augmented
#[derive(Clone, Debug, Default)]
pub struct InstanceData {
    pub attach: Option<Attach>,
    pub primitive: bool,
}

/// Reconciler bookkeeping for one engine object
pub struct Instance {
    pub object: ObjectRef,
    /// Last applied declarative prop values
    pub props: IndexMap<String, Value>,
    /// Attached children, in attach order
    pub children: IndexSet<InstanceId>,
    pub parent: Option<InstanceId>,
    pub event_handler_count: usize,
    pub handlers: FxHashMap<EventKind, Handler>,
    pub attach: Option<Attach>,
    /// Slot value displaced by this instance's path attachment
    pub previous_attach: Option<Value>,
    pub is_hidden: bool,
    /// Adopted from user code rather than constructed
    pub primitive: bool,
    /// Dispose the engine object on teardown. Off for primitives unless the
    /// `dispose` prop turns it on.
    pub dispose: bool,
    /// Tracks rebinding to a new object when constructor args change
    pub(crate) binding: Option<Signal<ObjectRef>>,
}

impl Instance {
    fn new(object: ObjectRef, data: InstanceData) -> Self {
        Self {
            object,
            props: IndexMap::new(),
            children: IndexSet::new(),
            parent: None,
            event_handler_count: 0,
            handlers: FxHashMap::default(),
            attach: data.attach,
            previous_attach: None,
            is_hidden: false,
            primitive: data.primitive,
            dispose: !data.primitive,
            binding: None,
        }
    }

    /// Kinds this instance declares handlers for
    pub fn handler_kinds(&self) -> SmallVec<[EventKind; 4]> {
        self.handlers.keys().copied().collect()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("object", &self.object)
            .field("props", &self.props)
            .field("children", &self.children)
            .field("parent", &self.parent)
            .field("event_handler_count", &self.event_handler_count)
            .field("attach", &self.attach)
            .field("is_hidden", &self.is_hidden)
            .field("primitive", &self.primitive)
            .finish_non_exhaustive()
    }
}

/// Arena of instances plus the object → instance side table
///
/// Accessors take short borrows; nothing here calls back into user code.
#[derive(Default)]
pub struct SceneStore {
    instances: RefCell<SlotMap<InstanceId, Instance>>,
    index: RefCell<FxHashMap<ObjectId, InstanceId>>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach instance metadata to `object`
    ///
    /// Idempotent: if `object` already has an instance its id is returned and
    /// the existing metadata is left untouched.
    pub fn augment(&self, object: &ObjectRef, data: InstanceData) -> InstanceId {
        if let Some(id) = self.instance_of(object) {
            return id;
        }
        let id = self
            .instances
            .borrow_mut()
            .insert(Instance::new(object.clone(), data));
        self.index.borrow_mut().insert(object.id(), id);
        tracing::trace!(%object, ?id, "augmented");
        id
    }

    pub fn is_instance(&self, object: &ObjectRef) -> bool {
        self.index.borrow().contains_key(&object.id())
    }

    pub fn instance_of(&self, object: &ObjectRef) -> Option<InstanceId> {
        self.index.borrow().get(&object.id()).copied()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an instance
    pub fn with<R>(&self, id: InstanceId, f: impl FnOnce(&Instance) -> R) -> Option<R> {
        self.instances.borrow().get(id).map(f)
    }

    /// Mutate an instance
    pub fn with_mut<R>(&self, id: InstanceId, f: impl FnOnce(&mut Instance) -> R) -> Option<R> {
        self.instances.borrow_mut().get_mut(id).map(f)
    }

    pub fn object(&self, id: InstanceId) -> Option<ObjectRef> {
        self.with(id, |i| i.object.clone())
    }

    pub fn parent(&self, id: InstanceId) -> Option<InstanceId> {
        self.with(id, |i| i.parent).flatten()
    }

    pub fn children(&self, id: InstanceId) -> Vec<InstanceId> {
        self.with(id, |i| i.children.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn handler(&self, id: InstanceId, kind: EventKind) -> Option<Handler> {
        self.with(id, |i| i.handlers.get(&kind).cloned()).flatten()
    }

    /// Nearest instance owning `object`, walking up engine parents
    pub fn owning_instance(&self, object: &ObjectRef) -> Option<InstanceId> {
        let mut current = Some(object.clone());
        while let Some(object) = current {
            if let Some(id) = self.instance_of(&object) {
                return Some(id);
            }
            current = object.parent();
        }
        None
    }

    /// `id` followed by its instance ancestors, nearest first
    pub fn ancestry(&self, id: InstanceId) -> SmallVec<[InstanceId; 8]> {
        let mut path = SmallVec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            if path.contains(&id) {
                break;
            }
            path.push(id);
            current = self.parent(id);
        }
        path
    }

    /// Point `id` at a replacement object
    pub(crate) fn rebind(&self, id: InstanceId, object: &ObjectRef) -> Option<ObjectRef> {
        let old = self.with_mut(id, |i| std::mem::replace(&mut i.object, object.clone()))?;
        let mut index = self.index.borrow_mut();
        index.remove(&old.id());
        index.insert(object.id(), id);
        Some(old)
    }

    /// Remove an instance and its side-table entry
    pub fn remove(&self, id: InstanceId) -> Option<Instance> {
        let instance = self.instances.borrow_mut().remove(id)?;
        let mut index = self.index.borrow_mut();
        if index.get(&instance.object.id()) == Some(&id) {
            index.remove(&instance.object.id());
        }
        Some(instance)
    }
}

impl fmt::Debug for SceneStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneStore")
            .field("instances", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_3d::construct;

    fn object(name: &str) -> ObjectRef {
        construct(name, &[]).unwrap().unwrap()
    }

    #[test]
    fn test_augment_is_idempotent() {
        let store = SceneStore::new();
        let mesh = object("Mesh");
        let first = store.augment(
            &mesh,
            InstanceData {
                attach: Some(Attach::Path("foo".into())),
                primitive: true,
            },
        );
        store.with_mut(first, |i| i.is_hidden = true);

        let second = store.augment(&mesh, InstanceData::default());
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        store
            .with(second, |i| {
                assert!(i.is_hidden);
                assert!(i.primitive);
                assert!(matches!(&i.attach, Some(Attach::Path(p)) if p == "foo"));
            })
            .unwrap();
    }

    #[test]
    fn test_is_instance() {
        let store = SceneStore::new();
        let mesh = object("Mesh");
        assert!(!store.is_instance(&mesh));
        let id = store.augment(&mesh, InstanceData::default());
        assert!(store.is_instance(&mesh));
        store.remove(id);
        assert!(!store.is_instance(&mesh));
    }

    #[test]
    fn test_owning_instance_walks_engine_parents() {
        let store = SceneStore::new();
        let group = object("Group");
        let inner = object("Mesh");
        group.add(&inner).unwrap();
        let id = store.augment(&group, InstanceData::default());
        assert_eq!(store.owning_instance(&inner), Some(id));
    }

    #[test]
    fn test_rebind_updates_side_table() {
        let store = SceneStore::new();
        let old = object("Mesh");
        let new = object("Mesh");
        let id = store.augment(&old, InstanceData::default());
        assert_eq!(store.rebind(id, &new), Some(old.clone()));
        assert_eq!(store.instance_of(&new), Some(id));
        assert!(!store.is_instance(&old));
    }

    #[test]
    fn test_ancestry_nearest_first() {
        let store = SceneStore::new();
        let a = store.augment(&object("Group"), InstanceData::default());
        let b = store.augment(&object("Group"), InstanceData::default());
        let c = store.augment(&object("Mesh"), InstanceData::default());
        store.with_mut(b, |i| i.parent = Some(a));
        store.with_mut(c, |i| i.parent = Some(b));
        assert_eq!(store.ancestry(c).as_slice(), &[c, b, a]);
    }
}
