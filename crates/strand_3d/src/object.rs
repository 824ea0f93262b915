//! Engine objects
//!
//! An [`ObjectRef`] is a shared handle to a property-bag object. Objects with
//! the [`ObjectTraits::NODE`] trait take part in the scene graph through
//! [`ObjectRef::add`] and [`ObjectRef::remove`]; everything else (materials,
//! geometries, fog, textures) is reachable only through property slots.

use bitflags::bitflags;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EngineError, Result};
use crate::math::{HitShape, Mat4, Vec3};
use crate::value::Value;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique object identity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Capabilities of an engine object type
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ObjectTraits: u32 {
        /// Supports native child-list membership
        const NODE = 1 << 0;
        const SCENE = 1 << 1;
        const CAMERA = 1 << 2;
        const PERSPECTIVE = 1 << 3;
        const ORTHOGRAPHIC = 1 << 4;
        const MESH = 1 << 5;
        const LIGHT = 1 << 6;
        const MATERIAL = 1 << 7;
        const GEOMETRY = 1 << 8;
        const FOG = 1 << 9;
        const TEXTURE = 1 << 10;
        const RENDERER = 1 << 11;
        /// Has a `dispose` hook that releases host resources
        const DISPOSABLE = 1 << 12;
    }
}

struct ObjectState {
    props: IndexMap<String, Value>,
    children: Vec<ObjectRef>,
    parent: Weak<ObjectCell>,
    shape: Option<HitShape>,
    dispose_count: u32,
}

struct ObjectCell {
    id: ObjectId,
    kind: String,
    traits: ObjectTraits,
    state: RefCell<ObjectState>,
}

/// Shared handle to an engine object
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectCell>);

impl ObjectRef {
    /// Create an object of the given type name with no properties
    pub fn new(kind: impl Into<String>, traits: ObjectTraits) -> Self {
        Self(Rc::new(ObjectCell {
            id: ObjectId::next(),
            kind: kind.into(),
            traits,
            state: RefCell::new(ObjectState {
                props: IndexMap::new(),
                children: Vec::new(),
                parent: Weak::new(),
                shape: None,
                dispose_count: 0,
            }),
        }))
    }

    /// Builder-style property initialisation
    pub fn with_prop(self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value.into());
        self
    }

    /// Builder-style hit shape
    pub fn with_shape(self, shape: HitShape) -> Self {
        self.0.state.borrow_mut().shape = Some(shape);
        self
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Type name (`"Mesh"`, `"Group"`, ...)
    pub fn kind(&self) -> &str {
        &self.0.kind
    }

    pub fn traits(&self) -> ObjectTraits {
        self.0.traits
    }

    /// Whether the object has all of `traits`
    pub fn is(&self, traits: ObjectTraits) -> bool {
        self.0.traits.contains(traits)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Properties
    // ─────────────────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.state.borrow().props.get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.state.borrow().props.contains_key(key)
    }

    /// Assign a slot, returning the previous value
    pub fn set(&self, key: &str, value: Value) -> Option<Value> {
        self.0.state.borrow_mut().props.insert(key.to_string(), value)
    }

    /// Delete a slot, returning its value
    pub fn remove_prop(&self, key: &str) -> Option<Value> {
        self.0.state.borrow_mut().props.shift_remove(key)
    }

    pub fn prop_keys(&self) -> Vec<String> {
        self.0.state.borrow().props.keys().cloned().collect()
    }

    /// Mutate an existing slot in place
    pub fn with_prop_mut<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let mut state = self.0.state.borrow_mut();
        state.props.get_mut(key).map(f)
    }

    /// Read-only view of all properties
    pub fn props(&self) -> Ref<'_, IndexMap<String, Value>> {
        Ref::map(self.0.state.borrow(), |s| &s.props)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scene graph
    // ─────────────────────────────────────────────────────────────────────

    /// Append `child` to this object's child list, detaching it from any
    /// previous parent
    pub fn add(&self, child: &ObjectRef) -> Result<()> {
        let rejected = |reason| EngineError::InvalidChild {
            parent: self.to_string(),
            child: child.to_string(),
            reason,
        };
        if !self.is(ObjectTraits::NODE) || !child.is(ObjectTraits::NODE) {
            return Err(rejected("both objects must be scene-graph nodes"));
        }
        if self.ptr_eq(child) {
            return Err(rejected("an object cannot be added to itself"));
        }
        if let Some(previous) = child.parent() {
            previous.remove(child);
        }
        self.0.state.borrow_mut().children.push(child.clone());
        child.0.state.borrow_mut().parent = Rc::downgrade(&self.0);
        Ok(())
    }

    /// Remove `child` from this object's child list
    pub fn remove(&self, child: &ObjectRef) -> bool {
        let removed = {
            let mut state = self.0.state.borrow_mut();
            let before = state.children.len();
            state.children.retain(|c| !c.ptr_eq(child));
            state.children.len() != before
        };
        if removed {
            child.0.state.borrow_mut().parent = Weak::new();
        }
        removed
    }

    pub fn children(&self) -> Vec<ObjectRef> {
        self.0.state.borrow().children.clone()
    }

    pub fn child_index(&self, child: &ObjectRef) -> Option<usize> {
        self.0
            .state
            .borrow()
            .children
            .iter()
            .position(|c| c.ptr_eq(child))
    }

    /// Move an existing child to `index` without detaching it
    pub fn move_child(&self, child: &ObjectRef, index: usize) -> bool {
        let mut state = self.0.state.borrow_mut();
        let Some(from) = state.children.iter().position(|c| c.ptr_eq(child)) else {
            return false;
        };
        let moved = state.children.remove(from);
        let index = index.min(state.children.len());
        state.children.insert(index, moved);
        true
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        self.0.state.borrow().parent.upgrade().map(ObjectRef)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Whether the object has a disposal hook
    pub fn has_dispose(&self) -> bool {
        self.is(ObjectTraits::DISPOSABLE)
    }

    /// Release host resources. Returns `false` for objects without a hook.
    pub fn dispose(&self) -> bool {
        if !self.has_dispose() {
            return false;
        }
        self.0.state.borrow_mut().dispose_count += 1;
        tracing::trace!(object = %self, "disposed");
        true
    }

    /// How many times the disposal hook ran
    pub fn dispose_count(&self) -> u32 {
        self.0.state.borrow().dispose_count
    }

    // ─────────────────────────────────────────────────────────────────────
    // Spatial
    // ─────────────────────────────────────────────────────────────────────

    /// Shape used for hit testing. Meshes use their geometry's shape.
    pub fn hit_shape(&self) -> Option<HitShape> {
        if self.is(ObjectTraits::MESH) {
            if let Some(Value::Object(geometry)) = self.get("geometry") {
                return geometry.0.state.borrow().shape;
            }
        }
        self.0.state.borrow().shape
    }

    /// Transform from local space to the parent's space
    pub fn local_matrix(&self) -> Mat4 {
        let state = self.0.state.borrow();
        let position = state
            .props
            .get("position")
            .and_then(Value::as_vec3)
            .unwrap_or(Vec3::ZERO);
        let rotation = state
            .props
            .get("rotation")
            .and_then(Value::as_euler)
            .unwrap_or_default();
        let scale = state
            .props
            .get("scale")
            .and_then(Value::as_vec3)
            .unwrap_or(Vec3::ONE);
        Mat4::compose(position, rotation, scale)
    }

    /// Transform from local space to world space
    pub fn world_matrix(&self) -> Mat4 {
        let mut chain: SmallVec<[Mat4; 8]> = SmallVec::new();
        let mut cursor = Some(self.clone());
        while let Some(object) = cursor {
            chain.push(object.local_matrix());
            cursor = object.parent();
        }
        chain
            .iter()
            .rev()
            .fold(Mat4::IDENTITY, |world, local| world.mul(local))
    }

    /// World-space position
    pub fn world_position(&self) -> Vec3 {
        self.world_matrix().position()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.kind, self.0.id.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: &str) -> ObjectRef {
        ObjectRef::new(kind, ObjectTraits::NODE)
    }

    #[test]
    fn test_add_reparents() {
        let a = node("Group");
        let b = node("Group");
        let child = node("Object3D");

        a.add(&child).unwrap();
        b.add(&child).unwrap();

        assert!(a.children().is_empty());
        assert_eq!(b.children(), vec![child.clone()]);
        assert_eq!(child.parent(), Some(b));
    }

    #[test]
    fn test_add_rejects_non_nodes() {
        let group = node("Group");
        let material = ObjectRef::new("MeshBasicMaterial", ObjectTraits::MATERIAL);
        assert!(group.add(&material).is_err());
        assert!(group.add(&group).is_err());
    }

    #[test]
    fn test_move_child_keeps_identity() {
        let parent = node("Group");
        let kids: Vec<_> = (0..3).map(|_| node("Object3D")).collect();
        for k in &kids {
            parent.add(k).unwrap();
        }
        assert!(parent.move_child(&kids[2], 0));
        assert_eq!(parent.children(), vec![kids[2].clone(), kids[0].clone(), kids[1].clone()]);
        assert_eq!(kids[2].parent(), Some(parent));
    }

    #[test]
    fn test_world_matrix_chains_parents() {
        let parent = node("Group").with_prop("position", Vec3::new(1.0, 0.0, 0.0));
        let child = node("Object3D").with_prop("position", Vec3::new(0.0, 2.0, 0.0));
        parent.add(&child).unwrap();
        assert_eq!(child.world_position(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_dispose_requires_hook() {
        let group = node("Group");
        assert!(!group.dispose());
        let material = ObjectRef::new(
            "MeshBasicMaterial",
            ObjectTraits::MATERIAL | ObjectTraits::DISPOSABLE,
        );
        assert!(material.dispose());
        assert_eq!(material.dispose_count(), 1);
    }
}
