//! Scene-graph management
//!
//! One manager per parent instance keeps the engine graph in step with the
//! parent's rendered children. It re-runs when the child list changes or when
//! the parent or a child is rebuilt, detaching what is no longer wanted,
//! attaching what is new and restoring declaration order among the children
//! it added.

use std::cell::RefCell;
use std::rc::Rc;

use strand_3d::{ObjectRef, ObjectTraits, Value};
use strand_core::{create_effect, on_cleanup, untrack};

use crate::context::{RootState, ThreeContext};
use crate::instance::{Attach, InstanceId};
use crate::props::{attach_slot, detach_slot, SlotAttachment};
use crate::render::{bound_object, Accessor};

enum Link {
    ChildList,
    Slot(SlotAttachment),
    Callback(Box<dyn FnOnce()>),
}

struct Attached {
    id: InstanceId,
    object: ObjectRef,
    parent: ObjectRef,
    link: Link,
}

/// Keep `parent`'s engine object in step with `children`
///
/// Everything attached here is detached again, in reverse order, when the
/// calling scope is disposed.
pub(crate) fn manage_scene_graph(cx: &ThreeContext, parent: InstanceId, children: Accessor) {
    let state = cx.state.clone();
    let records: Rc<RefCell<Vec<Attached>>> = Rc::default();

    {
        let state = state.clone();
        let records = records.clone();
        create_effect(move || {
            let parent_object = bound_object(&state, parent);
            let mut desired: Vec<(InstanceId, ObjectRef)> = Vec::new();
            for id in children.call() {
                if desired.iter().any(|(other, _)| *other == id) {
                    continue;
                }
                if let Some(object) = bound_object(&state, id) {
                    desired.push((id, object));
                }
            }
            untrack(|| {
                let mut records = records.borrow_mut();
                reconcile(&state, parent, parent_object.as_ref(), &desired, &mut records);
            });
        });
    }

    on_cleanup(move || {
        let attached = std::mem::take(&mut *records.borrow_mut());
        for record in attached.into_iter().rev() {
            detach(&state, parent, record);
        }
    });
}

fn reconcile(
    state: &RootState,
    parent: InstanceId,
    parent_object: Option<&ObjectRef>,
    desired: &[(InstanceId, ObjectRef)],
    records: &mut Vec<Attached>,
) {
    let Some(parent_object) = parent_object else {
        for record in records.drain(..).rev() {
            detach(state, parent, record);
        }
        return;
    };

    let (mut kept, stale): (Vec<Attached>, Vec<Attached>) =
        std::mem::take(records).into_iter().partition(|record| {
            record.parent.ptr_eq(parent_object)
                && desired
                    .iter()
                    .any(|(id, object)| *id == record.id && object.ptr_eq(&record.object))
        });
    for record in stale.into_iter().rev() {
        detach(state, parent, record);
    }

    for (id, object) in desired {
        if kept.iter().any(|record| record.id == *id) {
            continue;
        }
        if let Some(record) = attach(state, parent, parent_object, *id, object) {
            kept.push(record);
        }
    }

    kept.sort_by_key(|record| desired.iter().position(|(id, _)| *id == record.id));
    let ordered: Vec<ObjectRef> = kept
        .iter()
        .filter(|record| matches!(record.link, Link::ChildList))
        .map(|record| record.object.clone())
        .collect();
    reorder(parent_object, &ordered);
    *records = kept;
}

/// Default slot for objects that are not scene-graph children
fn default_slot(object: &ObjectRef) -> Option<&'static str> {
    if object.is(ObjectTraits::MATERIAL) {
        Some("material")
    } else if object.is(ObjectTraits::GEOMETRY) {
        Some("geometry")
    } else if object.is(ObjectTraits::FOG) {
        Some("fog")
    } else {
        None
    }
}

fn attach(
    state: &RootState,
    parent: InstanceId,
    parent_object: &ObjectRef,
    id: InstanceId,
    object: &ObjectRef,
) -> Option<Attached> {
    let declared = state.store.with(id, |i| i.attach.clone()).flatten();
    let slot = |path: &str| match attach_slot(parent_object, path, Value::Object(object.clone())) {
        Ok(slot) => Some(Link::Slot(slot)),
        Err(err) => {
            tracing::error!(%err, parent = %parent_object, child = %object, "attach failed");
            None
        }
    };

    let link = match declared {
        Some(Attach::Callback(attach)) => Link::Callback(attach(parent_object, object)),
        Some(Attach::Path(path)) => slot(&path)?,
        None => match default_slot(object) {
            Some(path) => slot(path)?,
            None if parent_object.is(ObjectTraits::NODE) && object.is(ObjectTraits::NODE) => {
                if parent_object.child_index(object).is_none() {
                    if let Err(err) = parent_object.add(object) {
                        tracing::error!(%err, "attach failed");
                        return None;
                    }
                }
                Link::ChildList
            }
            None => {
                tracing::error!(
                    parent = %parent_object,
                    child = %object,
                    "no way to attach child; give it an attach path"
                );
                return None;
            }
        },
    };

    let previous = match &link {
        Link::Slot(slot) => slot.previous.clone(),
        _ => None,
    };
    state.store.with_mut(id, |child| {
        child.parent = Some(parent);
        child.previous_attach = previous;
    });
    state.store.with_mut(parent, |p| {
        p.children.insert(id);
    });
    state.invalidate(1);
    tracing::trace!(parent = %parent_object, child = %object, "attached");

    Some(Attached {
        id,
        object: object.clone(),
        parent: parent_object.clone(),
        link,
    })
}

fn detach(state: &RootState, parent: InstanceId, record: Attached) {
    let Attached {
        id,
        object,
        parent: parent_object,
        link,
    } = record;
    match link {
        Link::ChildList => {
            parent_object.remove(&object);
        }
        Link::Slot(slot) => detach_slot(slot),
        Link::Callback(detach) => detach(),
    }

    state.store.with_mut(parent, |p| {
        p.children.shift_remove(&id);
    });
    state.store.with_mut(id, |child| {
        if child.parent == Some(parent) {
            child.parent = None;
            child.previous_attach = None;
        }
    });
    state.invalidate(1);
    tracing::trace!(parent = %parent_object, child = %object, "detached");
}

/// `current` with the positions held by `desired` objects refilled in
/// `desired` order. Other children keep their positions.
fn target_order(current: &[ObjectRef], desired: &[ObjectRef]) -> Vec<ObjectRef> {
    let mut queue = desired.iter();
    current
        .iter()
        .map(|child| {
            if desired.iter().any(|d| d.ptr_eq(child)) {
                queue.next().cloned().unwrap_or_else(|| child.clone())
            } else {
                child.clone()
            }
        })
        .collect()
}

fn reorder(parent: &ObjectRef, desired: &[ObjectRef]) {
    if desired.len() < 2 {
        return;
    }
    let current = parent.children();
    let target = target_order(&current, desired);
    for (index, object) in target.iter().enumerate() {
        if parent.child_index(object) != Some(index) {
            parent.move_child(object, index);
        }
    }
}

pub(crate) fn hide_instance(state: &RootState, id: InstanceId) {
    let Some(object) = state.store.with_mut(id, |i| {
        i.is_hidden = true;
        i.object.clone()
    }) else {
        return;
    };
    object.set("visible", Value::Bool(false));
    state.invalidate(1);
}

pub(crate) fn unhide_instance(state: &RootState, id: InstanceId) {
    let Some((object, visible)) = state.store.with_mut(id, |i| {
        i.is_hidden = false;
        let visible = i.props.get("visible").cloned().unwrap_or(Value::Bool(true));
        (i.object.clone(), visible)
    }) else {
        return;
    };
    object.set("visible", visible);
    state.invalidate(1);
}
