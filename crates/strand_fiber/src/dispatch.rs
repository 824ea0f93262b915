//! Event dispatch
//!
//! Turns native canvas input into handler calls:
//!
//! ```text
//! NativeEvent (canvas pixels)
//!     ↓
//! pointer → NDC → camera ray
//!     ↓
//! raycast against the instances registered for the event's bucket
//!     ↓
//! nearest hit first, bubbling through instance ancestors
//!     ↓
//! enter / move / leave derivation, pointer capture, missed clicks
//! ```

use rustc_hash::{FxHashMap, FxHashSet};
use strand_3d::{Intersection, ObjectRef, Vec2};

use crate::context::RootState;
use crate::events::{
    CaptureRequest, EventKind, EventRegistry, NativeEvent, NativeKind, PointerFamily, ThreeEvent,
};
use crate::instance::InstanceId;

/// Active pointer capture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Capture {
    pub pointer_id: u32,
    pub instance: InstanceId,
}

/// Per-root input state
#[derive(Debug, Default)]
pub(crate) struct EventState {
    pub registry: EventRegistry,
    /// Pointer in normalised device coordinates
    pub pointer: Vec2,
    /// Instances under the pointer, per family
    pub hovered: FxHashMap<PointerFamily, Vec<InstanceId>>,
    /// Most recent move per family, used as context for leave
    pub last_move: FxHashMap<PointerFamily, NativeEvent>,
    pub capture: Option<Capture>,
}

impl EventState {
    /// Drop every trace of an unmounted instance
    pub fn forget(&mut self, id: InstanceId) {
        self.registry.remove(id);
        for hovered in self.hovered.values_mut() {
            hovered.retain(|other| *other != id);
        }
        if self.capture.is_some_and(|c| c.instance == id) {
            tracing::debug!(?id, "pointer capture released by unmount");
            self.capture = None;
        }
    }

    fn captured(&self, pointer_id: u32) -> Option<InstanceId> {
        self.capture
            .filter(|c| c.pointer_id == pointer_id)
            .map(|c| c.instance)
    }
}

/// Route one native event
pub(crate) fn dispatch(state: &RootState, native: NativeEvent) {
    match native.kind {
        NativeKind::PointerMove => handle_move(state, PointerFamily::Pointer, native),
        NativeKind::MouseMove => handle_move(state, PointerFamily::Mouse, native),
        NativeKind::PointerLeave => handle_canvas_leave(state, native),
        NativeKind::LostPointerCapture => release_capture(state, native),
        NativeKind::PointerDown => {
            handle_discrete(state, EventKind::PointerDown, native);
        }
        NativeKind::PointerUp => {
            handle_discrete(state, EventKind::PointerUp, native);
            release_capture(state, native);
        }
        NativeKind::MouseDown => {
            handle_discrete(state, EventKind::MouseDown, native);
        }
        NativeKind::MouseUp => {
            handle_discrete(state, EventKind::MouseUp, native);
        }
        NativeKind::Click => {
            let reached = handle_discrete(state, EventKind::Click, native);
            pointer_missed(state, native, &reached);
        }
        NativeKind::DoubleClick => {
            handle_discrete(state, EventKind::DoubleClick, native);
        }
        NativeKind::ContextMenu => {
            handle_discrete(state, EventKind::ContextMenu, native);
        }
        NativeKind::Wheel => {
            handle_discrete(state, EventKind::Wheel, native);
        }
    }
}

fn update_pointer(state: &RootState, native: &NativeEvent) -> Vec2 {
    let size = state.size.get();
    let mut events = state.events.borrow_mut();
    if size.x > 0.0 && size.y > 0.0 {
        events.pointer = Vec2::new(
            native.offset.x / size.x * 2.0 - 1.0,
            -(native.offset.y / size.y) * 2.0 + 1.0,
        );
    }
    events.pointer
}

/// Nearest-first hits among the instances registered for `kind`, one per
/// instance
fn raycast(state: &RootState, kind: EventKind, pointer: Vec2) -> Vec<(InstanceId, Intersection)> {
    let registered = state.events.borrow().registry.registered(kind).to_vec();
    let candidates: Vec<ObjectRef> = registered
        .iter()
        .filter_map(|id| state.store.object(*id))
        .collect();
    if candidates.is_empty() {
        return Vec::new();
    }

    let camera = state.camera.borrow().clone();
    let mut raycaster = state.raycaster.borrow().clone();
    raycaster.set_from_camera(pointer, &camera);

    let mut seen = FxHashSet::default();
    raycaster
        .intersect_objects(&candidates, true)
        .into_iter()
        .filter_map(|hit| {
            let id = state.store.owning_instance(&hit.object)?;
            seen.insert(id).then_some((id, hit))
        })
        .collect()
}

/// Deliver `kind` to `origin` and its ancestors. Each instance is called at
/// most once per native event (`delivered`). Returns whether a handler
/// stopped propagation.
fn bubble(
    state: &RootState,
    kind: EventKind,
    native: NativeEvent,
    pointer: Vec2,
    hit: Option<&Intersection>,
    origin: InstanceId,
    delivered: &mut FxHashSet<InstanceId>,
) -> bool {
    for id in state.store.ancestry(origin) {
        if call_handler(state, kind, native, pointer, hit, id, delivered) {
            return true;
        }
    }
    false
}

fn call_handler(
    state: &RootState,
    kind: EventKind,
    native: NativeEvent,
    pointer: Vec2,
    hit: Option<&Intersection>,
    id: InstanceId,
    delivered: &mut FxHashSet<InstanceId>,
) -> bool {
    let Some(handler) = state.store.handler(id, kind) else {
        return false;
    };
    let Some(object) = state.store.object(id) else {
        return false;
    };
    if !delivered.insert(id) {
        return false;
    }

    let mut event = ThreeEvent::new(kind, native, pointer, hit.cloned(), id, object);
    handler(&mut event);

    match event.capture {
        Some(CaptureRequest::Set) => {
            tracing::debug!(?id, pointer_id = native.pointer_id, "pointer captured");
            state.events.borrow_mut().capture = Some(Capture {
                pointer_id: native.pointer_id,
                instance: id,
            });
        }
        Some(CaptureRequest::Release) => {
            let owned = state.events.borrow().captured(native.pointer_id) == Some(id);
            if owned {
                release_capture(state, native);
            }
        }
        None => {}
    }
    event.stopped
}

fn handle_move(state: &RootState, family: PointerFamily, native: NativeEvent) {
    let pointer = update_pointer(state, &native);
    let move_kind = family.move_kind();

    if family == PointerFamily::Pointer {
        let captured = state.events.borrow().captured(native.pointer_id);
        if let Some(target) = captured {
            let mut delivered = FxHashSet::default();
            call_handler(state, move_kind, native, pointer, None, target, &mut delivered);
            state.events.borrow_mut().last_move.insert(family, native);
            return;
        }
    }

    let hits = raycast(state, move_kind, pointer);
    let (previous, last) = {
        let events = state.events.borrow();
        (
            events.hovered.get(&family).cloned().unwrap_or_default(),
            events.last_move.get(&family).copied().unwrap_or(native),
        )
    };

    let mut enter_stopped = false;
    let mut move_stopped = false;
    let mut entered = FxHashSet::default();
    let mut moved = FxHashSet::default();
    let mut current = Vec::with_capacity(hits.len());

    for (id, hit) in &hits {
        if !previous.contains(id) && !enter_stopped {
            enter_stopped = bubble(
                state,
                family.enter_kind(),
                native,
                pointer,
                Some(hit),
                *id,
                &mut entered,
            );
        }
        if !move_stopped {
            move_stopped = bubble(state, move_kind, native, pointer, Some(hit), *id, &mut moved);
        }
        current.push(*id);
    }

    for id in previous.iter().filter(|id| !current.contains(id)) {
        let mut left = FxHashSet::default();
        bubble(state, family.leave_kind(), last, pointer, None, *id, &mut left);
    }

    current.retain(|id| state.store.contains(*id));
    let mut events = state.events.borrow_mut();
    events.hovered.insert(family, current);
    events.last_move.insert(family, native);
}

/// Returns the instances the event reached (hits and their ancestors)
fn handle_discrete(state: &RootState, kind: EventKind, native: NativeEvent) -> FxHashSet<InstanceId> {
    let pointer = update_pointer(state, &native);
    let mut delivered = FxHashSet::default();

    if matches!(kind, EventKind::PointerDown | EventKind::PointerUp) {
        let captured = state.events.borrow().captured(native.pointer_id);
        if let Some(target) = captured {
            call_handler(state, kind, native, pointer, None, target, &mut delivered);
            return state.store.ancestry(target).into_iter().collect();
        }
    }

    let hits = raycast(state, kind, pointer);
    let mut reached = FxHashSet::default();
    for (id, _) in &hits {
        reached.extend(state.store.ancestry(*id));
    }
    for (id, hit) in &hits {
        if bubble(state, kind, native, pointer, Some(hit), *id, &mut delivered) {
            break;
        }
    }
    reached
}

/// A click that hit no click target notifies every `onPointerMissed` instance
fn pointer_missed(state: &RootState, native: NativeEvent, reached: &FxHashSet<InstanceId>) {
    if !reached.is_empty() {
        return;
    }
    let (pointer, registered) = {
        let events = state.events.borrow();
        (
            events.pointer,
            events.registry.registered(EventKind::PointerMissed).to_vec(),
        )
    };
    let mut delivered = FxHashSet::default();
    for id in registered {
        call_handler(state, EventKind::PointerMissed, native, pointer, None, id, &mut delivered);
    }
}

fn handle_canvas_leave(state: &RootState, native: NativeEvent) {
    let pointer = state.events.borrow().pointer;
    for family in [PointerFamily::Pointer, PointerFamily::Mouse] {
        let hovered = {
            let mut events = state.events.borrow_mut();
            if family == PointerFamily::Pointer && events.captured(native.pointer_id).is_some() {
                continue;
            }
            events.hovered.remove(&family).unwrap_or_default()
        };
        let last = state
            .events
            .borrow()
            .last_move
            .get(&family)
            .copied()
            .unwrap_or(native);
        for id in hovered {
            let mut left = FxHashSet::default();
            bubble(state, family.leave_kind(), last, pointer, None, id, &mut left);
        }
    }
}

/// End capture for the event's pointer and notify the former capturer
fn release_capture(state: &RootState, native: NativeEvent) {
    let released = {
        let mut events = state.events.borrow_mut();
        match events.captured(native.pointer_id) {
            Some(id) => {
                events.capture = None;
                Some(id)
            }
            None => None,
        }
    };
    if let Some(id) = released {
        tracing::debug!(?id, pointer_id = native.pointer_id, "pointer capture released");
        let pointer = state.events.borrow().pointer;
        let mut delivered = FxHashSet::default();
        call_handler(
            state,
            EventKind::LostPointerCapture,
            native,
            pointer,
            None,
            id,
            &mut delivered,
        );
    }
}
