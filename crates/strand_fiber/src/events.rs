//! Pointer event types and the event registry
//!
//! Handlers are declared per instance under an [`EventKind`]. The registry
//! keeps, for every kind that is raycast natively, the instances that must be
//! hit-tested for it. Enter and leave are never raycast on their own; they are
//! derived from move scanning, so declaring them registers the instance under
//! its family's move kind.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use strand_3d::{Intersection, ObjectRef, Vec2};

use crate::instance::InstanceId;

/// Event handler callback
pub type Handler = Rc<dyn Fn(&mut ThreeEvent)>;

/// Pointer families tracked independently for hover state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerFamily {
    Mouse,
    Pointer,
}

impl PointerFamily {
    pub fn move_kind(self) -> EventKind {
        match self {
            PointerFamily::Mouse => EventKind::MouseMove,
            PointerFamily::Pointer => EventKind::PointerMove,
        }
    }

    pub fn enter_kind(self) -> EventKind {
        match self {
            PointerFamily::Mouse => EventKind::MouseEnter,
            PointerFamily::Pointer => EventKind::PointerEnter,
        }
    }

    pub fn leave_kind(self) -> EventKind {
        match self {
            PointerFamily::Mouse => EventKind::MouseLeave,
            PointerFamily::Pointer => EventKind::PointerLeave,
        }
    }
}

/// Handler kinds an instance can declare
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Click,
    ContextMenu,
    DoubleClick,
    Wheel,
    PointerDown,
    PointerUp,
    PointerMove,
    PointerEnter,
    PointerLeave,
    PointerMissed,
    LostPointerCapture,
    MouseDown,
    MouseUp,
    MouseMove,
    MouseEnter,
    MouseLeave,
}

const ALL_KINDS: [EventKind; 16] = [
    EventKind::Click,
    EventKind::ContextMenu,
    EventKind::DoubleClick,
    EventKind::Wheel,
    EventKind::PointerDown,
    EventKind::PointerUp,
    EventKind::PointerMove,
    EventKind::PointerEnter,
    EventKind::PointerLeave,
    EventKind::PointerMissed,
    EventKind::LostPointerCapture,
    EventKind::MouseDown,
    EventKind::MouseUp,
    EventKind::MouseMove,
    EventKind::MouseEnter,
    EventKind::MouseLeave,
];

impl EventKind {
    /// Prop name used to declare a handler (`onPointerDown`)
    pub fn prop_name(self) -> &'static str {
        match self {
            EventKind::Click => "onClick",
            EventKind::ContextMenu => "onContextMenu",
            EventKind::DoubleClick => "onDoubleClick",
            EventKind::Wheel => "onWheel",
            EventKind::PointerDown => "onPointerDown",
            EventKind::PointerUp => "onPointerUp",
            EventKind::PointerMove => "onPointerMove",
            EventKind::PointerEnter => "onPointerEnter",
            EventKind::PointerLeave => "onPointerLeave",
            EventKind::PointerMissed => "onPointerMissed",
            EventKind::LostPointerCapture => "onLostPointerCapture",
            EventKind::MouseDown => "onMouseDown",
            EventKind::MouseUp => "onMouseUp",
            EventKind::MouseMove => "onMouseMove",
            EventKind::MouseEnter => "onMouseEnter",
            EventKind::MouseLeave => "onMouseLeave",
        }
    }

    pub fn from_prop_name(name: &str) -> Option<Self> {
        ALL_KINDS.into_iter().find(|kind| kind.prop_name() == name)
    }

    /// Hover family for move-class kinds
    pub fn family(self) -> Option<PointerFamily> {
        match self {
            EventKind::PointerMove | EventKind::PointerEnter | EventKind::PointerLeave => {
                Some(PointerFamily::Pointer)
            }
            EventKind::MouseMove | EventKind::MouseEnter | EventKind::MouseLeave => {
                Some(PointerFamily::Mouse)
            }
            _ => None,
        }
    }

    /// Registry bucket an instance declaring this kind is hit-tested under
    pub fn bucket(self) -> EventKind {
        self.family().map_or(self, PointerFamily::move_kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prop_name())
    }
}

/// Whether `key` follows the `on[A-Z]...` handler naming pattern
pub fn is_event_prop(key: &str) -> bool {
    key.strip_prefix("on")
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| c.is_ascii_uppercase())
}

/// Native input delivered by the host canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeKind {
    PointerMove,
    PointerDown,
    PointerUp,
    MouseMove,
    MouseDown,
    MouseUp,
    Click,
    DoubleClick,
    ContextMenu,
    Wheel,
    LostPointerCapture,
    /// The pointer left the canvas
    PointerLeave,
}

/// A platform input event in canvas-local pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NativeEvent {
    pub kind: NativeKind,
    pub offset: Vec2,
    pub pointer_id: u32,
    pub button: i16,
    /// Wheel delta
    pub delta: Vec2,
}

impl NativeEvent {
    pub fn new(kind: NativeKind, x: f32, y: f32) -> Self {
        Self {
            kind,
            offset: Vec2::new(x, y),
            pointer_id: 1,
            button: 0,
            delta: Vec2::ZERO,
        }
    }

    pub fn with_pointer_id(mut self, id: u32) -> Self {
        self.pointer_id = id;
        self
    }

    pub fn with_button(mut self, button: i16) -> Self {
        self.button = button;
        self
    }

    pub fn with_delta(mut self, dx: f32, dy: f32) -> Self {
        self.delta = Vec2::new(dx, dy);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CaptureRequest {
    Set,
    Release,
}

/// Event passed to handlers
#[derive(Clone, Debug)]
pub struct ThreeEvent {
    pub kind: EventKind,
    /// The native event this was derived from
    pub native: NativeEvent,
    /// Normalised pointer position (`-1..=1`, +Y up)
    pub pointer: Vec2,
    /// Nearest hit that caused this event, if any
    pub intersection: Option<Intersection>,
    /// Instance whose handler is currently running
    pub current: InstanceId,
    /// Engine object of `current`
    pub event_object: ObjectRef,
    pub(crate) stopped: bool,
    pub(crate) capture: Option<CaptureRequest>,
}

impl ThreeEvent {
    pub(crate) fn new(
        kind: EventKind,
        native: NativeEvent,
        pointer: Vec2,
        intersection: Option<Intersection>,
        current: InstanceId,
        event_object: ObjectRef,
    ) -> Self {
        Self {
            kind,
            native,
            pointer,
            intersection,
            current,
            event_object,
            stopped: false,
            capture: None,
        }
    }

    /// Hit object, if the event came from a raycast
    pub fn object(&self) -> Option<&ObjectRef> {
        self.intersection.as_ref().map(|hit| &hit.object)
    }

    pub fn distance(&self) -> Option<f32> {
        self.intersection.as_ref().map(|hit| hit.distance)
    }

    /// Stop delivery to ancestors and farther hits
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped
    }

    /// Route subsequent events for this pointer to the current instance
    pub fn set_pointer_capture(&mut self) {
        self.capture = Some(CaptureRequest::Set);
    }

    pub fn release_pointer_capture(&mut self) {
        self.capture = Some(CaptureRequest::Release);
    }
}

/// Instances to hit-test per event kind, in registration order
#[derive(Debug, Default)]
pub struct EventRegistry {
    buckets: FxHashMap<EventKind, Vec<InstanceId>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` for `kind` (under the move bucket for enter/leave)
    pub fn register(&mut self, id: InstanceId, kind: EventKind) {
        let bucket = self.buckets.entry(kind.bucket()).or_default();
        if !bucket.contains(&id) {
            bucket.push(id);
        }
    }

    /// Drop `id` from the bucket for `kind`, unless `remaining` (the kinds
    /// the instance still declares) keeps that bucket alive
    pub fn unregister(&mut self, id: InstanceId, kind: EventKind, remaining: &[EventKind]) {
        let bucket = kind.bucket();
        if remaining.iter().any(|k| k.bucket() == bucket) {
            return;
        }
        if let Some(ids) = self.buckets.get_mut(&bucket) {
            ids.retain(|other| *other != id);
        }
    }

    /// Drop `id` from every bucket
    pub fn remove(&mut self, id: InstanceId) {
        for ids in self.buckets.values_mut() {
            ids.retain(|other| *other != id);
        }
    }

    /// Instances registered under `kind`'s bucket
    pub fn registered(&self, kind: EventKind) -> &[InstanceId] {
        self.buckets
            .get(&kind.bucket())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_registered(&self, id: InstanceId, kind: EventKind) -> bool {
        self.registered(kind).contains(&id)
    }
}
