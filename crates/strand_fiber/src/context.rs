//! Root state, the context handed to components, and hooks
//!
//! Every mounted root owns one [`RootState`]. Components reach it through the
//! [`ThreeContext`] provided in the root's reactive scope; portals provide a
//! derived context that swaps the scene (and optionally the camera) while
//! sharing everything else.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use strand_3d::{ObjectRef, Raycaster, Renderer, Value, Vec2};
use strand_core::{on_cleanup, use_context};

use crate::catalogue::Catalogue;
use crate::config::FrameLoop;
use crate::dispatch::EventState;
use crate::error::{FiberError, Result};
use crate::instance::{InstanceId, SceneStore};
use crate::loader::LoaderCache;

/// Most frames a demand-mode root will queue up
const MAX_PENDING_FRAMES: u32 = 60;

/// Per-frame timing passed to [`use_frame`] subscribers
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInfo {
    /// Host timestamp in milliseconds
    pub timestamp: f64,
    /// Seconds since the previous rendered frame
    pub delta: f64,
    /// Seconds since the first rendered frame
    pub elapsed: f64,
    /// Rendered frame counter, starting at 1
    pub frame: u64,
}

type FrameCallback = Rc<RefCell<Box<dyn FnMut(&FrameInfo)>>>;

/// Frame subscribers and demand-mode bookkeeping
#[derive(Default)]
pub(crate) struct FrameScheduler {
    pending: Cell<u32>,
    subscribers: RefCell<Vec<(u64, FrameCallback)>>,
    next_id: Cell<u64>,
    first: Cell<Option<f64>>,
    last: Cell<Option<f64>>,
    frame: Cell<u64>,
}

impl FrameScheduler {
    pub(crate) fn subscribe(&self, callback: Box<dyn FnMut(&FrameInfo)>) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(callback))));
        id
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        self.subscribers.borrow_mut().retain(|(other, _)| *other != id);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub(crate) fn request(&self, frames: u32) {
        let pending = self.pending.get().saturating_add(frames);
        self.pending.set(pending.min(MAX_PENDING_FRAMES));
    }

    pub(crate) fn pending(&self) -> u32 {
        self.pending.get()
    }

    /// Consume one queued frame
    pub(crate) fn take_pending(&self) -> bool {
        match self.pending.get() {
            0 => false,
            n => {
                self.pending.set(n - 1);
                true
            }
        }
    }

    fn begin(&self, timestamp: f64) -> FrameInfo {
        let first = self.first.get().unwrap_or(timestamp);
        self.first.set(Some(first));
        let delta = self
            .last
            .get()
            .map_or(0.0, |last| ((timestamp - last) / 1000.0).max(0.0));
        self.last.set(Some(timestamp));
        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        FrameInfo {
            timestamp,
            delta,
            elapsed: (timestamp - first) / 1000.0,
            frame,
        }
    }

    fn run(&self, info: &FrameInfo) {
        let subscribers: Vec<FrameCallback> = self
            .subscribers
            .borrow()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in subscribers {
            match callback.try_borrow_mut() {
                Ok(mut callback) => (*callback)(info),
                Err(_) => tracing::warn!("frame callback re-entered; skipping"),
            }
        }
    }
}

/// XR session bridge
///
/// While a session is presenting, the host drives frames regardless of the
/// root's frame-loop mode.
#[derive(Clone, Debug, Default)]
pub struct XrBridge {
    connected: Rc<Cell<bool>>,
    presenting: Rc<Cell<bool>>,
}

impl XrBridge {
    /// Start listening for session changes
    pub fn connect(&self) {
        self.connected.set(true);
    }

    /// Stop listening; an active session stops driving frames
    pub fn disconnect(&self) {
        self.connected.set(false);
        self.presenting.set(false);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    /// A session started. Ignored while disconnected.
    pub fn session_started(&self) {
        if self.connected.get() {
            tracing::debug!("xr session started");
            self.presenting.set(true);
        }
    }

    pub fn session_ended(&self) {
        if self.presenting.replace(false) {
            tracing::debug!("xr session ended");
        }
    }

    pub fn is_presenting(&self) -> bool {
        self.presenting.get()
    }
}

/// Everything one mounted root owns
pub(crate) struct RootState {
    pub store: SceneStore,
    pub events: RefCell<EventState>,
    pub catalogue: Catalogue,
    pub loaders: LoaderCache,
    pub renderer: Rc<dyn Renderer>,
    pub scene: ObjectRef,
    pub scene_instance: InstanceId,
    pub camera: RefCell<ObjectRef>,
    pub manual_camera: Cell<bool>,
    pub raycaster: RefCell<Raycaster>,
    pub size: Cell<Vec2>,
    pub frameloop: Cell<FrameLoop>,
    pub color_management: bool,
    pub frames: FrameScheduler,
    pub xr: XrBridge,
}

impl RootState {
    /// Queue frames when rendering on demand
    pub fn invalidate(&self, frames: u32) {
        if self.frameloop.get() == FrameLoop::Demand {
            self.frames.request(frames);
        }
    }

    /// Run frame subscribers, then render
    pub fn advance(&self, timestamp: f64) -> FrameInfo {
        let info = self.frames.begin(timestamp);
        self.frames.run(&info);
        let camera = self.camera.borrow().clone();
        self.renderer.render(&self.scene, &camera);
        info
    }
}

/// Handle to a root's state, as seen from inside its tree
#[derive(Clone)]
pub struct ThreeContext {
    pub(crate) state: Rc<RootState>,
    scene: ObjectRef,
    camera: Option<ObjectRef>,
}

impl ThreeContext {
    pub(crate) fn new(state: Rc<RootState>) -> Self {
        let scene = state.scene.clone();
        Self {
            state,
            scene,
            camera: None,
        }
    }

    /// Context for a portal into `container`
    pub(crate) fn portal(&self, container: ObjectRef, camera: Option<ObjectRef>) -> Self {
        Self {
            state: self.state.clone(),
            scene: container,
            camera: camera.or_else(|| self.camera.clone()),
        }
    }

    /// Scene the current subtree renders into
    pub fn scene(&self) -> ObjectRef {
        self.scene.clone()
    }

    /// The root's own scene, even inside a portal
    pub fn root_scene(&self) -> ObjectRef {
        self.state.scene.clone()
    }

    pub fn camera(&self) -> ObjectRef {
        self.camera
            .clone()
            .unwrap_or_else(|| self.state.camera.borrow().clone())
    }

    /// Replace the root's default camera. The new camera is manual: it is not
    /// refitted on resize.
    pub fn set_camera(&self, camera: ObjectRef) {
        *self.state.camera.borrow_mut() = camera;
        self.state.manual_camera.set(true);
        self.state.invalidate(1);
    }

    pub fn renderer(&self) -> Rc<dyn Renderer> {
        self.state.renderer.clone()
    }

    pub fn raycaster(&self) -> Raycaster {
        self.state.raycaster.borrow().clone()
    }

    /// Canvas size in pixels
    pub fn size(&self) -> Vec2 {
        self.state.size.get()
    }

    /// Last pointer position in normalised device coordinates
    pub fn pointer(&self) -> Vec2 {
        self.state.events.borrow().pointer
    }

    pub fn frameloop(&self) -> FrameLoop {
        self.state.frameloop.get()
    }

    pub fn set_frameloop(&self, mode: FrameLoop) {
        self.state.frameloop.set(mode);
    }

    /// Whether colours are converted between linear and sRGB
    pub fn color_management(&self) -> bool {
        self.state.color_management
    }

    /// Request a render in demand mode
    pub fn invalidate(&self) {
        self.state.invalidate(1);
    }

    /// Render one frame now
    pub fn advance(&self, timestamp: f64) -> FrameInfo {
        self.state.advance(timestamp)
    }

    pub fn xr(&self) -> XrBridge {
        self.state.xr.clone()
    }

    pub fn store(&self) -> &SceneStore {
        &self.state.store
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.state.catalogue
    }

    pub fn loaders(&self) -> &LoaderCache {
        &self.state.loaders
    }

    pub fn instance_of(&self, object: &ObjectRef) -> Option<InstanceId> {
        self.state.store.instance_of(object)
    }

    /// Apply a prop to a mounted instance through the prop engine
    pub fn apply_prop(&self, id: InstanceId, key: &str, value: impl Into<Value>) -> Result<()> {
        crate::render::apply_prop(&self.state, id, key, value.into())
    }

    /// Hide an instance without unmounting it
    pub fn hide_instance(&self, id: InstanceId) {
        crate::graph::hide_instance(&self.state, id);
    }

    /// Undo [`hide_instance`](Self::hide_instance), restoring the declared
    /// visibility
    pub fn unhide_instance(&self, id: InstanceId) {
        crate::graph::unhide_instance(&self.state, id);
    }
}

impl fmt::Debug for ThreeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreeContext")
            .field("scene", &self.scene)
            .field("camera", &self.camera())
            .field("size", &self.size())
            .field("frameloop", &self.frameloop())
            .finish_non_exhaustive()
    }
}

pub(crate) fn require_context(hook: &'static str) -> Result<ThreeContext> {
    use_context::<ThreeContext>().ok_or(FiberError::MissingContext { hook })
}

/// The enclosing root's context
pub fn use_three() -> Result<ThreeContext> {
    require_context("use_three")
}

/// Run `callback` once per rendered frame, in subscription order, until the
/// calling scope is disposed
pub fn use_frame<F>(callback: F) -> Result<()>
where
    F: FnMut(&FrameInfo) + 'static,
{
    let cx = require_context("use_frame")?;
    let id = cx.state.frames.subscribe(Box::new(callback));
    let state = Rc::downgrade(&cx.state);
    on_cleanup(move || {
        if let Some(state) = state.upgrade() {
            state.frames.unsubscribe(id);
        }
    });
    Ok(())
}
