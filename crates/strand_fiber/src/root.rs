//! Roots
//!
//! A [`Root`] binds one canvas to a scene, a camera, a renderer and an event
//! dispatcher, and owns the reactive scope everything rendered into it lives
//! in. The host drives it: it forwards input through [`Root::dispatch`],
//! reports size changes through [`Root::resize`] and calls [`Root::tick`]
//! once per display frame.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use strand_3d::{fit_camera, HeadlessRenderer, ObjectRef, Raycaster, Renderer, Value, Vec2, Vec3};
use strand_core::{batch, provide_context, Scope};

use crate::catalogue::{default_catalogue, Catalogue};
use crate::config::{table_props, FrameLoop, RootConfig};
use crate::context::{FrameInfo, RootState, ThreeContext, XrBridge};
use crate::dispatch::{dispatch, EventState};
use crate::element::View;
use crate::error::{FiberError, Result};
use crate::events::NativeEvent;
use crate::graph::manage_scene_graph;
use crate::instance::{InstanceData, SceneStore};
use crate::loader::default_loader_cache;
use crate::props::write_prop;
use crate::render::render_view;

/// ACES filmic tone mapping
const TONE_MAPPING_ACES: f64 = 4.0;
const TONE_MAPPING_NONE: f64 = 0.0;

const DEFAULT_CAMERA_Z: f32 = 5.0;
const DEFAULT_ORTHOGRAPHIC_ZOOM: f64 = 100.0;

/// Drawing surface size in pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// A mounted canvas
pub struct Root {
    state: Rc<RootState>,
    scope: Scope,
    content: Option<Scope>,
}

fn construct(catalogue: &Catalogue, name: &str, args: &[Value]) -> Result<ObjectRef> {
    catalogue
        .resolve_component(name)
        .ok_or_else(|| FiberError::UnknownElement(name.to_string()))?
        .construct(args)
}

fn apply_overrides(section: &str, object: &ObjectRef, table: &toml::Table) -> Result<()> {
    for (key, value) in table_props(section, table)? {
        write_prop(object, &key, &value)
            .map_err(|err| FiberError::Config(format!("[{section}] {err}")))?;
    }
    Ok(())
}

fn default_camera(catalogue: &Catalogue, config: &RootConfig, canvas: Canvas) -> Result<ObjectRef> {
    let camera = if config.orthographic {
        let camera = construct(catalogue, "OrthographicCamera", &[])?;
        camera.set("zoom", DEFAULT_ORTHOGRAPHIC_ZOOM.into());
        camera
    } else {
        let aspect = if canvas.height > 0.0 {
            f64::from(canvas.width / canvas.height)
        } else {
            1.0
        };
        construct(
            catalogue,
            "PerspectiveCamera",
            &[75.0.into(), aspect.into(), 0.1.into(), 1000.0.into()],
        )?
    };
    camera.set("position", Vec3::new(0.0, 0.0, DEFAULT_CAMERA_Z).into());
    Ok(camera)
}

fn configure_renderer(renderer: &dyn Renderer, config: &RootConfig) {
    let gl = renderer.object();
    let mut settings: Vec<(&str, Value)> = vec![(
        "shadowMap-enabled",
        config.shadows.shadow_map_type().is_some().into(),
    )];
    if let Some(kind) = config.shadows.shadow_map_type() {
        settings.push(("shadowMap-type", kind.into()));
    }
    settings.push((
        "outputColorSpace",
        if config.linear { "srgb-linear" } else { "srgb" }.into(),
    ));
    settings.push((
        "toneMapping",
        if config.flat {
            TONE_MAPPING_NONE
        } else {
            TONE_MAPPING_ACES
        }
        .into(),
    ));
    for (key, value) in settings {
        if let Err(err) = write_prop(&gl, key, &value) {
            tracing::warn!(%err, "renderer setting not applied");
        }
    }
}

/// Mount a root on `canvas`
pub fn create_root(canvas: Canvas, config: RootConfig) -> Result<Root> {
    let catalogue = config.catalogue.clone().unwrap_or_else(default_catalogue);

    let scene = match &config.scene_object {
        Some(scene) => scene.clone(),
        None => construct(&catalogue, "Scene", &[])?,
    };
    let manual_camera = config.camera_object.is_some();
    let camera = match &config.camera_object {
        Some(camera) => camera.clone(),
        None => default_camera(&catalogue, &config, canvas)?,
    };
    let raycaster = Raycaster::from_object(construct(&catalogue, "Raycaster", &[])?);
    let renderer: Rc<dyn Renderer> = match &config.renderer {
        Some(renderer) => renderer.clone(),
        None => Rc::new(HeadlessRenderer::new()),
    };

    apply_overrides("camera", &camera, &config.camera)?;
    apply_overrides("scene", &scene, &config.scene)?;
    apply_overrides("raycaster", raycaster.object(), &config.raycaster)?;
    configure_renderer(renderer.as_ref(), &config);
    apply_overrides("gl", &renderer.object(), &config.gl)?;

    renderer.set_pixel_ratio(config.dpr);
    renderer.set_size(canvas.width, canvas.height);
    if !manual_camera {
        fit_camera(&camera, canvas.width, canvas.height);
    }

    let store = SceneStore::new();
    let scene_instance = store.augment(
        &scene,
        InstanceData {
            attach: None,
            primitive: true,
        },
    );

    let state = Rc::new(RootState {
        store,
        events: RefCell::new(EventState::default()),
        catalogue,
        loaders: config.loader_cache.clone().unwrap_or_else(default_loader_cache),
        renderer,
        scene,
        scene_instance,
        camera: RefCell::new(camera),
        manual_camera: Cell::new(manual_camera),
        raycaster: RefCell::new(raycaster),
        size: Cell::new(Vec2::new(canvas.width, canvas.height)),
        frameloop: Cell::new(config.frameloop),
        color_management: !config.legacy,
        frames: Default::default(),
        xr: XrBridge::default(),
    });

    let cx = ThreeContext::new(state.clone());
    let ((), scope) = strand_core::create_root(|| {
        provide_context(cx);
    });

    tracing::debug!(
        width = canvas.width,
        height = canvas.height,
        frameloop = ?config.frameloop,
        "root created"
    );
    Ok(Root {
        state,
        scope,
        content: None,
    })
}

impl Root {
    /// Render `view` into the scene, replacing whatever was rendered before
    pub fn render<F, V>(&mut self, view: F)
    where
        F: FnOnce() -> V,
        V: Into<View>,
    {
        self.unmount();
        let cx = ThreeContext::new(self.state.clone());
        let scene_instance = self.state.scene_instance;
        let ((), content) = self.scope.create_child(|| {
            let children = render_view(&cx, view().into());
            manage_scene_graph(&cx, scene_instance, children);
        });
        self.content = Some(content);
        self.state.invalidate(1);
    }

    /// Tear down everything rendered, leaving the root usable
    pub fn unmount(&mut self) {
        if let Some(content) = self.content.take() {
            content.dispose();
            self.state.invalidate(1);
            tracing::debug!("root content unmounted");
        }
    }

    /// Feed one native input event
    pub fn dispatch(&self, event: NativeEvent) {
        batch(|| dispatch(&self.state, event));
    }

    pub fn resize(&self, width: f32, height: f32) {
        self.state.size.set(Vec2::new(width, height));
        if !self.state.manual_camera.get() {
            fit_camera(&self.state.camera.borrow(), width, height);
        }
        self.state.renderer.set_size(width, height);
        self.state.invalidate(1);
    }

    /// Host display frame. Returns whether a frame was rendered.
    pub fn tick(&self, timestamp: f64) -> bool {
        let render = self.state.xr.is_presenting()
            || match self.state.frameloop.get() {
                FrameLoop::Always => true,
                FrameLoop::Demand => self.state.frames.take_pending(),
                FrameLoop::Never => false,
            };
        if render {
            self.state.advance(timestamp);
        }
        render
    }

    /// Render one frame regardless of the frame-loop mode
    pub fn advance(&self, timestamp: f64) -> FrameInfo {
        self.state.advance(timestamp)
    }

    pub fn invalidate(&self) {
        self.state.invalidate(1);
    }

    pub fn context(&self) -> ThreeContext {
        ThreeContext::new(self.state.clone())
    }

    pub fn scene(&self) -> ObjectRef {
        self.state.scene.clone()
    }

    pub fn camera(&self) -> ObjectRef {
        self.state.camera.borrow().clone()
    }

    pub fn renderer(&self) -> Rc<dyn Renderer> {
        self.state.renderer.clone()
    }

    pub fn xr(&self) -> XrBridge {
        self.state.xr.clone()
    }

    pub fn set_frameloop(&self, mode: FrameLoop) {
        self.state.frameloop.set(mode);
    }

    /// Number of live `use_frame` subscribers
    pub fn frame_subscribers(&self) -> usize {
        self.state.frames.subscriber_count()
    }

    /// Frames queued in demand mode
    pub fn pending_frames(&self) -> u32 {
        self.state.frames.pending()
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        self.unmount();
        self.scope.dispose();
        self.state.store.remove(self.state.scene_instance);
        self.state.renderer.dispose();
        tracing::debug!("root dropped");
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("scene", &self.state.scene)
            .field("instances", &self.state.store.len())
            .field("mounted", &self.content.is_some())
            .finish()
    }
}
