//! Declarative element tree
//!
//! Views describe what should exist; the reconciler turns them into
//! instances. Elements are built with a small fluent API:
//!
//! ```ignore
//! use strand_core::create_signal;
//! use strand_fiber::el;
//!
//! let hovered = create_signal(false);
//! el("mesh")
//!     .prop("position", [0.0, 1.0, 0.0])
//!     .bind("scale", move || if hovered.get() { 1.5 } else { 1.0 })
//!     .on("onPointerEnter", move |_| hovered.set(true))
//!     .on("onPointerLeave", move |_| hovered.set(false))
//!     .child(el("boxGeometry").args(vec![2.0.into(), 2.0.into(), 2.0.into()]))
//!     .child(el("meshStandardMaterial").prop("color", "hotpink"))
//! ```

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use strand_3d::{ObjectRef, Value};
use strand_core::map_keyed;

use crate::context::ThreeContext;
use crate::events::{EventKind, Handler, ThreeEvent};
use crate::instance::Attach;
use crate::render::{render_view, Accessor};

pub(crate) enum Source {
    Named(String),
    Primitive(ObjectRef),
}

pub(crate) enum Args {
    Static(Vec<Value>),
    Reactive(Rc<dyn Fn() -> Vec<Value>>),
}

pub(crate) enum Prop {
    Static(Value),
    Reactive(Rc<dyn Fn() -> Value>),
    Handler(Option<Handler>),
    ReactiveHandler(Rc<dyn Fn() -> Option<Handler>>),
    Unset,
}

/// One engine object to create (or adopt), with its props and children
pub struct Element {
    pub(crate) source: Source,
    pub(crate) args: Args,
    pub(crate) props: Vec<(String, Prop)>,
    pub(crate) attach: Option<Attach>,
    pub(crate) children: Vec<View>,
}

/// Element for the catalogue entry `name` (`"mesh"` or `"Mesh"`)
pub fn el(name: impl Into<String>) -> Element {
    Element::new(Source::Named(name.into()))
}

/// Adopt an existing engine object
///
/// Adopted objects are not disposed on unmount unless `dispose` is set to
/// `true`.
pub fn primitive(object: ObjectRef) -> Element {
    Element::new(Source::Primitive(object))
}

impl Element {
    fn new(source: Source) -> Self {
        Self {
            source,
            args: Args::Static(Vec::new()),
            props: Vec::new(),
            attach: None,
            children: Vec::new(),
        }
    }

    /// Constructor arguments
    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = Args::Static(args);
        self
    }

    /// Reactive constructor arguments. A change builds a new object in the
    /// same place.
    pub fn args_with<F>(mut self, args: F) -> Self
    where
        F: Fn() -> Vec<Value> + 'static,
    {
        self.args = Args::Reactive(Rc::new(args));
        self
    }

    /// Static prop, applied once
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.push((key.into(), Prop::Static(value.into())));
        self
    }

    /// Reactive prop, re-applied whenever what it reads changes
    pub fn bind<F, V>(mut self, key: impl Into<String>, value: F) -> Self
    where
        F: Fn() -> V + 'static,
        V: Into<Value>,
    {
        let value = Rc::new(move || value().into());
        self.props.push((key.into(), Prop::Reactive(value)));
        self
    }

    /// Forget a previously applied prop so it is not carried over when the
    /// object is rebuilt
    pub fn unset(mut self, key: impl Into<String>) -> Self {
        self.props.push((key.into(), Prop::Unset));
        self
    }

    /// Event handler under its prop name (`"onClick"`, `"onPointerEnter"`)
    pub fn on<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut ThreeEvent) + 'static,
    {
        self.props
            .push((name.into(), Prop::Handler(Some(Rc::new(handler)))));
        self
    }

    pub fn on_event<F>(self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&mut ThreeEvent) + 'static,
    {
        self.on(kind.prop_name(), handler)
    }

    /// Handler that may come and go; `None` unregisters it
    pub fn bind_handler<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Option<Handler> + 'static,
    {
        self.props
            .push((name.into(), Prop::ReactiveHandler(Rc::new(handler))));
        self
    }

    /// Attach to a slot of the parent instead of its child list
    pub fn attach(mut self, path: impl Into<String>) -> Self {
        self.attach = Some(Attach::Path(path.into()));
        self
    }

    /// Attach with a callback `(parent, child)` that returns the detach
    pub fn attach_with<F>(mut self, attach: F) -> Self
    where
        F: Fn(&ObjectRef, &ObjectRef) -> Box<dyn FnOnce()> + 'static,
    {
        self.attach = Some(Attach::Callback(Rc::new(attach)));
        self
    }

    /// Whether to dispose the object on unmount
    pub fn dispose(self, dispose: bool) -> Self {
        self.prop("dispose", dispose)
    }

    pub fn child(mut self, child: impl Into<View>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &self.source {
            Source::Named(name) => name.clone(),
            Source::Primitive(object) => format!("primitive({object})"),
        };
        f.debug_struct("Element")
            .field("name", &name)
            .field(
                "props",
                &self.props.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .field("attach", &self.attach)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Deferred view built against the rendering context
pub struct ListView(pub(crate) Box<dyn FnOnce(&ThreeContext) -> Accessor>);

/// Redirect children into another container
pub struct Portal {
    pub(crate) container: ObjectRef,
    pub(crate) camera: Option<ObjectRef>,
    pub(crate) children: Box<View>,
}

impl Portal {
    /// Camera seen by `use_three` inside the portal
    pub fn camera(mut self, camera: ObjectRef) -> Self {
        self.camera = Some(camera);
        self
    }
}

/// Anything that can appear in a child position
pub enum View {
    Empty,
    Element(Element),
    Fragment(Vec<View>),
    /// Rebuilt whenever what the closure reads changes
    Dynamic(Rc<dyn Fn() -> View>),
    /// Runs once in its own scope, so it may call hooks
    Component(Box<dyn FnOnce() -> View>),
    List(ListView),
    Portal(Portal),
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Empty => f.write_str("Empty"),
            View::Element(element) => fmt::Debug::fmt(element, f),
            View::Fragment(views) => f.debug_tuple("Fragment").field(views).finish(),
            View::Dynamic(_) => f.write_str("Dynamic(..)"),
            View::Component(_) => f.write_str("Component(..)"),
            View::List(_) => f.write_str("List(..)"),
            View::Portal(portal) => f
                .debug_struct("Portal")
                .field("container", &portal.container)
                .finish_non_exhaustive(),
        }
    }
}

impl From<Element> for View {
    fn from(element: Element) -> Self {
        View::Element(element)
    }
}

impl From<Vec<View>> for View {
    fn from(views: Vec<View>) -> Self {
        View::Fragment(views)
    }
}

impl From<Vec<Element>> for View {
    fn from(elements: Vec<Element>) -> Self {
        View::Fragment(elements.into_iter().map(View::Element).collect())
    }
}

impl<T: Into<View>> From<Option<T>> for View {
    fn from(view: Option<T>) -> Self {
        view.map_or(View::Empty, Into::into)
    }
}

impl From<Portal> for View {
    fn from(portal: Portal) -> Self {
        View::Portal(portal)
    }
}

/// View rebuilt whenever the signals `view` reads change
pub fn dynamic<F, V>(view: F) -> View
where
    F: Fn() -> V + 'static,
    V: Into<View>,
{
    View::Dynamic(Rc::new(move || view().into()))
}

/// Component function: runs once in its own scope
pub fn component<F, V>(body: F) -> View
where
    F: FnOnce() -> V + 'static,
    V: Into<View>,
{
    View::Component(Box::new(move || body().into()))
}

pub fn fragment(views: Vec<View>) -> View {
    View::Fragment(views)
}

/// Keyed list: one view per item, reused while its key stays in `items`
pub fn each<T, K, S, KF, VF, V>(items: S, key: KF, view: VF) -> View
where
    T: 'static,
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    S: Fn() -> Vec<T> + 'static,
    KF: Fn(&T) -> K + 'static,
    VF: Fn(T) -> V + 'static,
    V: Into<View>,
{
    View::List(ListView(Box::new(move |cx: &ThreeContext| {
        let cx = cx.clone();
        let rows = map_keyed(items, key, move |item| render_view(&cx, view(item).into()));
        Accessor::new(move || {
            rows.try_get()
                .map(|rows| rows.iter().flat_map(Accessor::call).collect())
                .unwrap_or_default()
        })
    })))
}

/// Render `children` into `container` instead of the surrounding parent
pub fn portal(container: ObjectRef, children: impl Into<View>) -> Portal {
    Portal {
        container,
        camera: None,
        children: Box::new(children.into()),
    }
}
