//! Instance lifecycle
//!
//! Rendering a [`View`] creates instances inside reactive scopes and yields
//! an [`Accessor`] the parent's scene-graph manager reads to learn which
//! children currently exist. Each element gets its own scope: props bind as
//! effects inside it, children render inside it, and disposing it tears the
//! instance down.

use std::cell::RefCell;
use std::rc::Rc;

use strand_3d::{ObjectRef, Value};
use strand_core::{
    create_effect, create_memo, create_scope, create_signal, on_cleanup, provide_context,
    report_error, untrack,
};

use crate::catalogue::Component;
use crate::context::{RootState, ThreeContext};
use crate::element::{Args, Element, Portal, Prop, Source, View};
use crate::error::{FiberError, Result};
use crate::events::{is_event_prop, EventKind, Handler};
use crate::graph::manage_scene_graph;
use crate::instance::{InstanceData, InstanceId};
use crate::props::write_prop;

/// Reactive read of a child list
#[derive(Clone)]
pub(crate) struct Accessor(Rc<dyn Fn() -> Vec<InstanceId>>);

impl Accessor {
    pub(crate) fn new(read: impl Fn() -> Vec<InstanceId> + 'static) -> Self {
        Self(Rc::new(read))
    }

    pub(crate) fn fixed(ids: Vec<InstanceId>) -> Self {
        Self::new(move || ids.clone())
    }

    pub(crate) fn empty() -> Self {
        Self::fixed(Vec::new())
    }

    pub(crate) fn call(&self) -> Vec<InstanceId> {
        (self.0)()
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Render `view` in the current scope
pub(crate) fn render_view(cx: &ThreeContext, view: View) -> Accessor {
    match view {
        View::Empty => Accessor::empty(),
        View::Element(element) => match instantiate(cx, element) {
            Some(id) => Accessor::fixed(vec![id]),
            None => Accessor::empty(),
        },
        View::Fragment(views) => {
            let parts: Vec<Accessor> = views.into_iter().map(|v| render_view(cx, v)).collect();
            match parts.len() {
                0 => Accessor::empty(),
                1 => parts.into_iter().next().unwrap_or_else(Accessor::empty),
                _ => Accessor::new(move || parts.iter().flat_map(Accessor::call).collect()),
            }
        }
        View::Dynamic(view) => {
            let cx = cx.clone();
            let current = create_memo(move || render_view(&cx, view()));
            Accessor::new(move || current.try_get().map(|acc| acc.call()).unwrap_or_default())
        }
        View::Component(body) => {
            let (accessor, _) = create_scope(|| render_view(cx, body()));
            accessor
        }
        View::List(list) => (list.0)(cx),
        View::Portal(portal) => {
            render_portal(cx, portal);
            Accessor::empty()
        }
    }
}

fn render_portal(cx: &ThreeContext, portal: Portal) {
    let Portal {
        container,
        camera,
        children,
    } = portal;
    let portal_cx = cx.portal(container.clone(), camera);
    create_scope(|| {
        provide_context(portal_cx.clone());
        let store = &portal_cx.state.store;
        let adopted = !store.is_instance(&container);
        let id = store.augment(
            &container,
            InstanceData {
                attach: None,
                primitive: true,
            },
        );
        let children = render_view(&portal_cx, *children);
        manage_scene_graph(&portal_cx, id, children);
        if adopted {
            let state = portal_cx.state.clone();
            on_cleanup(move || {
                state.store.remove(id);
            });
        }
    });
}

/// Create the instance for `element` in a fresh child scope
///
/// Unknown names render nothing. Construction failures go to the nearest
/// error handler. Either way nothing is left registered.
fn instantiate(cx: &ThreeContext, element: Element) -> Option<InstanceId> {
    let (built, scope) = create_scope(|| build(cx, element));
    match built {
        Ok(id) => Some(id),
        Err(err) => {
            scope.dispose();
            match &err {
                FiberError::UnknownElement(name) => {
                    tracing::warn!(element = %name, "unknown element renders nothing");
                }
                _ => {
                    report_error(&err);
                }
            }
            None
        }
    }
}

fn build(cx: &ThreeContext, element: Element) -> Result<InstanceId> {
    let Element {
        source,
        args,
        props,
        attach,
        children,
    } = element;
    let state = cx.state.clone();

    let initial_args = match &args {
        Args::Static(args) => args.clone(),
        Args::Reactive(args) => args(),
    };
    let (object, component) = match source {
        Source::Named(name) => {
            let component = state
                .catalogue
                .resolve_component(&name)
                .ok_or(FiberError::UnknownElement(name))?;
            (component.construct(&initial_args)?, Some(component))
        }
        Source::Primitive(object) => (object, None),
    };
    let primitive = component.is_none();

    let id = state.store.augment(&object, InstanceData { attach, primitive });
    let binding = create_signal(object.clone());
    state.store.with_mut(id, |i| i.binding = Some(binding));
    {
        let state = state.clone();
        on_cleanup(move || teardown(&state, id));
    }

    bind_props(&state, id, props);
    if let (Args::Reactive(args), Some(component)) = (args, component) {
        watch_args(&state, id, component, args, initial_args);
    }

    let children = render_view(cx, View::Fragment(children));
    manage_scene_graph(cx, id, children);

    tracing::debug!(%object, ?id, "instance mounted");
    Ok(id)
}

fn teardown(state: &RootState, id: InstanceId) {
    state.events.borrow_mut().forget(id);
    let Some(instance) = state.store.remove(id) else {
        return;
    };
    if let Some(parent) = instance.parent {
        state.store.with_mut(parent, |p| {
            p.children.shift_remove(&id);
        });
    }
    if instance.dispose {
        instance.object.dispose();
    }
    tracing::debug!(object = %instance.object, ?id, "instance unmounted");
}

/// Non-dashed keys first, then dashed keys by depth
fn path_order<T>(props: &mut [(String, T)]) {
    props.sort_by_key(|(key, _)| key.matches('-').count());
}

fn bind_props(state: &Rc<RootState>, id: InstanceId, mut props: Vec<(String, Prop)>) {
    path_order(&mut props);
    for (key, prop) in props {
        let state = state.clone();
        match prop {
            Prop::Static(value) => untrack(|| log_failure(apply_prop(&state, id, &key, value))),
            Prop::Reactive(value) => {
                create_effect(move || {
                    let next = value();
                    untrack(|| log_failure(apply_prop(&state, id, &key, next)));
                });
            }
            Prop::Handler(handler) => set_handler(&state, id, &key, handler),
            Prop::ReactiveHandler(handler) => {
                create_effect(move || {
                    let next = handler();
                    untrack(|| set_handler(&state, id, &key, next));
                });
            }
            Prop::Unset => forget_prop(&state, id, &key),
        }
    }
}

fn log_failure(result: Result<()>) {
    if let Err(err) = result {
        tracing::warn!(%err, "prop not applied");
    }
}

/// Apply one prop to a mounted instance
///
/// After writing `key`, any stored dashed props under it (`key-x`) are
/// written again so they keep precedence over the parent value.
pub(crate) fn apply_prop(state: &RootState, id: InstanceId, key: &str, value: Value) -> Result<()> {
    let object = state.store.object(id).ok_or(FiberError::Unmounted)?;
    if is_event_prop(key) {
        return Err(FiberError::prop(key, &object, "handlers are bound with Element::on"));
    }
    if key == "dispose" {
        state.store.with_mut(id, |i| i.dispose = value.is_truthy());
        return Ok(());
    }

    write_prop(&object, key, &value)?;

    let prefix = format!("{key}-");
    let (nested, hidden) = state
        .store
        .with_mut(id, |i| {
            i.props.insert(key.to_string(), value);
            let nested: Vec<(String, Value)> = i
                .props
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            (nested, i.is_hidden)
        })
        .ok_or(FiberError::Unmounted)?;
    for (key, value) in nested {
        write_prop(&object, &key, &value)?;
    }
    if hidden && key == "visible" {
        object.set("visible", Value::Bool(false));
    }

    state.invalidate(1);
    Ok(())
}

fn set_handler(state: &RootState, id: InstanceId, key: &str, handler: Option<Handler>) {
    let Some(kind) = EventKind::from_prop_name(key) else {
        tracing::warn!(key, "unknown event handler ignored");
        return;
    };
    match handler {
        Some(handler) => {
            let added = state
                .store
                .with_mut(id, |i| {
                    let added = i.handlers.insert(kind, handler).is_none();
                    if added {
                        i.event_handler_count += 1;
                    }
                    added
                })
                .unwrap_or(false);
            if added {
                state.events.borrow_mut().registry.register(id, kind);
            }
        }
        None => {
            let remaining = state
                .store
                .with_mut(id, |i| {
                    i.handlers.remove(&kind)?;
                    i.event_handler_count -= 1;
                    Some(i.handler_kinds())
                })
                .flatten();
            if let Some(remaining) = remaining {
                state
                    .events
                    .borrow_mut()
                    .registry
                    .unregister(id, kind, &remaining);
            }
        }
    }
}

fn forget_prop(state: &RootState, id: InstanceId, key: &str) {
    if is_event_prop(key) {
        set_handler(state, id, key, None);
        return;
    }
    state.store.with_mut(id, |i| {
        i.props.shift_remove(key);
    });
}

fn watch_args(
    state: &Rc<RootState>,
    id: InstanceId,
    component: Component,
    args: Rc<dyn Fn() -> Vec<Value>>,
    initial: Vec<Value>,
) {
    let state = state.clone();
    let current = RefCell::new(initial);
    create_effect(move || {
        let next = args();
        if *current.borrow() == next {
            return;
        }
        if untrack(|| rebuild(&state, id, &component, &next)) {
            *current.borrow_mut() = next;
        }
    });
}

/// Swap in a newly constructed object for `id`
///
/// Props are re-applied to the new object, then the instance's binding
/// changes so scene-graph managers move the new object into the old one's
/// slot and re-attach its children. Event registrations are keyed by
/// instance and carry over as they are.
fn rebuild(state: &RootState, id: InstanceId, component: &Component, args: &[Value]) -> bool {
    let object = match component.construct(args) {
        Ok(object) => object,
        Err(err) => {
            report_error(&err);
            return false;
        }
    };
    let Some(old) = state.store.rebind(id, &object) else {
        return false;
    };
    let Some((props, hidden, dispose, binding)) = state.store.with(id, |i| {
        let props: Vec<(String, Value)> =
            i.props.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        (props, i.is_hidden, i.dispose, i.binding)
    }) else {
        return false;
    };

    let mut props = props;
    path_order(&mut props);
    for (key, value) in &props {
        if let Err(err) = write_prop(&object, key, value) {
            tracing::warn!(%err, "prop not carried over to rebuilt object");
        }
    }
    if hidden {
        object.set("visible", Value::Bool(false));
    }

    tracing::debug!(%old, new = %object, ?id, "rebuilt after constructor args changed");
    if let Some(binding) = binding {
        binding.set(object);
    }
    if dispose {
        old.dispose();
    }
    state.invalidate(1);
    true
}

/// Engine object currently bound to `id`, as a reactive read
pub(crate) fn bound_object(state: &RootState, id: InstanceId) -> Option<ObjectRef> {
    match state.store.with(id, |i| i.binding).flatten() {
        Some(binding) => binding.try_get(),
        None => state.store.object(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_order_puts_parents_first() {
        let mut props = vec![
            ("position-y".to_string(), ()),
            ("material-color-r".to_string(), ()),
            ("position".to_string(), ()),
            ("visible".to_string(), ()),
        ];
        path_order(&mut props);
        let keys: Vec<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            ["position", "visible", "position-y", "material-color-r"]
        );
    }

    #[test]
    fn test_accessor_identity() {
        let a = Accessor::empty();
        let b = a.clone();
        assert!(a == b);
        assert!(a != Accessor::empty());
    }
}
