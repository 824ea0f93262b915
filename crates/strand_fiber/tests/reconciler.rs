//! End-to-end reconciler behaviour against a headless root

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use strand_3d::{
    BoundingBox, HeadlessRenderer, HitShape, ObjectRef, ObjectTraits, Value, Vec3,
};
use strand_core::{create_signal, on_error, Deferred};
use strand_fiber::{
    component, create_root, dynamic, each, el, portal, primitive, use_frame, use_loader, use_three,
    Canvas, Catalogue, FrameLoop, Handler, LoadError, Loader, LoaderCache, NativeEvent, NativeKind, Root,
    RootConfig, ThreeEvent, View,
};

fn mount(config: RootConfig) -> Root {
    create_root(Canvas::new(800.0, 600.0), config).unwrap()
}

fn center(kind: NativeKind) -> NativeEvent {
    NativeEvent::new(kind, 400.0, 300.0)
}

fn corner(kind: NativeKind) -> NativeEvent {
    NativeEvent::new(kind, 0.0, 0.0)
}

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn bump(count: &Rc<Cell<u32>>) {
    count.set(count.get() + 1);
}

fn name_of(object: &ObjectRef) -> String {
    object
        .get("name")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn names(root: &Root) -> Vec<String> {
    root.scene().children().iter().map(name_of).collect()
}

#[test]
fn test_keyed_children_follow_source_order() {
    let mut root = mount(RootConfig::default());
    let items = create_signal(vec!["a", "b", "c", "d"]);
    root.render(move || {
        each(
            move || items.get(),
            |name| *name,
            |name| el("group").prop("name", name),
        )
    });
    assert_eq!(names(&root), ["a", "b", "c", "d"]);
    let before = root.scene().children();

    items.set(vec!["d", "c", "b", "a"]);
    assert_eq!(names(&root), ["d", "c", "b", "a"]);

    items.set(vec!["b", "a", "d", "c"]);
    assert_eq!(names(&root), ["b", "a", "d", "c"]);

    let after = root.scene().children();
    for object in &before {
        assert!(after.iter().any(|o| o.ptr_eq(object)), "{object} was rebuilt");
    }
    assert_eq!(root.context().store().len(), 5);

    items.set(vec!["a", "c"]);
    assert_eq!(names(&root), ["a", "c"]);
    assert_eq!(root.context().store().len(), 3);
}

#[test]
fn test_reordering_leaves_foreign_children_in_place() {
    let mut root = mount(RootConfig::default());
    let foreign = strand_3d::construct("Group", &[]).unwrap().unwrap();
    foreign.set("name", "foreign".into());
    root.scene().add(&foreign).unwrap();

    let items = create_signal(vec!["a", "b"]);
    root.render(move || {
        each(
            move || items.get(),
            |name| *name,
            |name| el("group").prop("name", name),
        )
    });
    assert_eq!(names(&root), ["foreign", "a", "b"]);
    items.set(vec!["b", "a"]);
    assert_eq!(names(&root), ["foreign", "b", "a"]);
}

#[test]
fn test_indexed_attach_is_undone_on_detach() {
    let mut root = mount(RootConfig::default());
    let show = create_signal(false);
    root.render(move || {
        el("mesh").child(dynamic(move || {
            show.get().then(|| {
                el("meshBasicMaterial")
                    .attach("material-0")
                    .prop("opacity", 0.25)
            })
        }))
    });
    let mesh = root.scene().children()[0].clone();
    let original = mesh.get("material").unwrap();
    assert!(original.as_object().is_some());

    show.set(true);
    let Some(Value::List(items)) = mesh.get("material") else {
        panic!("material should be a list slot");
    };
    assert_eq!(items.len(), 1);
    let attached = items[0].as_object().cloned().unwrap();
    assert_eq!(attached.get("opacity"), Some(Value::Number(0.25)));

    show.set(false);
    assert_eq!(mesh.get("material"), Some(original));
    assert_eq!(attached.dispose_count(), 1);
}

#[test]
fn test_indexed_attaches_restore_slot_in_any_order() {
    let mut root = mount(RootConfig::default());
    let (first, second) = (create_signal(true), create_signal(true));
    root.render(move || {
        el("mesh")
            .child(dynamic(move || {
                first.get().then(|| el("meshBasicMaterial").attach("material-0"))
            }))
            .child(dynamic(move || {
                second.get().then(|| el("meshStandardMaterial").attach("material-1"))
            }))
    });
    let mesh = root.scene().children()[0].clone();
    let Some(Value::List(items)) = mesh.get("material") else {
        panic!("material should be a list slot");
    };
    assert_eq!(items.len(), 2);
    let attached = items[0].as_object().cloned().unwrap();

    first.set(false);
    let Some(Value::List(items)) = mesh.get("material") else {
        panic!("material should still be a list slot");
    };
    assert!(items[0].is_null());
    assert_eq!(items[1].as_object().map(ObjectRef::kind), Some("MeshStandardMaterial"));

    second.set(false);
    let restored = mesh.get("material").and_then(|v| v.as_object().cloned()).unwrap();
    assert_eq!(restored.kind(), "MeshBasicMaterial");
    assert!(!restored.ptr_eq(&attached));
    assert_eq!(restored.dispose_count(), 0);
    assert_eq!(attached.dispose_count(), 1);
}

#[test]
fn test_default_slot_attach_restores_previous_value() {
    let mut root = mount(RootConfig::default());
    let show = create_signal(true);
    root.render(move || {
        el("mesh").child(dynamic(move || show.get().then(|| el("sphereGeometry").args(vec![2.0.into()]))))
    });
    let mesh = root.scene().children()[0].clone();
    let geometry = mesh.get("geometry").and_then(|v| v.as_object().cloned()).unwrap();
    assert_eq!(geometry.kind(), "SphereGeometry");

    show.set(false);
    let restored = mesh.get("geometry").and_then(|v| v.as_object().cloned()).unwrap();
    assert_eq!(restored.kind(), "BoxGeometry");
}

#[test]
fn test_stop_propagation_blocks_farther_hits() {
    let mut root = mount(RootConfig::default());
    let (front_clicks, back_clicks) = (counter(), counter());
    let (front_moves, back_moves) = (counter(), counter());
    {
        let (front_clicks, back_clicks) = (front_clicks.clone(), back_clicks.clone());
        let (front_moves, back_moves) = (front_moves.clone(), back_moves.clone());
        root.render(move || {
            vec![
                el("mesh")
                    .prop("position", [0.0, 0.0, 1.0])
                    .on("onClick", move |event| {
                        bump(&front_clicks);
                        event.stop_propagation();
                    })
                    .on("onPointerMove", move |event| {
                        bump(&front_moves);
                        event.stop_propagation();
                    }),
                el("mesh")
                    .prop("position", [0.0, 0.0, -1.0])
                    .on("onClick", move |_| bump(&back_clicks))
                    .on("onPointerMove", move |_| bump(&back_moves)),
            ]
        });
    }

    root.dispatch(center(NativeKind::Click));
    assert_eq!((front_clicks.get(), back_clicks.get()), (1, 0));

    root.dispatch(center(NativeKind::PointerMove));
    assert_eq!((front_moves.get(), back_moves.get()), (1, 0));
}

fn overlapping_hover_meshes(
    root: &mut Root,
    stop_enter: bool,
) -> (Rc<Cell<u32>>, Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let (front_enters, back_enters, back_moves) = (counter(), counter(), counter());
    {
        let (front_enters, back_enters, back_moves) =
            (front_enters.clone(), back_enters.clone(), back_moves.clone());
        root.render(move || {
            vec![
                el("mesh")
                    .prop("position", [0.0, 0.0, 1.0])
                    .on("onPointerEnter", move |event| {
                        bump(&front_enters);
                        if stop_enter {
                            event.stop_propagation();
                        }
                    })
                    .on("onPointerMove", move |event| {
                        if !stop_enter {
                            event.stop_propagation();
                        }
                    }),
                el("mesh")
                    .prop("position", [0.0, 0.0, -1.0])
                    .on("onPointerEnter", move |_| bump(&back_enters))
                    .on("onPointerMove", move |_| bump(&back_moves)),
            ]
        });
    }
    (front_enters, back_enters, back_moves)
}

#[test]
fn test_stopping_enter_does_not_stop_move() {
    let mut root = mount(RootConfig::default());
    let (front_enters, back_enters, back_moves) = overlapping_hover_meshes(&mut root, true);
    root.dispatch(center(NativeKind::PointerMove));
    assert_eq!((front_enters.get(), back_enters.get(), back_moves.get()), (1, 0, 1));
}

#[test]
fn test_stopping_move_does_not_stop_enter() {
    let mut root = mount(RootConfig::default());
    let (front_enters, back_enters, back_moves) = overlapping_hover_meshes(&mut root, false);
    root.dispatch(center(NativeKind::PointerMove));
    assert_eq!((front_enters.get(), back_enters.get(), back_moves.get()), (1, 1, 0));
}

#[test]
fn test_events_bubble_to_ancestors() {
    let mut root = mount(RootConfig::default());
    let group_clicks = counter();
    let hit_object = Rc::new(RefCell::new(None));
    {
        let group_clicks = group_clicks.clone();
        let hit_object = hit_object.clone();
        root.render(move || {
            el("group")
                .on("onClick", move |event| {
                    bump(&group_clicks);
                    *hit_object.borrow_mut() = event.object().cloned();
                })
                .child(el("mesh").prop("name", "inner"))
        });
    }
    root.dispatch(center(NativeKind::Click));
    assert_eq!(group_clicks.get(), 1);
    assert_eq!(hit_object.borrow().as_ref().map(name_of).as_deref(), Some("inner"));
}

#[test]
fn test_enter_move_leave() {
    let mut root = mount(RootConfig::default());
    let (enters, moves, leaves) = (counter(), counter(), counter());
    {
        let (enters, moves, leaves) = (enters.clone(), moves.clone(), leaves.clone());
        root.render(move || {
            el("mesh")
                .on("onPointerEnter", move |_| bump(&enters))
                .on("onPointerMove", move |_| bump(&moves))
                .on("onPointerLeave", move |_| bump(&leaves))
        });
    }

    root.dispatch(center(NativeKind::PointerMove));
    assert_eq!((enters.get(), moves.get(), leaves.get()), (1, 1, 0));

    root.dispatch(center(NativeKind::PointerMove));
    assert_eq!((enters.get(), moves.get(), leaves.get()), (1, 2, 0));

    root.dispatch(corner(NativeKind::PointerMove));
    assert_eq!((enters.get(), moves.get(), leaves.get()), (1, 2, 1));

    root.dispatch(corner(NativeKind::PointerLeave));
    assert_eq!(leaves.get(), 1);

    root.dispatch(center(NativeKind::PointerMove));
    assert_eq!((enters.get(), moves.get(), leaves.get()), (2, 3, 1));
}

#[test]
fn test_enter_only_handler_is_hit_tested() {
    let mut root = mount(RootConfig::default());
    let (enters, leaves) = (counter(), counter());
    {
        let (enters, leaves) = (enters.clone(), leaves.clone());
        root.render(move || {
            el("mesh")
                .on("onPointerEnter", move |_| bump(&enters))
                .on("onPointerLeave", move |_| bump(&leaves))
        });
    }
    root.dispatch(center(NativeKind::PointerMove));
    root.dispatch(center(NativeKind::PointerLeave));
    assert_eq!((enters.get(), leaves.get()), (1, 1));
}

#[test]
fn test_pointer_capture_persists_until_release() {
    let mut root = mount(RootConfig::default());
    let (moves, leaves, lost) = (counter(), counter(), counter());
    {
        let (moves, leaves, lost) = (moves.clone(), leaves.clone(), lost.clone());
        root.render(move || {
            el("mesh")
                .on("onPointerDown", |event| event.set_pointer_capture())
                .on("onPointerMove", move |_| bump(&moves))
                .on("onPointerLeave", move |_| bump(&leaves))
                .on("onLostPointerCapture", move |_| bump(&lost))
        });
    }

    root.dispatch(center(NativeKind::PointerMove));
    root.dispatch(center(NativeKind::PointerDown));
    root.dispatch(corner(NativeKind::PointerMove));
    assert_eq!((moves.get(), leaves.get()), (2, 0));

    root.dispatch(corner(NativeKind::PointerUp));
    assert_eq!(lost.get(), 1);

    root.dispatch(corner(NativeKind::PointerMove));
    assert_eq!((moves.get(), leaves.get()), (2, 1));
}

#[test]
fn test_unmount_releases_pointer_capture() {
    let mut root = mount(RootConfig::default());
    let show = create_signal(true);
    let behind_moves = counter();
    {
        let behind_moves = behind_moves.clone();
        root.render(move || {
            vec![
                dynamic(move || {
                    show.get().then(|| {
                        el("mesh")
                            .prop("position", [0.0, 0.0, 1.0])
                            .on("onPointerDown", |event| event.set_pointer_capture())
                    })
                }),
                el("mesh")
                    .prop("position", [0.0, 0.0, -1.0])
                    .on("onPointerMove", move |_| bump(&behind_moves))
                    .into(),
            ]
        });
    }

    root.dispatch(center(NativeKind::PointerDown));
    show.set(false);
    root.dispatch(center(NativeKind::PointerMove));
    assert_eq!(behind_moves.get(), 1);
}

#[test]
fn test_pointer_missed() {
    let mut root = mount(RootConfig::default());
    let (clicks, mesh_missed, group_missed) = (counter(), counter(), counter());
    {
        let (clicks, mesh_missed, group_missed) =
            (clicks.clone(), mesh_missed.clone(), group_missed.clone());
        root.render(move || {
            vec![
                el("mesh")
                    .on("onClick", move |_| bump(&clicks))
                    .on("onPointerMissed", move |_| bump(&mesh_missed)),
                el("group").on("onPointerMissed", move |_| bump(&group_missed)),
            ]
        });
    }

    root.dispatch(corner(NativeKind::Click));
    assert_eq!((clicks.get(), mesh_missed.get(), group_missed.get()), (0, 1, 1));

    root.dispatch(center(NativeKind::Click));
    assert_eq!((clicks.get(), mesh_missed.get(), group_missed.get()), (1, 1, 1));
}

#[test]
fn test_reactive_handler_registration() {
    let mut root = mount(RootConfig::default());
    let clicks = counter();
    let enabled = create_signal(true);
    {
        let clicks = clicks.clone();
        root.render(move || {
            let handler: Handler = Rc::new(move |_: &mut ThreeEvent| bump(&clicks));
            el("mesh").bind_handler("onClick", move || enabled.get().then(|| handler.clone()))
        });
    }
    root.dispatch(center(NativeKind::Click));
    enabled.set(false);
    root.dispatch(center(NativeKind::Click));
    assert_eq!(clicks.get(), 1);
}

#[test]
fn test_dashed_props_win_over_parent_value() {
    let mut root = mount(RootConfig::default());
    let position = create_signal([1.0, 2.0, 3.0]);
    root.render(move || {
        el("mesh")
            .prop("position-x", 5.0)
            .bind("position", move || position.get())
    });
    let mesh = root.scene().children()[0].clone();
    assert_eq!(mesh.get("position"), Some(Value::Vec3(Vec3::new(5.0, 2.0, 3.0))));

    position.set([7.0, 8.0, 9.0]);
    assert_eq!(mesh.get("position"), Some(Value::Vec3(Vec3::new(5.0, 8.0, 9.0))));
}

fn crate_catalogue() -> Catalogue {
    let catalogue = Catalogue::with_builtins();
    catalogue.register("Crate", |args: &[Value]| {
        let size = args.first().and_then(Value::as_f64).unwrap_or(1.0);
        let half = size as f32 / 2.0;
        Ok(
            ObjectRef::new("Crate", ObjectTraits::NODE | ObjectTraits::DISPOSABLE)
                .with_prop("size", size)
                .with_shape(HitShape::Box(BoundingBox::from_center_half_extents(
                    Vec3::ZERO,
                    Vec3::new(half, half, half),
                ))),
        )
    });
    catalogue
}

#[test]
fn test_args_change_rebuilds_in_place() {
    let mut root = mount(RootConfig::default().with_catalogue(crate_catalogue()));
    let size = create_signal(1.0);
    let clicks = counter();
    {
        let clicks = clicks.clone();
        root.render(move || {
            vec![
                el("group").prop("name", "before"),
                el("crate")
                    .args_with(move || vec![size.get().into()])
                    .prop("name", "crate")
                    .on("onClick", move |_| bump(&clicks))
                    .child(el("group").prop("name", "inner")),
                el("group").prop("name", "after"),
            ]
        });
    }
    let old = root.scene().children()[1].clone();
    let id = root.context().instance_of(&old).unwrap();
    assert_eq!(old.children().len(), 1);

    size.set(2.0);
    assert_eq!(names(&root), ["before", "crate", "after"]);
    let new = root.scene().children()[1].clone();
    assert!(!new.ptr_eq(&old));
    assert_eq!(new.get("size"), Some(Value::Number(2.0)));
    assert_eq!(root.context().instance_of(&new), Some(id));
    assert_eq!(old.dispose_count(), 1);

    assert!(old.children().is_empty());
    assert_eq!(new.children().iter().map(name_of).collect::<Vec<_>>(), ["inner"]);

    root.dispatch(center(NativeKind::Click));
    assert_eq!(clicks.get(), 1);
}

struct CountingLoader(Rc<Cell<u32>>);

impl Loader for CountingLoader {
    type Output = String;

    fn load(&self, url: &str) -> Deferred<Rc<String>, LoadError> {
        bump(&self.0);
        Deferred::resolved(Rc::new(format!("contents of {url}")))
    }
}

#[test]
fn test_loads_are_shared_between_components() {
    let mut root = mount(RootConfig::default().with_loader_cache(LoaderCache::new()));
    let calls = counter();
    let results: Rc<RefCell<Vec<Rc<String>>>> = Rc::default();
    {
        let calls = calls.clone();
        let results = results.clone();
        root.render(move || {
            let users: Vec<View> = (0..2)
                .map(|_| {
                    let calls = calls.clone();
                    let results = results.clone();
                    component(move || {
                        let asset = use_loader(CountingLoader(calls), || "scene.bin".to_string())
                            .unwrap();
                        if let Some(asset) = asset.get() {
                            results.borrow_mut().push(asset);
                        }
                        View::Empty
                    })
                })
                .collect();
            users
        });
    }
    assert_eq!(calls.get(), 1);
    let results = results.borrow();
    assert_eq!(results.len(), 2);
    assert!(Rc::ptr_eq(&results[0], &results[1]));
    assert_eq!(results[0].as_str(), "contents of scene.bin");
}

#[test]
fn test_demand_mode_renders_only_when_invalidated() {
    let renderer = Rc::new(HeadlessRenderer::new());
    let mut root = mount(
        RootConfig::default()
            .frameloop(FrameLoop::Demand)
            .with_renderer(renderer.clone()),
    );
    let x = create_signal(0.0);
    root.render(move || el("mesh").bind("position-x", move || x.get()));

    let mut t = 0.0;
    while root.tick(t) {
        t += 16.0;
    }
    let settled = renderer.frame_count();
    assert!(settled > 0);
    assert!(!root.tick(t));
    assert_eq!(renderer.frame_count(), settled);

    x.set(1.0);
    assert!(root.tick(t));
    assert!(!root.tick(t + 16.0));
    assert_eq!(renderer.frame_count(), settled + 1);
}

#[test]
fn test_frame_subscribers_run_in_order() {
    let mut root = mount(RootConfig::default());
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    {
        let log = log.clone();
        root.render(move || {
            ["first", "second"]
                .into_iter()
                .map(|label| {
                    let log = log.clone();
                    component(move || {
                        use_frame(move |_| log.borrow_mut().push(label)).unwrap();
                        View::Empty
                    })
                })
                .collect::<Vec<_>>()
        });
    }
    assert_eq!(root.frame_subscribers(), 2);
    root.advance(0.0);
    root.advance(16.0);
    assert_eq!(*log.borrow(), ["first", "second", "first", "second"]);

    root.unmount();
    assert_eq!(root.frame_subscribers(), 0);
}

#[test]
fn test_unknown_element_renders_nothing() {
    let mut root = mount(RootConfig::default());
    root.render(|| vec![el("doesNotExist"), el("group")]);
    assert_eq!(root.scene().children().len(), 1);
    assert_eq!(root.context().store().len(), 2);
}

#[test]
fn test_construction_errors_reach_error_handler() {
    let mut root = mount(RootConfig::default());
    let errors: Rc<RefCell<Vec<String>>> = Rc::default();
    {
        let errors = errors.clone();
        root.render(move || {
            on_error(move |err| errors.borrow_mut().push(err.to_string()));
            el("mesh").child(el("boxGeometry").args(vec!["wide".into()]))
        });
    }
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].contains("BoxGeometry"));
    assert_eq!(root.scene().children().len(), 1);
}

#[test]
fn test_unmount_disposes_each_object_once() {
    let mut root = mount(RootConfig::default());
    root.render(|| {
        el("mesh")
            .child(el("boxGeometry"))
            .child(el("meshStandardMaterial"))
    });
    let mesh = root.scene().children()[0].clone();
    let geometry = mesh.get("geometry").and_then(|v| v.as_object().cloned()).unwrap();
    let material = mesh.get("material").and_then(|v| v.as_object().cloned()).unwrap();
    assert_eq!(material.kind(), "MeshStandardMaterial");

    root.unmount();
    assert!(root.scene().children().is_empty());
    assert_eq!(geometry.dispose_count(), 1);
    assert_eq!(material.dispose_count(), 1);
    assert_eq!(root.context().store().len(), 1);

    drop(root);
    assert_eq!(geometry.dispose_count(), 1);
    assert_eq!(material.dispose_count(), 1);
}

#[test]
fn test_primitives_are_kept_unless_dispose_is_set() {
    let mut root = mount(RootConfig::default());
    let kept = strand_3d::construct("BoxGeometry", &[]).unwrap().unwrap();
    let released = strand_3d::construct("MeshBasicMaterial", &[]).unwrap().unwrap();
    {
        let (kept, released) = (kept.clone(), released.clone());
        root.render(move || {
            el("mesh")
                .child(primitive(kept))
                .child(primitive(released).dispose(true))
        });
    }
    root.unmount();
    assert_eq!(kept.dispose_count(), 0);
    assert_eq!(released.dispose_count(), 1);
}

#[test]
fn test_portal_renders_into_container() {
    let mut root = mount(RootConfig::default());
    let container = strand_3d::construct("Group", &[]).unwrap().unwrap();
    let seen_scene = Rc::new(RefCell::new(None));
    {
        let container = container.clone();
        let seen_scene = seen_scene.clone();
        root.render(move || {
            vec![
                View::from(el("group")),
                portal(
                    container,
                    component(move || {
                        *seen_scene.borrow_mut() = Some(use_three().unwrap().scene());
                        el("mesh")
                    }),
                )
                .into(),
            ]
        });
    }
    assert_eq!(root.scene().children().len(), 1);
    assert_eq!(container.children().len(), 1);
    assert_eq!(seen_scene.borrow().as_ref(), Some(&container));

    root.unmount();
    assert!(container.children().is_empty());
    assert!(root.context().instance_of(&container).is_none());
}

#[test]
fn test_hidden_instances_are_not_hit() {
    let mut root = mount(RootConfig::default());
    let clicks = counter();
    {
        let clicks = clicks.clone();
        root.render(move || el("mesh").on("onClick", move |_| bump(&clicks)));
    }
    let cx = root.context();
    let id = cx.instance_of(&root.scene().children()[0]).unwrap();

    cx.hide_instance(id);
    root.dispatch(center(NativeKind::Click));
    assert_eq!(clicks.get(), 0);

    cx.unhide_instance(id);
    root.dispatch(center(NativeKind::Click));
    assert_eq!(clicks.get(), 1);
}
