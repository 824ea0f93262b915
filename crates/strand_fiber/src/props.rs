//! Property application
//!
//! Writes declarative prop values onto engine objects. Keys are dash-separated
//! paths (`position-x`, `material-color`, `material-0-opacity`) resolved
//! through nested engine objects, list slots and value components.
//!
//! The final slot is written with the first setter the target supports:
//!
//! 1. `copy` from a value of the same family
//! 2. layer `mask` copy
//! 3. element-wise set from an array
//! 4. scalar broadcast (not for colours)
//! 5. generic single-argument set
//! 6. plain assignment

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use strand_3d::{ObjectId, ObjectRef, Setters, Value};

use crate::error::{FiberError, Result};

/// Slots whose truthiness flips require the holder to be re-uploaded
const NEEDS_UPDATE_KEYS: &[&str] = &[
    "map",
    "envMap",
    "bumpMap",
    "normalMap",
    "transparent",
    "morphTargets",
    "skinning",
    "alphaTest",
    "useVertexColors",
    "flatShading",
];

const LINEAR_ENCODING: f64 = 3000.0;
const SRGB_ENCODING: f64 = 3001.0;

/// Write `value` at the dashed `key` path of `object`
pub fn write_prop(object: &ObjectRef, key: &str, value: &Value) -> Result<()> {
    let segments: Vec<&str> = key.split('-').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(FiberError::prop(key, object, "empty path segment"));
    }
    let (holder, rest) = descend(object, &segments);
    write_slot(&holder, rest, value).map_err(|reason| FiberError::prop(key, object, reason))
}

/// Follow object-valued slots (and list slots indexed by number) for as long
/// as the path continues into another engine object
fn descend<'a>(object: &ObjectRef, segments: &'a [&'a str]) -> (ObjectRef, &'a [&'a str]) {
    let mut holder = object.clone();
    let mut i = 0;
    while i + 1 < segments.len() {
        match holder.get(segments[i]) {
            Some(Value::Object(next)) => {
                holder = next;
                i += 1;
            }
            Some(Value::List(items)) if i + 2 < segments.len() => {
                let next = segments[i + 1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index))
                    .and_then(|item| item.as_object().cloned());
                match next {
                    Some(next) => {
                        holder = next;
                        i += 2;
                    }
                    None => break,
                }
            }
            _ => break,
        }
    }
    (holder, &segments[i..])
}

fn write_slot(holder: &ObjectRef, path: &[&str], value: &Value) -> std::result::Result<(), String> {
    let (key, value) = alias_color_space(holder, path[0], value);
    if path.len() > 1 {
        let written = holder.with_prop_mut(key, |slot| write_nested(slot, &path[1..], &value));
        return match written {
            Some(result) => result,
            None => Err(format!("{holder} has no property {key:?}")),
        };
    }

    let previous = holder.get(key);
    let next = match previous.clone() {
        Some(mut slot) => {
            apply_setters(&mut slot, &value)?;
            slot
        }
        None => value.clone(),
    };
    holder.set(key, next);

    if NEEDS_UPDATE_KEYS.contains(&key) {
        let was = previous.as_ref().is_some_and(Value::is_truthy);
        if was != value.is_truthy() {
            holder.set("needsUpdate", Value::Bool(true));
        }
    }
    Ok(())
}

fn write_nested(slot: &mut Value, path: &[&str], value: &Value) -> std::result::Result<(), String> {
    let segment = path[0];
    if let Value::List(items) = slot {
        let index: usize = segment
            .parse()
            .map_err(|_| format!("{segment:?} is not a list index"))?;
        let item = items
            .get_mut(index)
            .ok_or_else(|| format!("index {index} is out of bounds"))?;
        return if path.len() == 1 {
            apply_setters(item, value)
        } else {
            write_nested(item, &path[1..], value)
        };
    }

    if path.len() > 1 {
        return Err(format!("cannot descend into {} at {segment:?}", slot.kind_name()));
    }
    let kind = slot.kind_name();
    let component = slot
        .component_mut(segment)
        .ok_or_else(|| format!("{kind} has no component {segment:?}"))?;
    *component = value
        .as_f32()
        .ok_or_else(|| format!("component {segment:?} expects a number"))?;
    Ok(())
}

/// Write `incoming` into an existing slot value
pub fn apply_setters(target: &mut Value, incoming: &Value) -> std::result::Result<(), String> {
    let setters = target.setters();
    if setters.contains(Setters::COPY) && target.same_kind(incoming) {
        target.copy_from(incoming);
        return Ok(());
    }
    if setters.contains(Setters::MASK) && matches!(incoming, Value::Layers(_)) {
        target.copy_mask(incoming);
        return Ok(());
    }
    if setters.contains(Setters::ARRAY) {
        if let Value::List(items) = incoming {
            return target.set_from_array(items).map_err(|e| e.to_string());
        }
    }
    if setters.contains(Setters::SCALAR) && !setters.contains(Setters::COLOR) {
        if let Some(s) = incoming.as_f32() {
            target.set_scalar(s);
            return Ok(());
        }
    }
    if setters.contains(Setters::SET) && !incoming.is_null() {
        return target.set_single(incoming).map_err(|e| e.to_string());
    }
    *target = incoming.clone();
    Ok(())
}

/// Rewrite legacy `encoding` props to `colorSpace` when the holder has the
/// modern slot
fn alias_color_space<'k>(holder: &ObjectRef, key: &'k str, value: &Value) -> (&'k str, Value) {
    let modern = match key {
        "encoding" => "colorSpace",
        "outputEncoding" => "outputColorSpace",
        _ => return (key, value.clone()),
    };
    if !holder.has(modern) {
        return (key, value.clone());
    }
    let value = match value.as_f64() {
        Some(n) if n == LINEAR_ENCODING => Value::Text("srgb-linear".into()),
        Some(n) if n == SRGB_ENCODING => Value::Text("srgb".into()),
        _ => value.clone(),
    };
    (modern, value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Slot attachment
// ─────────────────────────────────────────────────────────────────────────────

/// Slot value a list displaced when an indexed attach made room for itself.
/// Shared by every indexed attachment on the same `(holder, key)`.
#[derive(Debug, PartialEq)]
pub struct DisplacedSlot {
    pub original: Option<Value>,
}

type DisplacedTable = FxHashMap<(ObjectId, String), Weak<DisplacedSlot>>;

thread_local! {
    static DISPLACED: RefCell<DisplacedTable> = RefCell::new(FxHashMap::default());
}

fn displaced_slot(holder: &ObjectRef, key: &str) -> Option<Rc<DisplacedSlot>> {
    DISPLACED.with(|table| {
        table
            .borrow()
            .get(&(holder.id(), key.to_string()))
            .and_then(Weak::upgrade)
    })
}

fn displace_slot(holder: &ObjectRef, key: &str, original: Option<Value>) -> Rc<DisplacedSlot> {
    let record = Rc::new(DisplacedSlot { original });
    DISPLACED.with(|table| {
        let mut table = table.borrow_mut();
        table.retain(|_, slot| slot.strong_count() > 0);
        table.insert((holder.id(), key.to_string()), Rc::downgrade(&record));
    });
    record
}

fn forget_displaced(holder: &ObjectRef, key: &str, record: &Rc<DisplacedSlot>) {
    DISPLACED.with(|table| {
        let mut table = table.borrow_mut();
        let slot_key = (holder.id(), key.to_string());
        let same = table
            .get(&slot_key)
            .is_some_and(|slot| std::ptr::eq(slot.as_ptr(), Rc::as_ptr(record)));
        if same {
            table.remove(&slot_key);
        }
    });
}

/// Record of a slot attachment, used to undo it
#[derive(Clone, Debug, PartialEq)]
pub struct SlotAttachment {
    pub holder: ObjectRef,
    pub key: String,
    pub index: Option<usize>,
    /// Value the child displaced (`None` if the slot or element was empty)
    pub previous: Option<Value>,
    /// Original slot value, restored once the list it became is empty again
    pub displaced: Option<Rc<DisplacedSlot>>,
}

/// Assign `child` to the dashed slot `path` of `parent`
///
/// A trailing numeric segment (`material-1`) indexes into a list-valued slot,
/// turning the slot into a list first if it is not one.
pub fn attach_slot(parent: &ObjectRef, path: &str, child: Value) -> Result<SlotAttachment> {
    let segments: Vec<&str> = path.split('-').collect();
    let index = match segments.last().and_then(|s| s.parse::<usize>().ok()) {
        Some(index) if segments.len() > 1 => Some(index),
        _ => None,
    };
    let key_at = if index.is_some() { segments.len() - 2 } else { segments.len() - 1 };
    let key = segments[key_at];
    if key.is_empty() {
        return Err(FiberError::prop(path, parent, "empty attach path"));
    }

    let mut holder = parent.clone();
    for segment in &segments[..key_at] {
        holder = match holder.get(segment) {
            Some(Value::Object(next)) => next,
            _ => {
                return Err(FiberError::prop(
                    path,
                    parent,
                    format!("{segment:?} is not an object slot"),
                ))
            }
        };
    }

    let Some(index) = index else {
        let previous = holder.set(key, child);
        return Ok(SlotAttachment {
            holder,
            key: key.to_string(),
            index: None,
            previous,
            displaced: None,
        });
    };

    let (mut items, displaced) = match holder.get(key) {
        Some(Value::List(items)) => (items, displaced_slot(&holder, key)),
        other => (Vec::new(), Some(displace_slot(&holder, key, other))),
    };
    if items.len() <= index {
        items.resize(index + 1, Value::Null);
    }
    let previous = Some(std::mem::replace(&mut items[index], child)).filter(|v| !v.is_null());
    holder.set(key, Value::List(items));
    Ok(SlotAttachment {
        holder,
        key: key.to_string(),
        index: Some(index),
        previous,
        displaced,
    })
}

/// Undo [`attach_slot`], restoring the displaced value or deleting the slot
pub fn detach_slot(attachment: SlotAttachment) {
    let SlotAttachment {
        holder,
        key,
        index,
        previous,
        displaced,
    } = attachment;

    let Some(index) = index else {
        match previous {
            Some(value) => {
                holder.set(&key, value);
            }
            None => {
                holder.remove_prop(&key);
            }
        }
        return;
    };

    let Some(Value::List(mut items)) = holder.get(&key) else {
        return;
    };
    if index < items.len() {
        items[index] = previous.unwrap_or(Value::Null);
    }
    while items.last().is_some_and(Value::is_null) {
        items.pop();
    }

    match displaced {
        Some(record) if items.is_empty() => {
            forget_displaced(&holder, &key, &record);
            match record.original.clone() {
                Some(value) => {
                    holder.set(&key, value);
                }
                None => {
                    holder.remove_prop(&key);
                }
            }
        }
        _ => {
            holder.set(&key, Value::List(items));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_3d::{construct, Color, Layers, Vec3};

    fn object(name: &str) -> ObjectRef {
        construct(name, &[]).unwrap().unwrap()
    }

    fn list(items: &[f64]) -> Value {
        Value::List(items.iter().map(|n| Value::Number(*n)).collect())
    }

    #[test]
    fn test_array_and_component_writes() {
        let mesh = object("Mesh");
        write_prop(&mesh, "position", &list(&[1.0, 2.0, 3.0])).unwrap();
        write_prop(&mesh, "position-y", &Value::Number(9.0)).unwrap();
        assert_eq!(mesh.get("position"), Some(Value::Vec3(Vec3::new(1.0, 9.0, 3.0))));
    }

    #[test]
    fn test_scalar_broadcast_skips_colour() {
        let mesh = object("Mesh");
        write_prop(&mesh, "scale", &Value::Number(2.0)).unwrap();
        assert_eq!(mesh.get("scale"), Some(Value::Vec3(Vec3::splat(2.0))));

        let material = object("MeshBasicMaterial");
        write_prop(&material, "color", &Value::Number(0xff0000 as f64)).unwrap();
        assert_eq!(material.get("color"), Some(Value::Color(Color::rgb(1.0, 0.0, 0.0))));
    }

    #[test]
    fn test_colour_from_string_and_nested_path() {
        let mesh = object("Mesh");
        write_prop(&mesh, "material-color", &Value::Text("#00ff00".into())).unwrap();
        let material = mesh.get("material").unwrap().as_object().cloned().unwrap();
        assert_eq!(material.get("color"), Some(Value::Color(Color::rgb(0.0, 1.0, 0.0))));

        write_prop(&mesh, "material-color-r", &Value::Number(0.5)).unwrap();
        assert_eq!(material.get("color").unwrap().component("r"), Some(0.5));
    }

    #[test]
    fn test_layers_mask_and_channel() {
        let mesh = object("Mesh");
        let mut layers = Layers::DEFAULT;
        layers.enable(3);
        write_prop(&mesh, "layers", &Value::Layers(layers)).unwrap();
        assert_eq!(mesh.get("layers"), Some(Value::Layers(layers)));

        write_prop(&mesh, "layers", &Value::Number(2.0)).unwrap();
        let mut only_two = Layers::DEFAULT;
        only_two.set(2);
        assert_eq!(mesh.get("layers"), Some(Value::Layers(only_two)));
    }

    #[test]
    fn test_plain_assignment_and_new_slot() {
        let mesh = object("Mesh");
        write_prop(&mesh, "name", &Value::Text("hero".into())).unwrap();
        write_prop(&mesh, "userFlag", &Value::Bool(true)).unwrap();
        assert_eq!(mesh.get("name"), Some(Value::Text("hero".into())));
        assert_eq!(mesh.get("userFlag"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_bad_values_are_errors() {
        let mesh = object("Mesh");
        assert!(write_prop(&mesh, "position", &list(&[1.0])).is_err());
        assert!(write_prop(&mesh, "position-q", &Value::Number(1.0)).is_err());
        assert!(write_prop(&mesh, "nothing-here", &Value::Number(1.0)).is_err());
        assert!(write_prop(&mesh, "position-", &Value::Number(1.0)).is_err());
    }

    #[test]
    fn test_needs_update_on_truthiness_change() {
        let material = object("MeshStandardMaterial");
        material.set("needsUpdate", Value::Bool(false));
        write_prop(&material, "transparent", &Value::Bool(false)).unwrap();
        assert_eq!(material.get("needsUpdate"), Some(Value::Bool(false)));

        let texture = object("Texture");
        write_prop(&material, "map", &Value::Object(texture)).unwrap();
        assert_eq!(material.get("needsUpdate"), Some(Value::Bool(true)));

        material.set("needsUpdate", Value::Bool(false));
        write_prop(&material, "map", &Value::Null).unwrap();
        assert_eq!(material.get("needsUpdate"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_encoding_alias() {
        let texture = object("Texture");
        write_prop(&texture, "encoding", &Value::Number(3001.0)).unwrap();
        assert_eq!(texture.get("colorSpace"), Some(Value::Text("srgb".into())));
        assert!(!texture.has("encoding"));

        // No modern slot: the legacy key is written as-is
        let mesh = object("Mesh");
        write_prop(&mesh, "encoding", &Value::Number(3000.0)).unwrap();
        assert_eq!(mesh.get("encoding"), Some(Value::Number(3000.0)));
    }

    #[test]
    fn test_indexed_material_path() {
        let mesh = object("Mesh");
        let a = object("MeshBasicMaterial");
        let b = object("MeshBasicMaterial");
        mesh.set("material", Value::List(vec![a.clone().into(), b.clone().into()]));
        write_prop(&mesh, "material-1-opacity", &Value::Number(0.25)).unwrap();
        assert_eq!(b.get("opacity"), Some(Value::Number(0.25)));
        assert_eq!(a.get("opacity"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_attach_detach_restores_previous() {
        let mesh = object("Mesh");
        let original = mesh.get("material").unwrap();
        let replacement = object("MeshStandardMaterial");

        let attachment = attach_slot(&mesh, "material", replacement.clone().into()).unwrap();
        assert_eq!(mesh.get("material"), Some(Value::Object(replacement)));
        detach_slot(attachment);
        assert_eq!(mesh.get("material"), Some(original));
    }

    #[test]
    fn test_attach_detach_removes_new_slot() {
        let scene = object("Scene");
        let target = object("Object3D");
        let attachment = attach_slot(&scene, "userData", target.into()).unwrap();
        assert!(attachment.previous.is_none());
        detach_slot(attachment);
        assert!(!scene.has("userData"));
    }

    #[test]
    fn test_numeric_attach_coerces_list() {
        let mesh = object("Mesh");
        let original = mesh.get("material").unwrap();
        let a = object("MeshBasicMaterial");
        let b = object("MeshBasicMaterial");

        let first = attach_slot(&mesh, "material-0", a.clone().into()).unwrap();
        let second = attach_slot(&mesh, "material-1", b.clone().into()).unwrap();
        assert_eq!(
            mesh.get("material"),
            Some(Value::List(vec![a.into(), b.into()]))
        );

        detach_slot(second);
        detach_slot(first);
        assert_eq!(mesh.get("material"), Some(original));
    }

    #[test]
    fn test_numeric_attach_restores_in_any_detach_order() {
        let mesh = object("Mesh");
        let original = mesh.get("material").unwrap();
        let a = object("MeshBasicMaterial");
        let b = object("MeshBasicMaterial");

        let first = attach_slot(&mesh, "material-0", a.into()).unwrap();
        let second = attach_slot(&mesh, "material-1", b.clone().into()).unwrap();
        assert!(Rc::ptr_eq(
            first.displaced.as_ref().unwrap(),
            second.displaced.as_ref().unwrap()
        ));

        detach_slot(first);
        assert_eq!(
            mesh.get("material"),
            Some(Value::List(vec![Value::Null, b.into()]))
        );
        detach_slot(second);
        assert_eq!(mesh.get("material"), Some(original.clone()));

        let again = attach_slot(&mesh, "material-0", object("MeshBasicMaterial").into()).unwrap();
        detach_slot(again);
        assert_eq!(mesh.get("material"), Some(original));
    }

    #[test]
    fn test_nested_attach_path() {
        let mesh = object("Mesh");
        let texture = object("Texture");
        let material = mesh.get("material").unwrap().as_object().cloned().unwrap();
        let attachment = attach_slot(&mesh, "material-map", texture.clone().into()).unwrap();
        assert_eq!(material.get("map"), Some(Value::Object(texture)));
        detach_slot(attachment);
        assert_eq!(material.get("map"), Some(Value::Null));
    }
}
