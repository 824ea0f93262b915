//! Built-in object constructors
//!
//! Every constructor takes its positional arguments as [`Value`]s and returns
//! a fully initialised object with the engine's default property values.

use indexmap::IndexMap;
use std::rc::Rc;

use crate::error::{EngineError, Result};
use crate::math::{BoundingBox, BoundingSphere, Color, Euler, HitShape, Layers, Vec3};
use crate::object::{ObjectRef, ObjectTraits};
use crate::value::Value;

/// Constructs an object from positional arguments
pub type Constructor = Rc<dyn Fn(&[Value]) -> Result<ObjectRef>>;

/// Reads positional arguments for one constructor call
struct Args<'a> {
    constructor: &'static str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(constructor: &'static str, values: &'a [Value]) -> Self {
        Self {
            constructor,
            values,
        }
    }

    fn invalid(&self, index: usize, expected: &'static str) -> EngineError {
        EngineError::InvalidArgument {
            constructor: self.constructor.to_string(),
            index,
            expected,
        }
    }

    fn get(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    fn number(&self, index: usize, default: f64) -> Result<f64> {
        match self.get(index) {
            None => Ok(default),
            Some(Value::Number(n)) => Ok(*n),
            Some(_) => Err(self.invalid(index, "a number")),
        }
    }

    fn color(&self, index: usize, default: Color) -> Result<Color> {
        match self.get(index) {
            None => Ok(default),
            Some(value) => {
                let mut color = Value::Color(default);
                color
                    .set_single(value)
                    .map_err(|_| self.invalid(index, "a colour"))?;
                Ok(color.as_color().unwrap_or(default))
            }
        }
    }

    fn object(&self, index: usize, traits: ObjectTraits) -> Result<Option<Value>> {
        match self.get(index) {
            None => Ok(None),
            Some(Value::Object(o)) if o.is(traits) => Ok(Some(Value::Object(o.clone()))),
            Some(Value::List(items))
                if items
                    .iter()
                    .all(|i| i.as_object().is_some_and(|o| o.is(traits))) =>
            {
                Ok(Some(Value::List(items.clone())))
            }
            Some(_) => Err(self.invalid(index, "an object of the matching kind")),
        }
    }

    fn none(&self) -> Result<()> {
        match self.values.iter().position(|v| !v.is_null()) {
            Some(index) => Err(self.invalid(index, "absent")),
            None => Ok(()),
        }
    }
}

/// Base properties shared by every scene-graph node
fn node(kind: &str, traits: ObjectTraits) -> ObjectRef {
    ObjectRef::new(kind, traits | ObjectTraits::NODE)
        .with_prop("name", "")
        .with_prop("position", Vec3::ZERO)
        .with_prop("rotation", Euler::default())
        .with_prop("scale", Vec3::ONE)
        .with_prop("up", Vec3::UP)
        .with_prop("visible", true)
        .with_prop("castShadow", false)
        .with_prop("receiveShadow", false)
        .with_prop("frustumCulled", true)
        .with_prop("renderOrder", 0)
        .with_prop("layers", Layers::DEFAULT)
}

fn object3d(args: &[Value]) -> Result<ObjectRef> {
    Args::new("Object3D", args).none()?;
    Ok(node("Object3D", ObjectTraits::empty()))
}

fn group(args: &[Value]) -> Result<ObjectRef> {
    Args::new("Group", args).none()?;
    Ok(node("Group", ObjectTraits::empty()))
}

fn scene(args: &[Value]) -> Result<ObjectRef> {
    Args::new("Scene", args).none()?;
    Ok(node("Scene", ObjectTraits::SCENE)
        .with_prop("background", Value::Null)
        .with_prop("environment", Value::Null)
        .with_prop("fog", Value::Null))
}

fn mesh(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("Mesh", args);
    let geometry = match args.object(0, ObjectTraits::GEOMETRY)? {
        Some(geometry) => geometry,
        None => Value::Object(box_geometry(&[])?),
    };
    let material = match args.object(1, ObjectTraits::MATERIAL)? {
        Some(material) => material,
        None => Value::Object(basic_material(&[])?),
    };
    Ok(node("Mesh", ObjectTraits::MESH)
        .with_prop("geometry", geometry)
        .with_prop("material", material))
}

fn perspective_camera(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("PerspectiveCamera", args);
    Ok(
        node("PerspectiveCamera", ObjectTraits::CAMERA | ObjectTraits::PERSPECTIVE)
            .with_prop("fov", args.number(0, 50.0)?)
            .with_prop("aspect", args.number(1, 1.0)?)
            .with_prop("near", args.number(2, 0.1)?)
            .with_prop("far", args.number(3, 2000.0)?)
            .with_prop("zoom", 1.0),
    )
}

fn orthographic_camera(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("OrthographicCamera", args);
    Ok(
        node("OrthographicCamera", ObjectTraits::CAMERA | ObjectTraits::ORTHOGRAPHIC)
            .with_prop("left", args.number(0, -1.0)?)
            .with_prop("right", args.number(1, 1.0)?)
            .with_prop("top", args.number(2, 1.0)?)
            .with_prop("bottom", args.number(3, -1.0)?)
            .with_prop("near", args.number(4, 0.1)?)
            .with_prop("far", args.number(5, 2000.0)?)
            .with_prop("zoom", 1.0),
    )
}

fn geometry(kind: &str) -> ObjectRef {
    ObjectRef::new(kind, ObjectTraits::GEOMETRY | ObjectTraits::DISPOSABLE)
}

fn box_geometry(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("BoxGeometry", args);
    let (w, h, d) = (args.number(0, 1.0)?, args.number(1, 1.0)?, args.number(2, 1.0)?);
    let half = Vec3::new(w as f32 / 2.0, h as f32 / 2.0, d as f32 / 2.0);
    Ok(geometry("BoxGeometry")
        .with_prop("width", w)
        .with_prop("height", h)
        .with_prop("depth", d)
        .with_shape(HitShape::Box(BoundingBox::from_center_half_extents(
            Vec3::ZERO,
            half,
        ))))
}

fn sphere_geometry(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("SphereGeometry", args);
    let radius = args.number(0, 1.0)?;
    Ok(geometry("SphereGeometry")
        .with_prop("radius", radius)
        .with_prop("widthSegments", args.number(1, 32.0)?)
        .with_prop("heightSegments", args.number(2, 16.0)?)
        .with_shape(HitShape::Sphere(BoundingSphere::new(
            Vec3::ZERO,
            radius as f32,
        ))))
}

fn plane_geometry(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("PlaneGeometry", args);
    let (w, h) = (args.number(0, 1.0)?, args.number(1, 1.0)?);
    let half = Vec3::new(w as f32 / 2.0, h as f32 / 2.0, 0.0);
    Ok(geometry("PlaneGeometry")
        .with_prop("width", w)
        .with_prop("height", h)
        .with_shape(HitShape::Box(BoundingBox::from_center_half_extents(
            Vec3::ZERO,
            half,
        ))))
}

fn material(kind: &str) -> ObjectRef {
    ObjectRef::new(kind, ObjectTraits::MATERIAL | ObjectTraits::DISPOSABLE)
        .with_prop("color", Color::WHITE)
        .with_prop("opacity", 1.0)
        .with_prop("transparent", false)
        .with_prop("visible", true)
        .with_prop("side", 0)
        .with_prop("wireframe", false)
        .with_prop("alphaTest", 0.0)
        .with_prop("vertexColors", false)
        .with_prop("map", Value::Null)
        .with_prop("needsUpdate", false)
}

fn basic_material(args: &[Value]) -> Result<ObjectRef> {
    Args::new("MeshBasicMaterial", args).none()?;
    Ok(material("MeshBasicMaterial").with_prop("envMap", Value::Null))
}

fn standard_material(args: &[Value]) -> Result<ObjectRef> {
    Args::new("MeshStandardMaterial", args).none()?;
    Ok(material("MeshStandardMaterial")
        .with_prop("roughness", 1.0)
        .with_prop("metalness", 0.0)
        .with_prop("emissive", Color::BLACK)
        .with_prop("emissiveIntensity", 1.0)
        .with_prop("flatShading", false)
        .with_prop("envMap", Value::Null)
        .with_prop("normalMap", Value::Null)
        .with_prop("bumpMap", Value::Null))
}

fn texture(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("Texture", args);
    let image = args.get(0).cloned().unwrap_or_default();
    Ok(
        ObjectRef::new("Texture", ObjectTraits::TEXTURE | ObjectTraits::DISPOSABLE)
            .with_prop("image", image)
            .with_prop("colorSpace", "")
            .with_prop("flipY", true)
            .with_prop("needsUpdate", false),
    )
}

fn fog(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("Fog", args);
    Ok(ObjectRef::new("Fog", ObjectTraits::FOG)
        .with_prop("color", args.color(0, Color::WHITE)?)
        .with_prop("near", args.number(1, 1.0)?)
        .with_prop("far", args.number(2, 1000.0)?))
}

fn light(kind: &'static str, args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new(kind, args);
    Ok(node(kind, ObjectTraits::LIGHT)
        .with_prop("color", args.color(0, Color::WHITE)?)
        .with_prop("intensity", args.number(1, 1.0)?))
}

fn ambient_light(args: &[Value]) -> Result<ObjectRef> {
    light("AmbientLight", args)
}

fn directional_light(args: &[Value]) -> Result<ObjectRef> {
    let object = light("DirectionalLight", args)?;
    object.set("position", Value::Vec3(Vec3::UP));
    Ok(object)
}

fn point_light(args: &[Value]) -> Result<ObjectRef> {
    let object = light("PointLight", args)?;
    let args = Args::new("PointLight", args);
    object.set("distance", Value::Number(args.number(2, 0.0)?));
    object.set("decay", Value::Number(args.number(3, 2.0)?));
    Ok(object)
}

fn raycaster(args: &[Value]) -> Result<ObjectRef> {
    let args = Args::new("Raycaster", args);
    Ok(ObjectRef::new("Raycaster", ObjectTraits::empty())
        .with_prop("near", args.number(2, 0.0)?)
        .with_prop("far", args.number(3, f64::INFINITY)?)
        .with_prop("layers", Layers::DEFAULT))
}

/// The built-in constructor catalogue, keyed by type name
pub fn builtins() -> IndexMap<String, Constructor> {
    let entries: [(&str, fn(&[Value]) -> Result<ObjectRef>); 17] = [
        ("Object3D", object3d),
        ("Group", group),
        ("Scene", scene),
        ("Mesh", mesh),
        ("PerspectiveCamera", perspective_camera),
        ("OrthographicCamera", orthographic_camera),
        ("BoxGeometry", box_geometry),
        ("SphereGeometry", sphere_geometry),
        ("PlaneGeometry", plane_geometry),
        ("MeshBasicMaterial", basic_material),
        ("MeshStandardMaterial", standard_material),
        ("Texture", texture),
        ("Fog", fog),
        ("AmbientLight", ambient_light),
        ("DirectionalLight", directional_light),
        ("PointLight", point_light),
        ("Raycaster", raycaster),
    ];
    entries
        .into_iter()
        .map(|(name, ctor)| (name.to_string(), Rc::new(ctor) as Constructor))
        .collect()
}

/// Construct a built-in by name
pub fn construct(name: &str, args: &[Value]) -> Option<Result<ObjectRef>> {
    builtins().get(name).map(|ctor| ctor(args))
}
