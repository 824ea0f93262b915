//! Property values and their setter capabilities.
//!
//! [`Value`] is everything an engine object's property slot can hold. Math
//! families expose a fixed set of setter capabilities ([`Setters`]) so callers
//! can pick a setter once per value family instead of probing at every call.

use bitflags::bitflags;

use crate::error::{EngineError, Result};
use crate::math::{Color, Euler, Layers, Mat4, Vec2, Vec3, Vec4};
use crate::object::ObjectRef;

bitflags! {
    /// Setter capabilities exposed by a value family
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Setters: u8 {
        /// In-place copy from a value of the same family
        const COPY = 1 << 0;
        /// Element-wise set from an ordered sequence of numbers
        const ARRAY = 1 << 1;
        /// Uniform set from a single number
        const SCALAR = 1 << 2;
        /// Generic single-argument set
        const SET = 1 << 3;
        /// Bitmask with a copyable `mask` field
        const MASK = 1 << 4;
        /// Colour-like; never receives the scalar setter
        const COLOR = 1 << 5;
    }
}

/// A value stored in an engine object's property slot
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// No value / null
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Euler(Euler),
    Color(Color),
    Matrix4(Mat4),
    Layers(Layers),
    /// Reference to another engine object
    Object(ObjectRef),
    /// Ordered list (multi-material slots, argument arrays)
    List(Vec<Value>),
}

impl Value {
    /// Name of the value family, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Vec2(_) => "Vector2",
            Value::Vec3(_) => "Vector3",
            Value::Vec4(_) => "Vector4",
            Value::Euler(_) => "Euler",
            Value::Color(_) => "Color",
            Value::Matrix4(_) => "Matrix4",
            Value::Layers(_) => "Layers",
            Value::Object(_) => "object",
            Value::List(_) => "list",
        }
    }

    /// Setter capabilities of this value family
    pub fn setters(&self) -> Setters {
        match self {
            Value::Vec2(_) | Value::Vec3(_) | Value::Vec4(_) => {
                Setters::COPY | Setters::ARRAY | Setters::SCALAR
            }
            Value::Euler(_) | Value::Matrix4(_) => Setters::COPY | Setters::ARRAY,
            Value::Color(_) => {
                Setters::COPY | Setters::ARRAY | Setters::SCALAR | Setters::SET | Setters::COLOR
            }
            Value::Layers(_) => Setters::SET | Setters::MASK,
            _ => Setters::empty(),
        }
    }

    /// Whether both values belong to the same concrete family
    pub fn same_kind(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Copy `other` into `self` in place. Returns `false` for a different family.
    pub fn copy_from(&mut self, other: &Value) -> bool {
        if !self.setters().contains(Setters::COPY) || !self.same_kind(other) {
            return false;
        }
        *self = other.clone();
        true
    }

    /// Copy only the bitmask of another layer set
    pub fn copy_mask(&mut self, other: &Value) -> bool {
        match (self, other) {
            (Value::Layers(target), Value::Layers(source)) => {
                target.mask = source.mask;
                true
            }
            _ => false,
        }
    }

    /// Element-wise set from a sequence of numbers
    pub fn set_from_array(&mut self, items: &[Value]) -> Result<()> {
        let numbers: Option<Vec<f32>> = items.iter().map(Value::as_f32).collect();
        let Some(n) = numbers else {
            return Err(self.rejected(&Value::List(items.to_vec()), "expected only numbers"));
        };
        let too_short = |needed: usize| n.len() < needed;

        let applied = match self {
            Value::Vec2(v) if !too_short(2) => {
                *v = Vec2::new(n[0], n[1]);
                true
            }
            Value::Vec3(v) if !too_short(3) => {
                *v = Vec3::new(n[0], n[1], n[2]);
                true
            }
            Value::Vec4(v) if !too_short(4) => {
                *v = Vec4::new(n[0], n[1], n[2], n[3]);
                true
            }
            Value::Euler(e) if !too_short(3) => {
                *e = Euler::new(n[0], n[1], n[2]);
                true
            }
            Value::Color(c) if !too_short(3) => {
                *c = Color::rgb(n[0], n[1], n[2]);
                true
            }
            Value::Matrix4(m) if !too_short(16) => {
                let mut elements = [0.0f32; 16];
                elements.copy_from_slice(&n[..16]);
                *m = Mat4::from_cols_array(&elements);
                true
            }
            _ => false,
        };
        if !applied {
            return Err(self.rejected(&Value::List(items.to_vec()), "wrong number of components"));
        }
        Ok(())
    }

    /// Set every component to `s`
    pub fn set_scalar(&mut self, s: f32) -> bool {
        match self {
            Value::Vec2(v) => *v = Vec2::new(s, s),
            Value::Vec3(v) => *v = Vec3::splat(s),
            Value::Vec4(v) => *v = Vec4::new(s, s, s, s),
            Value::Color(c) => *c = Color::rgb(s, s, s),
            _ => return false,
        }
        true
    }

    /// Generic single-argument set
    ///
    /// Colours accept a hex number, a CSS string or another colour. Layers
    /// accept a channel number.
    pub fn set_single(&mut self, value: &Value) -> Result<()> {
        let applied = match (&mut *self, value) {
            (Value::Color(c), Value::Number(hex)) => {
                *c = Color::from_hex(*hex as u32);
                true
            }
            (Value::Color(c), Value::Text(style)) => {
                *c = Color::parse(style)?;
                true
            }
            (Value::Color(c), Value::Color(other)) => {
                *c = *other;
                true
            }
            (Value::Layers(l), Value::Number(channel)) => {
                l.set(*channel as u8);
                true
            }
            _ => false,
        };
        if !applied {
            return Err(self.rejected(value, "unsupported argument"));
        }
        Ok(())
    }

    fn rejected(&self, value: &Value, reason: &'static str) -> EngineError {
        EngineError::InvalidValue {
            target: self.kind_name(),
            value: format!("{value:?}"),
            reason,
        }
    }

    /// Mutable access to a named scalar component (`x`, `y`, `r`, ...)
    pub fn component_mut(&mut self, name: &str) -> Option<&mut f32> {
        match (self, name) {
            (Value::Vec2(v), "x") => Some(&mut v.x),
            (Value::Vec2(v), "y") => Some(&mut v.y),
            (Value::Vec3(v), "x") => Some(&mut v.x),
            (Value::Vec3(v), "y") => Some(&mut v.y),
            (Value::Vec3(v), "z") => Some(&mut v.z),
            (Value::Vec4(v), "x") => Some(&mut v.x),
            (Value::Vec4(v), "y") => Some(&mut v.y),
            (Value::Vec4(v), "z") => Some(&mut v.z),
            (Value::Vec4(v), "w") => Some(&mut v.w),
            (Value::Euler(e), "x") => Some(&mut e.x),
            (Value::Euler(e), "y") => Some(&mut e.y),
            (Value::Euler(e), "z") => Some(&mut e.z),
            (Value::Color(c), "r") => Some(&mut c.r),
            (Value::Color(c), "g") => Some(&mut c.g),
            (Value::Color(c), "b") => Some(&mut c.b),
            _ => None,
        }
    }

    /// Read a named scalar component
    pub fn component(&self, name: &str) -> Option<f32> {
        let mut copy = self.clone();
        copy.component_mut(name).map(|c| *c)
    }

    /// JavaScript-style truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|n| n as f32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<Vec3> {
        match self {
            Value::Vec3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_euler(&self) -> Option<Euler> {
        match self {
            Value::Euler(e) => Some(*e),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_layers(&self) -> Option<Layers> {
        match self {
            Value::Layers(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec2> for Value {
    fn from(v: Vec2) -> Self {
        Value::Vec2(v)
    }
}

impl From<Vec3> for Value {
    fn from(v: Vec3) -> Self {
        Value::Vec3(v)
    }
}

impl From<Vec4> for Value {
    fn from(v: Vec4) -> Self {
        Value::Vec4(v)
    }
}

impl From<Euler> for Value {
    fn from(v: Euler) -> Self {
        Value::Euler(v)
    }
}

impl From<Color> for Value {
    fn from(v: Color) -> Self {
        Value::Color(v)
    }
}

impl From<Mat4> for Value {
    fn from(v: Mat4) -> Self {
        Value::Matrix4(v)
    }
}

impl From<Layers> for Value {
    fn from(v: Layers) -> Self {
        Value::Layers(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl From<&ObjectRef> for Value {
    fn from(v: &ObjectRef) -> Self {
        Value::Object(v.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::List(v.iter().map(|n| Value::Number(*n)).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setter_families() {
        assert!(Value::Vec3(Vec3::ZERO).setters().contains(Setters::SCALAR));
        assert!(Value::Color(Color::WHITE).setters().contains(Setters::COLOR));
        assert!(!Value::Layers(Layers::DEFAULT).setters().contains(Setters::COPY));
        assert!(Value::Number(1.0).setters().is_empty());
    }

    #[test]
    fn test_array_and_scalar() {
        let mut v = Value::Vec3(Vec3::ZERO);
        v.set_from_array(&[1.0.into(), 2.0.into(), 3.0.into()]).unwrap();
        assert_eq!(v, Value::Vec3(Vec3::new(1.0, 2.0, 3.0)));

        assert!(v.set_scalar(4.0));
        assert_eq!(v, Value::Vec3(Vec3::splat(4.0)));

        assert!(v.set_from_array(&[1.0.into()]).is_err());
        assert!(v.set_from_array(&["x".into(), 1.0.into(), 2.0.into()]).is_err());
    }

    #[test]
    fn test_color_single_setter() {
        let mut c = Value::Color(Color::WHITE);
        c.set_single(&Value::Number(0xff0000 as f64)).unwrap();
        assert_eq!(c.as_color().map(|c| c.to_hex()), Some(0xff0000));
        c.set_single(&"#00ff00".into()).unwrap();
        assert_eq!(c.as_color().map(|c| c.to_hex()), Some(0x00ff00));
    }

    #[test]
    fn test_layers_mask_and_channel() {
        let mut l = Value::Layers(Layers::DEFAULT);
        assert!(l.copy_mask(&Value::Layers(Layers { mask: 0b110 })));
        assert_eq!(l.as_layers().map(|l| l.mask), Some(0b110));
        l.set_single(&Value::Number(3.0)).unwrap();
        assert_eq!(l.as_layers().map(|l| l.mask), Some(0b1000));
    }

    #[test]
    fn test_components_and_truthiness() {
        let mut v = Value::Vec3(Vec3::new(1.0, 2.0, 3.0));
        if let Some(y) = v.component_mut("y") {
            *y = 9.0;
        }
        assert_eq!(v.component("y"), Some(9.0));
        assert_eq!(v.component("w"), None);

        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
    }
}
