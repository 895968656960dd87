//! The tagged value that crosses the native/managed boundary.

use std::fmt;
use std::hash::{Hash, Hasher};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use ordered_float::OrderedFloat;

use crate::{Color, Dictionary, ObjectId, RawHandle, Transform, Vector2, Vector3, Vector4};

/// Discriminant of a [`Variant`].
///
/// The numeric values are the wire tags exchanged with the engine. `Any` is not
/// a real variant type; it only appears in signatures to accept every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum VariantType {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    String = 4,
    Vector2 = 5,
    Vector3 = 6,
    Vector4 = 7,
    Transform = 8,
    Color = 9,
    Array = 10,
    Dictionary = 11,
    Object = 12,
    Callable = 13,
    Any = 255,
}

impl VariantType {
    /// Human-readable type name.
    pub const fn name(self) -> &'static str {
        match self {
            VariantType::Nil => "Nil",
            VariantType::Bool => "bool",
            VariantType::Int => "int",
            VariantType::Float => "float",
            VariantType::String => "String",
            VariantType::Vector2 => "Vector2",
            VariantType::Vector3 => "Vector3",
            VariantType::Vector4 => "Vector4",
            VariantType::Transform => "Transform",
            VariantType::Color => "Color",
            VariantType::Array => "Array",
            VariantType::Dictionary => "Dictionary",
            VariantType::Object => "Object",
            VariantType::Callable => "Callable",
            VariantType::Any => "Variant",
        }
    }

    /// Whether a parameter declared as `self` accepts a value of type `actual`.
    ///
    /// `Any` accepts everything and an `Object` parameter accepts `Nil` (a null
    /// object reference).
    pub fn accepts(self, actual: VariantType) -> bool {
        self == VariantType::Any
            || self == actual
            || (self == VariantType::Object && actual == VariantType::Nil)
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reference to a method on an object, invocable through the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callable {
    /// Object the method is called on.
    pub target: ObjectId,
    /// Method name.
    pub method: String,
}

impl Callable {
    pub fn new(target: ObjectId, method: impl Into<String>) -> Self {
        Self {
            target,
            method: method.into(),
        }
    }
}

/// A closed tagged union over every value the boundary can carry.
///
/// Equality and hashing treat floats by their total order, so `NaN == NaN`
/// and a value always equals its own round trip through the boundary.
#[derive(Debug, Clone, Default)]
pub enum Variant {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Vector2(Vector2),
    Vector3(Vector3),
    Vector4(Vector4),
    /// Boxed to keep `Variant` small.
    Transform(Box<Transform>),
    Color(Color),
    Array(Vec<Variant>),
    Dictionary(Dictionary),
    Object(RawHandle),
    Callable(Callable),
}

impl Variant {
    /// Get the discriminant of this value.
    pub fn get_type(&self) -> VariantType {
        match self {
            Variant::Nil => VariantType::Nil,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Int(_) => VariantType::Int,
            Variant::Float(_) => VariantType::Float,
            Variant::String(_) => VariantType::String,
            Variant::Vector2(_) => VariantType::Vector2,
            Variant::Vector3(_) => VariantType::Vector3,
            Variant::Vector4(_) => VariantType::Vector4,
            Variant::Transform(_) => VariantType::Transform,
            Variant::Color(_) => VariantType::Color,
            Variant::Array(_) => VariantType::Array,
            Variant::Dictionary(_) => VariantType::Dictionary,
            Variant::Object(_) => VariantType::Object,
            Variant::Callable(_) => VariantType::Callable,
        }
    }

    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        self.get_type().name()
    }

    /// Check if this value is `Nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_transform(&self) -> Option<&Transform> {
        match self {
            Variant::Transform(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Variant::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Get the object handle, if this value references an object.
    pub fn as_object(&self) -> Option<RawHandle> {
        match self {
            Variant::Object(h) => Some(*h),
            _ => None,
        }
    }
}

#[inline]
fn float_eq(a: f64, b: f64) -> bool {
    OrderedFloat(a) == OrderedFloat(b)
}

#[inline]
fn floats_eq(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| OrderedFloat(*x) == OrderedFloat(*y))
}

fn hash_floats<H: Hasher>(values: &[f32], state: &mut H) {
    for v in values {
        OrderedFloat(*v).hash(state);
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Nil, Variant::Nil) => true,
            (Variant::Bool(a), Variant::Bool(b)) => a == b,
            (Variant::Int(a), Variant::Int(b)) => a == b,
            (Variant::Float(a), Variant::Float(b)) => float_eq(*a, *b),
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Vector2(a), Variant::Vector2(b)) => floats_eq(&a.to_array(), &b.to_array()),
            (Variant::Vector3(a), Variant::Vector3(b)) => floats_eq(&a.to_array(), &b.to_array()),
            (Variant::Vector4(a), Variant::Vector4(b)) => floats_eq(&a.to_array(), &b.to_array()),
            (Variant::Transform(a), Variant::Transform(b)) => floats_eq(&a.to_array(), &b.to_array()),
            (Variant::Color(a), Variant::Color(b)) => floats_eq(&a.to_array(), &b.to_array()),
            (Variant::Array(a), Variant::Array(b)) => a == b,
            (Variant::Dictionary(a), Variant::Dictionary(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => a == b,
            (Variant::Callable(a), Variant::Callable(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Variant {}

impl Hash for Variant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get_type().hash(state);
        match self {
            Variant::Nil => {}
            Variant::Bool(v) => v.hash(state),
            Variant::Int(v) => v.hash(state),
            Variant::Float(v) => OrderedFloat(*v).hash(state),
            Variant::String(v) => v.hash(state),
            Variant::Vector2(v) => hash_floats(&v.to_array(), state),
            Variant::Vector3(v) => hash_floats(&v.to_array(), state),
            Variant::Vector4(v) => hash_floats(&v.to_array(), state),
            Variant::Transform(v) => hash_floats(&v.to_array(), state),
            Variant::Color(v) => hash_floats(&v.to_array(), state),
            Variant::Array(v) => v.hash(state),
            Variant::Dictionary(v) => v.hash(state),
            Variant::Object(v) => v.hash(state),
            Variant::Callable(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Nil => f.write_str("null"),
            Variant::Bool(v) => write!(f, "{}", v),
            Variant::Int(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::String(v) => f.write_str(v),
            Variant::Vector2(v) => write!(f, "({}, {})", v.x, v.y),
            Variant::Vector3(v) => write!(f, "({}, {}, {})", v.x, v.y, v.z),
            Variant::Vector4(v) => write!(f, "({}, {}, {}, {})", v.x, v.y, v.z, v.w),
            Variant::Transform(t) => write!(f, "Transform(origin: ({}, {}, {}))", t.origin.x, t.origin.y, t.origin.z),
            Variant::Color(c) => write!(f, "({}, {}, {}, {})", c.r, c.g, c.b, c.a),
            Variant::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Variant::Dictionary(d) => write!(f, "{{{} entries}}", d.len()),
            Variant::Object(h) => write!(f, "<Object#{}>", h.id),
            Variant::Callable(c) => write!(f, "{}::{}", c.target, c.method),
        }
    }
}
