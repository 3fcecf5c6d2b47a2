//! Runtime values flowing through a procedure's evaluation stack.
//!
//! [`Value`] is a closed union of everything a slot can hold: `null`, the
//! twelve primitives, strings, type handles, references (arrays, objects,
//! boxes), unboxed structs and addresses ([`Place`]).
//!
//! Enum values are carried as their underlying primitive; only a box
//! remembers the enum type.

// -----------------------------------------------------------------------------
// Modules

mod object;

// -----------------------------------------------------------------------------
// Exports

pub use object::{ArrayRef, BoxRef, ObjectRef, StructValue};

pub(crate) use object::lock;

use alloc::sync::Arc;
use core::fmt;

use crate::InvokeError;
use crate::info::{Primitive, TypeDesc, TypeKind};

// -----------------------------------------------------------------------------
// Place

/// A storage location whose address was taken.
///
/// Argument and local places are resolved against the frame of the running
/// procedure, element and box places are shared heap cells.
#[derive(Debug, Clone)]
pub enum Place {
    Arg(u32),
    Local(u32),
    Element(ArrayRef, usize),
    Boxed(BoxRef),
}

// -----------------------------------------------------------------------------
// Num

/// A numeric value widened for arithmetic and comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i128),
    Float(f64),
}

impl Num {
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    #[inline]
    pub fn as_i128(self) -> i128 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v as i128,
        }
    }

    /// Compares two numbers, integers exactly and mixed pairs as `f64`.
    pub fn compare(self, other: Num) -> Option<core::cmp::Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

// -----------------------------------------------------------------------------
// Value

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    /// A UTF-16 code unit.
    Char(u16),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(Arc<str>),
    Type(TypeDesc),
    Array(ArrayRef),
    Object(ObjectRef),
    Struct(Box<StructValue>),
    Boxed(BoxRef),
    Address(Place),
}

impl Value {
    /// The default value of a location of type `ty`: zero for primitives and
    /// enums, an all-default instance for structs, `null` otherwise.
    pub fn default_of(ty: &TypeDesc) -> Value {
        match ty.kind() {
            TypeKind::Primitive | TypeKind::Enum => match ty.primitive_kind() {
                Some(p) => Value::zero(p),
                None => Value::Null,
            },
            TypeKind::Struct => Value::Struct(Box::new(StructValue::new(ty.clone()))),
            _ => Value::Null,
        }
    }

    /// The zero value of a primitive kind.
    pub fn zero(kind: Primitive) -> Value {
        Value::from_num(kind, Num::Int(0))
    }

    /// Builds a value of `kind` from a widened number, truncating integers
    /// in two's complement.
    pub fn from_num(kind: Primitive, num: Num) -> Value {
        match kind {
            Primitive::Bool => Value::Bool(num.as_i128() != 0),
            Primitive::Char => Value::Char(num.as_i128() as u16),
            Primitive::I8 => Value::I8(num.as_i128() as i8),
            Primitive::U8 => Value::U8(num.as_i128() as u8),
            Primitive::I16 => Value::I16(num.as_i128() as i16),
            Primitive::U16 => Value::U16(num.as_i128() as u16),
            Primitive::I32 => Value::I32(num.as_i128() as i32),
            Primitive::U32 => Value::U32(num.as_i128() as u32),
            Primitive::I64 => Value::I64(num.as_i128() as i64),
            Primitive::U64 => Value::U64(num.as_i128() as u64),
            Primitive::F32 => Value::F32(num.as_f64() as f32),
            Primitive::F64 => Value::F64(num.as_f64()),
        }
    }

    /// Returns the primitive kind of a primitive value.
    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            Value::Bool(_) => Primitive::Bool,
            Value::Char(_) => Primitive::Char,
            Value::I8(_) => Primitive::I8,
            Value::U8(_) => Primitive::U8,
            Value::I16(_) => Primitive::I16,
            Value::U16(_) => Primitive::U16,
            Value::I32(_) => Primitive::I32,
            Value::U32(_) => Primitive::U32,
            Value::I64(_) => Primitive::I64,
            Value::U64(_) => Primitive::U64,
            Value::F32(_) => Primitive::F32,
            Value::F64(_) => Primitive::F64,
            _ => return None,
        })
    }

    /// Widens a primitive value for arithmetic.
    pub fn to_num(&self) -> Option<Num> {
        Some(match *self {
            Value::Bool(v) => Num::Int(v as i128),
            Value::Char(v) => Num::Int(v as i128),
            Value::I8(v) => Num::Int(v as i128),
            Value::U8(v) => Num::Int(v as i128),
            Value::I16(v) => Num::Int(v as i128),
            Value::U16(v) => Num::Int(v as i128),
            Value::I32(v) => Num::Int(v as i128),
            Value::U32(v) => Num::Int(v as i128),
            Value::I64(v) => Num::Int(v as i128),
            Value::U64(v) => Num::Int(v as i128),
            Value::F32(v) => Num::Float(v as f64),
            Value::F64(v) => Num::Float(v),
            _ => return None,
        })
    }

    /// Converts a primitive value to `kind`.
    ///
    /// Integer narrowing wraps (`300` as `i8` is `44`), float to integer
    /// saturates.
    pub fn convert_to(&self, kind: Primitive) -> Result<Value, InvokeError> {
        match self.to_num() {
            Some(num) => Ok(Value::from_num(kind, num)),
            None => Err(InvokeError::mismatch("primitive value", self)),
        }
    }

    /// Interprets the value as a branch condition.
    pub fn truthy(&self) -> Result<bool, InvokeError> {
        match self {
            Value::Null => Ok(false),
            Value::F32(_) | Value::F64(_) | Value::Struct(_) => {
                Err(InvokeError::mismatch("branch condition", self))
            }
            other => match other.to_num() {
                Some(num) => Ok(num.as_i128() != 0),
                None => Ok(true),
            },
        }
    }

    /// Reads an integer index or length.
    pub fn as_index(&self) -> Result<i64, InvokeError> {
        match self.to_num() {
            Some(Num::Int(v)) => Ok(v as i64),
            _ => Err(InvokeError::mismatch("integer", self)),
        }
    }

    /// Identity comparison: numbers by value, strings by content,
    /// references by address.
    pub fn ref_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Boxed(a), Value::Boxed(b)) => a.ptr_eq(b),
            (Value::Struct(a), Value::Struct(b)) => struct_equals(a, b),
            (a, b) => match (a.to_num(), b.to_num()) {
                (Some(x), Some(y)) => x.compare(y) == Some(core::cmp::Ordering::Equal),
                _ => false,
            },
        }
    }

    /// Structural comparison: like [`ref_equals`](Self::ref_equals), but
    /// boxes compare by type and content.
    pub fn value_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boxed(a), Value::Boxed(b)) => {
                a.ptr_eq(b) || (a.ty() == b.ty() && a.get().value_equals(&b.get()))
            }
            (Value::Boxed(a), b) | (b, Value::Boxed(a)) => a.get().value_equals(b),
            (a, b) => a.ref_equals(b),
        }
    }

    /// Returns `true` if the value is `null`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the exact runtime type of the value, `None` for `null`
    /// and addresses.
    pub fn runtime_type(&self) -> Option<TypeDesc> {
        match self {
            Value::Null | Value::Address(_) => None,
            Value::Str(_) => Some(TypeDesc::string()),
            Value::Type(_) => Some(TypeDesc::type_token()),
            Value::Array(a) => Some(a.ty()),
            Value::Object(o) => Some(o.ty().clone()),
            Value::Struct(s) => Some(s.ty.clone()),
            Value::Boxed(b) => Some(b.ty().clone()),
            other => other.primitive().map(TypeDesc::primitive),
        }
    }

    /// Returns the string slice of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }
}

fn struct_equals(a: &StructValue, b: &StructValue) -> bool {
    a.ty == b.ty
        && a.fields.len() == b.fields.len()
        && a.fields.iter().zip(&b.fields).all(|(x, y)| x.value_equals(y))
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for Value {
            #[inline]
            fn from(value: $t) -> Self {
                Value::$variant(value)
            }
        }
    )*};
}

impl_from! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Arc<str> => Str,
    TypeDesc => Type,
    ArrayRef => Array,
    ObjectRef => Object,
    BoxRef => Boxed,
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Value::Str(Arc::from(value))
    }
}

impl From<StructValue> for Value {
    #[inline]
    fn from(value: StructValue) -> Self {
        Value::Struct(Box::new(value))
    }
}

fn fmt_float(v: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if v.is_infinite() {
        f.write_str(if v > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{v}")
    }
}

/// The textual form produced by `object_to_string`.
///
/// Booleans print as `True`/`False`; references without a textual form
/// print their type path.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Char(c) => {
                let ch = char::from_u32(*c as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                write!(f, "{ch}")
            }
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => fmt_float(*v as f64, f),
            Value::F64(v) => fmt_float(*v, f),
            Value::Str(s) => f.write_str(s),
            Value::Type(t) => f.write_str(t.path()),
            Value::Array(a) => write!(f, "{}[]", a.element_type()),
            Value::Object(o) => f.write_str(o.ty().path()),
            Value::Struct(s) => f.write_str(s.ty.path()),
            Value::Boxed(b) => fmt::Display::fmt(&b.get(), f),
            Value::Address(p) => write!(f, "&{p:?}"),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{Num, Value};
    use crate::info::{Primitive, TypeDesc};
    use crate::value::{ArrayRef, BoxRef};

    #[test]
    fn narrowing_wraps() {
        let v = Value::I32(300).convert_to(Primitive::I8).unwrap();
        assert!(matches!(v, Value::I8(44)));
        let back = v.convert_to(Primitive::I32).unwrap();
        assert!(matches!(back, Value::I32(44)));

        let fits = Value::I64(-5).convert_to(Primitive::I8).unwrap();
        assert!(matches!(fits.convert_to(Primitive::I64).unwrap(), Value::I64(-5)));

        assert!(matches!(Value::I32(-1).convert_to(Primitive::U16).unwrap(), Value::U16(u16::MAX)));
        assert!(Value::from("x").convert_to(Primitive::I32).is_err());
    }

    #[test]
    fn defaults() {
        assert!(matches!(Value::default_of(&TypeDesc::primitive(Primitive::F64)), Value::F64(v) if v == 0.0));
        assert!(Value::default_of(&TypeDesc::string()).is_null());
        let color = TypeDesc::enumeration("demo::Color", Primitive::U8).build();
        assert!(matches!(Value::default_of(&color), Value::U8(0)));
        let point = TypeDesc::structure("demo::Point").build();
        assert!(matches!(Value::default_of(&point), Value::Struct(_)));
    }

    #[test]
    fn display() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::F64(1.5).to_string(), "1.5");
        assert_eq!(Value::F64(2.0).to_string(), "2");
        assert_eq!(Value::Char(b'a' as u16).to_string(), "a");
        assert_eq!(Value::Null.to_string(), "");
        let arr = ArrayRef::new(TypeDesc::primitive(Primitive::I32), 0);
        assert_eq!(Value::Array(arr).to_string(), "i32[]");
        let boxed = BoxRef::new(TypeDesc::primitive(Primitive::I32), Value::I32(5));
        assert_eq!(Value::Boxed(boxed).to_string(), "5");
    }

    #[test]
    fn equality() {
        assert!(Value::I32(3).ref_equals(&Value::I64(3)));
        assert!(Value::from("a").ref_equals(&Value::from("a")));
        assert!(!Value::Null.ref_equals(&Value::I32(0)));

        let ty = TypeDesc::primitive(Primitive::I32);
        let a = Value::Boxed(BoxRef::new(ty.clone(), Value::I32(1)));
        let b = Value::Boxed(BoxRef::new(ty, Value::I32(1)));
        assert!(!a.ref_equals(&b));
        assert!(a.value_equals(&b));
    }

    #[test]
    fn truthiness() {
        assert!(Value::Bool(true).truthy().unwrap());
        assert!(!Value::I32(0).truthy().unwrap());
        assert!(!Value::Null.truthy().unwrap());
        assert!(Value::from("").truthy().unwrap());
        assert!(Value::F64(1.0).truthy().is_err());
    }

    #[test]
    fn num_ordering() {
        use core::cmp::Ordering;
        assert_eq!(Num::Int(1).compare(Num::Int(2)), Some(Ordering::Less));
        assert_eq!(Num::Int(2).compare(Num::Float(1.5)), Some(Ordering::Greater));
    }
}
