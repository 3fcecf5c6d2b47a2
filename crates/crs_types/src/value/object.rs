use alloc::sync::Arc;
use core::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::InvokeError;
use crate::info::TypeDesc;

use super::Value;

// -----------------------------------------------------------------------------
// Lock helper

// A panicking host accessor must not make the instance unreadable.
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
fn check_index(index: i64, len: usize) -> Result<usize, InvokeError> {
    match usize::try_from(index) {
        Ok(i) if i < len => Ok(i),
        _ => Err(InvokeError::IndexOutOfRange { index, len }),
    }
}

// -----------------------------------------------------------------------------
// ObjectRef

struct ObjectData {
    ty: TypeDesc,
    fields: Mutex<Vec<Value>>,
}

/// A shared reference to a heap object of a class type.
///
/// Field slots follow [`TypeDesc::fields`]. Cloning shares the instance.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectData>);

impl ObjectRef {
    /// Creates an instance of `ty` with every field at its default value.
    pub fn new(ty: TypeDesc) -> Self {
        let fields = ty.fields().iter().map(|f| Value::default_of(&f.ty)).collect();
        Self(Arc::new(ObjectData {
            ty,
            fields: Mutex::new(fields),
        }))
    }

    #[inline]
    pub fn ty(&self) -> &TypeDesc {
        &self.0.ty
    }

    /// Reads the field stored in `slot`.
    pub fn field(&self, slot: usize) -> Result<Value, InvokeError> {
        let fields = lock(&self.0.fields);
        fields
            .get(slot)
            .cloned()
            .ok_or(InvokeError::IndexOutOfRange {
                index: slot as i64,
                len: fields.len(),
            })
    }

    /// Writes the field stored in `slot`.
    pub fn set_field(&self, slot: usize, value: Value) -> Result<(), InvokeError> {
        let mut fields = lock(&self.0.fields);
        let len = fields.len();
        match fields.get_mut(slot) {
            Some(place) => {
                *place = value;
                Ok(())
            }
            None => Err(InvokeError::IndexOutOfRange {
                index: slot as i64,
                len,
            }),
        }
    }

    /// Reads a field by its declared name.
    pub fn get(&self, name: &str) -> Option<Value> {
        let slot = self.0.ty.field_index(name)?;
        lock(&self.0.fields).get(slot).cloned()
    }

    /// Writes a field by its declared name, returns `false` if no such field exists.
    pub fn set(&self, name: &str, value: Value) -> bool {
        match self.0.ty.field_index(name) {
            Some(slot) => self.set_field(slot, value).is_ok(),
            None => false,
        }
    }

    /// Returns a snapshot of every field value.
    pub fn fields(&self) -> Vec<Value> {
        lock(&self.0.fields).clone()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({} @ {:p})", self.0.ty, Arc::as_ptr(&self.0))
    }
}

// -----------------------------------------------------------------------------
// ArrayRef

struct ArrayData {
    element: TypeDesc,
    items: Mutex<Vec<Value>>,
}

/// A shared reference to a one-dimensional, fixed-length array.
#[derive(Clone)]
pub struct ArrayRef(Arc<ArrayData>);

impl ArrayRef {
    /// Creates an array of `len` default elements.
    pub fn new(element: TypeDesc, len: usize) -> Self {
        let items = (0..len).map(|_| Value::default_of(&element)).collect();
        Self::from_values(element, items)
    }

    /// Wraps existing values; the caller guarantees they match `element`.
    pub fn from_values(element: TypeDesc, items: Vec<Value>) -> Self {
        Self(Arc::new(ArrayData {
            element,
            items: Mutex::new(items),
        }))
    }

    #[inline]
    pub fn element_type(&self) -> &TypeDesc {
        &self.0.element
    }

    /// Returns the descriptor of the array itself.
    pub fn ty(&self) -> TypeDesc {
        TypeDesc::array_of(self.0.element.clone())
    }

    pub fn len(&self) -> usize {
        lock(&self.0.items).len()
    }

    pub fn get(&self, index: i64) -> Result<Value, InvokeError> {
        let items = lock(&self.0.items);
        let i = check_index(index, items.len())?;
        Ok(items[i].clone())
    }

    pub fn set(&self, index: i64, value: Value) -> Result<(), InvokeError> {
        let mut items = lock(&self.0.items);
        let i = check_index(index, items.len())?;
        items[i] = value;
        Ok(())
    }

    /// Returns a snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Value> {
        lock(&self.0.items).clone()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayRef({}[{}])", self.0.element, self.len())
    }
}

// -----------------------------------------------------------------------------
// BoxRef

struct BoxData {
    ty: TypeDesc,
    value: Mutex<Value>,
}

/// A boxed value type: a heap cell that remembers the exact value type it holds.
#[derive(Clone)]
pub struct BoxRef(Arc<BoxData>);

impl BoxRef {
    pub fn new(ty: TypeDesc, value: Value) -> Self {
        Self(Arc::new(BoxData {
            ty,
            value: Mutex::new(value),
        }))
    }

    /// The value type stored in the box.
    #[inline]
    pub fn ty(&self) -> &TypeDesc {
        &self.0.ty
    }

    pub fn get(&self) -> Value {
        lock(&self.0.value).clone()
    }

    pub fn set(&self, value: Value) {
        *lock(&self.0.value) = value;
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BoxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxRef({}: {:?})", self.0.ty, self.get())
    }
}

// -----------------------------------------------------------------------------
// StructValue

/// An unboxed instance of a struct type. Copies are independent.
#[derive(Debug, Clone)]
pub struct StructValue {
    pub ty: TypeDesc,
    pub fields: Vec<Value>,
}

impl StructValue {
    /// Creates an instance with every field at its default value.
    pub fn new(ty: TypeDesc) -> Self {
        let fields = ty.fields().iter().map(|f| Value::default_of(&f.ty)).collect();
        Self { ty, fields }
    }

    /// Reads a field by its declared name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(self.ty.field_index(name)?)
    }

    /// Writes a field by its declared name, returns `false` if no such field exists.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.ty.field_index(name).and_then(|i| self.fields.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{ArrayRef, BoxRef, ObjectRef, StructValue};
    use crate::InvokeError;
    use crate::info::{Primitive, TypeDesc};
    use crate::value::Value;

    fn i32_ty() -> TypeDesc {
        TypeDesc::primitive(Primitive::I32)
    }

    #[test]
    fn object_fields_default_and_update() {
        let ty = TypeDesc::class("demo::SampleDto")
            .field("Name", TypeDesc::string())
            .field("Count", i32_ty())
            .build();
        let obj = ObjectRef::new(ty);

        assert!(matches!(obj.get("Name"), Some(Value::Null)));
        assert!(matches!(obj.get("Count"), Some(Value::I32(0))));

        assert!(obj.set("Count", Value::I32(7)));
        assert!(!obj.set("Missing", Value::Null));
        assert!(matches!(obj.field(1), Ok(Value::I32(7))));

        let alias = obj.clone();
        alias.set_field(0, Value::from("x")).unwrap();
        assert!(obj.ptr_eq(&alias));
        assert_eq!(obj.get("Name").unwrap().to_string(), "x");
    }

    #[test]
    fn array_bounds() {
        let arr = ArrayRef::new(i32_ty(), 2);
        assert_eq!(arr.len(), 2);
        assert!(matches!(arr.get(1), Ok(Value::I32(0))));
        arr.set(0, Value::I32(4)).unwrap();
        assert!(matches!(arr.get(0), Ok(Value::I32(4))));

        assert_eq!(
            arr.get(2).unwrap_err(),
            InvokeError::IndexOutOfRange { index: 2, len: 2 }
        );
        assert!(arr.set(-1, Value::I32(1)).is_err());
        assert_eq!(arr.ty().path(), "i32[]");
    }

    #[test]
    fn boxes_share_their_cell() {
        let b = BoxRef::new(i32_ty(), Value::I32(1));
        let c = b.clone();
        c.set(Value::I32(2));
        assert!(matches!(b.get(), Value::I32(2)));
        assert_eq!(b.ty(), &i32_ty());
    }

    #[test]
    fn struct_copies_are_independent() {
        let point = TypeDesc::structure("demo::Point")
            .field("x", i32_ty())
            .build();
        let mut a = StructValue::new(point);
        let b = a.clone();
        assert!(a.set("x", Value::I32(3)));
        assert!(matches!(a.get("x"), Some(Value::I32(3))));
        assert!(matches!(b.get("x"), Some(Value::I32(0))));
    }
}
