use alloc::borrow::Cow;
use alloc::sync::Arc;
use core::hash::{Hash, Hasher};
use core::{error, fmt};
use std::sync::LazyLock;

use crs_utils::hash::{HashMap, new_map};

use super::Primitive;

// -----------------------------------------------------------------------------
// TypeKind

/// An enumeration of the "kinds" of a type descriptor.
///
/// `Primitive`, `Enum` and `Struct` are value kinds, everything else is a
/// reference kind. The built-in `value_type`, `enum` and `array` roots are
/// abstract classes and therefore report [`TypeKind::Class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive,
    Enum,
    Struct,
    String,
    Object,
    Class,
    Interface,
    Array,
}

impl TypeKind {
    /// Returns `true` for `Primitive`, `Enum` and `Struct`.
    #[inline]
    pub const fn is_value(self) -> bool {
        matches!(self, Self::Primitive | Self::Enum | Self::Struct)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive => f.pad("Primitive"),
            Self::Enum => f.pad("Enum"),
            Self::Struct => f.pad("Struct"),
            Self::String => f.pad("String"),
            Self::Object => f.pad("Object"),
            Self::Class => f.pad("Class"),
            Self::Interface => f.pad("Interface"),
            Self::Array => f.pad("Array"),
        }
    }
}

/// Error returned when a [`TypeDesc`] is not the expected [`TypeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeKindError {
    pub expected: TypeKind,
    pub received: TypeKind,
}

impl fmt::Display for TypeKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type kind mismatch: expected {}, received {}",
            self.expected, self.received
        )
    }
}

impl error::Error for TypeKindError {}

// -----------------------------------------------------------------------------
// DeclaredField

/// A field declared by a class or struct descriptor.
///
/// The position of a field in [`TypeDesc::fields`] is its storage slot in
/// every instance of the type.
#[derive(Debug, Clone)]
pub struct DeclaredField {
    pub name: Cow<'static, str>,
    pub ty: TypeDesc,
}

// -----------------------------------------------------------------------------
// TypeDesc

struct TypeData {
    path: Cow<'static, str>,
    kind: TypeKind,
    underlying: Option<Primitive>,
    base: Option<TypeDesc>,
    interfaces: Vec<TypeDesc>,
    element: Option<TypeDesc>,
    fields: Vec<DeclaredField>,
    field_index: HashMap<Cow<'static, str>, usize>,
}

/// A shareable descriptor for a type a procedure manipulates.
///
/// Cloning is a reference count increment. Two descriptors are equal when
/// they are the same allocation, or when both path and kind match, so
/// `TypeDesc::array_of(i32)` built twice compares equal.
///
/// # Examples
///
/// ```
/// use crs_types::info::{Primitive, TypeDesc};
///
/// let point = TypeDesc::structure("demo::Point")
///     .field("x", TypeDesc::primitive(Primitive::I32))
///     .field("y", TypeDesc::primitive(Primitive::I32))
///     .build();
///
/// assert!(point.is_value_type());
/// assert_eq!(point.field_index("y"), Some(1));
/// assert!(TypeDesc::object().is_assignable_from(&point));
/// ```
#[derive(Clone)]
pub struct TypeDesc(Arc<TypeData>);

static OBJECT: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::from_data(TypeData::bare("object", TypeKind::Object, None))
});

static VALUE_TYPE: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::from_data(TypeData::bare("value_type", TypeKind::Class, Some(TypeDesc::object())))
});

static ENUM_BASE: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::from_data(TypeData::bare("enum", TypeKind::Class, Some(TypeDesc::value_type())))
});

static ARRAY_BASE: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::from_data(TypeData::bare("array", TypeKind::Class, Some(TypeDesc::object())))
});

static STRING: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::from_data(TypeData::bare("string", TypeKind::String, Some(TypeDesc::object())))
});

static TYPE_TOKEN: LazyLock<TypeDesc> = LazyLock::new(|| {
    TypeDesc::from_data(TypeData::bare("type", TypeKind::Class, Some(TypeDesc::object())))
});

static PRIMITIVES: LazyLock<[TypeDesc; 12]> = LazyLock::new(|| {
    Primitive::ALL.map(|p| {
        let mut data = TypeData::bare(p.name(), TypeKind::Primitive, Some(TypeDesc::value_type()));
        data.underlying = Some(p);
        TypeDesc::from_data(data)
    })
});

impl TypeData {
    fn bare(path: impl Into<Cow<'static, str>>, kind: TypeKind, base: Option<TypeDesc>) -> Self {
        Self {
            path: path.into(),
            kind,
            underlying: None,
            base,
            interfaces: Vec::new(),
            element: None,
            fields: Vec::new(),
            field_index: new_map(),
        }
    }
}

macro_rules! impl_builtin {
    ($name:ident => $slot:ident, $doc:literal) => {
        #[doc = $doc]
        #[inline]
        pub fn $name() -> TypeDesc {
            TypeDesc::clone(&$slot)
        }
    };
}

impl TypeDesc {
    #[inline]
    fn from_data(data: TypeData) -> Self {
        Self(Arc::new(data))
    }

    impl_builtin!(object => OBJECT, "The root of every type.");
    impl_builtin!(value_type => VALUE_TYPE, "The abstract base of every value type.");
    impl_builtin!(enum_base => ENUM_BASE, "The abstract base of every enum.");
    impl_builtin!(array_base => ARRAY_BASE, "The untyped base of every array.");
    impl_builtin!(string => STRING, "The immutable string type.");
    impl_builtin!(type_token => TYPE_TOKEN, "The runtime type handle type.");

    /// Returns the descriptor of a primitive kind.
    #[inline]
    pub fn primitive(kind: Primitive) -> TypeDesc {
        TypeDesc::clone(&PRIMITIVES[kind as usize])
    }

    /// Returns the descriptor of a one-dimensional array of `element`.
    pub fn array_of(element: TypeDesc) -> TypeDesc {
        let path = format!("{}[]", element.path());
        let mut data = TypeData::bare(path, TypeKind::Array, Some(TypeDesc::array_base()));
        data.element = Some(element);
        Self::from_data(data)
    }

    /// Starts building a class descriptor. The base defaults to `object`.
    pub fn class(path: impl Into<Cow<'static, str>>) -> TypeBuilder {
        TypeBuilder::new(path.into(), TypeKind::Class, None, Some(TypeDesc::object()))
    }

    /// Starts building a struct descriptor. The base is always `value_type`.
    pub fn structure(path: impl Into<Cow<'static, str>>) -> TypeBuilder {
        TypeBuilder::new(path.into(), TypeKind::Struct, None, Some(TypeDesc::value_type()))
    }

    /// Starts building an interface descriptor.
    pub fn interface(path: impl Into<Cow<'static, str>>) -> TypeBuilder {
        TypeBuilder::new(path.into(), TypeKind::Interface, None, None)
    }

    /// Starts building an enum descriptor stored as `underlying`.
    pub fn enumeration(path: impl Into<Cow<'static, str>>, underlying: Primitive) -> TypeBuilder {
        TypeBuilder::new(
            path.into(),
            TypeKind::Enum,
            Some(underlying),
            Some(TypeDesc::enum_base()),
        )
    }

    // -------------------------------------------------------------------------
    // Queries

    /// Returns the full type path, e.g. `"demo::Point"` or `"i32[]"`.
    #[inline]
    pub fn path(&self) -> &str {
        &self.0.path
    }

    /// Returns the [`TypeKind`] of the descriptor (a fast discriminator).
    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    #[inline]
    pub fn is_value_type(&self) -> bool {
        self.0.kind.is_value()
    }

    #[inline]
    pub fn is_reference_type(&self) -> bool {
        !self.0.kind.is_value()
    }

    #[inline]
    pub fn is_struct(&self) -> bool {
        self.0.kind == TypeKind::Struct
    }

    #[inline]
    pub fn is_enum(&self) -> bool {
        self.0.kind == TypeKind::Enum
    }

    #[inline]
    pub fn is_interface(&self) -> bool {
        self.0.kind == TypeKind::Interface
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.0.kind == TypeKind::Array
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        self.0.kind == TypeKind::String
    }

    /// Returns the direct base type, `None` for `object` and interfaces.
    #[inline]
    pub fn base(&self) -> Option<&TypeDesc> {
        self.0.base.as_ref()
    }

    /// Returns the directly implemented (or, for interfaces, extended) interfaces.
    #[inline]
    pub fn interfaces(&self) -> &[TypeDesc] {
        &self.0.interfaces
    }

    /// Returns the element type of an array descriptor.
    pub fn element(&self) -> Result<&TypeDesc, TypeKindError> {
        self.0.element.as_ref().ok_or(TypeKindError {
            expected: TypeKind::Array,
            received: self.0.kind,
        })
    }

    /// Returns the primitive kind of a primitive descriptor.
    pub fn as_primitive(&self) -> Result<Primitive, TypeKindError> {
        match self.0.kind {
            TypeKind::Primitive => self.0.underlying.ok_or(TypeKindError {
                expected: TypeKind::Primitive,
                received: self.0.kind,
            }),
            received => Err(TypeKindError {
                expected: TypeKind::Primitive,
                received,
            }),
        }
    }

    /// Returns the underlying storage kind of an enum descriptor.
    pub fn as_enum(&self) -> Result<Primitive, TypeKindError> {
        match self.0.kind {
            TypeKind::Enum => self.0.underlying.ok_or(TypeKindError {
                expected: TypeKind::Enum,
                received: self.0.kind,
            }),
            received => Err(TypeKindError {
                expected: TypeKind::Enum,
                received,
            }),
        }
    }

    /// Returns the primitive a value of this type is stored as.
    ///
    /// Primitives map to themselves and enums to their underlying kind;
    /// every other type has no primitive mapping.
    #[inline]
    pub fn primitive_kind(&self) -> Option<Primitive> {
        self.0.underlying
    }

    /// Returns the declared fields, inherited ones first.
    #[inline]
    pub fn fields(&self) -> &[DeclaredField] {
        &self.0.fields
    }

    /// Returns the storage slot of the field named `name`.
    #[inline]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.0.field_index.get(name).copied()
    }

    /// Iterates over this type and its base chain, most derived first.
    pub fn ancestors(&self) -> impl Iterator<Item = &TypeDesc> {
        core::iter::successors(Some(self), |ty| ty.base())
    }

    /// Returns `true` when this type (or one of its bases) implements
    /// `interface`, directly or through interface inheritance.
    pub fn implements(&self, interface: &TypeDesc) -> bool {
        fn search(list: &[TypeDesc], target: &TypeDesc) -> bool {
            list.iter()
                .any(|it| it == target || search(it.interfaces(), target))
        }

        self.ancestors().any(|ty| search(ty.interfaces(), interface))
    }

    /// Returns `true` when a value of type `other` can be stored in a
    /// location of this type without an explicit conversion.
    ///
    /// Value types are assignable to their reference bases (`value_type`,
    /// `enum`, `object`) through boxing. Arrays of reference elements are
    /// covariant.
    pub fn is_assignable_from(&self, other: &TypeDesc) -> bool {
        if self == other || other.ancestors().any(|ty| ty == self) {
            return true;
        }

        match self.kind() {
            TypeKind::Object => true,
            TypeKind::Interface => other.implements(self),
            TypeKind::Array => match (self.element(), other.element()) {
                (Ok(to), Ok(from)) => {
                    to == from
                        || (to.is_reference_type()
                            && from.is_reference_type()
                            && to.is_assignable_from(from))
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl PartialEq for TypeDesc {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || (self.0.kind == other.0.kind && self.0.path == other.0.path)
    }
}

impl Eq for TypeDesc {}

impl Hash for TypeDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.path.hash(state);
    }
}

impl fmt::Debug for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeDesc").field(&self.path()).finish()
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.path())
    }
}

// -----------------------------------------------------------------------------
// TypeBuilder

/// Builder returned by [`TypeDesc::class`], [`TypeDesc::structure`],
/// [`TypeDesc::interface`] and [`TypeDesc::enumeration`].
#[must_use]
pub struct TypeBuilder {
    path: Cow<'static, str>,
    kind: TypeKind,
    underlying: Option<Primitive>,
    base: Option<TypeDesc>,
    interfaces: Vec<TypeDesc>,
    fields: Vec<DeclaredField>,
}

impl TypeBuilder {
    fn new(
        path: Cow<'static, str>,
        kind: TypeKind,
        underlying: Option<Primitive>,
        base: Option<TypeDesc>,
    ) -> Self {
        Self {
            path,
            kind,
            underlying,
            base,
            interfaces: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Sets the base class. Only meaningful for classes; struct, enum and
    /// interface descriptors keep their fixed base.
    pub fn base(mut self, base: TypeDesc) -> Self {
        if self.kind == TypeKind::Class {
            self.base = Some(base);
        }
        self
    }

    /// Adds an implemented interface.
    pub fn implements(mut self, interface: TypeDesc) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Declares a field. Its slot follows every inherited field.
    pub fn field(mut self, name: impl Into<Cow<'static, str>>, ty: TypeDesc) -> Self {
        self.fields.push(DeclaredField {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn build(self) -> TypeDesc {
        let mut data = TypeData::bare(self.path, self.kind, self.base);
        data.underlying = self.underlying;
        data.interfaces = self.interfaces;

        let inherited = match &data.base {
            Some(base) if self.kind == TypeKind::Class => base.fields().to_vec(),
            _ => Vec::new(),
        };

        data.fields = inherited;
        data.fields.extend(self.fields);
        for (index, field) in data.fields.iter().enumerate() {
            data.field_index.insert(field.name.clone(), index);
        }

        TypeDesc::from_data(data)
    }
}

// -----------------------------------------------------------------------------
// Tests
