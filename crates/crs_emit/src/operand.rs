//! The values emission calls consume: constants, argument slots and local slots.

use alloc::sync::Arc;

use crs_types::info::{Primitive, TypeDesc};

// -----------------------------------------------------------------------------
// Slots

/// An argument of the procedure being built, see [`arg`].
///
/// [`arg`]: crate::ProcedureBuilder::arg
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSlot {
    pub(crate) index: u32,
    pub(crate) ty: TypeDesc,
}

impl ArgSlot {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn ty(&self) -> &TypeDesc {
        &self.ty
    }
}

/// A local declared with [`declare_local`].
///
/// [`declare_local`]: crate::ProcedureBuilder::declare_local
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlot {
    pub(crate) index: u32,
    pub(crate) ty: TypeDesc,
}

impl LocalSlot {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn ty(&self) -> &TypeDesc {
        &self.ty
    }
}

// -----------------------------------------------------------------------------
// Constant

/// A literal the emitter can load directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    /// Rejected by the loader, characters are not a schema primitive.
    Char(char),
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
    /// An enum member given by its raw underlying value.
    Enum(TypeDesc, i64),
    /// A runtime type handle.
    Type(TypeDesc),
}

impl Constant {
    /// The declared type of the literal; `null` is typed as `object`.
    pub fn ty(&self) -> TypeDesc {
        let prim = match self {
            Self::Null => return TypeDesc::object(),
            Self::Str(_) => return TypeDesc::string(),
            Self::Enum(ty, _) => return ty.clone(),
            Self::Type(_) => return TypeDesc::type_token(),
            Self::Bool(_) => Primitive::Bool,
            Self::Char(_) => Primitive::Char,
            Self::I8(_) => Primitive::I8,
            Self::U8(_) => Primitive::U8,
            Self::I16(_) => Primitive::I16,
            Self::U16(_) => Primitive::U16,
            Self::I32(_) => Primitive::I32,
            Self::U32(_) => Primitive::U32,
            Self::I64(_) => Primitive::I64,
            Self::U64(_) => Primitive::U64,
            Self::F32(_) => Primitive::F32,
            Self::F64(_) => Primitive::F64,
        };
        TypeDesc::primitive(prim)
    }

    /// Rebuilds an enum's raw value as a constant of its underlying kind.
    pub(crate) fn from_raw(kind: Primitive, raw: i64) -> Self {
        match kind {
            Primitive::Bool => Self::Bool(raw != 0),
            Primitive::Char => Self::Char(char::from_u32(raw as u32).unwrap_or('\0')),
            Primitive::I8 => Self::I8(raw as i8),
            Primitive::U8 => Self::U8(raw as u8),
            Primitive::I16 => Self::I16(raw as i16),
            Primitive::U16 => Self::U16(raw as u16),
            Primitive::I32 => Self::I32(raw as i32),
            Primitive::U32 => Self::U32(raw as u32),
            Primitive::I64 => Self::I64(raw),
            Primitive::U64 => Self::U64(raw as u64),
            Primitive::F32 => Self::F32(raw as f32),
            Primitive::F64 => Self::F64(raw as f64),
        }
    }
}

// -----------------------------------------------------------------------------
// Operand

/// A typed reference to a constant, an argument slot or a local slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Constant(Constant),
    Argument(ArgSlot),
    Local(LocalSlot),
}

impl Operand {
    /// The declared type of the operand.
    pub fn ty(&self) -> TypeDesc {
        match self {
            Self::Constant(c) => c.ty(),
            Self::Argument(a) => a.ty.clone(),
            Self::Local(l) => l.ty.clone(),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Constant(Constant::Null))
    }
}

impl From<Constant> for Operand {
    #[inline]
    fn from(value: Constant) -> Self {
        Self::Constant(value)
    }
}

impl From<ArgSlot> for Operand {
    #[inline]
    fn from(value: ArgSlot) -> Self {
        Self::Argument(value)
    }
}

impl From<&ArgSlot> for Operand {
    #[inline]
    fn from(value: &ArgSlot) -> Self {
        Self::Argument(value.clone())
    }
}

impl From<LocalSlot> for Operand {
    #[inline]
    fn from(value: LocalSlot) -> Self {
        Self::Local(value)
    }
}

impl From<&LocalSlot> for Operand {
    #[inline]
    fn from(value: &LocalSlot) -> Self {
        Self::Local(value.clone())
    }
}

impl From<&Operand> for Operand {
    #[inline]
    fn from(value: &Operand) -> Self {
        value.clone()
    }
}

macro_rules! impl_constant_from {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for Constant {
            #[inline]
            fn from(value: $t) -> Self {
                Constant::$variant(value)
            }
        }

        impl From<$t> for Operand {
            #[inline]
            fn from(value: $t) -> Self {
                Operand::Constant(Constant::$variant(value))
            }
        }
    )*};
}

impl_constant_from! {
    bool => Bool,
    char => Char,
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
}

impl From<&str> for Constant {
    #[inline]
    fn from(value: &str) -> Self {
        Constant::Str(Arc::from(value))
    }
}

impl From<&str> for Operand {
    #[inline]
    fn from(value: &str) -> Self {
        Operand::Constant(Constant::Str(Arc::from(value)))
    }
}

impl From<TypeDesc> for Operand {
    #[inline]
    fn from(value: TypeDesc) -> Self {
        Operand::Constant(Constant::Type(value))
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{Constant, Operand};
    use crs_types::info::{Primitive, TypeDesc};

    #[test]
    fn constant_types() {
        assert_eq!(Operand::from(3_i32).ty(), TypeDesc::primitive(Primitive::I32));
        assert_eq!(Operand::from("x").ty(), TypeDesc::string());
        assert_eq!(Constant::Null.ty(), TypeDesc::object());
        assert!(Operand::Constant(Constant::Null).is_null());

        let color = TypeDesc::enumeration("demo::Color", Primitive::U8).build();
        assert_eq!(Constant::Enum(color.clone(), 2).ty(), color);
        assert_eq!(Operand::from(color).ty(), TypeDesc::type_token());
    }

    #[test]
    fn raw_enum_values_follow_the_underlying_kind() {
        assert_eq!(Constant::from_raw(Primitive::U8, 258), Constant::U8(2));
        assert_eq!(Constant::from_raw(Primitive::I64, -1), Constant::I64(-1));
    }
}
