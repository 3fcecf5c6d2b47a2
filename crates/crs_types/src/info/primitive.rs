use core::fmt;

// -----------------------------------------------------------------------------
// Primitive

/// The primitive value kinds a procedure can convert between directly.
///
/// The order of the variants is irrelevant; width and signedness are queried
/// with [`bits`](Primitive::bits) and [`is_signed`](Primitive::is_signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    /// A UTF-16 code unit.
    Char,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl Primitive {
    /// All primitive kinds.
    pub const ALL: [Primitive; 12] = [
        Self::Bool,
        Self::Char,
        Self::I8,
        Self::U8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::F32,
        Self::F64,
    ];

    /// Returns the type path used for the primitive's descriptor.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Storage width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bool | Self::I8 | Self::U8 => 8,
            Self::Char | Self::I16 | Self::U16 => 16,
            Self::I32 | Self::U32 | Self::F32 => 32,
            Self::I64 | Self::U64 | Self::F64 => 64,
        }
    }

    /// Returns `true` for signed integers and floats.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::F32 | Self::F64
        )
    }

    /// Returns `true` for the eight integer kinds (not `bool` or `char`).
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32 | Self::I64 | Self::U64
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// The kind arithmetic on this primitive is carried out in.
    ///
    /// Narrow integers (and `bool`/`char`) are widened to `i32` on the
    /// evaluation stack, wider kinds keep their own width.
    pub const fn stack_kind(self) -> Primitive {
        match self {
            Self::Bool | Self::Char | Self::I8 | Self::U8 | Self::I16 | Self::U16 => Self::I32,
            other => other,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::Primitive;

    #[test]
    fn widths() {
        assert_eq!(Primitive::I8.bits(), 8);
        assert_eq!(Primitive::Char.bits(), 16);
        assert_eq!(Primitive::F32.bits(), 32);
        assert_eq!(Primitive::U64.bits(), 64);
    }

    #[test]
    fn stack_kinds() {
        assert_eq!(Primitive::U8.stack_kind(), Primitive::I32);
        assert_eq!(Primitive::Bool.stack_kind(), Primitive::I32);
        assert_eq!(Primitive::U32.stack_kind(), Primitive::U32);
        assert_eq!(Primitive::F32.stack_kind(), Primitive::F32);
    }

    #[test]
    fn signedness() {
        assert!(Primitive::I16.is_signed());
        assert!(!Primitive::U16.is_signed());
        assert!(!Primitive::Char.is_integer());
        assert!(Primitive::F64.is_float());
    }
}
