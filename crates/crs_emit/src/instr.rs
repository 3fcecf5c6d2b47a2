//! The recorded instruction set and the opcode names used by transcripts.

use core::fmt;

use crs_types::info::{Primitive, TypeDesc, TypeKind};
use crs_types::member::{ConstructorDesc, FieldDesc, MethodDesc};
use crs_types::value::Value;

use crate::{EmitError, Label};

// -----------------------------------------------------------------------------
// Cmp

/// A comparison between the two values on top of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cmp {
    LessThan,
    EqualTo,
    LessThanOrEqualTo,
    GreaterThan,
    NotEqualTo,
    GreaterThanOrEqualTo,
}

impl Cmp {
    /// The comparison that holds exactly when `self` does not.
    pub const fn inverse(self) -> Cmp {
        match self {
            Self::LessThan => Self::GreaterThanOrEqualTo,
            Self::EqualTo => Self::NotEqualTo,
            Self::LessThanOrEqualTo => Self::GreaterThan,
            Self::GreaterThan => Self::LessThanOrEqualTo,
            Self::NotEqualTo => Self::EqualTo,
            Self::GreaterThanOrEqualTo => Self::LessThan,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::LessThan => "LessThan",
            Self::EqualTo => "EqualTo",
            Self::LessThanOrEqualTo => "LessThanOrEqualTo",
            Self::GreaterThan => "GreaterThan",
            Self::NotEqualTo => "NotEqualTo",
            Self::GreaterThanOrEqualTo => "GreaterThanOrEqualTo",
        }
    }
}

impl fmt::Display for Cmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// -----------------------------------------------------------------------------
// Instr

/// One recorded instruction. Branch targets stay symbolic until lowering.
///
/// Stores carry the primitive kind of their destination so the lowered step
/// can truncate the value into it.
#[derive(Debug, Clone)]
pub(crate) enum Instr {
    LdConst(Value),
    Ldarg(u32),
    Starg(u32, Option<Primitive>),
    Ldarga(u32),
    Ldloc(u32),
    Stloc(u32, Option<Primitive>),
    Ldloca(u32),
    Add,
    Sub,
    And,
    Or,
    Not,
    Ceq,
    Br(Label),
    Brtrue(Label),
    Brfalse(Label),
    /// Jumps when `a cmp b` holds, `b` being the top of the stack.
    BranchIf(Cmp, Label),
    Switch(Vec<Label>),
    Dup,
    Pop,
    Conv(Primitive),
    Box(TypeDesc),
    Unbox(TypeDesc),
    Ldobj,
    Stobj(Option<Primitive>),
    Castclass(TypeDesc),
    Initobj(TypeDesc),
    Newobj(ConstructorDesc),
    Call(MethodDesc),
    Newarr(TypeDesc),
    Ldlen,
    Ldelem,
    Ldelema,
    Stelem(Option<Primitive>),
    Ldfld(FieldDesc),
    Stfld(FieldDesc),
    Ldsfld(FieldDesc),
    Stsfld(FieldDesc),
    Throw,
    Ret,
}

// -----------------------------------------------------------------------------
// Opcode names

const fn width_suffix(kind: Primitive) -> &'static str {
    match kind {
        Primitive::Bool | Primitive::I8 => "i1",
        Primitive::U8 => "u1",
        Primitive::Char | Primitive::I16 => "i2",
        Primitive::U16 => "u2",
        Primitive::I32 => "i4",
        Primitive::U32 => "u4",
        Primitive::I64 | Primitive::U64 => "i8",
        Primitive::F32 => "r4",
        Primitive::F64 => "r8",
    }
}

/// The numeric conversion opcode for a target kind, e.g. `conv.u1`.
pub(crate) fn conv_name(kind: Primitive) -> String {
    format!("conv.{}", width_suffix(kind))
}

/// The indirect load line for `ty`: `ldind.*` for primitives, enums and
/// strings, `Ldobj ty` otherwise.
pub(crate) fn ldobj_line(ty: &TypeDesc) -> String {
    if ty.is_string() {
        return "ldind.ref".into();
    }
    match ty.primitive_kind() {
        Some(kind) => format!("ldind.{}", width_suffix(kind)),
        None => format!("Ldobj {ty}"),
    }
}

/// Element opcode suffix for arrays of `ty`: `ref` for references, the
/// width for primitives and enums.
fn element_suffix(ty: &TypeDesc, store: bool) -> Result<&'static str, EmitError> {
    if let Some(kind) = ty.primitive_kind() {
        return Ok(match (store, kind) {
            // stores do not distinguish signedness
            (true, Primitive::U8) => "i1",
            (true, Primitive::U16) => "i2",
            (true, Primitive::U32) => "i4",
            _ => width_suffix(kind),
        });
    }
    match ty.kind() {
        TypeKind::String
        | TypeKind::Object
        | TypeKind::Class
        | TypeKind::Interface
        | TypeKind::Array => Ok("ref"),
        _ => Err(EmitError::UnsupportedElementType(ty.to_string())),
    }
}

pub(crate) fn ldelem_name(ty: &TypeDesc) -> Result<String, EmitError> {
    Ok(format!("ldelem.{}", element_suffix(ty, false)?))
}

pub(crate) fn stelem_name(ty: &TypeDesc) -> Result<String, EmitError> {
    Ok(format!("stelem.{}", element_suffix(ty, true)?))
}

// -----------------------------------------------------------------------------
// Tests
