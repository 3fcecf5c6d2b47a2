//! Conversion planning between a source and a target type descriptor.
//!
//! The rules are tried in order:
//!
//! 1. identical types need nothing;
//! 2. value to value converts numerically by the target's primitive kind
//!    (enums by their underlying kind), targets without one are rejected;
//! 3. reference to value unboxes when the source can hold the target, and
//!    reads through the box unless an address is wanted;
//! 4. value or reference to an assignable reference boxes value sources and
//!    leaves reference sources untouched;
//! 5. a downcast, or any conversion involving an interface, is checked when
//!    the procedure runs;
//! 6. anything else is rejected.
//!
//! Value to value conversions never box, and a box is only produced when
//! the target is known to accept the source.

use crs_types::info::{Primitive, TypeDesc};

use crate::EmitError;

// -----------------------------------------------------------------------------
// Conversion

/// How a value of one type is turned into another.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Same type, nothing to do.
    Identity,
    /// Reference upcast, nothing to do.
    Upcast,
    /// Primitive conversion to the given kind.
    Numeric(Primitive),
    /// Unbox to `target`, then read the value out unless `deref` is false.
    Unbox { target: TypeDesc, deref: bool },
    /// Box a `source` value, reading it through its address first when
    /// `load_first` is set.
    Box { source: TypeDesc, load_first: bool },
    /// Runtime-checked reference cast.
    Cast(TypeDesc),
}

/// Decides how to convert `source` into `target`.
///
/// `is_address` tells whether the value on the stack is the address of a
/// `source` rather than the value itself.
pub fn plan(source: &TypeDesc, target: &TypeDesc, is_address: bool) -> Result<Conversion, EmitError> {
    if source == target {
        return Ok(Conversion::Identity);
    }

    if target.is_value_type() {
        if source.is_value_type() {
            return match target.primitive_kind() {
                Some(kind) => Ok(Conversion::Numeric(kind)),
                None => Err(EmitError::UnsupportedConversion {
                    from: source.to_string(),
                    to: target.to_string(),
                }),
            };
        }
        if source.is_assignable_from(target) {
            return Ok(Conversion::Unbox {
                target: target.clone(),
                deref: !is_address,
            });
        }
        return Err(EmitError::incompatible(source, target));
    }

    if target.is_assignable_from(source) {
        if source.is_value_type() {
            return Ok(Conversion::Box {
                source: source.clone(),
                load_first: is_address,
            });
        }
        return Ok(Conversion::Upcast);
    }

    if source.is_assignable_from(target) || target.is_interface() || source.is_interface() {
        return Ok(Conversion::Cast(target.clone()));
    }

    Err(EmitError::incompatible(source, target))
}

// -----------------------------------------------------------------------------
// Tests
