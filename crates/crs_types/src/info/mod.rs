//! Type descriptors consumed by the emitter.
//!
//! ## Menu
//!
//! - [`Primitive`]: the twelve primitive kinds, with width and signedness.
//!
//! - [`TypeKind`]: a fast discriminator for a descriptor.
//!     - value kinds: `Primitive`, `Enum`, `Struct`.
//!     - reference kinds: `Object`, `String`, `Class`, `Interface`, `Array`.
//!
//! - [`TypeDesc`]: a cheap, shareable type descriptor. Carries the type path,
//!   base type, implemented interfaces, array element type and declared
//!   fields, and answers [`is_assignable_from`](TypeDesc::is_assignable_from).
//!
//! - [`TypeBuilder`]: builds class, struct, interface and enum descriptors.
//!
//! Built-in descriptors (`object`, `string`, primitives...) are process-wide
//! singletons, see [`TypeDesc::object`] and friends.

// -----------------------------------------------------------------------------
// Modules

mod primitive;
mod type_desc;

// -----------------------------------------------------------------------------
// Exports

pub use primitive::Primitive;
pub use type_desc::{DeclaredField, TypeBuilder, TypeDesc, TypeKind, TypeKindError};
