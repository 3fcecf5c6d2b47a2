#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod error;

pub mod info;
pub mod member;
pub mod serde;
pub mod value;

// -----------------------------------------------------------------------------
// Top-Level exports

pub use error::InvokeError;
pub use info::{Primitive, TypeDesc, TypeKind};
pub use member::{ConstructorDesc, FieldDesc, FieldStorage, HostFn, MemberDesc, MethodDesc};
pub use member::{PropertyDesc, Signature};
pub use value::{ArrayRef, BoxRef, ObjectRef, Place, StructValue, Value};
