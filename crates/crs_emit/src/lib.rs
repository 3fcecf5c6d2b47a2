#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod block;
mod builder;
mod cache;
mod error;
mod frame;
mod instr;
mod label;
mod lower;
mod operand;
mod procedure;
mod trace;

pub mod coerce;
pub mod intrinsics;

// -----------------------------------------------------------------------------
// Top-Level exports

pub use block::ForHandle;
pub use builder::{ProcedureBuilder, SessionState};
pub use cache::ProcedureCache;
pub use coerce::Conversion;
pub use error::EmitError;
pub use instr::Cmp;
pub use label::Label;
pub use operand::{ArgSlot, Constant, LocalSlot, Operand};
pub use procedure::Procedure;
pub use trace::{EmitOptions, LogSink, MemorySink, TraceLevel, TraceSink};
