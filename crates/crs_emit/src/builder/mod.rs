//! The procedure builder: one build session per procedure.
//!
//! A session starts with [`ProcedureBuilder::begin_method`], records
//! emission calls and ends with [`ProcedureBuilder::end_method`], which
//! checks the structure and lowers the recording into a [`Procedure`].
//!
//! Every emission call returns a `Result`. The first error aborts the
//! session; from then on every call fails with
//! [`EmitError::SessionAborted`] and no procedure can be produced. Calls
//! after a successful `end_method` fail with [`EmitError::UseAfterFinalize`].
//!
//! ```
//! use crs_emit::{Cmp, EmitOptions, ProcedureBuilder};
//! use crs_types::{Primitive, Signature, TypeDesc, Value};
//!
//! let i32_ty = TypeDesc::primitive(Primitive::I32);
//! let signature = Signature::new(vec![i32_ty.clone()], Some(i32_ty.clone()));
//! let mut b = ProcedureBuilder::begin_method("abs", signature, EmitOptions::default());
//!
//! let x = b.arg(0).unwrap();
//! b.if_compare(&x, Cmp::LessThan, 0_i32).unwrap();
//! b.ldc(0_i32).unwrap();
//! b.load(&x).unwrap();
//! b.subtract().unwrap();
//! b.store(&x).unwrap();
//! b.end_if().unwrap();
//! b.load(&x).unwrap();
//! b.ret().unwrap();
//!
//! let abs = b.end_method().unwrap();
//! assert!(matches!(abs.invoke(&[Value::I32(-7)]), Ok(Value::I32(7))));
//! ```

// Transcript helpers. Formatting only happens while tracing.

macro_rules! instruction {
    ($s:expr, $($fmt:tt)+) => {
        if $s.tracing() {
            let line = format!("    {}", format_args!($($fmt)+));
            $s.source_line(line);
        }
    };
}

macro_rules! label_line {
    ($s:expr, $($fmt:tt)+) => {
        if $s.tracing() {
            let line = format!($($fmt)+);
            $s.source_line(line);
        }
    };
}

macro_rules! comment {
    ($s:expr, $($fmt:tt)+) => {
        instruction!($s, "// {}", format_args!($($fmt)+))
    };
}

mod flow;
mod session;
mod strings;

use crs_types::info::TypeDesc;
use crs_types::member::{ConstructorDesc, MemberDesc, MethodDesc, Signature};

use crate::block::ForHandle;
use crate::instr::Cmp;
use crate::operand::{ArgSlot, Constant, LocalSlot, Operand};
use crate::{EmitError, EmitOptions, Label, Procedure};

use session::Session;

// -----------------------------------------------------------------------------
// SessionState

/// Where a builder is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Building,
    /// An emission call failed, the session can no longer produce a
    /// procedure.
    Aborted,
    /// `end_method` succeeded.
    Finalized,
}

enum State {
    Building(Box<Session>),
    Aborted,
    Finalized,
}

// -----------------------------------------------------------------------------
// ProcedureBuilder

/// Builds one procedure. See the [module documentation](self).
pub struct ProcedureBuilder {
    state: State,
}

/// Forwards an emission call to the open session.
macro_rules! forward {
    ($( $(#[$meta:meta])* fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?; )*) => {$(
        $(#[$meta])*
        pub fn $name(&mut self $(, $arg: $ty)*) -> Result<forward!(@ret $($ret)?), EmitError> {
            self.emit(move |s| s.$name($($arg),*))
        }
    )*};
    (@ret) => { () };
    (@ret $ret:ty) => { $ret };
}

impl ProcedureBuilder {
    /// Opens a session for a procedure called `name`.
    pub fn begin_method(name: &str, signature: Signature, options: EmitOptions) -> Self {
        Self {
            state: State::Building(Box::new(Session::new(name, signature, &options))),
        }
    }

    /// Checks the structure, resolves labels and produces the procedure.
    ///
    /// Fails with [`EmitError::UnclosedBlock`] while any block is open and
    /// with [`EmitError::LabelNotMarked`] when a branch targets a label that
    /// was never marked.
    pub fn end_method(&mut self) -> Result<Procedure, EmitError> {
        let procedure = self.emit(Session::end_method)?;
        self.state = State::Finalized;
        Ok(procedure)
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Building(_) => SessionState::Building,
            State::Aborted => SessionState::Aborted,
            State::Finalized => SessionState::Finalized,
        }
    }

    /// Name of the procedure being built.
    pub fn current_method(&self) -> Result<&str, EmitError> {
        Ok(&self.session()?.name)
    }

    pub fn signature(&self) -> Result<&Signature, EmitError> {
        Ok(&self.session()?.signature)
    }

    fn session(&self) -> Result<&Session, EmitError> {
        match &self.state {
            State::Building(session) => Ok(session),
            State::Aborted => Err(EmitError::SessionAborted),
            State::Finalized => Err(EmitError::UseAfterFinalize),
        }
    }

    /// Runs `f` on the open session, aborting it if `f` fails.
    fn emit<T>(&mut self, f: impl FnOnce(&mut Session) -> Result<T, EmitError>) -> Result<T, EmitError> {
        let session = match &mut self.state {
            State::Building(session) => session,
            State::Aborted => return Err(EmitError::SessionAborted),
            State::Finalized => return Err(EmitError::UseAfterFinalize),
        };
        match f(session) {
            Ok(value) => Ok(value),
            Err(err) => {
                log::warn!("aborting procedure `{}`: {err}", session.name);
                self.state = State::Aborted;
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Slots

    forward! {
        /// The argument at `index`, fails with [`EmitError::UnknownArgument`]
        /// past the end of the signature.
        fn arg(index: u32) -> ArgSlot;
        fn declare_local(ty: &TypeDesc, name: &str) -> LocalSlot;
        /// Declares a local and stores `init` into it.
        fn declare_local_with(ty: &TypeDesc, name: &str, init: impl Into<Operand>) -> LocalSlot;
        /// Stores `value` into `local`, converting it to the local's type.
        fn set(local: &LocalSlot, value: impl Into<Operand>);
    }

    // -------------------------------------------------------------------------
    // Loads and stores

    forward! {
        fn load(op: impl Into<Operand>);
        /// Pops into an argument or local. Constants are not a store target.
        fn store(op: impl Into<Operand>);
        /// Pushes the address of a value-typed argument or local. Anything
        /// else is loaded as is.
        fn load_address(op: impl Into<Operand>);
        fn inc(op: impl Into<Operand>);
        fn dec(op: impl Into<Operand>);
        fn ldc(constant: impl Into<Constant>);
        fn ldstr(s: &str);
        fn ldnull();
        fn ldarg(arg: &ArgSlot);
        fn starg(arg: &ArgSlot);
        fn ldarga(arg: &ArgSlot);
        fn ldloc(local: &LocalSlot);
        fn stloc(local: &LocalSlot);
        fn ldloca(local: &LocalSlot);
        fn ldtoken(ty: &TypeDesc);
        fn load_default_value(ty: &TypeDesc);
    }

    // -------------------------------------------------------------------------
    // Arithmetic, labels and the stack

    forward! {
        fn add();
        fn subtract();
        fn and();
        fn or();
        fn not();
        fn ceq();
        fn define_label() -> Label;
        fn mark_label(label: Label);
        fn br(label: Label);
        fn brtrue(label: Label);
        fn brfalse(label: Label);
        fn blt(label: Label);
        fn bgt(label: Label);
        fn ble(label: Label);
        fn dup();
        fn pop();
        fn ignore_return_value();
        fn throw();
        fn ret();
    }

    // -------------------------------------------------------------------------
    // Objects and calls

    forward! {
        fn box_value(ty: &TypeDesc);
        fn unbox(ty: &TypeDesc);
        fn ldobj(ty: &TypeDesc);
        fn stobj(ty: &TypeDesc);
        fn castclass(ty: &TypeDesc);
        fn init_obj(ty: &TypeDesc);
        fn convert_value(source: &TypeDesc, target: &TypeDesc);
        fn convert_address(source: &TypeDesc, target: &TypeDesc);
        fn new_object(ctor: &ConstructorDesc, params: &[Operand]);
        /// Reads a field, a property or the result of a method and returns
        /// the type pushed.
        fn load_member(member: &MemberDesc) -> TypeDesc;
        fn store_member(member: &MemberDesc);
        fn call(method: &MethodDesc);
        /// Calls `method` on `this` (when given and the method is an
        /// instance method) with `params` converted to the declared
        /// parameter types.
        fn call_on(this: Option<&Operand>, method: &MethodDesc, params: &[Operand]);
    }

    // -------------------------------------------------------------------------
    // Arrays

    forward! {
        fn new_array(element: &TypeDesc, len: impl Into<Operand>);
        fn ldlen();
        fn ldelem(element: &TypeDesc);
        fn ldelema(element: &TypeDesc);
        fn stelem(element: &TypeDesc);
        fn load_array_element(array: impl Into<Operand>, index: impl Into<Operand>);
        fn store_array_element(
            array: impl Into<Operand>,
            index: impl Into<Operand>,
            value: impl Into<Operand>,
        );
    }

    // -------------------------------------------------------------------------
    // Strings

    forward! {
        /// Replaces the value on the stack with its textual form.
        fn to_string(ty: &TypeDesc);
        /// Like [`to_string`](Self::to_string), but nulls become `<null>`
        /// and arrays are listed element by element: `{ 1, 2, 3, }`.
        fn to_debuggable_string(ty: &TypeDesc);
        fn concat2();
        fn concat3();
        /// Pushes `string.format(msg, values)`.
        fn call_string_format(msg: &str, values: &[Operand]);
    }

    // -------------------------------------------------------------------------
    // Control flow

    forward! {
        /// Opens an `if` taken when the boolean on the stack is true.
        fn if_true();
        fn if_false();
        /// Opens an `if` comparing the two values on the stack.
        fn if_cmp(cmp: Cmp);
        fn if_compare(v1: impl Into<Operand>, cmp: Cmp, v2: impl Into<Operand>);
        fn begin_else();
        fn else_if(v1: impl Into<Operand>, cmp: Cmp, v2: impl Into<Operand>);
        fn end_if();
        fn if_not_default_value(value: impl Into<Operand>);
        fn if_not_is_empty_string(local: &LocalSlot);
        fn else_if_is_empty_string(local: &LocalSlot);

        /// Opens a counted loop. With an `index`, it runs from `start` while
        /// the index is below `end` (an array bound means its length).
        /// Without one the loop only ends through a break.
        fn for_loop(index: Option<&LocalSlot>, start: impl Into<Operand>, end: impl Into<Operand>) -> ForHandle;
        fn end_for();
        fn for_each(
            local: &LocalSlot,
            element: &TypeDesc,
            enumerator: &LocalSlot,
            get_current: &MethodDesc,
        ) -> ForHandle;
        fn end_for_each(move_next: &MethodDesc);
        /// Jumps past the end of the loop identified by `handle`.
        fn break_loop(handle: ForHandle);
        fn if_true_break(handle: ForHandle);
        fn if_false_break(handle: ForHandle);

        /// Opens a switch over the integer on the stack and returns one
        /// label per case.
        fn switch(cases: usize) -> Vec<Label>;
        fn case(label: Label, name: &str);
        fn end_case();
        fn default_case();
        fn end_switch();

        fn begin_while_condition();
        fn begin_while_body(cmp: Cmp);
        fn end_while();
    }
}

impl core::fmt::Debug for ProcedureBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut d = f.debug_struct("ProcedureBuilder");
        d.field("state", &self.state());
        if let State::Building(session) = &self.state {
            d.field("name", &session.name);
        }
        d.finish()
    }
}

// -----------------------------------------------------------------------------
// Tests
