use alloc::sync::Arc;
use core::mem;

use crs_types::info::{Primitive, TypeDesc};
use crs_types::member::{ConstructorDesc, FieldDesc, MemberDesc, MethodDesc, Signature};
use crs_types::value::Value;

use crate::block::BlockStack;
use crate::coerce::{self, Conversion};
use crate::instr::{Cmp, Instr, conv_name, ldelem_name, ldobj_line, stelem_name};
use crate::label::LabelTable;
use crate::operand::{ArgSlot, Constant, LocalSlot, Operand};
use crate::trace::{EmitOptions, TraceLevel, TraceSink};
use crate::{EmitError, Label, Procedure, intrinsics, lower};

// -----------------------------------------------------------------------------
// Session

/// The open state of one build session.
pub(crate) struct Session {
    pub(super) name: String,
    pub(super) signature: Signature,
    pub(super) args: Vec<ArgSlot>,
    /// Type and debug name of every declared local.
    pub(super) locals: Vec<(TypeDesc, String)>,
    pub(super) blocks: BlockStack,
    pub(super) labels: LabelTable,
    pub(super) code: Vec<Instr>,
    pub(super) method_end: Label,
    pub(super) trace: TraceLevel,
    pub(super) sink: Arc<dyn TraceSink>,
    pub(super) line_no: u32,
    pub(super) trace_method: MethodDesc,
    /// Reused by every `call_string_format`.
    pub(super) string_format_array: Option<LocalSlot>,
    pub(super) next_for_id: u32,
}

#[cold]
fn missing_accessor(declaring: &TypeDesc, member: &str, accessor: &'static str) -> EmitError {
    EmitError::MissingAccessor {
        declaring: declaring.to_string(),
        member: member.to_owned(),
        accessor,
    }
}

impl Session {
    pub fn new(name: &str, signature: Signature, options: &EmitOptions) -> Self {
        let args = signature
            .args
            .iter()
            .enumerate()
            .map(|(i, ty)| ArgSlot {
                index: i as u32,
                ty: ty.clone(),
            })
            .collect();
        let mut labels = LabelTable::new();
        let method_end = labels.define();
        let trace = options.effective_trace();

        let mut session = Self {
            name: name.to_owned(),
            signature,
            args,
            locals: Vec::new(),
            blocks: BlockStack::default(),
            labels,
            code: Vec::new(),
            method_end,
            trace,
            sink: options.sink.clone(),
            line_no: 1,
            trace_method: intrinsics::trace_instruction(options.sink.clone()),
            string_format_array: None,
            next_for_id: 0,
        };

        log::debug!("begin procedure `{name}` (trace: {trace})");
        label_line!(session, "Begin method {name} {{");
        session
    }

    pub fn end_method(&mut self) -> Result<Procedure, EmitError> {
        if let Some(top) = self.blocks.top() {
            return Err(EmitError::UnclosedBlock {
                open: self.blocks.len(),
                innermost: top.name(),
            });
        }

        self.mark_label(self.method_end)?;
        label_line!(self, "}} End method");
        self.ret()?;
        self.labels.check_marked()?;

        let code = mem::take(&mut self.code);
        let steps = lower::lower(code, &self.labels, self.signature.ret.as_ref())?;
        let locals = self.locals.iter().map(|(ty, _)| ty.clone()).collect();

        log::debug!(
            "end procedure `{}`: {} steps, {} locals",
            self.name,
            steps.len(),
            self.locals.len()
        );
        Ok(Procedure::new(
            mem::take(&mut self.name),
            self.signature.clone(),
            locals,
            steps,
        ))
    }

    // -------------------------------------------------------------------------
    // Tracing

    #[inline]
    pub fn tracing(&self) -> bool {
        self.trace != TraceLevel::Off
    }

    /// Writes a transcript line. At full trace the line is also replayed
    /// when the procedure runs.
    pub fn source_line(&mut self, line: String) {
        let line_no = self.line_no;
        self.line_no += 1;
        self.sink.write_instruction(line_no, &line);
        if self.trace == TraceLevel::Full {
            self.code
                .push(Instr::LdConst(Value::from(format!("{line_no:05}: {line}"))));
            self.code.push(Instr::Call(self.trace_method.clone()));
        }
    }

    #[inline]
    pub(super) fn push(&mut self, instr: Instr) {
        self.code.push(instr);
    }

    pub(super) fn branch(&mut self, instr: Instr, target: Label) -> Result<(), EmitError> {
        self.labels.reference(target)?;
        self.push(instr);
        Ok(())
    }

    fn local_name(&self, local: &LocalSlot) -> &str {
        self.locals
            .get(local.index as usize)
            .map_or("?", |(_, name)| name.as_str())
    }

    // -------------------------------------------------------------------------
    // Slots

    pub fn arg(&mut self, index: u32) -> Result<ArgSlot, EmitError> {
        self.args
            .get(index as usize)
            .cloned()
            .ok_or(EmitError::UnknownArgument {
                index,
                count: self.args.len(),
            })
    }

    pub fn declare_local(&mut self, ty: &TypeDesc, name: &str) -> Result<LocalSlot, EmitError> {
        let index = self.locals.len() as u32;
        self.locals.push((ty.clone(), name.to_owned()));
        comment!(self, "Declare local '{name}' of type {ty}");
        Ok(LocalSlot {
            index,
            ty: ty.clone(),
        })
    }

    pub fn declare_local_with(
        &mut self,
        ty: &TypeDesc,
        name: &str,
        init: impl Into<Operand>,
    ) -> Result<LocalSlot, EmitError> {
        let local = self.declare_local(ty, name)?;
        self.set(&local, init)?;
        Ok(local)
    }

    pub fn set(&mut self, local: &LocalSlot, value: impl Into<Operand>) -> Result<(), EmitError> {
        let value = value.into();
        let source = value.ty();
        self.load(value)?;
        self.convert_value(&source, &local.ty)?;
        self.stloc(local)
    }

    // -------------------------------------------------------------------------
    // Loads and stores

    pub fn load(&mut self, op: impl Into<Operand>) -> Result<(), EmitError> {
        match op.into() {
            Operand::Constant(constant) => self.ldc(constant),
            Operand::Argument(arg) => self.ldarg(&arg),
            Operand::Local(local) => self.ldloc(&local),
        }
    }

    pub fn store(&mut self, op: impl Into<Operand>) -> Result<(), EmitError> {
        match op.into() {
            Operand::Argument(arg) => self.starg(&arg),
            Operand::Local(local) => self.stloc(&local),
            Operand::Constant(constant) => Err(EmitError::InvalidStoreTarget(constant.ty().to_string())),
        }
    }

    pub fn load_address(&mut self, op: impl Into<Operand>) -> Result<(), EmitError> {
        match op.into() {
            Operand::Argument(arg) if arg.ty.is_value_type() => self.ldarga(&arg),
            Operand::Local(local) if local.ty.is_value_type() => self.ldloca(&local),
            other => self.load(other),
        }
    }

    pub fn inc(&mut self, op: impl Into<Operand>) -> Result<(), EmitError> {
        let op = op.into();
        self.load(op.clone())?;
        self.ldc(Constant::I32(1))?;
        self.add()?;
        self.store(op)
    }

    pub fn dec(&mut self, op: impl Into<Operand>) -> Result<(), EmitError> {
        let op = op.into();
        self.load(op.clone())?;
        self.ldc(Constant::I32(1))?;
        self.subtract()?;
        self.store(op)
    }

    pub fn ldc(&mut self, constant: impl Into<Constant>) -> Result<(), EmitError> {
        let value = match constant.into() {
            Constant::Null => return self.ldnull(),
            Constant::Str(s) => return self.ldstr(&s),
            Constant::Char(_) => {
                return Err(EmitError::UnsupportedConstant(Primitive::Char.name().into()));
            }
            Constant::Enum(ty, raw) => {
                comment!(self, "Ldc {ty}.{raw}");
                let kind = ty.as_enum()?;
                return self.ldc(Constant::from_raw(kind, raw));
            }
            Constant::Type(ty) => {
                self.ldtoken(&ty)?;
                return self.call(&intrinsics::get_type_from_handle());
            }
            Constant::Bool(v) => {
                instruction!(self, "Ldc.i4 {}", u8::from(v));
                Value::Bool(v)
            }
            Constant::I8(v) => self.ldc_i4(v.into()),
            Constant::U8(v) => self.ldc_i4(v.into()),
            Constant::I16(v) => self.ldc_i4(v.into()),
            Constant::U16(v) => self.ldc_i4(v.into()),
            Constant::I32(v) => self.ldc_i4(v),
            Constant::U32(v) => {
                instruction!(self, "Ldc.i4 {}", v as i32);
                Value::U32(v)
            }
            Constant::I64(v) => {
                instruction!(self, "Ldc.i8 {v}");
                Value::I64(v)
            }
            Constant::U64(v) => {
                instruction!(self, "Ldc.i8 {}", v as i64);
                Value::U64(v)
            }
            Constant::F32(v) => {
                instruction!(self, "Ldc.r4 {v}");
                Value::F32(v)
            }
            Constant::F64(v) => {
                instruction!(self, "Ldc.r8 {v}");
                Value::F64(v)
            }
        };
        self.push(Instr::LdConst(value));
        Ok(())
    }

    fn ldc_i4(&mut self, v: i32) -> Value {
        instruction!(self, "Ldc.i4 {v}");
        Value::I32(v)
    }

    pub fn ldstr(&mut self, s: &str) -> Result<(), EmitError> {
        instruction!(self, "Ldstr {s}");
        self.push(Instr::LdConst(Value::from(s)));
        Ok(())
    }

    pub fn ldnull(&mut self) -> Result<(), EmitError> {
        instruction!(self, "Ldnull");
        self.push(Instr::LdConst(Value::Null));
        Ok(())
    }

    pub fn ldtoken(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "Ldtoken {ty}");
        self.push(Instr::LdConst(Value::Type(ty.clone())));
        Ok(())
    }

    pub fn ldarg(&mut self, arg: &ArgSlot) -> Result<(), EmitError> {
        let arg = self.arg(arg.index)?;
        instruction!(self, "Ldarg {}", arg.index);
        self.push(Instr::Ldarg(arg.index));
        Ok(())
    }

    pub fn starg(&mut self, arg: &ArgSlot) -> Result<(), EmitError> {
        let arg = self.arg(arg.index)?;
        instruction!(self, "Starg {}", arg.index);
        self.push(Instr::Starg(arg.index, arg.ty.primitive_kind()));
        Ok(())
    }

    pub fn ldarga(&mut self, arg: &ArgSlot) -> Result<(), EmitError> {
        let arg = self.arg(arg.index)?;
        instruction!(self, "Ldarga {}", arg.index);
        self.push(Instr::Ldarga(arg.index));
        Ok(())
    }

    pub fn ldloc(&mut self, local: &LocalSlot) -> Result<(), EmitError> {
        instruction!(self, "Ldloc {}", self.local_name(local));
        self.push(Instr::Ldloc(local.index));
        self.stack_top(&local.ty)
    }

    pub fn stloc(&mut self, local: &LocalSlot) -> Result<(), EmitError> {
        instruction!(self, "Stloc {}", self.local_name(local));
        self.stack_top(&local.ty)?;
        self.push(Instr::Stloc(local.index, local.ty.primitive_kind()));
        Ok(())
    }

    pub fn ldloca(&mut self, local: &LocalSlot) -> Result<(), EmitError> {
        instruction!(self, "Ldloca {}", self.local_name(local));
        self.push(Instr::Ldloca(local.index));
        self.stack_top(&local.ty)
    }

    /// Pushes the default value of `ty`. Structs go through a zeroed local.
    pub fn load_default_value(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        match ty.primitive_kind() {
            Some(Primitive::Bool) => self.ldc(false),
            Some(Primitive::I64 | Primitive::U64) => self.ldc(0_i64),
            Some(Primitive::F32) => self.ldc(0_f32),
            Some(Primitive::F64) => self.ldc(0_f64),
            Some(_) => self.ldc(0_i32),
            None if ty.is_value_type() => {
                let zero = self.declare_local(ty, "zero")?;
                self.load_address(&zero)?;
                self.init_obj(ty)?;
                self.load(&zero)
            }
            None => self.ldnull(),
        }
    }

    // -------------------------------------------------------------------------
    // Arithmetic and logic

    fn simple(&mut self, name: &str, instr: Instr) -> Result<(), EmitError> {
        instruction!(self, "{name}");
        self.push(instr);
        Ok(())
    }

    pub fn add(&mut self) -> Result<(), EmitError> {
        self.simple("Add", Instr::Add)
    }

    pub fn subtract(&mut self) -> Result<(), EmitError> {
        self.simple("Sub", Instr::Sub)
    }

    pub fn and(&mut self) -> Result<(), EmitError> {
        self.simple("And", Instr::And)
    }

    pub fn or(&mut self) -> Result<(), EmitError> {
        self.simple("Or", Instr::Or)
    }

    pub fn not(&mut self) -> Result<(), EmitError> {
        self.simple("Not", Instr::Not)
    }

    pub fn ceq(&mut self) -> Result<(), EmitError> {
        self.simple("Ceq", Instr::Ceq)
    }

    pub fn dup(&mut self) -> Result<(), EmitError> {
        self.simple("Dup", Instr::Dup)
    }

    pub fn pop(&mut self) -> Result<(), EmitError> {
        self.simple("Pop", Instr::Pop)
    }

    #[inline]
    pub fn ignore_return_value(&mut self) -> Result<(), EmitError> {
        self.pop()
    }

    pub fn throw(&mut self) -> Result<(), EmitError> {
        self.simple("Throw", Instr::Throw)
    }

    pub fn ret(&mut self) -> Result<(), EmitError> {
        self.simple("Ret", Instr::Ret)
    }

    // -------------------------------------------------------------------------
    // Labels and branches

    pub fn define_label(&mut self) -> Result<Label, EmitError> {
        Ok(self.labels.define())
    }

    pub fn mark_label(&mut self, label: Label) -> Result<(), EmitError> {
        self.labels.mark(label, self.code.len())?;
        label_line!(self, "{label}:");
        Ok(())
    }

    pub fn br(&mut self, label: Label) -> Result<(), EmitError> {
        instruction!(self, "Br {label}");
        self.branch(Instr::Br(label), label)
    }

    pub fn brtrue(&mut self, label: Label) -> Result<(), EmitError> {
        instruction!(self, "Brtrue {label}");
        self.branch(Instr::Brtrue(label), label)
    }

    pub fn brfalse(&mut self, label: Label) -> Result<(), EmitError> {
        instruction!(self, "Brfalse {label}");
        self.branch(Instr::Brfalse(label), label)
    }

    pub fn blt(&mut self, label: Label) -> Result<(), EmitError> {
        instruction!(self, "Blt {label}");
        self.branch(Instr::BranchIf(Cmp::LessThan, label), label)
    }

    pub fn bgt(&mut self, label: Label) -> Result<(), EmitError> {
        instruction!(self, "Bgt {label}");
        self.branch(Instr::BranchIf(Cmp::GreaterThan, label), label)
    }

    pub fn ble(&mut self, label: Label) -> Result<(), EmitError> {
        instruction!(self, "Ble {label}");
        self.branch(Instr::BranchIf(Cmp::LessThanOrEqualTo, label), label)
    }

    // -------------------------------------------------------------------------
    // Conversions

    fn convert(&mut self, source: &TypeDesc, target: &TypeDesc, is_address: bool) -> Result<(), EmitError> {
        match coerce::plan(source, target, is_address)? {
            Conversion::Identity | Conversion::Upcast => Ok(()),
            Conversion::Numeric(kind) => {
                instruction!(self, "{}", conv_name(kind));
                self.push(Instr::Conv(kind));
                Ok(())
            }
            Conversion::Unbox { target, deref } => {
                self.unbox(&target)?;
                if deref {
                    self.ldobj(&target)?;
                }
                Ok(())
            }
            Conversion::Box { source, load_first } => {
                if load_first {
                    self.ldobj(&source)?;
                }
                self.box_value(&source)
            }
            Conversion::Cast(target) => self.castclass(&target),
        }
    }

    /// Converts the value on the stack from `source` to `target`.
    #[inline]
    pub fn convert_value(&mut self, source: &TypeDesc, target: &TypeDesc) -> Result<(), EmitError> {
        self.convert(source, target, false)
    }

    /// Converts the value (or address, for value types) on the stack from
    /// `source` to `target`.
    #[inline]
    pub fn convert_address(&mut self, source: &TypeDesc, target: &TypeDesc) -> Result<(), EmitError> {
        self.convert(source, target, true)
    }

    // -------------------------------------------------------------------------
    // Objects

    pub fn box_value(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "Box {ty}");
        self.push(Instr::Box(ty.clone()));
        Ok(())
    }

    pub fn unbox(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "Unbox {ty}");
        self.push(Instr::Unbox(ty.clone()));
        Ok(())
    }

    pub fn ldobj(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "{}", ldobj_line(ty));
        self.push(Instr::Ldobj);
        Ok(())
    }

    pub fn stobj(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "Stobj {ty}");
        self.push(Instr::Stobj(ty.primitive_kind()));
        Ok(())
    }

    pub fn castclass(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "Castclass {ty}");
        self.push(Instr::Castclass(ty.clone()));
        Ok(())
    }

    pub fn init_obj(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "Initobj {ty}");
        self.push(Instr::Initobj(ty.clone()));
        Ok(())
    }

    pub fn new_object(&mut self, ctor: &ConstructorDesc, params: &[Operand]) -> Result<(), EmitError> {
        check_arity(|| format!("{}::.ctor", ctor.declaring()), ctor.params().len(), params.len())?;
        for (param, ty) in params.iter().zip(ctor.params()) {
            self.load_param(param, ty)?;
        }
        instruction!(self, "Newobj {ctor} on type {}", ctor.declaring());
        self.push(Instr::Newobj(ctor.clone()));
        Ok(())
    }

    fn load_field(&mut self, field: &FieldDesc) -> Result<(), EmitError> {
        let (op, instr) = if field.is_static() {
            ("Ldsfld", Instr::Ldsfld(field.clone()))
        } else {
            ("Ldfld", Instr::Ldfld(field.clone()))
        };
        instruction!(self, "{op} {field} on type {}", field.declaring());
        self.push(instr);
        Ok(())
    }

    fn store_field(&mut self, field: &FieldDesc) -> Result<(), EmitError> {
        let (op, instr) = if field.is_static() {
            ("Stsfld", Instr::Stsfld(field.clone()))
        } else {
            ("Stfld", Instr::Stfld(field.clone()))
        };
        instruction!(self, "{op} {field} on type {}", field.declaring());
        self.push(instr);
        Ok(())
    }

    pub fn load_member(&mut self, member: &MemberDesc) -> Result<TypeDesc, EmitError> {
        let ty = match member {
            MemberDesc::Field(field) => {
                self.load_field(field)?;
                field.ty().clone()
            }
            MemberDesc::Property(property) => {
                let getter = property
                    .getter
                    .as_ref()
                    .ok_or_else(|| missing_accessor(&property.declaring, &property.name, "getter"))?;
                self.call(getter)?;
                property.ty.clone()
            }
            MemberDesc::Method(method) => {
                let ret = method
                    .ret()
                    .cloned()
                    .ok_or_else(|| missing_accessor(method.declaring(), method.name(), "return value"))?;
                self.call(method)?;
                ret
            }
        };
        self.stack_top(&ty)?;
        Ok(ty)
    }

    pub fn store_member(&mut self, member: &MemberDesc) -> Result<(), EmitError> {
        match member {
            MemberDesc::Field(field) => self.store_field(field),
            MemberDesc::Property(property) => {
                let setter = property
                    .setter
                    .as_ref()
                    .ok_or_else(|| missing_accessor(&property.declaring, &property.name, "setter"))?;
                self.call(setter)
            }
            MemberDesc::Method(method) => Err(missing_accessor(method.declaring(), method.name(), "setter")),
        }
    }

    // -------------------------------------------------------------------------
    // Calls

    pub fn call(&mut self, method: &MethodDesc) -> Result<(), EmitError> {
        if self.tracing() {
            let kind = if method.is_virtual() {
                "Callvirt"
            } else if method.is_static() {
                "Static Call"
            } else {
                "Call"
            };
            instruction!(self, "{kind} {method} on type {}", method.declaring());
        }
        self.push(Instr::Call(method.clone()));
        Ok(())
    }

    pub fn call_on(
        &mut self,
        this: Option<&Operand>,
        method: &MethodDesc,
        params: &[Operand],
    ) -> Result<(), EmitError> {
        check_arity(|| method.name().to_owned(), method.params().len(), params.len())?;
        if let Some(this) = this
            && !method.is_static()
        {
            self.load_address(this)?;
            self.convert_address(&this.ty(), method.declaring())?;
        }
        for (param, ty) in params.iter().zip(method.params()) {
            self.load_param(param, ty)?;
        }
        self.call(method)
    }

    /// Loads a parameter converted to `ty`. A `null` needs no conversion.
    fn load_param(&mut self, param: &Operand, ty: &TypeDesc) -> Result<(), EmitError> {
        self.load(param)?;
        if param.is_null() {
            return Ok(());
        }
        self.convert_value(&param.ty(), ty)
    }

    // -------------------------------------------------------------------------
    // Arrays

    pub fn new_array(&mut self, element: &TypeDesc, len: impl Into<Operand>) -> Result<(), EmitError> {
        self.load(len)?;
        instruction!(self, "Newarr {element}");
        self.push(Instr::Newarr(element.clone()));
        Ok(())
    }

    /// Pushes the array length as an `i32`.
    pub fn ldlen(&mut self) -> Result<(), EmitError> {
        instruction!(self, "Ldlen");
        self.push(Instr::Ldlen);
        instruction!(self, "Conv.i4");
        self.push(Instr::Conv(Primitive::I32));
        Ok(())
    }

    pub fn ldelem(&mut self, element: &TypeDesc) -> Result<(), EmitError> {
        let name = ldelem_name(element)?;
        instruction!(self, "{name}");
        self.push(Instr::Ldelem);
        self.stack_top(element)
    }

    pub fn ldelema(&mut self, element: &TypeDesc) -> Result<(), EmitError> {
        instruction!(self, "ldelema");
        self.push(Instr::Ldelema);
        self.stack_top(element)
    }

    pub fn stelem(&mut self, element: &TypeDesc) -> Result<(), EmitError> {
        let name = stelem_name(element)?;
        instruction!(self, "{name}");
        self.stack_top(element)?;
        self.push(Instr::Stelem(element.primitive_kind()));
        Ok(())
    }

    /// Structs are read through their element address.
    pub fn load_array_element(
        &mut self,
        array: impl Into<Operand>,
        index: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        let array = array.into();
        let element = array.ty().element()?.clone();
        self.load(array)?;
        self.load(index)?;
        if element.is_struct() {
            self.ldelema(&element)?;
            self.ldobj(&element)
        } else {
            self.ldelem(&element)
        }
    }

    pub fn store_array_element(
        &mut self,
        array: impl Into<Operand>,
        index: impl Into<Operand>,
        value: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        let (array, index, value) = (array.into(), index.into(), value.into());
        let array_ty = array.ty();
        if array_ty == TypeDesc::array_base() {
            return self.call_on(Some(&array), &intrinsics::array_set_value(), &[value, index]);
        }

        let element = array_ty.element()?.clone();
        self.load(array)?;
        self.load(index)?;
        if element.is_struct() {
            self.ldelema(&element)?;
        }
        let source = value.ty();
        self.load(value)?;
        self.convert_value(&source, &element)?;
        if element.is_struct() {
            self.stobj(&element)
        } else {
            self.stelem(&element)
        }
    }
}

fn check_arity(method: impl FnOnce() -> String, declared: usize, supplied: usize) -> Result<(), EmitError> {
    if declared == supplied {
        Ok(())
    } else {
        Err(EmitError::ArityMismatch {
            method: method(),
            declared,
            supplied,
        })
    }
}

// -----------------------------------------------------------------------------
// Tests
