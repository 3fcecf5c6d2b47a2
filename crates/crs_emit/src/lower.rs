//! Lowering of recorded instructions into executable steps.
//!
//! Each instruction becomes one boxed closure over a [`Frame`]. Labels are
//! resolved to instruction indices once, so a running step only ever
//! returns the index of the next step to execute.

use crs_types::InvokeError;
use crs_types::info::{Primitive, TypeDesc};
use crs_types::member::{FieldDesc, FieldStorage, MethodDesc};
use crs_types::value::{ArrayRef, BoxRef, Num, Place, Value};

use crate::frame::{Frame, normalize};
use crate::instr::{Cmp, Instr};
use crate::intrinsics::unbox_compatible;
use crate::label::LabelTable;
use crate::{EmitError, Label};

// -----------------------------------------------------------------------------
// Step

/// What a step asks the interpreter loop to do next.
#[derive(Debug)]
pub(crate) enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

pub(crate) type Step = Box<dyn Fn(&mut Frame) -> Result<Flow, InvokeError> + Send + Sync>;

#[inline(always)]
fn step<F>(f: F) -> Step
where
    F: Fn(&mut Frame) -> Result<Flow, InvokeError> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Lowers a finished instruction list. Every branch target must be marked.
pub(crate) fn lower(
    code: Vec<Instr>,
    labels: &LabelTable,
    ret: Option<&TypeDesc>,
) -> Result<Vec<Step>, EmitError> {
    let returns = ret.is_some();
    let ret_kind = ret.and_then(TypeDesc::primitive_kind);
    code.into_iter()
        .map(|instr| lower_one(instr, labels, returns, ret_kind))
        .collect()
}

fn lower_one(
    instr: Instr,
    labels: &LabelTable,
    returns: bool,
    ret_kind: Option<Primitive>,
) -> Result<Step, EmitError> {
    let target = |label: Label| labels.resolve(label);

    Ok(match instr {
        Instr::LdConst(value) => step(move |f| {
            f.push(value.clone());
            Ok(Flow::Next)
        }),
        Instr::Ldarg(i) => step(move |f| {
            let value = f.arg(i)?.clone();
            f.push(value);
            Ok(Flow::Next)
        }),
        Instr::Starg(i, kind) => step(move |f| {
            let value = normalize(f.pop()?, kind)?;
            *f.arg(i)? = value;
            Ok(Flow::Next)
        }),
        Instr::Ldarga(i) => step(move |f| {
            f.push(Value::Address(Place::Arg(i)));
            Ok(Flow::Next)
        }),
        Instr::Ldloc(i) => step(move |f| {
            let value = f.local(i)?.clone();
            f.push(value);
            Ok(Flow::Next)
        }),
        Instr::Stloc(i, kind) => step(move |f| {
            let value = normalize(f.pop()?, kind)?;
            *f.local(i)? = value;
            Ok(Flow::Next)
        }),
        Instr::Ldloca(i) => step(move |f| {
            f.push(Value::Address(Place::Local(i)));
            Ok(Flow::Next)
        }),

        // ---------------------------------------------------------------------
        // Arithmetic

        Instr::Add => step(|f| binary(f, arith_add)),
        Instr::Sub => step(|f| binary(f, arith_sub)),
        Instr::And => step(|f| binary(f, |a, b| bitwise(a, b, |x, y| x & y))),
        Instr::Or => step(|f| binary(f, |a, b| bitwise(a, b, |x, y| x | y))),
        Instr::Not => step(|f| {
            let value = f.pop()?;
            let result = match value {
                Value::Bool(b) => Value::Bool(!b),
                ref other => {
                    let (num, kind) = numeric(other)?;
                    match num {
                        Num::Int(v) => Value::from_num(kind.stack_kind(), Num::Int(!v)),
                        Num::Float(_) => return Err(InvokeError::mismatch("integer", other)),
                    }
                }
            };
            f.push(result);
            Ok(Flow::Next)
        }),
        Instr::Ceq => step(|f| {
            let b = f.pop()?;
            let a = f.pop()?;
            f.push(Value::Bool(a.ref_equals(&b)));
            Ok(Flow::Next)
        }),

        // ---------------------------------------------------------------------
        // Branches

        Instr::Br(label) => {
            let to = target(label)?;
            step(move |_| Ok(Flow::Jump(to)))
        }
        Instr::Brtrue(label) => {
            let to = target(label)?;
            step(move |f| Ok(jump_if(f.pop()?.truthy()?, to)))
        }
        Instr::Brfalse(label) => {
            let to = target(label)?;
            step(move |f| Ok(jump_if(!f.pop()?.truthy()?, to)))
        }
        Instr::BranchIf(cmp, label) => {
            let to = target(label)?;
            step(move |f| {
                let b = f.pop()?;
                let a = f.pop()?;
                Ok(jump_if(compare(cmp, &a, &b)?, to))
            })
        }
        Instr::Switch(cases) => {
            let targets = cases
                .into_iter()
                .map(target)
                .collect::<Result<Vec<_>, _>>()?;
            step(move |f| {
                let selector = f.pop()?.as_index()?;
                let to = usize::try_from(selector)
                    .ok()
                    .and_then(|i| targets.get(i).copied());
                Ok(to.map_or(Flow::Next, Flow::Jump))
            })
        }

        // ---------------------------------------------------------------------
        // Stack

        Instr::Dup => step(|f| {
            let top = f.peek()?.clone();
            f.push(top);
            Ok(Flow::Next)
        }),
        Instr::Pop => step(|f| {
            f.pop()?;
            Ok(Flow::Next)
        }),
        Instr::Conv(kind) => step(move |f| {
            let value = f.pop()?.convert_to(kind)?;
            f.push(value);
            Ok(Flow::Next)
        }),

        // ---------------------------------------------------------------------
        // Objects

        Instr::Box(ty) => step(move |f| {
            let value = f.pop()?;
            let value = normalize(f.deref(value)?, ty.primitive_kind())?;
            f.push(Value::Boxed(BoxRef::new(ty.clone(), value)));
            Ok(Flow::Next)
        }),
        Instr::Unbox(ty) => step(move |f| {
            let cell = match f.pop()? {
                Value::Null => return Err(InvokeError::NullReference),
                Value::Boxed(b) if unbox_compatible(b.ty(), &ty) => b,
                other => match other.runtime_type() {
                    // a bare value stored in an object slot
                    Some(found) if !matches!(other, Value::Boxed(_)) && unbox_compatible(&found, &ty) => {
                        BoxRef::new(ty.clone(), other)
                    }
                    found => return Err(invalid_cast(found, &other, &ty)),
                },
            };
            f.push(Value::Address(Place::Boxed(cell)));
            Ok(Flow::Next)
        }),
        Instr::Ldobj => step(|f| {
            let value = f.pop()?;
            let value = f.deref(value)?;
            f.push(value);
            Ok(Flow::Next)
        }),
        Instr::Stobj(kind) => step(move |f| {
            let value = normalize(f.pop()?, kind)?;
            let place = address(f.pop()?)?;
            f.store(&place, value)?;
            Ok(Flow::Next)
        }),
        Instr::Initobj(ty) => step(move |f| {
            let place = address(f.pop()?)?;
            f.store(&place, Value::default_of(&ty))?;
            Ok(Flow::Next)
        }),
        Instr::Castclass(ty) => step(move |f| {
            let value = f.pop()?;
            if let Some(found) = value.runtime_type()
                && !ty.is_assignable_from(&found)
            {
                return Err(invalid_cast(Some(found), &value, &ty));
            }
            f.push(value);
            Ok(Flow::Next)
        }),
        Instr::Newobj(ctor) => step(move |f| {
            let params = f.pop_n(ctor.params().len())?;
            let instance = ctor.construct(params)?;
            f.push(instance);
            Ok(Flow::Next)
        }),
        Instr::Call(method) => step(move |f| call(f, &method)),

        // ---------------------------------------------------------------------
        // Arrays

        Instr::Newarr(element) => step(move |f| {
            let len = f.pop()?.as_index()?;
            let len = usize::try_from(len)
                .map_err(|_| InvokeError::IndexOutOfRange { index: len, len: 0 })?;
            f.push(Value::Array(ArrayRef::new(element.clone(), len)));
            Ok(Flow::Next)
        }),
        Instr::Ldlen => step(|f| {
            let array = array(f.pop()?)?;
            f.push(array_length(array.len())?);
            Ok(Flow::Next)
        }),
        Instr::Ldelem => step(|f| {
            let index = f.pop()?.as_index()?;
            let array = array(f.pop()?)?;
            f.push(array.get(index)?);
            Ok(Flow::Next)
        }),
        Instr::Ldelema => step(|f| {
            let index = f.pop()?.as_index()?;
            let array = array(f.pop()?)?;
            // bounds are checked when the address is taken
            array.get(index)?;
            f.push(Value::Address(Place::Element(array, index as usize)));
            Ok(Flow::Next)
        }),
        Instr::Stelem(kind) => step(move |f| {
            let value = normalize(f.pop()?, kind)?;
            let index = f.pop()?.as_index()?;
            let array = array(f.pop()?)?;
            array.set(index, value)?;
            Ok(Flow::Next)
        }),

        // ---------------------------------------------------------------------
        // Fields

        Instr::Ldfld(field) => step(move |f| {
            let slot = instance_slot(&field)?;
            let receiver = f.pop()?;
            let value = read_field(f, receiver, slot)?;
            f.push(value);
            Ok(Flow::Next)
        }),
        Instr::Stfld(field) => step(move |f| {
            let slot = instance_slot(&field)?;
            let value = normalize(f.pop()?, field.ty().primitive_kind())?;
            let receiver = f.pop()?;
            write_field(f, receiver, slot, value)?;
            Ok(Flow::Next)
        }),
        Instr::Ldsfld(field) => step(move |f| {
            let value = field.read_static().ok_or_else(|| not_static(&field))?;
            f.push(value);
            Ok(Flow::Next)
        }),
        Instr::Stsfld(field) => step(move |f| {
            let value = normalize(f.pop()?, field.ty().primitive_kind())?;
            if field.write_static(value) {
                Ok(Flow::Next)
            } else {
                Err(not_static(&field))
            }
        }),

        // ---------------------------------------------------------------------
        // Exits

        Instr::Throw => step(|f| match f.pop()? {
            Value::Null => Err(InvokeError::NullReference),
            value => Err(InvokeError::Thrown(value.to_string())),
        }),
        Instr::Ret => step(move |f| {
            if returns {
                let value = f.pop()?;
                Ok(Flow::Return(normalize(value, ret_kind)?))
            } else {
                Ok(Flow::Return(Value::Null))
            }
        }),
    })
}

// -----------------------------------------------------------------------------
// Helpers

#[inline]
fn jump_if(condition: bool, to: usize) -> Flow {
    if condition { Flow::Jump(to) } else { Flow::Next }
}

fn numeric(value: &Value) -> Result<(Num, Primitive), InvokeError> {
    match (value.to_num(), value.primitive()) {
        (Some(num), Some(kind)) => Ok((num, kind)),
        _ => Err(InvokeError::mismatch("numeric value", value)),
    }
}

/// The kind a binary operation on `a` and `b` produces.
fn result_kind(a: Primitive, b: Primitive) -> Primitive {
    use Primitive::{F32, F64, I32, I64, U32, U64};

    let (a, b) = (a.stack_kind(), b.stack_kind());
    if a == F64 || b == F64 {
        F64
    } else if a.is_float() || b.is_float() {
        F32
    } else if a == U64 && b == U64 {
        U64
    } else if matches!(a, I64 | U64) || matches!(b, I64 | U64) {
        I64
    } else if a == U32 && b == U32 {
        U32
    } else {
        I32
    }
}

fn binary(
    frame: &mut Frame,
    op: impl Fn(&Value, &Value) -> Result<Value, InvokeError>,
) -> Result<Flow, InvokeError> {
    let b = frame.pop()?;
    let a = frame.pop()?;
    frame.push(op(&a, &b)?);
    Ok(Flow::Next)
}

fn arith_add(a: &Value, b: &Value) -> Result<Value, InvokeError> {
    arith(a, b, |x, y| x + y, |x, y| x + y)
}

fn arith_sub(a: &Value, b: &Value) -> Result<Value, InvokeError> {
    arith(a, b, |x, y| x - y, |x, y| x - y)
}

/// Integer results wrap into the result kind.
fn arith(
    a: &Value,
    b: &Value,
    int: fn(i128, i128) -> i128,
    float: fn(f64, f64) -> f64,
) -> Result<Value, InvokeError> {
    let (x, kx) = numeric(a)?;
    let (y, ky) = numeric(b)?;
    let kind = result_kind(kx, ky);
    let num = if kind.is_float() {
        Num::Float(float(x.as_f64(), y.as_f64()))
    } else {
        Num::Int(int(x.as_i128(), y.as_i128()))
    };
    Ok(Value::from_num(kind, num))
}

fn bitwise(a: &Value, b: &Value, op: fn(i128, i128) -> i128) -> Result<Value, InvokeError> {
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        return Ok(Value::Bool(op(*x as i128, *y as i128) != 0));
    }
    let (x, kx) = numeric(a)?;
    let (y, ky) = numeric(b)?;
    match (x, y) {
        (Num::Int(x), Num::Int(y)) => Ok(Value::from_num(result_kind(kx, ky), Num::Int(op(x, y)))),
        _ => Err(InvokeError::mismatch("integer", if kx.is_float() { a } else { b })),
    }
}

/// Equality compares identity; the ordered comparisons need numbers.
fn compare(cmp: Cmp, a: &Value, b: &Value) -> Result<bool, InvokeError> {
    match cmp {
        Cmp::EqualTo => return Ok(a.ref_equals(b)),
        Cmp::NotEqualTo => return Ok(!a.ref_equals(b)),
        _ => {}
    }
    let (x, _) = numeric(a)?;
    let (y, _) = numeric(b)?;
    let Some(ord) = x.compare(y) else {
        return Ok(false);
    };
    Ok(match cmp {
        Cmp::LessThan => ord.is_lt(),
        Cmp::LessThanOrEqualTo => ord.is_le(),
        Cmp::GreaterThan => ord.is_gt(),
        Cmp::GreaterThanOrEqualTo => ord.is_ge(),
        Cmp::EqualTo => ord.is_eq(),
        Cmp::NotEqualTo => ord.is_ne(),
    })
}

fn invalid_cast(found: Option<TypeDesc>, value: &Value, to: &TypeDesc) -> InvokeError {
    InvokeError::InvalidCast {
        from: found.map_or_else(|| format!("{value:?}"), |ty| ty.to_string()),
        to: to.to_string(),
    }
}

fn address(value: Value) -> Result<Place, InvokeError> {
    match value {
        Value::Address(place) => Ok(place),
        Value::Null => Err(InvokeError::NullReference),
        other => Err(InvokeError::mismatch("address", &other)),
    }
}

fn array(value: Value) -> Result<ArrayRef, InvokeError> {
    match value {
        Value::Array(array) => Ok(array),
        Value::Null => Err(InvokeError::NullReference),
        other => Err(InvokeError::mismatch("array", &other)),
    }
}

/// Calls `method` with its arguments taken from the stack.
///
/// A receiver passed by address is read for the call and written back
/// afterwards, so value-type methods can mutate it.
fn call(frame: &mut Frame, method: &MethodDesc) -> Result<Flow, InvokeError> {
    let mut args = frame.pop_n(method.arg_count())?;
    let mut write_back = None;

    if !method.is_static()
        && let Some(this) = args.first_mut()
    {
        if let Value::Address(place) = this {
            let place = place.clone();
            *this = frame.load(&place)?;
            write_back = Some(place);
        }
        if this.is_null() && method.is_virtual() {
            return Err(InvokeError::NullReference);
        }
    }

    let result = method.invoke(&mut args)?;

    if let Some(place) = write_back
        && let Some(this) = args.into_iter().next()
    {
        frame.store(&place, this)?;
    }
    if let Some(ret) = method.ret() {
        frame.push(normalize(result, ret.primitive_kind())?);
    }
    Ok(Flow::Next)
}

fn instance_slot(field: &FieldDesc) -> Result<usize, InvokeError> {
    match field.storage() {
        FieldStorage::Instance(slot) => Ok(*slot),
        FieldStorage::Static(_) => Err(InvokeError::Host(format!(
            "field `{}` of `{}` is static",
            field.name(),
            field.declaring()
        ))),
    }
}

#[cold]
fn not_static(field: &FieldDesc) -> InvokeError {
    InvokeError::Host(format!(
        "field `{}` of `{}` is not static",
        field.name(),
        field.declaring()
    ))
}

fn field_out_of_range(slot: usize, len: usize) -> InvokeError {
    InvokeError::IndexOutOfRange {
        index: slot as i64,
        len,
    }
}

fn read_field(frame: &mut Frame, receiver: Value, slot: usize) -> Result<Value, InvokeError> {
    let receiver = match frame.deref(receiver)? {
        Value::Boxed(b) => b.get(),
        other => other,
    };
    match receiver {
        Value::Object(obj) => obj.field(slot),
        Value::Struct(s) => s
            .fields
            .get(slot)
            .cloned()
            .ok_or_else(|| field_out_of_range(slot, s.fields.len())),
        Value::Null => Err(InvokeError::NullReference),
        other => Err(InvokeError::mismatch("object or struct", &other)),
    }
}

fn set_struct_field(target: &mut Value, slot: usize, value: Value) -> Result<(), InvokeError> {
    match target {
        Value::Struct(s) => {
            let len = s.fields.len();
            let field = s
                .fields
                .get_mut(slot)
                .ok_or_else(|| field_out_of_range(slot, len))?;
            *field = value;
            Ok(())
        }
        Value::Object(obj) => obj.set_field(slot, value),
        Value::Null => Err(InvokeError::NullReference),
        other => Err(InvokeError::mismatch("object or struct", &*other)),
    }
}

fn write_field(frame: &mut Frame, receiver: Value, slot: usize, value: Value) -> Result<(), InvokeError> {
    match receiver {
        Value::Object(obj) => obj.set_field(slot, value),
        Value::Address(place) => {
            let mut target = frame.load(&place)?;
            set_struct_field(&mut target, slot, value)?;
            frame.store(&place, target)
        }
        Value::Boxed(b) => {
            let mut target = b.get();
            set_struct_field(&mut target, slot, value)?;
            b.set(target);
            Ok(())
        }
        Value::Null => Err(InvokeError::NullReference),
        other => Err(InvokeError::mismatch("object or address", &other)),
    }
}

/// Array lengths are pushed as `i32`; longer arrays cannot be indexed.
fn array_length(len: usize) -> Result<Value, InvokeError> {
    i32::try_from(len)
        .map(Value::I32)
        .map_err(|_| InvokeError::IndexOutOfRange {
            index: i64::try_from(len).unwrap_or(i64::MAX),
            len,
        })
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{Flow, array_length, compare, lower, result_kind};
    use crate::frame::Frame;
    use crate::instr::{Cmp, Instr};
    use crate::label::LabelTable;
    use crs_types::info::Primitive;
    use crs_types::value::Value;

    fn run(code: Vec<Instr>, labels: &LabelTable) -> Value {
        let steps = lower(code, labels, Some(&crs_types::TypeDesc::primitive(Primitive::I32))).unwrap();
        let mut frame = Frame::new(vec![], vec![Value::I32(0)]);
        let mut pc = 0;
        loop {
            match steps[pc](&mut frame).unwrap() {
                Flow::Next => pc += 1,
                Flow::Jump(to) => pc = to,
                Flow::Return(v) => return v,
            }
        }
    }

    #[test]
    fn arithmetic_kinds() {
        use Primitive::*;
        assert_eq!(result_kind(I8, U16), I32);
        assert_eq!(result_kind(U32, U32), U32);
        assert_eq!(result_kind(U32, I32), I32);
        assert_eq!(result_kind(I32, I64), I64);
        assert_eq!(result_kind(U64, U64), U64);
        assert_eq!(result_kind(F32, I64), F32);
        assert_eq!(result_kind(F32, F64), F64);
    }

    #[test]
    fn wrapping_add_and_countdown() {
        let labels = LabelTable::default();
        let sum = run(
            vec![
                Instr::LdConst(Value::I32(i32::MAX)),
                Instr::LdConst(Value::I32(1)),
                Instr::Add,
                Instr::Ret,
            ],
            &labels,
        );
        assert!(matches!(sum, Value::I32(i32::MIN)));

        // local0 = 3; while local0 > 0 { local0 -= 1 }
        let mut labels = LabelTable::default();
        let head = labels.define();
        let exit = labels.define();
        labels.mark(head, 2).unwrap();
        labels.mark(exit, 10).unwrap();
        let result = run(
            vec![
                Instr::LdConst(Value::I32(3)),
                Instr::Stloc(0, Some(Primitive::I32)),
                Instr::Ldloc(0),
                Instr::LdConst(Value::I32(0)),
                Instr::BranchIf(Cmp::LessThanOrEqualTo, exit),
                Instr::Ldloc(0),
                Instr::LdConst(Value::I32(1)),
                Instr::Sub,
                Instr::Stloc(0, Some(Primitive::I32)),
                Instr::Br(head),
                Instr::Ldloc(0),
                Instr::Ret,
            ],
            &labels,
        );
        assert!(matches!(result, Value::I32(0)));
    }

    #[test]
    fn comparisons() {
        assert!(compare(Cmp::EqualTo, &Value::Null, &Value::Null).unwrap());
        assert!(compare(Cmp::NotEqualTo, &Value::from("a"), &Value::Null).unwrap());
        assert!(compare(Cmp::LessThan, &Value::I32(1), &Value::I64(2)).unwrap());
        assert!(!compare(Cmp::GreaterThanOrEqualTo, &Value::F64(f64::NAN), &Value::I32(0)).unwrap());
        assert!(compare(Cmp::LessThan, &Value::from("a"), &Value::I32(0)).is_err());
    }

    #[test]
    fn unmarked_targets_fail_lowering() {
        let mut labels = LabelTable::default();
        let nowhere = labels.define();
        assert!(lower(vec![Instr::Br(nowhere)], &labels, None).is_err());
    }

    #[test]
    fn oversized_lengths_do_not_wrap() {
        assert!(matches!(array_length(3), Ok(Value::I32(3))));
        assert!(matches!(array_length(i32::MAX as usize), Ok(Value::I32(i32::MAX))));
        let len = i32::MAX as usize + 1;
        assert_eq!(
            array_length(len).map(|_| ()),
            Err(crs_types::InvokeError::IndexOutOfRange {
                index: 1 << 31,
                len
            })
        );
    }
}
