//! Host methods the emitter calls on its own: string conversion and
//! concatenation, structural equality, formatting, untyped array stores,
//! type handle resolution and runtime tracing.

use alloc::sync::Arc;
use core::fmt::Write;
use std::sync::LazyLock;

use crs_types::InvokeError;
use crs_types::info::{Primitive, TypeDesc};
use crs_types::member::MethodDesc;
use crs_types::value::Value;

use crate::trace::TraceSink;

#[inline]
fn arg(args: &[Value], index: usize, expected: usize) -> Result<&Value, InvokeError> {
    args.get(index).ok_or(InvokeError::ArgumentCount {
        expected,
        found: args.len(),
    })
}

/// Returns `true` when a box holding `boxed` can be unboxed as `target`.
///
/// Enums and their underlying primitive share a representation.
pub(crate) fn unbox_compatible(boxed: &TypeDesc, target: &TypeDesc) -> bool {
    boxed == target
        || ((boxed.is_enum() || target.is_enum())
            && boxed.primitive_kind().is_some()
            && boxed.primitive_kind() == target.primitive_kind())
}

// -----------------------------------------------------------------------------
// Strings

static OBJECT_TO_STRING: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::instance(
        TypeDesc::object(),
        "to_string",
        Vec::new(),
        Some(TypeDesc::string()),
        |args| Ok(Value::from(arg(args, 0, 1)?.to_string())),
    )
});

static STRING_CONCAT2: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::static_fn(
        TypeDesc::string(),
        "concat",
        vec![TypeDesc::string(), TypeDesc::string()],
        Some(TypeDesc::string()),
        |args| Ok(Value::from(format!("{}{}", arg(args, 0, 2)?, arg(args, 1, 2)?))),
    )
});

static STRING_CONCAT3: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::static_fn(
        TypeDesc::string(),
        "concat",
        vec![TypeDesc::string(), TypeDesc::string(), TypeDesc::string()],
        Some(TypeDesc::string()),
        |args| {
            Ok(Value::from(format!(
                "{}{}{}",
                arg(args, 0, 3)?,
                arg(args, 1, 3)?,
                arg(args, 2, 3)?
            )))
        },
    )
});

static STRING_LENGTH: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::instance(
        TypeDesc::string(),
        "get_length",
        Vec::new(),
        Some(TypeDesc::primitive(Primitive::I32)),
        |args| match arg(args, 0, 1)? {
            Value::Str(s) => Ok(Value::I32(s.encode_utf16().count() as i32)),
            other => Err(InvokeError::mismatch("string", other)),
        },
    )
});

static STRING_FORMAT: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::static_fn(
        TypeDesc::string(),
        "format",
        vec![
            TypeDesc::string(),
            TypeDesc::array_of(TypeDesc::object()),
        ],
        Some(TypeDesc::string()),
        |args| {
            let format = match arg(args, 0, 2)? {
                Value::Str(s) => s.clone(),
                Value::Null => return Err(InvokeError::NullReference),
                other => return Err(InvokeError::mismatch("string", other)),
            };
            let values = match arg(args, 1, 2)? {
                Value::Array(array) => array.to_vec(),
                Value::Null => return Err(InvokeError::NullReference),
                other => return Err(InvokeError::mismatch("object array", other)),
            };
            format_items(&format, &values).map(Value::from)
        },
    )
});

/// Substitutes `{n}` items; `{{` and `}}` escape braces. Alignment and
/// format specifiers are accepted and ignored.
fn format_items(format: &str, values: &[Value]) -> Result<String, InvokeError> {
    let invalid = || InvokeError::Host(format!("invalid format string `{format}`"));

    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut item = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => item.push(ch),
                        None => return Err(invalid()),
                    }
                }
                let index_part = item.split([',', ':']).next().unwrap_or_default().trim();
                let index: usize = index_part.parse().map_err(|_| invalid())?;
                match values.get(index) {
                    Some(value) => {
                        let _ = write!(out, "{value}");
                    }
                    None => {
                        return Err(InvokeError::IndexOutOfRange {
                            index: index as i64,
                            len: values.len(),
                        });
                    }
                }
            }
            '}' => return Err(invalid()),
            other => out.push(other),
        }
    }
    Ok(out)
}

// -----------------------------------------------------------------------------
// Objects

static OBJECT_EQUALS: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::static_fn(
        TypeDesc::object(),
        "equals",
        vec![TypeDesc::object(), TypeDesc::object()],
        Some(TypeDesc::primitive(Primitive::Bool)),
        |args| {
            let (a, b) = (arg(args, 0, 2)?, arg(args, 1, 2)?);
            let equal = match (a.is_null(), b.is_null()) {
                (true, true) => true,
                (false, false) => a.value_equals(b),
                _ => false,
            };
            Ok(Value::Bool(equal))
        },
    )
});

static ARRAY_SET_VALUE: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::instance(
        TypeDesc::array_base(),
        "set_value",
        vec![TypeDesc::object(), TypeDesc::primitive(Primitive::I32)],
        None,
        |args| {
            let array = match arg(args, 0, 3)? {
                Value::Array(array) => array.clone(),
                other => return Err(InvokeError::mismatch("array", other)),
            };
            let index = arg(args, 2, 3)?.as_index()?;
            let element = array.element_type().clone();

            let value = match arg(args, 1, 3)?.clone() {
                Value::Null if element.is_value_type() => Value::default_of(&element),
                Value::Boxed(b) if element.is_value_type() => {
                    if !unbox_compatible(b.ty(), &element) {
                        return Err(InvokeError::InvalidCast {
                            from: b.ty().to_string(),
                            to: element.to_string(),
                        });
                    }
                    b.get()
                }
                other => {
                    if let Some(ty) = other.runtime_type()
                        && !element.is_assignable_from(&ty)
                    {
                        return Err(InvokeError::InvalidCast {
                            from: ty.to_string(),
                            to: element.to_string(),
                        });
                    }
                    other
                }
            };
            array.set(index, value)?;
            Ok(Value::Null)
        },
    )
});

static GET_TYPE_FROM_HANDLE: LazyLock<MethodDesc> = LazyLock::new(|| {
    MethodDesc::static_fn(
        TypeDesc::type_token(),
        "get_type_from_handle",
        vec![TypeDesc::type_token()],
        Some(TypeDesc::type_token()),
        |args| Ok(arg(args, 0, 1)?.clone()),
    )
});

// -----------------------------------------------------------------------------
// Accessors

/// `object.to_string()`, the textual form of any value.
#[inline]
pub fn object_to_string() -> MethodDesc {
    MethodDesc::clone(&OBJECT_TO_STRING)
}

/// `string.concat(string, string)`.
#[inline]
pub fn string_concat2() -> MethodDesc {
    MethodDesc::clone(&STRING_CONCAT2)
}

/// `string.concat(string, string, string)`.
#[inline]
pub fn string_concat3() -> MethodDesc {
    MethodDesc::clone(&STRING_CONCAT3)
}

/// `string.get_length()`, counted in UTF-16 code units.
#[inline]
pub fn string_length() -> MethodDesc {
    MethodDesc::clone(&STRING_LENGTH)
}

/// `string.format(string, object[])`.
#[inline]
pub fn string_format() -> MethodDesc {
    MethodDesc::clone(&STRING_FORMAT)
}

/// `object.equals(object, object)`: null-aware structural equality.
#[inline]
pub fn object_equals() -> MethodDesc {
    MethodDesc::clone(&OBJECT_EQUALS)
}

/// `array.set_value(object, i32)`: stores into an array of unknown
/// element type, unboxing value elements.
#[inline]
pub fn array_set_value() -> MethodDesc {
    MethodDesc::clone(&ARRAY_SET_VALUE)
}

/// `type.get_type_from_handle(type)`.
#[inline]
pub fn get_type_from_handle() -> MethodDesc {
    MethodDesc::clone(&GET_TYPE_FROM_HANDLE)
}

/// A static method writing its string argument to `sink` when called.
pub(crate) fn trace_instruction(sink: Arc<dyn TraceSink>) -> MethodDesc {
    MethodDesc::static_fn(
        TypeDesc::object(),
        "trace_instruction",
        vec![TypeDesc::string()],
        None,
        move |args| {
            sink.write_runtime(&arg(args, 0, 1)?.to_string());
            Ok(Value::Null)
        },
    )
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{array_set_value, format_items, object_equals, string_length};
    use crs_types::InvokeError;
    use crs_types::info::{Primitive, TypeDesc};
    use crs_types::value::{ArrayRef, BoxRef, Value};

    #[test]
    fn format_substitutes_items() {
        let values = [Value::I32(3), Value::from("x")];
        assert_eq!(format_items("{1}={0:D2} {{ok}}", &values).unwrap(), "x=3 {ok}");
        assert!(matches!(
            format_items("{2}", &values),
            Err(InvokeError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(format_items("{0", &values).is_err());
    }

    #[test]
    fn equals_handles_nulls_and_boxes() {
        let eq = object_equals();
        let i32_ty = TypeDesc::primitive(Primitive::I32);
        let mut both_null = [Value::Null, Value::Null];
        assert!(matches!(eq.invoke(&mut both_null), Ok(Value::Bool(true))));

        let mut boxes = [
            Value::Boxed(BoxRef::new(i32_ty.clone(), Value::I32(4))),
            Value::Boxed(BoxRef::new(i32_ty, Value::I32(4))),
        ];
        assert!(matches!(eq.invoke(&mut boxes), Ok(Value::Bool(true))));

        let mut one_null = [Value::Null, Value::from("a")];
        assert!(matches!(eq.invoke(&mut one_null), Ok(Value::Bool(false))));
    }

    #[test]
    fn untyped_array_store_unboxes() {
        let i32_ty = TypeDesc::primitive(Primitive::I32);
        let array = ArrayRef::new(i32_ty.clone(), 2);
        let set = array_set_value();

        let mut args = [
            Value::Array(array.clone()),
            Value::Boxed(BoxRef::new(i32_ty, Value::I32(9))),
            Value::I32(1),
        ];
        set.invoke(&mut args).unwrap();
        assert!(matches!(array.get(1), Ok(Value::I32(9))));

        let mut wrong = [Value::Array(array), Value::from("no"), Value::I32(0)];
        assert!(matches!(set.invoke(&mut wrong), Err(InvokeError::InvalidCast { .. })));
    }

    #[test]
    fn length_counts_utf16_units() {
        let mut args = [Value::from("a\u{1F600}")];
        assert!(matches!(string_length().invoke(&mut args), Ok(Value::I32(3))));
    }
}
