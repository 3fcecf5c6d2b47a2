//! Export of runtime values to any `serde` data format.
//!
//! Objects and structs serialize as maps keyed by their declared field
//! names, arrays as sequences, boxes as their content and type handles as
//! their path. Addresses only exist while a procedure runs and are rejected.
//!
//! Object graphs with cycles are not detected and will overflow the stack.

use serde_core::ser::{Error, SerializeMap, SerializeSeq};
use serde_core::{Serialize, Serializer};

use crate::info::TypeDesc;
use crate::value::Value;

// -----------------------------------------------------------------------------
// FieldsSerializer

struct FieldsSerializer<'a> {
    ty: &'a TypeDesc,
    fields: &'a [Value],
}

impl Serialize for FieldsSerializer<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let declared = self.ty.fields();
        let mut state = serializer.serialize_map(Some(declared.len()))?;
        for (field, value) in declared.iter().zip(self.fields) {
            state.serialize_entry(&*field.name, value)?;
        }
        state.end()
    }
}

// -----------------------------------------------------------------------------
// Value

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Char(c) => match char::from_u32(*c as u32) {
                Some(ch) => serializer.serialize_char(ch),
                None => serializer.serialize_u16(*c),
            },
            Value::I8(v) => serializer.serialize_i8(*v),
            Value::U8(v) => serializer.serialize_u8(*v),
            Value::I16(v) => serializer.serialize_i16(*v),
            Value::U16(v) => serializer.serialize_u16(*v),
            Value::I32(v) => serializer.serialize_i32(*v),
            Value::U32(v) => serializer.serialize_u32(*v),
            Value::I64(v) => serializer.serialize_i64(*v),
            Value::U64(v) => serializer.serialize_u64(*v),
            Value::F32(v) => serializer.serialize_f32(*v),
            Value::F64(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Type(t) => serializer.serialize_str(t.path()),
            Value::Array(array) => {
                let items = array.to_vec();
                let mut state = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    state.serialize_element(item)?;
                }
                state.end()
            }
            Value::Object(obj) => FieldsSerializer {
                ty: obj.ty(),
                fields: &obj.fields(),
            }
            .serialize(serializer),
            Value::Struct(s) => FieldsSerializer {
                ty: &s.ty,
                fields: &s.fields,
            }
            .serialize(serializer),
            Value::Boxed(b) => b.get().serialize(serializer),
            Value::Address(place) => Err(S::Error::custom(format_args!(
                "cannot serialize the address {place:?}"
            ))),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use crate::info::{Primitive, TypeDesc};
    use crate::value::{ArrayRef, ObjectRef, Place, StructValue, Value};

    #[derive(::serde::Serialize)]
    #[allow(non_snake_case, reason = "mirrors the declared field names")]
    struct SampleDto {
        Name: String,
        Tags: Vec<i32>,
        Origin: Point,
    }

    #[derive(::serde::Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn object_graph_matches_derived_output() {
        let i32_ty = TypeDesc::primitive(Primitive::I32);
        let point_ty = TypeDesc::structure("demo::Point")
            .field("x", i32_ty.clone())
            .field("y", i32_ty.clone())
            .build();
        let dto_ty = TypeDesc::class("demo::SampleDto")
            .field("Name", TypeDesc::string())
            .field("Tags", TypeDesc::array_of(i32_ty.clone()))
            .field("Origin", point_ty.clone())
            .build();

        let mut origin = StructValue::new(point_ty);
        origin.set("x", Value::I32(3));
        origin.set("y", Value::I32(-4));

        let dto = ObjectRef::new(dto_ty);
        dto.set("Name", Value::from("sample"));
        dto.set(
            "Tags",
            Value::Array(ArrayRef::from_values(i32_ty, vec![Value::I32(1), Value::I32(2)])),
        );
        dto.set("Origin", Value::from(origin));

        let expected = SampleDto {
            Name: "sample".into(),
            Tags: vec![1, 2],
            Origin: Point { x: 3, y: -4 },
        };

        assert_eq!(
            serde_json::to_value(Value::Object(dto)).unwrap(),
            serde_json::to_value(expected).unwrap()
        );
    }

    #[test]
    fn scalars_and_nulls() {
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Value::Char(b'z' as u16)).unwrap(), "\"z\"");
        assert_eq!(
            serde_json::to_string(&Value::Type(TypeDesc::string())).unwrap(),
            "\"string\""
        );
    }

    #[test]
    fn addresses_are_rejected() {
        let err = serde_json::to_string(&Value::Address(Place::Local(0))).unwrap_err();
        assert!(err.to_string().contains("cannot serialize the address"));
    }
}
