#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

pub use crs_emit as emit;
pub use crs_types as types;
pub use crs_utils as utils;

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
extern crate alloc;
#[cfg(test)]
extern crate std;

/// Drives the engine the way the serializer does: one writer and one reader
/// procedure per data shape, built once, cached, and invoked from many
/// threads.
#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::string::{String, ToString};
    use alloc::vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    use crate::emit::{Cmp, Constant, EmitError, EmitOptions, Operand, Procedure, ProcedureBuilder, ProcedureCache};
    use crate::types::{ArrayRef, ConstructorDesc, FieldDesc, InvokeError, MemberDesc, MethodDesc, ObjectRef};
    use crate::types::{Primitive, Signature, TypeDesc, Value};
    use serde_json::json;

    // -------------------------------------------------------------------------
    // Shapes

    struct Shapes {
        dto: TypeDesc,
        writer: TypeDesc,
        write_element: MethodDesc,
        parse_int: MethodDesc,
    }

    fn i32_ty() -> TypeDesc {
        TypeDesc::primitive(Primitive::I32)
    }

    fn shapes() -> Shapes {
        let dto = TypeDesc::class("demo::SampleDto")
            .field("Name", TypeDesc::string())
            .field("Age", i32_ty())
            .field("Tags", TypeDesc::array_of(i32_ty()))
            .field("Active", TypeDesc::primitive(Primitive::Bool))
            .build();
        let writer = TypeDesc::class("demo::XmlWriter").field("out", TypeDesc::string()).build();

        let write_element = MethodDesc::instance(
            writer.clone(),
            "write_element_string",
            vec![TypeDesc::string(), TypeDesc::string()],
            None,
            |args| {
                let Value::Object(writer) = &args[0] else {
                    return Err(InvokeError::NullReference);
                };
                let mut out = writer.get("out").map(|v| v.to_string()).unwrap_or_default();
                out.push_str(&format!("<{0}>{1}</{0}>", args[1], args[2]));
                writer.set("out", Value::from(out));
                Ok(Value::Null)
            },
        );
        let parse_int = MethodDesc::static_fn(
            i32_ty(),
            "parse",
            vec![TypeDesc::string()],
            Some(i32_ty()),
            |args| {
                args[0]
                    .as_str()
                    .and_then(|s| s.parse::<i32>().ok())
                    .map(Value::I32)
                    .ok_or_else(|| InvokeError::mismatch("an integer literal", &args[0]))
            },
        );

        Shapes {
            dto,
            writer,
            write_element,
            parse_int,
        }
    }

    fn member(ty: &TypeDesc, name: &str) -> MemberDesc {
        MemberDesc::Field(FieldDesc::instance(ty, name).unwrap())
    }

    fn write_element(
        b: &mut ProcedureBuilder,
        shapes: &Shapes,
        writer: &Operand,
        name: &str,
        text: &Operand,
    ) -> Result<(), EmitError> {
        b.call_on(Some(writer), &shapes.write_element, &[name.into(), text.clone()])
    }

    // -------------------------------------------------------------------------
    // Procedures

    fn build_writer(shapes: &Shapes, options: EmitOptions) -> Result<Procedure, EmitError> {
        let signature = Signature::new(vec![shapes.writer.clone(), shapes.dto.clone()], None);
        let mut b = ProcedureBuilder::begin_method("write_sample_dto", signature, options);
        let writer = Operand::from(b.arg(0)?);
        let dto = b.arg(1)?;
        let text = b.declare_local(&TypeDesc::string(), "text")?;
        let text_op = Operand::from(&text);

        b.if_compare(&dto, Cmp::EqualTo, Constant::Null)?;
        write_element(&mut b, shapes, &writer, "nil", &"true".into())?;
        b.begin_else()?;

        b.load(&dto)?;
        b.load_member(&member(&shapes.dto, "Name"))?;
        b.store(&text)?;
        write_element(&mut b, shapes, &writer, "Name", &text_op)?;

        b.load(&dto)?;
        let age = b.load_member(&member(&shapes.dto, "Age"))?;
        b.to_string(&age)?;
        b.store(&text)?;
        write_element(&mut b, shapes, &writer, "Age", &text_op)?;

        let tags_ty = TypeDesc::array_of(i32_ty());
        let tags = b.declare_local(&tags_ty, "tags")?;
        let i = b.declare_local(&i32_ty(), "i")?;
        b.load(&dto)?;
        b.load_member(&member(&shapes.dto, "Tags"))?;
        b.store(&tags)?;
        b.if_not_default_value(&tags)?;
        b.for_loop(Some(&i), 0_i32, &tags)?;
        b.load_array_element(&tags, &i)?;
        b.to_string(&i32_ty())?;
        b.store(&text)?;
        write_element(&mut b, shapes, &writer, "int", &text_op)?;
        b.end_for()?;
        b.end_if()?;

        b.load(&dto)?;
        let active = b.load_member(&member(&shapes.dto, "Active"))?;
        b.to_string(&active)?;
        b.store(&text)?;
        write_element(&mut b, shapes, &writer, "Active", &text_op)?;

        b.end_if()?;
        b.ret()?;
        b.end_method()
    }

    /// Reads a dto from its element texts: name, age and the tag values.
    fn build_reader(shapes: &Shapes) -> Result<Procedure, EmitError> {
        let texts_ty = TypeDesc::array_of(TypeDesc::string());
        let signature = Signature::new(vec![texts_ty], Some(shapes.dto.clone()));
        let mut b = ProcedureBuilder::begin_method("read_sample_dto", signature, EmitOptions::default());
        let texts = b.arg(0)?;
        let obj = b.declare_local(&shapes.dto, "o")?;
        b.new_object(&ConstructorDesc::default_for(shapes.dto.clone()), &[])?;
        b.stloc(&obj)?;

        b.load(&obj)?;
        b.load_array_element(&texts, 0_i32)?;
        b.store_member(&member(&shapes.dto, "Name"))?;

        b.load(&obj)?;
        b.load_array_element(&texts, 1_i32)?;
        b.call(&shapes.parse_int)?;
        b.store_member(&member(&shapes.dto, "Age"))?;

        let count = b.declare_local(&i32_ty(), "count")?;
        b.load(&texts)?;
        b.ldlen()?;
        b.ldc(2_i32)?;
        b.subtract()?;
        b.stloc(&count)?;
        let tags = b.declare_local(&TypeDesc::array_of(i32_ty()), "tags")?;
        b.new_array(&i32_ty(), &count)?;
        b.stloc(&tags)?;

        let i = b.declare_local(&i32_ty(), "i")?;
        b.for_loop(Some(&i), 2_i32, &texts)?;
        b.ldloc(&tags)?;
        b.ldloc(&i)?;
        b.ldc(2_i32)?;
        b.subtract()?;
        b.load_array_element(&texts, &i)?;
        b.call(&shapes.parse_int)?;
        b.stelem(&i32_ty())?;
        b.end_for()?;

        b.load(&obj)?;
        b.load(&tags)?;
        b.store_member(&member(&shapes.dto, "Tags"))?;

        b.load(&obj)?;
        b.ldc(true)?;
        b.store_member(&member(&shapes.dto, "Active"))?;

        b.load(&obj)?;
        b.ret()?;
        b.end_method()
    }

    fn texts(items: &[&str]) -> Value {
        let values = items.iter().map(|s| Value::from(*s)).collect();
        Value::Array(ArrayRef::from_values(TypeDesc::string(), values))
    }

    fn write(procedure: &Procedure, shapes: &Shapes, dto: Value) -> String {
        let writer = ObjectRef::new(shapes.writer.clone());
        procedure.invoke(&[Value::Object(writer.clone()), dto]).unwrap();
        writer.get("out").map(|v| v.to_string()).unwrap_or_default()
    }

    // -------------------------------------------------------------------------
    // Tests

    #[test]
    fn read_then_write_round_trips() {
        let shapes = shapes();
        let reader = build_reader(&shapes).unwrap();
        let writer = build_writer(&shapes, EmitOptions::default()).unwrap();

        let dto = reader.invoke(&[texts(&["Ada", "36", "7", "-8"])]).unwrap();
        assert_eq!(
            serde_json::to_value(&dto).unwrap(),
            json!({ "Name": "Ada", "Age": 36, "Tags": [7, -8], "Active": true })
        );
        assert_eq!(
            write(&writer, &shapes, dto),
            "<Name>Ada</Name><Age>36</Age><int>7</int><int>-8</int><Active>True</Active>"
        );
    }

    #[test]
    fn writer_handles_nulls() {
        let shapes = shapes();
        let writer = build_writer(&shapes, EmitOptions::default()).unwrap();
        assert_eq!(write(&writer, &shapes, Value::Null), "<nil>true</nil>");

        // null name and no tags
        let dto = ObjectRef::new(shapes.dto.clone());
        dto.set("Age", Value::I32(-1));
        assert_eq!(
            write(&writer, &shapes, Value::Object(dto)),
            "<Name></Name><Age>-1</Age><Active>False</Active>"
        );
    }

    #[test]
    fn bad_input_fails_at_run_time() {
        let shapes = shapes();
        let reader = build_reader(&shapes).unwrap();
        assert!(matches!(
            reader.invoke(&[texts(&["Ada", "many"])]),
            Err(InvokeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            reader.invoke(&[texts(&["Ada"])]),
            Err(InvokeError::IndexOutOfRange { index: 1, len: 1 })
        ));
        assert_eq!(
            reader.invoke(&[]).map(|_| ()),
            Err(InvokeError::ArgumentCount { expected: 1, found: 0 })
        );
    }

    #[test]
    fn cached_procedures_serve_many_threads() {
        let shapes = shapes();
        let cache = ProcedureCache::new();
        let builds = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for n in 0..8 {
                let (shapes, cache, builds) = (&shapes, &cache, &builds);
                scope.spawn(move || {
                    let reader = cache
                        .get_or_build("read:demo::SampleDto", || {
                            builds.fetch_add(1, Ordering::Relaxed);
                            build_reader(shapes)
                        })
                        .unwrap();
                    let writer = cache
                        .get_or_build("write:demo::SampleDto", || {
                            builds.fetch_add(1, Ordering::Relaxed);
                            build_writer(shapes, EmitOptions::default())
                        })
                        .unwrap();
                    let age = n.to_string();
                    let dto = reader.invoke(&[texts(&["t", age.as_str(), age.as_str()])]).unwrap();
                    assert_eq!(
                        write(&writer, shapes, dto),
                        format!("<Name>t</Name><Age>{n}</Age><int>{n}</int><Active>True</Active>")
                    );
                });
            }
        });

        assert_eq!(cache.len(), 2);
        // racing threads may build the same shape more than once
        assert!(builds.load(Ordering::Relaxed) >= 2);
    }

    #[cfg(feature = "trace")]
    #[test]
    fn traced_writer_matches_untraced() {
        use alloc::string::String;
        use alloc::sync::Arc;

        use crate::emit::{MemorySink, TraceLevel};

        let shapes = shapes();
        let sink = Arc::new(MemorySink::new());
        let options = EmitOptions::default().with_trace(TraceLevel::Full).with_sink(sink.clone());
        let traced = build_writer(&shapes, options).unwrap();
        let plain = build_writer(&shapes, EmitOptions::default().with_trace(TraceLevel::Off)).unwrap();

        let dto = || {
            let dto = ObjectRef::new(shapes.dto.clone());
            dto.set("Name", Value::from("x"));
            Value::Object(dto)
        };
        assert_eq!(write(&traced, &shapes, dto()), write(&plain, &shapes, dto()));

        let lines = sink.lines();
        assert_eq!(lines.first().map(String::as_str), Some("Begin method write_sample_dto {"));
        assert!(lines.iter().any(|line| line == "} End method"));
        assert!(sink.runtime_lines().iter().any(|line| line == "//value = x"));
    }
}
