//! Resolved member accessors handed to the emitter.
//!
//! The emitter never inspects a type to find members: a schema layer
//! resolves fields, properties, methods and constructors once and passes
//! these descriptors in. Method and constructor bodies are opaque host
//! callables.

use alloc::borrow::Cow;
use alloc::sync::Arc;
use core::fmt;
use std::sync::Mutex;

use crate::InvokeError;
use crate::info::TypeDesc;
use crate::value::{ObjectRef, Value, lock};

/// The body of a host method or constructor.
///
/// For instance methods `args[0]` is the receiver, followed by the declared
/// parameters. Constructors receive the fresh instance in `args[0]` and may
/// replace it. The returned value is ignored for `void` methods.
pub type HostFn = Arc<dyn Fn(&mut [Value]) -> Result<Value, InvokeError> + Send + Sync>;

// -----------------------------------------------------------------------------
// Signature

/// The argument and return types of a procedure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub args: Vec<TypeDesc>,
    pub ret: Option<TypeDesc>,
}

impl Signature {
    #[inline]
    pub fn new(args: Vec<TypeDesc>, ret: Option<TypeDesc>) -> Self {
        Self { args, ret }
    }
}

// -----------------------------------------------------------------------------
// MethodDesc

struct MethodData {
    declaring: TypeDesc,
    name: Cow<'static, str>,
    params: Vec<TypeDesc>,
    ret: Option<TypeDesc>,
    is_static: bool,
    func: HostFn,
}

/// A resolved method.
#[derive(Clone)]
pub struct MethodDesc(Arc<MethodData>);

impl MethodDesc {
    /// An instance method of `declaring`; `f` receives the receiver first.
    pub fn instance<F>(
        declaring: TypeDesc,
        name: impl Into<Cow<'static, str>>,
        params: Vec<TypeDesc>,
        ret: Option<TypeDesc>,
        f: F,
    ) -> Self
    where
        F: Fn(&mut [Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self::build(declaring, name.into(), params, ret, false, Arc::new(f))
    }

    /// A static method.
    pub fn static_fn<F>(
        declaring: TypeDesc,
        name: impl Into<Cow<'static, str>>,
        params: Vec<TypeDesc>,
        ret: Option<TypeDesc>,
        f: F,
    ) -> Self
    where
        F: Fn(&mut [Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self::build(declaring, name.into(), params, ret, true, Arc::new(f))
    }

    fn build(
        declaring: TypeDesc,
        name: Cow<'static, str>,
        params: Vec<TypeDesc>,
        ret: Option<TypeDesc>,
        is_static: bool,
        func: HostFn,
    ) -> Self {
        Self(Arc::new(MethodData {
            declaring,
            name,
            params,
            ret,
            is_static,
            func,
        }))
    }

    #[inline]
    pub fn declaring(&self) -> &TypeDesc {
        &self.0.declaring
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Declared parameter types, excluding the receiver.
    #[inline]
    pub fn params(&self) -> &[TypeDesc] {
        &self.0.params
    }

    /// Declared return type, `None` for `void`.
    #[inline]
    pub fn ret(&self) -> Option<&TypeDesc> {
        self.0.ret.as_ref()
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        self.0.is_static
    }

    /// Instance methods on reference types dispatch virtually.
    #[inline]
    pub fn is_virtual(&self) -> bool {
        !self.0.is_static && self.0.declaring.is_reference_type()
    }

    /// Number of values the call consumes, receiver included.
    #[inline]
    pub fn arg_count(&self) -> usize {
        self.0.params.len() + usize::from(!self.0.is_static)
    }

    /// Runs the host body.
    #[inline]
    pub fn invoke(&self, args: &mut [Value]) -> Result<Value, InvokeError> {
        (self.0.func)(args)
    }
}

impl fmt::Debug for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDesc")
            .field("declaring", &self.0.declaring)
            .field("name", &self.0.name)
            .field("params", &self.0.params)
            .field("ret", &self.0.ret)
            .field("is_static", &self.0.is_static)
            .finish_non_exhaustive()
    }
}

/// Formats as `ret name(params)`, e.g. `string to_string()`.
impl fmt::Display for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.ret {
            Some(ret) => write!(f, "{ret} {}(", self.0.name)?,
            None => write!(f, "void {}(", self.0.name)?,
        }
        write_params(f, &self.0.params)?;
        f.write_str(")")
    }
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[TypeDesc]) -> fmt::Result {
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt::Display::fmt(param, f)?;
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// ConstructorDesc

/// A resolved constructor.
#[derive(Clone)]
pub struct ConstructorDesc {
    declaring: TypeDesc,
    params: Vec<TypeDesc>,
    func: HostFn,
}

impl ConstructorDesc {
    pub fn new<F>(declaring: TypeDesc, params: Vec<TypeDesc>, f: F) -> Self
    where
        F: Fn(&mut [Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    {
        Self {
            declaring,
            params,
            func: Arc::new(f),
        }
    }

    /// The parameterless constructor that leaves every field at its default.
    pub fn default_for(declaring: TypeDesc) -> Self {
        Self::new(declaring, Vec::new(), |_| Ok(Value::Null))
    }

    #[inline]
    pub fn declaring(&self) -> &TypeDesc {
        &self.declaring
    }

    #[inline]
    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    /// Allocates a default instance, runs the body over
    /// `[instance, params...]` and returns the instance.
    pub fn construct(&self, params: Vec<Value>) -> Result<Value, InvokeError> {
        let instance = match Value::default_of(&self.declaring) {
            Value::Null => Value::Object(ObjectRef::new(self.declaring.clone())),
            value => value,
        };
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(instance);
        args.extend(params);
        (self.func)(&mut args)?;
        Ok(args.swap_remove(0))
    }
}

impl fmt::Debug for ConstructorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDesc")
            .field("declaring", &self.declaring)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConstructorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("void .ctor(")?;
        write_params(f, &self.params)?;
        f.write_str(")")
    }
}

// -----------------------------------------------------------------------------
// FieldDesc

/// Where a field lives.
#[derive(Debug, Clone)]
pub enum FieldStorage {
    /// A slot in every instance, see [`TypeDesc::fields`].
    Instance(usize),
    /// A single shared cell.
    Static(Arc<Mutex<Value>>),
}

/// A resolved field.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    declaring: TypeDesc,
    name: Cow<'static, str>,
    ty: TypeDesc,
    storage: FieldStorage,
}

impl FieldDesc {
    /// Resolves the instance field `name` declared (or inherited) by `declaring`.
    pub fn instance(declaring: &TypeDesc, name: &str) -> Option<Self> {
        let slot = declaring.field_index(name)?;
        let field = &declaring.fields()[slot];
        Some(Self {
            declaring: declaring.clone(),
            name: field.name.clone(),
            ty: field.ty.clone(),
            storage: FieldStorage::Instance(slot),
        })
    }

    /// A static field with its own storage cell.
    pub fn static_field(
        declaring: TypeDesc,
        name: impl Into<Cow<'static, str>>,
        ty: TypeDesc,
        initial: Value,
    ) -> Self {
        Self {
            declaring,
            name: name.into(),
            ty,
            storage: FieldStorage::Static(Arc::new(Mutex::new(initial))),
        }
    }

    #[inline]
    pub fn declaring(&self) -> &TypeDesc {
        &self.declaring
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> &TypeDesc {
        &self.ty
    }

    #[inline]
    pub fn storage(&self) -> &FieldStorage {
        &self.storage
    }

    #[inline]
    pub fn is_static(&self) -> bool {
        matches!(self.storage, FieldStorage::Static(_))
    }

    /// Reads a static field, `None` for instance fields.
    pub fn read_static(&self) -> Option<Value> {
        match &self.storage {
            FieldStorage::Static(cell) => Some(lock(cell).clone()),
            FieldStorage::Instance(_) => None,
        }
    }

    /// Writes a static field, returns `false` for instance fields.
    pub fn write_static(&self, value: Value) -> bool {
        match &self.storage {
            FieldStorage::Static(cell) => {
                *lock(cell) = value;
                true
            }
            FieldStorage::Instance(_) => false,
        }
    }
}

impl fmt::Display for FieldDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)
    }
}

// -----------------------------------------------------------------------------
// PropertyDesc

/// A resolved property: an optional getter and setter pair.
#[derive(Debug, Clone)]
pub struct PropertyDesc {
    pub declaring: TypeDesc,
    pub name: Cow<'static, str>,
    pub ty: TypeDesc,
    pub getter: Option<MethodDesc>,
    pub setter: Option<MethodDesc>,
}

// -----------------------------------------------------------------------------
// MemberDesc

/// A data member a procedure reads or writes.
#[derive(Debug, Clone)]
pub enum MemberDesc {
    Field(FieldDesc),
    Property(PropertyDesc),
    Method(MethodDesc),
}

impl MemberDesc {
    pub fn name(&self) -> &str {
        match self {
            Self::Field(f) => f.name(),
            Self::Property(p) => &p.name,
            Self::Method(m) => m.name(),
        }
    }

    pub fn declaring(&self) -> &TypeDesc {
        match self {
            Self::Field(f) => f.declaring(),
            Self::Property(p) => &p.declaring,
            Self::Method(m) => m.declaring(),
        }
    }

    /// The type a read of the member produces.
    pub fn ty(&self) -> Option<&TypeDesc> {
        match self {
            Self::Field(f) => Some(f.ty()),
            Self::Property(p) => Some(&p.ty),
            Self::Method(m) => m.ret(),
        }
    }

    /// Returns `true` when reading the member needs no receiver.
    pub fn is_static(&self) -> bool {
        match self {
            Self::Field(f) => f.is_static(),
            Self::Property(p) => p
                .getter
                .as_ref()
                .or(p.setter.as_ref())
                .is_some_and(MethodDesc::is_static),
            Self::Method(m) => m.is_static(),
        }
    }
}

impl From<FieldDesc> for MemberDesc {
    fn from(value: FieldDesc) -> Self {
        Self::Field(value)
    }
}

impl From<PropertyDesc> for MemberDesc {
    fn from(value: PropertyDesc) -> Self {
        Self::Property(value)
    }
}

impl From<MethodDesc> for MemberDesc {
    fn from(value: MethodDesc) -> Self {
        Self::Method(value)
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{ConstructorDesc, FieldDesc, MemberDesc, MethodDesc};
    use crate::info::{Primitive, TypeDesc};
    use crate::value::Value;

    fn counter_ty() -> TypeDesc {
        TypeDesc::class("demo::Counter")
            .field("count", TypeDesc::primitive(Primitive::I32))
            .build()
    }

    #[test]
    fn method_metadata() {
        let ty = counter_ty();
        let get = MethodDesc::instance(
            ty.clone(),
            "get_Count",
            vec![],
            Some(TypeDesc::primitive(Primitive::I32)),
            |args| match &args[0] {
                Value::Object(o) => o.field(0),
                other => Err(crate::InvokeError::mismatch("object", other)),
            },
        );
        assert_eq!(get.arg_count(), 1);
        assert!(get.is_virtual());
        assert_eq!(get.to_string(), "i32 get_Count()");

        let counter = ctor(&ty);
        let mut args = [counter];
        assert!(matches!(get.invoke(&mut args), Ok(Value::I32(0))));

        let parse = MethodDesc::static_fn(ty, "Parse", vec![TypeDesc::string()], None, |_| {
            Ok(Value::Null)
        });
        assert_eq!(parse.arg_count(), 1);
        assert!(!parse.is_virtual());
        assert_eq!(parse.to_string(), "void Parse(string)");
        assert!(MemberDesc::from(parse).is_static());
    }

    fn ctor(ty: &TypeDesc) -> Value {
        ConstructorDesc::default_for(ty.clone())
            .construct(Vec::new())
            .unwrap()
    }

    #[test]
    fn constructor_runs_body_on_instance() {
        let ty = counter_ty();
        let ctor = ConstructorDesc::new(ty, vec![TypeDesc::primitive(Primitive::I32)], |args| {
            let start = args[1].clone();
            if let Value::Object(o) = &args[0] {
                o.set_field(0, start)?;
            }
            Ok(Value::Null)
        });
        let made = ctor.construct(vec![Value::I32(9)]).unwrap();
        match made {
            Value::Object(o) => assert!(matches!(o.get("count"), Some(Value::I32(9)))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fields_resolve_slots() {
        let ty = counter_ty();
        let field = FieldDesc::instance(&ty, "count").unwrap();
        assert!(!field.is_static());
        assert_eq!(field.ty(), &TypeDesc::primitive(Primitive::I32));
        assert!(FieldDesc::instance(&ty, "nope").is_none());

        let shared = FieldDesc::static_field(ty, "Instances", TypeDesc::primitive(Primitive::I32), Value::I32(1));
        assert!(shared.write_static(Value::I32(2)));
        assert!(matches!(shared.read_static(), Some(Value::I32(2))));
        assert!(field.read_static().is_none());
    }
}
