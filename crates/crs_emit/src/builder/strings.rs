use crs_types::info::{Primitive, TypeDesc};

use crate::operand::{Constant, Operand};
use crate::trace::TraceLevel;
use crate::{EmitError, intrinsics};

use super::session::Session;

impl Session {
    pub fn to_string(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        if ty.is_string() {
            return Ok(());
        }
        if ty.is_value_type() {
            self.box_value(ty)?;
        }
        self.call(&intrinsics::object_to_string())
    }

    /// Nulls print as `<null>`, arrays as `{ a, b, }` with every element
    /// formatted recursively.
    pub fn to_debuggable_string(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        if ty.is_value_type() {
            self.box_value(ty)?;
            return self.call(&intrinsics::object_to_string());
        }

        let string = TypeDesc::string();
        self.dup()?;
        self.ldnull()?;
        self.if_cmp(crate::Cmp::EqualTo)?;
        self.pop()?;
        self.ldstr("<null>")?;
        self.begin_else()?;

        if ty.is_array() {
            let element = ty.element()?.clone();
            let array = self.declare_local(ty, "arrayVar")?;
            self.store(&array)?;
            self.ldstr("{ ")?;
            let text = self.declare_local(&string, "arrayValueString")?;
            self.store(&text)?;
            let i = self.declare_local(&TypeDesc::primitive(Primitive::I32), "i")?;

            self.for_loop(Some(&i), Constant::I32(0), &array)?;
            self.load(&text)?;
            self.load_array_element(&array, &i)?;
            self.to_debuggable_string(&element)?;
            self.ldstr(", ")?;
            self.concat3()?;
            self.store(&text)?;
            self.end_for()?;

            self.load(&text)?;
            self.ldstr("}")?;
            self.concat2()?;
        } else {
            self.call(&intrinsics::object_to_string())?;
        }

        self.end_if()
    }

    #[inline]
    pub fn concat2(&mut self) -> Result<(), EmitError> {
        self.call(&intrinsics::string_concat2())
    }

    #[inline]
    pub fn concat3(&mut self) -> Result<(), EmitError> {
        self.call(&intrinsics::string_concat3())
    }

    pub fn call_string_format(&mut self, msg: &str, values: &[Operand]) -> Result<(), EmitError> {
        let object = TypeDesc::object();
        self.new_array(&object, Constant::I32(values.len() as i32))?;
        let array = match &self.string_format_array {
            Some(array) => array.clone(),
            None => {
                let array = self.declare_local(&TypeDesc::array_of(object), "stringFormatArray")?;
                self.string_format_array = Some(array.clone());
                array
            }
        };
        self.stloc(&array)?;
        for (i, value) in values.iter().enumerate() {
            self.store_array_element(&array, Constant::I32(i as i32), value)?;
        }
        self.ldstr(msg)?;
        self.ldloc(&array)?;
        self.call(&intrinsics::string_format())
    }

    /// At full trace, writes the formatted value on top of the stack to the
    /// trace sink when the procedure runs. The stack is left as it was.
    pub(super) fn stack_top(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        if self.trace != TraceLevel::Full {
            return Ok(());
        }
        self.trace = TraceLevel::Off;
        let result = self.dump_stack_top(ty);
        self.trace = TraceLevel::Full;
        result
    }

    fn dump_stack_top(&mut self, ty: &TypeDesc) -> Result<(), EmitError> {
        self.dup()?;
        self.to_debuggable_string(ty)?;
        let top = self.declare_local(&TypeDesc::string(), "topValue")?;
        self.store(&top)?;
        self.ldstr("//value = ")?;
        self.load(&top)?;
        self.concat2()?;
        let trace = self.trace_method.clone();
        self.call(&trace)
    }
}

// -----------------------------------------------------------------------------
// Tests
