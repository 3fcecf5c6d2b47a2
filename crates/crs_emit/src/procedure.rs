use alloc::sync::Arc;
use core::fmt;

use crs_types::InvokeError;
use crs_types::info::TypeDesc;
use crs_types::member::Signature;
use crs_types::value::Value;

use crate::frame::{Frame, normalize};
use crate::lower::{Flow, Step};

// -----------------------------------------------------------------------------
// Procedure

struct ProcedureData {
    name: String,
    signature: Signature,
    locals: Vec<TypeDesc>,
    steps: Vec<Step>,
}

/// A finalized, immutable procedure.
///
/// Cloning is cheap and every clone shares the same code. Invocations are
/// independent of each other and may run on any number of threads at once.
#[derive(Clone)]
pub struct Procedure(Arc<ProcedureData>);

impl Procedure {
    pub(crate) fn new(name: String, signature: Signature, locals: Vec<TypeDesc>, steps: Vec<Step>) -> Self {
        Self(Arc::new(ProcedureData {
            name,
            signature,
            locals,
            steps,
        }))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.0.signature
    }

    /// Number of executable steps.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.steps.len()
    }

    /// Runs the procedure with `args` bound to its parameters.
    ///
    /// Arguments are truncated into their declared primitive kinds, locals
    /// start at the default value of their type. A procedure without a
    /// return type yields [`Value::Null`].
    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        let data = &*self.0;
        let expected = data.signature.args.len();
        if args.len() != expected {
            return Err(InvokeError::ArgumentCount {
                expected,
                found: args.len(),
            });
        }

        let args = args
            .iter()
            .zip(&data.signature.args)
            .map(|(value, ty)| normalize(value.clone(), ty.primitive_kind()))
            .collect::<Result<Vec<_>, _>>()?;
        let locals = data.locals.iter().map(Value::default_of).collect();
        let mut frame = Frame::new(args, locals);

        let mut pc = 0;
        while let Some(step) = data.steps.get(pc) {
            match step(&mut frame)? {
                Flow::Next => pc += 1,
                Flow::Jump(to) => pc = to,
                Flow::Return(value) => return Ok(value),
            }
        }
        Ok(Value::Null)
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.0.name)
            .field("signature", &self.0.signature)
            .field("locals", &self.0.locals.len())
            .field("steps", &self.0.steps.len())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::Procedure;
    use crate::instr::Instr;
    use crate::label::LabelTable;
    use crate::lower::lower;
    use crs_types::InvokeError;
    use crs_types::info::{Primitive, TypeDesc};
    use crs_types::member::Signature;
    use crs_types::value::Value;

    fn identity_i8() -> Procedure {
        let i8_ty = TypeDesc::primitive(Primitive::I8);
        let signature = Signature::new(vec![i8_ty.clone()], Some(i8_ty.clone()));
        let steps = lower(vec![Instr::Ldarg(0), Instr::Ret], &LabelTable::default(), Some(&i8_ty)).unwrap();
        Procedure::new("identity".into(), signature, vec![], steps)
    }

    #[test]
    fn is_send_and_sync() {
        fn check<T: Send + Sync + Clone + 'static>() {}
        check::<Procedure>();
    }

    #[test]
    fn arguments_are_checked_and_truncated() {
        let procedure = identity_i8();
        assert!(matches!(procedure.invoke(&[Value::I32(300)]), Ok(Value::I8(44))));
        assert!(matches!(
            procedure.invoke(&[]),
            Err(InvokeError::ArgumentCount { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn empty_body_returns_null() {
        let procedure = Procedure::new("empty".into(), Signature::new(vec![], None), vec![], vec![]);
        assert!(matches!(procedure.invoke(&[]), Ok(Value::Null)));
        assert_eq!(procedure.len(), 0);
    }
}
