use crs_types::InvokeError;
use crs_types::info::Primitive;
use crs_types::value::{Place, Value};

// -----------------------------------------------------------------------------
// Frame

/// The mutable state of one procedure invocation.
#[derive(Debug)]
pub(crate) struct Frame {
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

/// Truncates a primitive value into the kind of its destination slot.
#[inline]
pub(crate) fn normalize(value: Value, kind: Option<Primitive>) -> Result<Value, InvokeError> {
    match kind {
        Some(kind) if value.primitive().is_some() => value.convert_to(kind),
        _ => Ok(value),
    }
}

#[inline]
fn slot(slots: &mut [Value], index: u32) -> Result<&mut Value, InvokeError> {
    let len = slots.len();
    slots
        .get_mut(index as usize)
        .ok_or(InvokeError::IndexOutOfRange {
            index: index as i64,
            len,
        })
}

impl Frame {
    pub fn new(args: Vec<Value>, locals: Vec<Value>) -> Self {
        Self {
            args,
            locals,
            stack: Vec::with_capacity(8),
        }
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Value, InvokeError> {
        self.stack.pop().ok_or(InvokeError::StackUnderflow)
    }

    /// Pops `n` values, returned in push order.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, InvokeError> {
        let len = self.stack.len();
        if n > len {
            return Err(InvokeError::StackUnderflow);
        }
        Ok(self.stack.split_off(len - n))
    }

    #[inline]
    pub fn peek(&self) -> Result<&Value, InvokeError> {
        self.stack.last().ok_or(InvokeError::StackUnderflow)
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn arg(&mut self, index: u32) -> Result<&mut Value, InvokeError> {
        slot(&mut self.args, index)
    }

    pub fn local(&mut self, index: u32) -> Result<&mut Value, InvokeError> {
        slot(&mut self.locals, index)
    }

    /// Reads the value stored at `place`.
    pub fn load(&mut self, place: &Place) -> Result<Value, InvokeError> {
        match place {
            Place::Arg(i) => self.arg(*i).map(|v| v.clone()),
            Place::Local(i) => self.local(*i).map(|v| v.clone()),
            Place::Element(array, i) => array.get(*i as i64),
            Place::Boxed(b) => Ok(b.get()),
        }
    }

    /// Writes `value` to `place`.
    pub fn store(&mut self, place: &Place, value: Value) -> Result<(), InvokeError> {
        match place {
            Place::Arg(i) => *self.arg(*i)? = value,
            Place::Local(i) => *self.local(*i)? = value,
            Place::Element(array, i) => array.set(*i as i64, value)?,
            Place::Boxed(b) => b.set(value),
        }
        Ok(())
    }

    /// Reads through an address, any other value is returned as is.
    pub fn deref(&mut self, value: Value) -> Result<Value, InvokeError> {
        match value {
            Value::Address(place) => self.load(&place),
            other => Ok(other),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
