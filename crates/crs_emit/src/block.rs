//! Bookkeeping for open structured constructs.
//!
//! Every `begin`-style emission call pushes a [`Block`] and every `end`-style
//! call pops the kind it expects. A mismatch (or an empty stack) is a
//! [`StructuralMismatch`](EmitError::StructuralMismatch).

use crate::operand::{LocalSlot, Operand};
use crate::{EmitError, Label};

// -----------------------------------------------------------------------------
// ForHandle

/// Identifies a `for` or `foreach` loop for the break family.
///
/// Returned by [`for_loop`] and [`for_each`], held by the caller for as
/// long as the loop is open.
///
/// [`for_loop`]: crate::ProcedureBuilder::for_loop
/// [`for_each`]: crate::ProcedureBuilder::for_each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForHandle {
    pub(crate) session: u32,
    pub(crate) id: u32,
}

// -----------------------------------------------------------------------------
// Block

/// State of an open loop. The end label is only allocated once a break
/// targets the loop.
#[derive(Debug, Clone)]
pub(crate) struct ForState {
    pub handle: ForHandle,
    pub index: Option<LocalSlot>,
    pub begin: Label,
    pub test: Label,
    pub end_label: Option<Label>,
    /// The upper bound of a `for`, the enumerator of a `foreach`.
    pub bound: Operand,
}

#[derive(Debug, Clone)]
pub(crate) enum Block {
    /// `else_label == end_label` once an `else` branch was opened.
    If { else_label: Label, end_label: Label },
    For(ForState),
    ForEach(ForState),
    Switch {
        default_label: Label,
        end_label: Label,
        default_defined: bool,
    },
    /// Holds the loop-head label.
    While(Label),
}

impl Block {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::If { .. } => "if",
            Self::For(_) => "for",
            Self::ForEach(_) => "foreach",
            Self::Switch { .. } => "switch",
            Self::While(_) => "while",
        }
    }
}

// -----------------------------------------------------------------------------
// BlockStack

const EMPTY: &str = "empty block stack";

#[derive(Debug, Default)]
pub(crate) struct BlockStack {
    blocks: Vec<Block>,
}

#[inline]
fn mismatch(expected: &'static str, found: Option<&Block>) -> EmitError {
    EmitError::StructuralMismatch {
        expected,
        found: found.map_or(EMPTY, Block::name),
    }
}

impl BlockStack {
    #[inline]
    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn top(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Pops the top record, which must be an `if`. Returns `(else, end)`.
    pub fn pop_if(&mut self) -> Result<(Label, Label), EmitError> {
        match self.blocks.pop() {
            Some(Block::If {
                else_label,
                end_label,
            }) => Ok((else_label, end_label)),
            other => Err(mismatch("if", other.as_ref())),
        }
    }

    pub fn pop_for(&mut self) -> Result<ForState, EmitError> {
        match self.blocks.pop() {
            Some(Block::For(state)) => Ok(state),
            other => Err(mismatch("for", other.as_ref())),
        }
    }

    pub fn pop_for_each(&mut self) -> Result<ForState, EmitError> {
        match self.blocks.pop() {
            Some(Block::ForEach(state)) => Ok(state),
            other => Err(mismatch("foreach", other.as_ref())),
        }
    }

    pub fn pop_while(&mut self) -> Result<Label, EmitError> {
        match self.blocks.pop() {
            Some(Block::While(head)) => Ok(head),
            other => Err(mismatch("while", other.as_ref())),
        }
    }

    /// Pops the top record, which must be a `switch`.
    /// Returns `(default, end, default_defined)`.
    pub fn pop_switch(&mut self) -> Result<(Label, Label, bool), EmitError> {
        match self.blocks.pop() {
            Some(Block::Switch {
                default_label,
                end_label,
                default_defined,
            }) => Ok((default_label, end_label, default_defined)),
            other => Err(mismatch("switch", other.as_ref())),
        }
    }

    /// Borrows the innermost `switch` without popping it.
    /// Returns `(default, end, default_defined)`.
    pub fn peek_switch(&mut self) -> Result<(Label, Label, &mut bool), EmitError> {
        match self.blocks.last_mut() {
            Some(Block::Switch {
                default_label,
                end_label,
                default_defined,
            }) => Ok((*default_label, *end_label, default_defined)),
            other => Err(mismatch("switch", other.map(|b| &*b))),
        }
    }

    /// Finds the loop identified by `handle` anywhere on the stack and
    /// returns its end label, allocating it with `define` on first use.
    pub fn break_target(
        &mut self,
        handle: ForHandle,
        define: impl FnOnce() -> Label,
    ) -> Result<Label, EmitError> {
        let found = self.blocks.iter_mut().rev().find_map(|block| match block {
            Block::For(state) | Block::ForEach(state) if state.handle == handle => Some(state),
            _ => None,
        });
        match found {
            Some(state) => Ok(*state.end_label.get_or_insert_with(define)),
            None => Err(EmitError::StructuralMismatch {
                expected: "for",
                found: self.blocks.last().map_or(EMPTY, Block::name),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{Block, BlockStack, ForHandle, ForState};
    use crate::EmitError;
    use crate::label::LabelTable;
    use crate::operand::Operand;

    fn handle(labels: &LabelTable, id: u32) -> ForHandle {
        ForHandle {
            session: labels.session(),
            id,
        }
    }

    fn for_state(labels: &mut LabelTable, id: u32) -> ForState {
        ForState {
            handle: handle(labels, id),
            index: None,
            begin: labels.define(),
            test: labels.define(),
            end_label: None,
            bound: Operand::from(0_i32),
        }
    }

    #[test]
    fn typed_pops_report_the_top() {
        let mut labels = LabelTable::default();
        let mut stack = BlockStack::default();

        assert_eq!(
            stack.pop_for().unwrap_err(),
            EmitError::StructuralMismatch {
                expected: "for",
                found: "empty block stack"
            }
        );

        stack.push(Block::While(labels.define()));
        assert_eq!(
            stack.pop_if().unwrap_err(),
            EmitError::StructuralMismatch {
                expected: "if",
                found: "while"
            }
        );
        // the failed pop consumed the record
        assert_eq!(stack.len(), 0);

        stack.push(Block::For(for_state(&mut labels, 0)));
        assert!(matches!(
            stack.pop_for_each(),
            Err(EmitError::StructuralMismatch { expected: "foreach", found: "for" })
        ));
    }

    #[test]
    fn break_skips_intervening_blocks() {
        let mut labels = LabelTable::default();
        let mut stack = BlockStack::default();
        stack.push(Block::For(for_state(&mut labels, 7)));
        stack.push(Block::If {
            else_label: labels.define(),
            end_label: labels.define(),
        });

        let seven = handle(&labels, 7);
        let first = stack.break_target(seven, || labels.define()).unwrap();
        let again = stack.break_target(seven, || labels.define()).unwrap();
        assert_eq!(first, again);

        let eight = handle(&labels, 8);
        assert!(stack.break_target(eight, || labels.define()).is_err());

        // same loop number, other session
        let foreign = handle(&LabelTable::default(), 7);
        assert!(matches!(
            stack.break_target(foreign, || labels.define()),
            Err(EmitError::StructuralMismatch { expected: "for", found: "if" })
        ));
    }

    #[test]
    fn switch_peek_keeps_record() {
        let mut labels = LabelTable::default();
        let mut stack = BlockStack::default();
        let (default_label, end_label) = (labels.define(), labels.define());
        stack.push(Block::Switch {
            default_label,
            end_label,
            default_defined: false,
        });

        let (_, _, defined) = stack.peek_switch().unwrap();
        *defined = true;
        assert_eq!(stack.pop_switch().unwrap(), (default_label, end_label, true));
    }
}
