use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::EmitError;

// -----------------------------------------------------------------------------
// SessionId

static NEXT_SESSION: AtomicU32 = AtomicU32::new(1);

/// Stamps every label and loop handle so that a token issued by one
/// session is never mistaken for one of another session's.
#[inline]
pub(crate) fn next_session_id() -> u32 {
    NEXT_SESSION.fetch_add(1, Ordering::Relaxed)
}

// -----------------------------------------------------------------------------
// Label

/// An opaque branch target issued by [`define_label`].
///
/// A label is only meaningful to the session that defined it and must be
/// marked exactly once.
///
/// [`define_label`]: crate::ProcedureBuilder::define_label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    session: u32,
    id: u32,
}

impl Label {
    /// Position of the label within its session, as shown in transcripts.
    #[inline]
    pub const fn id(self) -> u32 {
        self.id
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.id)
    }
}

// -----------------------------------------------------------------------------
// LabelTable

/// Per-session label bookkeeping: where each label was marked and whether
/// any branch targets it.
pub(crate) struct LabelTable {
    session: u32,
    marks: Vec<Option<usize>>,
    referenced: Vec<bool>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LabelTable {
    /// Creates an empty table under a fresh session id.
    pub fn new() -> Self {
        Self {
            session: next_session_id(),
            marks: Vec::new(),
            referenced: Vec::new(),
        }
    }

    #[inline]
    pub const fn session(&self) -> u32 {
        self.session
    }

    #[inline]
    const fn label(&self, index: usize) -> Label {
        Label {
            session: self.session,
            id: index as u32,
        }
    }

    pub fn define(&mut self) -> Label {
        let label = self.label(self.marks.len());
        self.marks.push(None);
        self.referenced.push(false);
        label
    }

    #[inline]
    fn index(&self, label: Label) -> Result<usize, EmitError> {
        let index = label.id as usize;
        if label.session == self.session && index < self.marks.len() {
            Ok(index)
        } else {
            Err(EmitError::UnknownLabel(label))
        }
    }

    /// Binds `label` to the instruction at `position`.
    pub fn mark(&mut self, label: Label, position: usize) -> Result<(), EmitError> {
        let index = self.index(label)?;
        match self.marks[index] {
            Some(_) => Err(EmitError::LabelAlreadyMarked(label)),
            None => {
                self.marks[index] = Some(position);
                Ok(())
            }
        }
    }

    /// Records that a branch targets `label`.
    pub fn reference(&mut self, label: Label) -> Result<(), EmitError> {
        let index = self.index(label)?;
        self.referenced[index] = true;
        Ok(())
    }

    /// Fails with the first label that is targeted but unmarked.
    pub fn check_marked(&self) -> Result<(), EmitError> {
        match self
            .marks
            .iter()
            .zip(&self.referenced)
            .position(|(mark, used)| *used && mark.is_none())
        {
            Some(index) => Err(EmitError::LabelNotMarked(self.label(index))),
            None => Ok(()),
        }
    }

    /// Returns the instruction index a marked label resolves to.
    pub fn resolve(&self, label: Label) -> Result<usize, EmitError> {
        let index = self.index(label)?;
        self.marks[index].ok_or(EmitError::LabelNotMarked(label))
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::LabelTable;
    use crate::EmitError;

    #[test]
    fn mark_once() {
        let mut table = LabelTable::default();
        let a = table.define();
        let b = table.define();
        assert_ne!(a, b);

        table.mark(a, 3).unwrap();
        assert_eq!(table.mark(a, 4), Err(EmitError::LabelAlreadyMarked(a)));
        assert_eq!(table.resolve(a), Ok(3));
        assert_eq!(table.resolve(b), Err(EmitError::LabelNotMarked(b)));
    }

    #[test]
    fn referenced_labels_must_be_marked() {
        let mut table = LabelTable::default();
        let a = table.define();
        let _unused = table.define();
        assert!(table.check_marked().is_ok());

        table.reference(a).unwrap();
        assert_eq!(table.check_marked(), Err(EmitError::LabelNotMarked(a)));
        table.mark(a, 0).unwrap();
        assert!(table.check_marked().is_ok());
    }

    #[test]
    fn foreign_labels_are_rejected() {
        let mut other = LabelTable::default();
        other.define();
        let foreign = other.define();

        let mut table = LabelTable::default();
        assert_eq!(table.reference(foreign), Err(EmitError::UnknownLabel(foreign)));

        // same position, different table
        table.define();
        let twin = table.define();
        assert_eq!(twin.id(), foreign.id());
        assert_ne!(twin, foreign);
        assert_eq!(table.reference(foreign), Err(EmitError::UnknownLabel(foreign)));
        assert_eq!(table.mark(foreign, 0), Err(EmitError::UnknownLabel(foreign)));
        assert_eq!(table.resolve(foreign), Err(EmitError::UnknownLabel(foreign)));
        assert!(table.check_marked().is_ok());
    }
}
