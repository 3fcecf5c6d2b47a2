//! Structured control flow: conditionals, loops, breaks, switches and
//! while loops, all tracked on the session's block stack.

use crs_types::info::TypeDesc;
use crs_types::member::MethodDesc;

use crate::block::{Block, ForHandle, ForState};
use crate::instr::{Cmp, Instr};
use crate::operand::{Constant, LocalSlot, Operand};
use crate::{EmitError, Label, intrinsics};

use super::session::Session;

impl Session {
    // -------------------------------------------------------------------------
    // If

    /// Branches to a fresh else label unless `cmp` holds.
    fn branch_unless(&mut self, cmp: Cmp) -> Result<Label, EmitError> {
        let else_label = self.labels.define();
        instruction!(self, "Branch if {} to {else_label}", cmp.inverse());
        self.branch(Instr::BranchIf(cmp.inverse(), else_label), else_label)?;
        Ok(else_label)
    }

    fn open_if(&mut self, end_label: Label, else_label: Label) {
        self.blocks.push(Block::If {
            else_label,
            end_label,
        });
    }

    pub fn if_true(&mut self) -> Result<(), EmitError> {
        let end_label = self.labels.define();
        let else_label = self.labels.define();
        self.brfalse(else_label)?;
        self.open_if(end_label, else_label);
        Ok(())
    }

    pub fn if_false(&mut self) -> Result<(), EmitError> {
        let end_label = self.labels.define();
        let else_label = self.labels.define();
        self.brtrue(else_label)?;
        self.open_if(end_label, else_label);
        Ok(())
    }

    pub fn if_cmp(&mut self, cmp: Cmp) -> Result<(), EmitError> {
        let end_label = self.labels.define();
        let else_label = self.branch_unless(cmp)?;
        self.open_if(end_label, else_label);
        Ok(())
    }

    pub fn if_compare(
        &mut self,
        v1: impl Into<Operand>,
        cmp: Cmp,
        v2: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.load(v1)?;
        self.load(v2)?;
        self.if_cmp(cmp)
    }

    pub fn begin_else(&mut self) -> Result<(), EmitError> {
        let (else_label, end_label) = self.blocks.pop_if()?;
        self.br(end_label)?;
        self.mark_label(else_label)?;
        self.open_if(end_label, end_label);
        Ok(())
    }

    pub fn else_if(
        &mut self,
        v1: impl Into<Operand>,
        cmp: Cmp,
        v2: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        let (else_label, end_label) = self.blocks.pop_if()?;
        self.br(end_label)?;
        self.mark_label(else_label)?;
        self.load(v1)?;
        self.load(v2)?;
        let else_label = self.branch_unless(cmp)?;
        self.open_if(end_label, else_label);
        Ok(())
    }

    pub fn end_if(&mut self) -> Result<(), EmitError> {
        let (else_label, end_label) = self.blocks.pop_if()?;
        if else_label != end_label {
            self.mark_label(else_label)?;
        }
        self.mark_label(end_label)
    }

    /// Opens an `if` taken when `value` differs from the default of its
    /// type. Structs are compared with `object.equals`.
    pub fn if_not_default_value(&mut self, value: impl Into<Operand>) -> Result<(), EmitError> {
        let value = value.into();
        let ty = value.ty();
        if ty.is_struct() {
            let object = TypeDesc::object();
            self.load_default_value(&ty)?;
            self.convert_value(&ty, &object)?;
            self.load(value)?;
            self.convert_value(&ty, &object)?;
            self.call(&intrinsics::object_equals())?;
            self.if_false()
        } else {
            self.load_default_value(&ty)?;
            self.load(value)?;
            self.if_cmp(Cmp::NotEqualTo)
        }
    }

    fn load_string_length(&mut self, local: &LocalSlot) -> Result<(), EmitError> {
        self.ldloc(local)?;
        self.call(&intrinsics::string_length())?;
        self.ldc(Constant::I32(0))
    }

    pub fn if_not_is_empty_string(&mut self, local: &LocalSlot) -> Result<(), EmitError> {
        self.load_string_length(local)?;
        self.if_cmp(Cmp::NotEqualTo)
    }

    pub fn else_if_is_empty_string(&mut self, local: &LocalSlot) -> Result<(), EmitError> {
        let (else_label, end_label) = self.blocks.pop_if()?;
        self.br(end_label)?;
        self.mark_label(else_label)?;
        self.load_string_length(local)?;
        let else_label = self.branch_unless(Cmp::EqualTo)?;
        self.open_if(end_label, else_label);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // For

    fn next_for(&mut self, index: Option<LocalSlot>, bound: Operand) -> ForState {
        let handle = ForHandle {
            session: self.labels.session(),
            id: self.next_for_id,
        };
        self.next_for_id += 1;
        ForState {
            handle,
            index,
            begin: self.labels.define(),
            test: self.labels.define(),
            end_label: None,
            bound,
        }
    }

    pub fn for_loop(
        &mut self,
        index: Option<&LocalSlot>,
        start: impl Into<Operand>,
        end: impl Into<Operand>,
    ) -> Result<ForHandle, EmitError> {
        let state = self.next_for(index.cloned(), end.into());
        if let Some(index) = &state.index {
            self.load(start)?;
            self.stloc(index)?;
            self.br(state.test)?;
        }
        self.mark_label(state.begin)?;

        let handle = state.handle;
        self.blocks.push(Block::For(state));
        Ok(handle)
    }

    pub fn end_for(&mut self) -> Result<(), EmitError> {
        let state = self.blocks.pop_for()?;
        match &state.index {
            Some(index) => {
                self.ldloc(index)?;
                self.ldc(Constant::I32(1))?;
                self.add()?;
                self.stloc(index)?;

                self.mark_label(state.test)?;
                self.ldloc(index)?;
                let bound_is_array = state.bound.ty().is_array();
                self.load(&state.bound)?;
                if bound_is_array {
                    self.ldlen()?;
                }
                self.blt(state.begin)?;
            }
            None => self.br(state.begin)?,
        }
        if let Some(end_label) = state.end_label {
            self.mark_label(end_label)?;
        }
        Ok(())
    }

    /// Opens a loop over `enumerator`: each iteration stores the converted
    /// current element into `local`.
    pub fn for_each(
        &mut self,
        local: &LocalSlot,
        element: &TypeDesc,
        enumerator: &LocalSlot,
        get_current: &MethodDesc,
    ) -> Result<ForHandle, EmitError> {
        let state = self.next_for(Some(local.clone()), Operand::from(enumerator));
        self.br(state.test)?;
        self.mark_label(state.begin)?;
        self.call_on(Some(&state.bound), get_current, &[])?;
        self.convert_value(element, &local.ty)?;
        self.stloc(local)?;

        let handle = state.handle;
        self.blocks.push(Block::ForEach(state));
        Ok(handle)
    }

    pub fn end_for_each(&mut self, move_next: &MethodDesc) -> Result<(), EmitError> {
        let state = self.blocks.pop_for_each()?;
        self.mark_label(state.test)?;
        self.call_on(Some(&state.bound), move_next, &[])?;
        self.brtrue(state.begin)?;
        if let Some(end_label) = state.end_label {
            self.mark_label(end_label)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Break

    fn break_with(
        &mut self,
        handle: ForHandle,
        op: &str,
        instr: fn(Label) -> Instr,
    ) -> Result<(), EmitError> {
        let labels = &mut self.labels;
        let end_label = self.blocks.break_target(handle, || labels.define())?;
        instruction!(self, "{op} {end_label}");
        self.branch(instr(end_label), end_label)
    }

    pub fn break_loop(&mut self, handle: ForHandle) -> Result<(), EmitError> {
        self.break_with(handle, "br", Instr::Br)
    }

    pub fn if_true_break(&mut self, handle: ForHandle) -> Result<(), EmitError> {
        self.break_with(handle, "brtrue", Instr::Brtrue)
    }

    pub fn if_false_break(&mut self, handle: ForHandle) -> Result<(), EmitError> {
        self.break_with(handle, "brfalse", Instr::Brfalse)
    }

    // -------------------------------------------------------------------------
    // Switch

    pub fn switch(&mut self, cases: usize) -> Result<Vec<Label>, EmitError> {
        let default_label = self.labels.define();
        let end_label = self.labels.define();
        let labels: Vec<Label> = (0..cases).map(|_| self.labels.define()).collect();

        if self.tracing() {
            instruction!(self, "switch (");
            for label in &labels {
                instruction!(self, "    {label}");
            }
            instruction!(self, ") {{");
        }
        for label in &labels {
            self.labels.reference(*label)?;
        }
        self.push(Instr::Switch(labels.clone()));
        self.br(default_label)?;

        self.blocks.push(Block::Switch {
            default_label,
            end_label,
            default_defined: false,
        });
        Ok(labels)
    }

    pub fn case(&mut self, label: Label, name: &str) -> Result<(), EmitError> {
        instruction!(self, "case {name}{{");
        self.mark_label(label)
    }

    pub fn end_case(&mut self) -> Result<(), EmitError> {
        let (_, end_label, _) = self.blocks.peek_switch()?;
        self.br(end_label)?;
        instruction!(self, "}} //end case ");
        Ok(())
    }

    pub fn default_case(&mut self) -> Result<(), EmitError> {
        let (default_label, _, defined) = self.blocks.peek_switch()?;
        *defined = true;
        self.mark_label(default_label)
    }

    /// Closes the switch. Without a default case, unmatched selectors fall
    /// through to the end.
    pub fn end_switch(&mut self) -> Result<(), EmitError> {
        let (default_label, end_label, default_defined) = self.blocks.pop_switch()?;
        instruction!(self, "}} //end switch");
        if !default_defined {
            self.mark_label(default_label)?;
        }
        self.mark_label(end_label)
    }

    // -------------------------------------------------------------------------
    // While

    pub fn begin_while_condition(&mut self) -> Result<(), EmitError> {
        let head = self.labels.define();
        self.mark_label(head)?;
        self.blocks.push(Block::While(head));
        Ok(())
    }

    /// Ends the condition: the body runs while `cmp` holds for the two
    /// values on the stack.
    pub fn begin_while_body(&mut self, cmp: Cmp) -> Result<(), EmitError> {
        let head = self.blocks.pop_while()?;
        self.if_cmp(cmp)?;
        self.blocks.push(Block::While(head));
        Ok(())
    }

    pub fn end_while(&mut self) -> Result<(), EmitError> {
        let head = self.blocks.pop_while()?;
        self.br(head)?;
        self.end_if()
    }
}

// -----------------------------------------------------------------------------
// Tests
