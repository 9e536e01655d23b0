//! Object tree, attribute and property opcodes
//!
//! Thin adapters between resolved operands and the ObjectTable; the
//! layout knowledge all lives in zobject. get_sibling and get_child both
//! store and branch (branching on "found one").

use crate::error::ZmResult;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};

impl Interpreter {
    pub(crate) fn op_get_parent(&mut self, inst: &Instruction, obj: u16) -> ZmResult<ExecutionResult> {
        let parent = self.vm.objects.parent(&self.vm.game.memory, obj)?;
        self.store_result(inst, parent)
    }

    pub(crate) fn op_get_sibling(
        &mut self,
        inst: &Instruction,
        obj: u16,
    ) -> ZmResult<ExecutionResult> {
        let sibling = self.vm.objects.sibling(&self.vm.game.memory, obj)?;
        self.store_result(inst, sibling)?;
        self.do_branch(inst, sibling != 0)
    }

    pub(crate) fn op_get_child(
        &mut self,
        inst: &Instruction,
        obj: u16,
    ) -> ZmResult<ExecutionResult> {
        let child = self.vm.objects.child(&self.vm.game.memory, obj)?;
        self.store_result(inst, child)?;
        self.do_branch(inst, child != 0)
    }

    /// jin obj parent: branch when obj sits directly inside parent
    pub(crate) fn op_jin(
        &mut self,
        inst: &Instruction,
        obj: u16,
        parent: u16,
    ) -> ZmResult<ExecutionResult> {
        let actual = self.vm.objects.parent(&self.vm.game.memory, obj)?;
        self.do_branch(inst, actual == parent)
    }

    pub(crate) fn op_insert_obj(&mut self, obj: u16, dest: u16) -> ZmResult<ExecutionResult> {
        let objects = self.vm.objects;
        objects.insert(&mut self.vm.game.memory, obj, dest)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_remove_obj(&mut self, obj: u16) -> ZmResult<ExecutionResult> {
        let objects = self.vm.objects;
        objects.remove(&mut self.vm.game.memory, obj)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_test_attr(
        &mut self,
        inst: &Instruction,
        obj: u16,
        attr: u16,
    ) -> ZmResult<ExecutionResult> {
        let set = self.vm.objects.test_attr(&self.vm.game.memory, obj, attr)?;
        self.do_branch(inst, set)
    }

    pub(crate) fn op_set_attr(&mut self, obj: u16, attr: u16, value: bool) -> ZmResult<ExecutionResult> {
        let objects = self.vm.objects;
        objects.set_attr(&mut self.vm.game.memory, obj, attr, value)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_get_prop(
        &mut self,
        inst: &Instruction,
        obj: u16,
        prop: u16,
    ) -> ZmResult<ExecutionResult> {
        let value = self.vm.objects.get_prop(&self.vm.game.memory, obj, prop)?;
        self.store_result(inst, value)
    }

    pub(crate) fn op_get_prop_addr(
        &mut self,
        inst: &Instruction,
        obj: u16,
        prop: u16,
    ) -> ZmResult<ExecutionResult> {
        let addr = self
            .vm
            .objects
            .get_prop_addr(&self.vm.game.memory, obj, prop)?;
        self.store_result(inst, addr)
    }

    pub(crate) fn op_get_next_prop(
        &mut self,
        inst: &Instruction,
        obj: u16,
        prop: u16,
    ) -> ZmResult<ExecutionResult> {
        let next = self
            .vm
            .objects
            .get_next_prop(&self.vm.game.memory, obj, prop)?;
        self.store_result(inst, next)
    }

    pub(crate) fn op_get_prop_len(
        &mut self,
        inst: &Instruction,
        data_addr: u16,
    ) -> ZmResult<ExecutionResult> {
        let len = self.vm.objects.prop_len(&self.vm.game.memory, data_addr)?;
        self.store_result(inst, len)
    }

    pub(crate) fn op_put_prop(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let objects = self.vm.objects;
        objects.put_prop(&mut self.vm.game.memory, operands[0], operands[1], operands[2])?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_print_obj(&mut self, obj: u16) -> ZmResult<ExecutionResult> {
        let name = self.vm.objects.name(&self.vm.game.memory, obj)?;
        self.output(&name)?;
        Ok(ExecutionResult::Continue)
    }
}
