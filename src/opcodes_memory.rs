//! Table and variable access opcodes
//!
//! loadw/loadb address arithmetic wraps at 16 bits, which is how games
//! index backwards from a base. load, store and pull take a variable
//! *number* as their operand and use the in-place rule for variable 0.

use crate::error::{ZmError, ZmResult};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};

impl Interpreter {
    pub(crate) fn op_loadw(
        &mut self,
        inst: &Instruction,
        array: u16,
        index: u16,
    ) -> ZmResult<ExecutionResult> {
        let addr = array.wrapping_add(index.wrapping_mul(2)) as u32;
        let value = self.vm.game.memory.read_word(addr)?;
        self.store_result(inst, value)
    }

    pub(crate) fn op_loadb(
        &mut self,
        inst: &Instruction,
        array: u16,
        index: u16,
    ) -> ZmResult<ExecutionResult> {
        let addr = array.wrapping_add(index) as u32;
        let value = self.vm.game.memory.read_byte(addr)?;
        self.store_result(inst, value as u16)
    }

    pub(crate) fn op_storew(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let addr = operands[0].wrapping_add(operands[1].wrapping_mul(2)) as u32;
        self.vm.game.memory.write_word(addr, operands[2])?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_storeb(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let addr = operands[0].wrapping_add(operands[1]) as u32;
        self.vm.game.memory.write_byte(addr, operands[2] as u8)?;
        Ok(ExecutionResult::Continue)
    }

    /// load (variable) -> result, without popping when it names the stack
    pub(crate) fn op_load(&mut self, inst: &Instruction, var: u16) -> ZmResult<ExecutionResult> {
        let value = self.vm.read_variable_indirect(var as u8)?;
        self.store_result(inst, value)
    }

    /// store (variable) value, replacing the stack top in place
    pub(crate) fn op_store(&mut self, var: u16, value: u16) -> ZmResult<ExecutionResult> {
        self.vm.write_variable_indirect(var as u8, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// pull: pop into a named variable (V6 stores instead)
    pub(crate) fn op_pull(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZmResult<ExecutionResult> {
        let value = self.vm.pop()?;
        if self.vm.version() == 6 {
            return self.store_result(inst, value);
        }
        let var = *operands.first().ok_or_else(|| ZmError::Decode {
            addr: inst.addr,
            reason: "pull needs a variable operand".into(),
        })? as u8;
        self.vm.write_variable_indirect(var, value)?;
        Ok(ExecutionResult::Continue)
    }

    /// scan_table x table len [form]: find x in a table of words or bytes
    pub(crate) fn op_scan_table(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZmResult<ExecutionResult> {
        let (target, table, len) = (operands[0], operands[1], operands[2]);
        let form = *operands.get(3).unwrap_or(&0x82);
        let entry_len = (form & 0x7f) as u32;
        let words = form & 0x80 != 0;
        if entry_len == 0 {
            return Err(ZmError::Decode {
                addr: inst.addr,
                reason: "scan_table entry length 0".into(),
            });
        }
        for i in 0..len {
            let addr = table as u32 + i as u32 * entry_len;
            let found = if words {
                self.vm.game.memory.read_word(addr)? == target
            } else {
                self.vm.game.memory.read_byte(addr)? as u16 == target
            };
            if found {
                self.store_result(inst, addr as u16)?;
                return self.do_branch(inst, true);
            }
        }
        self.store_result(inst, 0)?;
        self.do_branch(inst, false)
    }

    /// copy_table first second size: block copy with the documented
    /// overlap rules; second = 0 zeroes the source region instead
    pub(crate) fn op_copy_table(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let (first, second) = (operands[0] as u32, operands[1] as u32);
        let size = operands[2] as i16;
        let len = size.unsigned_abs() as u32;

        if second == 0 {
            for i in 0..len {
                self.vm.game.memory.write_byte(first + i, 0)?;
            }
            return Ok(ExecutionResult::Continue);
        }

        // Negative size forces a forward copy even when it corrupts an
        // overlapping region; positive size copies safely
        let forward_corrupts = second > first && second < first + len;
        if size > 0 && forward_corrupts {
            for i in (0..len).rev() {
                let byte = self.vm.game.memory.read_byte(first + i)?;
                self.vm.game.memory.write_byte(second + i, byte)?;
            }
        } else {
            for i in 0..len {
                let byte = self.vm.game.memory.read_byte(first + i)?;
                self.vm.game.memory.write_byte(second + i, byte)?;
            }
        }
        Ok(ExecutionResult::Continue)
    }
}
