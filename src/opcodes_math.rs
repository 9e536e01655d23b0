//! Arithmetic, comparison and shift opcodes
//!
//! Everything here is 16-bit two's-complement: wrapping add/sub/mul,
//! signed comparisons, division rounding toward zero and a modulo that
//! takes the sign of the dividend. Divide-by-zero is fatal.

use log::debug;

use crate::error::{ZmError, ZmResult};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};

impl Interpreter {
    /// je a b [c d]: equal to any of the others
    pub(crate) fn op_je(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZmResult<ExecutionResult> {
        if operands.len() < 2 {
            return Err(ZmError::Decode {
                addr: inst.addr,
                reason: "je needs something to compare against".into(),
            });
        }
        let equal = operands[1..].iter().any(|&b| b == operands[0]);
        self.do_branch(inst, equal)
    }

    pub(crate) fn op_div(
        &mut self,
        inst: &Instruction,
        a: u16,
        b: u16,
    ) -> ZmResult<ExecutionResult> {
        if b == 0 {
            return Err(ZmError::Arithmetic("division by zero"));
        }
        let result = (a as i16).wrapping_div(b as i16) as u16;
        self.store_result(inst, result)
    }

    pub(crate) fn op_mod(
        &mut self,
        inst: &Instruction,
        a: u16,
        b: u16,
    ) -> ZmResult<ExecutionResult> {
        if b == 0 {
            return Err(ZmError::Arithmetic("modulo by zero"));
        }
        let result = (a as i16).wrapping_rem(b as i16) as u16;
        self.store_result(inst, result)
    }

    pub(crate) fn op_not(&mut self, inst: &Instruction, a: u16) -> ZmResult<ExecutionResult> {
        self.store_result(inst, !a)
    }

    /// inc/dec and their checking variants reference a variable by number
    /// and touch the stack top in place when that number is 0
    pub(crate) fn op_inc(&mut self, var: u16) -> ZmResult<ExecutionResult> {
        let var = var as u8;
        let value = self.vm.read_variable_indirect(var)? as i16;
        self.vm
            .write_variable_indirect(var, value.wrapping_add(1) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_dec(&mut self, var: u16) -> ZmResult<ExecutionResult> {
        let var = var as u8;
        let value = self.vm.read_variable_indirect(var)? as i16;
        self.vm
            .write_variable_indirect(var, value.wrapping_sub(1) as u16)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_inc_chk(
        &mut self,
        inst: &Instruction,
        var: u16,
        limit: u16,
    ) -> ZmResult<ExecutionResult> {
        let var = var as u8;
        let value = (self.vm.read_variable_indirect(var)? as i16).wrapping_add(1);
        self.vm.write_variable_indirect(var, value as u16)?;
        self.do_branch(inst, value > limit as i16)
    }

    pub(crate) fn op_dec_chk(
        &mut self,
        inst: &Instruction,
        var: u16,
        limit: u16,
    ) -> ZmResult<ExecutionResult> {
        let var = var as u8;
        let value = (self.vm.read_variable_indirect(var)? as i16).wrapping_sub(1);
        self.vm.write_variable_indirect(var, value as u16)?;
        self.do_branch(inst, value < limit as i16)
    }

    /// random n: roll for positive n, reseed otherwise
    pub(crate) fn op_random(&mut self, inst: &Instruction, n: u16) -> ZmResult<ExecutionResult> {
        let n = n as i16;
        if n > 0 {
            let roll = self.rng.roll(n as u16);
            return self.store_result(inst, roll);
        }
        if n < 0 {
            debug!("random: reseeding predictably with {}", -(n as i32));
            self.rng.seed((-(n as i32)) as u64);
        } else {
            debug!("random: reseeding from entropy");
            self.rng.reseed_random();
        }
        self.store_result(inst, 0)
    }

    /// log_shift: logical shift, positive places left, negative right
    pub(crate) fn op_log_shift(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZmResult<ExecutionResult> {
        let (value, places) = (operands[0], operands[1] as i16);
        let result = if places >= 16 || places <= -16 {
            0
        } else if places >= 0 {
            value << places as u32
        } else {
            value >> (-places) as u32
        };
        self.store_result(inst, result)
    }

    /// art_shift: arithmetic shift, sign-propagating on the right
    pub(crate) fn op_art_shift(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZmResult<ExecutionResult> {
        let (value, places) = (operands[0] as i16, operands[1] as i16);
        let result = if places >= 16 {
            0
        } else if places >= 0 {
            (value << places as u32) as u16
        } else {
            // A long enough right shift leaves only the sign
            (value >> (-places).min(15) as u32) as u16
        };
        self.store_result(inst, result)
    }
}
