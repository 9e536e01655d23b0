//! Routine calls, returns, and the catch/throw non-local exit
//!
//! The call protocol: unpack the packed routine address (0 means "return
//! false without calling"), read the locals count, take initial values
//! from the routine header (V1-4) or zeros (V5+), overlay the supplied
//! arguments, and push a frame recording where the result goes.

use log::debug;

use crate::error::{ZmError, ZmResult};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::vm::CallFrame;

impl Interpreter {
    pub(crate) fn do_call(
        &mut self,
        packed: u16,
        args: &[u16],
        return_store: Option<u8>,
    ) -> ZmResult<ExecutionResult> {
        if packed == 0 {
            if let Some(var) = return_store {
                self.vm.write_variable(var, 0)?;
            }
            return Ok(ExecutionResult::Continue);
        }

        let addr = self.vm.game.memory.unpack_routine(packed);
        let num_locals = self.vm.game.memory.read_byte(addr)? as usize;
        if num_locals > 15 {
            return Err(ZmError::Decode {
                addr,
                reason: format!("routine header claims {num_locals} locals"),
            });
        }
        debug!(
            "call {:#07x} ({} locals) args {:?} -> {:?}",
            addr, num_locals, args, return_store
        );

        let mut frame = CallFrame {
            return_pc: self.vm.pc,
            return_store,
            num_locals: num_locals as u8,
            locals: [0; 15],
            arg_count: args.len().min(8) as u8,
            stack_base: self.vm.stack.len(),
        };

        let mut body = addr + 1;
        if self.vm.version() <= 4 {
            // Initial values sit in the routine header
            for i in 0..num_locals {
                frame.locals[i] = self.vm.game.memory.read_word(body)?;
                body += 2;
            }
        }
        for (i, &arg) in args.iter().enumerate().take(num_locals) {
            frame.locals[i] = arg;
        }

        self.vm.push_frame(frame)?;
        self.vm.pc = body;
        Ok(ExecutionResult::Called)
    }

    pub(crate) fn do_return(&mut self, value: u16) -> ZmResult<ExecutionResult> {
        let frame = self
            .vm
            .call_stack
            .pop()
            .ok_or(ZmError::StackUnderflow)?;
        self.vm.stack.truncate(frame.stack_base);
        self.vm.pc = frame.return_pc;

        if self.vm.call_stack.is_empty() {
            // That was the root frame; execution is over
            debug!("return from the root frame, value {value}");
            return Ok(ExecutionResult::GameOver);
        }
        if let Some(var) = frame.return_store {
            self.vm.write_variable(var, value)?;
        }
        Ok(ExecutionResult::Returned(value))
    }

    /// jump: an unconditional relative move, not a branch form
    pub(crate) fn op_jump(&mut self, offset: u16) -> ZmResult<ExecutionResult> {
        self.vm.pc = (self.vm.pc as i64 + offset as i16 as i64 - 2) as u32;
        Ok(ExecutionResult::Branched)
    }

    pub(crate) fn op_check_arg_count(
        &mut self,
        inst: &Instruction,
        n: u16,
    ) -> ZmResult<ExecutionResult> {
        let supplied = self
            .vm
            .call_stack
            .last()
            .map(|frame| frame.arg_count as u16)
            .unwrap_or(0);
        self.do_branch(inst, supplied >= n)
    }

    /// catch: the current call depth, an opaque cookie for throw
    pub(crate) fn op_catch(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        let depth = self.vm.call_stack.len() as u16;
        self.store_result(inst, depth)
    }

    /// throw value cookie: unwind to the cookie's frame, then return value
    /// from it
    pub(crate) fn op_throw(&mut self, value: u16, cookie: u16) -> ZmResult<ExecutionResult> {
        let depth = cookie as usize;
        if depth == 0 || depth > self.vm.call_stack.len() {
            return Err(ZmError::Variable(format!(
                "throw to frame {depth} with call depth {}",
                self.vm.call_stack.len()
            )));
        }
        debug!(
            "throw {value} unwinding {} -> {} frames",
            self.vm.call_stack.len(),
            depth
        );
        self.vm.call_stack.truncate(depth);
        self.do_return(value)
    }
}
