//! The executor: fetch, decode, dispatch, and the driving modes
//!
//! Opcode handlers live in the `opcodes_*` modules as further `impl`
//! blocks on `Interpreter`; this file owns the machine loop, operand
//! resolution, branching, the save/restore/undo plumbing and the
//! suspension protocol for input opcodes.

use log::{debug, trace};

use crate::error::{ZmError, ZmResult};
use crate::header::{Header, FLAG2_FIXED_PITCH, FLAG2_TRANSCRIPT};
use crate::instruction::{BranchInfo, Instruction, InstructionForm, Operand, OperandCount};
use crate::quetzal;
use crate::text;
use crate::vm::VM;
use crate::zio::{InputEvent, StatusRight, ZmIo};
use crate::zrand::ZRand;

/// Undo snapshots kept in-engine for save_undo/restore_undo
const UNDO_SLOTS: usize = 8;

/// Stream-3 redirection nesting limit
pub(crate) const STREAM3_DEPTH: usize = 16;

/// Interpreter number advertised in the header (6 = "IBM PC" family)
const INTERPRETER_NUMBER: u8 = 6;

/// What executing one instruction did to control flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Fall through to the next instruction
    Continue,
    /// Branch taken, PC already updated
    Branched,
    /// Routine called, PC at its first instruction
    Called,
    /// Routine returned with a value
    Returned(u16),
    /// quit executed
    Quit,
    /// Returned from the root frame
    GameOver,
}

/// Machine status between steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Running,
    /// An input opcode is pending; feed it via finish_input_* or push
    /// input into the I/O surface and step again
    WaitingForInput,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingKind {
    Line,
    Char,
}

/// A parked input opcode, kept so the host can resume us
pub(crate) struct PendingInput {
    pub(crate) kind: PendingKind,
    pub(crate) text_buffer: u32,
    pub(crate) parse_buffer: u32,
    pub(crate) store_var: Option<u8>,
    pub(crate) time_tenths: u16,
    pub(crate) timer_routine: u16,
}

pub struct Interpreter {
    pub vm: VM,
    pub io: Box<dyn ZmIo>,
    pub(crate) rng: ZRand,
    undo: Vec<Vec<u8>>,
    pending_input: Option<PendingInput>,
    /// Stack of stream-3 redirection tables
    pub(crate) stream3: Vec<u32>,
    pub(crate) stream1_on: bool,
    instruction_count: u64,
    last_error: Option<ZmError>,
    halted: bool,
    in_timer_routine: bool,
}

impl Interpreter {
    pub fn new(vm: VM, io: Box<dyn ZmIo>) -> ZmResult<Interpreter> {
        let mut interp = Interpreter {
            vm,
            io,
            rng: ZRand::new_uniform(),
            undo: Vec::new(),
            pending_input: None,
            stream3: Vec::new(),
            stream1_on: true,
            instruction_count: 0,
            last_error: None,
            halted: false,
            in_timer_routine: false,
        };
        interp.announce_capabilities()?;
        if interp.vm.version() == 6 {
            // V6 starts in a real routine rather than at a raw PC
            let main = interp.vm.game.header.initial_pc;
            interp.do_call(main, &[], None)?;
        }
        Ok(interp)
    }

    /// Fill in the header slots that describe this interpreter
    fn announce_capabilities(&mut self) -> ZmResult<()> {
        let vm = &mut self.vm;
        let version = vm.game.header.version;
        let mut flags1 = vm.game.header.flags1;
        if version <= 3 {
            flags1 &= !0x10; // status line is available
            flags1 |= 0x20; // screen splitting is available
        } else {
            flags1 |= 0x1c; // bold, italic and fixed-pitch styles
            flags1 |= 0x80; // timed input
        }
        vm.game.memory.write_byte(0x01, flags1)?;
        vm.game.header.flags1 = flags1;
        vm.game
            .header
            .set_interpreter_info(&mut vm.game.memory, INTERPRETER_NUMBER, b'A')?;
        vm.game
            .header
            .set_screen_dimensions(&mut vm.game.memory, 80, 24)?;
        vm.game
            .header
            .set_standard_revision(&mut vm.game.memory, 0x0101)?;
        Ok(())
    }

    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng = ZRand::new_predictable(seed);
    }

    pub fn state(&self) -> StepState {
        if self.halted {
            StepState::Halted
        } else if self.pending_input.is_some() {
            StepState::WaitingForInput
        } else {
            StepState::Running
        }
    }

    /// Error that halted the machine, if any
    pub fn last_error(&self) -> Option<&ZmError> {
        self.last_error.as_ref()
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn get_object_name(&self, obj: u16) -> ZmResult<String> {
        self.vm.objects.name(&self.vm.game.memory, obj)
    }

    /// Execute one instruction (or retry a pending input opcode).
    /// A fatal error halts the machine and is surfaced to the caller.
    pub fn step(&mut self) -> ZmResult<StepState> {
        match self.step_inner() {
            Ok(state) => Ok(state),
            Err(e) => {
                debug!("fatal at pc {:#07x}: {e}", self.vm.pc);
                self.halted = true;
                self.last_error = Some(e.clone());
                let _ = self.io.new_line();
                Err(e)
            }
        }
    }

    fn step_inner(&mut self) -> ZmResult<StepState> {
        if self.halted {
            return Ok(StepState::Halted);
        }
        if let Some(pending) = self.pending_input.take() {
            self.request_input(pending)?;
            return Ok(self.state());
        }

        let pc = self.vm.pc;
        let inst = Instruction::decode(self.vm.game.memory.bytes(), pc as usize, self.vm.version())?;
        trace!("{:#07x}: {}", pc, inst);
        self.vm.pc = pc + inst.size as u32;
        self.instruction_count += 1;

        match self.execute(&inst)? {
            ExecutionResult::Quit | ExecutionResult::GameOver => {
                self.halted = true;
                self.io.quit();
                Ok(StepState::Halted)
            }
            _ => Ok(self.state()),
        }
    }

    /// Drive until the game halts or input runs dry
    pub fn run(&mut self) -> ZmResult<StepState> {
        loop {
            match self.step()? {
                StepState::Running => continue,
                state => return Ok(state),
            }
        }
    }

    /// Host-side completion of a parked line read
    pub fn finish_input_line(&mut self, line: &str) -> ZmResult<()> {
        match self.pending_input.take() {
            Some(pending) if pending.kind == PendingKind::Line => {
                self.complete_line_input(&pending, line, 13)
            }
            Some(pending) => {
                self.pending_input = Some(pending);
                Err(ZmError::Io("pending input wants a character".into()))
            }
            None => Err(ZmError::Io("no input pending".into())),
        }
    }

    /// Host-side completion of a parked character read
    pub fn finish_input_char(&mut self, key: u8) -> ZmResult<()> {
        match self.pending_input.take() {
            Some(pending) if pending.kind == PendingKind::Char => {
                self.complete_char_input(&pending, key)
            }
            Some(pending) => {
                self.pending_input = Some(pending);
                Err(ZmError::Io("pending input wants a line".into()))
            }
            None => Err(ZmError::Io("no input pending".into())),
        }
    }

    // --- dispatch ---

    fn execute(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        // The metadata tables are version-aware, so an "unknown" name means
        // this slot does not exist in the running version
        if inst.name() == "unknown" {
            return Err(self.unknown(inst));
        }
        let operands = self.resolve_operands(inst)?;
        match inst.form {
            InstructionForm::Extended => self.execute_ext(inst, &operands),
            _ => match inst.operand_count {
                OperandCount::OP0 => self.execute_0op(inst),
                OperandCount::OP1 => self.execute_1op(inst, &operands),
                OperandCount::OP2 => self.execute_2op(inst, &operands),
                OperandCount::VAR => self.execute_var(inst, &operands),
            },
        }
    }

    fn unknown(&self, inst: &Instruction) -> ZmError {
        ZmError::Decode {
            addr: inst.addr,
            reason: format!(
                "no {:?} opcode {:#04x} in version {}",
                inst.operand_count,
                inst.ext_opcode.unwrap_or(inst.opcode),
                self.vm.version()
            ),
        }
    }

    fn execute_0op(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        match inst.opcode {
            0x00 => self.do_return(1),
            0x01 => self.do_return(0),
            0x02 => self.op_print(inst),
            0x03 => self.op_print_ret(inst),
            0x04 => Ok(ExecutionResult::Continue), // nop
            0x05 if self.vm.version() <= 4 => self.op_save(inst),
            0x06 if self.vm.version() <= 4 => self.op_restore(inst),
            0x07 => self.op_restart(),
            0x08 => {
                let value = self.vm.pop()?;
                self.do_return(value)
            }
            0x09 if self.vm.version() <= 4 => {
                self.vm.pop()?;
                Ok(ExecutionResult::Continue)
            }
            0x09 => self.op_catch(inst),
            0x0a => Ok(ExecutionResult::Quit),
            0x0b => {
                self.output("\n")?;
                Ok(ExecutionResult::Continue)
            }
            0x0c if self.vm.version() == 3 => {
                self.update_status_line()?;
                Ok(ExecutionResult::Continue)
            }
            0x0d => self.op_verify(inst),
            0x0f if self.vm.version() >= 5 => self.do_branch(inst, true), // piracy
            _ => Err(self.unknown(inst)),
        }
    }

    fn execute_1op(&mut self, inst: &Instruction, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let a = operands[0];
        match inst.opcode {
            0x00 => self.do_branch(inst, a == 0),
            0x01 => self.op_get_sibling(inst, a),
            0x02 => self.op_get_child(inst, a),
            0x03 => self.op_get_parent(inst, a),
            0x04 => self.op_get_prop_len(inst, a),
            0x05 => self.op_inc(a),
            0x06 => self.op_dec(a),
            0x07 => self.op_print_addr(a),
            0x08 if self.vm.version() >= 4 => self.do_call(a, &[], inst.store_var),
            0x09 => self.op_remove_obj(a),
            0x0a => self.op_print_obj(a),
            0x0b => self.do_return(a),
            0x0c => self.op_jump(a),
            0x0d => self.op_print_paddr(a),
            0x0e => self.op_load(inst, a),
            0x0f if self.vm.version() <= 4 => self.op_not(inst, a),
            0x0f => self.do_call(a, &[], None), // call_1n
            _ => Err(self.unknown(inst)),
        }
    }

    fn execute_2op(&mut self, inst: &Instruction, operands: &[u16]) -> ZmResult<ExecutionResult> {
        // VAR-encoded 2OP instructions may carry more than two operands
        // (je in particular); handlers that only use two ignore the rest
        if operands.is_empty() || (operands.len() < 2 && inst.opcode != 0x01) {
            return Err(ZmError::Decode {
                addr: inst.addr,
                reason: format!("{} needs two operands", inst.name()),
            });
        }
        let (a, b) = (operands[0], *operands.get(1).unwrap_or(&0));
        match inst.opcode {
            0x01 => self.op_je(inst, operands),
            0x02 => self.do_branch(inst, (a as i16) < (b as i16)),
            0x03 => self.do_branch(inst, (a as i16) > (b as i16)),
            0x04 => self.op_dec_chk(inst, a, b),
            0x05 => self.op_inc_chk(inst, a, b),
            0x06 => self.op_jin(inst, a, b),
            0x07 => self.do_branch(inst, a & b == b),
            0x08 => self.store_result(inst, a | b),
            0x09 => self.store_result(inst, a & b),
            0x0a => self.op_test_attr(inst, a, b),
            0x0b => self.op_set_attr(a, b, true),
            0x0c => self.op_set_attr(a, b, false),
            0x0d => self.op_store(a, b),
            0x0e => self.op_insert_obj(a, b),
            0x0f => self.op_loadw(inst, a, b),
            0x10 => self.op_loadb(inst, a, b),
            0x11 => self.op_get_prop(inst, a, b),
            0x12 => self.op_get_prop_addr(inst, a, b),
            0x13 => self.op_get_next_prop(inst, a, b),
            0x14 => self.store_result(inst, (a as i16).wrapping_add(b as i16) as u16),
            0x15 => self.store_result(inst, (a as i16).wrapping_sub(b as i16) as u16),
            0x16 => self.store_result(inst, (a as i16).wrapping_mul(b as i16) as u16),
            0x17 => self.op_div(inst, a, b),
            0x18 => self.op_mod(inst, a, b),
            0x19 if self.vm.version() >= 4 => self.do_call(a, &operands[1..], inst.store_var),
            0x1a if self.vm.version() >= 5 => self.do_call(a, &operands[1..], None),
            0x1b if self.vm.version() >= 5 => {
                self.io.set_colours(a, b)?;
                Ok(ExecutionResult::Continue)
            }
            0x1c if self.vm.version() >= 5 => self.op_throw(a, b),
            _ => Err(self.unknown(inst)),
        }
    }

    fn execute_var(&mut self, inst: &Instruction, operands: &[u16]) -> ZmResult<ExecutionResult> {
        // A malformed story can omit operands the opcode requires; fail
        // instead of indexing past the list
        let required = match inst.opcode {
            0x01 | 0x02 | 0x03 | 0x17 | 0x1d => 3,
            0x1c => 4,
            0x1b | 0x1e => 2,
            0x09 | 0x0e | 0x15 | 0x16 => 0,
            _ => 1,
        };
        if operands.len() < required {
            return Err(ZmError::Decode {
                addr: inst.addr,
                reason: format!("{} needs {required} operands", inst.name()),
            });
        }
        match inst.opcode {
            0x00 => self.do_call(operands[0], &operands[1..], inst.store_var),
            0x01 => self.op_storew(operands),
            0x02 => self.op_storeb(operands),
            0x03 => self.op_put_prop(operands),
            0x04 => self.op_read(inst, operands),
            0x05 => self.op_print_char(operands[0]),
            0x06 => self.op_print_num(operands[0]),
            0x07 => self.op_random(inst, operands[0]),
            0x08 => {
                self.vm.push(operands[0])?;
                Ok(ExecutionResult::Continue)
            }
            0x09 => self.op_pull(inst, operands),
            0x0a => self.op_split_window(operands[0]),
            0x0b => self.op_set_window(operands[0]),
            0x0c if self.vm.version() >= 4 => {
                self.do_call(operands[0], &operands[1..], inst.store_var)
            }
            0x0d => self.op_erase_window(operands[0]),
            0x0e => self.op_erase_line(operands),
            0x0f => self.op_set_cursor(operands),
            0x10 => self.op_get_cursor(operands[0]),
            0x11 => self.op_set_text_style(operands[0]),
            0x12 => self.op_buffer_mode(operands[0]),
            0x13 => self.op_output_stream(operands),
            0x14 => self.op_input_stream(operands[0]),
            0x15 => self.op_sound_effect(operands),
            0x16 if self.vm.version() >= 4 => self.op_read_char(inst, operands),
            0x17 if self.vm.version() >= 4 => self.op_scan_table(inst, operands),
            0x18 if self.vm.version() >= 5 => self.op_not(inst, operands[0]),
            0x19 if self.vm.version() >= 5 => self.do_call(operands[0], &operands[1..], None),
            0x1a if self.vm.version() >= 5 => self.do_call(operands[0], &operands[1..], None),
            0x1b if self.vm.version() >= 5 => self.op_tokenise(operands),
            0x1c if self.vm.version() >= 5 => self.op_encode_text(operands),
            0x1d if self.vm.version() >= 5 => self.op_copy_table(operands),
            0x1e if self.vm.version() >= 5 => self.op_print_table(operands),
            0x1f if self.vm.version() >= 5 => self.op_check_arg_count(inst, operands[0]),
            _ => Err(self.unknown(inst)),
        }
    }

    fn execute_ext(&mut self, inst: &Instruction, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let ext = inst.ext_opcode.unwrap_or(0xff);
        let required = match ext {
            0x02 | 0x03 => 2,
            0x04 | 0x0b | 0x0c => 1,
            _ => 0,
        };
        if operands.len() < required {
            return Err(ZmError::Decode {
                addr: inst.addr,
                reason: format!("{} needs {required} operands", inst.name()),
            });
        }
        match ext {
            0x00 => self.op_save(inst),
            0x01 => self.op_restore(inst),
            0x02 => self.op_log_shift(inst, operands),
            0x03 => self.op_art_shift(inst, operands),
            0x04 => {
                let previous = self.io.set_font(operands[0]);
                self.store_result(inst, previous)
            }
            0x09 => self.op_save_undo(inst),
            0x0a => self.op_restore_undo(inst),
            0x0b => self.op_print_unicode(operands[0]),
            0x0c => self.op_check_unicode(inst, operands[0]),
            _ if inst.name() != "unknown" => Err(ZmError::Unimplemented(inst.name())),
            _ => Err(self.unknown(inst)),
        }
    }

    // --- operand plumbing ---

    /// Resolve operands left to right; a Variable operand naming variable
    /// 0 pops at this moment, which is observable when one instruction
    /// pops twice
    pub(crate) fn resolve_operands(&mut self, inst: &Instruction) -> ZmResult<Vec<u16>> {
        let mut values = Vec::with_capacity(inst.operands.len());
        for operand in &inst.operands {
            let value = match *operand {
                Operand::LargeConstant(v) => v,
                Operand::SmallConstant(v) => v as u16,
                Operand::Variable(var) => self.vm.read_variable(var)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    pub(crate) fn store_result(
        &mut self,
        inst: &Instruction,
        value: u16,
    ) -> ZmResult<ExecutionResult> {
        if let Some(var) = inst.store_var {
            self.vm.write_variable(var, value)?;
        }
        Ok(ExecutionResult::Continue)
    }

    // --- control flow ---

    pub(crate) fn do_branch(
        &mut self,
        inst: &Instruction,
        condition: bool,
    ) -> ZmResult<ExecutionResult> {
        match &inst.branch {
            Some(branch) if condition == branch.on_true => self.apply_branch(branch),
            _ => Ok(ExecutionResult::Continue),
        }
    }

    fn apply_branch(&mut self, branch: &BranchInfo) -> ZmResult<ExecutionResult> {
        match branch.offset {
            0 => self.do_return(0),
            1 => self.do_return(1),
            offset => {
                self.vm.pc = (self.vm.pc as i64 + offset as i64 - 2) as u32;
                Ok(ExecutionResult::Branched)
            }
        }
    }

    /// Host-side restart: same as the opcode, and also clears a halt or a
    /// pending read
    pub fn restart(&mut self) -> ZmResult<()> {
        self.op_restart()?;
        self.halted = false;
        self.pending_input = None;
        self.last_error = None;
        Ok(())
    }

    /// restart: dynamic memory, stacks and PC back to load state, keeping
    /// the transcript and fixed-pitch request bits the game may have set
    fn op_restart(&mut self) -> ZmResult<ExecutionResult> {
        let transcript = self.vm.game.header.flag2(FLAG2_TRANSCRIPT);
        let fixed = self.vm.game.header.flag2(FLAG2_FIXED_PITCH);

        self.vm.game.memory.restart();
        self.vm.game.header = Header::new(self.vm.game.memory.bytes());
        self.announce_capabilities()?;
        {
            let vm = &mut self.vm;
            vm.game
                .header
                .set_flag2(&mut vm.game.memory, FLAG2_TRANSCRIPT, transcript)?;
            vm.game
                .header
                .set_flag2(&mut vm.game.memory, FLAG2_FIXED_PITCH, fixed)?;
        }
        self.vm.reset();
        self.stream3.clear();
        self.stream1_on = true;
        if self.vm.version() == 6 {
            let main = self.vm.game.header.initial_pc;
            self.do_call(main, &[], None)?;
        }
        Ok(ExecutionResult::Continue)
    }

    fn op_verify(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        let computed = self.vm.game.header.compute_checksum(&self.vm.game.memory);
        let ok = computed == self.vm.game.header.checksum;
        debug!(
            "verify: computed {:#06x}, header {:#06x}",
            computed, self.vm.game.header.checksum
        );
        self.do_branch(inst, ok)
    }

    // --- save / restore / undo ---

    fn op_save(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        let resume_pc = if self.vm.version() <= 3 {
            inst.addr + (inst.size - inst.branch_bytes) as u32
        } else {
            inst.addr + inst.size as u32 - 1
        };
        let blob = quetzal::snapshot(&self.vm, resume_pc);
        let saved = self.io.save(&blob)?;
        if self.vm.version() <= 3 {
            self.do_branch(inst, saved)
        } else {
            self.store_result(inst, saved as u16)
        }
    }

    fn op_restore(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        if let Some(blob) = self.io.restore()? {
            match quetzal::restore(&mut self.vm, &blob) {
                Ok(resume_pc) => return self.resume_after_restore(resume_pc),
                Err(e) => {
                    debug!("restore rejected: {e}");
                    self.output("Restore failed.\n")?;
                }
            }
        }
        if self.vm.version() <= 3 {
            self.do_branch(inst, false)
        } else {
            self.store_result(inst, 0)
        }
    }

    fn op_save_undo(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        let resume_pc = inst.addr + inst.size as u32 - 1;
        let blob = quetzal::snapshot(&self.vm, resume_pc);
        if self.undo.len() == UNDO_SLOTS {
            self.undo.remove(0);
        }
        self.undo.push(blob);
        self.store_result(inst, 1)
    }

    fn op_restore_undo(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        match self.undo.pop() {
            Some(blob) => {
                let resume_pc = quetzal::restore(&mut self.vm, &blob)?;
                self.resume_after_restore(resume_pc)
            }
            None => self.store_result(inst, 0),
        }
    }

    /// After a successful restore the PC sits on the original save's
    /// branch or store byte; re-resolve it as "succeeded" (value 2)
    fn resume_after_restore(&mut self, resume_pc: u32) -> ZmResult<ExecutionResult> {
        self.vm.pc = resume_pc;
        if self.vm.version() <= 3 {
            let first = self.vm.game.memory.read_byte(resume_pc)?;
            let on_true = first & 0x80 != 0;
            let offset = if first & 0x40 != 0 {
                self.vm.pc += 1;
                (first & 0x3f) as i16
            } else {
                let second = self.vm.game.memory.read_byte(resume_pc + 1)?;
                self.vm.pc += 2;
                let raw = (((first & 0x3f) as u16) << 8) | second as u16;
                if raw & 0x2000 != 0 {
                    (raw | 0xc000) as i16
                } else {
                    raw as i16
                }
            };
            if on_true {
                self.apply_branch(&BranchInfo { on_true, offset })
            } else {
                Ok(ExecutionResult::Continue)
            }
        } else {
            let var = self.vm.game.memory.read_byte(resume_pc)?;
            self.vm.pc += 1;
            self.vm.write_variable(var, 2)?;
            Ok(ExecutionResult::Continue)
        }
    }

    // --- input plumbing ---

    /// Ask the I/O surface for the pending read's input, handling timed
    /// re-prompts; parks in pending_input when the surface has nothing
    pub(crate) fn request_input(&mut self, pending: PendingInput) -> ZmResult<ExecutionResult> {
        loop {
            let event = match pending.kind {
                PendingKind::Line => {
                    let capacity = self.line_capacity(pending.text_buffer)?;
                    self.io.read_line(capacity, pending.time_tenths)?
                }
                PendingKind::Char => self.io.read_char(pending.time_tenths)?,
            };
            match event {
                InputEvent::Line(line) => {
                    self.complete_line_input(&pending, &line, 13)?;
                    return Ok(ExecutionResult::Continue);
                }
                InputEvent::Char(key) => {
                    self.complete_char_input(&pending, key)?;
                    return Ok(ExecutionResult::Continue);
                }
                InputEvent::Timeout => {
                    if pending.timer_routine != 0
                        && !self.call_timer_routine(pending.timer_routine)?
                    {
                        // Routine returned false: keep waiting
                        continue;
                    }
                    // Expired: empty input with terminator 0
                    match pending.kind {
                        PendingKind::Line => self.complete_line_input(&pending, "", 0)?,
                        PendingKind::Char => self.complete_char_input(&pending, 0)?,
                    }
                    return Ok(ExecutionResult::Continue);
                }
                InputEvent::Pending => {
                    if self.in_timer_routine {
                        return Err(ZmError::Io(
                            "input opcode inside a timer routine cannot suspend".into(),
                        ));
                    }
                    self.pending_input = Some(pending);
                    return Ok(ExecutionResult::Continue);
                }
            }
        }
    }

    pub(crate) fn line_capacity(&self, text_buffer: u32) -> ZmResult<usize> {
        let max = self.vm.game.memory.read_byte(text_buffer)? as usize;
        Ok(if self.vm.version() <= 4 {
            max.saturating_sub(1)
        } else {
            max
        })
    }

    /// Run a timed-input routine as an ordinary call and report whether it
    /// asked to terminate input (non-zero return)
    fn call_timer_routine(&mut self, packed: u16) -> ZmResult<bool> {
        let depth = self.vm.call_stack.len();
        self.in_timer_routine = true;
        let outcome = self.run_nested(packed, depth);
        self.in_timer_routine = false;
        outcome
    }

    fn run_nested(&mut self, packed: u16, depth: usize) -> ZmResult<bool> {
        if let ExecutionResult::Continue = self.do_call(packed, &[], None)? {
            // Calling address 0 does nothing
            return Ok(false);
        }
        let mut value = 0u16;
        while self.vm.call_stack.len() > depth {
            let pc = self.vm.pc;
            let inst =
                Instruction::decode(self.vm.game.memory.bytes(), pc as usize, self.vm.version())?;
            self.vm.pc = pc + inst.size as u32;
            self.instruction_count += 1;
            match self.execute(&inst)? {
                ExecutionResult::Returned(v) if self.vm.call_stack.len() <= depth => {
                    value = v;
                }
                ExecutionResult::Quit | ExecutionResult::GameOver => {
                    self.halted = true;
                    return Ok(true);
                }
                _ => {}
            }
        }
        Ok(value != 0)
    }

    /// V1-3 redraw the status line before every read and on show_status
    pub(crate) fn update_status_line(&mut self) -> ZmResult<()> {
        if self.vm.version() > 3 {
            return Ok(());
        }
        let location_obj = self.vm.read_global(0x10)?;
        let location = if location_obj != 0 {
            self.vm.objects.name(&self.vm.game.memory, location_obj)?
        } else {
            String::new()
        };
        let a = self.vm.read_global(0x11)?;
        let b = self.vm.read_global(0x12)?;
        // flags1 bit 1 marks a "time game" in V3
        let right = if self.vm.version() == 3 && self.vm.game.header.flags1 & 0x02 != 0 {
            StatusRight::Time {
                hours: a,
                minutes: b,
            }
        } else {
            StatusRight::Score {
                score: a as i16,
                moves: b,
            }
        };
        self.io.show_status(&location, right)
    }

    /// Write a completed input line into the text buffer, tokenise, and
    /// (V5+) store the terminator
    pub(crate) fn complete_line_input(
        &mut self,
        pending: &PendingInput,
        line: &str,
        terminator: u8,
    ) -> ZmResult<()> {
        let version = self.vm.version();
        let capacity = self.line_capacity(pending.text_buffer)?;
        let chars: Vec<u8> = line
            .to_lowercase()
            .chars()
            .filter_map(text::char_to_zscii)
            .take(capacity)
            .collect();

        let text_buffer = pending.text_buffer;
        {
            let mem = &mut self.vm.game.memory;
            if version <= 4 {
                for (i, &ch) in chars.iter().enumerate() {
                    mem.write_byte(text_buffer + 1 + i as u32, ch)?;
                }
                mem.write_byte(text_buffer + 1 + chars.len() as u32, 0)?;
            } else {
                mem.write_byte(text_buffer + 1, chars.len() as u8)?;
                for (i, &ch) in chars.iter().enumerate() {
                    mem.write_byte(text_buffer + 2 + i as u32, ch)?;
                }
            }
        }

        if pending.parse_buffer != 0 {
            let vm = &mut self.vm;
            let dict = vm
                .dictionary
                .as_ref()
                .ok_or_else(|| ZmError::Dictionary("story has no dictionary".into()))?;
            crate::dictionary::tokenise(
                &mut vm.game.memory,
                version,
                text_buffer,
                pending.parse_buffer,
                dict,
                false,
            )?;
        }

        if version >= 5 {
            if let Some(var) = pending.store_var {
                self.vm.write_variable(var, terminator as u16)?;
            }
        }
        Ok(())
    }

    pub(crate) fn complete_char_input(
        &mut self,
        pending: &PendingInput,
        key: u8,
    ) -> ZmResult<()> {
        if let Some(var) = pending.store_var {
            self.vm.write_variable(var, key as u16)?;
        }
        Ok(())
    }
}
