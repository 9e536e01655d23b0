//! Output, input and screen opcodes, plus the output-stream routing
//!
//! All game text funnels through `output`, which honours stream 3
//! (memory-table redirection, exclusive while open), stream 1 (the
//! screen) and stream 2 (the transcript, slaved to the flags2 bit the
//! game controls).

use log::debug;

use crate::dictionary::{self, Dictionary};
use crate::error::{ZmError, ZmResult};
use crate::header::FLAG2_TRANSCRIPT;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter, PendingInput, PendingKind, STREAM3_DEPTH};
use crate::text;

impl Interpreter {
    /// Route text to whichever output streams are live
    pub(crate) fn output(&mut self, text: &str) -> ZmResult<()> {
        if let Some(&table) = self.stream3.last() {
            // Stream 3 captures everything; nothing else sees the text
            let mem = &mut self.vm.game.memory;
            let mut count = mem.read_word(table)?;
            for ch in text.chars() {
                let code = text::char_to_zscii(ch).unwrap_or(b'?');
                mem.write_byte(table + 2 + count as u32, code)?;
                count = count.wrapping_add(1);
            }
            mem.write_word(table, count)?;
            return Ok(());
        }
        if self.stream1_on {
            self.io.print(text)?;
        }
        if self.vm.game.header.flag2(FLAG2_TRANSCRIPT) {
            self.io.transcript(text);
        }
        Ok(())
    }

    pub(crate) fn op_print(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        if let Some(text) = inst.text.clone() {
            self.output(&text)?;
        }
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_print_ret(&mut self, inst: &Instruction) -> ZmResult<ExecutionResult> {
        if let Some(text) = inst.text.clone() {
            self.output(&text)?;
        }
        self.output("\n")?;
        self.do_return(1)
    }

    pub(crate) fn op_print_addr(&mut self, addr: u16) -> ZmResult<ExecutionResult> {
        let (text, _) =
            text::decode_string(self.vm.game.memory.bytes(), addr as usize, self.vm.version())?;
        self.output(&text)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_print_paddr(&mut self, packed: u16) -> ZmResult<ExecutionResult> {
        let addr = self.vm.game.memory.unpack_string(packed);
        let (text, _) =
            text::decode_string(self.vm.game.memory.bytes(), addr as usize, self.vm.version())?;
        self.output(&text)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_print_char(&mut self, code: u16) -> ZmResult<ExecutionResult> {
        match text::zscii_to_char(code) {
            Some(ch) => self.output(&ch.to_string())?,
            None => debug!("print_char: unprintable ZSCII {code}"),
        }
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_print_num(&mut self, value: u16) -> ZmResult<ExecutionResult> {
        self.output(&(value as i16).to_string())?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_print_unicode(&mut self, code: u16) -> ZmResult<ExecutionResult> {
        match char::from_u32(code as u32) {
            Some(ch) => self.output(&ch.to_string())?,
            None => self.output("?")?,
        }
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_check_unicode(
        &mut self,
        inst: &Instruction,
        code: u16,
    ) -> ZmResult<ExecutionResult> {
        // Bit 0: can print, bit 1: can receive
        let capable = match char::from_u32(code as u32) {
            Some(ch) if !ch.is_control() => 3,
            _ => 0,
        };
        self.store_result(inst, capable)
    }

    /// sread/aread: fetch a line, fill the text buffer, tokenise
    pub(crate) fn op_read(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZmResult<ExecutionResult> {
        if self.vm.version() <= 3 {
            self.update_status_line()?;
        }
        let pending = PendingInput {
            kind: PendingKind::Line,
            text_buffer: operands[0] as u32,
            parse_buffer: *operands.get(1).unwrap_or(&0) as u32,
            store_var: inst.store_var,
            time_tenths: *operands.get(2).unwrap_or(&0),
            timer_routine: *operands.get(3).unwrap_or(&0),
        };
        self.request_input(pending)
    }

    pub(crate) fn op_read_char(
        &mut self,
        inst: &Instruction,
        operands: &[u16],
    ) -> ZmResult<ExecutionResult> {
        // Operand 1 is always "the keyboard"
        if *operands.first().unwrap_or(&1) != 1 {
            debug!("read_char from device {}", operands[0]);
        }
        let pending = PendingInput {
            kind: PendingKind::Char,
            text_buffer: 0,
            parse_buffer: 0,
            store_var: inst.store_var,
            time_tenths: *operands.get(1).unwrap_or(&0),
            timer_routine: *operands.get(2).unwrap_or(&0),
        };
        self.request_input(pending)
    }

    pub(crate) fn op_output_stream(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let stream = operands[0] as i16;
        match stream {
            0 => {}
            1 => self.stream1_on = true,
            -1 => self.stream1_on = false,
            2 => {
                let vm = &mut self.vm;
                vm.game
                    .header
                    .set_flag2(&mut vm.game.memory, FLAG2_TRANSCRIPT, true)?;
            }
            -2 => {
                let vm = &mut self.vm;
                vm.game
                    .header
                    .set_flag2(&mut vm.game.memory, FLAG2_TRANSCRIPT, false)?;
            }
            3 => {
                if self.stream3.len() >= STREAM3_DEPTH {
                    return Err(ZmError::Io("output_stream 3 nested too deep".into()));
                }
                let table = *operands.get(1).ok_or_else(|| {
                    ZmError::Io("output_stream 3 needs a table".into())
                })? as u32;
                self.vm.game.memory.write_word(table, 0)?;
                self.stream3.push(table);
            }
            -3 => {
                if self.stream3.pop().is_none() {
                    debug!("output_stream -3 with no stream 3 open");
                }
            }
            // Stream 4 (commands) is the host's business
            4 | -4 => {}
            _ => {
                return Err(ZmError::Io(format!("unknown output stream {stream}")));
            }
        }
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_input_stream(&mut self, stream: u16) -> ZmResult<ExecutionResult> {
        debug!("input_stream {stream} (keyboard only here)");
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_sound_effect(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let number = *operands.first().unwrap_or(&1);
        let effect = *operands.get(1).unwrap_or(&0);
        let volume = *operands.get(2).unwrap_or(&0);
        self.io.sound_effect(number, effect, volume)?;
        Ok(ExecutionResult::Continue)
    }

    // --- window group ---

    pub(crate) fn op_split_window(&mut self, lines: u16) -> ZmResult<ExecutionResult> {
        self.io.split_window(lines)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_set_window(&mut self, window: u16) -> ZmResult<ExecutionResult> {
        self.io.set_window(window)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_erase_window(&mut self, window: u16) -> ZmResult<ExecutionResult> {
        self.io.erase_window(window as i16)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_erase_line(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        if *operands.first().unwrap_or(&0) == 1 {
            self.io.erase_line()?;
        }
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_set_cursor(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let line = operands[0] as i16;
        let column = *operands.get(1).unwrap_or(&1);
        if line > 0 {
            self.io.set_cursor(line as u16, column)?;
        }
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_get_cursor(&mut self, array: u16) -> ZmResult<ExecutionResult> {
        let (line, column) = self.io.cursor()?;
        self.vm.game.memory.write_word(array as u32, line)?;
        self.vm.game.memory.write_word(array as u32 + 2, column)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_set_text_style(&mut self, style: u16) -> ZmResult<ExecutionResult> {
        self.io.set_text_style(style)?;
        Ok(ExecutionResult::Continue)
    }

    pub(crate) fn op_buffer_mode(&mut self, mode: u16) -> ZmResult<ExecutionResult> {
        self.io.set_buffer_mode(mode != 0)?;
        Ok(ExecutionResult::Continue)
    }

    /// print_table: rows of ZSCII laid out left to right
    pub(crate) fn op_print_table(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let addr = operands[0] as u32;
        let width = operands[1] as u32;
        let height = *operands.get(2).unwrap_or(&1) as u32;
        let skip = *operands.get(3).unwrap_or(&0) as u32;
        for row in 0..height {
            if row > 0 {
                self.output("\n")?;
            }
            let start = addr + row * (width + skip);
            let mut line = String::new();
            for i in 0..width {
                let code = self.vm.game.memory.read_byte(start + i)?;
                if let Some(ch) = text::zscii_to_char(code as u16) {
                    line.push(ch);
                }
            }
            self.output(&line)?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// tokenise text parse [dictionary] [flag]
    pub(crate) fn op_tokenise(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let text_addr = operands[0] as u32;
        let parse_addr = operands[1] as u32;
        let dict_addr = *operands.get(2).unwrap_or(&0);
        let keep_existing = *operands.get(3).unwrap_or(&0) != 0;
        let version = self.vm.version();

        if dict_addr != 0 {
            let custom = Dictionary::parse(&self.vm.game.memory, dict_addr, version)?;
            dictionary::tokenise(
                &mut self.vm.game.memory,
                version,
                text_addr,
                parse_addr,
                &custom,
                keep_existing,
            )?;
        } else {
            let vm = &mut self.vm;
            let dict = vm
                .dictionary
                .as_ref()
                .ok_or_else(|| ZmError::Dictionary("story has no dictionary".into()))?;
            dictionary::tokenise(
                &mut vm.game.memory,
                version,
                text_addr,
                parse_addr,
                dict,
                keep_existing,
            )?;
        }
        Ok(ExecutionResult::Continue)
    }

    /// encode_text zscii-text length from coded-text
    pub(crate) fn op_encode_text(&mut self, operands: &[u16]) -> ZmResult<ExecutionResult> {
        let text_addr = operands[0] as u32;
        let length = operands[1] as usize;
        let from = operands[2] as u32;
        let coded_addr = operands[3] as u32;
        let word = self
            .vm
            .game
            .memory
            .read_bytes(text_addr + from, length)?
            .to_vec();
        let encoded = text::encode_word(self.vm.game.memory.bytes(), self.vm.version(), &word);
        for (i, byte) in encoded.iter().enumerate() {
            self.vm.game.memory.write_byte(coded_addr + i as u32, *byte)?;
        }
        Ok(ExecutionResult::Continue)
    }
}
