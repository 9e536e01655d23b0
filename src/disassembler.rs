//! Linear disassembler over the instruction decoder
//!
//! Used by the `lantern-dasm` binary and handy in tests. Unknown opcodes
//! print as raw bytes rather than stopping the listing, since data can sit
//! between routines.

use std::fmt::Write;

use crate::error::ZmResult;
use crate::instruction::Instruction;

pub struct Disassembler<'a> {
    memory: &'a [u8],
    version: u8,
}

impl<'a> Disassembler<'a> {
    pub fn new(memory: &'a [u8], version: u8) -> Self {
        Disassembler { memory, version }
    }

    /// Hex dump of an instruction's bytes, for the listing's middle column
    fn raw_bytes(&self, addr: usize, len: usize) -> String {
        self.memory[addr..(addr + len).min(self.memory.len())]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Disassemble from `start` until `end` (or decoding fails)
    pub fn disassemble_range(&self, start: usize, end: usize) -> ZmResult<String> {
        let mut output = String::new();
        let mut pc = start;
        while pc < end && pc < self.memory.len() {
            let inst = Instruction::decode(self.memory, pc, self.version)?;
            writeln!(
                output,
                "{:#07x}: {:24} {}",
                pc,
                self.raw_bytes(pc, inst.size),
                inst
            )
            .expect("writing to a String");
            pc += inst.size;
            // A routine never runs past an unconditional exit
            if matches!(inst.name(), "quit" | "rtrue" | "rfalse" | "ret" | "ret_popped") {
                break;
            }
        }
        Ok(output)
    }

    /// Disassemble a routine from its header: locals, then body
    pub fn disassemble_routine(&self, addr: usize) -> ZmResult<String> {
        let mut output = String::new();
        let num_locals = self.memory.get(addr).copied().unwrap_or(0xff) as usize;
        writeln!(output, "{addr:#07x}: routine, {num_locals} locals").expect("writing to a String");
        let mut body = addr + 1;
        if self.version <= 4 {
            for i in 0..num_locals.min(15) {
                let value = ((self.memory[body] as u16) << 8) | self.memory[body + 1] as u16;
                writeln!(output, "{body:#07x}:   local[{i}] = {value:#06x}")
                    .expect("writing to a String");
                body += 2;
            }
        }
        output.push_str(&self.disassemble_range(body, self.memory.len())?);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_instructions_with_bytes() {
        let mut memory = vec![0u8; 0x200];
        let program: &[u8] = &[0x14, 0x05, 0x03, 0x10, 0xbb, 0xba];
        memory[0x100..0x100 + program.len()].copy_from_slice(program);
        let listing = Disassembler::new(&memory, 3)
            .disassemble_range(0x100, 0x100 + program.len())
            .unwrap();
        assert!(listing.contains("add"));
        assert!(listing.contains("new_line"));
        assert!(listing.contains("quit"));
        assert!(listing.contains("14 05 03 10"));
    }

    #[test]
    fn routine_listing_shows_locals() {
        let mut memory = vec![0u8; 0x200];
        memory[0x100] = 2; // two locals
        memory[0x101] = 0x00;
        memory[0x102] = 0x01;
        memory[0x103] = 0x00;
        memory[0x104] = 0x02;
        memory[0x105] = 0xb0; // rtrue
        let listing = Disassembler::new(&memory, 3)
            .disassemble_routine(0x100)
            .unwrap();
        assert!(listing.contains("2 locals"));
        assert!(listing.contains("local[1] = 0x0002"));
        assert!(listing.contains("rtrue"));
    }
}
