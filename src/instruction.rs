//! Instruction decoder: one byte address in, one decoded record out
//!
//! The four encoding forms share a common tail: operands, then an optional
//! store byte, optional branch bytes, optional inline text. Which of those
//! are present comes from the opcode metadata tables, so the decoder itself
//! holds no per-opcode knowledge beyond form selection.

use std::fmt::{self, Display, Formatter, Write as _};

use log::trace;

use crate::error::{ZmError, ZmResult};
use crate::opcode_tables::{ext_opcode_info, opcode_info, takes_double_type_byte, OpcodeInfo};
use crate::text;

/// A decoded operand. Variables are resolved at execution time, in
/// left-to-right order, so that variable 0 pops at the right moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    LargeConstant(u16),
    SmallConstant(u8),
    Variable(u8),
}

impl Operand {
    /// The raw encoded value, before any variable resolution
    pub fn raw(self) -> u16 {
        match self {
            Operand::LargeConstant(v) => v,
            Operand::SmallConstant(v) => v as u16,
            Operand::Variable(v) => v as u16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandCount {
    OP0,
    OP1,
    OP2,
    VAR,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Branch when the condition matches this value
    pub on_true: bool,
    /// Signed offset; 0 and 1 mean return-false / return-true instead
    pub offset: i16,
}

/// A fully decoded instruction
#[derive(Debug, Clone)]
pub struct Instruction {
    /// Address of the opcode byte
    pub addr: u32,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    /// Opcode number within its class
    pub opcode: u8,
    /// Second opcode byte for extended-form instructions
    pub ext_opcode: Option<u8>,
    pub operands: Vec<Operand>,
    pub store_var: Option<u8>,
    pub branch: Option<BranchInfo>,
    /// Decoded inline text for print / print_ret
    pub text: Option<String>,
    /// How many bytes the branch occupied (0, 1 or 2)
    pub branch_bytes: usize,
    /// Total length in bytes, operands through inline text
    pub size: usize,
    name: &'static str,
}

/// Bounds-checked byte cursor over the story image
struct Cursor<'a> {
    memory: &'a [u8],
    start: u32,
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn next(&mut self) -> ZmResult<u8> {
        let byte = self.memory.get(self.offset).copied().ok_or(ZmError::Decode {
            addr: self.start,
            reason: format!("instruction truncated at byte offset {}", self.offset),
        })?;
        self.offset += 1;
        Ok(byte)
    }

    fn next_word(&mut self) -> ZmResult<u16> {
        let high = self.next()?;
        let low = self.next()?;
        Ok(((high as u16) << 8) | low as u16)
    }
}

impl Instruction {
    /// Decode the instruction starting at `addr`. Unknown opcodes decode
    /// successfully (with the name "unknown") so a disassembler can still
    /// show the bytes; only dispatch treats them as fatal.
    pub fn decode(memory: &[u8], addr: usize, version: u8) -> ZmResult<Self> {
        let mut cursor = Cursor {
            memory,
            start: addr as u32,
            offset: addr,
        };
        let opcode_byte = cursor.next()?;

        let (form, operand_count, opcode, ext_opcode) = if opcode_byte == 0xbe && version >= 5 {
            (
                InstructionForm::Extended,
                OperandCount::VAR,
                opcode_byte,
                Some(cursor.next()?),
            )
        } else {
            match opcode_byte >> 6 {
                0b11 => {
                    let count = if opcode_byte & 0x20 == 0 {
                        OperandCount::OP2
                    } else {
                        OperandCount::VAR
                    };
                    (InstructionForm::Variable, count, opcode_byte & 0x1f, None)
                }
                0b10 => {
                    let count = if (opcode_byte >> 4) & 0x03 == 0x03 {
                        OperandCount::OP0
                    } else {
                        OperandCount::OP1
                    };
                    (InstructionForm::Short, count, opcode_byte & 0x0f, None)
                }
                _ => (
                    InstructionForm::Long,
                    OperandCount::OP2,
                    opcode_byte & 0x1f,
                    None,
                ),
            }
        };

        // Collect the operand kinds the encoding declares
        let mut kinds: Vec<u8> = Vec::new();
        match form {
            InstructionForm::Long => {
                // Bit 6 / bit 5: 0 = small constant, 1 = variable
                kinds.push(if opcode_byte & 0x40 != 0 { 0b10 } else { 0b01 });
                kinds.push(if opcode_byte & 0x20 != 0 { 0b10 } else { 0b01 });
            }
            InstructionForm::Short => {
                if operand_count == OperandCount::OP1 {
                    kinds.push((opcode_byte >> 4) & 0x03);
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                let type_bytes = if form == InstructionForm::Variable
                    && operand_count == OperandCount::VAR
                    && takes_double_type_byte(opcode)
                {
                    2
                } else {
                    1
                };
                let mut done = false;
                for _ in 0..type_bytes {
                    let byte = cursor.next()?;
                    for field in 0..4 {
                        let kind = (byte >> (6 - field * 2)) & 0x03;
                        if kind == 0b11 {
                            done = true;
                        }
                        if !done {
                            kinds.push(kind);
                        }
                    }
                }
            }
        }

        let mut operands = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let operand = match kind {
                0b00 => Operand::LargeConstant(cursor.next_word()?),
                0b01 => Operand::SmallConstant(cursor.next()?),
                0b10 => Operand::Variable(cursor.next()?),
                _ => unreachable!("omitted kinds never reach operand reading"),
            };
            operands.push(operand);
        }

        let info: Option<OpcodeInfo> = match form {
            InstructionForm::Extended => ext_opcode_info(ext_opcode.unwrap_or(0), version),
            _ => opcode_info(operand_count, opcode, version),
        };
        let (name, stores, branches, has_text) = match info {
            Some(i) => (i.name, i.stores, i.branches, i.text),
            None => ("unknown", false, false, false),
        };

        let store_var = if stores { Some(cursor.next()?) } else { None };

        let mut branch_bytes = 0;
        let branch = if branches {
            let first = cursor.next()?;
            let on_true = first & 0x80 != 0;
            let offset = if first & 0x40 != 0 {
                // One-byte form: 6-bit unsigned offset
                branch_bytes = 1;
                (first & 0x3f) as i16
            } else {
                // Two-byte form: 14-bit signed offset
                let second = cursor.next()?;
                branch_bytes = 2;
                let raw = (((first & 0x3f) as u16) << 8) | second as u16;
                if raw & 0x2000 != 0 {
                    (raw | 0xc000) as i16
                } else {
                    raw as i16
                }
            };
            Some(BranchInfo { on_true, offset })
        } else {
            None
        };

        let inline_text = if has_text {
            let (string, len) = text::decode_string(memory, cursor.offset, version)?;
            cursor.offset += len;
            Some(string)
        } else {
            None
        };

        let size = cursor.offset - addr;
        trace!(
            "decoded {:#07x}: {} ({:?}/{:?}), {} bytes",
            addr,
            name,
            form,
            operand_count,
            size
        );

        Ok(Instruction {
            addr: addr as u32,
            form,
            operand_count,
            opcode,
            ext_opcode,
            operands,
            store_var,
            branch,
            text: inline_text,
            branch_bytes,
            size,
            name,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Address of the instruction's store byte. Only meaningful for
    /// opcodes whose store byte ends the instruction (save/restore and the
    /// undo pair use it to re-route their result on the restored side).
    pub fn store_byte_addr(&self) -> Option<u32> {
        self.store_var?;
        Some(self.addr + self.size as u32 - 1)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match operand {
                Operand::Variable(v) => write!(f, "V{v:02x}")?,
                other => write!(f, "#{:04x}", other.raw())?,
            }
        }
        if let Some(var) = self.store_var {
            write!(f, " -> V{var:02x}")?;
        }
        if let Some(ref branch) = self.branch {
            let mut target = String::new();
            match branch.offset {
                0 => target.push_str("RFALSE"),
                1 => target.push_str("RTRUE"),
                n => write!(target, "{n:+}").unwrap(),
            }
            write!(f, " [{} {}]", if branch.on_true { "TRUE" } else { "FALSE" }, target)?;
        }
        if let Some(ref text) = self.text {
            write!(f, " \"{text}\"")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_at(bytes: &[u8], at: usize, version: u8) -> Instruction {
        let mut memory = vec![0u8; 0x400];
        memory[at..at + bytes.len()].copy_from_slice(bytes);
        Instruction::decode(&memory, at, version).unwrap()
    }

    #[test]
    fn long_form_add_with_store() {
        let inst = decode_at(&[0x14, 0x05, 0x03, 0x10], 0x100, 3);
        assert_eq!(inst.form, InstructionForm::Long);
        assert_eq!(inst.operand_count, OperandCount::OP2);
        assert_eq!(inst.name(), "add");
        assert_eq!(
            inst.operands,
            vec![Operand::SmallConstant(5), Operand::SmallConstant(3)]
        );
        assert_eq!(inst.store_var, Some(0x10));
        assert!(inst.branch.is_none());
        assert_eq!(inst.size, 4);
    }

    #[test]
    fn short_form_jz_with_large_constant_and_branch() {
        let inst = decode_at(&[0x80, 0x12, 0x34, 0xc5], 0x100, 3);
        assert_eq!(inst.form, InstructionForm::Short);
        assert_eq!(inst.operand_count, OperandCount::OP1);
        assert_eq!(inst.name(), "jz");
        assert_eq!(inst.operands, vec![Operand::LargeConstant(0x1234)]);
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.offset, 5);
        assert_eq!(inst.size, 4);
    }

    #[test]
    fn two_byte_branch_sign_extends() {
        // je V01, V01 with a long-form negative branch of -2
        let inst = decode_at(&[0x61, 0x01, 0x01, 0xbf, 0xfe], 0x100, 3);
        let branch = inst.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.offset, -2);
        assert_eq!(inst.size, 5);
    }

    #[test]
    fn branch_offsets_zero_and_one_survive_decoding() {
        let rfalse = decode_at(&[0x61, 0x01, 0x01, 0xc0], 0x100, 3);
        assert_eq!(rfalse.branch.unwrap().offset, 0);
        let rtrue = decode_at(&[0x61, 0x01, 0x01, 0xc1], 0x100, 3);
        assert_eq!(rtrue.branch.unwrap().offset, 1);
    }

    #[test]
    fn variable_form_call_reads_type_byte() {
        let inst = decode_at(
            &[0xe0, 0x2a, 0x12, 0x34, 0x01, 0x02, 0x03, 0x00],
            0x100,
            3,
        );
        assert_eq!(inst.form, InstructionForm::Variable);
        assert_eq!(inst.operand_count, OperandCount::VAR);
        assert_eq!(inst.name(), "call");
        assert_eq!(
            inst.operands,
            vec![
                Operand::LargeConstant(0x1234),
                Operand::Variable(0x01),
                Operand::Variable(0x02),
                Operand::Variable(0x03),
            ]
        );
        assert_eq!(inst.store_var, Some(0x00));
        assert_eq!(inst.size, 8);
    }

    #[test]
    fn omitted_type_terminates_operand_list() {
        // print_num with one small constant; remaining fields omitted
        let inst = decode_at(&[0xe6, 0x7f, 0x2a], 0x100, 3);
        assert_eq!(inst.name(), "print_num");
        assert_eq!(inst.operands, vec![Operand::SmallConstant(0x2a)]);
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn variable_form_of_2op_keeps_2op_metadata() {
        // VAR-form je with three operands
        let inst = decode_at(&[0xc1, 0x57, 0x01, 0x02, 0x03, 0xc4], 0x100, 3);
        assert_eq!(inst.operand_count, OperandCount::OP2);
        assert_eq!(inst.name(), "je");
        assert_eq!(inst.operands.len(), 3);
        assert!(inst.branch.is_some());
    }

    #[test]
    fn call_vs2_reads_two_type_bytes() {
        let inst = decode_at(
            &[
                0xec, // VAR form, call_vs2
                0x15, 0x5f, // type bytes: large, then 5 smalls, omit
                0x12, 0x34, 0x01, 0x02, 0x03, 0x04, 0x05, // operands
                0x00, // store
            ],
            0x100,
            5,
        );
        assert_eq!(inst.name(), "call_vs2");
        assert_eq!(inst.operands.len(), 6);
        assert_eq!(inst.store_var, Some(0x00));
        assert_eq!(inst.size, 11);
    }

    #[test]
    fn extended_form_reads_second_opcode_byte() {
        let inst = decode_at(&[0xbe, 0x02, 0x6f, 0x01, 0x02, 0x05], 0x100, 5);
        assert_eq!(inst.form, InstructionForm::Extended);
        assert_eq!(inst.name(), "log_shift");
        assert_eq!(inst.ext_opcode, Some(0x02));
        assert_eq!(inst.operands.len(), 2);
        assert_eq!(inst.store_var, Some(0x05));
    }

    #[test]
    fn inline_text_counts_toward_size() {
        // print "hi": h(13) i(14) pad, one word with terminal bit
        // 1_01101_01110_00101 = 0xb5c5
        let inst = decode_at(&[0xb2, 0xb5, 0xc5], 0x100, 3);
        assert_eq!(inst.name(), "print");
        assert_eq!(inst.text.as_deref(), Some("hi"));
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn unknown_opcode_still_decodes() {
        // 2OP slot 0x00 is undefined in every version
        let inst = decode_at(&[0x40, 0x01, 0x02], 0x100, 3);
        assert_eq!(inst.name(), "unknown");
        assert!(inst.store_var.is_none());
        assert!(inst.branch.is_none());
        assert_eq!(inst.size, 3);
    }

    #[test]
    fn truncated_instruction_is_a_decode_error() {
        let memory = vec![0xe0u8]; // call with no type byte
        assert!(matches!(
            Instruction::decode(&memory, 0, 3),
            Err(ZmError::Decode { .. })
        ));
    }

    #[test]
    fn consecutive_decodes_line_up() {
        // add; new_line; quit laid out back to back
        let mut memory = vec![0u8; 0x200];
        let program: &[u8] = &[0x14, 0x05, 0x03, 0x10, 0xbb, 0xba];
        memory[0x100..0x100 + program.len()].copy_from_slice(program);
        let first = Instruction::decode(&memory, 0x100, 3).unwrap();
        let second = Instruction::decode(&memory, 0x100 + first.size, 3).unwrap();
        assert_eq!(second.name(), "new_line");
        let third = Instruction::decode(&memory, 0x100 + first.size + second.size, 3).unwrap();
        assert_eq!(third.name(), "quit");
    }
}
