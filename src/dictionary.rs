//! Dictionary table and the tokeniser behind the read opcodes
//!
//! The table header carries word-separator characters, an entry length and
//! a signed entry count; a negative count marks a game-sorted ("unsorted")
//! table that must be scanned linearly. Keys are encoded Z-words: 4 bytes
//! in V1-3, 6 bytes in V4+.

use std::cmp::Ordering;

use log::debug;

use crate::error::{ZmError, ZmResult};
use crate::memory::Memory;
use crate::text;

pub struct Dictionary {
    pub addr: u32,
    separators: Vec<u8>,
    entry_length: u8,
    entry_count: i16,
    entries_addr: u32,
    key_len: usize,
}

impl Dictionary {
    pub fn parse(mem: &Memory, addr: u16, version: u8) -> ZmResult<Dictionary> {
        let addr = addr as u32;
        let sep_count = mem.read_byte(addr)? as u32;
        let mut separators = Vec::with_capacity(sep_count as usize);
        for i in 0..sep_count {
            separators.push(mem.read_byte(addr + 1 + i)?);
        }
        let header = addr + 1 + sep_count;
        let entry_length = mem.read_byte(header)?;
        let entry_count = mem.read_word(header + 1)? as i16;
        let key_len = text::encoded_length(version) / 3 * 2;
        if (entry_length as usize) < key_len {
            return Err(ZmError::Dictionary(format!(
                "entry length {entry_length} shorter than the {key_len}-byte key"
            )));
        }
        debug!(
            "dictionary at {:#06x}: {} entries of {} bytes, {} separators",
            addr,
            entry_count,
            entry_length,
            separators.len()
        );
        Ok(Dictionary {
            addr,
            separators,
            entry_length,
            entry_count,
            entries_addr: header + 3,
            key_len,
        })
    }

    pub fn separators(&self) -> &[u8] {
        &self.separators
    }

    fn compare_entry(&self, mem: &Memory, index: u32, key: &[u8]) -> ZmResult<Ordering> {
        let addr = self.entries_addr + index * self.entry_length as u32;
        let entry = mem.read_bytes(addr, self.key_len)?;
        Ok(entry.cmp(&key[..self.key_len]))
    }

    /// Byte address of the entry matching an encoded word, or 0. Sorted
    /// tables binary-search; negative counts force a linear scan.
    pub fn lookup(&self, mem: &Memory, key: &[u8]) -> ZmResult<u16> {
        if self.entry_count < 0 {
            for index in 0..(-(self.entry_count as i32)) as u32 {
                if self.compare_entry(mem, index, key)? == Ordering::Equal {
                    return Ok((self.entries_addr + index * self.entry_length as u32) as u16);
                }
            }
            return Ok(0);
        }
        let mut low: i32 = 0;
        let mut high: i32 = self.entry_count as i32 - 1;
        while low <= high {
            let mid = (low + high) / 2;
            match self.compare_entry(mem, mid as u32, key)? {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid - 1,
                Ordering::Equal => {
                    return Ok((self.entries_addr + mid as u32 * self.entry_length as u32) as u16)
                }
            }
        }
        Ok(0)
    }
}

/// One token lifted out of the text buffer
struct Token {
    /// Offset of the first character within the input text
    offset: usize,
    chars: Vec<u8>,
}

/// Split the raw input into tokens: whitespace separates and is dropped,
/// dictionary separator characters separate and are tokens themselves
fn split(input: &[u8], separators: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word_start = None;
    for (i, &ch) in input.iter().enumerate() {
        if ch == b' ' || separators.contains(&ch) {
            if let Some(start) = word_start.take() {
                tokens.push(Token {
                    offset: start,
                    chars: input[start..i].to_vec(),
                });
            }
            if ch != b' ' {
                tokens.push(Token {
                    offset: i,
                    chars: vec![ch],
                });
            }
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(start) = word_start {
        tokens.push(Token {
            offset: start,
            chars: input[start..].to_vec(),
        });
    }
    tokens
}

/// Fill the parse buffer from the text buffer, as the read opcodes and
/// `tokenise` do. With `keep_existing` set (V5 flag), slots already
/// holding a non-zero dictionary address are left untouched.
pub fn tokenise(
    mem: &mut Memory,
    version: u8,
    text_addr: u32,
    parse_addr: u32,
    dict: &Dictionary,
    keep_existing: bool,
) -> ZmResult<()> {
    // Text layout: V1-4 store a zero-terminated string from byte 1;
    // V5+ store a length at byte 1 and characters from byte 2
    let (text_base, input) = if version <= 4 {
        let mut chars = Vec::new();
        let mut offset = 1;
        loop {
            let ch = mem.read_byte(text_addr + offset)?;
            if ch == 0 {
                break;
            }
            chars.push(ch);
            offset += 1;
        }
        (1u32, chars)
    } else {
        let len = mem.read_byte(text_addr + 1)? as usize;
        (2u32, mem.read_bytes(text_addr + 2, len)?.to_vec())
    };

    let max_words = mem.read_byte(parse_addr)? as usize;
    let tokens = split(&input, dict.separators());
    let stored = tokens.len().min(max_words);
    mem.write_byte(parse_addr + 1, stored as u8)?;

    for (i, token) in tokens.iter().take(stored).enumerate() {
        let entry_addr = parse_addr + 2 + 4 * i as u32;
        if keep_existing && mem.read_word(entry_addr)? != 0 {
            continue;
        }
        let key = text::encode_word(mem.bytes(), version, &token.chars);
        let dict_addr = dict.lookup(mem, &key)?;
        debug!(
            "token '{}' -> {:#06x}",
            token.chars.iter().map(|&b| b as char).collect::<String>(),
            dict_addr
        );
        mem.write_word(entry_addr, dict_addr)?;
        mem.write_byte(entry_addr + 2, token.chars.len() as u8)?;
        mem.write_byte(entry_addr + 3, (token.offset as u32 + text_base) as u8)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICT: u32 = 0x200;

    /// V3 image with a dictionary of the given words (in the given order)
    /// and a comma separator. Entry length 7: 4 key bytes + 3 data bytes.
    fn fixture(words: &[&str], count: i16) -> Memory {
        let mut bytes = vec![0u8; 0x800];
        bytes[0x00] = 3;
        bytes[0x0e] = 0x07; // static base 0x0700
        bytes[0x08] = 0x02; // dictionary at 0x0200

        let d = DICT as usize;
        bytes[d] = 1; // one separator
        bytes[d + 1] = b',';
        bytes[d + 2] = 7; // entry length
        bytes[d + 3] = (count as u16 >> 8) as u8;
        bytes[d + 4] = (count as u16 & 0xff) as u8;
        for (i, word) in words.iter().enumerate() {
            let key = text::encode_word(&bytes, 3, word.as_bytes());
            let at = d + 5 + i * 7;
            bytes[at..at + 4].copy_from_slice(&key);
        }
        Memory::new(bytes).unwrap()
    }

    fn sorted_fixture() -> Memory {
        // Pre-sorted by encoded key; alphabetic order matches here
        fixture(&["go", "lamp", "look", "take"], 4)
    }

    #[test]
    fn binary_search_finds_every_entry() {
        let mem = sorted_fixture();
        let dict = Dictionary::parse(&mem, DICT as u16, 3).unwrap();
        for (i, word) in ["go", "lamp", "look", "take"].iter().enumerate() {
            let key = text::encode_word(mem.bytes(), 3, word.as_bytes());
            let addr = dict.lookup(&mem, &key).unwrap();
            assert_eq!(addr as usize, DICT as usize + 5 + i * 7, "word {word}");
        }
        let key = text::encode_word(mem.bytes(), 3, b"xyzzy");
        assert_eq!(dict.lookup(&mem, &key).unwrap(), 0);
    }

    #[test]
    fn negative_count_scans_linearly() {
        // Deliberately unsorted table
        let mem = fixture(&["take", "go", "look"], -3);
        let dict = Dictionary::parse(&mem, DICT as u16, 3).unwrap();
        let key = text::encode_word(mem.bytes(), 3, b"look");
        assert_eq!(
            dict.lookup(&mem, &key).unwrap() as usize,
            DICT as usize + 5 + 2 * 7
        );
    }

    #[test]
    fn entry_length_below_key_width_is_rejected() {
        let mut bytes = vec![0u8; 0x800];
        bytes[0x00] = 3;
        bytes[0x0e] = 0x07;
        bytes[0x200] = 0;
        bytes[0x201] = 3; // too short for a 4-byte key
        let mem = Memory::new(bytes).unwrap();
        assert!(matches!(
            Dictionary::parse(&mem, 0x200, 3),
            Err(ZmError::Dictionary(_))
        ));
    }

    fn write_input(mem: &mut Memory, text_addr: u32, line: &str) {
        mem.write_byte(text_addr, 40).unwrap();
        for (i, b) in line.bytes().enumerate() {
            mem.write_byte(text_addr + 1 + i as u32, b).unwrap();
        }
        mem.write_byte(text_addr + 1 + line.len() as u32, 0).unwrap();
    }

    #[test]
    fn tokenise_fills_parse_entries() {
        let mut mem = sorted_fixture();
        let dict = Dictionary::parse(&mem, DICT as u16, 3).unwrap();
        let (text_addr, parse_addr) = (0x500, 0x540);
        write_input(&mut mem, text_addr, "look, lamp");
        mem.write_byte(parse_addr, 10).unwrap();

        tokenise(&mut mem, 3, text_addr, parse_addr, &dict, false).unwrap();

        assert_eq!(mem.read_byte(parse_addr + 1).unwrap(), 3);
        // "look" found at its entry, position counts from byte 1
        let look_addr = DICT + 5 + 2 * 7;
        assert_eq!(mem.read_word(parse_addr + 2).unwrap(), look_addr as u16);
        assert_eq!(mem.read_byte(parse_addr + 4).unwrap(), 4);
        assert_eq!(mem.read_byte(parse_addr + 5).unwrap(), 1);
        // the comma is its own (unknown) token at offset 4
        assert_eq!(mem.read_word(parse_addr + 6).unwrap(), 0);
        assert_eq!(mem.read_byte(parse_addr + 8).unwrap(), 1);
        assert_eq!(mem.read_byte(parse_addr + 9).unwrap(), 5);
        // "lamp"
        let lamp_addr = DICT + 5 + 7;
        assert_eq!(mem.read_word(parse_addr + 10).unwrap(), lamp_addr as u16);
        assert_eq!(mem.read_byte(parse_addr + 13).unwrap(), 7);
    }

    #[test]
    fn tokenise_truncates_at_parse_capacity() {
        let mut mem = sorted_fixture();
        let dict = Dictionary::parse(&mem, DICT as u16, 3).unwrap();
        write_input(&mut mem, 0x500, "go go go go");
        mem.write_byte(0x540, 2).unwrap();
        tokenise(&mut mem, 3, 0x500, 0x540, &dict, false).unwrap();
        assert_eq!(mem.read_byte(0x541).unwrap(), 2);
    }

    #[test]
    fn keep_existing_flag_preserves_filled_slots() {
        let mut mem = sorted_fixture();
        let dict = Dictionary::parse(&mem, DICT as u16, 3).unwrap();
        let (text_addr, parse_addr) = (0x500, 0x540);
        write_input(&mut mem, text_addr, "xyzzy lamp");
        mem.write_byte(parse_addr, 10).unwrap();
        // Slot 0 pre-filled by an earlier parse; slot 1 empty
        mem.write_word(parse_addr + 2, 0x1234).unwrap();

        tokenise(&mut mem, 3, text_addr, parse_addr, &dict, true).unwrap();

        assert_eq!(mem.read_word(parse_addr + 2).unwrap(), 0x1234);
        let lamp_addr = (DICT + 5 + 7) as u16;
        assert_eq!(mem.read_word(parse_addr + 6).unwrap(), lamp_addr);
    }

    #[test]
    fn v5_text_buffer_uses_length_byte() {
        let mut bytes = vec![0u8; 0x800];
        bytes[0x00] = 5;
        bytes[0x0e] = 0x07;
        bytes[0x08] = 0x02;
        let d = 0x200;
        bytes[d] = 0; // no separators
        bytes[d + 1] = 9; // entry length: 6-byte key + 3 data
        bytes[d + 2] = 0;
        bytes[d + 3] = 1;
        let key = text::encode_word(&bytes, 5, b"lantern");
        bytes[d + 4..d + 10].copy_from_slice(&key);
        let mut mem = Memory::new(bytes).unwrap();
        let dict = Dictionary::parse(&mem, 0x200, 5).unwrap();

        let (text_addr, parse_addr) = (0x500u32, 0x540u32);
        mem.write_byte(text_addr, 40).unwrap();
        mem.write_byte(text_addr + 1, 7).unwrap();
        for (i, b) in b"lantern".iter().enumerate() {
            mem.write_byte(text_addr + 2 + i as u32, *b).unwrap();
        }
        mem.write_byte(parse_addr, 5).unwrap();
        tokenise(&mut mem, 5, text_addr, parse_addr, &dict, false).unwrap();

        assert_eq!(mem.read_byte(parse_addr + 1).unwrap(), 1);
        assert_eq!(mem.read_word(parse_addr + 2).unwrap(), (d + 4) as u16);
        assert_eq!(mem.read_byte(parse_addr + 4).unwrap(), 7);
        // V5 positions count from byte 2
        assert_eq!(mem.read_byte(parse_addr + 5).unwrap(), 2);
    }
}
