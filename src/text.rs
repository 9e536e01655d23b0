//! Z-character text: decoding packed strings and encoding dictionary words
//!
//! A Z-string is a run of big-endian words, three 5-bit Z-characters per
//! word, top bit set on the final word. Z-characters select from three
//! alphabets; codes below 6 are control characters whose meaning shifted
//! between versions 1-2 and 3+.

use bitreader::BitReader;
use lazy_static::lazy_static;
use log::{debug, trace};

use crate::error::{ZmError, ZmResult};

lazy_static! {
    static ref ALPHABET_A0: &'static [u8] = b"abcdefghijklmnopqrstuvwxyz";
    static ref ALPHABET_A1: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    /// A2 for V2+. Position 0 is the ZSCII escape, position 1 newline;
    /// both are handled before table lookup and the placeholders never print.
    static ref ALPHABET_A2: &'static [u8] = b"^\n0123456789.,!?_#'\"/\\-:()";
    /// V1 has no newline Z-character in A2 and gains '<'
    static ref ALPHABET_A2_V1: &'static [u8] = b"^0123456789.,!?_#'\"/\\<-:()";
}

/// Default translations for ZSCII 155-223 (the standard's extra characters)
const EXTRA_CHARS: [char; 69] = [
    '\u{e4}', '\u{f6}', '\u{fc}', '\u{c4}', '\u{d6}', '\u{dc}', '\u{df}', '\u{bb}', '\u{ab}',
    '\u{eb}', '\u{ef}', '\u{ff}', '\u{cb}', '\u{cf}', '\u{e1}', '\u{e9}', '\u{ed}', '\u{f3}',
    '\u{fa}', '\u{fd}', '\u{c1}', '\u{c9}', '\u{cd}', '\u{d3}', '\u{da}', '\u{dd}', '\u{e0}',
    '\u{e8}', '\u{ec}', '\u{f2}', '\u{f9}', '\u{c0}', '\u{c8}', '\u{cc}', '\u{d2}', '\u{d9}',
    '\u{e2}', '\u{ea}', '\u{ee}', '\u{f4}', '\u{fb}', '\u{c2}', '\u{ca}', '\u{ce}', '\u{d4}',
    '\u{db}', '\u{e5}', '\u{c5}', '\u{f8}', '\u{d8}', '\u{e3}', '\u{f1}', '\u{f5}', '\u{c3}',
    '\u{d1}', '\u{d5}', '\u{e6}', '\u{c6}', '\u{e7}', '\u{c7}', '\u{fe}', '\u{f0}', '\u{de}',
    '\u{d0}', '\u{a3}', '\u{153}', '\u{152}', '\u{a1}', '\u{bf}',
];

/// Translate a ZSCII code to a printable character. `None` means the code
/// produces no output (ZSCII 0) or is not printable.
pub fn zscii_to_char(code: u16) -> Option<char> {
    match code {
        0 => None,
        13 => Some('\n'),
        32..=126 => Some(code as u8 as char),
        155..=223 => Some(EXTRA_CHARS[(code - 155) as usize]),
        _ => {
            debug!("unprintable ZSCII code {code}");
            None
        }
    }
}

/// Translate a character to ZSCII for the input path and `encode_text`
pub fn char_to_zscii(ch: char) -> Option<u8> {
    match ch {
        '\n' | '\r' => Some(13),
        ' '..='~' => Some(ch as u8),
        _ => EXTRA_CHARS
            .iter()
            .position(|&c| c == ch)
            .map(|i| (155 + i) as u8),
    }
}

/// Split one packed word into its terminal flag and three Z-characters
fn unpack_zchars(word: [u8; 2]) -> ZmResult<(bool, [u8; 3])> {
    let mut reader = BitReader::new(&word);
    let last = reader.read_u8(1).map_err(bit_err)? == 1;
    let mut chars = [0u8; 3];
    for c in chars.iter_mut() {
        *c = reader.read_u8(5).map_err(bit_err)?;
    }
    Ok((last, chars))
}

fn bit_err(e: bitreader::BitReaderError) -> ZmError {
    ZmError::Decode {
        addr: 0,
        reason: format!("bit unpack failed: {e}"),
    }
}

/// Look up an alphabet character (Z-char 6..31), honouring a V5+ custom
/// alphabet table when the header declares one.
fn alphabet_char(memory: &[u8], version: u8, alphabet: u8, zchar: u8) -> Option<char> {
    let index = (zchar - 6) as usize;
    let table = if version >= 5 && memory.len() > 0x35 {
        ((memory[0x34] as usize) << 8) | memory[0x35] as usize
    } else {
        0
    };
    if table != 0 {
        // Three rows of 26 ZSCII codes; A2 positions 0 and 1 keep their
        // fixed control meanings even under a custom table
        let entry = table + alphabet as usize * 26 + index;
        let code = *memory.get(entry)?;
        return zscii_to_char(code as u16);
    }
    let row: &[u8] = match (alphabet, version) {
        (0, _) => &ALPHABET_A0,
        (1, _) => &ALPHABET_A1,
        (2, 1) => &ALPHABET_A2_V1,
        (2, _) => &ALPHABET_A2,
        _ => return None,
    };
    Some(row[index] as char)
}

/// Decode the Z-string at `addr`, returning the text and the number of
/// bytes consumed (so callers can step past inline strings).
pub fn decode_string(memory: &[u8], addr: usize, version: u8) -> ZmResult<(String, usize)> {
    decode_inner(memory, addr, version, 0)
}

fn decode_inner(memory: &[u8], addr: usize, version: u8, depth: u8) -> ZmResult<(String, usize)> {
    // Collect Z-characters up to the terminal word first; control state
    // is then free to look ahead (ZSCII escapes span word boundaries)
    let mut zchars = Vec::new();
    let mut offset = addr;
    loop {
        if offset + 1 >= memory.len() {
            return Err(ZmError::Bounds {
                addr: offset as u32,
                size: memory.len(),
            });
        }
        let (last, triple) = unpack_zchars([memory[offset], memory[offset + 1]])?;
        offset += 2;
        zchars.extend_from_slice(&triple);
        trace!("z-word at {:#06x}: {:?} last={}", offset - 2, triple, last);
        if last {
            break;
        }
    }
    let consumed = offset - addr;

    let mut result = String::new();
    // Locked base alphabet (only ever changes in V1-2) and a one-character
    // shift on top of it
    let mut base: u8 = 0;
    let mut shifted: Option<u8> = None;

    let mut i = 0;
    while i < zchars.len() {
        let zc = zchars[i];
        i += 1;
        let alphabet = shifted.take().unwrap_or(base);

        match zc {
            0 => result.push(' '),
            1 if version == 1 => result.push('\n'),
            1..=3 if version >= 3 || (version == 2 && zc == 1) => {
                // Abbreviation: next Z-character picks the slot
                if i >= zchars.len() {
                    break;
                }
                let slot = 32 * (zc as usize - 1) + zchars[i] as usize;
                i += 1;
                if depth > 0 {
                    return Err(ZmError::Decode {
                        addr: addr as u32,
                        reason: "abbreviation inside an abbreviation".into(),
                    });
                }
                let table = ((memory[0x18] as usize) << 8) | memory[0x19] as usize;
                let entry = table + slot * 2;
                if entry + 1 >= memory.len() {
                    return Err(ZmError::Bounds {
                        addr: entry as u32,
                        size: memory.len(),
                    });
                }
                let word_addr =
                    (((memory[entry] as usize) << 8) | memory[entry + 1] as usize) * 2;
                let (abbrev, _) = decode_inner(memory, word_addr, version, depth + 1)?;
                result.push_str(&abbrev);
            }
            2 if version <= 2 => shifted = Some((base + 1) % 3),
            3 if version <= 2 => shifted = Some((base + 2) % 3),
            4 if version <= 2 => base = (base + 1) % 3,
            5 if version <= 2 => base = (base + 2) % 3,
            4 => shifted = Some(1),
            5 => shifted = Some(2),
            6 if alphabet == 2 => {
                // 10-bit ZSCII escape from the next two Z-characters
                if i + 1 < zchars.len() {
                    let code = ((zchars[i] as u16) << 5) | zchars[i + 1] as u16;
                    i += 2;
                    if let Some(ch) = zscii_to_char(code) {
                        result.push(ch);
                    }
                } else {
                    debug!("ZSCII escape truncated at end of string");
                    i = zchars.len();
                }
            }
            7 if alphabet == 2 && version >= 2 => result.push('\n'),
            6..=31 => {
                if let Some(ch) = alphabet_char(memory, version, alphabet, zc) {
                    result.push(ch);
                }
            }
            _ => unreachable!("z-characters are five bits"),
        }
    }

    Ok((result, consumed))
}

/// Number of Z-characters in an encoded dictionary word
pub fn encoded_length(version: u8) -> usize {
    if version <= 3 {
        6
    } else {
        9
    }
}

/// Encode ZSCII input text into dictionary Z-words: 2 words for V1-3,
/// 3 words for V4+. Characters outside A0 go through an A2 shift, and
/// anything else becomes a full 10-bit escape. Padded with Z-char 5.
pub fn encode_word(memory: &[u8], version: u8, word: &[u8]) -> Vec<u8> {
    let width = encoded_length(version);
    let mut zchars: Vec<u8> = Vec::with_capacity(width);

    for &code in word {
        if zchars.len() >= width {
            break;
        }
        let ch = (code as char).to_ascii_lowercase();
        if let Some(pos) = a0_position(memory, version, ch) {
            zchars.push(pos + 6);
        } else if let Some(pos) = a2_position(memory, version, ch) {
            zchars.push(5);
            zchars.push(pos + 6);
        } else {
            // ZSCII escape: shift A2, escape marker, then two 5-bit halves
            zchars.push(5);
            zchars.push(6);
            zchars.push((code >> 5) & 0x1f);
            zchars.push(code & 0x1f);
        }
    }
    zchars.truncate(width);
    while zchars.len() < width {
        zchars.push(5);
    }

    let mut bytes = Vec::with_capacity(width / 3 * 2);
    for (n, triple) in zchars.chunks(3).enumerate() {
        let mut packed: u16 =
            ((triple[0] as u16) << 10) | ((triple[1] as u16) << 5) | triple[2] as u16;
        if n == width / 3 - 1 {
            packed |= 0x8000;
        }
        bytes.extend_from_slice(&packed.to_be_bytes());
    }
    bytes
}

fn a0_position(memory: &[u8], version: u8, ch: char) -> Option<u8> {
    let table = custom_alphabet(memory, version);
    if let Some(table) = table {
        return (0..26).find(|&i| zscii_to_char(memory[table + i as usize] as u16) == Some(ch));
    }
    ALPHABET_A0.iter().position(|&c| c as char == ch).map(|p| p as u8)
}

fn a2_position(memory: &[u8], version: u8, ch: char) -> Option<u8> {
    let table = custom_alphabet(memory, version);
    if let Some(table) = table {
        // Row 2, skipping the fixed escape/newline slots
        return (2..26)
            .find(|&i| zscii_to_char(memory[table + 52 + i as usize] as u16) == Some(ch));
    }
    let row: &[u8] = if version == 1 {
        &ALPHABET_A2_V1
    } else {
        &ALPHABET_A2
    };
    row.iter()
        .position(|&c| c as char == ch)
        .filter(|&p| p >= if version == 1 { 1 } else { 2 })
        .map(|p| p as u8)
}

fn custom_alphabet(memory: &[u8], version: u8) -> Option<usize> {
    if version >= 5 && memory.len() > 0x35 {
        let table = ((memory[0x34] as usize) << 8) | memory[0x35] as usize;
        if table != 0 && table + 78 <= memory.len() {
            return Some(table);
        }
    }
    None
}
