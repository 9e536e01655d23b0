//! Story-file memory: the byte image, its partitions, and packed addresses
//!
//! The image splits at the static-memory base into a writeable dynamic
//! region and a read-only static/high region. A snapshot of the dynamic
//! bytes is taken at load time so `restart` can roll the game back without
//! re-reading the file.

use crate::error::{ZmError, ZmResult};
use log::debug;

/// Minimum story size: the 64-byte header must be present
pub const HEADER_SIZE: usize = 64;

pub struct Memory {
    bytes: Vec<u8>,
    static_base: usize,
    /// Copy of `bytes[..static_base]` as loaded, for restart
    snapshot: Vec<u8>,
    version: u8,
    /// V6-7 routine offset, already scaled to a byte offset
    routines_offset: u32,
    /// V6-7 string offset, already scaled to a byte offset
    strings_offset: u32,
}

impl Memory {
    pub fn new(bytes: Vec<u8>) -> ZmResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ZmError::Decode {
                addr: 0,
                reason: format!("story file too small for a header ({} bytes)", bytes.len()),
            });
        }
        let version = bytes[0];
        if !(1..=8).contains(&version) {
            return Err(ZmError::Decode {
                addr: 0,
                reason: format!("unsupported story version {version}"),
            });
        }

        let static_base = word_at(&bytes, 0x0e) as usize;
        if static_base < HEADER_SIZE || static_base > bytes.len() {
            return Err(ZmError::Decode {
                addr: 0x0e,
                reason: format!(
                    "static memory base {:#06x} outside image of {} bytes",
                    static_base,
                    bytes.len()
                ),
            });
        }

        // Header words at 0x28/0x2a hold the V6-7 routine/string offsets
        // in units of 8 bytes
        let (routines_offset, strings_offset) = if version == 6 || version == 7 {
            (
                word_at(&bytes, 0x28) as u32 * 8,
                word_at(&bytes, 0x2a) as u32 * 8,
            )
        } else {
            (0, 0)
        };

        let snapshot = bytes[..static_base].to_vec();
        debug!(
            "memory: {} bytes, dynamic below {:#06x}, version {}",
            bytes.len(),
            static_base,
            version
        );

        Ok(Memory {
            bytes,
            static_base,
            snapshot,
            version,
            routines_offset,
            strings_offset,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn static_base(&self) -> usize {
        self.static_base
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// The whole image as a slice, for the decoder and text reader
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Move the static base during loading (some early files declare it
    /// lazily). Re-takes the restart snapshot to match.
    pub fn set_static_base(&mut self, base: usize) -> ZmResult<()> {
        if base < HEADER_SIZE || base > self.bytes.len() {
            return Err(ZmError::Bounds {
                addr: base as u32,
                size: self.bytes.len(),
            });
        }
        self.static_base = base;
        self.snapshot = self.bytes[..base].to_vec();
        Ok(())
    }

    pub fn read_byte(&self, addr: u32) -> ZmResult<u8> {
        self.bytes
            .get(addr as usize)
            .copied()
            .ok_or(ZmError::Bounds {
                addr,
                size: self.bytes.len(),
            })
    }

    /// Big-endian 16-bit read
    pub fn read_word(&self, addr: u32) -> ZmResult<u16> {
        let high = self.read_byte(addr)?;
        let low = self.read_byte(addr + 1)?;
        Ok(((high as u16) << 8) | low as u16)
    }

    pub fn read_bytes(&self, addr: u32, len: usize) -> ZmResult<&[u8]> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(ZmError::Bounds {
            addr,
            size: self.bytes.len(),
        })?;
        self.bytes.get(start..end).ok_or(ZmError::Bounds {
            addr,
            size: self.bytes.len(),
        })
    }

    pub fn write_byte(&mut self, addr: u32, value: u8) -> ZmResult<()> {
        self.check_writable(addr)?;
        self.bytes[addr as usize] = value;
        Ok(())
    }

    /// Big-endian 16-bit write. Fails before touching anything if either
    /// byte would land in static memory.
    pub fn write_word(&mut self, addr: u32, value: u16) -> ZmResult<()> {
        self.check_writable(addr)?;
        self.check_writable(addr + 1)?;
        self.bytes[addr as usize] = (value >> 8) as u8;
        self.bytes[addr as usize + 1] = (value & 0xff) as u8;
        Ok(())
    }

    fn check_writable(&self, addr: u32) -> ZmResult<()> {
        if addr as usize >= self.bytes.len() {
            return Err(ZmError::Bounds {
                addr,
                size: self.bytes.len(),
            });
        }
        if addr as usize >= self.static_base {
            return Err(ZmError::StaticWrite {
                addr,
                base: self.static_base,
            });
        }
        Ok(())
    }

    /// Roll dynamic memory back to its load-time contents. Static and high
    /// memory are untouched (they cannot have changed).
    pub fn restart(&mut self) {
        self.bytes[..self.static_base].copy_from_slice(&self.snapshot);
    }

    /// The load-time dynamic image, used by the save codec to diff against
    pub fn dynamic_snapshot(&self) -> &[u8] {
        &self.snapshot
    }

    /// The current dynamic image, for save and undo snapshots
    pub fn dynamic(&self) -> &[u8] {
        &self.bytes[..self.static_base]
    }

    /// Replace the whole dynamic region (restore path). The data must be
    /// exactly the dynamic size.
    pub fn overwrite_dynamic(&mut self, data: &[u8]) -> ZmResult<()> {
        if data.len() != self.static_base {
            return Err(ZmError::Bounds {
                addr: data.len() as u32,
                size: self.static_base,
            });
        }
        self.bytes[..self.static_base].copy_from_slice(data);
        Ok(())
    }

    pub fn unpack_routine(&self, packed: u16) -> u32 {
        self.unpack(packed, false)
    }

    pub fn unpack_string(&self, packed: u16) -> u32 {
        self.unpack(packed, true)
    }

    fn unpack(&self, packed: u16, is_string: bool) -> u32 {
        let packed = packed as u32;
        match self.version {
            1..=3 => packed * 2,
            4 | 5 => packed * 4,
            6 | 7 => {
                let offset = if is_string {
                    self.strings_offset
                } else {
                    self.routines_offset
                };
                packed * 4 + offset
            }
            _ => packed * 8,
        }
    }
}

/// Raw big-endian word read used before a `Memory` exists
pub fn word_at(bytes: &[u8], offset: usize) -> u16 {
    ((bytes[offset] as u16) << 8) | bytes[offset + 1] as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Vec<u8> {
        let mut bytes = vec![0u8; 0x800];
        bytes[0x00] = 3;
        bytes[0x0e] = 0x04; // static memory at 0x0400
        bytes[0x0f] = 0x00;
        bytes
    }

    #[test]
    fn read_write_round_trip() {
        let mut mem = Memory::new(image()).unwrap();
        mem.write_word(0x100, 0xbeef).unwrap();
        assert_eq!(mem.read_word(0x100).unwrap(), 0xbeef);
        assert_eq!(mem.read_byte(0x100).unwrap(), 0xbe);
        assert_eq!(mem.read_byte(0x101).unwrap(), 0xef);
    }

    #[test]
    fn static_memory_is_read_only() {
        let mut mem = Memory::new(image()).unwrap();
        assert_eq!(
            mem.write_byte(0x400, 1),
            Err(ZmError::StaticWrite {
                addr: 0x400,
                base: 0x400
            })
        );
        // A word write straddling the boundary must not write its first byte
        assert!(mem.write_word(0x3ff, 0x1234).is_err());
        assert_eq!(mem.read_byte(0x3ff).unwrap(), 0);
    }

    #[test]
    fn out_of_range_read_fails() {
        let mem = Memory::new(image()).unwrap();
        assert!(mem.read_byte(0x800).is_err());
        assert!(mem.read_word(0x7ff).is_err());
    }

    #[test]
    fn restart_restores_dynamic_only() {
        let mut mem = Memory::new(image()).unwrap();
        mem.write_byte(0x200, 0xaa).unwrap();
        mem.restart();
        assert_eq!(mem.read_byte(0x200).unwrap(), 0x00);
    }

    #[test]
    fn packed_addresses_scale_by_version() {
        let mut bytes = image();
        bytes[0] = 3;
        assert_eq!(Memory::new(bytes.clone()).unwrap().unpack_routine(0x100), 0x200);
        bytes[0] = 5;
        assert_eq!(Memory::new(bytes.clone()).unwrap().unpack_routine(0x100), 0x400);
        bytes[0] = 8;
        assert_eq!(Memory::new(bytes.clone()).unwrap().unpack_string(0x100), 0x800);
        // V7 applies the header offsets, scaled by 8
        bytes[0] = 7;
        bytes[0x28] = 0x00;
        bytes[0x29] = 0x10; // routines offset word 0x10 -> 0x80 bytes
        bytes[0x2a] = 0x00;
        bytes[0x2b] = 0x20; // strings offset word 0x20 -> 0x100 bytes
        let mem = Memory::new(bytes).unwrap();
        assert_eq!(mem.unpack_routine(0x100), 0x400 + 0x80);
        assert_eq!(mem.unpack_string(0x100), 0x400 + 0x100);
    }
}
