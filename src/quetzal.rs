//! Quetzal-shaped save states
//!
//! The blob is an IFF `FORM` of type `IFZS` holding three chunks: `IFhd`
//! (story identity plus the resume PC), `CMem` (dynamic memory XOR-RLE
//! compressed against the load-time image) and `Stks` (the call and
//! evaluation stacks). The same codec backs save files, the undo ring and
//! restore validation; the I/O surface only ever stores the bytes.

use log::debug;

use crate::error::{ZmError, ZmResult};
use crate::vm::{CallFrame, VM};

const FORM_TYPE: &[u8; 4] = b"IFZS";

/// Serialise the machine state. `resume_pc` is where execution picks up
/// after a successful restore (conventionally the save instruction's
/// branch or store byte).
pub fn snapshot(vm: &VM, resume_pc: u32) -> Vec<u8> {
    let mut chunks: Vec<([u8; 4], Vec<u8>)> = Vec::new();
    chunks.push((*b"IFhd", ifhd_chunk(vm, resume_pc)));
    chunks.push((
        *b"CMem",
        compress(vm.game.memory.dynamic(), vm.game.memory.dynamic_snapshot()),
    ));
    chunks.push((*b"Stks", stacks_chunk(vm)));

    let body_len: usize = 4 + chunks
        .iter()
        .map(|(_, data)| 8 + data.len() + data.len() % 2)
        .sum::<usize>();

    let mut blob = Vec::with_capacity(body_len + 8);
    blob.extend_from_slice(b"FORM");
    blob.extend_from_slice(&(body_len as u32).to_be_bytes());
    blob.extend_from_slice(FORM_TYPE);
    for (kind, data) in chunks {
        blob.extend_from_slice(&kind);
        blob.extend_from_slice(&(data.len() as u32).to_be_bytes());
        blob.extend_from_slice(&data);
        if data.len() % 2 == 1 {
            blob.push(0);
        }
    }
    blob
}

/// Apply a blob to the machine. Rejects blobs from a different story.
/// Returns the resume PC recorded at save time.
pub fn restore(vm: &mut VM, blob: &[u8]) -> ZmResult<u32> {
    let chunks = parse_iff(blob)?;

    let ifhd = find_chunk(&chunks, b"IFhd")
        .ok_or_else(|| ZmError::Save("missing IFhd chunk".into()))?;
    if ifhd.len() < 13 {
        return Err(ZmError::Save("IFhd chunk too short".into()));
    }
    let release = u16::from_be_bytes([ifhd[0], ifhd[1]]);
    let serial: String = ifhd[2..8].iter().map(|b| *b as char).collect();
    let checksum = u16::from_be_bytes([ifhd[8], ifhd[9]]);
    let header = &vm.game.header;
    if release != header.release || serial != header.serial || checksum != header.checksum {
        return Err(ZmError::Save(format!(
            "blob is for release {release} serial {serial}, story is release {} serial {}",
            header.release, header.serial
        )));
    }
    let resume_pc =
        ((ifhd[10] as u32) << 16) | ((ifhd[11] as u32) << 8) | ifhd[12] as u32;

    // Decode everything before mutating the machine, so a bad blob
    // cannot leave it half-restored
    let dynamic = if let Some(cmem) = find_chunk(&chunks, b"CMem") {
        decompress(cmem, vm.game.memory.dynamic_snapshot())?
    } else if let Some(umem) = find_chunk(&chunks, b"UMem") {
        umem.to_vec()
    } else {
        return Err(ZmError::Save("missing CMem/UMem chunk".into()));
    };
    let stks = find_chunk(&chunks, b"Stks")
        .ok_or_else(|| ZmError::Save("missing Stks chunk".into()))?;
    let (frames, stack) = decode_stacks(stks)?;

    vm.game.memory.overwrite_dynamic(&dynamic)?;
    vm.call_stack = frames;
    vm.stack = stack;

    debug!("restored state, resume pc {:#07x}", resume_pc);
    Ok(resume_pc)
}

fn ifhd_chunk(vm: &VM, resume_pc: u32) -> Vec<u8> {
    let header = &vm.game.header;
    let mut data = Vec::with_capacity(13);
    data.extend_from_slice(&header.release.to_be_bytes());
    data.extend(header.serial.bytes().take(6));
    data.extend_from_slice(&header.checksum.to_be_bytes());
    data.push((resume_pc >> 16) as u8);
    data.push((resume_pc >> 8) as u8);
    data.push(resume_pc as u8);
    data
}

/// Stks: every frame from the root up, each with its slice of the shared
/// evaluation stack
fn stacks_chunk(vm: &VM) -> Vec<u8> {
    let mut data = Vec::new();
    for (i, frame) in vm.call_stack.iter().enumerate() {
        let eval_end = vm
            .call_stack
            .get(i + 1)
            .map(|next| next.stack_base)
            .unwrap_or(vm.stack.len());
        let eval = &vm.stack[frame.stack_base..eval_end];

        data.push((frame.return_pc >> 16) as u8);
        data.push((frame.return_pc >> 8) as u8);
        data.push(frame.return_pc as u8);
        let discard_bit = if frame.return_store.is_none() { 0x10 } else { 0 };
        data.push(discard_bit | (frame.num_locals & 0x0f));
        data.push(frame.return_store.unwrap_or(0));
        data.push(((1u16 << frame.arg_count) - 1) as u8);
        data.extend_from_slice(&(eval.len() as u16).to_be_bytes());
        for local in &frame.locals[..frame.num_locals as usize] {
            data.extend_from_slice(&local.to_be_bytes());
        }
        for word in eval {
            data.extend_from_slice(&word.to_be_bytes());
        }
    }
    data
}

fn decode_stacks(data: &[u8]) -> ZmResult<(Vec<CallFrame>, Vec<u16>)> {
    let short = || ZmError::Save("Stks chunk truncated".into());
    let mut frames = Vec::new();
    let mut stack: Vec<u16> = Vec::new();
    let mut at = 0usize;
    while at < data.len() {
        if at + 8 > data.len() {
            return Err(short());
        }
        let return_pc =
            ((data[at] as u32) << 16) | ((data[at + 1] as u32) << 8) | data[at + 2] as u32;
        let flags = data[at + 3];
        let num_locals = flags & 0x0f;
        let return_store = if flags & 0x10 != 0 {
            None
        } else {
            Some(data[at + 4])
        };
        let arg_mask = data[at + 5];
        let eval_count = u16::from_be_bytes([data[at + 6], data[at + 7]]) as usize;
        at += 8;

        let mut locals = [0u16; 15];
        for local in locals.iter_mut().take(num_locals as usize) {
            if at + 2 > data.len() {
                return Err(short());
            }
            *local = u16::from_be_bytes([data[at], data[at + 1]]);
            at += 2;
        }
        let stack_base = stack.len();
        for _ in 0..eval_count {
            if at + 2 > data.len() {
                return Err(short());
            }
            stack.push(u16::from_be_bytes([data[at], data[at + 1]]));
            at += 2;
        }

        frames.push(CallFrame {
            return_pc,
            return_store,
            num_locals,
            locals,
            arg_count: arg_mask.count_ones() as u8,
            stack_base,
        });
    }
    if frames.is_empty() {
        return Err(ZmError::Save("Stks chunk holds no frames".into()));
    }
    Ok((frames, stack))
}

fn parse_iff(blob: &[u8]) -> ZmResult<Vec<([u8; 4], &[u8])>> {
    if blob.len() < 12 || &blob[0..4] != b"FORM" || &blob[8..12] != FORM_TYPE {
        return Err(ZmError::Save("not an IFZS form".into()));
    }
    let mut chunks = Vec::new();
    let mut at = 12usize;
    while at + 8 <= blob.len() {
        let kind = [blob[at], blob[at + 1], blob[at + 2], blob[at + 3]];
        let len = u32::from_be_bytes([blob[at + 4], blob[at + 5], blob[at + 6], blob[at + 7]])
            as usize;
        at += 8;
        if at + len > blob.len() {
            return Err(ZmError::Save("chunk overruns blob".into()));
        }
        chunks.push((kind, &blob[at..at + len]));
        at += len + len % 2;
    }
    Ok(chunks)
}

fn find_chunk<'a>(chunks: &[([u8; 4], &'a [u8])], kind: &[u8; 4]) -> Option<&'a [u8]> {
    chunks
        .iter()
        .find(|(k, _)| k == kind)
        .map(|(_, data)| *data)
}

/// XOR against the original image, then run-length encode the zero runs:
/// a zero byte is followed by (run length - 1). A run reaching the end of
/// memory is omitted entirely; restore treats missing bytes as unchanged.
fn compress(current: &[u8], original: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < current.len() {
        let diff = current[i] ^ original.get(i).copied().unwrap_or(0);
        if diff == 0 {
            let start = i;
            while i < current.len() && current[i] ^ original.get(i).copied().unwrap_or(0) == 0 {
                i += 1;
            }
            if i >= current.len() {
                break;
            }
            let mut run = i - start;
            while run > 256 {
                out.push(0);
                out.push(255);
                run -= 256;
            }
            out.push(0);
            out.push((run - 1) as u8);
        } else {
            out.push(diff);
            i += 1;
        }
    }
    out
}

fn decompress(compressed: &[u8], original: &[u8]) -> ZmResult<Vec<u8>> {
    let mut out = Vec::with_capacity(original.len());
    let mut at = 0;
    while at < compressed.len() {
        let byte = compressed[at];
        at += 1;
        if byte == 0 {
            if at >= compressed.len() {
                return Err(ZmError::Save("CMem run truncated".into()));
            }
            let run = compressed[at] as usize + 1;
            at += 1;
            for _ in 0..run {
                let i = out.len();
                if i >= original.len() {
                    return Err(ZmError::Save("CMem longer than dynamic memory".into()));
                }
                out.push(original[i]);
            }
        } else {
            let i = out.len();
            if i >= original.len() {
                return Err(ZmError::Save("CMem longer than dynamic memory".into()));
            }
            out.push(byte ^ original[i]);
        }
    }
    // Anything beyond the compressed data is unchanged
    out.extend_from_slice(&original[out.len()..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Game;

    fn test_vm() -> VM {
        let mut bytes = vec![0u8; 0x1000];
        bytes[0x00] = 3;
        bytes[0x02] = 0x00;
        bytes[0x03] = 0x2a; // release 42
        bytes[0x06] = 0x05;
        bytes[0x0c] = 0x01;
        bytes[0x0e] = 0x04; // static base 0x0400
        for (i, b) in b"850101".iter().enumerate() {
            bytes[0x12 + i] = *b;
        }
        bytes[0x1c] = 0x12;
        bytes[0x1d] = 0x34; // checksum
        VM::new(Game::from_bytes(bytes).unwrap()).unwrap()
    }

    #[test]
    fn compress_round_trips() {
        let original = vec![7u8; 300];
        let mut current = original.clone();
        current[0] = 9;
        current[150] = 0;
        current[299] = 1;
        let packed = compress(&current, &original);
        assert!(packed.len() < current.len());
        assert_eq!(decompress(&packed, &original).unwrap(), current);
    }

    #[test]
    fn unchanged_memory_compresses_to_nothing() {
        let original = vec![3u8; 512];
        assert!(compress(&original, &original).is_empty());
        assert_eq!(decompress(&[], &original).unwrap(), original);
    }

    #[test]
    fn state_round_trips_through_blob() {
        let mut vm = test_vm();
        vm.game.memory.write_word(0x100, 0xabcd).unwrap();
        vm.push(0x1111).unwrap();
        let mut frame = CallFrame {
            return_pc: 0x1234,
            return_store: Some(0x05),
            num_locals: 2,
            locals: [0; 15],
            arg_count: 1,
            stack_base: 1,
        };
        frame.locals[0] = 0xaa;
        frame.locals[1] = 0xbb;
        vm.push_frame(frame.clone()).unwrap();
        vm.push(0x2222).unwrap();

        let blob = snapshot(&vm, 0x4567);

        // Wreck the live state, then restore
        vm.stack.clear();
        vm.call_stack.clear();
        vm.call_stack.push(CallFrame::root());
        vm.game.memory.write_word(0x100, 0).unwrap();

        let resume = restore(&mut vm, &blob).unwrap();
        assert_eq!(resume, 0x4567);
        assert_eq!(vm.game.memory.read_word(0x100).unwrap(), 0xabcd);
        assert_eq!(vm.stack, vec![0x1111, 0x2222]);
        assert_eq!(vm.call_stack.len(), 2);
        assert_eq!(vm.call_stack[1], frame);
    }

    #[test]
    fn rejects_blob_from_another_story() {
        let mut vm = test_vm();
        let mut blob = snapshot(&vm, 0);
        // Flip the release word inside IFhd (offset 20: FORM header 12 + chunk header 8)
        blob[21] ^= 0xff;
        assert!(matches!(restore(&mut vm, &blob), Err(ZmError::Save(_))));
    }

    #[test]
    fn rejects_garbage() {
        let mut vm = test_vm();
        assert!(restore(&mut vm, b"not a save file").is_err());
    }
}
