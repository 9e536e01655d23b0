//! End-to-end execution: hand-assembled programs run through the full
//! fetch/decode/dispatch loop against a headless I/O surface.

use lantern::error::ZmError;
use lantern::interpreter::{Interpreter, StepState};
use lantern::vm::{Game, VM};
use lantern::zio_headless::HeadlessIo;
use test_log::test;

/// Minimal V3 image: dynamic below 0x0800, globals at 0x0100, code at
/// 0x1000
fn story_v3(program: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 0x2000];
    bytes[0x00] = 3;
    bytes[0x03] = 1; // release
    bytes[0x04] = 0x10; // high memory base
    bytes[0x06] = 0x10; // initial pc 0x1000
    bytes[0x0c] = 0x01; // globals at 0x0100
    bytes[0x0e] = 0x08; // static base 0x0800
    for (i, b) in b"250801".iter().enumerate() {
        bytes[0x12 + i] = *b;
    }
    bytes[0x1a] = 0x10; // file length 0x1000 * 2
    bytes[0x1000..0x1000 + program.len()].copy_from_slice(program);
    bytes
}

fn story_v5(program: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 0x2000];
    bytes[0x00] = 5;
    bytes[0x03] = 1;
    bytes[0x04] = 0x10;
    bytes[0x06] = 0x10;
    bytes[0x0c] = 0x01;
    bytes[0x0e] = 0x08;
    for (i, b) in b"250801".iter().enumerate() {
        bytes[0x12 + i] = *b;
    }
    bytes[0x1a] = 0x08; // file length 0x800 * 4
    bytes[0x1000..0x1000 + program.len()].copy_from_slice(program);
    bytes
}

fn interpreter_for(bytes: Vec<u8>) -> Interpreter {
    let game = Game::from_bytes(bytes).unwrap();
    let vm = VM::new(game).unwrap();
    Interpreter::new(vm, Box::new(HeadlessIo::new())).unwrap()
}

fn run_to_halt(bytes: Vec<u8>) -> Interpreter {
    let mut interp = interpreter_for(bytes);
    assert_eq!(interp.run().unwrap(), StepState::Halted);
    interp
}

#[test]
fn call_routes_arguments_and_return_value() {
    let mut bytes = story_v3(&[
        // call 0x0900 (#0x00aa, #0x00bb) -> G16
        0xe0, 0x03, 0x09, 0x00, 0x00, 0xaa, 0x00, 0xbb, 0x10,
        0xba, // quit
    ]);
    // Routine at 0x1200 (packed 0x0900): two locals with header defaults
    // 1 and 2, overwritten by the arguments; returns their sum
    let routine: &[u8] = &[
        0x02, 0x00, 0x01, 0x00, 0x02, // header
        0x74, 0x01, 0x02, 0x00, // add L1, L2 -> stack
        0xb8, // ret_popped
    ];
    bytes[0x1200..0x1200 + routine.len()].copy_from_slice(routine);

    let interp = run_to_halt(bytes);
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 0x00aa + 0x00bb);
}

#[test]
fn call_to_address_zero_stores_false_without_a_frame() {
    let bytes = story_v3(&[
        0x0d, 0x10, 0xff, // store G16 #ff
        0xe0, 0x3f, 0x00, 0x00, 0x10, // call 0 -> G16
        0xba,
    ]);
    let interp = run_to_halt(bytes);
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 0);
    assert_eq!(interp.vm.call_stack.len(), 1);
}

#[test]
fn taken_branch_skips_the_fallthrough_path() {
    let bytes = story_v3(&[
        0x01, 0x05, 0x05, 0xc8, // je #5 #5 -> 0x100a
        0x0d, 0x10, 0x00, // store G16 #0 (skipped)
        0xba, // quit (skipped)
        0x00, 0x00, // padding
        0x0d, 0x10, 0x01, // 0x100a: store G16 #1
        0xba,
    ]);
    let interp = run_to_halt(bytes);
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 1);
}

#[test]
fn inc_chk_and_backward_jump_make_a_loop() {
    let bytes = story_v3(&[
        0x05, 0x10, 0x03, 0xc7, // inc_chk G16 #3 -> 0x1009
        0x8c, 0xff, 0xfb, // jump -5 (back to 0x1000)
        0x00, 0x00, // padding
        0xba, // 0x1009: quit
    ]);
    let interp = run_to_halt(bytes);
    // Incremented 1,2,3,4; branch fires when the count exceeds 3
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 4);
}

#[test]
fn push_and_pull_move_through_the_stack() {
    let bytes = story_v3(&[
        0xe8, 0x7f, 0x07, // push #7
        0xe9, 0x7f, 0x10, // pull G16
        0xba,
    ]);
    let interp = run_to_halt(bytes);
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 7);
    assert!(interp.vm.stack.is_empty());
}

#[test]
fn divide_by_zero_halts_with_an_arithmetic_error() {
    let bytes = story_v3(&[
        0x17, 0x01, 0x00, 0x00, // div #1 #0 -> stack
        0xba,
    ]);
    let mut interp = interpreter_for(bytes);
    let err = interp.run().unwrap_err();
    assert!(matches!(err, ZmError::Arithmetic(_)));
    assert_eq!(interp.state(), StepState::Halted);
    assert!(matches!(interp.last_error(), Some(ZmError::Arithmetic(_))));
}

#[test]
fn throw_unwinds_to_the_catch_frame() {
    let mut bytes = story_v5(&[
        0xe0, 0x3f, 0x04, 0x40, 0x10, // call_vs 0x0440 -> G16
        0xba,
    ]);
    // Routine at 0x1100 (packed 0x0440): catches, hands the cookie down
    let outer: &[u8] = &[
        0x01, // one local
        0xb9, 0x01, // catch -> L1
        0xf9, 0x2f, 0x04, 0x80, 0x01, // call_vn 0x0480 (L1)
        0x8b, 0x00, 0x00, // ret #0 (never reached)
    ];
    bytes[0x1100..0x1100 + outer.len()].copy_from_slice(outer);
    // Routine at 0x1200 (packed 0x0480): throws 0x42 to the cookie
    let inner: &[u8] = &[
        0x01, // one local
        0x3c, 0x42, 0x01, // throw #42 L1
    ];
    bytes[0x1200..0x1200 + inner.len()].copy_from_slice(inner);

    let interp = run_to_halt(bytes);
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 0x42);
    assert_eq!(interp.vm.call_stack.len(), 1);
}

#[test]
fn check_arg_count_reflects_the_call_site() {
    let mut bytes = story_v5(&[
        0xe0, 0x1f, 0x04, 0x40, 0x01, 0x10, // call_vs 0x0440 (#1) -> G16
        0xba,
    ]);
    // Routine with two locals, called with one argument: branch-as-rtrue
    // when two were supplied, otherwise return 5
    let routine: &[u8] = &[
        0x02, // two locals, zero-initialised in V5
        0xff, 0x7f, 0x02, 0xc1, // check_arg_count #2 [TRUE RTRUE]
        0x8b, 0x00, 0x05, // ret #5
    ];
    bytes[0x1100..0x1100 + routine.len()].copy_from_slice(routine);

    let interp = run_to_halt(bytes);
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 5);
}

#[test]
fn verify_checks_the_header_checksum() {
    let mut bytes = story_v3(&[
        0xbd, 0xc3, // verify -> 0x1003
        0xba, // quit (checksum mismatch path)
        0x0d, 0x10, 0x01, // store G16 #1
        0xba,
    ]);
    let checksum: u16 = bytes[0x40..0x2000]
        .iter()
        .fold(0u16, |sum, &b| sum.wrapping_add(b as u16));
    bytes[0x1c] = (checksum >> 8) as u8;
    bytes[0x1d] = (checksum & 0xff) as u8;

    let interp = run_to_halt(bytes);
    assert_eq!(interp.vm.read_global(0x10).unwrap(), 1);
}

#[test]
fn restart_resets_memory_but_keeps_transcript_bit() {
    let bytes = story_v3(&[
        0x0d, 0x11, 0x09, // store G17 #9
        0xf3, 0x7f, 0x02, // output_stream 2 (transcript on)
        0xe4, 0x0f, 0x03, 0x00, 0x03, 0x40, // sread (parks: no input queued)
        0xba,
    ]);
    let mut with_buffers = bytes;
    with_buffers[0x300] = 20; // text buffer capacity
    with_buffers[0x340] = 10; // parse buffer capacity

    let mut interp = interpreter_for(with_buffers);
    assert_eq!(interp.run().unwrap(), StepState::WaitingForInput);
    assert_eq!(interp.vm.read_global(0x11).unwrap(), 9);

    interp.restart().unwrap();
    assert_eq!(interp.state(), StepState::Running);
    // Globals roll back, the transcript request survives
    assert_eq!(interp.vm.read_global(0x11).unwrap(), 0);
    assert!(interp.vm.game.header.flag2(lantern::header::FLAG2_TRANSCRIPT));
    assert_eq!(interp.vm.pc, 0x1000);
}
