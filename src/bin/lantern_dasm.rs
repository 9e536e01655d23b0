//! Story-file disassembler: show decoded instructions from any address

use std::process::ExitCode;

use lantern::disassembler::Disassembler;
use lantern::vm::Game;

fn parse_addr(arg: &str) -> Option<usize> {
    if let Some(hex) = arg.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        arg.parse().ok()
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (story_path, start, end) = match args.as_slice() {
        [path] => (path, None, None),
        [path, start] => (path, parse_addr(start), None),
        [path, start, end] => (path, parse_addr(start), parse_addr(end)),
        _ => {
            eprintln!("usage: lantern-dasm STORY-FILE [START [END]]");
            return ExitCode::FAILURE;
        }
    };

    let bytes = match std::fs::read(story_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("lantern-dasm: {story_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let game = match Game::from_bytes(bytes) {
        Ok(game) => game,
        Err(e) => {
            eprintln!("lantern-dasm: {e}");
            return ExitCode::FAILURE;
        }
    };

    let version = game.header.version;
    let dasm = Disassembler::new(game.memory.bytes(), version);
    let listing = if let Some(start) = start {
        let end = end.unwrap_or(game.memory.len());
        dasm.disassemble_range(start, end)
    } else if version == 6 {
        // The V6 entry point is a routine, not a raw PC
        let main = game.memory.unpack_routine(game.header.initial_pc);
        dasm.disassemble_routine(main as usize)
    } else {
        dasm.disassemble_range(game.header.initial_pc as usize, game.memory.len())
    };

    match listing {
        Ok(text) => {
            println!("{}", game.header);
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("lantern-dasm: {e}");
            ExitCode::FAILURE
        }
    }
}
