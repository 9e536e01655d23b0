//! Interactive front end: load a story file and play it on the terminal

use std::path::PathBuf;
use std::process::ExitCode;

use lantern::config::Options;
use lantern::interpreter::{Interpreter, StepState};
use lantern::vm::{Game, VM};
use lantern::zio_terminal::TerminalIo;

fn usage() -> ExitCode {
    eprintln!("usage: lantern [--seed N] [--config FILE] STORY-FILE");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    env_logger::init();

    let mut story_path: Option<PathBuf> = None;
    let mut options: Option<Options> = None;
    let mut seed_override: Option<u64> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seed" => match args.next().and_then(|v| v.parse().ok()) {
                Some(seed) => seed_override = Some(seed),
                None => return usage(),
            },
            "--config" => match args.next() {
                Some(path) => match Options::load(path.as_ref()) {
                    Ok(loaded) => options = Some(loaded),
                    Err(e) => {
                        eprintln!("lantern: {e}");
                        return ExitCode::FAILURE;
                    }
                },
                None => return usage(),
            },
            _ if story_path.is_none() => story_path = Some(PathBuf::from(arg)),
            _ => return usage(),
        }
    }
    let Some(story_path) = story_path else {
        return usage();
    };
    let options = options.unwrap_or_else(Options::discover);

    let bytes = match std::fs::read(&story_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("lantern: {}: {e}", story_path.display());
            return ExitCode::FAILURE;
        }
    };

    let result = (|| {
        let game = Game::from_bytes(bytes)?;
        let vm = VM::new(game)?;
        let io = TerminalIo::new(options.save_file.clone());
        let (width, height) = io.screen_size();
        let mut interp = Interpreter::new(vm, Box::new(io))?;
        {
            let vm = &mut interp.vm;
            let (width, height) = options
                .screen
                .map(|s| (s.width, s.height))
                .unwrap_or((width.min(255) as u8, height.min(255) as u8));
            vm.game
                .header
                .set_screen_dimensions(&mut vm.game.memory, width, height)?;
        }
        if let Some(seed) = seed_override.or(options.seed) {
            interp.set_random_seed(seed);
        }
        interp.run()
    })();

    match result {
        Ok(StepState::Halted) | Ok(StepState::Running) => ExitCode::SUCCESS,
        Ok(StepState::WaitingForInput) => {
            // stdin ran out before the game finished; that's fine for pipes
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("lantern: {e}");
            ExitCode::FAILURE
        }
    }
}
