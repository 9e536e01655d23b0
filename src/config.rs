//! Interpreter options, loaded from an optional `lantern.toml`
//!
//! Everything here has a sensible default; the file exists so scripted
//! runs can pin the random seed and hosts can redirect the save file.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error::{ZmError, ZmResult};

const CONFIG_FILE: &str = "lantern.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Fixed PRNG seed; omit for entropy seeding
    pub seed: Option<u64>,
    /// Where save blobs land; defaults next to the story file
    pub save_file: Option<PathBuf>,
    /// Screen size advertised to the game
    pub screen: Option<Screen>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Screen {
    pub width: u8,
    pub height: u8,
}

impl Options {
    pub fn load(path: &Path) -> ZmResult<Options> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ZmError::Io(format!("{}: {e}", path.display())))
    }

    /// Options from ./lantern.toml when present, defaults otherwise
    pub fn discover() -> Options {
        let path = Path::new(CONFIG_FILE);
        if !path.exists() {
            return Options::default();
        }
        match Options::load(path) {
            Ok(options) => options,
            Err(e) => {
                debug!("ignoring unreadable config: {e}");
                Options::default()
            }
        }
    }
}
