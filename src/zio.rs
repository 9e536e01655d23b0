//! The I/O boundary: everything the executor asks of the outside world
//!
//! One capability trait. The core methods (printing and input) must be
//! implemented; the optional groups (status line, windows, styles,
//! colours, sound, transcript, save storage) default to no-ops, except
//! save/restore whose defaults fail in the well-defined way: save reports
//! false, restore yields no blob.

use crate::error::ZmResult;

/// Outcome of a read request. `Pending` lets a non-blocking host decline
/// to answer now; the executor then parks in `WaitingForInput`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A full line, without its terminating newline
    Line(String),
    /// One ZSCII character
    Char(u8),
    /// A timed read expired
    Timeout,
    /// No input available yet
    Pending,
}

/// Right-hand side of the V1-3 status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRight {
    Score { score: i16, moves: u16 },
    Time { hours: u16, minutes: u16 },
}

pub trait ZmIo {
    // --- core ---

    /// Concrete-type escape hatch, mostly for tests inspecting a headless
    /// surface behind the trait object
    fn as_any(&self) -> &dyn std::any::Any;

    fn print(&mut self, text: &str) -> ZmResult<()>;

    fn print_char(&mut self, ch: char) -> ZmResult<()> {
        let mut buffer = [0u8; 4];
        self.print(ch.encode_utf8(&mut buffer))
    }

    fn new_line(&mut self) -> ZmResult<()> {
        self.print("\n")
    }

    /// Read a line of up to `max_len` characters. `time_tenths` is the
    /// timed-input interval (0 = untimed).
    fn read_line(&mut self, max_len: usize, time_tenths: u16) -> ZmResult<InputEvent>;

    fn read_char(&mut self, time_tenths: u16) -> ZmResult<InputEvent>;

    /// The game has quit; flush and release the surface
    fn quit(&mut self) {}

    // --- status line (V1-3) ---

    fn show_status(&mut self, _location: &str, _right: StatusRight) -> ZmResult<()> {
        Ok(())
    }

    // --- windows and cursor (V3+/V4+) ---

    fn split_window(&mut self, _lines: u16) -> ZmResult<()> {
        Ok(())
    }

    fn set_window(&mut self, _window: u16) -> ZmResult<()> {
        Ok(())
    }

    fn erase_window(&mut self, _window: i16) -> ZmResult<()> {
        Ok(())
    }

    fn erase_line(&mut self) -> ZmResult<()> {
        Ok(())
    }

    fn set_cursor(&mut self, _line: u16, _column: u16) -> ZmResult<()> {
        Ok(())
    }

    /// 1-based (line, column)
    fn cursor(&mut self) -> ZmResult<(u16, u16)> {
        Ok((1, 1))
    }

    // --- styles and colours ---

    fn set_text_style(&mut self, _style: u16) -> ZmResult<()> {
        Ok(())
    }

    fn set_colours(&mut self, _foreground: u16, _background: u16) -> ZmResult<()> {
        Ok(())
    }

    fn set_buffer_mode(&mut self, _buffered: bool) -> ZmResult<()> {
        Ok(())
    }

    /// Returns the previous font, or 0 if the requested font is unavailable
    fn set_font(&mut self, _font: u16) -> u16 {
        0
    }

    // --- sound ---

    fn sound_effect(&mut self, _number: u16, _effect: u16, _volume: u16) -> ZmResult<()> {
        Ok(())
    }

    // --- streams ---

    /// Stream 2 output; only called while the game has transcripting on
    fn transcript(&mut self, _text: &str) {}

    // --- save storage ---

    /// Persist an opaque blob; report whether it stuck
    fn save(&mut self, _data: &[u8]) -> ZmResult<bool> {
        Ok(false)
    }

    /// Produce the previously saved blob, if any
    fn restore(&mut self) -> ZmResult<Option<Vec<u8>>> {
        Ok(None)
    }
}
