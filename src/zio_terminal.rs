//! Terminal I/O on stdout/stdin, with crossterm for the parts that need
//! more than a line discipline
//!
//! Interactive terminals get a reverse-video status line, raw-mode
//! single-key reads and timed input via event polling. When stdin or
//! stdout is not a TTY (pipes, CI) everything degrades to plain line I/O
//! and the optional groups become no-ops.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use crossterm::event::{poll, read, Event, KeyCode, KeyEvent};
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use crossterm::{cursor, execute};
use log::debug;

use crate::error::{ZmError, ZmResult};
use crate::zio::{InputEvent, StatusRight, ZmIo};

const DEFAULT_SAVE_FILE: &str = "story.qzl";

pub struct TerminalIo {
    interactive: bool,
    save_path: PathBuf,
}

impl TerminalIo {
    pub fn new(save_path: Option<PathBuf>) -> TerminalIo {
        let interactive = atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout);
        TerminalIo {
            interactive,
            save_path: save_path.unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_FILE)),
        }
    }

    /// Terminal size when attached to one, a conventional 80x24 otherwise
    pub fn screen_size(&self) -> (u16, u16) {
        if self.interactive {
            terminal::size().unwrap_or((80, 24))
        } else {
            (80, 24)
        }
    }

    fn read_plain_line(&self) -> ZmResult<InputEvent> {
        let mut line = String::new();
        let count = io::stdin().lock().read_line(&mut line)?;
        if count == 0 {
            // EOF: nothing more is coming
            return Ok(InputEvent::Pending);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(InputEvent::Line(line))
    }

    /// Raw-mode line editor used only for timed input, where we must be
    /// able to give up mid-line
    fn read_timed_line(&self, max_len: usize, time_tenths: u16) -> ZmResult<InputEvent> {
        let deadline = Duration::from_millis(time_tenths as u64 * 100);
        let mut line = String::new();
        enable_raw_mode()?;
        let outcome = loop {
            match poll(deadline) {
                Ok(true) => match read() {
                    Ok(Event::Key(KeyEvent { code, .. })) => match code {
                        KeyCode::Enter => break Ok(InputEvent::Line(line)),
                        KeyCode::Backspace => {
                            if line.pop().is_some() {
                                let _ = execute!(
                                    io::stdout(),
                                    cursor::MoveLeft(1),
                                    Print(" "),
                                    cursor::MoveLeft(1)
                                );
                            }
                        }
                        KeyCode::Char(ch) if line.len() < max_len => {
                            line.push(ch);
                            let _ = execute!(io::stdout(), Print(ch));
                        }
                        _ => {}
                    },
                    Ok(_) => {}
                    Err(e) => break Err(ZmError::from(e)),
                },
                Ok(false) => break Ok(InputEvent::Timeout),
                Err(e) => break Err(ZmError::from(e)),
            }
        };
        disable_raw_mode()?;
        if matches!(outcome, Ok(InputEvent::Line(_))) {
            println!();
        }
        outcome
    }
}

/// Map a key event onto the ZSCII input codes the game understands
fn key_to_zscii(code: KeyCode) -> Option<u8> {
    match code {
        KeyCode::Enter => Some(13),
        KeyCode::Esc => Some(27),
        KeyCode::Backspace | KeyCode::Delete => Some(8),
        KeyCode::Up => Some(129),
        KeyCode::Down => Some(130),
        KeyCode::Left => Some(131),
        KeyCode::Right => Some(132),
        KeyCode::F(n) if (1..=12).contains(&n) => Some(132 + n),
        KeyCode::Char(ch) if ch.is_ascii() => Some(ch as u8),
        _ => None,
    }
}

impl ZmIo for TerminalIo {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn print(&mut self, text: &str) -> ZmResult<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }

    fn read_line(&mut self, max_len: usize, time_tenths: u16) -> ZmResult<InputEvent> {
        if self.interactive && time_tenths > 0 {
            return self.read_timed_line(max_len, time_tenths);
        }
        match self.read_plain_line()? {
            InputEvent::Line(mut line) => {
                line.truncate(max_len);
                Ok(InputEvent::Line(line))
            }
            other => Ok(other),
        }
    }

    fn read_char(&mut self, time_tenths: u16) -> ZmResult<InputEvent> {
        if !self.interactive {
            // Take the first character of a line, or a bare return
            return Ok(match self.read_plain_line()? {
                InputEvent::Line(line) => {
                    InputEvent::Char(line.bytes().next().unwrap_or(13))
                }
                other => other,
            });
        }
        enable_raw_mode()?;
        let deadline = if time_tenths > 0 {
            Some(Duration::from_millis(time_tenths as u64 * 100))
        } else {
            None
        };
        let outcome = loop {
            let ready = match deadline {
                Some(limit) => poll(limit)?,
                None => true,
            };
            if !ready {
                break Ok(InputEvent::Timeout);
            }
            match read() {
                Ok(Event::Key(KeyEvent { code, .. })) => {
                    if let Some(zscii) = key_to_zscii(code) {
                        break Ok(InputEvent::Char(zscii));
                    }
                }
                Ok(_) => {}
                Err(e) => break Err(ZmError::from(e)),
            }
        };
        disable_raw_mode()?;
        outcome
    }

    fn quit(&mut self) {
        let _ = io::stdout().flush();
    }

    fn show_status(&mut self, location: &str, right: StatusRight) -> ZmResult<()> {
        if !self.interactive {
            return Ok(());
        }
        let (width, _) = self.screen_size();
        let right_text = match right {
            StatusRight::Score { score, moves } => format!("Score: {score}  Moves: {moves}"),
            StatusRight::Time { hours, minutes } => format!("Time: {hours}:{minutes:02}"),
        };
        let pad = (width as usize)
            .saturating_sub(location.len() + right_text.len() + 3)
            .max(1);
        let line = format!(" {location}{}{right_text} ", " ".repeat(pad));
        execute!(
            io::stdout(),
            cursor::SavePosition,
            cursor::MoveTo(0, 0),
            SetAttribute(Attribute::Reverse),
            Print(line),
            SetAttribute(Attribute::Reset),
            cursor::RestorePosition
        )?;
        Ok(())
    }

    fn erase_window(&mut self, window: i16) -> ZmResult<()> {
        if self.interactive && window == -1 {
            execute!(
                io::stdout(),
                terminal::Clear(terminal::ClearType::All),
                cursor::MoveTo(0, 0)
            )?;
        }
        Ok(())
    }

    fn set_cursor(&mut self, line: u16, column: u16) -> ZmResult<()> {
        if self.interactive {
            execute!(
                io::stdout(),
                cursor::MoveTo(column.saturating_sub(1), line.saturating_sub(1))
            )?;
        }
        Ok(())
    }

    fn set_text_style(&mut self, style: u16) -> ZmResult<()> {
        if !self.interactive {
            return Ok(());
        }
        let mut stdout = io::stdout();
        if style == 0 {
            execute!(stdout, SetAttribute(Attribute::Reset))?;
        } else {
            if style & 0x1 != 0 {
                execute!(stdout, SetAttribute(Attribute::Reverse))?;
            }
            if style & 0x2 != 0 {
                execute!(stdout, SetAttribute(Attribute::Bold))?;
            }
            if style & 0x4 != 0 {
                execute!(stdout, SetAttribute(Attribute::Italic))?;
            }
        }
        Ok(())
    }

    fn save(&mut self, data: &[u8]) -> ZmResult<bool> {
        match std::fs::write(&self.save_path, data) {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("save to {} failed: {e}", self.save_path.display());
                Ok(false)
            }
        }
    }

    fn restore(&mut self) -> ZmResult<Option<Vec<u8>>> {
        match std::fs::read(&self.save_path) {
            Ok(data) => Ok(Some(data)),
            Err(e) => {
                debug!("restore from {} failed: {e}", self.save_path.display());
                Ok(None)
            }
        }
    }
}
