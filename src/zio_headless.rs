//! Headless I/O for tests, scripted runs and CI
//!
//! Output is collected in a buffer, input is replayed from queues, and the
//! save "file" is a byte vector. When the input script runs dry the reads
//! report `Pending`, which parks the executor in `WaitingForInput`.

use std::collections::VecDeque;

use log::debug;

use crate::error::ZmResult;
use crate::zio::{InputEvent, StatusRight, ZmIo};

#[derive(Default)]
pub struct HeadlessIo {
    output: String,
    lines: VecDeque<String>,
    keys: VecDeque<u8>,
    saved: Option<Vec<u8>>,
    status: Option<(String, StatusRight)>,
    quit: bool,
}

impl HeadlessIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line for the next read
    pub fn push_line(&mut self, line: &str) {
        self.lines.push_back(line.to_string());
    }

    /// Queue a key for the next read_char
    pub fn push_key(&mut self, key: u8) {
        self.keys.push_back(key);
    }

    /// Everything printed so far
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn last_status(&self) -> Option<&(String, StatusRight)> {
        self.status.as_ref()
    }

    pub fn saved_blob(&self) -> Option<&[u8]> {
        self.saved.as_deref()
    }

    /// Pre-load a blob for restore, as if a save file were on disk
    pub fn set_saved_blob(&mut self, blob: Vec<u8>) {
        self.saved = Some(blob);
    }

    pub fn has_quit(&self) -> bool {
        self.quit
    }
}

impl ZmIo for HeadlessIo {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn print(&mut self, text: &str) -> ZmResult<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn read_line(&mut self, max_len: usize, _time_tenths: u16) -> ZmResult<InputEvent> {
        match self.lines.pop_front() {
            Some(mut line) => {
                line.truncate(max_len);
                debug!("headless input: '{line}'");
                Ok(InputEvent::Line(line))
            }
            None => Ok(InputEvent::Pending),
        }
    }

    fn read_char(&mut self, _time_tenths: u16) -> ZmResult<InputEvent> {
        match self.keys.pop_front() {
            Some(key) => Ok(InputEvent::Char(key)),
            None => Ok(InputEvent::Pending),
        }
    }

    fn quit(&mut self) {
        self.quit = true;
    }

    fn show_status(&mut self, location: &str, right: StatusRight) -> ZmResult<()> {
        self.status = Some((location.to_string(), right));
        Ok(())
    }

    fn save(&mut self, data: &[u8]) -> ZmResult<bool> {
        self.saved = Some(data.to_vec());
        Ok(true)
    }

    fn restore(&mut self) -> ZmResult<Option<Vec<u8>>> {
        Ok(self.saved.clone())
    }
}
