//! Error types for the Z-machine engine
//!
//! Every fault the engine can hit maps onto one variant here. All of them
//! are fatal to the current execution; the only in-game recovery mechanisms
//! are `throw`/`catch` and the timer-routine protocol, which are not errors.

use thiserror::Error;

pub type ZmResult<T> = Result<T, ZmError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ZmError {
    /// Memory access outside the story image
    #[error("address {addr:#07x} out of range (image size {size:#07x})")]
    Bounds { addr: u32, size: usize },

    /// Write at or above the static-memory base
    #[error("write to read-only memory at {addr:#07x} (static base {base:#07x})")]
    StaticWrite { addr: u32, base: usize },

    /// Malformed instruction, or an opcode the dispatcher does not know
    #[error("bad instruction at {addr:#07x}: {reason}")]
    Decode { addr: u32, reason: String },

    #[error("evaluation stack underflow")]
    StackUnderflow,

    #[error("evaluation stack overflow")]
    StackOverflow,

    /// Variable number out of range, or a local the current frame lacks
    #[error("variable error: {0}")]
    Variable(String),

    /// Operation on object 0 or an out-of-range object number, or a
    /// property that must exist but does not
    #[error("object error: {0}")]
    Object(String),

    #[error("arithmetic fault: {0}")]
    Arithmetic(&'static str),

    #[error("malformed dictionary: {0}")]
    Dictionary(String),

    /// The I/O surface failed underneath us
    #[error("i/o error: {0}")]
    Io(String),

    /// Save or restore refused, or the blob did not parse
    #[error("save error: {0}")]
    Save(String),

    /// Opcode recognised but not supported by this interpreter (V6 display set)
    #[error("unimplemented opcode: {0}")]
    Unimplemented(&'static str),
}

impl From<std::io::Error> for ZmError {
    fn from(e: std::io::Error) -> Self {
        ZmError::Io(e.to_string())
    }
}
