#![crate_name = "lantern"]

//! A Z-machine interpreter for Infocom-format story files, versions 1-8.
//!
//! The host hands [`vm::Game::from_bytes`] a story image and an
//! implementation of [`zio::ZmIo`], then drives the
//! [`interpreter::Interpreter`] with `run` or `step`.

pub mod config;
pub mod dictionary;
pub mod disassembler;
pub mod error;
pub mod header;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod opcode_tables;
pub mod opcodes_io;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod opcodes_stack;
pub mod quetzal;
pub mod text;
pub mod vm;
pub mod zio;
pub mod zio_headless;
pub mod zio_terminal;
pub mod zobject;
pub mod zrand;

/*
A memory map of a typical small game:
Dynamic  00000  header
         00040  abbreviation strings
         00042  abbreviation table
         00102  property defaults
         00140  objects
         002f0  object descriptions and properties
         006e3  global variables
         008c3  arrays
Static   00b48  grammar table
         010a7  actions table
         01153  preactions table
         01201  adjectives table
         0124d  dictionary
High     01a0a  Z-code
         05d56  static strings
         06ae6  end of file
*/
