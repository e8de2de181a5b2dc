//! # trine
//!
//! The core of a balanced ternary fantasy console: a 9-trit-word CPU with
//! its own instruction set, the memory and memory-mapped I/O it executes
//! against, and a two-pass assembler for its mnemonic language.
//!
//! The display, input capture, and run-loop timer live in the surrounding
//! front end; this crate exposes raw register/memory access, a
//! tile-change event stream, and the assembler's debug map for them to
//! consume.

pub mod asm;
pub mod ternary;
pub mod vm;

// Re-export the types most callers need.
pub use asm::{assemble, AsmError, Assembly, DebugInfo};
pub use ternary::{Alu, ParseTryteError, Trit, Tryte};
pub use vm::{Cpu, CpuError, CpuState, Instruction, Memory, MouseButton, Opcode, TileEvent};
