//! Cycle-accurate Z80 CPU emulator.
//!
//! Instructions are decomposed into micro-operations, each worth one or more
//! T-states; [`Z80::run`] steps the queue against a [`emu_core::Bus`] until a
//! caller-supplied T-state budget is exhausted.

mod alu;
mod cpu;
mod flags;
mod microcode;
mod registers;

pub use cpu::Z80;
pub use flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
pub use registers::Registers;
