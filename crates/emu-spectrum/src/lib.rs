//! Cycle-accurate ZX Spectrum emulator core (48K Issue 2/3, 128K, +2, +3).
//!
//! The scheduler drives the Z80 core a scanline at a time, flushing the
//! border rasteriser, beeper, and tape/TZX players to the same absolute
//! T-state the CPU just reached; see `spectrum::Spectrum::run_frame` for
//! the exact per-line contract. Memory contention, snow, and the floating
//! bus are out of scope.

mod beeper;
mod bus;
pub mod capture;
mod config;
pub mod divide;
mod error;
pub mod fast_tap;
pub mod input;
mod keyboard;
mod memory;
pub mod sna;
mod spectrum;
pub mod tap;
mod tap_player;
mod tzx;

pub use beeper::BeeperState;
pub use bus::SpectrumBus;
pub use config::{SpectrumConfig, SpectrumModel};
pub use divide::DivIde;
pub use error::SpectrumError;
pub use fast_tap::FastTapResult;
pub use input::{InputQueue, SpectrumKey};
pub use keyboard::KeyboardState;
pub use memory::{Memory48K, Memory128K, SpectrumMemory};
pub use sna::{Sna128Extra, SnaImage, load_sna, save_sna};
pub use spectrum::{EmulatorCommand, Spectrum};
pub use tap::TapFile;
pub use tap_player::TapPlayer;
pub use tzx::{TzxFile, TzxPlayer};

pub use sinclair_ula::Ula;
