//! ULA Gateway: memory and I/O routing between the Z80 core and every
//! other subsystem.
//!
//! Port decoding follows the standard Spectrum map. Every access that can
//! influence the beeper or border output first flushes those subsystems to
//! the access's exact T-state, so audio and pixels are timed to the same
//! clock the CPU sees (see the slice contract in `beeper.rs`/`sinclair_ula`).

#![allow(clippy::cast_possible_truncation)]

use emu_core::Bus;
use gi_ay_3_8910::Ay3_8910;
use nec_upd765::Upd765;
use sinclair_ula::Ula;

use crate::beeper::BeeperState;
use crate::divide::DivIde;
use crate::keyboard::KeyboardState;
use crate::memory::SpectrumMemory;

/// The Spectrum bus, implementing `emu_core::Bus`.
///
/// Owns memory, the border rasteriser, the keyboard matrix, the beeper, and
/// the optional AY/FDC peripherals. The CPU reaches all of these through
/// the `Bus` trait, which threads the absolute T-state of every access.
pub struct SpectrumBus {
    pub memory: Box<dyn SpectrumMemory>,
    pub ula: Ula,
    pub keyboard: KeyboardState,
    pub beeper: BeeperState,
    /// Last value written to port $FE (for MIC/EAR loopback and border).
    pub last_fe_write: u8,
    /// Kempston joystick state: bits 0-4 = right, left, down, up, fire (active-high).
    pub kempston: u8,
    /// AY-3-8910 sound chip (present on 128K/+2/+3 models).
    pub ay: Option<Ay3_8910>,
    /// NEC uPD765 floppy disk controller (present on +3 only).
    pub fdc: Option<Upd765>,
    /// DivIDE paged IDE interface, present when `-i`/`-I` were given.
    pub divide: Option<DivIde>,
    /// Whether a tape/TZX player is currently driving the EAR input.
    tape_ear_active: bool,
    /// Current tape EAR input level, valid while `tape_ear_active`.
    tape_ear_level: bool,
}

impl SpectrumBus {
    #[must_use]
    pub fn new(memory: Box<dyn SpectrumMemory>, ula: Ula, beeper: BeeperState) -> Self {
        Self {
            memory,
            ula,
            keyboard: KeyboardState::new(),
            beeper,
            last_fe_write: 0,
            kempston: 0,
            ay: None,
            fdc: None,
            divide: None,
            tape_ear_active: false,
            tape_ear_level: false,
        }
    }

    /// Enable the AY sound chip (for 128K/+2/+3 models). AY clock is the
    /// CPU clock divided by 2 on the Spectrum 128.
    pub fn enable_ay(&mut self, cpu_frequency: u32, sample_rate: u32) {
        self.ay = Some(Ay3_8910::new(cpu_frequency / 2, sample_rate));
    }

    /// Update the EAR input state driven by the tape/TZX player. Called by
    /// the scheduler once per line after running the CPU, per the scheduler
    /// contract in §4.2.
    pub fn set_tape_ear(&mut self, active: bool, level: bool) {
        self.tape_ear_active = active;
        self.tape_ear_level = level;
        self.beeper.set_tape_input(active, level);
    }

    fn ear_input_bit(&self) -> u8 {
        let level = if self.tape_ear_active {
            self.tape_ear_level
        } else {
            // Issue-3/48K-2 fallback: EAR loops back the last MIC write.
            self.last_fe_write & 0x08 != 0
        };
        if level { 0x40 } else { 0x00 }
    }
}

impl Bus for SpectrumBus {
    fn mem_read(&mut self, address: u16, _t_state: u64) -> u8 {
        if let Some(divide) = &mut self.divide {
            if let Some(value) = divide.read(address) {
                return value;
            }
        }
        self.memory.read(address)
    }

    fn mem_write(&mut self, address: u16, value: u8, _t_state: u64) {
        if let Some(divide) = &mut self.divide {
            if divide.write(address, value) {
                return;
            }
        }
        self.memory.write(address, value);
    }

    fn io_read(&mut self, port: u16, t_state: u64) -> u8 {
        let ula_port = port & 0x01 == 0;

        // Kempston joystick (port $1F, active when low byte = $1F).
        if port & 0xFF == 0x1F {
            return self.kempston;
        }

        // Port $2FFD: FDC main status register (+3 only).
        if port & 0xF002 == 0x2000 {
            if let Some(fdc) = &self.fdc {
                return fdc.read_msr();
            }
        }

        // Port $3FFD: FDC data register read (+3 only).
        if port & 0xF002 == 0x3000 {
            if let Some(fdc) = &mut self.fdc {
                return fdc.read_data();
            }
        }

        if ula_port {
            self.beeper.advance_to(t_state, self.ay.as_mut());
            let addr_high = (port >> 8) as u8;
            let keyboard = self.keyboard.read(addr_high) & 0x1F;
            // Bits 0-4: keyboard, bit 5: fixed 1, bit 6: EAR input, bit 7: fixed 1.
            keyboard | 0xA0 | self.ear_input_bit()
        } else if port & 0xC002 == 0xC000 {
            // Port $FFFD: AY register read.
            self.ay.as_ref().map_or(0xFF, Ay3_8910::read_data)
        } else {
            // Non-decoded ports: no floating-bus emulation (see Non-goals).
            0xFF
        }
    }

    fn io_write(&mut self, port: u16, value: u8, t_state: u64) {
        let ula_port = port & 0x01 == 0;

        if ula_port {
            self.beeper.advance_to(t_state, self.ay.as_mut());
            self.ula.border_advance_to(t_state);
            self.last_fe_write = value;
            self.ula.set_border_colour(value & 0x07);
            // Beeper output is the OR of bit 3 (MIC) and bit 4 (EAR speaker).
            self.beeper.set_speaker_level((value >> 3) & 0x03 != 0);
        }

        // Port $7FFD: 128K bank switching (bit 1 set, bit 15 clear, not ULA).
        if port & 0x8002 == 0x0000 && !ula_port {
            self.memory.write_bank_register(value);
        }

        // Port $1FFD: +3 memory/disk banking (bit 12 set, bit 1 clear, not ULA).
        if port & 0xF002 == 0x1000 && !ula_port {
            self.memory.write_plus3_register(value);
        }

        // Port $3FFD: FDC data register write (+3 only).
        if port & 0xF002 == 0x3000 {
            if let Some(fdc) = &mut self.fdc {
                fdc.write_data(value);
            }
        }

        // Port $FFFD: AY register select.
        if port & 0xC002 == 0xC000 {
            if let Some(ay) = &mut self.ay {
                ay.select_register(value);
            }
        }

        // Port $E3: DivIDE control register (bank select, MAPRAM, CONMEM).
        if port & 0xFF == 0xE3 {
            if let Some(divide) = &mut self.divide {
                divide.write_control(value);
            }
        }

        // Port $BFFD: AY data write.
        if port & 0xC002 == 0x8000 {
            self.beeper.advance_to(t_state, self.ay.as_mut());
            if let Some(ay) = &mut self.ay {
                ay.write_data(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory48K;

    fn make_bus() -> SpectrumBus {
        let rom = vec![0u8; 0x4000];
        let memory = Box::new(Memory48K::new(&rom));
        let ula = Ula::new(224, 312);
        let beeper = BeeperState::new(44_100);
        SpectrumBus::new(memory, ula, beeper)
    }

    #[test]
    fn memory_read_write() {
        let mut bus = make_bus();
        bus.mem_write(0x8000, 0xAB, 0);
        assert_eq!(bus.mem_read(0x8000, 0), 0xAB);
    }

    #[test]
    fn rom_write_ignored() {
        let mut bus = make_bus();
        bus.mem_write(0x0000, 0xFF, 0);
        assert_eq!(bus.mem_read(0x0000, 0), 0x00);
    }

    #[test]
    fn keyboard_read_via_io() {
        let mut bus = make_bus();
        let result = bus.io_read(0xFEFE, 0);
        assert_eq!(result & 0x1F, 0x1F);

        bus.keyboard.set_key(0, 0, true);
        let result = bus.io_read(0xFEFE, 0);
        assert_eq!(result & 0x01, 0x00);
    }

    #[test]
    fn border_and_beeper_via_io() {
        let mut bus = make_bus();
        // Bit pattern 0b0001_0010: bit 4 set (beeper), bits 2:0 = 010 (red border).
        bus.io_write(0x00FE, 0x12, 0);
        assert_eq!(bus.ula.border_colour(), 2);
    }

    #[test]
    fn beeper_level_ors_mic_and_speaker_bits() {
        let mut bus = make_bus();
        bus.io_write(0x00FE, 0x08, 0); // only MIC bit (3)
        bus.io_write(0x00FE, 0x10, 1000); // only speaker bit (4)
        // Both writes should have produced audible samples; this is a smoke
        // test that set_speaker_level saw a true level for each write rather
        // than silently requiring bit 4 alone.
        bus.beeper.advance_to(2000, None);
        assert!(!bus.beeper.take_samples().is_empty());
    }

    #[test]
    fn unimplemented_port_returns_ff() {
        let mut bus = make_bus();
        assert_eq!(bus.io_read(0x00FF, 0), 0xFF);
    }

    #[test]
    fn kempston_port_returns_joystick_state() {
        let mut bus = make_bus();
        assert_eq!(bus.io_read(0x001F, 0), 0x00);
        bus.kempston = 0b0001_0001;
        assert_eq!(bus.io_read(0x001F, 0), 0x11);
    }

    #[test]
    fn tape_ear_overrides_mic_loopback() {
        let mut bus = make_bus();

        bus.io_write(0x00FE, 0x08, 0);
        assert_eq!(bus.io_read(0xFEFE, 1) & 0x40, 0x40, "MIC loopback");

        bus.set_tape_ear(true, false);
        assert_eq!(bus.io_read(0xFEFE, 2) & 0x40, 0x00, "tape_ear=false overrides MIC");

        bus.set_tape_ear(true, true);
        assert_eq!(bus.io_read(0xFEFE, 3) & 0x40, 0x40, "tape_ear=true");

        bus.set_tape_ear(false, false);
        assert_eq!(bus.io_read(0xFEFE, 4) & 0x40, 0x40, "MIC loopback restored");
    }
}
