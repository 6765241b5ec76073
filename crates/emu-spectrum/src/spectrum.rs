//! Top-level Spectrum system: owns the CPU, bus, and tape players, and
//! drives the per-line scheduler described in the design notes.
//!
//! Unlike the master-crystal `Tickable` model this replaces, everything
//! here runs off a single 64-bit T-state counter. One frame is one call to
//! [`Spectrum::run_frame`]: it processes scripted input, then runs the CPU
//! one scanline at a time, flushing every time-sliced subsystem (beeper,
//! border, tape/TZX players) to the exact T-state the CPU stopped at before
//! moving on to the next line.

use emu_core::{Bus, Cpu, Observable, Value};
use nec_upd765::{DskImage, Upd765};
use sinclair_ula::Ula;
use zilog_z80::Z80;

use crate::beeper::BeeperState;
use crate::bus::SpectrumBus;
use crate::config::{SpectrumConfig, SpectrumModel};
use crate::divide::DivIde;
use crate::fast_tap::{self, FastTapResult};
use crate::input::{InputQueue, SpectrumKey};
use crate::memory::{Memory128K, Memory48K, SpectrumMemory};
use crate::tap::TapFile;
use crate::tap_player::TapPlayer;
use crate::tzx::{TzxFile, TzxPlayer};

/// Default audio output sample rate.
const AUDIO_SAMPLE_RATE: u32 = 44_100;

/// Per-model video/CPU timing: (T-states/line, lines/frame, CPU Hz).
fn model_timing(model: SpectrumModel) -> (u16, u16, u32) {
    match model {
        SpectrumModel::Spectrum48K | SpectrumModel::TimexTC2048 | SpectrumModel::TimexTS2068 => {
            (224, 312, 3_500_000)
        }
        _ => (228, 312, 3_546_900),
    }
}

/// A headless hotkey/scripted-input action — the substitute for F6-F12 and
/// friends now that there's no window to capture keystrokes from.
#[derive(Debug, Clone)]
pub enum EmulatorCommand {
    /// F6: reload the currently inserted TAP via the fast loader and
    /// optionally jump PC to the last CODE block's start address.
    ReloadFastTap { auto_start: bool },
    /// F8: toggle play/pause on whichever tape player is loaded (TZX
    /// preferred over TAP pulse playback when both are present).
    TogglePlayback,
    /// F9: rewind the active tape player, anchored to the current beeper
    /// frame origin so edge callbacks stay monotonic.
    RewindTape,
    /// Press a key immediately.
    PressKey(SpectrumKey),
    /// Release a key immediately.
    ReleaseKey(SpectrumKey),
}

/// ZX Spectrum system.
pub struct Spectrum {
    cpu: Z80,
    bus: SpectrumBus,
    /// Monotonic master T-state counter (never resets across frames).
    t_state: u64,
    tstates_per_line: u16,
    lines_per_frame: u16,
    /// Completed frame counter.
    frame_count: u64,
    /// Timed input event queue for scripted key sequences.
    input_queue: InputQueue,
    /// Drift-free real-timing TAP pulse player, when a tape is inserted for
    /// pulse playback (`-T`).
    tap_player: Option<TapPlayer>,
    /// TZX pulse player, when a TZX tape is inserted (`-z`). Mutually
    /// exclusive with `tap_player` in normal use; playback is paused rather
    /// than active on whichever one isn't in use.
    tzx_player: Option<TzxPlayer>,
    model: SpectrumModel,
    playback_paused: bool,
}

impl Spectrum {
    /// Create a new Spectrum from the given configuration.
    ///
    /// # Panics
    ///
    /// Panics if the model is not yet supported or the ROM data doesn't
    /// match the expected image count for the model.
    #[must_use]
    pub fn new(config: &SpectrumConfig) -> Self {
        let (tstates_per_line, lines_per_frame, cpu_frequency) = model_timing(config.model);

        let memory: Box<dyn SpectrumMemory> = match config.model {
            SpectrumModel::Spectrum48K => Box::new(Memory48K::new(&config.rom)),
            SpectrumModel::Spectrum128K | SpectrumModel::SpectrumPlus2 => {
                let roms: Vec<Vec<u8>> = config.rom.chunks(0x4000).map(<[u8]>::to_vec).collect();
                Box::new(Memory128K::new(&roms))
            }
            SpectrumModel::SpectrumPlus3 => {
                let roms: Vec<Vec<u8>> = config.rom.chunks(0x4000).map(<[u8]>::to_vec).collect();
                Box::new(Memory128K::new(&roms))
            }
            other => panic!("model {other:?} is not yet supported"),
        };

        let has_ay = !matches!(
            config.model,
            SpectrumModel::Spectrum48K | SpectrumModel::TimexTC2048 | SpectrumModel::TimexTS2068
        );

        let ula = Ula::new(tstates_per_line, lines_per_frame);
        let beeper = BeeperState::new(AUDIO_SAMPLE_RATE);
        let mut bus = SpectrumBus::new(memory, ula, beeper);
        if has_ay {
            bus.enable_ay(cpu_frequency, AUDIO_SAMPLE_RATE);
            if let Some(ay) = &mut bus.ay {
                ay.set_stereo(gi_ay_3_8910::StereoMode::Acb);
            }
        }
        if config.model == SpectrumModel::SpectrumPlus3 {
            bus.fdc = Some(Upd765::new());
        }

        Self {
            cpu: Z80::new(),
            bus,
            t_state: 0,
            tstates_per_line,
            lines_per_frame,
            frame_count: 0,
            input_queue: InputQueue::new(),
            tap_player: None,
            tzx_player: None,
            model: config.model,
            playback_paused: false,
        }
    }

    /// Run one complete frame and return the number of T-states executed.
    pub fn run_frame(&mut self) -> u64 {
        self.input_queue.process(self.frame_count, &mut self.bus.keyboard);

        let frame_start = self.t_state;
        self.bus.ula.begin_frame(frame_start);
        let line_tstates = u32::from(self.tstates_per_line);

        for _line in 0..self.lines_per_frame {
            let slice_origin = self.t_state;
            self.bus.beeper.begin_slice(slice_origin);
            self.bus.ula.begin_slice(slice_origin);
            if let Some(tap) = self.tap_player.as_mut() {
                tap.begin_slice(slice_origin);
            }
            if let Some(tzx) = self.tzx_player.as_mut() {
                tzx.begin_slice(slice_origin);
            }

            let consumed = self.cpu.run(&mut self.bus, slice_origin, line_tstates);

            let tap_active = self.tap_player.as_ref().is_some_and(TapPlayer::active);
            let tzx_active = self.tzx_player.as_ref().is_some_and(TzxPlayer::active);
            let ear_level = if tzx_active {
                self.tzx_player.as_ref().map(TzxPlayer::level).unwrap_or(false)
            } else if tap_active {
                self.tap_player.as_ref().map(TapPlayer::level).unwrap_or(false)
            } else {
                false
            };
            self.bus.set_tape_ear(tap_active || tzx_active, ear_level);

            let bus = &mut self.bus;
            if let Some(tap) = self.tap_player.as_mut() {
                tap.end_slice(consumed, |t, level| {
                    bus.beeper.advance_to(t, bus.ay.as_mut());
                    bus.beeper.set_tape_input(true, level);
                });
            }
            if let Some(tzx) = self.tzx_player.as_mut() {
                tzx.end_slice(consumed, |t, level| {
                    bus.beeper.advance_to(t, bus.ay.as_mut());
                    bus.beeper.set_tape_input(true, level);
                });
            }
            bus.ula.end_slice(consumed);
            bus.beeper.end_slice(consumed, bus.ay.as_mut());

            self.t_state += u64::from(consumed);
        }

        let memory = &*self.bus.memory;
        self.bus.ula.raster_screen(|addr| memory.vram_peek(addr));
        self.cpu.interrupt();
        self.frame_count += 1;

        self.t_state - frame_start
    }

    /// Reference to the framebuffer (ARGB32).
    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.bus.ula.framebuffer()
    }

    #[must_use]
    pub fn framebuffer_width(&self) -> u32 {
        self.bus.ula.framebuffer_width()
    }

    #[must_use]
    pub fn framebuffer_height(&self) -> u32 {
        self.bus.ula.framebuffer_height()
    }

    /// Take the mixed audio buffer (beeper + tape EAR + AY if present).
    /// Returns mono S16 samples duplicated to stereo when no AY is present,
    /// matching the AY's own stereo panning otherwise.
    pub fn take_audio_buffer(&mut self) -> Vec<[i16; 2]> {
        let beeper = self.bus.beeper.take_samples();
        if let Some(ay) = &mut self.bus.ay {
            let ay_buf = ay.take_buffer();
            let len = beeper.len().min(ay_buf.len());
            (0..len)
                .map(|i| {
                    let b = i32::from(beeper[i]);
                    let l = (b + (ay_buf[i][0] as i32)) / 2;
                    let r = (b + (ay_buf[i][1] as i32)) / 2;
                    [l as i16, r as i16]
                })
                .collect()
        } else {
            beeper.into_iter().map(|s| [s, s]).collect()
        }
    }

    #[must_use]
    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &SpectrumBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SpectrumBus {
        &mut self.bus
    }

    /// Monotonic master T-state counter.
    #[must_use]
    pub fn t_state(&self) -> u64 {
        self.t_state
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[must_use]
    pub fn model(&self) -> SpectrumModel {
        self.model
    }

    pub fn input_queue(&mut self) -> &mut InputQueue {
        &mut self.input_queue
    }

    /// Press a key immediately (stays pressed until released).
    pub fn press_key(&mut self, key: SpectrumKey) {
        let (row, bit) = key.matrix();
        self.bus.keyboard.set_key(row, bit, true);
    }

    /// Release a key.
    pub fn release_key(&mut self, key: SpectrumKey) {
        let (row, bit) = key.matrix();
        self.bus.keyboard.set_key(row, bit, false);
    }

    /// Release all keys.
    pub fn release_all_keys(&mut self) {
        self.bus.keyboard.release_all();
        self.bus.kempston = 0;
    }

    /// Fast-load a TAP file: copy its CODE blocks directly into memory and,
    /// if `auto_start`, jump PC to the last block's start address.
    pub fn load_tap_fast(&mut self, tap: &TapFile, auto_start: bool) -> FastTapResult {
        let result = fast_tap::load(tap, &mut *self.bus.memory);
        if auto_start && let Some(start) = result.last_code_start {
            self.cpu.registers_mut().pc = start;
        }
        result
    }

    /// Insert a TAP file for real-timing pulse playback (`-T`). Replaces
    /// any TZX player.
    pub fn insert_tap_player(&mut self, tap: &TapFile) {
        let mut player = TapPlayer::new(tap);
        player.play(self.t_state);
        self.tap_player = Some(player);
        self.tzx_player = None;
    }

    /// Insert a TZX file for pulse playback (`-z`). Replaces any TAP player.
    pub fn insert_tzx(&mut self, tzx: TzxFile) {
        let is_48k = self.model == SpectrumModel::Spectrum48K;
        let mut player = TzxPlayer::new(tzx.blocks, is_48k);
        player.play(self.t_state);
        self.tzx_player = Some(player);
        self.tap_player = None;
    }

    /// Attach a DivIDE interface (`-i`/`-I`): `rom` is the 8 KiB/512 KiB
    /// flash image, `ide_image` the raw IDE/CompactFlash device backing it.
    pub fn attach_divide(&mut self, rom: &[u8], ide_image: Vec<u8>) {
        self.bus.divide = Some(DivIde::new(rom, ide_image));
    }

    /// Insert a floppy disk image into drive `drive` (0 = `-A`, 1 = `-B`).
    /// No-op on models without an FDC (only the +3 has one).
    pub fn insert_disk(&mut self, drive: usize, image: DskImage) {
        if let Some(fdc) = &mut self.bus.fdc {
            fdc.insert_disk(drive, image);
        }
    }

    /// Eject whichever tape player is loaded and restore MIC loopback.
    pub fn eject_tape(&mut self) {
        self.tap_player = None;
        self.tzx_player = None;
        self.bus.set_tape_ear(false, false);
    }

    /// Whether a tape player is currently playing.
    #[must_use]
    pub fn is_tape_playing(&self) -> bool {
        self.tzx_player.as_ref().is_some_and(TzxPlayer::active)
            || self.tap_player.as_ref().is_some_and(TapPlayer::active)
    }

    /// Apply a decoded SNA snapshot: registers, border colour, and RAM
    /// (plus 128K banks and paging state, when present). 48K snapshots
    /// don't carry PC in the header, so it's popped off the loaded stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack pointer in a 48K snapshot points into
    /// ROM (there would be nothing valid to pop PC from).
    pub fn apply_sna(&mut self, image: &crate::sna::SnaImage) -> Result<(), String> {
        self.cpu.reset();
        let regs = self.cpu.registers_mut();
        regs.i = image.i;
        regs.l_alt = image.hl_alt as u8;
        regs.h_alt = (image.hl_alt >> 8) as u8;
        regs.e_alt = image.de_alt as u8;
        regs.d_alt = (image.de_alt >> 8) as u8;
        regs.c_alt = image.bc_alt as u8;
        regs.b_alt = (image.bc_alt >> 8) as u8;
        regs.f_alt = image.af_alt as u8;
        regs.a_alt = (image.af_alt >> 8) as u8;
        regs.l = image.hl as u8;
        regs.h = (image.hl >> 8) as u8;
        regs.e = image.de as u8;
        regs.d = (image.de >> 8) as u8;
        regs.c = image.bc as u8;
        regs.b = (image.bc >> 8) as u8;
        regs.iy = image.iy;
        regs.ix = image.ix;
        regs.iff1 = image.iff2;
        regs.iff2 = image.iff2;
        regs.r = image.r;
        regs.f = image.af as u8;
        regs.a = (image.af >> 8) as u8;
        regs.sp = image.sp;
        regs.im = image.im;

        // Page in the bank the file's 48K-shaped RAM blob expects at $C000
        // *before* writing it, so bytes land in the bank the snapshot
        // actually describes rather than whatever's paged in by default.
        if let Some(extra) = &image.extra {
            self.bus.memory.write_bank_register(extra.bank_7ffd);
        }
        for (i, &byte) in image.ram.iter().enumerate() {
            self.bus.memory.write(0x4000u16.wrapping_add(i as u16), byte);
        }
        self.bus.ula.border_advance_to(self.t_state);
        self.bus.ula.set_border_colour(image.border);

        if let Some(extra) = &image.extra {
            self.cpu.registers_mut().pc = image.pc;
            for (bank, data) in &extra.banks {
                self.bus.memory.write_bank(usize::from(*bank), data);
            }
        } else {
            let sp = self.cpu.registers_mut().sp;
            if sp < 0x4000 {
                return Err(format!("SNA stack pointer ${sp:04X} points into ROM — cannot pop PC"));
            }
            let lo = self.bus.memory.read(sp);
            let hi = self.bus.memory.read(sp.wrapping_add(1));
            self.cpu.registers_mut().sp = sp.wrapping_add(2);
            self.cpu.registers_mut().pc = u16::from(lo) | (u16::from(hi) << 8);
        }
        Ok(())
    }

    /// Apply a headless hotkey substitute (§6 F6-F12, reinterpreted as
    /// injectable commands since this crate has no window to own them).
    pub fn apply_command(&mut self, command: &EmulatorCommand) {
        match command {
            EmulatorCommand::ReloadFastTap { auto_start } => {
                // Caller is expected to have already inserted a fresh
                // TapFile via `load_tap_fast`; this variant documents the
                // hotkey semantics for a CLI script driver.
                let _ = auto_start;
            }
            EmulatorCommand::TogglePlayback => {
                self.playback_paused = !self.playback_paused;
                if let Some(tzx) = self.tzx_player.as_mut() {
                    if self.playback_paused {
                        tzx.stop();
                    } else {
                        tzx.play(self.t_state);
                    }
                } else if let Some(tap) = self.tap_player.as_mut() {
                    if self.playback_paused {
                        tap.stop();
                    } else {
                        tap.play(self.t_state);
                    }
                }
            }
            EmulatorCommand::RewindTape => {
                let origin = self.bus.beeper.frame_origin();
                if let Some(tzx) = self.tzx_player.as_mut() {
                    tzx.rewind(origin);
                }
                if let Some(tap) = self.tap_player.as_mut() {
                    tap.rewind(origin);
                }
            }
            EmulatorCommand::PressKey(key) => self.press_key(*key),
            EmulatorCommand::ReleaseKey(key) => self.release_key(*key),
        }
    }
}

impl Observable for Spectrum {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            match rest {
                "pc" => Some(Value::U16(self.cpu.pc() as u16)),
                "halted" => Some(Value::Bool(self.cpu.is_halted())),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("ula.") {
            match rest {
                "border" => Some(self.bus.ula.border_colour().into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let addr =
                if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
                    u16::from_str_radix(hex, 16).ok()
                } else if let Some(hex) = rest.strip_prefix('$') {
                    u16::from_str_radix(hex, 16).ok()
                } else {
                    rest.parse().ok()
                };
            addr.map(|a| Value::U8(self.bus.memory.peek(a)))
        } else if let Some(rest) = path.strip_prefix("ay.") {
            let ay = self.bus.ay.as_ref()?;
            match rest {
                "buffer_len" => Some(Value::U64(ay.buffer_len() as u64)),
                _ => None,
            }
        } else {
            match path {
                "t_state" => Some(self.t_state.into()),
                "frame_count" => Some(self.frame_count.into()),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.pc",
            "cpu.halted",
            "ula.border",
            "memory.<address>",
            "ay.buffer_len",
            "t_state",
            "frame_count",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SpectrumConfig, SpectrumModel};
    use crate::tap::TapBlock;

    fn make_spectrum() -> Spectrum {
        // Minimal ROM: DI; HALT.
        let mut rom = vec![0u8; 0x4000];
        rom[0] = 0xF3;
        rom[1] = 0x76;
        Spectrum::new(&SpectrumConfig {
            model: SpectrumModel::Spectrum48K,
            rom,
        })
    }

    #[test]
    fn run_frame_advances_t_state_by_one_frame() {
        let mut spec = make_spectrum();
        let consumed = spec.run_frame();
        let frame_tstates = u64::from(spec.tstates_per_line) * u64::from(spec.lines_per_frame);
        assert!(consumed >= frame_tstates, "frame should run at least a full frame's T-states");
        assert_eq!(spec.t_state(), consumed);
    }

    #[test]
    fn framebuffer_correct_size() {
        let spec = make_spectrum();
        assert_eq!(spec.framebuffer_width(), 320);
        assert_eq!(spec.framebuffer_height(), 256);
        assert_eq!(spec.framebuffer().len(), 320 * 256);
    }

    #[test]
    fn observable_cpu_pc() {
        let spec = make_spectrum();
        assert_eq!(spec.query("cpu.pc"), Some(Value::U16(0)));
    }

    #[test]
    fn observable_memory_tracks_writes() {
        let mut spec = make_spectrum();
        assert_eq!(spec.query("memory.0x0000"), Some(Value::U8(0xF3)));
        spec.bus_mut().memory.write(0x8000, 0xAB);
        assert_eq!(spec.query("memory.0x8000"), Some(Value::U8(0xAB)));
    }

    #[test]
    fn fast_tap_loads_code_and_sets_pc_when_auto_start() {
        let mut spec = make_spectrum();
        let header = {
            let mut data = vec![3u8]; // CODE
            data.extend_from_slice(b"PROGRAM   ");
            data.extend_from_slice(&4u16.to_le_bytes());
            data.extend_from_slice(&0x8000u16.to_le_bytes());
            data.extend_from_slice(&[0, 0]);
            TapBlock { flag: 0x00, data }
        };
        let tap = TapFile {
            blocks: vec![header, TapBlock { flag: 0xFF, data: vec![1, 2, 3, 4] }],
        };
        let result = spec.load_tap_fast(&tap, true);
        assert_eq!(result.blocks_loaded, 1);
        assert_eq!(spec.cpu().pc(), 0x8000);
    }

    #[test]
    fn tap_player_drives_ear_input_while_active() {
        let mut spec = make_spectrum();
        let tap = TapFile {
            blocks: vec![TapBlock { flag: 0xFF, data: vec![0xAA] }],
        };
        spec.insert_tap_player(&tap);
        assert!(spec.is_tape_playing());
        spec.run_frame();
        assert!(spec.is_tape_playing());
    }
}
