//! Headless ZX Spectrum emulator binary.
//!
//! Drives a [`Spectrum`] from the command line: no window, no audio device.
//! Frames run to completion as fast as the host allows (or throttled to
//! 50 Hz unless `-f` is given); screenshots, audio, and scripted input are
//! the only output/input surfaces.

#![allow(clippy::cast_possible_truncation)]

use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use emu_core::Cpu;
use emu_spectrum::{
    EmulatorCommand, Spectrum, SpectrumConfig, SpectrumError, SpectrumKey, SpectrumModel, TapFile,
    TzxFile, capture, load_sna,
};
use nec_upd765::dsk::parse_dsk;

const FRAME_DURATION: Duration = Duration::from_micros(20_000);
const DEFAULT_FRAMES: u32 = 50;

struct CliArgs {
    rom_path: PathBuf,
    base_ram_k: Option<u32>,
    disk_a: Option<PathBuf>,
    disk_b: Option<PathBuf>,
    ide_path: Option<PathBuf>,
    div_rom_path: Option<PathBuf>,
    fast_tap_path: Option<PathBuf>,
    tap_pulse_path: Option<PathBuf>,
    tzx_path: Option<PathBuf>,
    sna_path: Option<PathBuf>,
    no_throttle: bool,
    trace_mask: u32,
    frames: u32,
    script_path: Option<PathBuf>,
    screenshot_path: Option<PathBuf>,
}

/// Hand-rolled flag parser: short flags only, no `clap`/`argh`/`structopt`.
fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut rom_path = None;
    let mut base_ram_k = None;
    let mut disk_a = None;
    let mut disk_b = None;
    let mut ide_path = None;
    let mut div_rom_path = None;
    let mut fast_tap_path = None;
    let mut tap_pulse_path = None;
    let mut tzx_path = None;
    let mut sna_path = None;
    let mut no_throttle = false;
    let mut trace_mask = 0u32;
    let mut frames = DEFAULT_FRAMES;
    let mut script_path = None;
    let mut screenshot_path = None;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut next = || -> Result<&String, String> {
            i += 1;
            args.get(i).ok_or_else(|| format!("{arg} requires a value"))
        };
        match arg {
            "-r" => rom_path = Some(PathBuf::from(next()?)),
            "-m" => {
                let value = next()?;
                let k: u32 = value.parse().map_err(|_| format!("-m: invalid number {value}"))?;
                if !(16..=48).contains(&k) {
                    return Err(format!("-m: {k} out of range 16..48"));
                }
                base_ram_k = Some(k);
            }
            "-A" => disk_a = Some(PathBuf::from(next()?)),
            "-B" => disk_b = Some(PathBuf::from(next()?)),
            "-i" => ide_path = Some(PathBuf::from(next()?)),
            "-I" => div_rom_path = Some(PathBuf::from(next()?)),
            "-t" => fast_tap_path = Some(PathBuf::from(next()?)),
            "-T" => tap_pulse_path = Some(PathBuf::from(next()?)),
            "-z" => tzx_path = Some(PathBuf::from(next()?)),
            "-s" => sna_path = Some(PathBuf::from(next()?)),
            "-f" => no_throttle = true,
            "-d" => {
                let value = next()?;
                trace_mask = if let Some(hex) = value.strip_prefix("0x") {
                    u32::from_str_radix(hex, 16).map_err(|_| format!("-d: invalid mask {value}"))?
                } else {
                    value.parse().map_err(|_| format!("-d: invalid mask {value}"))?
                };
            }
            "--frames" => {
                let value = next()?;
                frames = value.parse().map_err(|_| format!("--frames: invalid number {value}"))?;
            }
            "--script" => script_path = Some(PathBuf::from(next()?)),
            "--screenshot" => screenshot_path = Some(PathBuf::from(next()?)),
            other => return Err(format!("unrecognised argument: {other}")),
        }
        i += 1;
    }

    Ok(CliArgs {
        rom_path: rom_path.ok_or("-r <rom> is required")?,
        base_ram_k,
        disk_a,
        disk_b,
        ide_path,
        div_rom_path,
        fast_tap_path,
        tap_pulse_path,
        tzx_path,
        sna_path,
        no_throttle,
        trace_mask,
        frames,
        script_path,
        screenshot_path,
    })
}

/// Model selection by ROM image size, per §6: 16 KiB → 48K, 32 KiB → 128K,
/// 64 KiB → +3 (ROM images concatenated back to back in file order).
fn model_for_rom_size(len: usize) -> Result<SpectrumModel, SpectrumError> {
    match len {
        0x4000 => Ok(SpectrumModel::Spectrum48K),
        0x8000 => Ok(SpectrumModel::Spectrum128K),
        0x10000 => Ok(SpectrumModel::SpectrumPlus3),
        other => Err(SpectrumError::Config(format!(
            "ROM file must be 16384, 32768, or 65536 bytes, got {other}"
        ))),
    }
}

fn key_from_name(name: &str) -> Option<SpectrumKey> {
    use SpectrumKey::{
        A, B, C, CapsShift, D, E, Enter, F, G, H, I, J, K, L, M, N, N0, N1, N2, N3, N4, N5, N6, N7,
        N8, N9, O, P, Q, R, S, SymShift, Space, T, U, V, W, X, Y, Z,
    };
    Some(match name {
        "A" => A, "B" => B, "C" => C, "D" => D, "E" => E, "F" => F, "G" => G, "H" => H,
        "I" => I, "J" => J, "K" => K, "L" => L, "M" => M, "N" => N, "O" => O, "P" => P,
        "Q" => Q, "R" => R, "S" => S, "T" => T, "U" => U, "V" => V, "W" => W, "X" => X,
        "Y" => Y, "Z" => Z,
        "0" => N0, "1" => N1, "2" => N2, "3" => N3, "4" => N4,
        "5" => N5, "6" => N6, "7" => N7, "8" => N8, "9" => N9,
        "ENTER" => Enter, "SPACE" => Space, "CAPSSHIFT" => CapsShift, "SYMSHIFT" => SymShift,
        _ => return None,
    })
}

/// A scripted event parsed from `--script`, queued against `Spectrum`.
enum ScriptLine {
    Key { key: SpectrumKey, frame: u64, hold: u64 },
    Text { text: String, frame: u64 },
    ReloadTape,
    RewindTape,
}

fn parse_script(contents: &str) -> Result<Vec<ScriptLine>, String> {
    let mut lines = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fail = || format!("script line {}: malformed: {line}", lineno + 1);
        if let Some(rest) = line.strip_prefix("key ") {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            let [name, frame, hold] = parts.as_slice() else { return Err(fail()) };
            let key = key_from_name(name).ok_or_else(fail)?;
            let frame = frame.parse().map_err(|_| fail())?;
            let hold = hold.parse().map_err(|_| fail())?;
            lines.push(ScriptLine::Key { key, frame, hold });
        } else if let Some(rest) = line.strip_prefix("text ") {
            let rest = rest.trim();
            let (text, frame_str) = rest.rsplit_once(' ').ok_or_else(fail)?;
            let text = text.trim().trim_matches('"').to_string();
            let frame = frame_str.trim().parse().map_err(|_| fail())?;
            lines.push(ScriptLine::Text { text, frame });
        } else if line == "reload-tape" {
            lines.push(ScriptLine::ReloadTape);
        } else if line == "rewind-tape" {
            lines.push(ScriptLine::RewindTape);
        } else {
            return Err(fail());
        }
    }
    Ok(lines)
}

fn load_file(path: &Path) -> Result<Vec<u8>, SpectrumError> {
    std::fs::read(path).map_err(SpectrumError::from)
}

fn run(args: &CliArgs) -> Result<(), SpectrumError> {
    let rom = load_file(&args.rom_path)?;
    let model = model_for_rom_size(rom.len())?;

    if let Some(k) = args.base_ram_k {
        if model != SpectrumModel::Spectrum48K {
            eprintln!("cli: -m {k} only meaningful on the 48K model, ignoring");
        }
        // Partial-RAM machines aren't modelled beyond this validation; the
        // 48K Memory implementation always backs the full complement.
    }

    let mut spectrum = Spectrum::new(&SpectrumConfig { model, rom });

    if let Some(path) = &args.disk_a {
        let data = load_file(path)?;
        let image = parse_dsk(&data).map_err(SpectrumError::Format)?;
        spectrum.insert_disk(0, image);
    }
    if let Some(path) = &args.disk_b {
        let data = load_file(path)?;
        let image = parse_dsk(&data).map_err(SpectrumError::Format)?;
        spectrum.insert_disk(1, image);
    }

    if let Some(div_rom_path) = &args.div_rom_path {
        let div_rom = load_file(div_rom_path)?;
        let ide_image = match &args.ide_path {
            Some(path) => load_file(path)?,
            None => Vec::new(),
        };
        spectrum.attach_divide(&div_rom, ide_image);
    } else if args.ide_path.is_some() {
        return Err(SpectrumError::Config("-i given without -I (DivIDE ROM)".to_string()));
    }

    if let Some(path) = &args.sna_path {
        let data = load_file(path)?;
        let image = load_sna(&data, model).map_err(SpectrumError::Format)?;
        spectrum.apply_sna(&image).map_err(SpectrumError::Format)?;
    }

    if let Some(path) = &args.fast_tap_path {
        let data = load_file(path)?;
        let tap = TapFile::parse(&data).map_err(SpectrumError::Format)?;
        spectrum.load_tap_fast(&tap, true);
    }

    if let Some(path) = &args.tap_pulse_path {
        let data = load_file(path)?;
        let tap = TapFile::parse(&data).map_err(SpectrumError::Format)?;
        spectrum.insert_tap_player(&tap);
    } else if let Some(path) = &args.tzx_path {
        let data = load_file(path)?;
        match TzxFile::parse(&data) {
            Ok(tzx) => spectrum.insert_tzx(tzx),
            Err(e) => eprintln!("tzx: load failed, continuing without tape: {e}"),
        }
    }

    let script = match &args.script_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            parse_script(&text).map_err(SpectrumError::Format)?
        }
        None => Vec::new(),
    };
    for line in &script {
        match line {
            ScriptLine::Key { key, frame, hold } => {
                spectrum.input_queue().enqueue_key(*key, *frame, *hold);
            }
            ScriptLine::Text { text, frame } => {
                spectrum.input_queue().enqueue_text(text, *frame);
            }
            ScriptLine::ReloadTape => {
                spectrum.apply_command(&EmulatorCommand::ReloadFastTap { auto_start: true });
            }
            ScriptLine::RewindTape => {
                spectrum.apply_command(&EmulatorCommand::RewindTape);
            }
        }
    }

    // Always bounded by --frames; no signal-driven indefinite mode, since
    // Ctrl-C handling needs a crate this workspace doesn't otherwise pull in.
    for frame in 0..args.frames {
        let frame_start = Instant::now();
        spectrum.run_frame();
        let _ = spectrum.take_audio_buffer(); // drain so the buffer doesn't grow unbounded

        if args.trace_mask & 0x01 != 0 {
            eprintln!(
                "trace: frame {frame} pc=${:04X} border={} t_state={}",
                spectrum.cpu().pc(),
                spectrum.bus().ula.border_colour(),
                spectrum.t_state()
            );
        }

        if !args.no_throttle {
            let elapsed = frame_start.elapsed();
            if elapsed < FRAME_DURATION {
                std::thread::sleep(FRAME_DURATION - elapsed);
            }
        }
    }

    if let Some(path) = &args.screenshot_path {
        capture::save_screenshot(&spectrum, path).map_err(|e| SpectrumError::Format(e.to_string()))?;
    }

    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
