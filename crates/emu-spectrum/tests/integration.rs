//! Integration tests for the ZX Spectrum emulator.
//!
//! Each test builds a small synthetic ROM or snapshot in-process (no binary
//! fixtures checked into the repo) and asserts on frame-level observables:
//! border colour, framebuffer pixels, audio samples, and SNA round-trip
//! bytes.

#![allow(clippy::cast_possible_truncation)]

use emu_core::Cpu;
use emu_spectrum::sna::{SnaImage, load_sna, save_sna};
use emu_spectrum::{Spectrum, SpectrumConfig, SpectrumModel};

fn make_spectrum_with_rom(rom: Vec<u8>) -> Spectrum {
    let config = SpectrumConfig {
        model: SpectrumModel::Spectrum48K,
        rom,
    };
    Spectrum::new(&config)
}

/// A tight border-cycling loop: DI; XOR A; OUT ($FE),A; INC A; AND 7;
/// LD B,$60; DJNZ; JR back to the OUT.
fn border_stripes_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x4000];
    let code: &[u8] = &[
        0xF3, // DI
        0xAF, // XOR A
        0xD3, 0xFE, // OUT ($FE),A
        0x3C, // INC A
        0xE6, 0x07, // AND 7
        0x06, 0x60, // LD B,$60
        0x10, 0xFE, // DJNZ $0009
        0x18, 0xF5, // JR $0002
    ];
    rom[..code.len()].copy_from_slice(code);
    rom
}

/// A beeper square-wave loop: DI; LD A,$10; OUT ($FE),A; XOR $10; delay; loop.
fn beeper_tone_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x4000];
    let code: &[u8] = &[
        0xF3, // DI
        0x3E, 0x10, // LD A,$10
        0xD3, 0xFE, // OUT ($FE),A
        0xEE, 0x10, // XOR $10
        0x06, 0x40, // LD B,$40
        0x10, 0xFE, // DJNZ $0009
        0x18, 0xF6, // JR $0003
    ];
    rom[..code.len()].copy_from_slice(code);
    rom
}

#[test]
fn border_stripes_render_multiple_colours() {
    let mut spectrum = make_spectrum_with_rom(border_stripes_rom());
    for _ in 0..3 {
        spectrum.run_frame();
    }

    let fb = spectrum.framebuffer();
    let width = spectrum.framebuffer_width() as usize;
    let mut colours = std::collections::HashSet::new();
    for y in 0..spectrum.framebuffer_height() as usize {
        colours.insert(fb[y * width]);
    }

    assert!(
        colours.len() >= 3,
        "border should cycle through at least 3 colours, got {}",
        colours.len()
    );
}

#[test]
fn beeper_tone_produces_bipolar_samples() {
    let mut spectrum = make_spectrum_with_rom(beeper_tone_rom());

    let mut all_audio: Vec<[i16; 2]> = Vec::new();
    for _ in 0..50 {
        spectrum.run_frame();
        all_audio.extend(spectrum.take_audio_buffer());
    }

    assert!(!all_audio.is_empty(), "square wave should produce audio samples");
    let has_positive = all_audio.iter().any(|s| s[0] > 0);
    let has_negative = all_audio.iter().any(|s| s[0] < 0);
    assert!(
        has_positive && has_negative,
        "a beeper square wave should swing both above and below centre"
    );
}

#[test]
fn sna_round_trips_registers_and_ram() {
    let mut ram = vec![0u8; 0xC000];
    ram[0] = 0xAA;
    ram[0xBFFF] = 0x55;

    let image = SnaImage {
        i: 0x3F,
        hl_alt: 0x1234,
        de_alt: 0x5678,
        bc_alt: 0x9ABC,
        af_alt: 0xDEF0,
        hl: 0x1111,
        de: 0x2222,
        bc: 0x3333,
        iy: 0x4444,
        ix: 0x5555,
        iff2: true,
        r: 0x42,
        af: 0x6666,
        sp: 0xFF00,
        im: 1,
        border: 2,
        pc: 0,
        ram,
        extra: None,
    };

    let bytes = save_sna(&image);
    assert_eq!(bytes.len(), 27 + 0xC000, "48K SNA must be exactly 49179 bytes");

    let reloaded = load_sna(&bytes, SpectrumModel::Spectrum48K).expect("round-trip SNA load");
    assert_eq!(reloaded.i, image.i);
    assert_eq!(reloaded.hl, image.hl);
    assert_eq!(reloaded.sp, image.sp);
    assert_eq!(reloaded.border, image.border);
    assert_eq!(reloaded.ram[0], 0xAA);
    assert_eq!(reloaded.ram[0xBFFF], 0x55);
}

#[test]
fn sna_snapshot_boots_into_spectrum() {
    let mut ram = vec![0u8; 0xC000];
    // PC is popped from the stack on a 48K load: point SP at $8000 and put
    // the landing address ($9000) right there.
    ram[0x8000 - 0x4000] = 0x00;
    ram[0x8000 - 0x4000 + 1] = 0x90;
    // A single HALT at $9000 so the CPU parks immediately after landing.
    ram[0x9000 - 0x4000] = 0x76;

    let image = SnaImage {
        i: 0,
        hl_alt: 0,
        de_alt: 0,
        bc_alt: 0,
        af_alt: 0,
        hl: 0,
        de: 0,
        bc: 0,
        iy: 0,
        ix: 0,
        iff2: false,
        r: 0,
        af: 0,
        sp: 0x8000,
        im: 1,
        border: 4,
        pc: 0,
        ram,
        extra: None,
    };

    let mut spectrum = make_spectrum_with_rom(vec![0u8; 0x4000]);
    spectrum.apply_sna(&image).expect("apply SNA to running spectrum");

    assert_eq!(spectrum.bus().ula.border_colour(), 4);
    assert_eq!(spectrum.cpu().pc(), 0x9000);
}
