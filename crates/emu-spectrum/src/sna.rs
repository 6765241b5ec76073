//! SNA snapshot format: pure data transforms, no running emulator required.
//!
//! 48K SNA is 49,179 bytes: a 27-byte register header plus 49,152 bytes of
//! RAM ($4000-$FFFF). PC isn't in the header — it's on the stack, so the
//! loader pops it. 128K/+3 snapshots add PC, the paging register, the
//! TR-DOS flag, and the non-paged-in RAM banks.

#![allow(clippy::cast_possible_truncation)]

use crate::config::SpectrumModel;

const HEADER_SIZE: usize = 27;
const SNA_48K_SIZE: usize = HEADER_SIZE + 0xC000;
const BANK_SIZE: usize = 0x4000;

/// Decoded SNA snapshot contents, ready for a caller to copy into its own
/// CPU registers and memory map.
#[derive(Debug, Clone)]
pub struct SnaImage {
    pub i: u8,
    pub hl_alt: u16,
    pub de_alt: u16,
    pub bc_alt: u16,
    pub af_alt: u16,
    pub hl: u16,
    pub de: u16,
    pub bc: u16,
    pub iy: u16,
    pub ix: u16,
    pub iff2: bool,
    pub r: u8,
    pub af: u16,
    pub sp: u16,
    pub im: u8,
    pub border: u8,
    pub pc: u16,
    /// RAM pages 5, 2, and whichever is paged in at $C000 at save time, in
    /// that $4000-$FFFF order (48K layout regardless of model).
    pub ram: Vec<u8>,
    /// Present for 128K/+2/+3 snapshots only.
    pub extra: Option<Sna128Extra>,
}

/// 128K-specific fields and the RAM banks not already covered by `ram`.
#[derive(Debug, Clone)]
pub struct Sna128Extra {
    pub bank_7ffd: u8,
    pub trdos: u8,
    /// Remaining 16 KiB banks in file order, tagged with their bank index
    /// (0-7, excluding 5, 2, and `bank_7ffd & 7`).
    pub banks: Vec<(u8, Vec<u8>)>,
}

/// Parse a 48K or 128K/+3 SNA snapshot.
///
/// # Errors
///
/// Returns an error if the file size doesn't match a recognised SNA layout
/// for `model`.
pub fn load_sna(data: &[u8], model: SpectrumModel) -> Result<SnaImage, String> {
    if data.len() < SNA_48K_SIZE {
        return Err(format!(
            "SNA file too short: need at least {SNA_48K_SIZE} bytes, got {}",
            data.len()
        ));
    }

    let i = data[0];
    let hl_alt = u16::from(data[1]) | (u16::from(data[2]) << 8);
    let de_alt = u16::from(data[3]) | (u16::from(data[4]) << 8);
    let bc_alt = u16::from(data[5]) | (u16::from(data[6]) << 8);
    let af_alt = u16::from(data[7]) | (u16::from(data[8]) << 8);
    let hl = u16::from(data[9]) | (u16::from(data[10]) << 8);
    let de = u16::from(data[11]) | (u16::from(data[12]) << 8);
    let bc = u16::from(data[13]) | (u16::from(data[14]) << 8);
    let iy = u16::from(data[15]) | (u16::from(data[16]) << 8);
    let ix = u16::from(data[17]) | (u16::from(data[18]) << 8);

    // Byte 19 (IFF2): the pre-distillation source disagreed on which bit
    // mattered. Bit 2 is authoritative; any other non-zero value is still
    // read as "enabled", matching that source's own fallback chain.
    let iff2 = data[19] & 0x04 != 0 || data[19] != 0;

    let r = data[20];
    let af = u16::from(data[21]) | (u16::from(data[22]) << 8);
    let sp = u16::from(data[23]) | (u16::from(data[24]) << 8);
    let im = data[25];
    let border = data[26] & 0x07;

    let ram48 = data[HEADER_SIZE..SNA_48K_SIZE].to_vec();

    let is_128 = !matches!(
        model,
        SpectrumModel::Spectrum48K | SpectrumModel::TimexTC2048 | SpectrumModel::TimexTS2068
    );

    if !is_128 {
        if data.len() != SNA_48K_SIZE {
            return Err(format!(
                "48K SNA must be exactly {SNA_48K_SIZE} bytes, got {}",
                data.len()
            ));
        }
        // 48K has no PC in the header — it's popped from the stack by the
        // caller once RAM is in place (SP must point into RAM).
        return Ok(SnaImage {
            i, hl_alt, de_alt, bc_alt, af_alt, hl, de, bc, iy, ix, iff2, r, af, sp, im, border,
            pc: 0,
            ram: ram48,
            extra: None,
        });
    }

    let tail = &data[SNA_48K_SIZE..];
    if tail.len() < 4 {
        return Err("128K SNA missing PC/7FFD/TR-DOS trailer".to_string());
    }
    let pc = u16::from(tail[0]) | (u16::from(tail[1]) << 8);
    let bank_7ffd = tail[2];
    let trdos = tail[3];
    let selected_bank = bank_7ffd & 0x07;

    let remaining = &tail[4..];
    let mut banks = Vec::new();
    let mut offset = 0;
    for bank in 0u8..8 {
        if bank == 5 || bank == 2 || bank == selected_bank {
            continue;
        }
        if offset + BANK_SIZE > remaining.len() {
            break;
        }
        banks.push((bank, remaining[offset..offset + BANK_SIZE].to_vec()));
        offset += BANK_SIZE;
    }

    Ok(SnaImage {
        i, hl_alt, de_alt, bc_alt, af_alt, hl, de, bc, iy, ix, iff2, r, af, sp, im, border, pc,
        ram: ram48,
        extra: Some(Sna128Extra { bank_7ffd, trdos, banks }),
    })
}

/// Serialise a snapshot back to SNA bytes. The IFF2 byte is always written
/// as exactly `0x04` or `0x00`, so repeated load/save round-trips are
/// stable even though loading itself stays permissive about that byte.
#[must_use]
pub fn save_sna(image: &SnaImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(SNA_48K_SIZE + 4);
    out.push(image.i);
    out.extend_from_slice(&image.hl_alt.to_le_bytes());
    out.extend_from_slice(&image.de_alt.to_le_bytes());
    out.extend_from_slice(&image.bc_alt.to_le_bytes());
    out.extend_from_slice(&image.af_alt.to_le_bytes());
    out.extend_from_slice(&image.hl.to_le_bytes());
    out.extend_from_slice(&image.de.to_le_bytes());
    out.extend_from_slice(&image.bc.to_le_bytes());
    out.extend_from_slice(&image.iy.to_le_bytes());
    out.extend_from_slice(&image.ix.to_le_bytes());
    out.push(if image.iff2 { 0x04 } else { 0x00 });
    out.push(image.r);
    out.extend_from_slice(&image.af.to_le_bytes());
    out.extend_from_slice(&image.sp.to_le_bytes());
    out.push(image.im);
    out.push(image.border);
    out.extend_from_slice(&image.ram);

    if let Some(extra) = &image.extra {
        out.extend_from_slice(&image.pc.to_le_bytes());
        out.push(extra.bank_7ffd);
        out.push(extra.trdos);
        for (_, bank) in &extra.banks {
            out.extend_from_slice(bank);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_48k_sna(sp: u16, pc_in_stack: u16, border: u8) -> Vec<u8> {
        let mut data = vec![0u8; SNA_48K_SIZE];
        data[0] = 0x3F;
        data[20] = 0x42;
        data[21] = 0xFF;
        data[22] = 0xAA;
        data[23] = sp as u8;
        data[24] = (sp >> 8) as u8;
        data[25] = 1;
        data[26] = border;
        let sp_offset = (sp - 0x4000) as usize;
        data[HEADER_SIZE + sp_offset] = pc_in_stack as u8;
        data[HEADER_SIZE + sp_offset + 1] = (pc_in_stack >> 8) as u8;
        data
    }

    #[test]
    fn load_48k_sna_parses_registers() {
        let data = make_48k_sna(0x8000, 0x1234, 2);
        let image = load_sna(&data, SpectrumModel::Spectrum48K).expect("valid SNA");
        assert_eq!(image.i, 0x3F);
        assert_eq!(image.r, 0x42);
        assert_eq!(image.af, u16::from_le_bytes([0xFF, 0xAA]));
        assert_eq!(image.sp, 0x8000);
        assert_eq!(image.im, 1);
        assert_eq!(image.border, 2);
        assert!(image.extra.is_none());
    }

    #[test]
    fn load_48k_sna_wrong_size_errors() {
        assert!(load_sna(&[0u8; 100], SpectrumModel::Spectrum48K).is_err());
    }

    #[test]
    fn iff2_fallback_accepts_any_nonzero_byte() {
        let mut data = make_48k_sna(0x8000, 0, 0);
        data[19] = 0x80; // bit 2 clear, but non-zero
        let image = load_sna(&data, SpectrumModel::Spectrum48K).expect("valid SNA");
        assert!(image.iff2);

        data[19] = 0x00;
        let image = load_sna(&data, SpectrumModel::Spectrum48K).expect("valid SNA");
        assert!(!image.iff2);
    }

    #[test]
    fn save_round_trips_48k_header_bytes() {
        let data = make_48k_sna(0x8000, 0x1234, 5);
        let image = load_sna(&data, SpectrumModel::Spectrum48K).expect("valid SNA");
        let saved = save_sna(&image);
        // The 27-byte header (minus IFF2, which is normalised) round-trips.
        assert_eq!(saved[0], data[0]);
        assert_eq!(&saved[1..19], &data[1..19]);
        assert_eq!(saved[19], 0x00); // normalised from 0x00 input
        assert_eq!(&saved[20..27], &data[20..27]);
    }

    #[test]
    fn load_128k_sna_parses_extra_fields_and_banks() {
        let mut data = make_48k_sna(0x8000, 0, 0);
        data.extend_from_slice(&0x5678u16.to_le_bytes()); // PC
        data.push(0x03); // 7FFD: bank 3 paged at $C000
        data.push(0x00); // TR-DOS
        // Five remaining banks (all except 5, 2, 3), in order 0,1,4,6,7.
        for bank in [0u8, 1, 4, 6, 7] {
            data.extend(std::iter::repeat_n(bank, BANK_SIZE));
        }

        let image = load_sna(&data, SpectrumModel::Spectrum128K).expect("valid 128K SNA");
        let extra = image.extra.expect("128K extras present");
        assert_eq!(image.pc, 0x5678);
        assert_eq!(extra.bank_7ffd, 0x03);
        assert_eq!(extra.banks.len(), 5);
        assert_eq!(extra.banks[0].0, 0);
        assert_eq!(extra.banks[0].1[0], 0);
        assert_eq!(extra.banks[4].0, 7);
        assert_eq!(extra.banks[4].1[0], 7);
    }
}
