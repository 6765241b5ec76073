//! TAP pulse player — fixed-timing pilot/sync/bit edge generator over a
//! sequence of parsed TAP blocks.
//!
//! Unlike the fast TAP loader (`fast_tap.rs`), this plays tape blocks back
//! as an authentic EAR-input pulse train, the way a real cassette deck
//! would, so ROM loaders that expect real timing (custom loaders, not just
//! the standard ROM routine) also work.

use crate::tap::TapFile;

const PILOT_PULSE: u32 = 2168;
const SYNC1_PULSE: u32 = 667;
const SYNC2_PULSE: u32 = 735;
const ZERO_PULSE: u32 = 855;
const ONE_PULSE: u32 = 1710;
const HEADER_PILOT_COUNT: u32 = 8063;
const DATA_PILOT_COUNT: u32 = 3223;
const INTER_BLOCK_PAUSE_MS: u32 = 1000;

/// Machine clock used to convert the inter-block pause from milliseconds to
/// T-states (matches the TZX player's rate).
const ULA_CLOCK: u64 = 3_546_900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NextBlock,
    Pilot { remaining: u32 },
    Sync1,
    Sync2,
    Bits { byte_idx: usize, bit_idx: u8, second_half: bool },
    Pause,
    Done,
}

/// Drift-free TAP pulse player.
pub struct TapPlayer {
    blocks: Vec<Vec<u8>>, // each entry: flag byte + data bytes, as transmitted
    block_idx: usize,
    state: State,
    level: bool,
    /// Absolute T-state of the next scheduled edge. `None` when idle/paused
    /// indefinitely (shouldn't happen in practice; pauses always schedule).
    next_edge_at: u64,
    playing: bool,
    frame_origin: u64,
    slice_origin: u64,
}

impl TapPlayer {
    #[must_use]
    pub fn new(tap: &TapFile) -> Self {
        let blocks = tap
            .blocks
            .iter()
            .map(|b| {
                let mut bytes = Vec::with_capacity(b.data.len() + 1);
                bytes.push(b.flag);
                bytes.extend_from_slice(&b.data);
                bytes
            })
            .collect();
        Self {
            blocks,
            block_idx: 0,
            state: State::NextBlock,
            level: true,
            next_edge_at: 0,
            playing: false,
            frame_origin: 0,
            slice_origin: 0,
        }
    }

    /// Start (or resume) playback at absolute T-state `origin`.
    pub fn play(&mut self, origin: u64) {
        if self.block_idx >= self.blocks.len() {
            return;
        }
        self.playing = true;
        if matches!(self.state, State::NextBlock) && self.next_edge_at == 0 {
            self.next_edge_at = origin;
        }
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Rewind to the first block.
    pub fn rewind(&mut self, origin: u64) {
        self.block_idx = 0;
        self.state = State::NextBlock;
        self.level = true;
        self.next_edge_at = origin;
        self.frame_origin = origin;
        self.slice_origin = origin;
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.playing && !matches!(self.state, State::Done)
    }

    #[must_use]
    pub fn level(&self) -> bool {
        self.level
    }

    pub fn begin_slice(&mut self, origin: u64) {
        self.slice_origin = origin;
    }

    /// Flush playback to the end of the current slice, notifying `on_edge`
    /// with the exact T-state of every EAR transition (so the beeper can be
    /// advanced to that point before the level changes).
    pub fn end_slice(&mut self, cpu_tstates: u32, mut on_edge: impl FnMut(u64, bool)) {
        let t_now = self.slice_origin + u64::from(cpu_tstates);
        self.advance_to(t_now, &mut on_edge);
        self.frame_origin = t_now;
    }

    fn advance_to(&mut self, t_now: u64, on_edge: &mut impl FnMut(u64, bool)) {
        if !self.playing {
            return;
        }
        let mut guard = 0u32;
        while self.next_edge_at <= t_now && !matches!(self.state, State::Done) {
            guard += 1;
            if guard > 200_000 {
                break;
            }
            self.step(on_edge);
        }
    }

    fn step(&mut self, on_edge: &mut impl FnMut(u64, bool)) {
        match self.state {
            State::NextBlock => {
                if self.block_idx >= self.blocks.len() {
                    self.state = State::Done;
                    self.playing = false;
                    return;
                }
                let flag = self.blocks[self.block_idx][0];
                let count = if flag == 0x00 { HEADER_PILOT_COUNT } else { DATA_PILOT_COUNT };
                self.state = State::Pilot { remaining: count };
                self.next_edge_at += u64::from(PILOT_PULSE);
            }
            State::Pilot { remaining } => {
                self.level = !self.level;
                on_edge(self.next_edge_at, self.level);
                if remaining <= 1 {
                    self.state = State::Sync1;
                    self.next_edge_at += u64::from(SYNC1_PULSE);
                } else {
                    self.state = State::Pilot { remaining: remaining - 1 };
                    self.next_edge_at += u64::from(PILOT_PULSE);
                }
            }
            State::Sync1 => {
                self.level = !self.level;
                on_edge(self.next_edge_at, self.level);
                self.state = State::Sync2;
                self.next_edge_at += u64::from(SYNC2_PULSE);
            }
            State::Sync2 => {
                self.level = !self.level;
                on_edge(self.next_edge_at, self.level);
                let block = &self.blocks[self.block_idx];
                if block.len() <= 1 {
                    self.finish_block(on_edge);
                    return;
                }
                self.state = State::Bits { byte_idx: 1, bit_idx: 7, second_half: false };
                self.next_edge_at += u64::from(self.bit_pulse(1, 7));
            }
            State::Bits { byte_idx, bit_idx, second_half } => {
                self.level = !self.level;
                on_edge(self.next_edge_at, self.level);
                if !second_half {
                    self.state = State::Bits { byte_idx, bit_idx, second_half: true };
                    self.next_edge_at += u64::from(self.bit_pulse(byte_idx, bit_idx));
                } else if bit_idx == 0 {
                    let next_byte = byte_idx + 1;
                    if next_byte >= self.blocks[self.block_idx].len() {
                        self.finish_block(on_edge);
                    } else {
                        self.state = State::Bits { byte_idx: next_byte, bit_idx: 7, second_half: false };
                        self.next_edge_at += u64::from(self.bit_pulse(next_byte, 7));
                    }
                } else {
                    self.state = State::Bits { byte_idx, bit_idx: bit_idx - 1, second_half: false };
                    self.next_edge_at += u64::from(self.bit_pulse(byte_idx, bit_idx - 1));
                }
            }
            State::Pause => {
                self.state = State::NextBlock;
                self.block_idx += 1;
                // next_edge_at already points at the block start; NextBlock
                // step will add the first pilot pulse from here.
            }
            State::Done => {}
        }
    }

    fn bit_pulse(&self, byte_idx: usize, bit_idx: u8) -> u32 {
        let byte = self.blocks[self.block_idx][byte_idx];
        let bit = (byte >> bit_idx) & 1;
        if bit == 1 { ONE_PULSE } else { ZERO_PULSE }
    }

    fn finish_block(&mut self, on_edge: &mut impl FnMut(u64, bool)) {
        let _ = on_edge;
        let pause_tstates = u64::from(INTER_BLOCK_PAUSE_MS) * ULA_CLOCK / 1000;
        self.next_edge_at += pause_tstates;
        self.state = State::Pause;
    }

    #[must_use]
    pub fn frame_origin(&self) -> u64 {
        self.frame_origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tap::TapBlock;

    fn tap_with(flag: u8, data: &[u8]) -> TapFile {
        TapFile { blocks: vec![TapBlock { flag, data: data.to_vec() }] }
    }

    #[test]
    fn single_byte_data_block_emits_pilot_sync_and_bit_edges() {
        let tap = tap_with(0xFF, &[0x00]);
        let mut player = TapPlayer::new(&tap);
        player.play(0);

        let mut edges = Vec::new();
        player.begin_slice(0);
        player.end_slice(1_000_000, |t, level| edges.push((t, level)));

        // Pilot(3223) + sync1 + sync2 + 8 bits * 2 pulses = 3223 + 2 + 16 = 3241 edges.
        assert_eq!(edges.len(), 3223 + 2 + 16);
    }

    #[test]
    fn edges_are_strictly_increasing() {
        let tap = tap_with(0x00, &[1, 2, 3]);
        let mut player = TapPlayer::new(&tap);
        player.play(0);
        let mut edges = Vec::new();
        player.begin_slice(0);
        player.end_slice(2_000_000, |t, level| edges.push((t, level)));
        for w in edges.windows(2) {
            assert!(w[1].0 > w[0].0, "edge times must strictly increase");
        }
    }

    #[test]
    fn stepping_granularity_does_not_change_edge_schedule() {
        let tap = tap_with(0xFF, &[0xAA]);

        let mut one_shot = TapPlayer::new(&tap);
        one_shot.play(0);
        let mut big = Vec::new();
        one_shot.begin_slice(0);
        one_shot.end_slice(1_000_000, |t, l| big.push((t, l)));

        let mut stepped = TapPlayer::new(&tap);
        stepped.play(0);
        let mut small = Vec::new();
        let mut t = 0u64;
        while t < 1_000_000 {
            stepped.begin_slice(t);
            stepped.end_slice(1000, |et, l| small.push((et, l)));
            t += 1000;
        }

        assert_eq!(big, small);
    }

    #[test]
    fn becomes_inactive_once_all_blocks_drained() {
        let tap = tap_with(0x00, &[]);
        let mut player = TapPlayer::new(&tap);
        player.play(0);
        player.begin_slice(0);
        player.end_slice(50_000_000, |_, _| {});
        assert!(!player.active());
    }
}
