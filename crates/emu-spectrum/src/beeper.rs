//! Beeper: mixes EAR/MIC output, tape EAR input, and AY samples into a
//! mono S16 stream at host sample rate.
//!
//! The machine clock used for the sample-rate ratio is 3,546,900 Hz (the
//! nominal Spectrum ULA clock), not the raw 3.5 MHz CPU clock, matching the
//! rate real hardware and most emulators derive audio timing from.

#![allow(clippy::cast_possible_truncation)]

use gi_ay_3_8910::Ay3_8910;

const ULA_CLOCK: u64 = 3_546_900;

const SPEAKER_AMPLITUDE: i32 = 10_000;
const TAPE_AMPLITUDE: i32 = 8_000;
const AY_AMPLITUDE: f32 = 6_000.0;

/// Mono beeper + tape + AY audio mixer.
pub struct BeeperState {
    sample_rate: u32,
    frame_origin: u64,
    slice_origin: u64,
    last_tstate: u64,
    frac_acc: u64,

    /// Speaker level (port 0xFE bits 3|4 OR'd together).
    speaker: bool,
    /// Whether a tape player is currently driving the EAR input.
    tape_active: bool,
    /// Current tape EAR input level.
    tape_level: bool,

    samples: Vec<i16>,
}

impl BeeperState {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frame_origin: 0,
            slice_origin: 0,
            last_tstate: 0,
            frac_acc: 0,
            speaker: false,
            tape_active: false,
            tape_level: false,
            samples: Vec::new(),
        }
    }

    /// Record the slice origin. Does not advance any clock.
    pub fn begin_slice(&mut self, origin: u64) {
        self.slice_origin = origin;
    }

    /// Flush audio to the end of the current slice.
    pub fn end_slice(&mut self, cpu_tstates: u32, ay: Option<&mut Ay3_8910>) {
        let t_now = self.slice_origin + u64::from(cpu_tstates);
        self.advance_to(t_now, ay);
        self.frame_origin = t_now;
    }

    /// Set the speaker (EAR/MIC output) level. Caller must call
    /// [`Self::advance_to`] first so the prior level is committed to every
    /// sample it covered.
    pub fn set_speaker_level(&mut self, on: bool) {
        self.speaker = on;
    }

    /// Set the tape EAR input state. `active` is false when no tape player
    /// is driving the input (TAP/TZX idle); `level` is the current EAR bit
    /// while active.
    pub fn set_tape_input(&mut self, active: bool, level: bool) {
        self.tape_active = active;
        self.tape_level = level;
    }

    /// Advance the mix to absolute T-state `t_now`, stepping the AY once
    /// per emitted sample when present.
    pub fn advance_to(&mut self, t_now: u64, mut ay: Option<&mut Ay3_8910>) {
        if t_now <= self.last_tstate {
            return;
        }
        let delta = t_now - self.last_tstate;
        self.last_tstate = t_now;

        let scaled = self.frac_acc + delta * u64::from(self.sample_rate);
        let count = scaled / ULA_CLOCK;
        self.frac_acc = scaled % ULA_CLOCK;

        for _ in 0..count {
            let mut level: i32 = 0;
            if self.speaker {
                level += SPEAKER_AMPLITUDE;
            }
            if self.tape_active && self.tape_level {
                level += TAPE_AMPLITUDE;
            }
            if let Some(ay) = ay.as_deref_mut() {
                ay.tick();
                if let Some(&[l, r]) = ay.take_buffer().last() {
                    level += (((l + r) * 0.5) * AY_AMPLITUDE) as i32;
                }
            }
            self.samples.push(level.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16);
        }
    }

    /// Drain and return accumulated samples.
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    #[must_use]
    pub fn last_tstate(&self) -> u64 {
        self.last_tstate
    }

    #[must_use]
    pub fn frame_origin(&self) -> u64 {
        self.frame_origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_produces_zero_samples() {
        let mut beeper = BeeperState::new(44_100);
        beeper.begin_slice(0);
        beeper.advance_to(ULA_CLOCK, None);
        let samples = beeper.take_samples();
        assert_eq!(samples.len(), 44_100);
        assert!(samples.iter().all(|&s| s == 0));
    }

    #[test]
    fn speaker_high_produces_positive_samples() {
        let mut beeper = BeeperState::new(44_100);
        beeper.begin_slice(0);
        beeper.set_speaker_level(true);
        beeper.advance_to(ULA_CLOCK / 2, None);
        let samples = beeper.take_samples();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|&s| s > 0));
    }

    #[test]
    fn last_tstate_is_monotonic() {
        let mut beeper = BeeperState::new(44_100);
        let mut t = 0u64;
        for _ in 0..10 {
            beeper.begin_slice(t);
            beeper.end_slice(224, None);
            assert!(beeper.last_tstate() >= t);
            t += 224;
        }
    }

    #[test]
    fn frac_acc_carries_across_calls_without_drift() {
        // Advancing in many tiny steps must not lose or gain samples versus
        // one big step, since frac_acc accumulates the remainder exactly.
        let mut a = BeeperState::new(44_100);
        a.begin_slice(0);
        a.advance_to(70_000, None);
        let total_a = a.take_samples().len();

        let mut b = BeeperState::new(44_100);
        b.begin_slice(0);
        for t in (1..=70_000u64).step_by(7) {
            b.advance_to(t, None);
        }
        b.advance_to(70_000, None);
        let total_b = b.take_samples().len();

        assert_eq!(total_a, total_b);
    }
}
