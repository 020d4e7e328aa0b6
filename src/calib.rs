//! Pitch calibration procedure (C1, spec section 4.6).
//!
//! A two-point linear fit between the pitch CV ADC code and volts, anchored
//! at 0V and 1V, driven interactively from the debug command channel.

use libm::{powf, roundf};

/// Samples accumulated per measurement state before advancing.
pub const SAMPLE_COUNT: u32 = 2000;
/// Concert pitch at the lowest calibrated octave, Hz.
const REFERENCE_HZ: f32 = 65.41;

/// Calibrated CV-to-pitch mapping, persisted via C2 (spec section 3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration
{
    /// Phase increment at the lowest calibrated octave, already scaled by
    /// `2048/sample_rate`.
    pub pitch_base: f32,
    /// Negative: higher ADC code maps to lower voltage, hence lower pitch.
    pub pitch_mult: f32,
    /// VCA calibration reading, raw ADC code.
    pub vca_normal: u16,
}

impl Calibration
{
    /// Default mapping derived from nominal electrical values, used until a
    /// calibration run overwrites it.
    pub const fn defaults(sample_rate: f32) -> Self
    {
        // Hardcoded initial constants (spec section 9, open question (a));
        // the calibrated values are canonical once a run has completed.
        Self { pitch_base: REFERENCE_HZ * (2048.0 / sample_rate), pitch_mult: -1.0 / 11090.0, vca_normal: 32768 }
    }
}

/// States of the interactive calibration flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State
{
    /// Not calibrating.
    Idle,
    /// Waiting for the user to apply 0V and confirm.
    Waiting0,
    /// Accumulating samples at 0V.
    Octave0,
    /// Waiting for the user to apply 1V and confirm.
    Waiting1,
    /// Accumulating samples at 1V.
    Octave1,
    /// Accumulation complete; waiting for the user to confirm the save.
    PendingSave,
}

/// Driver for the calibration state machine.
#[derive(Debug, Clone, Copy)]
pub struct Calib
{
    state: State,
    acc0: u64,
    acc1: u64,
    acc_vca: u64,
    count: u32,
    sample_rate: f32,
    /// Calibration currently in effect; only replaced on a completed save.
    pub current: Calibration,
}

impl Calib
{
    /// Creates a calibration driver seeded with the default mapping for
    /// `sample_rate`.
    pub const fn new(sample_rate: f32) -> Self
    {
        Self { state: State::Idle,
               acc0: 0,
               acc1: 0,
               acc_vca: 0,
               count: 0,
               sample_rate,
               current: Calibration::defaults(sample_rate) }
    }

    /// Current state, for UI display.
    pub fn state(&self) -> State
    {
        self.state
    }

    /// Feeds one command-channel character into the state machine (spec
    /// section 4.6). Returns `Some(Calibration)` the instant a save commits.
    pub fn handle_char(&mut self, c: char) -> Option<Calibration>
    {
        if c == 'x' {
            self.state = State::Idle;
            return None;
        }
        match (self.state, c) {
            (State::Idle, 's') => self.state = State::Waiting0,
            (State::Waiting0, 'y') => {
                self.acc0 = 0;
                self.acc_vca = 0;
                self.count = 0;
                self.state = State::Octave0;
            },
            (State::Waiting1, 'y') => {
                self.acc1 = 0;
                self.count = 0;
                self.state = State::Octave1;
            },
            (State::PendingSave, 'y') => {
                self.current = self.compute();
                self.state = State::Idle;
                return Some(self.current);
            },
            _ => {},
        }
        None
    }

    /// Feeds one sample tick's readings while a measurement state is active;
    /// a no-op outside [`State::Octave0`]/[`State::Octave1`].
    pub fn accumulate(&mut self, pitch_cv: u16, vca_cv: u16)
    {
        match self.state {
            State::Octave0 => {
                self.acc0 += pitch_cv as u64;
                self.acc_vca += vca_cv as u64;
                self.count += 1;
                if self.count >= SAMPLE_COUNT {
                    self.state = State::Waiting1;
                }
            },
            State::Octave1 => {
                self.acc1 += pitch_cv as u64;
                self.count += 1;
                if self.count >= SAMPLE_COUNT {
                    self.state = State::PendingSave;
                }
            },
            _ => {},
        }
    }

    /// Computes the final mapping from the two accumulated measurements
    /// (spec section 4.6).
    fn compute(&self) -> Calibration
    {
        let n = SAMPLE_COUNT as f32;
        let mean0 = self.acc0 as f32 / n;
        let mean1 = self.acc1 as f32 / n;
        let volt_spread = mean0 - mean1;
        let pitch_mult = -1.0 / volt_spread;
        let pitch_base = REFERENCE_HZ * (2048.0 / self.sample_rate) / powf(2.0, -(mean1 / volt_spread));
        let vca_normal = roundf(self.acc_vca as f32 / n) as u16;
        Calibration { pitch_base, pitch_mult, vca_normal }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn run_to_pending_save(cv0: u16, cv1: u16) -> Calib
    {
        let mut calib = Calib::new(48_000.0);
        calib.handle_char('s');
        calib.handle_char('y');
        for _ in 0 .. SAMPLE_COUNT {
            calib.accumulate(cv0, 1000);
        }
        calib.handle_char('y');
        for _ in 0 .. SAMPLE_COUNT {
            calib.accumulate(cv1, 1000);
        }
        calib
    }

    #[test]
    fn full_flow_reaches_pending_save_and_commits()
    {
        let mut calib = run_to_pending_save(61200, 50110);
        assert_eq!(calib.state(), State::PendingSave);
        let result = calib.handle_char('y');
        assert!(result.is_some());
        assert_eq!(calib.state(), State::Idle);
        let expected_mult = -1.0 / 11090.0;
        assert!((calib.current.pitch_mult - expected_mult).abs() / expected_mult.abs() < 0.01);
    }

    #[test]
    fn cancel_from_any_state_returns_to_idle_with_no_save()
    {
        let mut calib = run_to_pending_save(61200, 50110);
        let result = calib.handle_char('x');
        assert!(result.is_none());
        assert_eq!(calib.state(), State::Idle);
        assert_eq!(calib.current, Calibration::defaults(48_000.0));
    }

    #[test]
    fn recomputed_increment_at_one_volt_matches_reference_pitch()
    {
        // Per the section 4.6 formula, pitch_base is anchored so that
        // evaluating at the acc1 (1V) measurement reproduces the reference
        // pitch directly; the 0V point lands exactly one octave below it.
        let mut calib = run_to_pending_save(61200, 50110);
        calib.handle_char('y');
        let k1 = 50110.0;
        let inc_at_1v = calib.current.pitch_base * powf(2.0, k1 * calib.current.pitch_mult);
        let canonical = REFERENCE_HZ * (2048.0 / 48_000.0);
        assert!((inc_at_1v - canonical).abs() / canonical < 0.001);
    }
}
