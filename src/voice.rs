//! Voice engine (C5, spec section 4.1). The hard real-time core: one
//! [`VoiceEngine::tick`] call per audio frame, never allocating, never
//! blocking, producing two output samples.

use crate::additive::AdditiveOscillator;
use crate::calib::Calibration;
use crate::dsp::Hysteresis;
use crate::filter::{FilterLut, FilterRow, FRAME_LEN};
use crate::hal::AdcSnapshot;
use crate::warp::{self, WarpKind};

/// Pitch/position smoothing coefficient (spec section 4.1).
const SMOOTH_ALPHA: f32 = 0.01;
/// Below this fractional distance, frame crossfade and the exact-phase
/// resample path are used instead of their interpolated counterparts (spec
/// section 4.1, "ε").
const EPSILON: f32 = 1e-4;

/// Per-channel smoothed DSP state (spec section 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceState
{
    /// Smoothed phase increment, samples per tick.
    pub smoothed_pitch_inc: f32,
    /// Fractional phase within the current frame, `[0, FRAME_LEN)`.
    pub phase: f32,
    /// Smoothed wavetable position, `[0, F-1]`.
    pub smoothed_position: f32,
    /// This tick's output sample.
    pub output: f32,
    /// Previous tick's output sample, held over on a failure tick.
    pub prev_output: f32,
}

/// A wavetable's frames as the engine needs them: contiguous 32-bit float
/// samples, already decoded from whatever the file's byte depth was (spec
/// section 4.1, "interpreted as 32-bit float samples").
pub trait FrameSource
{
    /// Number of frames, `F` in spec section 3.
    fn frame_count(&self) -> u32;

    /// Borrows frame `index`, a slice of exactly [`FRAME_LEN`] samples.
    fn frame(&self, index: u32) -> &[f32];
}

/// Octave switch position (spec section 4.1, "Pitch conversion").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Octave
{
    /// Half the base increment.
    Down,
    /// The base increment.
    Normal,
    /// Twice the base increment.
    Up,
}

impl Octave
{
    fn multiplier(self) -> f32
    {
        match self {
            Octave::Down => 0.5,
            Octave::Normal => 1.0,
            Octave::Up => 2.0,
        }
    }
}

/// Front-panel and persisted flags that gate the post-mix and channel B
/// source (spec sections 4.1 and 4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceControls
{
    /// Channel B reads its own wavetable (stepped mode) instead of running
    /// the additive oscillator.
    pub stepped_mode: bool,
    /// Channel B's increment is halved relative to Channel A's.
    pub octave_down_b: bool,
    /// `B ← tanh_approx(A + B)`.
    pub mix_active: bool,
    /// `B ← A · B`.
    pub ring_mod_active: bool,
}

/// Drives both channels' DSP for one sample tick.
pub struct VoiceEngine
{
    pub a: VoiceState,
    pub b: VoiceState,
    warp_kind: Hysteresis<u8>,
    additive: AdditiveOscillator,
}

impl VoiceEngine
{
    /// Creates an engine with both channels at rest.
    pub fn new() -> Self
    {
        Self { a: VoiceState::default(), b: VoiceState::default(), warp_kind: Hysteresis::new(0, 1), additive: AdditiveOscillator::new() }
    }

    /// Grants access to the additive oscillator, e.g. to apply an `add:`
    /// bank selector.
    pub fn additive_mut(&mut self) -> &mut AdditiveOscillator
    {
        &mut self.additive
    }

    /// Runs one sample tick (spec section 4.1). `wavetable` backs Channel A
    /// always, and Channel B too when `controls.stepped_mode` is set.
    /// `storage_busy` implements the failure semantics: while the active
    /// wavetable is file-backed and storage is busy, the previous output is
    /// held and the tick otherwise skipped.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(&mut self, adc: &AdcSnapshot, calib: &Calibration, filter: &FilterLut, wavetable: &dyn FrameSource, octave: Octave, warp_amount_raw: f32, controls: VoiceControls, storage_busy: bool, file_backed: bool) -> (f32, f32)
    {
        if storage_busy && file_backed {
            return (self.a.prev_output, self.b.prev_output);
        }

        let new_inc_a = calib.pitch_base * libm::powf(2.0, adc.pitch_cv as f32 * calib.pitch_mult) * octave.multiplier();
        self.a.smoothed_pitch_inc = (1.0 - SMOOTH_ALPHA) * self.a.smoothed_pitch_inc + SMOOTH_ALPHA * new_inc_a;
        let b_mul = if controls.octave_down_b { 0.5 } else { 1.0 };
        self.b.smoothed_pitch_inc = self.a.smoothed_pitch_inc * b_mul;

        advance_phase(&mut self.a.phase, self.a.smoothed_pitch_inc);
        advance_phase(&mut self.b.phase, self.b.smoothed_pitch_inc);

        let frame_count = wavetable.frame_count().max(1);
        let position_a = normalized_position(adc.position_a_pot, adc.position_a_cv) * (frame_count - 1) as f32;
        self.a.smoothed_position = (1.0 - SMOOTH_ALPHA) * self.a.smoothed_position + SMOOTH_ALPHA * position_a;

        let warp_kind = decode_warp_kind(self.warp_kind.update(quantize_warp(adc.warp_type)));
        let warp_amount = warp::pivot_amount(warp_amount_raw);
        let warped = warp::apply(warp_kind, self.a.phase, warp_amount, self.b.output);
        let row = filter.row_for(self.a.smoothed_pitch_inc * warped.inc_scale);

        let out_a = crossfaded_resample(wavetable, self.a.smoothed_position, warped.phase, row);
        self.a.prev_output = self.a.output;
        self.a.output = out_a;

        let mut out_b = if controls.stepped_mode {
            let position_b = normalized_position(adc.position_b_pot, adc.position_b_cv) * (frame_count - 1) as f32;
            self.b.smoothed_position = (1.0 - SMOOTH_ALPHA) * self.b.smoothed_position + SMOOTH_ALPHA * position_b;
            let row_b = filter.row_for(self.b.smoothed_pitch_inc);
            crossfaded_resample(wavetable, self.b.smoothed_position, self.b.phase, row_b)
        } else {
            self.additive.tick(self.b.phase, 0, 1, 0.0)
        };

        if controls.mix_active {
            out_b = tanh_approx(out_a + out_b);
        } else if controls.ring_mod_active {
            out_b = out_a * out_b;
        }

        self.b.prev_output = self.b.output;
        self.b.output = out_b;
        (out_a, out_b)
    }
}

impl Default for VoiceEngine
{
    fn default() -> Self
    {
        Self::new()
    }
}

/// `phase ← phase + inc`, wrapped into `[0, FRAME_LEN)` (spec section 4.1,
/// "Phase advance").
fn advance_phase(phase: &mut f32, inc: f32)
{
    *phase += inc;
    if *phase >= FRAME_LEN as f32 {
        *phase -= FRAME_LEN as f32;
    }
}

/// Combines a pot and CV reading into a normalized `[0,1]` position.
fn normalized_position(pot: u16, cv: u16) -> f32
{
    let combined = (pot as u32 + cv as u32).min(u16::MAX as u32) as f32 / u16::MAX as f32;
    combined.clamp(0.0, 1.0)
}

/// Maps the raw warp-type pot onto one of the six discrete kinds before it
/// reaches the hysteresis gate.
fn quantize_warp(raw: u16) -> u8
{
    ((raw as u32 * 6) / (u16::MAX as u32 + 1)) as u8
}

fn decode_warp_kind(code: u8) -> WarpKind
{
    match code {
        0 => WarpKind::None,
        1 => WarpKind::Bend,
        2 => WarpKind::Squeeze,
        3 => WarpKind::Mirror,
        4 => WarpKind::Reverse,
        _ => WarpKind::Tzfm,
    }
}

/// Folded-FIR interpolated resample at integer+fractional `phase` within
/// `frame` using LUT row `row` (spec section 4.1, "Anti-aliased resample").
pub fn resample(frame: &[f32], phase: f32, row: &FilterRow) -> f32
{
    let len = FRAME_LEN as i32;
    let n = libm::floorf(phase) as i32;
    let r = phase - n as f32;
    let taps = row.coeff.len();
    let half = taps - 1; // T/2 in spec notation, taps here is (T+1)/2
    let at = |offset: i32| -> f32 { frame[(offset.rem_euclid(len)) as usize] };

    if r < EPSILON {
        let mut acc = 0.0;
        for i in 0 .. half {
            acc += row.coeff[i] * (at(n - 2 * half as i32 + i as i32) + at(n - i as i32));
        }
        acc + row.coeff[half] * at(n - half as i32)
    } else {
        let u = 1.0 / r - 1.0;
        let mut acc = 0.0;
        for i in 0 .. half {
            let left = n - 2 * half as i32 + i as i32;
            let right = n - i as i32;
            acc += row.coeff[i] * (u * (at(left) + at(right)) + at(left + 1) + at(right + 1));
        }
        let center = n - half as i32;
        acc += row.coeff[half] * (u * at(center) + at(center + 1));
        acc * r
    }
}

/// Resamples frame `fi` and, when the fractional position warrants it,
/// crossfades with frame `fi+1` (spec section 4.1, "Frame cross-fade").
fn crossfaded_resample(wavetable: &dyn FrameSource, position: f32, phase: f32, row: &FilterRow) -> f32
{
    let fi = libm::floorf(position) as u32;
    let fr = position - fi as f32;
    let frame_count = wavetable.frame_count().max(1);
    let fi = fi.min(frame_count - 1);
    let out_fi = resample(wavetable.frame(fi), phase, row);
    if fr > EPSILON && fi + 1 < frame_count {
        let out_next = resample(wavetable.frame(fi + 1), phase, row);
        (1.0 - fr) * out_fi + fr * out_next
    } else {
        out_fi
    }
}

/// Lambert's continued-fraction rational tanh approximation (spec section
/// 4.1, "Post-mix"): 7-term numerator/denominator, smooth and branch-free.
fn tanh_approx(x: f32) -> f32
{
    let x2 = x * x;
    let num = x * (135135.0 + x2 * (17325.0 + x2 * (378.0 + x2)));
    let den = 135135.0 + x2 * (62370.0 + x2 * (3150.0 + x2 * 28.0));
    (num / den).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::filter::FilterLut;

    struct SineFrame(
        [f32; FRAME_LEN],
    );

    impl FrameSource for SineFrame
    {
        fn frame_count(&self) -> u32
        {
            1
        }

        fn frame(&self, _index: u32) -> &[f32]
        {
            &self.0
        }
    }

    fn sine_frame() -> SineFrame
    {
        let mut samples = [0.0_f32; FRAME_LEN];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = libm::sinf(2.0 * core::f32::consts::PI * i as f32 / FRAME_LEN as f32);
        }
        SineFrame(samples)
    }

    #[test]
    fn resample_paths_agree_in_the_limit()
    {
        let lut = FilterLut::build();
        let row = lut.row(0);
        let frame = sine_frame();
        let near_int = 512.0 + 1e-6;
        let at_int = resample(&frame.0, 512.0, row);
        let near = resample(&frame.0, near_int, row);
        assert!((at_int - near).abs() < 1e-2);
    }

    #[test]
    fn straight_sine_round_trips_through_crossfade_unchanged()
    {
        let lut = FilterLut::build();
        let row = lut.row(0);
        let frame = sine_frame();
        let direct = resample(&frame.0, 200.0, row);
        let via_crossfade = crossfaded_resample(&frame, 0.0, 200.0, row);
        assert!((direct - via_crossfade).abs() < 1e-5);
    }

    #[test]
    fn tanh_approx_saturates_for_large_input()
    {
        assert!(tanh_approx(10.0) <= 1.0);
        assert!(tanh_approx(-10.0) >= -1.0);
        assert!(tanh_approx(0.0).abs() < 1e-6);
    }

    #[test]
    fn phase_advance_wraps_at_frame_length()
    {
        let mut phase = FRAME_LEN as f32 - 1.0;
        advance_phase(&mut phase, 5.0);
        assert!((phase - 4.0).abs() < 1e-4);
    }
}
