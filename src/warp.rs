//! Warp functions (C7, spec section 4.1 "Warp" and section 8 invariants).
//!
//! Each kind reshapes Channel A's phase before resampling. All six are pure
//! functions of `(phase, amount, b_output)`: no warp keeps state of its own,
//! so the hysteresis gate that picks which kind is active lives with the
//! caller ([`crate::dsp::Hysteresis`]), not here.

use libm::sinf;

use crate::filter::FRAME_LEN;

/// Selects which reshape function [`apply`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpKind
{
    /// Identity.
    None,
    /// Piecewise-linear bend around a pivot point.
    Bend,
    /// Sinusoidal squeeze toward or away from the center.
    Squeeze,
    /// Four-piece reflected triangle.
    Mirror,
    /// Read the frame backward.
    Reverse,
    /// Through-zero FM from Channel B's last output.
    Tzfm,
}

/// Result of applying a warp: the reshaped phase plus the filter-increment
/// scale factor that should be applied before the LUT lookup (spec section 9,
/// open question (c)).
#[derive(Debug, Clone, Copy)]
pub struct WarpResult
{
    /// Reshaped phase, always in `[0, FRAME_LEN)`.
    pub phase: f32,
    /// Multiplier applied to the phase increment before indexing the filter
    /// LUT, so non-identity warps that locally compress the read index stay
    /// band-limited.
    pub inc_scale: f32,
}

const LEN: f32 = FRAME_LEN as f32;

/// Applies `kind` to `phase`, given warp `amount ∈ [0,1]` (already rescaled
/// by the caller from the raw pot/CV) and the other channel's last output
/// `b_output` (only used by [`WarpKind::Tzfm`]).
pub fn apply(kind: WarpKind, phase: f32, amount: f32, b_output: f32) -> WarpResult
{
    match kind {
        WarpKind::None => WarpResult { phase, inc_scale: 1.0 },
        WarpKind::Bend => bend(phase, amount),
        WarpKind::Squeeze => squeeze(phase, amount),
        WarpKind::Mirror => mirror(phase, amount),
        WarpKind::Reverse => reverse(phase),
        WarpKind::Tzfm => tzfm(phase, amount, b_output),
    }
}

/// Maps a raw `[0,1]` warp-amount reading onto the Bend/Mirror pivot range
/// `[0.1, 1.9]` used throughout spec section 4.1.
pub fn pivot_amount(raw: f32) -> f32
{
    0.1 + raw.clamp(0.0, 1.0) * 1.8
}

fn bend(phase: f32, a: f32) -> WarpResult
{
    let p = phase / LEN;
    let (pp, scale) = if p < a / 2.0 { (p / a, 1.0 / a) } else { ((p + 1.0 - a) / (2.0 - a), 1.0 / (2.0 - a)) };
    WarpResult { phase: pp * LEN, inc_scale: scale }
}

fn squeeze(phase: f32, amount: f32) -> WarpResult
{
    let p = phase / LEN;
    // amount ∈ [0,1]; midpoint 0.5 is neutral, sign flips about it, and the
    // distortion is scaled so that at the extremes the reshaped phase still
    // lands in-range once wrapped.
    let k = (amount - 0.5) * 2.0 * 0.25;
    let mut pp = p + k * sinf(2.0 * core::f32::consts::PI * p);
    if pp < 0.0 {
        pp += 1.0;
    } else if pp >= 1.0 {
        pp -= 1.0;
    }
    WarpResult { phase: pp * LEN, inc_scale: 1.0 }
}

fn mirror(phase: f32, a: f32) -> WarpResult
{
    // a = 1 is the neutral value: the four breakpoints below collapse onto
    // the domain edges and the fold never triggers, so it is special-cased
    // both for exactness and to avoid the 1/(1-a) singularity.
    if (a - 1.0).abs() < 1e-6 {
        return WarpResult { phase, inc_scale: 1.0 };
    }
    let p = phase / LEN;
    let half = a / 2.0;
    let pp = if p < half {
        p / a
    } else if p < 0.5 {
        half / a + (p - half) / (1.0 - a)
    } else if p < 1.0 - half {
        half / a + (1.0 - half - p) / (1.0 - a)
    } else {
        (1.0 - p) / a
    };
    WarpResult { phase: pp.clamp(0.0, 1.0) * LEN, inc_scale: 1.0 / (1.0 - a) }
}

fn reverse(phase: f32) -> WarpResult
{
    let reflected = LEN - phase;
    let wrapped = if reflected >= LEN { reflected - LEN } else { reflected };
    WarpResult { phase: wrapped, inc_scale: 1.0 }
}

fn tzfm(phase: f32, amount: f32, b_output: f32) -> WarpResult
{
    let mut adjusted = phase + b_output * amount;
    while adjusted < 0.0 {
        adjusted += LEN;
    }
    while adjusted >= LEN {
        adjusted -= LEN;
    }
    WarpResult { phase: adjusted, inc_scale: 1.0 }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn all_kinds() -> [WarpKind; 6]
    {
        [WarpKind::None, WarpKind::Bend, WarpKind::Squeeze, WarpKind::Mirror, WarpKind::Reverse, WarpKind::Tzfm]
    }

    #[test]
    fn output_phase_always_in_range()
    {
        for kind in all_kinds() {
            let mut p = 0.0;
            while p < LEN {
                let r = apply(kind, p, 0.73, 512.0);
                assert!(r.phase >= 0.0 && r.phase < LEN, "{:?} produced {} for phase {}", kind, r.phase, p);
                p += 17.0;
            }
        }
    }

    #[test]
    fn none_is_identity()
    {
        let r = apply(WarpKind::None, 1234.5, 0.5, 0.0);
        assert_eq!(r.phase, 1234.5);
    }

    #[test]
    fn bend_is_identity_at_neutral_amount()
    {
        // a = 1 collapses both pieces of Bend back to p' = p.
        let mut p = 0.0;
        while p < LEN {
            let r = bend(p, 1.0);
            assert!((r.phase - p).abs() < 1e-2);
            p += 31.0;
        }
    }

    #[test]
    fn mirror_is_identity_at_neutral_amount()
    {
        let mut p = 0.0;
        while p < LEN {
            let r = mirror(p, 1.0);
            assert_eq!(r.phase, p);
            p += 37.0;
        }
    }

    #[test]
    fn squeeze_is_identity_at_neutral_amount()
    {
        let mut p = 0.0;
        while p < LEN {
            let r = apply(WarpKind::Squeeze, p, 0.5, 0.0);
            assert!((r.phase - p).abs() < 1e-3);
            p += 29.0;
        }
    }

    #[test]
    fn bend_is_continuous_at_its_join()
    {
        let a = 0.6;
        let join = a / 2.0 * LEN;
        let left = bend(join - 0.01, a).phase;
        let right = bend(join + 0.01, a).phase;
        assert!((left - right).abs() < 0.1);
    }

    #[test]
    fn mirror_is_continuous_at_its_joins()
    {
        let a = 0.4;
        for join in [a / 2.0 * LEN, 0.5 * LEN, (1.0 - a / 2.0) * LEN] {
            let left = mirror(join - 0.01, a).phase;
            let right = mirror(join + 0.01, a).phase;
            assert!((left - right).abs() < 0.5, "discontinuity at {join}: {left} vs {right}");
        }
    }

    #[test]
    fn reverse_twice_is_identity()
    {
        let mut p = 0.0;
        while p < LEN {
            let once = reverse(p).phase;
            let twice = reverse(once).phase;
            assert!((twice - p).abs() < 1e-3);
            p += 23.0;
        }
    }
}
