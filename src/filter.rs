//! Anti-alias filter LUT (C4, spec section 4.2).
//!
//! A folded-FIR, Kaiser-windowed sinc kernel is precomputed once at boot for
//! a range of cutoff frequencies spanning [`SPAN_OCTAVES`] octaves of phase
//! increment. The voice engine looks a row up by `log2(phase_inc)` on every
//! sample; nothing here runs per-sample.

use libm::{log2f, powf, sinf};

/// FIR tap count. Odd, so the kernel has a single center tap.
pub const TAPS: usize = 31;
/// Number of coefficients stored per row after folding the symmetric kernel.
pub const FOLDED: usize = (TAPS + 1) / 2;
/// Number of precomputed cutoff rows.
pub const ROWS: usize = 90;
/// Octave span covered by the LUT, `R` in spec section 3.
pub const SPAN_OCTAVES: f32 = 7.0;
/// Kaiser window shape parameter.
const BETA: f32 = 4.0;
/// Frame length every wavetable entry is built from; resample indices wrap
/// modulo this.
pub const FRAME_LEN: usize = 2048;

/// One row of the folded-FIR LUT.
#[derive(Debug, Clone, Copy)]
pub struct FilterRow
{
    /// `log2` of the phase increment this row was built for.
    pub log_inc: f32,
    /// The phase increment itself, `2^log_inc`.
    pub inc: f32,
    /// Folded coefficients, `coeff[0..TAPS/2]` plus the center tap at
    /// `coeff[FOLDED-1]`.
    pub coeff: [f32; FOLDED],
}

/// The full precomputed table.
#[derive(Debug, Clone)]
pub struct FilterLut
{
    rows: [FilterRow; ROWS],
}

impl FilterLut
{
    /// Builds the table. Run once at boot; the result is read-only
    /// thereafter, so a caller typically stores it behind a
    /// [`Lazy`](crate::sync::Lazy).
    pub fn build() -> Self
    {
        let mut rows = [FilterRow { log_inc: 0.0, inc: 1.0, coeff: [0.0; FOLDED] }; ROWS];
        for (k, row) in rows.iter_mut().enumerate() {
            let log_inc = k as f32 * SPAN_OCTAVES / ROWS as f32;
            let inc = powf(2.0, log_inc);
            let cutoff = 1.0 / inc;
            let mut coeff = [0.0_f32; FOLDED];
            for (j, c) in coeff.iter_mut().enumerate() {
                let n = j as f32 - (TAPS as f32 - 1.0) / 2.0;
                *c = cutoff * sinc(cutoff * n * core::f32::consts::PI) * kaiser_window(j, TAPS, BETA);
            }
            *row = FilterRow { log_inc, inc, coeff };
        }
        Self { rows }
    }

    /// Looks up the row nearest a given phase increment, clamped to the
    /// covered span (spec section 4.2).
    pub fn row_for(&self, pitch_inc: f32) -> &FilterRow
    {
        let idx = libm::roundf(log2f(pitch_inc) * ROWS as f32 / SPAN_OCTAVES);
        let idx = if idx < 0.0 {
            0
        } else if idx as usize >= ROWS {
            ROWS - 1
        } else {
            idx as usize
        };
        &self.rows[idx]
    }

    /// Row 0, the full-bandwidth kernel used by testable-property checks.
    pub fn row(&self, index: usize) -> &FilterRow
    {
        &self.rows[index]
    }
}

/// Normalized sinc, `sin(x)/x`, with the removable singularity at 0 filled
/// in as 1.
fn sinc(x: f32) -> f32
{
    if libm::fabsf(x) < 1e-7 {
        1.0
    } else {
        sinf(x) / x
    }
}

/// Kaiser window value at tap `j` of `taps`, shape `beta`.
fn kaiser_window(j: usize, taps: usize, beta: f32) -> f32
{
    let m = (taps - 1) as f32;
    let r = (2.0 * j as f32 / m) - 1.0;
    let arg = beta * libm::sqrtf(1.0 - r * r);
    bessel_i0(arg) / bessel_i0(beta)
}

/// Modified Bessel function of the first kind, order 0, via the standard
/// power series. Converges in under twenty terms for the arguments the
/// Kaiser window produces here (|x| < ~10).
fn bessel_i0(x: f32) -> f32
{
    let mut term = 1.0_f32;
    let mut sum = 1.0_f32;
    let half_x_sq = (x / 2.0) * (x / 2.0);
    for k in 1 .. 25 {
        term *= half_x_sq / (k as f32 * k as f32);
        sum += term;
        if term < sum * 1e-8 {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn row_index_stays_in_bounds_across_the_span()
    {
        let lut = FilterLut::build();
        for k in 0 .. 200 {
            let inc = powf(2.0, k as f32 * SPAN_OCTAVES / 40.0 - 1.0);
            let row = lut.row_for(inc);
            assert!(row.coeff.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn row_zero_is_full_bandwidth()
    {
        let lut = FilterLut::build();
        let row = lut.row(0);
        assert!((row.inc - 1.0).abs() < 1e-3);
        // the center tap of a near-Nyquist sinc kernel dominates
        assert!(row.coeff[FOLDED - 1] > row.coeff[0]);
    }

    #[test]
    fn coefficients_are_always_finite()
    {
        let lut = FilterLut::build();
        for row in lut.rows.iter() {
            assert!(row.coeff.iter().all(|c| c.is_finite()));
        }
    }
}
