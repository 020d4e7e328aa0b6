//! Sample clock driver (C8, spec section 4.7). Owns the audio interrupt and
//! fires the voice engine once per audio frame, rejecting FIFO underruns and
//! the spurious early re-entries some audio peripherals are prone to.

/// Outcome of one ISR entry, replacing the free-returns the teacher's own
/// interrupt handlers tend to use (spec section 9, "Exception-like control
/// flow").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome
{
    /// The voice engine ran and produced a sample pair.
    Ticked,
    /// The audio FIFO had underrun; nothing was produced this entry.
    Underrun,
    /// This entry arrived suspiciously early and was ignored.
    Spurious,
}

/// Tracks the last real ISR entry so spurious early re-entries can be
/// rejected by elapsed wall-clock time rather than trusting the peripheral.
pub struct SampleClock
{
    /// Nominal ticks between samples at the configured sample rate.
    period_ticks: u64,
    /// Free-running timer value at the last accepted entry.
    last_entry_ticks: u64,
    /// Diagnostic counter of rejected spurious entries.
    spurious_count: u32,
    /// Diagnostic counter of FIFO underruns.
    underrun_count: u32,
}

/// An entry arriving before this fraction of the nominal period has elapsed
/// is treated as spurious (spec section 4.7).
const EARLY_FRACTION: f64 = 0.95;

impl SampleClock
{
    /// Creates a clock ticking every `period_ticks` of the free-running
    /// timer.
    pub fn new(period_ticks: u64) -> Self
    {
        Self { period_ticks, last_entry_ticks: 0, spurious_count: 0, underrun_count: 0 }
    }

    /// Diagnostic counters, surfaced by the CLI.
    pub fn diagnostics(&self) -> (u32, u32)
    {
        (self.spurious_count, self.underrun_count)
    }

    /// Evaluates one ISR entry at free-running timer value `now_ticks`,
    /// given whether the output FIFO had underrun. The caller runs the
    /// voice engine itself only when this returns [`TickOutcome::Ticked`].
    pub fn enter(&mut self, now_ticks: u64, fifo_underrun: bool) -> TickOutcome
    {
        let elapsed = now_ticks.wrapping_sub(self.last_entry_ticks);
        let threshold = (self.period_ticks as f64 * EARLY_FRACTION) as u64;
        if self.last_entry_ticks != 0 && elapsed < threshold {
            self.spurious_count += 1;
            return TickOutcome::Spurious;
        }
        self.last_entry_ticks = now_ticks;
        if fifo_underrun {
            self.underrun_count += 1;
            return TickOutcome::Underrun;
        }
        TickOutcome::Ticked
    }

    /// Scales a DSP sample in `[-1,1]` to the ±2^31 integer range the audio
    /// link expects (spec section 4.7).
    pub fn scale_sample(sample: f32) -> i32
    {
        let clamped = sample.clamp(-1.0, 1.0);
        (clamped * i32::MAX as f32) as i32
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn first_entry_is_never_spurious()
    {
        let mut clock = SampleClock::new(1000);
        assert_eq!(clock.enter(0, false), TickOutcome::Ticked);
    }

    #[test]
    fn early_re_entry_is_rejected()
    {
        let mut clock = SampleClock::new(1000);
        clock.enter(0, false);
        assert_eq!(clock.enter(100, false), TickOutcome::Spurious);
    }

    #[test]
    fn entry_at_full_period_ticks()
    {
        let mut clock = SampleClock::new(1000);
        clock.enter(0, false);
        assert_eq!(clock.enter(1000, false), TickOutcome::Ticked);
    }

    #[test]
    fn underrun_is_reported_but_still_advances_the_clock()
    {
        let mut clock = SampleClock::new(1000);
        clock.enter(0, false);
        assert_eq!(clock.enter(1000, true), TickOutcome::Underrun);
        assert_eq!(clock.diagnostics().1, 1);
    }

    #[test]
    fn sample_scaling_stays_within_i32_range()
    {
        assert_eq!(SampleClock::scale_sample(2.0), i32::MAX);
        assert!(SampleClock::scale_sample(-2.0) < 0);
    }
}
