//! Control surface (C10, spec section 4.8 external interfaces / section 6).
//! Debounces the three front-panel buttons and resolves quadrature encoder
//! counts into detents; analog mode switches are debounced with the same
//! [`crate::dsp::Hysteresis`] gate the voice engine uses for warp selection.

use crate::hal::{ButtonEdge, ButtonId, EncoderStep};

/// Minimum time a button reading must be stable before an edge is reported
/// (spec section 6, "100 ms debounce").
pub const DEBOUNCE_MS: u64 = 100;
/// Quadrature counts per detent (spec section 6).
pub const COUNTS_PER_DETENT: i32 = 4;
/// Encoder raw count center point; counts are biased here to allow negative
/// relative motion without wrapping a small unsigned counter.
pub const ENCODER_MIDPOINT: u16 = 32000;

/// Debounces one active-low button input.
#[derive(Debug, Clone, Copy)]
struct Debouncer
{
    stable_pressed: bool,
    candidate_pressed: bool,
    candidate_since_ms: u64,
}

impl Debouncer
{
    const fn new() -> Self
    {
        Self { stable_pressed: false, candidate_pressed: false, candidate_since_ms: 0 }
    }

    /// Feeds a raw active-low reading; returns `true` once the new state has
    /// been stable for [`DEBOUNCE_MS`].
    fn update(&mut self, raw_pressed: bool, now_ms: u64) -> Option<bool>
    {
        if raw_pressed != self.candidate_pressed {
            self.candidate_pressed = raw_pressed;
            self.candidate_since_ms = now_ms;
            return None;
        }
        if self.candidate_pressed != self.stable_pressed && now_ms.saturating_sub(self.candidate_since_ms) >= DEBOUNCE_MS {
            self.stable_pressed = self.candidate_pressed;
            return Some(self.stable_pressed);
        }
        None
    }
}

/// Debounces the encoder press, octave switch and warp-cycle buttons, and
/// resolves encoder quadrature counts into detents.
pub struct ControlSurface
{
    encoder_press: Debouncer,
    octave_button: Debouncer,
    warp_button: Debouncer,
    last_encoder_count: u16,
}

impl ControlSurface
{
    /// A control surface with every button released and the encoder at its
    /// midpoint.
    pub fn new() -> Self
    {
        Self { encoder_press: Debouncer::new(), octave_button: Debouncer::new(), warp_button: Debouncer::new(), last_encoder_count: ENCODER_MIDPOINT }
    }

    /// Feeds one poll of the three raw active-low button lines, returning
    /// any edges that just became stable.
    pub fn poll_buttons(&mut self, encoder_raw: bool, octave_raw: bool, warp_raw: bool, now_ms: u64) -> heapless::Vec<ButtonEdge, 3>
    {
        let mut edges = heapless::Vec::new();
        if let Some(pressed) = self.encoder_press.update(encoder_raw, now_ms) {
            let _ = edges.push(ButtonEdge { button: ButtonId::Encoder, pressed });
        }
        if let Some(pressed) = self.octave_button.update(octave_raw, now_ms) {
            let _ = edges.push(ButtonEdge { button: ButtonId::Octave, pressed });
        }
        if let Some(pressed) = self.warp_button.update(warp_raw, now_ms) {
            let _ = edges.push(ButtonEdge { button: ButtonId::Warp, pressed });
        }
        edges
    }

    /// Resolves a new raw quadrature count into zero or more detent steps.
    pub fn poll_encoder(&mut self, raw_count: u16) -> heapless::Vec<EncoderStep, 4>
    {
        let mut steps = heapless::Vec::new();
        let delta = raw_count as i32 - self.last_encoder_count as i32;
        let detents = delta / COUNTS_PER_DETENT;
        for _ in 0 .. detents.unsigned_abs() {
            let step = if detents > 0 { EncoderStep::Clockwise } else { EncoderStep::CounterClockwise };
            let _ = steps.push(step);
        }
        self.last_encoder_count = self.last_encoder_count.wrapping_add((detents * COUNTS_PER_DETENT) as u16);
        steps
    }
}

impl Default for ControlSurface
{
    fn default() -> Self
    {
        Self::new()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn button_press_requires_stable_debounce_window()
    {
        let mut debouncer = Debouncer::new();
        assert_eq!(debouncer.update(true, 0), None);
        assert_eq!(debouncer.update(true, 50), None);
        assert_eq!(debouncer.update(true, 120), Some(true));
    }

    #[test]
    fn bouncing_input_resets_the_debounce_window()
    {
        let mut debouncer = Debouncer::new();
        debouncer.update(true, 0);
        debouncer.update(false, 10);
        debouncer.update(true, 20);
        // bouncing reset the candidate's clock to t=20, so 100ms of quiet
        // is required from there, not from the original t=0 edge.
        assert_eq!(debouncer.update(true, 90), None);
        assert_eq!(debouncer.update(true, 130), Some(true));
    }

    #[test]
    fn encoder_reports_one_step_per_detent()
    {
        let mut surface = ControlSurface::new();
        let steps = surface.poll_encoder(ENCODER_MIDPOINT + 4);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0], EncoderStep::Clockwise);
    }

    #[test]
    fn encoder_sub_detent_motion_reports_nothing()
    {
        let mut surface = ControlSurface::new();
        let steps = surface.poll_encoder(ENCODER_MIDPOINT + 2);
        assert!(steps.is_empty());
    }
}
