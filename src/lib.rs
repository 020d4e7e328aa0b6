//! Wavetable oscillator firmware core (spec section 2, overview).
//!
//! This crate is the DSP and persistence core only. Board bring-up — the
//! ADC/DAC DMA link, the LCD panel, the FAT/SD driver, raw flash programming
//! and the USB CDC transport — is reached only through the [`hal`] trait
//! seams, so [`Core`] builds and is exercised by the test suite on the host
//! exactly as it runs on the module. `kishoof-fw` (`src/main.rs`) supplies
//! the concrete board and owns the persistence wiring.

#![cfg_attr(not(test), no_std)]

pub mod additive;
pub mod calib;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod control;
pub mod dsp;
pub mod error;
pub mod filter;
pub mod hal;
#[cfg(not(test))]
pub mod irq;
pub mod serial;
pub mod sync;
pub mod ui;
pub mod voice;
pub mod warp;

use additive::BankSelector;
use calib::{Calib, Calibration};
use catalog::Catalog;
use clock::SampleClock;
use control::ControlSurface;
use filter::FilterLut;
use serial::LineReader;
use ui::UiProjection;
use voice::VoiceEngine;

/// Audio sample rate this firmware runs at (spec section 3).
pub const SAMPLE_RATE: f32 = 48_000.0;
/// Bytes of [`Core::save_payload`]'s serialized state; the config record
/// size a board integration reserves must be at least `HEADER_LEN +` this,
/// aligned to [`config`]'s record alignment.
pub const SAVE_PAYLOAD_LEN: usize = 14;

/// Everything the main loop ticks every sample or polls every iteration,
/// wired together independent of any board's concrete peripherals (spec
/// section 5, "Shared resources").
pub struct Core
{
    pub filter: FilterLut,
    pub voice: VoiceEngine,
    pub calib: Calib,
    pub catalog: Catalog,
    pub control: ControlSurface,
    pub ui: UiProjection,
    pub clock: SampleClock,
    pub line_reader: LineReader,
    additive_selector: BankSelector,
}

impl Core
{
    /// Builds a core with the anti-alias filter table precomputed, both
    /// channels at rest, every front-panel control released and the sample
    /// clock ticking every `period_ticks` of the board's free-running timer.
    pub fn new(period_ticks: u64) -> Self
    {
        let mut voice = VoiceEngine::new();
        let additive_selector = BankSelector::default();
        voice.additive_mut().configure(additive_selector);
        Self { filter: FilterLut::build(),
               voice,
               calib: Calib::new(SAMPLE_RATE),
               catalog: Catalog::new(),
               control: ControlSurface::new(),
               ui: UiProjection::new(),
               clock: SampleClock::new(period_ticks),
               line_reader: LineReader::new(),
               additive_selector }
    }

    /// The additive bank selector currently in effect.
    pub fn additive_selector(&self) -> BankSelector
    {
        self.additive_selector
    }

    /// Applies a new additive bank selector, e.g. from the `add:` command
    /// (spec section 6), updating both the live oscillator and the value a
    /// config save will persist.
    pub fn set_additive_selector(&mut self, selector: BankSelector)
    {
        self.additive_selector = selector;
        self.voice.additive_mut().configure(selector);
    }

    /// Runs one audio sample tick: feeds the calibration accumulator,
    /// advances both voice channels, and records the result for the UI
    /// projection (spec sections 4.1, 4.6 and 4.8).
    #[allow(clippy::too_many_arguments)]
    pub fn tick_audio(&mut self, adc: &hal::AdcSnapshot, octave: voice::Octave, warp_amount_raw: f32, controls: voice::VoiceControls, wavetable: &dyn voice::FrameSource, storage_busy: bool, file_backed: bool) -> (f32, f32)
    {
        self.calib.accumulate(adc.pitch_cv, adc.vca_cv);
        let (out_a, out_b) = self.voice.tick(adc, &self.calib.current, &self.filter, wavetable, octave, warp_amount_raw, controls, storage_busy, file_backed);
        self.ui.record(self.voice.a.phase, out_a, self.voice.b.phase, out_b);
        (out_a, out_b)
    }

    /// Serializes the persisted subset of core state (calibration and the
    /// additive bank selector) into `buf`, returning the byte count written
    /// (spec section 4.5, the payload a [`config::ConfigSaver`] hands the
    /// persistor).
    pub fn save_payload(&self, buf: &mut [u8]) -> usize
    {
        let c = self.calib.current;
        buf[0 .. 4].copy_from_slice(&c.pitch_base.to_le_bytes());
        buf[4 .. 8].copy_from_slice(&c.pitch_mult.to_le_bytes());
        buf[8 .. 10].copy_from_slice(&c.vca_normal.to_le_bytes());
        buf[10 .. 14].copy_from_slice(&self.additive_selector.0.to_le_bytes());
        SAVE_PAYLOAD_LEN
    }

    /// Restores calibration and the additive bank selector from a payload
    /// previously produced by [`Self::save_payload`]. Leaves state untouched
    /// and returns `false` if the payload is too short to be one of ours.
    pub fn restore_payload(&mut self, payload: &[u8]) -> bool
    {
        if payload.len() < SAVE_PAYLOAD_LEN {
            return false;
        }
        let pitch_base = f32::from_le_bytes(payload[0 .. 4].try_into().unwrap());
        let pitch_mult = f32::from_le_bytes(payload[4 .. 8].try_into().unwrap());
        let vca_normal = u16::from_le_bytes(payload[8 .. 10].try_into().unwrap());
        self.calib.current = Calibration { pitch_base, pitch_mult, vca_normal };
        let selector = BankSelector(u32::from_le_bytes(payload[10 .. 14].try_into().unwrap()));
        self.set_additive_selector(selector);
        true
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    struct SilentFrame(
        [f32; filter::FRAME_LEN],
    );

    impl voice::FrameSource for SilentFrame
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

    #[test]
    fn new_core_starts_with_both_channels_at_rest()
    {
        let core = Core::new(1000);
        assert_eq!(core.voice.a.phase, 0.0);
        assert_eq!(core.voice.b.phase, 0.0);
        assert_eq!(core.calib.state(), calib::State::Idle);
    }

    #[test]
    fn setting_additive_selector_updates_live_oscillator_and_reports_back()
    {
        let mut core = Core::new(1000);
        let mut selector = BankSelector(0);
        selector.0 |= 1;
        core.set_additive_selector(selector);
        assert_eq!(core.additive_selector(), selector);
    }

    #[test]
    fn save_and_restore_payload_round_trips_calibration_and_bank_selector()
    {
        let mut core = Core::new(1000);
        core.calib.current = Calibration { pitch_base: 1.23, pitch_mult: -4.56, vca_normal: 4000 };
        core.set_additive_selector(BankSelector(0xDEAD_BEEF));

        let mut buf = [0_u8; SAVE_PAYLOAD_LEN];
        let written = core.save_payload(&mut buf);
        assert_eq!(written, SAVE_PAYLOAD_LEN);

        let mut restored = Core::new(1000);
        assert!(restored.restore_payload(&buf));
        assert_eq!(restored.calib.current, core.calib.current);
        assert_eq!(restored.additive_selector(), core.additive_selector());
    }

    #[test]
    fn restore_payload_rejects_short_input()
    {
        let mut core = Core::new(1000);
        assert!(!core.restore_payload(&[0; 4]));
    }

    #[test]
    fn tick_audio_produces_finite_samples_and_records_ui_data()
    {
        let mut core = Core::new(1000);
        let wavetable = SilentFrame([0.0; filter::FRAME_LEN]);
        let adc = hal::AdcSnapshot::default();
        let (a, b) = core.tick_audio(&adc, voice::Octave::Normal, 0.5, voice::VoiceControls::default(), &wavetable, false, false);
        assert!(a.is_finite());
        assert!(b.is_finite());
    }
}
