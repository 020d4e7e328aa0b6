//! `kishoof-fw`: the bare-metal entry point for the wavetable oscillator
//! module. Everything that can be tested host-side lives in the `kishoof`
//! library (`src/lib.rs`); this binary only wires a concrete board to it and
//! owns the config-persistence registration, since that wiring needs
//! `'static` references into board-specific globals.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

use kishoof::additive::BankSelector;
use kishoof::config::{ConfigSaver, Persistor};
use kishoof::error::Error;
use kishoof::hal::{AdcSnapshot, Board, Clock, ClusterChain, FlashWindow, Peripherals, PersistBackend};
use kishoof::serial::Command;
use kishoof::sync::{Lazy, Lock};
use kishoof::voice::{FrameSource, Octave, VoiceControls};
use kishoof::{catalog, Core};

/// Core clock the sample timer free-runs from, used only to size
/// [`SampleClock`](kishoof::clock::SampleClock)'s nominal period; the board
/// itself owns the actual timer peripheral.
const TIMER_HZ: f64 = 200_000_000.0;
/// Bytes reserved per config record: header plus [`kishoof::SAVE_PAYLOAD_LEN`],
/// rounded up to the persistor's 8-byte alignment.
const RECORD_SIZE: usize = 24;
/// Reserved config sectors, `K` in spec section 4.5.
const CONFIG_SECTORS: usize = 2;

static CORE: Lazy<Lock<Core>> = Lazy::new(|| Lock::new(Core::new((TIMER_HZ / kishoof::SAMPLE_RATE as f64) as u64)));

/// Registers with the [`Persistor`] and delegates to [`Core::save_payload`]/
/// [`Core::restore_payload`] through the shared lock, so the persistor itself
/// never needs to borrow [`Core`] directly.
struct CoreSaver;

impl ConfigSaver for CoreSaver
{
    fn save(&self, buf: &mut [u8]) -> usize
    {
        CORE.lock().save_payload(buf)
    }

    fn restore(&self, payload: &[u8]) -> bool
    {
        CORE.lock().restore_payload(payload)
    }
}

static CORE_SAVER: CoreSaver = CoreSaver;

/// Board support stub. Real register access — the ADC/DAC DMA link, the
/// OctoSPI-mapped flash window, the FAT cluster walk and the USB CDC byte
/// stream — is board bring-up (spec section 1, "Out of scope") supplied by
/// the module's BSP crate; this type only establishes the shape `run`
/// depends on.
struct Bsp;

impl Peripherals for Bsp
{
    fn adc(&self) -> AdcSnapshot
    {
        unimplemented!("ADC DMA wiring is board bring-up, out of scope for this crate")
    }

    fn write_dac(&mut self, _channel_a: i32, _channel_b: i32)
    {
        unimplemented!("DAC DMA wiring is board bring-up, out of scope for this crate")
    }

    fn raw_buttons(&self) -> (bool, bool, bool)
    {
        unimplemented!("button wiring is board bring-up, out of scope for this crate")
    }

    fn raw_encoder(&self) -> u16
    {
        unimplemented!("encoder wiring is board bring-up, out of scope for this crate")
    }

    fn now_ticks(&self) -> u64
    {
        unimplemented!("timer wiring is board bring-up, out of scope for this crate")
    }

    fn fifo_underrun(&self) -> bool
    {
        false
    }

    fn read_byte(&mut self) -> Option<u8>
    {
        None
    }

    fn write_bytes(&mut self, _bytes: &[u8])
    {
    }
}

impl FlashWindow for Bsp
{
    fn bytes(&self) -> &[u8]
    {
        &[]
    }

    fn busy(&self) -> bool
    {
        true
    }
}

impl ClusterChain for Bsp
{
    fn next_cluster(&self, _cluster: u32) -> Option<u32>
    {
        None
    }
}

impl PersistBackend for Bsp
{
    fn sector_size(&self) -> usize
    {
        RECORD_SIZE * 4
    }

    fn sector_count(&self) -> usize
    {
        CONFIG_SECTORS
    }

    fn read_sector(&self, _sector: usize, _buf: &mut [u8]) -> Result<(), Error>
    {
        Err(Error::FlashBusy)
    }

    fn erase_sector(&mut self, _sector: usize) -> Result<(), Error>
    {
        Err(Error::FlashBusy)
    }

    fn program(&mut self, _sector: usize, _offset: usize, _data: &[u8]) -> Result<(), Error>
    {
        Err(Error::FlashBusy)
    }
}

impl Clock for Bsp
{
    fn millis(&self) -> u64
    {
        unimplemented!("timer wiring is board bring-up, out of scope for this crate")
    }
}

/// Drives the main loop against any concrete board: restores config, then
/// repeatedly polls controls and the command channel, ticking the voice
/// engine each time the sample clock fires.
fn run<B: Board>(board: &mut B) -> !
{
    let mut persistor = Persistor::new(board.sector_count(), RECORD_SIZE);
    persistor.register(&CORE_SAVER);
    let _ = persistor.restore(board);

    let silent_frame = [0.0_f32; catalog::FRAME_LEN];
    let fallback = FixedFrame(&silent_frame);

    loop {
        while let Some(byte) = board.read_byte() {
            if let Some(command) = CORE.lock().line_reader.push_byte(byte) {
                handle_command(command, &mut persistor, board);
            }
        }

        let (encoder_raw, octave_raw, warp_raw) = board.raw_buttons();
        let now_ticks = board.now_ticks();
        let now_ms = (now_ticks as f64 * 1000.0 / TIMER_HZ) as u64;
        let mut core = CORE.lock();
        let _edges = core.control.poll_buttons(encoder_raw, octave_raw, warp_raw, now_ms);
        let _steps = core.control.poll_encoder(board.raw_encoder());

        if let kishoof::clock::TickOutcome::Ticked = core.clock.enter(now_ticks, board.fifo_underrun()) {
            let adc = board.adc();
            let (out_a, out_b) = core.tick_audio(&adc, Octave::Normal, 0.5, VoiceControls::default(), &fallback, false, false);
            board.write_dac(kishoof::clock::SampleClock::scale_sample(out_a), kishoof::clock::SampleClock::scale_sample(out_b));
        }
        drop(core);

        // A snapshot clock sidesteps borrowing `board` both mutably (as the
        // persist backend) and immutably (as the clock) in the same call.
        let snapshot = SnapshotClock(now_ms);
        let _ = persistor.maybe_save(board, &snapshot, false);

        #[cfg(not(test))]
        sleep();
    }
}

/// Placeholder, zero-filled frame source used until the catalog and flash
/// window wiring (board bring-up) selects a real wavetable.
struct FixedFrame<'a>(&'a [f32; catalog::FRAME_LEN]);

impl<'a> FrameSource for FixedFrame<'a>
{
    fn frame_count(&self) -> u32
    {
        1
    }

    fn frame(&self, _index: u32) -> &[f32]
    {
        self.0
    }
}

/// Reads of `board.millis()` happen while `board` is reborrowed immutably;
/// this snapshot lets the subsequent `&mut dyn PersistBackend` borrow for
/// [`Persistor::maybe_save`] stand alone.
struct SnapshotClock(u64);

impl Clock for SnapshotClock
{
    fn millis(&self) -> u64
    {
        self.0
    }
}

fn handle_command<B: Board>(command: Command, persistor: &mut Persistor, board: &mut B)
{
    match command {
        Command::Calib => {
            CORE.lock().calib.handle_char('s');
        },
        Command::Continue => {
            if let Some(_calibration) = CORE.lock().calib.handle_char('y') {
                persistor.schedule_save();
            }
        },
        Command::Cancel => {
            CORE.lock().calib.handle_char('x');
        },
        Command::ClearConfig => {
            let _ = persistor.erase(board);
        },
        Command::SetAdditive(raw) => {
            CORE.lock().set_additive_selector(BankSelector(raw));
            persistor.schedule_save();
        },
        Command::ListWavetables => {
            let core = CORE.lock();
            for entry in core.catalog.entries() {
                board.write_bytes(entry.name.as_bytes());
                board.write_bytes(b"\n");
            }
        },
    }
}

/// Entry point. Real boot (clock trees, the flash/FAT mount, the ADC/DAC DMA
/// setup) is board bring-up; `Bsp` stands in for it so `run`'s logic above
/// is exercised the same way the test suite exercises it.
#[cfg(not(test))]
#[no_mangle]
pub extern "C" fn main() -> !
{
    kishoof::irq::install(mask_audio_irq, unmask_audio_irq);
    let mut board = Bsp;
    run(&mut board)
}

/// Disables interrupts globally. The board has a single audio-rate timer
/// interrupt in practice, so masking it via `PRIMASK` rather than one NVIC
/// line is sufficient and keeps [`kishoof::irq`] board-agnostic.
#[cfg(not(test))]
fn mask_audio_irq()
{
    unsafe { core::arch::asm!("cpsid i", options(nomem, nostack, preserves_flags)) };
}

/// Re-enables interrupts globally; the counterpart to [`mask_audio_irq`].
#[cfg(not(test))]
fn unmask_audio_irq()
{
    unsafe { core::arch::asm!("cpsie i", options(nomem, nostack, preserves_flags)) };
}

/// Dummy function just to let `cargo test` link.
#[cfg(test)]
fn main() {}

/// Halts with a diagnostic message. The audio ISR and main loop never
/// recover from a panic; there is no safe wavetable state to fall back to.
#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> !
{
    halt()
}

/// Puts the core to sleep until the next interrupt.
#[cfg(not(test))]
fn sleep()
{
    unsafe {
        core::arch::asm!("cpsie i", "wfi", "cpsid i", options(nomem, nostack, preserves_flags));
    }
}

/// Halts the system.
#[cfg(not(test))]
fn halt() -> !
{
    unsafe {
        core::arch::asm!("cpsid i", "2:", "wfi", "b 2b", options(nomem, nostack, preserves_flags, noreturn));
    }
}
