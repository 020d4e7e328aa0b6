//! Error kinds surfaced by the core (see spec section 7, "Error handling
//! design"). The audio ISR never propagates these upward; everything past
//! the voice engine is main-loop code that can afford to report a reason.

use core::fmt;

/// Failure modes recognized by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error
{
    /// A RIFF/WAV header was malformed or its chunks ran out of bounds.
    InvalidWav,
    /// The flash memory-mapped window is temporarily unavailable.
    FlashBusy,
    /// A config save found no clean sector to bind.
    NoConfigSpace,
    /// The flash hardware reported a programming or erase fault.
    FlashError,
    /// The calibration flow was cancelled by the user.
    CalibrationAborted,
    /// A flash operation exceeded its wall-clock budget.
    Timeout,
    /// The audio ISR raced the output FIFO.
    AudioUnderrun,
}

impl fmt::Display for Error
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let text = match self {
            Error::InvalidWav => "flash corrupt",
            Error::FlashBusy => "flash busy",
            Error::NoConfigSpace => "no space",
            Error::FlashError => "flash corrupt",
            Error::CalibrationAborted => "calibration aborted",
            Error::Timeout => "timeout",
            Error::AudioUnderrun => "audio underrun",
        };
        f.write_str(text)
    }
}
