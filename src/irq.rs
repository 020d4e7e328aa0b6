//! Audio interrupt masking seam.
//!
//! Real NVIC/EXTI register pokes to mask and unmask the sample clock
//! interrupt are board bring-up, out of scope for this crate (see spec
//! section 1, "Out of scope"). What belongs here is the seam the rest of the core
//! calls through: [`Lock`](crate::sync::Lock) masks this interrupt for the
//! duration of a main-loop critical section and unmasks it on drop. A board
//! integration installs its own mask/unmask pair once at boot via
//! [`install`]; until installed, masking is a no-op, which is sufficient for
//! host tests and for any build that never shares state with an ISR.

use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Installed mask function, or a no-op until [`install`] is called.
static MASK_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
/// Installed unmask function, or a no-op until [`install`] is called.
static UNMASK_FN: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());
/// Nesting depth, so that masking twice only requires one unmask to undo.
static DEPTH: AtomicUsize = AtomicUsize::new(0);

/// Installs the board's interrupt mask/unmask pair.
///
/// * `mask`: Disables the sample clock interrupt so the ISR cannot preempt
///   the caller.
/// * `unmask`: Re-enables it.
///
/// Must be called at most once, before any [`Lock`](crate::sync::Lock) is
/// taken from the main loop.
pub fn install(mask: fn(), unmask: fn())
{
    MASK_FN.store(mask as *mut (), Ordering::SeqCst);
    UNMASK_FN.store(unmask as *mut (), Ordering::SeqCst);
}

/// Masks the audio interrupt, nesting safely with any outer mask already in
/// effect.
pub fn mask()
{
    if DEPTH.fetch_add(1, Ordering::SeqCst) == 0 {
        let ptr = MASK_FN.load(Ordering::SeqCst);
        if !ptr.is_null() {
            let f: fn() = unsafe { core::mem::transmute(ptr) };
            f();
        }
    }
}

/// Unmasks the audio interrupt once the outermost critical section exits.
pub fn unmask()
{
    if DEPTH.fetch_sub(1, Ordering::SeqCst) == 1 {
        let ptr = UNMASK_FN.load(Ordering::SeqCst);
        if !ptr.is_null() {
            let f: fn() = unsafe { core::mem::transmute(ptr) };
            f();
        }
    }
}
