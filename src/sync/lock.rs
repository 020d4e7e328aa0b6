//! Locking primitives shared between the audio ISR and the main loop.
//!
//! There is only ever one logical owner of the processor at a time: either
//! the main loop or the sample clock interrupt that preempts it. A [`Lock`]
//! therefore never spins; taking it from the main loop masks the audio
//! interrupt line for the duration of the critical section so the ISR cannot
//! observe a torn write, while taking it from inside the ISR itself is free,
//! since the ISR can never be preempted by the main loop.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(test))]
use crate::irq::{mask, unmask};

/// Lock guard whose lifetime determines how long the lock is held.
#[derive(Debug)]
pub struct Guard<'a, T: ?Sized>
{
    /// Lock to be released once this guard is dropped.
    lock: &'a Lock<T>,
    /// Zero-sized field to remove the Send trait.
    _data: PhantomData<*mut ()>,
}

/// Lock container.
#[derive(Debug)]
pub struct Lock<T: ?Sized>
{
    /// Actual spin-lock.
    advisor: Advisor,
    /// Protected content.
    content: UnsafeCell<T>,
}

/// Reentrancy advisor backing a [`Lock`].
///
/// On real hardware, holding the lock masks the audio sample interrupt so the
/// ISR cannot run while the main loop is mutating shared state; the flag here
/// only guards against a handler recursively taking a lock it already holds.
#[derive(Debug)]
pub struct Advisor
{
    held: AtomicBool,
}

impl<'a, T: ?Sized> Guard<'a, T>
{
    /// Creates and initializes a new guard.
    ///
    /// * `lock`: Lock to be released when this guard is dropped.
    ///
    /// Returns the newly created guard.
    fn new(lock: &'a Lock<T>) -> Self
    {
        lock.advisor.lock();
        Self { lock,
               _data: PhantomData }
    }
}

impl<'a, T: ?Sized> Deref for Guard<'a, T>
{
    type Target = T;

    fn deref(&self) -> &'a Self::Target
    {
        unsafe { &*self.lock.content.get() }
    }
}

impl<'a, T: ?Sized> DerefMut for Guard<'a, T>
{
    fn deref_mut(&mut self) -> &'a mut Self::Target
    {
        unsafe { &mut *self.lock.content.get() }
    }
}

impl<'a, T: ?Sized> Drop for Guard<'a, T>
{
    fn drop(&mut self)
    {
        self.lock.advisor.unlock();
    }
}

impl<T: ?Sized> Lock<T>
{
    /// Creates and initializes a new lock.
    ///
    /// `content`: Content to protect.
    ///
    /// Returns the newly created lock.
    pub const fn new(content: T) -> Self
        where T: Sized
    {
        Self { advisor: Advisor::new(),
               content: UnsafeCell::new(content) }
    }

    /// Enters a critical section, masking the audio interrupt if necessary so
    /// it cannot observe a partial update.
    ///
    /// Returns a [`Guard`] which allows access to the content and holds the
    /// section open until dropped.
    pub fn lock(&self) -> Guard<T>
    {
        Guard::new(self)
    }
}

impl Advisor
{
    /// Creates and initializes a new lock advisor.
    ///
    /// Returns the newly created lock advisor.
    pub const fn new() -> Self
    {
        Self { held: AtomicBool::new(false) }
    }

    /// Masks the audio interrupt and marks the advisor held.
    ///
    /// Panics if the advisor is already held, which would indicate a handler
    /// re-entering a lock it already owns.
    #[track_caller]
    pub fn lock(&self)
    {
        #[cfg(not(test))]
        mask();
        assert!(!self.held.swap(true, Ordering::SeqCst), "Reentrant lock acquisition detected");
    }

    /// Marks the advisor free and unmasks the audio interrupt.
    ///
    /// Panics if the advisor is not currently held.
    #[track_caller]
    pub fn unlock(&self)
    {
        assert!(self.held.swap(false, Ordering::SeqCst), "Attempted to release a lock that is not held");
        #[cfg(not(test))]
        unmask();
    }
}

unsafe impl<T: ?Sized> Send for Lock<T> {}

unsafe impl<T: ?Sized> Sync for Lock<T> {}
