//! Emserial core data types
//!
//! This crate provides the completion status and execution context definitions
//! used by the other Emserial crates. Emserial users should not depend on this
//! crate directly; the `emserial` crate re-exports everything.
#![no_std]

mod sealed {
    pub trait Sealed {}
}

/// Execution context of a driver or device call.
///
/// The driver core runs in two contexts: the event loop (ordinary thread
/// context) and the peripheral's interrupt service routines. Every device
/// operation takes a context tag so that the caller's context is part of the
/// call signature and cannot be confused.
pub trait Context: sealed::Sealed + Copy {
    /// Whether calls tagged with this context run in interrupt context.
    const IN_ISR: bool;
}

/// Event loop (thread) context tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventLoopCtx;

impl sealed::Sealed for EventLoopCtx {}
impl Context for EventLoopCtx {
    const IN_ISR: bool = false;
}

/// Interrupt context tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptCtx;

impl sealed::Sealed for InterruptCtx {}
impl Context for InterruptCtx {
    const IN_ISR: bool = true;
}

/// Error reported by the peripheral on transfer completion.
///
/// The driver forwards these to the completion handler unmodified, together
/// with the number of words transferred before the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceError {
    /// A received word was lost before it could be read out.
    Overrun,
    /// Parity check failed on a received word.
    Parity,
    /// A stop bit was sampled low.
    Framing,
    /// Line noise was detected during reception.
    Noise,
}

/// Failure modes of an asynchronous transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The request was cancelled. The reported length is the cursor position
    /// at the time of the cancellation.
    Aborted,
    /// A read-until request exhausted its buffer without the predicate
    /// accepting a word. Zero-length read-until requests complete with this
    /// error immediately.
    BufferOverflow,
    /// The peripheral reported an error on completion.
    Device(DeviceError),
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        Error::Device(err)
    }
}

/// Completion status delivered to request handlers.
pub type Status = Result<(), Error>;
