//! Per-request state blocks and completion dispatch

use core::ptr::NonNull;

use emserial_core::{Context, DeviceError, Error, Status};
use emserial_device::EventLoop;

use crate::until::Predicate;

/// State of one asynchronous read request.
///
/// Holds the caller's buffer as a raw base pointer plus a cursor. The public
/// API borrows the buffer for the driver binding lifetime, so the pointee
/// stays valid and exclusively owned by the request until the completion
/// handler is posted.
pub(crate) struct ReadRequest<W, H, P> {
    buf: NonNull<W>,
    pos: usize,
    len: usize,
    handler: Option<H>,
    pred: Option<P>,
}

// Safety: the pointee is exclusively borrowed by the request for its whole
// lifetime; the request is only ever accessed under the engine's critical
// section.
unsafe impl<W: Send, H: Send, P: Send> Send for ReadRequest<W, H, P> {}

impl<W: Copy, H, P> ReadRequest<W, H, P> {
    pub fn new(buf: &mut [W], pred: Option<P>, handler: H) -> Self {
        Self {
            // Slice pointers are never null, even for empty slices.
            buf: unwrap!(NonNull::new(buf.as_mut_ptr())),
            pos: 0,
            len: buf.len(),
            handler: Some(handler),
            pred,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.pos == self.len
    }

    /// Words transferred so far.
    pub fn transferred(&self) -> usize {
        self.pos
    }

    pub fn handler_mut(&mut self) -> &mut Option<H> {
        &mut self.handler
    }

    /// Stores one received word and advances the cursor.
    pub fn store(&mut self, word: W) {
        assert!(self.pos < self.len, "store past the requested read length");
        // Safety: the cursor is in bounds and the request owns the buffer.
        unsafe { self.buf.as_ptr().add(self.pos).write(word) };
        self.pos += 1;
    }
}

impl<W: Copy, H, P: Predicate<W>> ReadRequest<W, H, P> {
    /// Whether the given word terminates this request early.
    pub fn check_pred(&mut self, word: W) -> bool {
        P::check(&mut self.pred, word)
    }

    /// Outcome of a zero-length request.
    pub fn empty_status(&self) -> Status {
        if P::present(&self.pred) {
            Err(Error::BufferOverflow)
        } else {
            Ok(())
        }
    }

    /// Outcome reported when the device signals completion.
    ///
    /// A device error is forwarded unmodified. Otherwise a request with an
    /// installed predicate has exhausted its buffer (a successful match
    /// would have short-circuited earlier), so it completes with
    /// `BufferOverflow` even if the final word happened to match.
    pub fn complete_status(&self, result: Result<(), DeviceError>) -> Status {
        match result {
            Err(err) => Err(Error::Device(err)),
            Ok(()) if P::present(&self.pred) => Err(Error::BufferOverflow),
            Ok(()) => Ok(()),
        }
    }
}

/// State of one asynchronous write request.
pub(crate) struct WriteRequest<W, H> {
    buf: NonNull<W>,
    pos: usize,
    len: usize,
    handler: Option<H>,
}

// Safety: see `ReadRequest`. The pointee is only ever read.
unsafe impl<W: Send, H: Send> Send for WriteRequest<W, H> {}

impl<W: Copy, H> WriteRequest<W, H> {
    pub fn new(buf: &[W], handler: H) -> Self {
        Self {
            buf: unwrap!(NonNull::new(buf.as_ptr().cast_mut())),
            pos: 0,
            len: buf.len(),
            handler: Some(handler),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_drained(&self) -> bool {
        self.pos == self.len
    }

    pub fn transferred(&self) -> usize {
        self.pos
    }

    pub fn handler_mut(&mut self) -> &mut Option<H> {
        &mut self.handler
    }

    /// Takes the next word to transmit and advances the cursor.
    pub fn next_word(&mut self) -> W {
        assert!(self.pos < self.len, "load past the requested write length");
        // Safety: the cursor is in bounds and the buffer outlives the request.
        let word = unsafe { self.buf.as_ptr().add(self.pos).read() };
        self.pos += 1;
        word
    }

    pub fn complete_status(&self, result: Result<(), DeviceError>) -> Status {
        result.map_err(Error::Device)
    }
}

/// Posts the stored completion handler to the event loop.
///
/// The handler is moved out of the slot and bound to `(status, transferred)`;
/// the slot is guaranteed empty afterwards. The post target is selected by
/// the caller's context tag.
pub(crate) fn finish<E, H, C>(
    exec: &E,
    handler: &mut Option<H>,
    status: Status,
    transferred: usize,
    _cx: C,
) where
    E: EventLoop,
    H: FnOnce(Status, usize) + Send + 'static,
    C: Context,
{
    let handler = unwrap!(handler.take(), "request has no completion handler");
    let task = move || handler(status, transferred);
    let posted = if C::IN_ISR {
        exec.post_from_isr(task)
    } else {
        exec.post(task)
    };
    assert!(posted, "event loop run queue overflow");
}
