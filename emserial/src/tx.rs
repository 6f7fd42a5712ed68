//! Write engines
//!
//! The write half mirrors the read half minus the predicate logic. Only the
//! disabled and single-slot variants exist.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use emserial_core::{Error, EventLoopCtx, InterruptCtx, Status};
use emserial_device::{CharDevice, DeviceError, EventLoop, TxListener};

use crate::request::{self, WriteRequest};

pub(crate) trait SealedTxHalf<'a, D: CharDevice<'a>, E> {
    fn create(dev: &'a D, exec: &'a E) -> Self;
    fn register(&'a self, dev: &'a D);
    fn deregister(dev: &D);
}

/// Write half of a serial driver.
#[allow(private_bounds)]
pub trait TxHalf<'a, D: CharDevice<'a>, E>: SealedTxHalf<'a, D, E> {}

/// Asynchronous write operations provided by an enabled write half.
pub trait WriteOps<'a, D: CharDevice<'a>, E: EventLoop> {
    /// Stored completion handler type.
    type Handler: FnOnce(Status, usize) + Send + 'static;

    /// Schedules a write of exactly `buf.len()` words.
    fn write(&self, buf: &'a [D::Word], handler: Self::Handler);

    /// Aborts the outstanding write request, if any.
    fn cancel_write(&self) -> bool;
}

/// Compiled-out write half.
pub struct Disabled;

impl<'a, D: CharDevice<'a>, E> SealedTxHalf<'a, D, E> for Disabled {
    fn create(_dev: &'a D, _exec: &'a E) -> Self {
        Disabled
    }

    fn register(&'a self, _dev: &'a D) {}

    fn deregister(_dev: &D) {}
}

impl<'a, D: CharDevice<'a>, E> TxHalf<'a, D, E> for Disabled {}

/// Single-slot write engine: at most one outstanding request.
pub struct Single<'a, D: CharDevice<'a>, E, H> {
    dev: &'a D,
    exec: &'a E,
    slot: Mutex<CriticalSectionRawMutex, RefCell<Option<WriteRequest<D::Word, H>>>>,
}

impl<'a, D, E, H> Single<'a, D, E, H>
where
    D: CharDevice<'a>,
    E: EventLoop,
    H: FnOnce(Status, usize) + Send + 'static,
{
    fn submit(&self, buf: &'a [D::Word], handler: H) {
        let mut request = WriteRequest::new(buf, handler);
        if request.len() == 0 {
            self.slot.lock(|cell| {
                assert!(cell.borrow().is_none(), "write already in progress");
            });
            request::finish(self.exec, request.handler_mut(), Ok(()), 0, EventLoopCtx);
            return;
        }

        let len = request.len();
        self.slot.lock(|cell| {
            let mut slot = cell.borrow_mut();
            assert!(slot.is_none(), "write already in progress");
            *slot = Some(request);
        });
        // The slot was empty, so the device is idle and no write interrupt
        // can fire before this point.
        self.dev.start_write(len, EventLoopCtx);
    }
}

impl<'a, D, E, H> TxListener for Single<'a, D, E, H>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
{
    fn on_can_write(&self) {
        self.slot.lock(|cell| {
            let mut slot = cell.borrow_mut();
            while self.dev.can_write(InterruptCtx) {
                let request = unwrap!(slot.as_mut(), "can-write interrupt with no armed request");
                if request.is_drained() {
                    // The final word is in flight; the completion interrupt
                    // follows once it is on the wire.
                    break;
                }
                let word = request.next_word();
                self.dev.write(word, InterruptCtx);
            }
        });
    }

    fn on_write_complete(&self, result: Result<(), DeviceError>) {
        self.slot.lock(|cell| {
            let mut request = unwrap!(
                cell.borrow_mut().take(),
                "write-complete interrupt with no armed request"
            );
            let status = request.complete_status(result);
            let transferred = request.transferred();
            request::finish(
                self.exec,
                request.handler_mut(),
                status,
                transferred,
                InterruptCtx,
            );
        });
    }
}

impl<'a, D, E, H> SealedTxHalf<'a, D, E> for Single<'a, D, E, H>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
{
    fn create(dev: &'a D, exec: &'a E) -> Self {
        Self {
            dev,
            exec,
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    fn register(&'a self, dev: &'a D) {
        dev.set_tx_listener(Some(self));
    }

    fn deregister(dev: &D) {
        dev.set_tx_listener(None);
    }
}

impl<'a, D, E, H> TxHalf<'a, D, E> for Single<'a, D, E, H>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
{
}

impl<'a, D, E, H> WriteOps<'a, D, E> for Single<'a, D, E, H>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
{
    type Handler = H;

    fn write(&self, buf: &'a [D::Word], handler: H) {
        self.submit(buf, handler);
    }

    fn cancel_write(&self) -> bool {
        if !self.dev.cancel_write(EventLoopCtx) {
            self.slot.lock(|cell| {
                debug_assert!(cell.borrow().is_none());
            });
            return false;
        }

        self.slot.lock(|cell| {
            let mut request = unwrap!(
                cell.borrow_mut().take(),
                "device cancelled a write with no armed request"
            );
            let transferred = request.transferred();
            request::finish(
                self.exec,
                request.handler_mut(),
                Err(Error::Aborted),
                transferred,
                EventLoopCtx,
            );
        });
        true
    }
}
