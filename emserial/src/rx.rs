//! Read engines
//!
//! The read half of a driver exists in three structurally different variants
//! selected at compile time:
//! * [`Disabled`] compiles the half away: no storage, no interrupt callbacks.
//! * [`Single`] holds one inline request slot. Submitting a request while one
//!   is outstanding is a caller bug.
//! * [`Queued`] holds a bounded FIFO of pending requests. The front request
//!   is the one armed at the device; completions chain the next one from
//!   inside the completion interrupt.
//!
//! All variants share the byte-level interrupt loop: drain the peripheral
//! while it has data, store each word at the cursor, and evaluate the
//! read-until predicate. On a predicate match the engine tries to cancel the
//! armed operation from inside the interrupt; if the device reports the
//! completion interrupt as already imminent, the completion resolves the
//! request instead.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Deque;

use emserial_core::{Context, Error, EventLoopCtx, InterruptCtx, Status};
use emserial_device::{CharDevice, DeviceError, EventLoop, RxListener};

use crate::request::{self, ReadRequest};
use crate::until::Predicate;

pub(crate) trait SealedRxHalf<'a, D: CharDevice<'a>, E> {
    fn create(dev: &'a D, exec: &'a E) -> Self;
    fn register(&'a self, dev: &'a D);
    fn deregister(dev: &D);
}

/// Read half of a serial driver.
#[allow(private_bounds)]
pub trait RxHalf<'a, D: CharDevice<'a>, E>: SealedRxHalf<'a, D, E> {}

/// Asynchronous read operations provided by an enabled read half.
pub trait ReadOps<'a, D: CharDevice<'a>, E: EventLoop> {
    /// Stored completion handler type.
    type Handler: FnOnce(Status, usize) + Send + 'static;
    /// Stored read-until predicate type.
    type Pred: Predicate<D::Word>;

    /// Schedules a read of exactly `buf.len()` words.
    fn read(&self, buf: &'a mut [D::Word], handler: Self::Handler);

    /// Schedules a read terminating early when `pred` accepts a word.
    fn read_until(&self, buf: &'a mut [D::Word], pred: Self::Pred, handler: Self::Handler);

    /// Aborts the outstanding read request(s), if any.
    fn cancel_read(&self) -> bool;
}

/// Compiled-out read half.
pub struct Disabled;

impl<'a, D: CharDevice<'a>, E> SealedRxHalf<'a, D, E> for Disabled {
    fn create(_dev: &'a D, _exec: &'a E) -> Self {
        Disabled
    }

    fn register(&'a self, _dev: &'a D) {}

    fn deregister(_dev: &D) {}
}

impl<'a, D: CharDevice<'a>, E> RxHalf<'a, D, E> for Disabled {}

/// Single-slot read engine: at most one outstanding request.
pub struct Single<'a, D: CharDevice<'a>, E, H, P> {
    dev: &'a D,
    exec: &'a E,
    slot: Mutex<CriticalSectionRawMutex, RefCell<Option<ReadRequest<D::Word, H, P>>>>,
}

impl<'a, D, E, H, P> Single<'a, D, E, H, P>
where
    D: CharDevice<'a>,
    E: EventLoop,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    fn submit(&self, buf: &'a mut [D::Word], pred: Option<P>, handler: H) {
        let mut request = ReadRequest::new(buf, pred, handler);
        if request.len() == 0 {
            self.slot.lock(|cell| {
                assert!(cell.borrow().is_none(), "read already in progress");
            });
            let status = request.empty_status();
            request::finish(self.exec, request.handler_mut(), status, 0, EventLoopCtx);
            return;
        }

        let len = request.len();
        self.slot.lock(|cell| {
            let mut slot = cell.borrow_mut();
            assert!(slot.is_none(), "read already in progress");
            *slot = Some(request);
        });
        // The slot was empty, so the device is idle and no read interrupt
        // can fire before this point.
        self.dev.start_read(len, EventLoopCtx);
    }
}

impl<'a, D, E, H, P> RxListener for Single<'a, D, E, H, P>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    fn on_can_read(&self) {
        self.slot.lock(|cell| {
            let mut slot = cell.borrow_mut();
            while self.dev.can_read(InterruptCtx) {
                let request = unwrap!(slot.as_mut(), "can-read interrupt with no armed request");
                assert!(
                    !request.is_full(),
                    "device offered a word past the requested length"
                );
                let word = self.dev.read(InterruptCtx);
                request.store(word);

                if request.check_pred(word) && self.dev.cancel_read(InterruptCtx) {
                    let mut request = unwrap!(slot.take());
                    let transferred = request.transferred();
                    request::finish(
                        self.exec,
                        request.handler_mut(),
                        Ok(()),
                        transferred,
                        InterruptCtx,
                    );
                    break;
                }
                // On a failed cancel the completion interrupt is imminent
                // and resolves the request.
            }
        });
    }

    fn on_read_complete(&self, result: Result<(), DeviceError>) {
        self.slot.lock(|cell| {
            let mut request = unwrap!(
                cell.borrow_mut().take(),
                "read-complete interrupt with no armed request"
            );
            assert!(
                request.transferred() > 0,
                "read completed without transferring a word"
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

impl<'a, D, E, H, P> SealedRxHalf<'a, D, E> for Single<'a, D, E, H, P>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    fn create(dev: &'a D, exec: &'a E) -> Self {
        Self {
            dev,
            exec,
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    fn register(&'a self, dev: &'a D) {
        dev.set_rx_listener(Some(self));
    }

    fn deregister(dev: &D) {
        dev.set_rx_listener(None);
    }
}

impl<'a, D, E, H, P> RxHalf<'a, D, E> for Single<'a, D, E, H, P>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
}

impl<'a, D, E, H, P> ReadOps<'a, D, E> for Single<'a, D, E, H, P>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    type Handler = H;
    type Pred = P;

    fn read(&self, buf: &'a mut [D::Word], handler: H) {
        self.submit(buf, None, handler);
    }

    fn read_until(&self, buf: &'a mut [D::Word], pred: P, handler: H) {
        self.submit(buf, Some(pred), handler);
    }

    fn cancel_read(&self) -> bool {
        if !self.dev.cancel_read(EventLoopCtx) {
            self.slot.lock(|cell| {
                debug_assert!(cell.borrow().is_none());
            });
            return false;
        }

        self.slot.lock(|cell| {
            let mut request = unwrap!(
                cell.borrow_mut().take(),
                "device cancelled a read with no armed request"
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

/// Queued read engine: a bounded FIFO of up to `N` pending requests.
///
/// The front request is armed at the device. Completions pop it and chain
/// the next request from inside the completion interrupt, so back-to-back
/// requests lose no words between them.
pub struct Queued<'a, D: CharDevice<'a>, E, H, P, const N: usize> {
    dev: &'a D,
    exec: &'a E,
    queue: Mutex<CriticalSectionRawMutex, RefCell<Deque<ReadRequest<D::Word, H, P>, N>>>,
}

impl<'a, D, E, H, P, const N: usize> Queued<'a, D, E, H, P, N>
where
    D: CharDevice<'a>,
    E: EventLoop,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    fn submit(&self, buf: &'a mut [D::Word], pred: Option<P>, handler: H) {
        let request = ReadRequest::new(buf, pred, handler);
        let was_idle = self.queue.lock(|cell| {
            let mut queue = cell.borrow_mut();
            let was_idle = queue.is_empty();
            if queue.push_back(request).is_err() {
                panic!("pending read queue overflow");
            }
            was_idle
        });

        if was_idle {
            // Nothing was armed, so no read interrupt can preempt this.
            self.start_next(EventLoopCtx);
        }
        // Otherwise the in-flight request chains into this one from the
        // completion interrupt.
    }

    /// Arms the front of the queue, completing zero-length requests inline.
    fn start_next<C: Context>(&self, cx: C) {
        self.queue.lock(|cell| {
            let mut queue = cell.borrow_mut();
            while let Some(request) = queue.front_mut() {
                if request.len() != 0 {
                    self.dev.start_read(request.len(), cx);
                    break;
                }
                let status = request.empty_status();
                request::finish(self.exec, request.handler_mut(), status, 0, cx);
                unwrap!(queue.pop_front());
            }
        });
    }
}

impl<'a, D, E, H, P, const N: usize> RxListener for Queued<'a, D, E, H, P, N>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    fn on_can_read(&self) {
        let matched = self.queue.lock(|cell| {
            let mut queue = cell.borrow_mut();
            while self.dev.can_read(InterruptCtx) {
                let request =
                    unwrap!(queue.front_mut(), "can-read interrupt with no pending request");
                assert!(
                    !request.is_full(),
                    "device offered a word past the requested length"
                );
                let word = self.dev.read(InterruptCtx);
                request.store(word);

                if request.check_pred(word) && self.dev.cancel_read(InterruptCtx) {
                    let transferred = request.transferred();
                    request::finish(
                        self.exec,
                        request.handler_mut(),
                        Ok(()),
                        transferred,
                        InterruptCtx,
                    );
                    unwrap!(queue.pop_front());
                    // The front changed; stop draining for this request.
                    return true;
                }
                // On a failed cancel the completion interrupt is imminent
                // and resolves the request.
            }
            false
        });

        if matched {
            self.start_next(InterruptCtx);
        }
    }

    fn on_read_complete(&self, result: Result<(), DeviceError>) {
        self.queue.lock(|cell| {
            let mut queue = cell.borrow_mut();
            let request = unwrap!(
                queue.front_mut(),
                "read-complete interrupt with no pending request"
            );
            assert!(
                request.transferred() > 0,
                "read completed without transferring a word"
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
            unwrap!(queue.pop_front());
        });
        self.start_next(InterruptCtx);
    }
}

impl<'a, D, E, H, P, const N: usize> SealedRxHalf<'a, D, E> for Queued<'a, D, E, H, P, N>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    fn create(dev: &'a D, exec: &'a E) -> Self {
        Self {
            dev,
            exec,
            queue: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    fn register(&'a self, dev: &'a D) {
        dev.set_rx_listener(Some(self));
    }

    fn deregister(dev: &D) {
        dev.set_rx_listener(None);
    }
}

impl<'a, D, E, H, P, const N: usize> RxHalf<'a, D, E> for Queued<'a, D, E, H, P, N>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
}

impl<'a, D, E, H, P, const N: usize> ReadOps<'a, D, E> for Queued<'a, D, E, H, P, N>
where
    D: CharDevice<'a> + Sync,
    E: EventLoop + Sync,
    H: FnOnce(Status, usize) + Send + 'static,
    P: Predicate<D::Word>,
{
    type Handler = H;
    type Pred = P;

    fn read(&self, buf: &'a mut [D::Word], handler: H) {
        self.submit(buf, None, handler);
    }

    fn read_until(&self, buf: &'a mut [D::Word], pred: P, handler: H) {
        self.submit(buf, Some(pred), handler);
    }

    fn cancel_read(&self) -> bool {
        if !self.dev.cancel_read(EventLoopCtx) {
            self.queue.lock(|cell| {
                debug_assert!(cell.borrow().is_empty());
            });
            return false;
        }

        self.queue.lock(|cell| {
            let mut queue = cell.borrow_mut();
            while let Some(mut request) = queue.pop_front() {
                let transferred = request.transferred();
                request::finish(
                    self.exec,
                    request.handler_mut(),
                    Err(Error::Aborted),
                    transferred,
                    EventLoopCtx,
                );
            }
        });
        true
    }
}
