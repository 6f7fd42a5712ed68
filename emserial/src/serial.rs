//! Driver facade
//!
//! [`Serial`] composes one read engine and one write engine over a single
//! device and event loop. [`Serial::attach`] installs the device's interrupt
//! callbacks and returns the [`Port`] operation handle; dropping the port
//! detaches the callbacks again, before the driver storage can go away.

use emserial_device::{CharDevice, EventLoop};

use crate::rx::{self, ReadOps, RxHalf};
use crate::tx::{self, TxHalf, WriteOps};
use crate::until;

/// Character device driver.
///
/// Binds a read half `R` and a write half `W` to one device and one event
/// loop. The halves are chosen at compile time; a disabled half
/// ([`rx::Disabled`] / [`tx::Disabled`]) costs nothing and installs no
/// interrupt callbacks.
///
/// The driver is constructed by value and pinned in place by
/// [`Serial::attach`], which borrows it for its remaining lifetime: the
/// device holds interrupt callback references into the driver, so the driver
/// must not move while attached.
pub struct Serial<'a, D: CharDevice<'a>, E, R, W> {
    dev: &'a D,
    exec: &'a E,
    rx: R,
    tx: W,
}

impl<'a, D, E, R, W> Serial<'a, D, E, R, W>
where
    D: CharDevice<'a>,
    E: EventLoop,
    R: RxHalf<'a, D, E>,
    W: TxHalf<'a, D, E>,
{
    /// Creates a detached driver over `dev` and `exec`.
    pub fn new(dev: &'a D, exec: &'a E) -> Self {
        Self {
            dev,
            exec,
            rx: R::create(dev, exec),
            tx: W::create(dev, exec),
        }
    }

    /// Installs the interrupt callbacks of the enabled halves and returns
    /// the operation handle.
    ///
    /// Borrows the driver for its remaining lifetime. The callbacks are
    /// detached when the returned port is dropped.
    pub fn attach(&'a mut self) -> Port<'a, D, E, R, W> {
        let serial: &'a Self = self;
        serial.rx.register(serial.dev);
        serial.tx.register(serial.dev);
        trace!("serial driver attached");
        Port { serial }
    }
}

/// Operation handle of an attached driver.
///
/// All requests are fire-and-forget: they return immediately and the
/// outcome arrives later through the completion handler, posted to the
/// event loop. Handlers receive `(status, transferred)` where `transferred`
/// counts the words moved before completion, error or cancellation.
pub struct Port<'a, D, E, R, W>
where
    D: CharDevice<'a>,
    E: EventLoop,
    R: RxHalf<'a, D, E>,
    W: TxHalf<'a, D, E>,
{
    serial: &'a Serial<'a, D, E, R, W>,
}

impl<'a, D, E, R, W> Drop for Port<'a, D, E, R, W>
where
    D: CharDevice<'a>,
    E: EventLoop,
    R: RxHalf<'a, D, E>,
    W: TxHalf<'a, D, E>,
{
    fn drop(&mut self) {
        R::deregister(self.serial.dev);
        W::deregister(self.serial.dev);
        trace!("serial driver detached");
    }
}

impl<'a, D, E, R, W> Port<'a, D, E, R, W>
where
    D: CharDevice<'a>,
    E: EventLoop,
    R: RxHalf<'a, D, E>,
    W: TxHalf<'a, D, E>,
{
    /// The device (peripheral) control object.
    pub fn device(&self) -> &'a D {
        self.serial.dev
    }

    /// The event loop completions are posted to.
    pub fn event_loop(&self) -> &'a E {
        self.serial.exec
    }
}

impl<'a, D, E, R, W> Port<'a, D, E, R, W>
where
    D: CharDevice<'a>,
    E: EventLoop,
    R: RxHalf<'a, D, E> + ReadOps<'a, D, E>,
    W: TxHalf<'a, D, E>,
{
    /// Schedules a read of exactly `buf.len()` words into `buf`.
    ///
    /// The handler sees `(Ok(()), buf.len())` on completion,
    /// `(Err(Device(..)), k)` on a device error and `(Err(Aborted), k)`
    /// after [`Port::cancel_read`]. A zero-length read completes with
    /// `(Ok(()), 0)` without touching the device.
    ///
    /// The buffer must not be inspected until the handler has run.
    pub fn read(&self, buf: &'a mut [D::Word], handler: R::Handler) {
        self.serial.rx.read(buf, handler);
    }

    /// Schedules a read that terminates early when `pred` accepts a word.
    ///
    /// The handler sees `(Ok(()), k)` with `buf[k - 1]` accepted by the
    /// predicate, `(Err(BufferOverflow), buf.len())` when the buffer fills
    /// without a match, `(Err(Device(..)), k)` on a device error and
    /// `(Err(Aborted), k)` after [`Port::cancel_read`]. A zero-length
    /// read-until completes with `(Err(BufferOverflow), 0)` without touching
    /// the device.
    pub fn read_until(&self, buf: &'a mut [D::Word], pred: R::Pred, handler: R::Handler) {
        self.serial.rx.read_until(buf, pred, handler);
    }

    /// Schedules a read that terminates early on the given word.
    ///
    /// Shorthand for [`Port::read_until`] with a [`until::MatchByte`]-style
    /// predicate.
    pub fn read_until_byte(&self, buf: &'a mut [D::Word], word: D::Word, handler: R::Handler)
    where
        R::Pred: From<D::Word>,
    {
        self.read_until(buf, <R::Pred>::from(word), handler);
    }

    /// Aborts the outstanding read request(s).
    ///
    /// Returns `false` if no read is outstanding. Otherwise every pending
    /// request completes with `(Err(Aborted), k)`, `k` being its cursor at
    /// cancellation time, and the call returns `true`.
    pub fn cancel_read(&self) -> bool {
        self.serial.rx.cancel_read()
    }
}

impl<'a, D, E, R, W> Port<'a, D, E, R, W>
where
    D: CharDevice<'a>,
    E: EventLoop,
    R: RxHalf<'a, D, E>,
    W: TxHalf<'a, D, E> + WriteOps<'a, D, E>,
{
    /// Schedules a write of all of `buf`.
    ///
    /// The handler sees `(Ok(()), buf.len())` on completion,
    /// `(Err(Device(..)), k)` on a device error and `(Err(Aborted), k)`
    /// after [`Port::cancel_write`]. A zero-length write completes with
    /// `(Ok(()), 0)` without touching the device.
    ///
    /// The buffer must stay unchanged until the handler has run.
    pub fn write(&self, buf: &'a [D::Word], handler: W::Handler) {
        self.serial.tx.write(buf, handler);
    }

    /// Aborts the outstanding write request.
    ///
    /// Returns `false` if no write is outstanding. Otherwise the request
    /// completes with `(Err(Aborted), k)` and the call returns `true`.
    pub fn cancel_write(&self) -> bool {
        self.serial.tx.cancel_write()
    }
}

/// Driver with one read slot, one write slot and the read-until facility
/// disabled, the default configuration.
pub type DefaultSerial<'a, D, E, RH, WH> =
    Serial<'a, D, E, rx::Single<'a, D, E, RH, until::Never>, tx::Single<'a, D, E, WH>>;
