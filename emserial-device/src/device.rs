//! Character device (peripheral) contract

use emserial_core::{Context, DeviceError, EventLoopCtx, InterruptCtx};

/// Read-side interrupt callbacks, implemented by the driver's read engine.
///
/// The device fires both methods in interrupt context only.
pub trait RxListener: Sync {
    /// At least one word is available for reading.
    ///
    /// The listener performs repeated [`CharDevice::can_read`] and
    /// [`CharDevice::read`] calls until `can_read` returns `false`.
    fn on_can_read(&self);

    /// The armed read operation finished and read interrupts are disabled.
    ///
    /// No further [`RxListener::on_can_read`] calls follow until the next
    /// [`CharDevice::start_read`]. The result carries the error the
    /// peripheral detected, if any.
    fn on_read_complete(&self, result: Result<(), DeviceError>);
}

/// Write-side interrupt callbacks, implemented by the driver's write engine.
///
/// The device fires both methods in interrupt context only.
pub trait TxListener: Sync {
    /// There is room for at least one word to be written.
    ///
    /// The listener performs repeated [`CharDevice::can_write`] and
    /// [`CharDevice::write`] calls until `can_write` returns `false`.
    fn on_can_write(&self);

    /// The armed write operation finished and write interrupts are disabled.
    fn on_write_complete(&self, result: Result<(), DeviceError>);
}

/// Platform-specific character device (peripheral) control object, such as
/// a UART.
///
/// The lifetime parameter bounds the registered listeners: a device value
/// must not outlive `'a`, which makes the listener registration sound
/// without heap allocation.
///
/// # Contract
///
/// * `set_rx_listener` / `set_tx_listener` are called in event loop context
///   when the driver is bound and unbound. The installed listeners are fired
///   in interrupt context.
/// * `start_read(n, ..)` arms the peripheral: read interrupts stay enabled
///   until `n` words have been transferred, then the device disables them
///   and fires [`RxListener::on_read_complete`]. Arming happens from event
///   loop context for a fresh request and from interrupt context when the
///   driver chains the next pending request inside a completion.
/// * `start_write(n, ..)` is the write dual; it is only called from event
///   loop context.
/// * `cancel_read` disarms the peripheral. It returns `true` iff a pending
///   operation was truly cancelled, i.e. the completion interrupt will NOT
///   fire. Cancellation from interrupt context happens only when a
///   read-until request short-circuits.
/// * `cancel_write` is the write dual; event loop context only.
/// * `can_read` / `can_write` report word-level readiness and may be queried
///   repeatedly within one interrupt.
/// * `read` / `write` transfer a single word. Precondition: the matching
///   `can_*` returned `true`.
pub trait CharDevice<'a> {
    /// Transfer unit of the peripheral.
    type Word: Copy + Send;

    /// Installs or clears the read-side interrupt callbacks.
    fn set_rx_listener(&self, listener: Option<&'a (dyn RxListener + 'a)>);

    /// Installs or clears the write-side interrupt callbacks.
    fn set_tx_listener(&self, listener: Option<&'a (dyn TxListener + 'a)>);

    /// Arms a read of `len` words.
    fn start_read<C: Context>(&self, len: usize, cx: C);

    /// Disarms the current read operation.
    ///
    /// Returns `true` iff the completion interrupt will not fire.
    fn cancel_read<C: Context>(&self, cx: C) -> bool;

    /// Whether at least one word can be read.
    fn can_read(&self, cx: InterruptCtx) -> bool;

    /// Reads one word. Precondition: `can_read` returned `true`.
    fn read(&self, cx: InterruptCtx) -> Self::Word;

    /// Arms a write of `len` words.
    fn start_write(&self, len: usize, cx: EventLoopCtx);

    /// Disarms the current write operation.
    ///
    /// Returns `true` iff the completion interrupt will not fire.
    fn cancel_write(&self, cx: EventLoopCtx) -> bool;

    /// Whether there is room for at least one word.
    fn can_write(&self, cx: InterruptCtx) -> bool;

    /// Writes one word. Precondition: `can_write` returned `true`.
    fn write(&self, word: Self::Word, cx: InterruptCtx);
}
