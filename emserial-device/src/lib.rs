//! Emserial device interface
//!
//! The crate defines the interface between a platform-specific character
//! device (peripheral) control object and the Emserial driver core.
//! Limited scope facilitates compatibility across versions. Peripheral
//! crates should depend on this crate. Emserial driver users should depend
//! on the `emserial` crate instead.
//!
//! The driver core consumes two collaborators:
//! * [`CharDevice`] wraps the platform peripheral (e.g. a UART). It arms and
//!   disarms transfers in event loop context and performs single-word
//!   transfers in interrupt context.
//! * [`EventLoop`] executes completion callbacks in thread context. The
//!   driver posts exactly one callback per accepted request, never invoking
//!   a handler inline.
//!
//! The driver registers an [`RxListener`] and a [`TxListener`] with the
//! device. The device fires them from its interrupt service routines; the
//! listener methods drain or fill the peripheral one word at a time through
//! the interrupt-context device methods.
//!
//! Unlike blocking serial interfaces, the device never moves more than one
//! word per call and never buffers on behalf of the driver. All batching
//! comes from the listener loops running inside a single interrupt entry.
#![no_std]

mod device;
mod exec;

pub use emserial_core::DeviceError;

pub use device::{CharDevice, RxListener, TxListener};
pub use exec::EventLoop;
