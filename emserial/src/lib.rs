//! # Emserial
//!
//! This library provides an asynchronous request/completion API for character
//! devices (e.g. UART/RS-232 peripherals) in no_std environments. It uses
//! caller-provided buffers and inline handler storage, requiring no dynamic
//! memory allocation.
//!
//! The library targets bare-metal systems where completion callbacks run on a
//! cooperative event loop while byte transfers happen inside the peripheral's
//! interrupt service routines.
//!
//! ## Architecture
//!
//! ```text
//!  thread context           │            interrupt context
//!                           │
//!  ┌──────┐  requests  ┌────┴─────┐  word transfers  ┌────────────┐
//!  │ Port ├───────────►│ RX / TX  │◄────────────────►│ CharDevice │
//!  └──┬───┘            │ engines  │   ISR callbacks  └────────────┘
//!     │                └────┬─────┘
//!     │ completions         │ posted handlers
//!     ▼                     ▼
//!  ┌─────────────────────────────┐
//!  │          EventLoop          │
//!  └─────────────────────────────┘
//! ```
//!
//! Components:
//! * _Serial_ owns the two transfer engines over one device and one event
//!   loop. [`Serial::attach`] installs the device's interrupt callbacks and
//!   produces a [`Port`].
//! * _Port_ is the operation handle: [`Port::read`], [`Port::read_until`],
//!   [`Port::write`] and the matching cancellations. Dropping it detaches
//!   the interrupt callbacks.
//! * _Engines_ ([`rx`], [`tx`]) keep the per-direction request state. The
//!   read side exists in three structurally different variants selected at
//!   compile time: disabled, single slot, and a bounded FIFO of pending
//!   requests. The write side offers disabled and single slot.
//! * _Predicates_ ([`until`]) terminate a read early when a received word
//!   matches. The facility can be compiled out entirely with
//!   [`until::Never`].
//!
//! Every accepted request completes with exactly one handler invocation,
//! posted to the event loop; handlers are never called inline from the
//! public API or from interrupt context.
//!
//! ## Concurrency model
//!
//! Engine state is shared between the event loop and the interrupt handlers
//! behind a `CriticalSectionRawMutex` blocking mutex, so every state access
//! is a short interrupt-masked critical section. Interrupt entries for one
//! peripheral are assumed serialized; the event loop is assumed cooperative
//! (no preemption between callbacks). There are no other locks and no
//! allocation on any path.
//!
//! ## Limitations
//!
//! * No framing, flow control or line discipline; the driver moves raw words.
//! * No buffering beyond the caller's buffer.
//! * One driver per device: binding a second driver replaces the first
//!   driver's interrupt callbacks.
#![no_std]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod request;
pub mod rx;
mod serial;
pub mod tx;
pub mod until;

pub use emserial_core::{Context, DeviceError, Error, EventLoopCtx, InterruptCtx, Status};
pub use emserial_device::{CharDevice, EventLoop, RxListener, TxListener};
pub use serial::{DefaultSerial, Port, Serial};
