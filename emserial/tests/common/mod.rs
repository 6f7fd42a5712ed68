//! Shared test doubles: a scripted character device and an event loop that
//! collects posted tasks.
#![allow(dead_code)]

use core::cell::RefCell;
use std::boxed::Box;
use std::collections::VecDeque;
use std::vec::Vec;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use emserial::until::MatchByte;
use emserial::{
    CharDevice, Context, DeviceError, EventLoop, EventLoopCtx, InterruptCtx, Port, RxListener,
    Serial, Status, TxListener, rx, tx,
};

/// Completion handler storage used by all test drivers.
pub type Handler = Box<dyn FnOnce(Status, usize) + Send>;

pub type Dev = ScriptedDevice<'static>;
pub type RxSingle = rx::Single<'static, Dev, TestLoop, Handler, MatchByte<u8>>;
pub type RxQueued<const N: usize> = rx::Queued<'static, Dev, TestLoop, Handler, MatchByte<u8>, N>;
pub type TxSingle = tx::Single<'static, Dev, TestLoop, Handler>;

pub type SingleSerial = Serial<'static, Dev, TestLoop, RxSingle, TxSingle>;
pub type QueuedSerial<const N: usize> = Serial<'static, Dev, TestLoop, RxQueued<N>, TxSingle>;
pub type SinglePort = Port<'static, Dev, TestLoop, RxSingle, TxSingle>;
pub type QueuedPort<const N: usize> = Port<'static, Dev, TestLoop, RxQueued<N>, TxSingle>;

pub fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

/// Leaks a fresh device, event loop and single-slot driver and attaches it.
pub fn bind_single() -> (&'static Dev, &'static TestLoop, SinglePort) {
    let dev: &'static Dev = leak(ScriptedDevice::new());
    let exec: &'static TestLoop = leak(TestLoop::new());
    let serial = leak(SingleSerial::new(dev, exec));
    let port = serial.attach();
    (dev, exec, port)
}

/// Leaks a fresh device, event loop and queued driver and attaches it.
pub fn bind_queued<const N: usize>() -> (&'static Dev, &'static TestLoop, QueuedPort<N>) {
    let dev: &'static Dev = leak(ScriptedDevice::new());
    let exec: &'static TestLoop = leak(TestLoop::new());
    let serial = leak(QueuedSerial::<N>::new(dev, exec));
    let port = serial.attach();
    (dev, exec, port)
}

/// Records completion handler invocations.
pub struct CallLog {
    calls: Mutex<CriticalSectionRawMutex, RefCell<Vec<(Status, usize)>>>,
}

impl CallLog {
    pub fn new() -> &'static Self {
        leak(Self {
            calls: Mutex::new(RefCell::new(Vec::new())),
        })
    }

    pub fn handler(&'static self) -> Handler {
        Box::new(move |status, transferred| {
            self.calls
                .lock(|cell| cell.borrow_mut().push((status, transferred)));
        })
    }

    pub fn calls(&self) -> Vec<(Status, usize)> {
        self.calls.lock(|cell| cell.borrow().clone())
    }
}

/// Device interactions recorded by [`ScriptedDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCall {
    StartRead { len: usize, in_isr: bool },
    CancelRead { in_isr: bool, cancelled: bool },
    StartWrite { len: usize },
    CancelWrite { cancelled: bool },
}

struct DeviceState<'a> {
    rx_listener: Option<&'a dyn RxListener>,
    tx_listener: Option<&'a dyn TxListener>,
    /// Words the wire will yield, in order.
    rx_fifo: VecDeque<u8>,
    /// Remaining length of the armed read; `Some(0)` means the completion
    /// interrupt is imminent.
    rx_armed: Option<usize>,
    /// Words accepted for transmission.
    tx_sink: Vec<u8>,
    /// Remaining length of the armed write.
    tx_armed: Option<usize>,
    /// Transmit FIFO slots currently free.
    tx_room: usize,
    log: Vec<DeviceCall>,
}

enum Step<'a> {
    CanRead(&'a dyn RxListener),
    ReadComplete(&'a dyn RxListener),
    CanWrite(&'a dyn TxListener),
    WriteComplete(&'a dyn TxListener),
    Idle,
}

/// A character device driven by the test script instead of hardware.
///
/// `start_*` only arms the device; interrupt delivery is simulated by the
/// pump methods, which the test (or a feeding method) invokes in place of
/// the hardware interrupt controller.
pub struct ScriptedDevice<'a> {
    state: Mutex<CriticalSectionRawMutex, RefCell<DeviceState<'a>>>,
}

impl<'a> ScriptedDevice<'a> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(DeviceState {
                rx_listener: None,
                tx_listener: None,
                rx_fifo: VecDeque::new(),
                rx_armed: None,
                tx_sink: Vec::new(),
                tx_armed: None,
                tx_room: 0,
                log: Vec::new(),
            })),
        }
    }

    /// Puts words on the wire and delivers the resulting interrupts.
    pub fn feed(&self, words: &[u8]) {
        self.state
            .lock(|cell| cell.borrow_mut().rx_fifo.extend(words.iter().copied()));
        self.pump_rx();
    }

    /// Delivers pending read interrupts until the device goes idle.
    pub fn pump_rx(&self) {
        loop {
            let step = self.state.lock(|cell| {
                let mut state = cell.borrow_mut();
                match (state.rx_listener, state.rx_armed) {
                    (Some(listener), Some(0)) => {
                        // Completion disables read interrupts first.
                        state.rx_armed = None;
                        Step::ReadComplete(listener)
                    }
                    (Some(listener), Some(_)) if !state.rx_fifo.is_empty() => {
                        Step::CanRead(listener)
                    }
                    _ => Step::Idle,
                }
            });
            match step {
                Step::CanRead(listener) => listener.on_can_read(),
                Step::ReadComplete(listener) => listener.on_read_complete(Ok(())),
                _ => break,
            }
        }
    }

    /// Completes the armed read with a device error.
    pub fn fail_read(&self, err: DeviceError) {
        let listener = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            assert!(state.rx_armed.take().is_some(), "no read armed");
            state.rx_listener.expect("no read listener")
        });
        listener.on_read_complete(Err(err));
    }

    /// Frees transmit FIFO slots and delivers the resulting interrupts.
    pub fn grant_tx_room(&self, slots: usize) {
        self.state.lock(|cell| cell.borrow_mut().tx_room += slots);
        self.pump_tx();
    }

    /// Delivers pending write interrupts until the device goes idle.
    pub fn pump_tx(&self) {
        loop {
            let step = self.state.lock(|cell| {
                let mut state = cell.borrow_mut();
                match (state.tx_listener, state.tx_armed) {
                    (Some(listener), Some(0)) => {
                        state.tx_armed = None;
                        Step::WriteComplete(listener)
                    }
                    (Some(listener), Some(_)) if state.tx_room > 0 => Step::CanWrite(listener),
                    _ => Step::Idle,
                }
            });
            match step {
                Step::CanWrite(listener) => listener.on_can_write(),
                Step::WriteComplete(listener) => listener.on_write_complete(Ok(())),
                _ => break,
            }
        }
    }

    /// Completes the armed write with a device error.
    pub fn fail_write(&self, err: DeviceError) {
        let listener = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            assert!(state.tx_armed.take().is_some(), "no write armed");
            state.tx_listener.expect("no write listener")
        });
        listener.on_write_complete(Err(err));
    }

    pub fn rx_listener_installed(&self) -> bool {
        self.state.lock(|cell| cell.borrow().rx_listener.is_some())
    }

    pub fn tx_listener_installed(&self) -> bool {
        self.state.lock(|cell| cell.borrow().tx_listener.is_some())
    }

    /// Words still on the wire, never read by the driver.
    pub fn unread(&self) -> usize {
        self.state.lock(|cell| cell.borrow().rx_fifo.len())
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock(|cell| cell.borrow().tx_sink.clone())
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock(|cell| cell.borrow().log.clone())
    }
}

impl<'a> CharDevice<'a> for ScriptedDevice<'a> {
    type Word = u8;

    fn set_rx_listener(&self, listener: Option<&'a (dyn RxListener + 'a)>) {
        self.state.lock(|cell| cell.borrow_mut().rx_listener = listener);
    }

    fn set_tx_listener(&self, listener: Option<&'a (dyn TxListener + 'a)>) {
        self.state.lock(|cell| cell.borrow_mut().tx_listener = listener);
    }

    fn start_read<C: Context>(&self, len: usize, _cx: C) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            assert!(state.rx_armed.is_none(), "start_read while armed");
            assert!(len > 0, "zero length read armed");
            state.rx_armed = Some(len);
            state.log.push(DeviceCall::StartRead {
                len,
                in_isr: C::IN_ISR,
            });
        });
    }

    fn cancel_read<C: Context>(&self, _cx: C) -> bool {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let cancelled = match state.rx_armed {
                // A fully transferred operation is past the point of no
                // return: its completion interrupt is imminent.
                Some(remaining) if remaining > 0 => {
                    state.rx_armed = None;
                    true
                }
                _ => false,
            };
            state.log.push(DeviceCall::CancelRead {
                in_isr: C::IN_ISR,
                cancelled,
            });
            cancelled
        })
    }

    fn can_read(&self, _cx: InterruptCtx) -> bool {
        self.state.lock(|cell| {
            let state = cell.borrow();
            matches!(state.rx_armed, Some(remaining) if remaining > 0) && !state.rx_fifo.is_empty()
        })
    }

    fn read(&self, _cx: InterruptCtx) -> u8 {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let remaining = state.rx_armed.expect("read while not armed");
            assert!(remaining > 0, "read past the armed length");
            state.rx_armed = Some(remaining - 1);
            state.rx_fifo.pop_front().expect("read from an empty wire")
        })
    }

    fn start_write(&self, len: usize, _cx: EventLoopCtx) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            assert!(state.tx_armed.is_none(), "start_write while armed");
            assert!(len > 0, "zero length write armed");
            state.tx_armed = Some(len);
            state.log.push(DeviceCall::StartWrite { len });
        });
    }

    fn cancel_write(&self, _cx: EventLoopCtx) -> bool {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let cancelled = match state.tx_armed {
                Some(remaining) if remaining > 0 => {
                    state.tx_armed = None;
                    true
                }
                _ => false,
            };
            state.log.push(DeviceCall::CancelWrite { cancelled });
            cancelled
        })
    }

    fn can_write(&self, _cx: InterruptCtx) -> bool {
        self.state.lock(|cell| {
            let state = cell.borrow();
            matches!(state.tx_armed, Some(remaining) if remaining > 0) && state.tx_room > 0
        })
    }

    fn write(&self, word: u8, _cx: InterruptCtx) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let remaining = state.tx_armed.expect("write while not armed");
            assert!(remaining > 0, "write past the armed length");
            assert!(state.tx_room > 0, "write without room");
            state.tx_armed = Some(remaining - 1);
            state.tx_room -= 1;
            state.tx_sink.push(word);
        });
    }
}

type Task = (Box<dyn FnOnce() + Send>, bool);

/// Event loop double: collects posted tasks and runs them on demand.
pub struct TestLoop {
    tasks: Mutex<CriticalSectionRawMutex, RefCell<VecDeque<Task>>>,
}

impl TestLoop {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Number of tasks posted and not yet run.
    pub fn pending(&self) -> usize {
        self.tasks.lock(|cell| cell.borrow().len())
    }

    /// Whether the next pending task was posted from interrupt context.
    pub fn next_from_isr(&self) -> Option<bool> {
        self.tasks
            .lock(|cell| cell.borrow().front().map(|(_, from_isr)| *from_isr))
    }

    /// Runs all pending tasks; returns how many ran.
    pub fn run(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.tasks.lock(|cell| cell.borrow_mut().pop_front());
            match task {
                Some((task, _)) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl EventLoop for TestLoop {
    fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tasks
            .lock(|cell| cell.borrow_mut().push_back((Box::new(task), false)));
        true
    }

    fn post_from_isr<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tasks
            .lock(|cell| cell.borrow_mut().push_back((Box::new(task), true)));
        true
    }
}
