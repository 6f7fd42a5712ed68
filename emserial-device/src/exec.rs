//! Event loop contract

/// Cooperative scheduler executing posted tasks in thread context.
///
/// The driver posts one nullary task per completed request. Both methods
/// return `true` on success; the driver treats a failed post as a fatal
/// precondition violation, so the loop's run queue must be sized by the
/// application to never overflow.
///
/// Implementations must synchronize the two entry points internally:
/// `post_from_isr` may preempt a concurrent `post`.
pub trait EventLoop {
    /// Enqueues a task from thread context.
    fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static;

    /// Enqueues a task from interrupt context.
    fn post_from_isr<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static;
}
