//! Platform abstraction for runtime scheduling.
//!
//! The runtime defers cleanup work by one scheduling tick. It owns the FIFO
//! queue itself; the scheduler is only pinged so the host environment knows
//! to drain the queue once the current synchronous execution completes.

/// Notifies the host platform that deferred runtime work is pending.
///
/// Implementations must be safe to use from multiple threads. Draining
/// itself happens on the thread that drives the runtime, via
/// [`crate::RuntimeHandle::drain_deferred`].
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host drain deferred work after the current
    /// synchronous execution completes.
    fn schedule(&self);
}
