//! Testing utilities and harness for Strand.
//!
//! [`TestHarness`] bundles a runtime, an in-memory host tree and an
//! activation guard so a test can instantiate components immediately, then
//! flush deferred cleanup with [`TestHarness::flush`] instead of wiring a
//! scheduler to an event loop.

use std::cell::RefCell;
use std::rc::Rc;

use strand_core::{MemoryHost, Runtime, RuntimeActivation};
use strand_runtime_std::StdRuntime;

pub struct TestHarness {
    std_runtime: StdRuntime,
    runtime: Runtime,
    host: Option<Rc<RefCell<MemoryHost>>>,
    _activation: RuntimeActivation,
}

impl TestHarness {
    /// Harness with an in-memory host tree installed: patching, containment
    /// tracking and the cleanup cascade are all live.
    pub fn new() -> Self {
        let std_runtime = StdRuntime::new();
        let runtime = std_runtime.runtime();
        let host = Rc::new(RefCell::new(MemoryHost::new()));
        runtime.install_host(host.clone());
        let activation = runtime.enter();
        Self {
            std_runtime,
            runtime,
            host: Some(host),
            _activation: activation,
        }
    }

    /// Harness without a host tree: hooks work, nothing is tracked.
    pub fn headless() -> Self {
        let std_runtime = StdRuntime::new();
        let runtime = std_runtime.runtime();
        let activation = runtime.enter();
        Self {
            std_runtime,
            runtime,
            host: None,
            _activation: activation,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// The in-memory host, if one is installed.
    pub fn host(&self) -> Rc<RefCell<MemoryHost>> {
        self.host
            .clone()
            .expect("headless harness has no host tree")
    }

    /// Whether the runtime asked for a tick since the last poll.
    pub fn take_tick_request(&self) -> bool {
        self.std_runtime.take_tick_request()
    }

    /// Drains deferred work until the queue stays empty.
    pub fn flush(&self) {
        while self.runtime.has_deferred() {
            self.runtime.drain_deferred();
        }
        self.std_runtime.take_tick_request();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
