use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread_local;

use crate::host::HostTree;
use crate::platform::RuntimeScheduler;
use crate::registry::Registry;
use crate::NodeId;

pub(crate) type DeferredTask = Box<dyn FnOnce() + 'static>;

pub(crate) struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    host: RefCell<Option<Rc<RefCell<dyn HostTree>>>>,
    registry: Registry,
    deferred: RefCell<VecDeque<DeferredTask>>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            scheduler,
            host: RefCell::new(None),
            registry: Registry::default(),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn host(&self) -> Option<Rc<RefCell<dyn HostTree>>> {
        self.host.borrow().clone()
    }

    pub(crate) fn host_available(&self) -> bool {
        self.host.borrow().is_some()
    }

    pub(crate) fn enqueue_deferred(&self, task: DeferredTask) {
        self.deferred.borrow_mut().push_back(task);
        self.scheduler.schedule();
    }

    fn drain_deferred(&self) {
        // Snapshot the queue so tasks enqueued while draining wait for the
        // next tick instead of extending this one.
        let mut tasks: Vec<DeferredTask> = {
            let mut deferred = self.deferred.borrow_mut();
            deferred.drain(..).collect()
        };
        for task in tasks.drain(..) {
            task();
        }
    }

    fn has_deferred(&self) -> bool {
        !self.deferred.borrow().is_empty()
    }
}

/// Owns the hook store, instance tracking maps and the deferred task queue.
///
/// Entries are inserted by render cycles and removed only by the cleanup
/// cascade; dropping the `Runtime` drops all of them at once.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Creates a headless runtime. Install a host tree with
    /// [`Runtime::install_host`] to enable patching, containment tracking
    /// and the cleanup cascade.
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(scheduler)),
        }
    }

    pub fn install_host(&self, host: Rc<RefCell<dyn HostTree>>) {
        *self.inner.host.borrow_mut() = Some(host);
    }

    pub fn host_available(&self) -> bool {
        self.inner.host_available()
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    /// Makes this runtime the ambient one for component instantiation on
    /// the current thread until the returned guard is dropped.
    pub fn enter(&self) -> RuntimeActivation {
        push_active_runtime(&self.handle());
        RuntimeActivation { _priv: () }
    }

    pub fn drain_deferred(&self) {
        self.inner.drain_deferred();
    }

    pub fn has_deferred(&self) -> bool {
        self.inner.has_deferred()
    }

    /// Root node of `key` if the instance is tracked and not vacated.
    pub fn live_root(&self, key: &str) -> Option<NodeId> {
        self.inner.registry.live_root(key)
    }

    /// `None` if `key` is untracked or purged, `Some(None)` if vacated,
    /// `Some(Some(node))` if live.
    pub fn root_slot(&self, key: &str) -> Option<Option<NodeId>> {
        self.inner.registry.root_slot(key)
    }

    /// Number of hook store entries currently owned by `key`.
    pub fn hook_count(&self, key: &str) -> usize {
        self.inner.registry.hook_count(key)
    }

    /// Instance keys discovered as contained in `key`'s rendered output.
    pub fn contained_keys(&self, key: &str) -> Vec<String> {
        self.inner.registry.contained_keys(key)
    }

    /// Whether `key`'s root was found inside another live instance's output
    /// during the last containment scan.
    pub fn has_parent(&self, key: &str) -> bool {
        self.inner.registry.is_has_parent(key)
    }

    /// Instance key that first claimed `node` as its rendered root.
    pub fn node_owner(&self, node: NodeId) -> Option<String> {
        self.inner
            .registry
            .owner_of(node)
            .map(|key| key.as_ref().to_owned())
    }
}

#[derive(Clone)]
pub struct RuntimeHandle(pub(crate) Weak<RuntimeInner>);

impl RuntimeHandle {
    pub(crate) fn upgrade(&self) -> Option<Rc<RuntimeInner>> {
        self.0.upgrade()
    }

    pub fn spawn_deferred(&self, task: impl FnOnce() + 'static) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_deferred(Box::new(task));
        } else {
            task();
        }
    }

    pub fn drain_deferred(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.drain_deferred();
        }
    }

    pub fn has_deferred(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.has_deferred())
            .unwrap_or(false)
    }

    pub fn host_available(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| inner.host_available())
            .unwrap_or(false)
    }
}

/// Scheduler that drops schedule requests on the floor. Useful when the
/// driver polls [`Runtime::has_deferred`] itself.
#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule(&self) {}
}

#[cfg(test)]
#[derive(Default)]
pub struct TestScheduler;

#[cfg(test)]
impl RuntimeScheduler for TestScheduler {
    fn schedule(&self) {}
}

thread_local! {
    static ACTIVE_RUNTIMES: RefCell<Vec<RuntimeHandle>> = RefCell::new(Vec::new());
    static LAST_RUNTIME: RefCell<Option<RuntimeHandle>> = RefCell::new(None);
}

pub(crate) fn current_runtime_handle() -> Option<RuntimeHandle> {
    if let Some(handle) = ACTIVE_RUNTIMES.with(|stack| stack.borrow().last().cloned()) {
        return Some(handle);
    }
    LAST_RUNTIME.with(|slot| slot.borrow().clone())
}

fn push_active_runtime(handle: &RuntimeHandle) {
    ACTIVE_RUNTIMES.with(|stack| stack.borrow_mut().push(handle.clone()));
    LAST_RUNTIME.with(|slot| *slot.borrow_mut() = Some(handle.clone()));
}

fn pop_active_runtime() {
    ACTIVE_RUNTIMES.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// Guard returned by [`Runtime::enter`]; deactivates the runtime on drop.
/// The most recently entered runtime stays reachable as a fallback so event
/// handlers fired after the guard drops can still reach it.
pub struct RuntimeActivation {
    _priv: (),
}

impl Drop for RuntimeActivation {
    fn drop(&mut self) {
        pop_active_runtime();
    }
}
