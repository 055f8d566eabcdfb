//! Core runtime for hook-based components over a mutable host tree.
//!
//! A component is a plain function of its capability [`Scope`]: it reads
//! `props`, allocates per-instance state with `update`, runs memoized
//! effects with `execute`, registers teardown with `cleanup`, and returns a
//! host node (or nothing). Instances are identified by a caller-supplied
//! key fragment plus a per-definition counter, which is what makes a
//! repeated call with the same fragment a re-render of the same instance
//! instead of a new one.
//!
//! After every non-empty render with a host tree installed, the runtime
//! re-derives which other instances' roots now live inside the rendered
//! output. That containment relation is what lets an ancestor's empty
//! render cascade cleanup through descendants whose instantiators were
//! never called again. The cascade is always deferred by one tick of the
//! runtime's task queue so the empty result reaches the caller first.

pub mod collections;
pub mod hash;
pub mod host;
pub mod platform;
pub mod registry;
pub mod runtime;

pub use host::{HostError, HostTree, MemoryHost};
pub use platform::RuntimeScheduler;
pub use registry::{HookAddress, HookKind, InstanceKey};
pub use runtime::{DefaultScheduler, Runtime, RuntimeActivation, RuntimeHandle};

#[cfg(test)]
pub use runtime::TestScheduler;

use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use collections::map::HashSet;
use registry::CleanupFn;
use runtime::current_runtime_handle;

/// Identity of a host-tree node, assigned by the host collaborator.
pub type NodeId = usize;

static NEXT_DEFINITION_ID: AtomicUsize = AtomicUsize::new(1);

fn next_definition_key() -> Rc<str> {
    let id = NEXT_DEFINITION_ID.fetch_add(1, Ordering::Relaxed);
    format!("__{id}__").into()
}

type RenderFn<P> = dyn Fn(&Scope<P>) -> Option<NodeId>;
type HostRefFn = Box<dyn FnOnce(Option<NodeId>, Option<NodeId>)>;

/// Shared environment of one instantiator call. State writers capture it so
/// a write can re-render the instance with the props of the call that
/// produced the writer.
struct CallEnv<P> {
    runtime: RuntimeHandle,
    key: Rc<str>,
    props: P,
    render: Rc<RenderFn<P>>,
    element: Cell<Option<NodeId>>,
    cleanup: RefCell<Option<CleanupFn>>,
    hook_addresses: RefCell<HashSet<HookAddress>>,
}

/// Capability surface handed to a render function for one render pass.
///
/// The hook ordinal counter lives here and resets to zero per pass, so
/// `update` and `execute` must be called unconditionally in the same order
/// on every render of an instance.
pub struct Scope<P> {
    env: Rc<CallEnv<P>>,
    ordinal: Cell<usize>,
    host_ref: RefCell<Option<HostRefFn>>,
}

impl<P: 'static> Scope<P> {
    /// The instance key of this render.
    pub fn key(&self) -> &str {
        &self.env.key
    }

    pub fn props(&self) -> &P {
        &self.env.props
    }

    fn next_address(&self, kind: HookKind) -> HookAddress {
        let ordinal = self.ordinal.get();
        self.ordinal.set(ordinal + 1);
        let address = HookAddress {
            kind,
            instance: Rc::clone(&self.env.key),
            ordinal,
        };
        self.env
            .hook_addresses
            .borrow_mut()
            .insert(address.clone());
        address
    }

    /// Allocates (or rejoins) a state slot seeded with `initial` and returns
    /// its read/write pair. Writing re-renders the instance synchronously.
    pub fn update<T: Clone + 'static>(&self, initial: T) -> (StateReader<T>, StateWriter<T, P>) {
        let address = self.next_address(HookKind::Update);
        if let Some(inner) = self.env.runtime.upgrade() {
            inner.registry().seed_state(address.clone(), Rc::new(initial));
        }
        (
            StateReader {
                runtime: self.env.runtime.clone(),
                address: address.clone(),
                _value: PhantomData,
            },
            StateWriter {
                env: Rc::clone(&self.env),
                address,
                _value: PhantomData,
            },
        )
    }

    /// Runs `callback` when the structural fingerprint of `deps` differs
    /// from the one stored on the previous render (or when nothing was
    /// stored yet). The new fingerprint is stored either way.
    pub fn execute<D: Hash>(&self, deps: D, callback: impl FnOnce(&D)) {
        let address = self.next_address(HookKind::Execute);
        let fingerprint = hash::hash_one(&deps);
        let inner = self.env.runtime.upgrade();
        let should_run = match inner.as_ref().and_then(|i| i.registry().deps(&address)) {
            Some(Some(previous)) => previous != fingerprint,
            _ => true,
        };
        if let Some(inner) = inner {
            inner.registry().store_deps(address, Some(fingerprint));
        }
        if should_run {
            callback(&deps);
        }
    }

    /// Dependency-free variant of [`Scope::execute`]: runs on every render.
    pub fn execute_always(&self, callback: impl FnOnce()) {
        let address = self.next_address(HookKind::Execute);
        if let Some(inner) = self.env.runtime.upgrade() {
            inner.registry().store_deps(address, None);
        }
        callback();
    }

    /// Registers teardown for this instance. Only the most recent
    /// registration is retained; it receives the last rendered node when
    /// the instance unmounts.
    pub fn cleanup(&self, callback: impl Fn(NodeId) + 'static) {
        *self.env.cleanup.borrow_mut() = Some(Rc::new(callback));
    }

    /// Escape hatch for imperative host-node access: `callback` is invoked
    /// after this render pass with the new node and the previously recorded
    /// one.
    pub fn host_ref(&self, callback: impl FnOnce(Option<NodeId>, Option<NodeId>) + 'static) {
        *self.host_ref.borrow_mut() = Some(Box::new(callback));
    }
}

/// Read half of a state slot. Always echoes the latest stored value,
/// including writes made earlier in the same render pass.
pub struct StateReader<T> {
    runtime: RuntimeHandle,
    address: HookAddress,
    _value: PhantomData<T>,
}

impl<T> Clone for StateReader<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            address: self.address.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: Clone + 'static> StateReader<T> {
    pub fn get(&self) -> T {
        let inner = self
            .runtime
            .upgrade()
            .expect("state read after its runtime was dropped");
        let value = inner
            .registry()
            .state(&self.address)
            .expect("state hook entry missing; was the instance unmounted?");
        value
            .downcast_ref::<T>()
            .cloned()
            .expect("state hook entry holds a different type; hook order must be stable")
    }
}

/// Write half of a state slot.
pub struct StateWriter<T, P> {
    env: Rc<CallEnv<P>>,
    address: HookAddress,
    _value: PhantomData<fn(T)>,
}

impl<T, P> Clone for StateWriter<T, P> {
    fn clone(&self) -> Self {
        Self {
            env: Rc::clone(&self.env),
            address: self.address.clone(),
            _value: PhantomData,
        }
    }
}

impl<T: 'static, P: 'static> StateWriter<T, P> {
    /// Stores `value` unconditionally, then synchronously re-renders the
    /// owning instance. With a host tree installed and a previous node on
    /// record, the previous output is patched in place and the patch result
    /// adopted as current. Nested writes complete innermost-first, as a
    /// strict call stack.
    pub fn set(&self, value: T) {
        let Some(inner) = self.env.runtime.upgrade() else {
            return;
        };
        inner
            .registry()
            .put_state(self.address.clone(), Rc::new(value));
        let new_node = render_pass(&self.env);
        let adopted = match (inner.host(), self.env.element.get(), new_node) {
            (Some(host), Some(old), Some(new)) => Some(host.borrow_mut().patch(old, new)),
            _ => new_node,
        };
        self.env.element.set(adopted);
    }
}

/// A component definition: a render function plus its definition key.
///
/// Every `component()` call consumes one value of the process-wide
/// definition counter; all instances of the definition embed it in their
/// instance keys, so sibling instances only collide when the caller reuses
/// a key fragment on purpose.
pub struct Component<P> {
    definition_key: Rc<str>,
    render: Rc<RenderFn<P>>,
}

impl<P> Clone for Component<P> {
    fn clone(&self) -> Self {
        Self {
            definition_key: Rc::clone(&self.definition_key),
            render: Rc::clone(&self.render),
        }
    }
}

/// Declares a component from a render function.
pub fn component<P: 'static>(
    render: impl Fn(&Scope<P>) -> Option<NodeId> + 'static,
) -> Component<P> {
    Component {
        definition_key: next_definition_key(),
        render: Rc::new(render),
    }
}

impl<P: 'static> Component<P> {
    /// Instantiates (or re-renders) the anonymous instance of this
    /// definition.
    pub fn call(&self, props: P) -> Option<NodeId> {
        self.instantiate(None, props)
    }

    /// Instantiates (or re-renders) the instance addressed by `fragment`.
    pub fn call_keyed(&self, fragment: impl AsRef<str>, props: P) -> Option<NodeId> {
        self.instantiate(Some(fragment.as_ref()), props)
    }

    pub fn definition_key(&self) -> &str {
        &self.definition_key
    }

    fn instantiate(&self, fragment: Option<&str>, props: P) -> Option<NodeId> {
        let runtime = current_runtime_handle()
            .expect("no active runtime; create a Runtime and call enter() first");
        let key: Rc<str> = match fragment {
            Some(fragment) if !fragment.is_empty() => {
                format!("{fragment}{}", self.definition_key).into()
            }
            _ => Rc::clone(&self.definition_key),
        };
        let env = Rc::new(CallEnv {
            runtime,
            key,
            props,
            render: Rc::clone(&self.render),
            element: Cell::new(None),
            cleanup: RefCell::new(None),
            hook_addresses: RefCell::new(HashSet::new()),
        });
        let node = render_pass(&env);
        env.element.set(node);
        node
    }
}

/// One render cycle: run the render function with a fresh ordinal counter,
/// fire the ref callback, then (with a host tree installed) tag the
/// output, re-derive containment and record the instance. An output that
/// just became empty enqueues the deferred cleanup cascade instead.
fn render_pass<P: 'static>(env: &Rc<CallEnv<P>>) -> Option<NodeId> {
    let scope = Scope {
        env: Rc::clone(env),
        ordinal: Cell::new(0),
        host_ref: RefCell::new(None),
    };
    log::trace!("render pass for {}", env.key);
    let new_node = (env.render)(&scope);

    let Some(inner) = env.runtime.upgrade() else {
        return new_node;
    };

    let previous = inner.registry().live_root(&env.key);
    if let Some(host_ref) = scope.host_ref.borrow_mut().take() {
        host_ref(new_node, previous);
    }

    if let Some(host) = inner.host() {
        if let Some(node) = new_node {
            let registry = inner.registry();
            registry.claim_node(node, Rc::clone(&env.key));
            registry.update_containment(&*host.borrow(), &env.key, node);
            registry.record_render(
                Rc::clone(&env.key),
                node,
                env.hook_addresses.borrow().clone(),
                env.cleanup.borrow().clone(),
            );
        } else if previous.is_some() {
            let env = Rc::clone(env);
            inner.enqueue_deferred(Box::new(move || unmount(&env)));
        }
    }
    new_node
}

/// Deferred unmount entry point: run the cascade, then drop this call
/// environment's own cleanup and node references unconditionally.
fn unmount<P: 'static>(env: &Rc<CallEnv<P>>) {
    if let Some(inner) = env.runtime.upgrade() {
        inner.registry().run_cascade(&env.key);
    }
    env.cleanup.borrow_mut().take();
    env.element.set(None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::Arc;

    fn host_runtime() -> (Runtime, Rc<RefCell<MemoryHost>>) {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let host = Rc::new(RefCell::new(MemoryHost::new()));
        runtime.install_host(host.clone());
        (runtime, host)
    }

    fn flush(runtime: &Runtime) {
        while runtime.has_deferred() {
            runtime.drain_deferred();
        }
    }

    fn text_node(host: &Rc<RefCell<MemoryHost>>, tag: &str, text: &str) -> NodeId {
        let mut host = host.borrow_mut();
        let node = host.create_element(tag);
        host.set_text(node, text).unwrap();
        node
    }

    #[test]
    fn renders_a_host_node() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let view = {
            let host = host.clone();
            component(move |_scope: &Scope<()>| Some(text_node(&host, "p", "test")))
        };

        let node = view.call(()).expect("a rendered node");
        assert_eq!(host.borrow().tag(node).unwrap(), "p");
        assert_eq!(host.borrow().text(node).unwrap(), "test");
        assert_eq!(runtime.live_root(view.definition_key()), Some(node));
        assert_eq!(
            runtime.node_owner(node).as_deref(),
            Some(view.definition_key())
        );
    }

    #[test]
    fn execute_with_constant_deps_runs_once() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let runs = Rc::new(Cell::new(0));
        let view = {
            let runs = runs.clone();
            component(move |scope: &Scope<()>| {
                let runs = runs.clone();
                scope.execute((), move |_| runs.set(runs.get() + 1));
                None
            })
        };

        for _ in 0..4 {
            let _ = view.call(());
        }
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn execute_always_runs_on_every_render() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let runs = Rc::new(Cell::new(0));
        let view = {
            let runs = runs.clone();
            component(move |scope: &Scope<()>| {
                let runs = runs.clone();
                scope.execute_always(move || runs.set(runs.get() + 1));
                None
            })
        };

        for _ in 0..3 {
            let _ = view.call(());
        }
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn execute_reruns_when_deps_change() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let runs = Rc::new(Cell::new(0));
        let seen = Rc::new(Cell::new(0));
        let view = {
            let runs = runs.clone();
            let seen = seen.clone();
            component(move |scope: &Scope<i32>| {
                let runs = runs.clone();
                let seen = seen.clone();
                scope.execute(*scope.props(), move |count| {
                    runs.set(runs.get() + 1);
                    seen.set(*count);
                });
                None
            })
        };

        let _ = view.call(1);
        let _ = view.call(2);
        let _ = view.call(2);
        let _ = view.call(3);
        assert_eq!(runs.get(), 3);
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn all_execute_hooks_run_independently() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let runs = Rc::new(Cell::new(0));
        let view = {
            let runs = runs.clone();
            component(move |scope: &Scope<()>| {
                let a = runs.clone();
                scope.execute((), move |_| a.set(a.get() + 1));
                let b = runs.clone();
                scope.execute(runs.get() < 2, move |_| b.set(b.get() + 1));
                let c = runs.clone();
                scope.execute(runs.get() > 2, move |_| c.set(c.get() + 1));
                None
            })
        };

        let _ = view.call(());
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn instance_keys_embed_the_definition_counter() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let captured = Rc::new(RefCell::new(String::new()));
        let view = {
            let captured = captured.clone();
            component(move |scope: &Scope<()>| {
                *captured.borrow_mut() = scope.key().to_owned();
                None
            })
        };
        let definition = view.definition_key().to_owned();
        assert!(definition.starts_with("__") && definition.ends_with("__"));
        assert!(definition.trim_matches('_').parse::<usize>().is_ok());

        let _ = view.call(());
        assert_eq!(*captured.borrow(), definition);

        let _ = view.call_keyed("alpha", ());
        assert_eq!(*captured.borrow(), format!("alpha{definition}"));
    }

    #[test]
    fn distinct_definitions_get_distinct_keys() {
        let first = component(|_scope: &Scope<()>| None);
        let second = component(|_scope: &Scope<()>| None);
        assert_ne!(first.definition_key(), second.definition_key());
    }

    #[test]
    fn keyed_instances_of_one_definition_are_distinct() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let keys = Rc::new(RefCell::new(Vec::new()));
        let view = {
            let keys = keys.clone();
            component(move |scope: &Scope<()>| {
                keys.borrow_mut().push(scope.key().to_owned());
                None
            })
        };
        let definition = view.definition_key().to_owned();

        let _ = view.call_keyed("one", ());
        let _ = view.call_keyed("two", ());
        let _ = view.call_keyed("three", ());
        assert_eq!(
            *keys.borrow(),
            vec![
                format!("one{definition}"),
                format!("two{definition}"),
                format!("three{definition}")
            ]
        );
    }

    #[test]
    fn state_seeds_initial_value() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let slot: Rc<RefCell<Option<StateReader<i32>>>> = Rc::new(RefCell::new(None));
        let view = {
            let slot = slot.clone();
            component(move |scope: &Scope<()>| {
                let (value, _set) = scope.update(0);
                slot.borrow_mut().replace(value);
                None
            })
        };

        let _ = view.call(());
        let reader = slot.borrow().clone().unwrap();
        assert_eq!(reader.get(), 0);
    }

    #[test]
    fn state_persists_across_calls_to_the_same_instance() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let writer: Rc<RefCell<Option<StateWriter<i32, ()>>>> = Rc::new(RefCell::new(None));
        let view = {
            let observed = observed.clone();
            let writer = writer.clone();
            component(move |scope: &Scope<()>| {
                let (value, set_value) = scope.update(0);
                observed.borrow_mut().push(value.get());
                writer.borrow_mut().replace(set_value);
                None
            })
        };

        let _ = view.call_keyed("stable", ());
        let set = writer.borrow().clone().unwrap();
        set.set(5);
        let _ = view.call_keyed("stable", ());
        // first render, the re-render triggered by the write, second call
        assert_eq!(*observed.borrow(), vec![0, 5, 5]);
    }

    #[test]
    fn write_rerenders_synchronously_and_patches_previous_output() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let writer: Rc<RefCell<Option<StateWriter<i32, ()>>>> = Rc::new(RefCell::new(None));
        let view = {
            let host = host.clone();
            let writer = writer.clone();
            component(move |scope: &Scope<()>| {
                let (value, set_value) = scope.update(0);
                writer.borrow_mut().replace(set_value);
                let text = if value.get() == 0 { "zero" } else { "one" };
                Some(text_node(&host, "p", text))
            })
        };

        let first = view.call(()).unwrap();
        let container = host.borrow_mut().create_element("div");
        host.borrow_mut().append_child(container, first).unwrap();

        let set = writer.borrow().clone().unwrap();
        set.set(1);

        let children = host.borrow().children(container);
        assert_eq!(children.len(), 1);
        let current = children[0];
        assert_ne!(current, first);
        assert_eq!(host.borrow().text(current).unwrap(), "one");
        assert_eq!(runtime.live_root(view.definition_key()), Some(current));
        assert!(!runtime.has_deferred(), "a replacement is not an unmount");
    }

    #[test]
    fn write_during_render_completes_before_the_outer_pass_returns() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let renders = Rc::new(Cell::new(0));
        let cleaned = Rc::new(Cell::new(false));
        let view = {
            let host = host.clone();
            let renders = renders.clone();
            let cleaned = cleaned.clone();
            component(move |scope: &Scope<()>| {
                renders.set(renders.get() + 1);
                let (value, set_value) = scope.update(0);
                scope.execute((), move |_| set_value.set(1));
                let cleaned = cleaned.clone();
                scope.cleanup(move |_| cleaned.set(true));
                let text = if value.get() == 0 { "zero" } else { "one" };
                Some(text_node(&host, "p", text))
            })
        };

        let node = view.call(()).unwrap();
        assert_eq!(renders.get(), 2, "the nested write re-renders once");
        assert_eq!(host.borrow().text(node).unwrap(), "one");
        flush(&runtime);
        assert!(!cleaned.get(), "replacing output must not run cleanup");
    }

    #[test]
    fn reentrant_writes_compose_as_a_call_stack() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let reader: Rc<RefCell<Option<StateReader<i32>>>> = Rc::new(RefCell::new(None));
        let view = {
            let reader = reader.clone();
            component(move |scope: &Scope<()>| {
                let (value, set_value) = scope.update(0);
                reader.borrow_mut().replace(value.clone());
                let set = set_value.clone();
                scope.execute((), move |_| set.set(1));
                let chained = value.clone();
                scope.execute(value.get() == 1, move |raise| {
                    if *raise {
                        set_value.set(chained.get() + 1);
                    }
                });
                None
            })
        };

        let _ = view.call(());
        assert_eq!(reader.borrow().clone().unwrap().get(), 2);
    }

    #[test]
    fn three_writes_leave_latest_value_and_fire_gated_execute_each_time() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        let tick = Rc::new(Cell::new(0));
        let fired = Rc::new(Cell::new(0));
        let last = Rc::new(Cell::new(-1));
        let reader: Rc<RefCell<Option<StateReader<i32>>>> = Rc::new(RefCell::new(None));
        let view = {
            let tick = tick.clone();
            let fired = fired.clone();
            let last = last.clone();
            let reader = reader.clone();
            component(move |scope: &Scope<()>| {
                let (value, set_value) = scope.update(0);
                reader.borrow_mut().replace(value.clone());
                let bump = value.clone();
                scope.execute(tick.get(), move |_| set_value.set(bump.get() + 1));
                let fired = fired.clone();
                let last = last.clone();
                scope.execute(value.get(), move |observed| {
                    fired.set(fired.get() + 1);
                    last.set(*observed);
                });
                None
            })
        };

        for round in 1..=3 {
            tick.set(round);
            let _ = view.call(());
        }
        assert_eq!(reader.borrow().clone().unwrap().get(), 3);
        assert_eq!(fired.get(), 3);
        assert_eq!(last.get(), 3);
    }

    #[test]
    fn cleanup_runs_once_after_the_deferred_tick() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let gone = Rc::new(Cell::new(false));
        let cleaned: Rc<RefCell<Vec<NodeId>>> = Rc::new(RefCell::new(Vec::new()));
        let view = {
            let host = host.clone();
            let gone = gone.clone();
            let cleaned = cleaned.clone();
            component(move |scope: &Scope<()>| {
                let (_marker, _set) = scope.update(0);
                let cleaned = cleaned.clone();
                scope.cleanup(move |node| cleaned.borrow_mut().push(node));
                if gone.get() {
                    None
                } else {
                    Some(text_node(&host, "p", "test"))
                }
            })
        };
        let key = view.definition_key().to_owned();

        let first = view.call(()).unwrap();
        assert_eq!(runtime.hook_count(&key), 1);

        gone.set(true);
        assert_eq!(view.call(()), None);
        assert!(cleaned.borrow().is_empty(), "cleanup is deferred by a tick");
        assert!(runtime.has_deferred());

        flush(&runtime);
        assert_eq!(*cleaned.borrow(), vec![first]);
        assert_eq!(runtime.root_slot(&key), None, "root instance is purged");
        assert_eq!(runtime.hook_count(&key), 0);

        flush(&runtime);
        assert_eq!(cleaned.borrow().len(), 1, "cleanup fires at most once");
    }

    #[test]
    fn node_owner_tags_die_with_the_purged_instance() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let gone = Rc::new(Cell::new(false));
        let view = {
            let host = host.clone();
            let gone = gone.clone();
            component(move |_scope: &Scope<()>| {
                if gone.get() {
                    None
                } else {
                    Some(text_node(&host, "p", "x"))
                }
            })
        };

        let node = view.call(()).unwrap();
        assert_eq!(
            runtime.node_owner(node).as_deref(),
            Some(view.definition_key())
        );

        gone.set(true);
        let _ = view.call(());
        flush(&runtime);
        host.borrow_mut().remove(node).unwrap();

        assert_eq!(runtime.root_slot(view.definition_key()), None);
        assert_eq!(runtime.node_owner(node), None);
    }

    #[test]
    fn latest_cleanup_registration_wins() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let gone = Rc::new(Cell::new(false));
        let log = Rc::new(RefCell::new(Vec::new()));
        let view = {
            let host = host.clone();
            let gone = gone.clone();
            let log = log.clone();
            component(move |scope: &Scope<()>| {
                let first = log.clone();
                scope.cleanup(move |_| first.borrow_mut().push("first"));
                let second = log.clone();
                scope.cleanup(move |_| second.borrow_mut().push("second"));
                if gone.get() {
                    None
                } else {
                    Some(text_node(&host, "p", "x"))
                }
            })
        };

        let _ = view.call(());
        gone.set(true);
        let _ = view.call(());
        flush(&runtime);
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn rerender_before_the_tick_is_the_same_instance() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let gone = Rc::new(Cell::new(false));
        let observed = Rc::new(RefCell::new(Vec::new()));
        let writer: Rc<RefCell<Option<StateWriter<i32, ()>>>> = Rc::new(RefCell::new(None));
        let view = {
            let host = host.clone();
            let gone = gone.clone();
            let observed = observed.clone();
            let writer = writer.clone();
            component(move |scope: &Scope<()>| {
                let (value, set_value) = scope.update(0);
                observed.borrow_mut().push(value.get());
                writer.borrow_mut().replace(set_value);
                if gone.get() {
                    None
                } else {
                    Some(text_node(&host, "p", "x"))
                }
            })
        };

        let _ = view.call_keyed("k", ());
        let set = writer.borrow().clone().unwrap();
        set.set(7);
        gone.set(true);
        assert_eq!(view.call_keyed("k", ()), None);
        gone.set(false);
        // the cascade has not fired yet: this is a re-render, not a remount
        let _ = view.call_keyed("k", ());
        assert_eq!(*observed.borrow(), vec![0, 7, 7, 7]);
        flush(&runtime);
    }

    #[test]
    fn containment_cascades_cleanup_to_descendants() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let child_cleaned: Rc<RefCell<Vec<NodeId>>> = Rc::new(RefCell::new(Vec::new()));
        let child = {
            let host = host.clone();
            let child_cleaned = child_cleaned.clone();
            component(move |scope: &Scope<()>| {
                let (_state, _set) = scope.update(0);
                let child_cleaned = child_cleaned.clone();
                scope.cleanup(move |node| child_cleaned.borrow_mut().push(node));
                Some(text_node(&host, "p", "child"))
            })
        };
        let parent_gone = Rc::new(Cell::new(false));
        let parent = {
            let host = host.clone();
            let child = child.clone();
            let parent_gone = parent_gone.clone();
            component(move |_scope: &Scope<()>| {
                if parent_gone.get() {
                    return None;
                }
                let child_node = child.call(()).unwrap();
                let mut host = host.borrow_mut();
                let div = host.create_element("div");
                host.append_child(div, child_node).unwrap();
                Some(div)
            })
        };
        let parent_key = parent.definition_key().to_owned();
        let child_key = child.definition_key().to_owned();

        let _ = parent.call(());
        let child_node = runtime.live_root(&child_key).unwrap();
        assert_eq!(runtime.contained_keys(&parent_key), vec![child_key.clone()]);
        assert!(runtime.has_parent(&child_key));
        assert_eq!(runtime.hook_count(&child_key), 1);

        parent_gone.set(true);
        assert_eq!(parent.call(()), None);
        flush(&runtime);

        assert_eq!(*child_cleaned.borrow(), vec![child_node]);
        assert_eq!(runtime.root_slot(&child_key), None);
        assert_eq!(runtime.hook_count(&child_key), 0);
        assert_eq!(runtime.node_owner(child_node), None);
        assert_eq!(runtime.root_slot(&parent_key), None);
    }

    #[test]
    fn contained_instance_is_vacated_but_not_purged_on_its_own_unmount() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let child_gone = Rc::new(Cell::new(false));
        let child_cleaned = Rc::new(Cell::new(0));
        let child = {
            let host = host.clone();
            let child_gone = child_gone.clone();
            let child_cleaned = child_cleaned.clone();
            component(move |scope: &Scope<()>| {
                let (_state, _set) = scope.update(0);
                let child_cleaned = child_cleaned.clone();
                scope.cleanup(move |_| child_cleaned.set(child_cleaned.get() + 1));
                if child_gone.get() {
                    None
                } else {
                    Some(text_node(&host, "p", "child"))
                }
            })
        };
        let parent = {
            let host = host.clone();
            let child = child.clone();
            component(move |_scope: &Scope<()>| {
                let child_node = child.call(()).unwrap();
                let mut host = host.borrow_mut();
                let div = host.create_element("div");
                host.append_child(div, child_node).unwrap();
                Some(div)
            })
        };
        let child_key = child.definition_key().to_owned();

        let _ = parent.call(());
        assert!(runtime.has_parent(&child_key));

        child_gone.set(true);
        assert_eq!(child.call(()), None);
        flush(&runtime);

        assert_eq!(child_cleaned.get(), 1);
        // the ancestor still references the instance: vacated, not purged
        assert_eq!(runtime.root_slot(&child_key), Some(None));
        assert_eq!(runtime.hook_count(&child_key), 1);
        assert!(!runtime.has_parent(&child_key));
    }

    #[test]
    fn reparented_instance_is_purged_with_its_original_container() {
        // Documents the vacate-versus-purge rule verbatim: an instance that
        // was in the unmounting container's contained set is purged even if
        // another live container picked it up since.
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let child_cleaned = Rc::new(Cell::new(0));
        let child = {
            let host = host.clone();
            let child_cleaned = child_cleaned.clone();
            component(move |scope: &Scope<()>| {
                let (_state, _set) = scope.update(0);
                let child_cleaned = child_cleaned.clone();
                scope.cleanup(move |_| child_cleaned.set(child_cleaned.get() + 1));
                Some(text_node(&host, "p", "child"))
            })
        };
        let first_gone = Rc::new(Cell::new(false));
        let wrap = |gone: Rc<Cell<bool>>| {
            let host = host.clone();
            let child = child.clone();
            component(move |_scope: &Scope<()>| {
                if gone.get() {
                    return None;
                }
                let child_node = child.call(()).unwrap();
                let mut host = host.borrow_mut();
                let div = host.create_element("div");
                host.append_child(div, child_node).unwrap();
                Some(div)
            })
        };
        let first = wrap(first_gone.clone());
        let second = wrap(Rc::new(Cell::new(false)));
        let child_key = child.definition_key().to_owned();
        let second_key = second.definition_key().to_owned();

        let _ = first.call(());
        let _ = second.call(());
        assert_eq!(runtime.contained_keys(&second_key), vec![child_key.clone()]);

        first_gone.set(true);
        let _ = first.call(());
        flush(&runtime);

        assert_eq!(child_cleaned.get(), 1);
        assert_eq!(runtime.hook_count(&child_key), 0);
        assert_eq!(runtime.root_slot(&child_key), None);
        // the second container's edge survives, pointing at a purged key
        assert_eq!(runtime.contained_keys(&second_key), vec![child_key]);
    }

    #[test]
    fn host_ref_sees_new_and_previous_nodes() {
        let (runtime, host) = host_runtime();
        let _guard = runtime.enter();
        let log: Rc<RefCell<Vec<(Option<NodeId>, Option<NodeId>)>>> =
            Rc::new(RefCell::new(Vec::new()));
        let view = {
            let host = host.clone();
            let log = log.clone();
            component(move |scope: &Scope<()>| {
                let log = log.clone();
                scope.host_ref(move |new, previous| log.borrow_mut().push((new, previous)));
                Some(text_node(&host, "p", "x"))
            })
        };

        let first = view.call(()).unwrap();
        let second = view.call(()).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![(Some(first), None), (Some(second), Some(first))]
        );
    }

    #[test]
    fn headless_runtime_exercises_hooks_only() {
        let runtime = Runtime::new(Arc::new(TestScheduler));
        let _guard = runtime.enter();
        assert!(!runtime.host_available());
        let writer: Rc<RefCell<Option<StateWriter<i32, ()>>>> = Rc::new(RefCell::new(None));
        let reader: Rc<RefCell<Option<StateReader<i32>>>> = Rc::new(RefCell::new(None));
        let view = {
            let writer = writer.clone();
            let reader = reader.clone();
            component(move |scope: &Scope<()>| {
                let (value, set_value) = scope.update(0);
                reader.borrow_mut().replace(value);
                writer.borrow_mut().replace(set_value);
                // a node id means nothing without a host; nothing is tracked
                Some(99)
            })
        };
        let key = view.definition_key().to_owned();

        let _ = view.call(());
        let set = writer.borrow().clone().unwrap();
        set.set(41);
        let _ = view.call(());
        assert_eq!(reader.borrow().clone().unwrap().get(), 41);
        assert_eq!(runtime.root_slot(&key), None);
        assert!(!runtime.has_deferred());
    }
}
