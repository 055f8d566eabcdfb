//! Hook storage and instance tracking.
//!
//! One [`Registry`] lives inside each runtime. It holds the hook store
//! (state values and effect fingerprints addressed by instance key plus
//! ordinal), the rendered-root map, the containment relation discovered by
//! scanning rendered output, and the registered cleanup callbacks. Entries
//! are inserted by render cycles and removed only by the cleanup cascade;
//! a missing entry always means "already cleaned up" and is skipped.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::collections::map::{HashMap, HashSet};
use crate::host::HostTree;
use crate::NodeId;

/// Stable identity of one component call-site instance.
pub type InstanceKey = Rc<str>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HookKind {
    Update,
    Execute,
}

/// Address of one hook call site: the hook kind, the owning instance and
/// the zero-based position of the call within a render pass.
///
/// Ordinals are only stable if hooks are called unconditionally in the same
/// order on every render of an instance. Violating that silently corrupts
/// the address-to-value mapping; it is not detected.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct HookAddress {
    pub kind: HookKind,
    pub instance: InstanceKey,
    pub ordinal: usize,
}

pub(crate) type CleanupFn = Rc<dyn Fn(NodeId)>;

pub(crate) enum HookSlot {
    /// Current value of an `update` hook.
    State(Rc<dyn Any>),
    /// Dependency fingerprint of an `execute` hook; `None` marks the
    /// omitted-dependencies form, which re-runs on every render.
    Deps(Option<u64>),
}

#[derive(Default)]
pub(crate) struct Registry {
    hooks: RefCell<HashMap<HookAddress, HookSlot>>,
    /// Rendered root per instance; the inner `None` is the vacated
    /// (unmounted but not yet purged) tombstone.
    roots: RefCell<IndexMap<InstanceKey, Option<NodeId>>>,
    contained: RefCell<HashMap<InstanceKey, IndexSet<InstanceKey>>>,
    has_parent: RefCell<HashSet<InstanceKey>>,
    owned_hooks: RefCell<HashMap<InstanceKey, HashSet<HookAddress>>>,
    cleanups: RefCell<HashMap<InstanceKey, CleanupFn>>,
    node_owner: RefCell<HashMap<NodeId, InstanceKey>>,
}

impl Registry {
    pub(crate) fn seed_state(&self, address: HookAddress, initial: Rc<dyn Any>) {
        self.hooks
            .borrow_mut()
            .entry(address)
            .or_insert(HookSlot::State(initial));
    }

    pub(crate) fn state(&self, address: &HookAddress) -> Option<Rc<dyn Any>> {
        match self.hooks.borrow().get(address) {
            Some(HookSlot::State(value)) => Some(Rc::clone(value)),
            _ => None,
        }
    }

    pub(crate) fn put_state(&self, address: HookAddress, value: Rc<dyn Any>) {
        self.hooks
            .borrow_mut()
            .insert(address, HookSlot::State(value));
    }

    /// Outer `None`: nothing stored yet. Inner `None`: omission marker.
    pub(crate) fn deps(&self, address: &HookAddress) -> Option<Option<u64>> {
        match self.hooks.borrow().get(address) {
            Some(HookSlot::Deps(fingerprint)) => Some(*fingerprint),
            _ => None,
        }
    }

    pub(crate) fn store_deps(&self, address: HookAddress, fingerprint: Option<u64>) {
        self.hooks
            .borrow_mut()
            .insert(address, HookSlot::Deps(fingerprint));
    }

    pub(crate) fn live_root(&self, key: &str) -> Option<NodeId> {
        self.roots.borrow().get(key).copied().flatten()
    }

    pub(crate) fn root_slot(&self, key: &str) -> Option<Option<NodeId>> {
        self.roots.borrow().get(key).copied()
    }

    /// Tags `node` with its owning instance, keeping an existing tag: a
    /// node rendered by a child and returned unchanged by an ancestor stays
    /// attributed to the child.
    pub(crate) fn claim_node(&self, node: NodeId, key: InstanceKey) {
        self.node_owner.borrow_mut().entry(node).or_insert(key);
    }

    pub(crate) fn record_render(
        &self,
        key: InstanceKey,
        node: NodeId,
        owned: HashSet<HookAddress>,
        cleanup: Option<CleanupFn>,
    ) {
        self.roots.borrow_mut().insert(Rc::clone(&key), Some(node));
        self.owned_hooks.borrow_mut().insert(Rc::clone(&key), owned);
        self.cleanups
            .borrow_mut()
            .insert(key, cleanup.unwrap_or_else(|| Rc::new(|_: NodeId| {})));
    }

    /// Re-derives containment edges for `key` after it rendered `new_node`.
    ///
    /// Every other tracked instance whose live, attached root now sits
    /// inside `new_node` becomes a contained child of `key` and is marked
    /// as having a parent. An instance whose own contained-set already
    /// lists `key` is skipped to keep the relation acyclic.
    pub(crate) fn update_containment(
        &self,
        host: &dyn HostTree,
        key: &InstanceKey,
        new_node: NodeId,
    ) {
        let discovered: Vec<InstanceKey> = {
            let roots = self.roots.borrow();
            let contained = self.contained.borrow();
            roots
                .iter()
                .filter(|(other, slot)| {
                    if other.as_ref() == key.as_ref() {
                        return false;
                    }
                    let Some(node) = **slot else { return false };
                    if !host.is_attached(node) {
                        return false;
                    }
                    if !host.contains(new_node, node) {
                        return false;
                    }
                    !contained
                        .get(other.as_ref())
                        .map_or(false, |set| set.contains(key.as_ref()))
                })
                .map(|(other, _)| Rc::clone(other))
                .collect()
        };

        if discovered.is_empty() {
            return;
        }
        let mut contained = self.contained.borrow_mut();
        let mut has_parent = self.has_parent.borrow_mut();
        let set = contained.entry(Rc::clone(key)).or_default();
        for child in discovered {
            log::debug!("containment: {} now contains {}", key, child);
            set.insert(Rc::clone(&child));
            has_parent.insert(child);
        }
    }

    /// Walks the containment relation from `key` and tears the affected
    /// instances down.
    ///
    /// Each visited instance has its cleanup callback invoked at most once
    /// (with its last rendered node) and its root slot vacated. Hook
    /// storage and the root entry are purged only when the instance has no
    /// surviving parent or was explicitly part of the originally computed
    /// contained set.
    pub(crate) fn run_cascade(&self, key: &InstanceKey) {
        let (visit, originally_contained) = {
            let roots = self.roots.borrow();
            let contained = self.contained.borrow();
            let has_parent = self.has_parent.borrow();

            let originally_contained: IndexSet<InstanceKey> = contained
                .get(key.as_ref())
                .cloned()
                .unwrap_or_default();
            let mut visit: IndexSet<InstanceKey> = IndexSet::new();
            if matches!(roots.get(key.as_ref()), Some(Some(_))) {
                match contained.get(key.as_ref()) {
                    Some(set) => visit.extend(set.iter().cloned()),
                    None => {
                        visit.insert(Rc::clone(key));
                    }
                }
            }
            if !has_parent.contains(key.as_ref()) {
                visit.insert(Rc::clone(key));
            }
            (visit, originally_contained)
        };

        log::debug!("cascade from {}: {} instance(s) to visit", key, visit.len());
        for instance in &visit {
            if !self.roots.borrow().contains_key(instance.as_ref()) {
                // already cleaned up by an earlier cascade
                continue;
            }
            let (cleanup, node) = {
                let mut cleanups = self.cleanups.borrow_mut();
                let roots = self.roots.borrow();
                (
                    cleanups.remove(instance.as_ref()),
                    roots.get(instance.as_ref()).copied().flatten(),
                )
            };
            if let (Some(cleanup), Some(node)) = (cleanup.as_ref(), node) {
                cleanup(node);
            }
            if let Some(slot) = self.roots.borrow_mut().get_mut(instance.as_ref()) {
                *slot = None;
            }
            let purge = {
                let has_parent = self.has_parent.borrow();
                !has_parent.contains(instance.as_ref())
                    || originally_contained.contains(instance.as_ref())
            };
            if purge {
                let owned = self.owned_hooks.borrow_mut().remove(instance.as_ref());
                if let Some(owned) = owned {
                    let mut hooks = self.hooks.borrow_mut();
                    for address in owned {
                        hooks.remove(&address);
                    }
                }
                self.roots.borrow_mut().shift_remove(instance.as_ref());
                // node tags die with the instance
                self.node_owner
                    .borrow_mut()
                    .retain(|_, owner| owner.as_ref() != instance.as_ref());
            }
            self.has_parent.borrow_mut().remove(instance.as_ref());
            self.contained.borrow_mut().remove(instance.as_ref());
        }
    }

    pub(crate) fn hook_count(&self, key: &str) -> usize {
        self.hooks
            .borrow()
            .keys()
            .filter(|address| address.instance.as_ref() == key)
            .count()
    }

    pub(crate) fn contained_keys(&self, key: &str) -> Vec<String> {
        self.contained
            .borrow()
            .get(key)
            .map(|set| set.iter().map(|k| k.as_ref().to_owned()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn is_has_parent(&self, key: &str) -> bool {
        self.has_parent.borrow().contains(key)
    }

    pub(crate) fn owner_of(&self, node: NodeId) -> Option<InstanceKey> {
        self.node_owner.borrow().get(&node).cloned()
    }
}
