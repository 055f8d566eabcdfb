//! Host-tree collaborator contract and an in-memory reference host.
//!
//! The runtime never inspects host nodes directly. Containment tests,
//! attachment checks and patching go through [`HostTree`], which lets a
//! headless environment skip the whole tracking machinery by simply not
//! installing a host.

use std::fmt;

use crate::NodeId;

/// Structural capabilities the runtime requires from a host tree.
pub trait HostTree {
    /// Whether `node` is `ancestor` itself or one of its descendants.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool;

    /// Whether `node` currently has a parent.
    fn is_attached(&self, node: NodeId) -> bool;

    /// Reconciles `old` with `new` in place and returns the node that should
    /// be considered current. Identity must be preserved when `old == new`,
    /// since containment is re-tested against node identity afterwards.
    fn patch(&mut self, old: NodeId, new: NodeId) -> NodeId;
}

#[derive(Debug, PartialEq, Eq)]
pub enum HostError {
    Missing { id: NodeId },
    WouldCycle { id: NodeId },
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Missing { id } => write!(f, "host node {id} does not exist"),
            HostError::WouldCycle { id } => {
                write!(f, "appending node {id} would create a cycle")
            }
        }
    }
}

impl std::error::Error for HostError {}

struct MemoryNode {
    tag: String,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl MemoryNode {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_owned(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// In-memory host tree used by tests, demos and headless tooling.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Some(MemoryNode::new(tag)));
        id
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        let id = self.create_element("#text");
        if let Some(Some(node)) = self.nodes.get_mut(id) {
            node.text = text.to_owned();
        }
        id
    }

    fn node(&self, id: NodeId) -> Result<&MemoryNode, HostError> {
        self.nodes
            .get(id)
            .and_then(|slot| slot.as_ref())
            .ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(|slot| slot.as_mut())
            .ok_or(HostError::Missing { id })
    }

    pub fn tag(&self, id: NodeId) -> Result<&str, HostError> {
        self.node(id).map(|node| node.tag.as_str())
    }

    pub fn text(&self, id: NodeId) -> Result<&str, HostError> {
        self.node(id).map(|node| node.text.as_str())
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), HostError> {
        self.node_mut(id)?.text = text.to_owned();
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Appends `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), HostError> {
        self.node(child)?;
        // appending an ancestor under its own descendant would loop
        if self.contains(child, parent) {
            return Err(HostError::WouldCycle { id: child });
        }
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Unlinks `id` from its parent without destroying it.
    pub fn detach(&mut self, id: NodeId) -> Result<(), HostError> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            let siblings = &mut self.node_mut(parent)?.children;
            siblings.retain(|child| *child != id);
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Removes `id` and its whole subtree from the arena.
    pub fn remove(&mut self, id: NodeId) -> Result<(), HostError> {
        let children = {
            let node = self.node(id)?;
            node.children.clone()
        };
        for child in children {
            let _ = self.remove(child);
        }
        self.detach(id)?;
        self.nodes[id] = None;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.node(id) {
            Ok(node) => {
                if node.text.is_empty() {
                    output.push_str(&format!("{}[{}] <{}>\n", indent, id, node.tag));
                } else {
                    output.push_str(&format!(
                        "{}[{}] <{}> {:?}\n",
                        indent, id, node.tag, node.text
                    ));
                }
                for child in &node.children {
                    self.dump_node(output, *child, depth + 1);
                }
            }
            Err(_) => output.push_str(&format!("{}[{}] (missing)\n", indent, id)),
        }
    }
}

impl HostTree for MemoryHost {
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        if self.node(node).is_err() || self.node(ancestor).is_err() {
            return false;
        }
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.parent(node).is_some()
    }

    fn patch(&mut self, old: NodeId, new: NodeId) -> NodeId {
        if old == new {
            return old;
        }
        log::trace!("patch: replacing node {old} with {new}");
        let parent = self.parent(old);
        let _ = self.detach(new);
        if let Some(parent_id) = parent {
            let position = self
                .children(parent_id)
                .iter()
                .position(|child| *child == old);
            let _ = self.detach(old);
            if let Ok(node) = self.node_mut(parent_id) {
                match position {
                    Some(index) => node.children.insert(index, new),
                    None => node.children.push(new),
                }
            }
            if let Ok(node) = self.node_mut(new) {
                node.parent = Some(parent_id);
            }
        }
        new
    }
}
