use std::collections::HashMap;

use thiserror::Error;

use super::note::{Note, ROOT_ID};

/// A structural problem the tree refuses to apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("parent {pid} of note {id} is not in the tree")]
    UnknownParent { id: String, pid: String },
    #[error("note {id} cannot be its own parent")]
    SelfParent { id: String },
    #[error("moving {id} under {pid} would create a cycle")]
    Cycle { id: String, pid: String },
}

#[derive(Debug, Clone, Default)]
struct TreeNode {
    pid: Option<String>,
    children: Vec<String>,
}

/// Parent/child index over the notes seen so far.
///
/// The root sentinel is always present and fixed. Every other node keeps
/// its position among its siblings across unrelated upserts, so the
/// sidebar ordering is stable.
#[derive(Debug, Clone)]
pub struct TreeIndex {
    nodes: HashMap<String, TreeNode>,
}

impl Default for TreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeIndex {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID.to_string(), TreeNode::default());
        Self { nodes }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn parent(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).and_then(|node| node.pid.as_deref())
    }

    pub fn children(&self, pid: &str) -> &[String] {
        self.nodes
            .get(pid)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Insert a note or move it under a new parent.
    ///
    /// Rejects self-parenting, unknown parents and moves that would make a
    /// note its own ancestor. Re-upserting under the current parent keeps
    /// the note's position; a real move appends it to the new parent's
    /// children. Upserting the root is a no-op.
    pub fn upsert(&mut self, id: &str, pid: &str) -> Result<(), TreeError> {
        if id == ROOT_ID {
            return Ok(());
        }
        if pid == id {
            return Err(TreeError::SelfParent { id: id.to_string() });
        }
        if pid != ROOT_ID && !self.nodes.contains_key(pid) {
            return Err(TreeError::UnknownParent {
                id: id.to_string(),
                pid: pid.to_string(),
            });
        }
        if self.is_ancestor(id, pid) {
            return Err(TreeError::Cycle {
                id: id.to_string(),
                pid: pid.to_string(),
            });
        }

        match self.nodes.get(id).and_then(|node| node.pid.clone()) {
            Some(old_pid) if old_pid == pid => {}
            Some(old_pid) => {
                self.detach_child(&old_pid, id);
                self.attach_child(pid, id);
                if let Some(node) = self.nodes.get_mut(id) {
                    node.pid = Some(pid.to_string());
                }
            }
            None => {
                self.nodes.insert(
                    id.to_string(),
                    TreeNode {
                        pid: Some(pid.to_string()),
                        children: Vec::new(),
                    },
                );
                self.attach_child(pid, id);
            }
        }
        Ok(())
    }

    /// Convenience wrapper taking the parent from the note itself.
    pub fn upsert_note(&mut self, note: &Note) -> Result<(), TreeError> {
        self.upsert(&note.id, note.parent_or_root())
    }

    /// Check a prospective parent change without applying it.
    ///
    /// Unlike [`upsert`](Self::upsert) this tolerates parents the index has
    /// not seen yet, since the index only covers notes loaded so far.
    pub fn validate_move(&self, id: &str, pid: &str) -> Result<(), TreeError> {
        if pid == id {
            return Err(TreeError::SelfParent { id: id.to_string() });
        }
        if self.is_ancestor(id, pid) {
            return Err(TreeError::Cycle {
                id: id.to_string(),
                pid: pid.to_string(),
            });
        }
        Ok(())
    }

    /// Detach a note, splicing its children into its old position so they
    /// stay visible in order. Returns false for the root or an unknown id.
    pub fn remove(&mut self, id: &str) -> bool {
        if id == ROOT_ID {
            return false;
        }
        let Some(node) = self.nodes.remove(id) else {
            return false;
        };
        let parent_id = node.pid.as_deref().unwrap_or(ROOT_ID).to_string();

        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            let pos = parent.children.iter().position(|child| child == id);
            if let Some(pos) = pos {
                parent.children.remove(pos);
            }
            let at = pos.unwrap_or(parent.children.len());
            for (offset, child) in node.children.iter().enumerate() {
                parent.children.insert(at + offset, child.clone());
            }
        }
        for child in &node.children {
            if let Some(entry) = self.nodes.get_mut(child) {
                entry.pid = Some(parent_id.clone());
            }
        }
        true
    }

    fn is_ancestor(&self, candidate: &str, of: &str) -> bool {
        let mut cursor = Some(of);
        while let Some(id) = cursor {
            if id == candidate {
                return true;
            }
            cursor = self.parent(id);
        }
        false
    }

    fn attach_child(&mut self, pid: &str, id: &str) {
        if let Some(parent) = self.nodes.get_mut(pid) {
            parent.children.push(id.to_string());
        }
    }

    fn detach_child(&mut self, pid: &str, id: &str) {
        if let Some(parent) = self.nodes.get_mut(pid) {
            parent.children.retain(|child| child != id);
        }
    }
}
