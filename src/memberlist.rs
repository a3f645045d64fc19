//! Memberlist Types
//!
//! Core types for membership reconciliation:
//! - Node identity and health
//! - The ordered memberlist and its version token
//! - The single-node merge applied on every reconciliation cycle

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one worker process, usually its pod IP
pub type NodeId = String;

/// Node health as observed by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Node passes its readiness checks
    Ready,
    /// Node exists but is not ready to serve
    NotReady,
    /// Node is not known to the watcher
    Unknown,
}

impl NodeStatus {
    pub fn is_ready(self) -> bool {
        self == NodeStatus::Ready
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Ready => "ready",
            NodeStatus::NotReady => "not_ready",
            NodeStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Opaque optimistic-concurrency token of the stored memberlist
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered list of ready node addresses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Memberlist(Vec<NodeId>);

impl Memberlist {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, node: &str) -> bool {
        self.0.iter().any(|member| member == node)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<NodeId> {
        self.0
    }

    /// Merge the observed status of `node` into this list.
    ///
    /// The list is scanned once. Entries equal to `node` survive only when the
    /// node is ready, every other entry keeps its relative position, and a
    /// ready node that was not present is appended at the end.
    pub fn reconcile(&self, node: &str, status: NodeStatus) -> Memberlist {
        let mut exists = false;
        let mut members = Vec::with_capacity(self.0.len() + 1);
        for member in &self.0 {
            if member == node {
                // Keep at most one entry for the node
                if status.is_ready() && !exists {
                    members.push(member.clone());
                }
                exists = true;
            } else {
                members.push(member.clone());
            }
        }
        if !exists && status.is_ready() {
            members.push(node.to_string());
        }
        Memberlist(members)
    }
}

impl From<Vec<NodeId>> for Memberlist {
    fn from(members: Vec<NodeId>) -> Self {
        Self(members)
    }
}

impl<S: Into<NodeId>> FromIterator<S> for Memberlist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a Memberlist {
    type Item = &'a NodeId;
    type IntoIter = std::slice::Iter<'a, NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Memberlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}
