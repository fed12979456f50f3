use crate::chord::types::{IdSpace, NodeId, NodeRef};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finger {
    /// owner + 2^i mod 2^m
    pub start: NodeId,
    /// Unresolved until the first fix-finger tick reaches this entry.
    pub node: Option<NodeRef>,
}

/// m routing shortcuts; entry i points at the owner of `owner + 2^i`.
#[derive(Debug, Clone)]
pub struct FingerTable {
    owner: NodeId,
    entries: Vec<Finger>,
}

impl FingerTable {
    pub fn new(space: IdSpace, owner: NodeId) -> Self {
        let entries = (0..space.bits())
            .map(|i| Finger {
                start: space.add_pow2(owner, i),
                node: None,
            })
            .collect();
        Self { owner, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn start(&self, index: usize) -> Option<NodeId> {
        self.entries.get(index).map(|f| f.start)
    }

    pub fn get(&self, index: usize) -> Option<&NodeRef> {
        self.entries.get(index).and_then(|f| f.node.as_ref())
    }

    pub fn set(&mut self, index: usize, node: Option<NodeRef>) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.node = node;
        }
    }

    pub fn entries(&self) -> &[Finger] {
        &self.entries
    }

    /// Forgets every entry resolved to `id`. Returns how many were cleared.
    pub fn clear_node(&mut self, id: NodeId) -> usize {
        let mut cleared = 0;
        for entry in &mut self.entries {
            if entry.node.as_ref().is_some_and(|n| n.id == id) {
                entry.node = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Scans from the farthest finger down and returns the first one lying
    /// strictly between the owner and `target`, skipping `excluded`.
    pub fn closest_preceding(&self, target: NodeId, excluded: &HashSet<NodeId>) -> Option<&NodeRef> {
        self.entries
            .iter()
            .rev()
            .filter_map(|f| f.node.as_ref())
            .find(|n| n.id.between(&self.owner, &target) && !excluded.contains(&n.id))
    }

    /// Distinct peers (other than the owner) currently referenced.
    pub fn known_peers(&self) -> Vec<&NodeRef> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter_map(|f| f.node.as_ref())
            .filter(|n| n.id != self.owner && seen.insert(n.id))
            .collect()
    }
}

/// The next r successors, nearest first, without duplicates and never
/// containing the owner.
#[derive(Debug, Clone)]
pub struct SuccessorList {
    owner: NodeId,
    capacity: usize,
    entries: Vec<NodeRef>,
}

impl SuccessorList {
    pub fn new(owner: NodeId, capacity: usize) -> Self {
        Self {
            owner,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn first(&self) -> Option<&NodeRef> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<NodeRef> {
        self.entries.clone()
    }

    /// Rebuilds the list as `head` followed by `tail`.
    pub fn replace<I>(&mut self, head: NodeRef, tail: I)
    where
        I: IntoIterator<Item = NodeRef>,
    {
        let candidates = std::iter::once(head).chain(tail);
        self.entries = self.normalize(candidates);
    }

    /// Puts a closer successor in front of the current entries.
    pub fn push_front(&mut self, node: NodeRef) {
        let current = std::mem::take(&mut self.entries);
        self.entries = self.normalize(std::iter::once(node).chain(current));
    }

    /// Adopts `node` as immediate successor, dropping entries that lie
    /// strictly between the owner and it.
    pub fn splice_front(&mut self, node: NodeRef) {
        let owner = self.owner;
        let new_id = node.id;
        let current = std::mem::take(&mut self.entries);
        let rest = current
            .into_iter()
            .filter(move |n| !n.id.between(&owner, &new_id));
        self.entries = self.normalize(std::iter::once(node).chain(rest));
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|n| n.id != id);
        before != self.entries.len()
    }

    /// Last entry strictly between the owner and `target`, skipping `excluded`.
    pub fn closest_preceding(&self, target: NodeId, excluded: &HashSet<NodeId>) -> Option<&NodeRef> {
        self.entries
            .iter()
            .rev()
            .find(|n| n.id.between(&self.owner, &target) && !excluded.contains(&n.id))
    }

    fn normalize<I>(&self, candidates: I) -> Vec<NodeRef>
    where
        I: IntoIterator<Item = NodeRef>,
    {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|n| n.id != self.owner && seen.insert(n.id))
            .take(self.capacity)
            .collect()
    }
}
