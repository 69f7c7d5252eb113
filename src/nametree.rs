//! The name summary tree: a radix tree keyed on domain-name labels, walked
//! from the TLD end. Each node can carry two pair-bitsets: `pair` for triggers
//! on exactly this name and `wild` for triggers that were declared as
//! `*.<this name>` and therefore match proper descendants only.
use std::collections::HashMap;

use crate::error::{RPZError, RPZResult};
use crate::name::DomainName;
use crate::zbits::PairBits;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NameBits {
    /// Zones triggering on the exact name
    pub pair: PairBits,
    /// Zones triggering on `*.<name>`
    pub wild: PairBits,
}

impl NameBits {
    pub fn is_empty(&self) -> bool {
        self.pair.is_empty() && self.wild.is_empty()
    }

    pub fn union(&self, other: &NameBits) -> NameBits {
        NameBits {
            pair: self.pair.union(&other.pair),
            wild: self.wild.union(&other.wild),
        }
    }

    pub fn minus(&self, other: &NameBits) -> NameBits {
        NameBits {
            pair: self.pair.minus(&other.pair),
            wild: self.wild.minus(&other.wild),
        }
    }

    pub fn overlaps(&self, other: &NameBits) -> bool {
        self.pair.overlaps(&other.pair) || self.wild.overlaps(&other.wild)
    }

    /// Both halves restricted to zones other than `num`.
    pub fn without_zone(&self, num: crate::zbits::ZoneNum) -> NameBits {
        NameBits {
            pair: self.pair.without_zone(num),
            wild: self.wild.without_zone(num),
        }
    }
}

#[derive(Debug, Default)]
struct NameNode {
    children: HashMap<String, NameNode>,
    bits: NameBits,
}

#[derive(Debug, Default)]
pub struct NameTree {
    root: NameNode,
}

impl NameTree {
    pub fn new() -> Self {
        NameTree::default()
    }

    /// Record trigger bits for a name. The caller has already turned a
    /// wildcard owner into (parent name, `wild` bits). `AlreadyExists` when
    /// any requested bit is present.
    pub fn add(&mut self, name: &DomainName, new: &NameBits) -> RPZResult<()> {
        let mut node = &mut self.root;
        for label in name.labels().iter().rev() {
            node = node.children.entry(label.clone()).or_default();
        }
        if node.bits.overlaps(new) {
            return Err(RPZError::AlreadyExists);
        }
        node.bits = node.bits.union(new);
        Ok(())
    }

    /// Clear trigger bits for a name, reporting whether any were there and
    /// pruning nodes left with no bits and no children. Clearing what is not
    /// there is a silent no-op.
    pub fn delete(&mut self, name: &DomainName, del: &NameBits) -> bool {
        let labels: Vec<&String> = name.labels().iter().rev().collect();
        del_node(&mut self.root, &labels, del).0
    }

    /// Union of the exact node's `pair` and every ancestor's `wild`, masked
    /// by the caller's zone set. No priority trimming here: the caller keeps
    /// the whole candidate set and decides later.
    pub fn find(&self, name: &DomainName, tgt: &PairBits) -> PairBits {
        let mut found = PairBits::default();
        let mut node = &self.root;
        let labels = name.labels();

        for (depth, label) in labels.iter().rev().enumerate() {
            // the node is a proper ancestor of the query name
            found = found.union(&node.bits.wild);
            match node.children.get(label.as_str()) {
                Some(child) => node = child,
                None => return found.intersect(tgt),
            }
            if depth == labels.len() - 1 {
                // the node is the query name itself
                found = found.union(&node.bits.pair);
            }
        }
        if labels.is_empty() {
            found = found.union(&node.bits.pair);
        }
        found.intersect(tgt)
    }

    /// Visit every name carrying bits, used for reload cross-copies and
    /// counter recomputation.
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&DomainName, &NameBits),
    {
        let mut path: Vec<String> = Vec::new();
        walk_node(&self.root, &mut path, f);
    }
}

fn walk_node<F>(node: &NameNode, path: &mut Vec<String>, f: &mut F)
where
    F: FnMut(&DomainName, &NameBits),
{
    if !node.bits.is_empty() {
        // the path runs TLD-first; a name wants its labels the other way
        let labels: Vec<String> = path.iter().rev().cloned().collect();
        f(&DomainName::from_labels(labels), &node.bits);
    }
    for (label, child) in &node.children {
        path.push(label.clone());
        walk_node(child, path, f);
        path.pop();
    }
}

// Returns (cleared anything, node became useless and should be unlinked).
fn del_node(node: &mut NameNode, labels: &[&String], del: &NameBits) -> (bool, bool) {
    let cleared = match labels.split_first() {
        None => {
            let cleared = node.bits.overlaps(del);
            node.bits = node.bits.minus(del);
            cleared
        }
        Some((label, rest)) => match node.children.get_mut(label.as_str()) {
            Some(child) => {
                let (cleared, prune) = del_node(child, rest, del);
                if prune {
                    node.children.remove(label.as_str());
                }
                cleared
            }
            None => false,
        },
    };
    (cleared, node.bits.is_empty() && node.children.is_empty())
}
