//! The CIDR radix tree: a Patricia trie over 128-bit address keys. Every node
//! carries the trigger bits declared exactly at its prefix (`pair`) and the
//! union of the bits in its whole subtree (`sum`), so a descent can stop as
//! soon as nothing below can match.
//!
//! Nodes live in an arena and point at each other by index, which sidesteps
//! the owning parent/child pointer cycle.
use crate::ipkey::{diff_keys, IpKey, KEY_BITS};
use crate::zbits::PairBits;
use crate::error::{RPZError, RPZResult};

#[derive(Debug, Clone)]
struct CidrNode {
    /// Prefix-masked key: bits past `prefix` are zero
    ip: IpKey,
    prefix: u8,
    /// Triggers declared at exactly this prefix
    pair: PairBits,
    /// `pair` unioned over this node and its whole subtree
    sum: PairBits,
    parent: Option<usize>,
    /// The child slot is the key bit just past this node's prefix
    child: [Option<usize>; 2],
}

/// What a longest-match lookup found: the node's key, prefix and trigger bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrMatch {
    pub ip: IpKey,
    pub prefix: u8,
    pub pair: PairBits,
}

#[derive(Debug, Default)]
pub struct CidrTree {
    nodes: Vec<CidrNode>,
    free: Vec<usize>,
    root: Option<usize>,
}

impl CidrTree {
    pub fn new() -> Self {
        CidrTree::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn new_node(&mut self, key: &IpKey, prefix: u8) -> usize {
        let node = CidrNode {
            ip: key.masked(prefix),
            prefix,
            pair: PairBits::default(),
            sum: PairBits::default(),
            parent: None,
            child: [None, None],
        };
        match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free.push(idx);
    }

    /// Recompute `sum` from `idx` upward, stopping at the first ancestor
    /// whose sum is already right.
    fn set_sum(&mut self, mut idx: usize) {
        loop {
            let node = &self.nodes[idx];
            let mut sum = node.pair;
            if let Some(c) = node.child[0] {
                sum = sum.union(&self.nodes[c].sum);
            }
            if let Some(c) = node.child[1] {
                sum = sum.union(&self.nodes[c].sum);
            }
            if self.nodes[idx].sum == sum {
                break;
            }
            self.nodes[idx].sum = sum;
            match self.nodes[idx].parent {
                Some(p) => idx = p,
                None => break,
            }
        }
    }

    fn replace_in_parent(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let slot = (self.nodes[p].child[1] == Some(old)) as usize;
                self.nodes[p].child[slot] = new;
            }
        }
    }

    /// Add trigger bits for `(key, prefix)`. `AlreadyExists` when the exact
    /// node already carries any of the requested bits.
    pub fn add(&mut self, key: &IpKey, prefix: u8, new: &PairBits) -> RPZResult<()> {
        let mut parent: Option<usize> = None;
        let mut cur_num = 0usize;
        let mut cur = self.root;

        loop {
            let c = match cur {
                None => {
                    // no child to descend into: attach the target here
                    let child = self.new_node(key, prefix);
                    self.nodes[child].pair = *new;
                    self.nodes[child].parent = parent;
                    match parent {
                        None => self.root = Some(child),
                        Some(p) => self.nodes[p].child[cur_num] = Some(child),
                    }
                    self.set_sum(child);
                    return Ok(());
                }
                Some(c) => c,
            };

            let (c_ip, c_prefix) = (self.nodes[c].ip, self.nodes[c].prefix);
            let dbit = diff_keys(key, prefix, &c_ip, c_prefix);

            if dbit == prefix {
                if prefix == c_prefix {
                    // the node's key matches the target exactly
                    if self.nodes[c].pair.overlaps(new) {
                        return Err(RPZError::AlreadyExists);
                    }
                    self.nodes[c].pair = self.nodes[c].pair.union(new);
                    self.set_sum(c);
                    return Ok(());
                }

                // the target is shorter than the node: splice it in above
                let new_parent = self.new_node(key, prefix);
                self.nodes[new_parent].parent = parent;
                match parent {
                    None => self.root = Some(new_parent),
                    Some(p) => self.nodes[p].child[cur_num] = Some(new_parent),
                }
                let child_num = c_ip.bit(prefix);
                self.nodes[new_parent].child[child_num] = Some(c);
                self.nodes[c].parent = Some(new_parent);
                self.nodes[new_parent].pair = *new;
                self.set_sum(new_parent);
                return Ok(());
            }

            if dbit == c_prefix {
                // the node covers the target; keep descending
                parent = Some(c);
                cur_num = key.bit(dbit);
                cur = self.nodes[c].child[cur_num];
                continue;
            }

            // the keys fork strictly below both prefixes: insert a forking
            // parent with the node and a fresh leaf as its two children
            let sibling = self.new_node(key, prefix);
            self.nodes[sibling].pair = *new;
            let fork = self.new_node(key, dbit);
            self.nodes[fork].parent = parent;
            match parent {
                None => self.root = Some(fork),
                Some(p) => self.nodes[p].child[cur_num] = Some(fork),
            }
            let child_num = key.bit(dbit);
            self.nodes[fork].child[child_num] = Some(sibling);
            self.nodes[fork].child[1 - child_num] = Some(c);
            self.nodes[c].parent = Some(fork);
            self.nodes[sibling].parent = Some(fork);
            self.set_sum(sibling);
            return Ok(());
        }
    }

    /// Find the node for exactly `(key, prefix)` carrying any of `pair`.
    fn find_exact(&self, key: &IpKey, prefix: u8, pair: &PairBits) -> Option<usize> {
        let mut cur = self.root;
        while let Some(c) = cur {
            let node = &self.nodes[c];
            if !node.sum.overlaps(pair) {
                return None;
            }
            let dbit = diff_keys(key, prefix, &node.ip, node.prefix);
            if dbit == prefix {
                if prefix == node.prefix && node.pair.overlaps(pair) {
                    return Some(c);
                }
                return None;
            }
            if dbit == node.prefix {
                cur = node.child[key.bit(dbit)];
                continue;
            }
            return None;
        }
        None
    }

    /// Remove trigger bits from the exact node for `(key, prefix)`, reporting
    /// whether anything was there. Absent nodes and absent bits are silently
    /// ignored; a node left with no bits of its own is pruned or collapsed.
    pub fn delete(&mut self, key: &IpKey, prefix: u8, del: &PairBits) -> bool {
        let tgt = match self.find_exact(key, prefix, del) {
            Some(t) => t,
            None => return false,
        };

        self.nodes[tgt].pair = self.nodes[tgt].pair.minus(del);
        self.set_sum(tgt);

        // walk up pruning nodes with no own bits and at most one child;
        // removing one node can make its parent prunable in turn
        let mut cur = Some(tgt);
        while let Some(c) = cur {
            let node = &self.nodes[c];
            if !node.pair.is_empty() {
                break;
            }
            if node.child[0].is_some() && node.child[1].is_some() {
                break;
            }
            let child = node.child[0].or(node.child[1]);
            let parent = node.parent;

            self.replace_in_parent(parent, c, child);
            if let Some(ch) = child {
                self.nodes[ch].parent = parent;
            }
            self.free_node(c);
            cur = parent;
        }
        true
    }

    /// Longest-prefix match for a full 128-bit address under "first zone
    /// wins": each hit trims away zones of lower priority than the best one
    /// seen, so a deeper node only replaces the match when a surviving zone
    /// declared it.
    pub fn lookup(&self, key: &IpKey, tgt: &PairBits) -> Option<CidrMatch> {
        let mut live = *tgt;
        let mut best: Option<usize> = None;
        let mut cur = self.root;

        while let Some(c) = cur {
            let node = &self.nodes[c];
            // nothing relevant at this node or below it
            if !node.sum.overlaps(&live) {
                break;
            }
            let dbit = diff_keys(key, KEY_BITS, &node.ip, node.prefix);
            if dbit == KEY_BITS {
                if node.pair.overlaps(&live) {
                    best = Some(c);
                }
                break;
            }
            if dbit == node.prefix {
                if node.pair.overlaps(&live) {
                    best = Some(c);
                    live = live.trim(&node.pair);
                }
                cur = node.child[key.bit(dbit)];
                continue;
            }
            // the keys fork: nothing below can cover the address
            break;
        }

        best.map(|idx| {
            let node = &self.nodes[idx];
            CidrMatch {
                ip: node.ip,
                prefix: node.prefix,
                pair: node.pair,
            }
        })
    }

    /// Depth-first visit of every node, used for reload cross-copies and
    /// counter recomputation.
    pub fn walk<F>(&self, f: &mut F)
    where
        F: FnMut(&IpKey, u8, &PairBits),
    {
        let mut stack = Vec::new();
        if let Some(root) = self.root {
            stack.push(root);
        }
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            f(&node.ip, node.prefix, &node.pair);
            if let Some(c) = node.child[0] {
                stack.push(c);
            }
            if let Some(c) = node.child[1] {
                stack.push(c);
            }
        }
    }

    /// Check the structural invariants of the whole tree; test support.
    #[cfg(test)]
    fn check_invariants(&self) {
        let mut stack = Vec::new();
        if let Some(root) = self.root {
            assert!(self.nodes[root].parent.is_none());
            stack.push(root);
        }
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            assert!(!node.ip.has_bits_past(node.prefix), "key not masked");
            assert!(
                !node.pair.is_empty() || node.child.iter().all(|c| c.is_some()),
                "useless node survived"
            );

            let mut sum = node.pair;
            for (slot, child) in node.child.iter().enumerate() {
                if let Some(c) = *child {
                    let cnode = &self.nodes[c];
                    assert_eq!(cnode.parent, Some(idx));
                    assert!(cnode.prefix > node.prefix);
                    assert_eq!(
                        diff_keys(&cnode.ip, cnode.prefix, &node.ip, node.prefix),
                        node.prefix,
                        "child key does not extend parent key"
                    );
                    assert_eq!(cnode.ip.bit(node.prefix), slot, "child in wrong slot");
                    sum = sum.union(&cnode.sum);
                    stack.push(c);
                }
            }
            assert_eq!(node.sum, sum, "sum invariant broken");
        }
    }
}
