//! The shared rule store: an arena of use-counted nodes with structural
//! deduplication, parent back-edges, levels, and the predicate frontier.

use std::hash::Hash;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::core::expr::{Connective, Optimized, OptimizedOp};
use crate::core::predicate::Predicate;
use crate::error::{EngineError, Result};

/// Identifier type for nodes.
///
/// Serves as an index into [Dag::entries]. Freed slots are recycled, so an
/// index is only meaningful while its node is live; parent and child lists
/// of live nodes never hold indices of dead ones.
pub(crate) type NodeId = usize;

/// The payload of an arena slot.
#[derive(Debug)]
pub(crate) enum Node {
    /// A predicate leaf, level 1.
    Leaf(Predicate),

    /// A binary connective over two interned children, ordered by ascending
    /// cost so the matcher naturally short-circuits on the cheap side.
    Op {
        connective: Connective,
        children: [NodeId; 2],
    },
}

/// One live node plus its bookkeeping.
///
/// The entry index is the node's identity within the DAG. Any node may carry
/// subscriptions: a node interned as a child by one rule can later be
/// deduplicated onto by another rule's root, which attaches subscriptions to
/// what structurally remains an inner node.
#[derive(Debug)]
pub(crate) struct Entry<S> {
    pub(crate) node: Node,

    /// Content-addressed identifier of the expression this node represents.
    pub(crate) expression_id: u64,

    pub(crate) cost: u64,

    /// Longest path to any leaf below, plus one. Leaves sit at level 1.
    pub(crate) level: u32,

    /// Number of incoming parent edges plus attached subscriptions. The node
    /// is destroyed when this drops to zero.
    pub(crate) use_count: u32,

    pub(crate) parents: SmallVec<[NodeId; 2]>,

    /// Subscriptions whose rule is rooted at this node. No duplicates.
    pub(crate) subscriptions: Vec<S>,

    /// Whether this node currently contributes to the predicate frontier.
    primed: bool,
}

impl<S> Entry<S> {
    pub(crate) fn is_root(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

/// The shared DAG of all registered rules.
///
/// Nodes live in an append-indexed pool with a free list; [Dag::index] maps
/// every live node's expression identifier to its unique slot, which is what
/// enforces structural sharing across rules. The [Dag::frontier] is the set
/// of leaf nodes the matcher evaluates unconditionally at the start of each
/// event: every leaf reachable from a primed root through both children of
/// Or nodes and only the cheapest child of And nodes. An AND short-circuits
/// on its first false child, so priming its cheapest leaf suffices to
/// trigger evaluation; an OR must wake on any true child.
#[derive(Debug)]
pub(crate) struct Dag<S> {
    /// All node slots; `None` marks a freed slot awaiting reuse.
    entries: Vec<Option<Entry<S>>>,

    /// Freed slots, reused before the pool grows.
    free: Vec<NodeId>,

    /// Maps expression identifiers to slots. Bijective on live nodes: two
    /// nodes with the same identifier never coexist.
    index: FxHashMap<u64, NodeId>,

    /// Maps each registered subscription to its root node.
    rules: FxHashMap<S, NodeId>,

    /// Reference-counted frontier membership. Counts let the symmetric walk
    /// at removal time restore the exact state before the rule was added.
    frontier: FxHashMap<NodeId, u32>,

    /// Level of the highest live root; bounds the matcher's level sweep.
    max_level: u32,
}

impl<S: Clone + Eq + Hash> Dag<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
            rules: FxHashMap::default(),
            frontier: FxHashMap::default(),
            max_level: 0,
        }
    }

    pub(crate) fn entry(&self, id: NodeId) -> &Entry<S> {
        self.entries[id].as_ref().unwrap()
    }

    fn entry_mut(&mut self, id: NodeId) -> &mut Entry<S> {
        self.entries[id].as_mut().unwrap()
    }

    /// Number of live nodes.
    pub(crate) fn live_count(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Number of slots ever allocated; bounds every live [NodeId].
    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn max_level(&self) -> u32 {
        self.max_level
    }

    pub(crate) fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub(crate) fn frontier(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.frontier.keys().copied()
    }

    pub(crate) fn iter_live(&self) -> impl Iterator<Item = (NodeId, &Entry<S>)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|entry| (id, entry)))
    }

    /// Registers a rule: interns the optimized expression, attaches the
    /// subscription to the root node, and primes the predicate frontier.
    ///
    /// A subscription id may root at most one rule at a time; re-registering
    /// a live one is rejected without touching the store.
    pub(crate) fn insert_root(&mut self, subscription: S, optimized: &Optimized) -> Result<()> {
        if self.rules.contains_key(&subscription) {
            return Err(EngineError::InvalidExpression(
                "subscription id is already registered".to_string(),
            ));
        }
        let root = self.intern(optimized);
        let entry = self.entry_mut(root);
        entry.subscriptions.push(subscription.clone());
        entry.use_count += 1;
        let level = entry.level;
        if !entry.primed {
            entry.primed = true;
            self.prime(root);
        }
        self.rules.insert(subscription, root);
        self.max_level = self.max_level.max(level);
        debug!(
            nodes = self.live_count(),
            rules = self.rules.len(),
            max_level = self.max_level,
            "rule added"
        );
        Ok(())
    }

    /// Adds or looks up the node for an optimized expression.
    ///
    /// This is the only way nodes are created, and it ensures structural
    /// sharing: an expression whose identifier is already mapped reuses the
    /// existing node, however it was created. Fresh nodes start with a use
    /// count of zero; edges and subscriptions account for every increment.
    fn intern(&mut self, optimized: &Optimized) -> NodeId {
        if let Some(&existing) = self.index.get(&optimized.id) {
            return existing;
        }
        let (node, level, children) = match &optimized.op {
            OptimizedOp::Value(predicate) => (Node::Leaf(predicate.clone()), 1, None),
            OptimizedOp::And(left, right) | OptimizedOp::Or(left, right) => {
                let connective = match &optimized.op {
                    OptimizedOp::And(..) => Connective::And,
                    _ => Connective::Or,
                };
                // Canonical order in `Optimized` is cost-ascending already.
                let left = self.intern(left);
                let right = self.intern(right);
                let level = 1 + self.entry(left).level.max(self.entry(right).level);
                (
                    Node::Op {
                        connective,
                        children: [left, right],
                    },
                    level,
                    Some([left, right]),
                )
            }
        };
        let id = self.alloc(Entry {
            node,
            expression_id: optimized.id,
            cost: optimized.cost,
            level,
            use_count: 0,
            parents: SmallVec::new(),
            subscriptions: Vec::new(),
            primed: false,
        });
        if let Some(children) = children {
            for child in children {
                let entry = self.entry_mut(child);
                entry.parents.push(id);
                entry.use_count += 1;
            }
        }
        self.index.insert(optimized.id, id);
        id
    }

    fn alloc(&mut self, entry: Entry<S>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.entries[id] = Some(entry);
                id
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        }
    }

    /// Unregisters a rule. Unknown subscriptions are a no-op.
    pub(crate) fn remove_rule(&mut self, subscription: &S) {
        let Some(root) = self.rules.remove(subscription) else {
            return;
        };
        let entry = self.entry_mut(root);
        entry.subscriptions.retain(|s| s != subscription);
        entry.use_count -= 1;
        let lost_root_status = entry.subscriptions.is_empty() && entry.use_count > 0;
        if lost_root_status && entry.primed {
            // The node stays live as a shared child but no longer needs
            // frontier coverage of its own.
            entry.primed = false;
            self.unprime(root);
        }
        if self.entry(root).use_count == 0 {
            self.release(root);
        }
        let max_level = self
            .rules
            .values()
            .map(|&root| self.entry(root).level)
            .max()
            .unwrap_or(0);
        self.max_level = max_level;
        debug!(
            nodes = self.live_count(),
            rules = self.rules.len(),
            max_level = self.max_level,
            "rule removed"
        );
    }

    /// Frees a node whose use count reached zero, decrementing children and
    /// sweeping any that reach zero themselves.
    fn release(&mut self, id: NodeId) {
        let mut dead = vec![id];
        while let Some(id) = dead.pop() {
            // Unpriming walks the structure below, so it must happen before
            // the slot is torn down.
            if self.entry(id).primed {
                self.entry_mut(id).primed = false;
                self.unprime(id);
            }
            let entry = self.entries[id].take().unwrap();
            self.index.remove(&entry.expression_id);
            self.free.push(id);
            if let Node::Op { children, .. } = entry.node {
                for child in children {
                    let child_entry = self.entry_mut(child);
                    if let Some(position) =
                        child_entry.parents.iter().position(|&parent| parent == id)
                    {
                        child_entry.parents.swap_remove(position);
                    }
                    child_entry.use_count -= 1;
                    if child_entry.use_count == 0 {
                        dead.push(child);
                    }
                }
            }
        }
    }

    /// Adds this root's frontier contribution.
    fn prime(&mut self, root: NodeId) {
        self.walk_frontier(root, true);
    }

    /// Removes the contribution [Dag::prime] added for this root. The walk
    /// only depends on node structure and child order, both immutable after
    /// creation, so it retraces the priming walk exactly.
    fn unprime(&mut self, root: NodeId) {
        self.walk_frontier(root, false);
    }

    fn walk_frontier(&mut self, root: NodeId, add: bool) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            match &self.entries[id].as_ref().unwrap().node {
                Node::Leaf(_) => {
                    if add {
                        *self.frontier.entry(id).or_insert(0) += 1;
                    } else {
                        let count = self.frontier.get_mut(&id).unwrap();
                        *count -= 1;
                        if *count == 0 {
                            self.frontier.remove(&id);
                        }
                    }
                }
                Node::Op {
                    connective: Connective::And,
                    children,
                } => {
                    // The access child: children are cost-ordered, so the
                    // cheapest all-AND path continues through the first.
                    pending.push(children[0]);
                }
                Node::Op {
                    connective: Connective::Or,
                    children,
                } => {
                    pending.extend(children);
                }
            }
        }
    }

    /// Panics if any live-set invariant is violated.
    ///
    /// Checks the id-to-index bijection, use-count accounting, child cost
    /// ordering, the level invariant, root reachability, and the frontier
    /// counts. All assertions are for tests and debug builds.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn assert_valid(&self) {
        use rustc_hash::FxHashSet;

        let mut live = 0;
        let mut edge_counts: FxHashMap<NodeId, u32> = FxHashMap::default();
        for (id, entry) in self.iter_live() {
            live += 1;
            assert_eq!(self.index.get(&entry.expression_id), Some(&id));
            if let Node::Op { children, .. } = &entry.node {
                let [left, right] = children;
                assert!(self.entry(*left).cost <= self.entry(*right).cost);
                let child_level = self.entry(*left).level.max(self.entry(*right).level);
                assert_eq!(entry.level, 1 + child_level);
                for child in children {
                    *edge_counts.entry(*child).or_insert(0) += 1;
                    assert!(self
                        .entry(*child)
                        .parents
                        .iter()
                        .any(|&parent| parent == id));
                }
            } else {
                assert_eq!(entry.level, 1);
            }
        }
        assert_eq!(self.index.len(), live);

        for (id, entry) in self.iter_live() {
            let edges = edge_counts.get(&id).copied().unwrap_or(0);
            assert_eq!(entry.use_count, edges + entry.subscriptions.len() as u32);
            assert_eq!(entry.parents.len() as u32, edges);
        }

        // Every live node is reachable from a root and vice versa.
        let mut reachable = FxHashSet::default();
        let mut pending: Vec<NodeId> = self.rules.values().copied().collect();
        while let Some(id) = pending.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Node::Op { children, .. } = &self.entry(id).node {
                pending.extend(children);
            }
        }
        assert_eq!(reachable.len(), live);

        for (subscription, &root) in &self.rules {
            assert!(self.entry(root).subscriptions.contains(subscription));
        }

        let mut expected_frontier: FxHashMap<NodeId, u32> = FxHashMap::default();
        for (id, entry) in self.iter_live() {
            assert_eq!(entry.primed, entry.is_root());
            if !entry.primed {
                continue;
            }
            let mut pending = vec![id];
            while let Some(id) = pending.pop() {
                match &self.entry(id).node {
                    Node::Leaf(_) => *expected_frontier.entry(id).or_insert(0) += 1,
                    Node::Op {
                        connective: Connective::And,
                        children,
                    } => pending.push(children[0]),
                    Node::Op {
                        connective: Connective::Or,
                        children,
                    } => pending.extend(children),
                }
            }
        }
        assert_eq!(self.frontier, expected_frontier);
    }
}
