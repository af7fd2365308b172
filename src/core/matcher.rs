//! Level-ordered, short-circuiting evaluation of the whole rule store
//! against one event.
//!
//! The matcher first evaluates the predicate frontier, then drains per-level
//! worklists from the lowest level up, so that in the common case every
//! child is resolved before its parent is dequeued and the sweep stays
//! linear in the number of reachable nodes. Shared sub-expressions crossing
//! levels are covered by a recursive lazy-evaluation fallback.

use std::hash::Hash;

use tracing::trace;

use crate::core::dag::{Dag, Node, NodeId};
use crate::core::event::Event;
use crate::core::expr::Connective;
use crate::core::value::Truth;

/// Reusable per-match scratch state.
///
/// Holds the tri-state result cache and the per-level worklists. One match
/// needs O(reachable nodes) cache and worklist space; pooling the scratch
/// across events keeps steady-state matching free of allocator traffic.
#[derive(Debug, Default)]
pub struct MatchScratch {
    /// Tri-state result per node slot; `None` is unset.
    results: Vec<Option<Truth>>,

    /// Pending parent evaluations, indexed by level.
    worklists: Vec<Vec<NodeId>>,

    /// Predicate evaluations performed by the last match.
    pub(crate) predicate_evals: u64,
}

impl MatchScratch {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, slots: usize, max_level: u32) {
        self.results.clear();
        self.results.resize(slots, None);
        for worklist in &mut self.worklists {
            worklist.clear();
        }
        let levels = max_level as usize + 1;
        if self.worklists.len() < levels {
            self.worklists.resize_with(levels, Vec::new);
        }
        self.predicate_evals = 0;
    }
}

/// Evaluates every rule in the store against one event.
///
/// Returns the subscriptions of all roots that evaluate to [Truth::True],
/// in resolution order. The match set is deterministic; the order within it
/// is not part of the contract.
pub(crate) fn search<S: Clone + Eq + Hash>(
    dag: &Dag<S>,
    event: &Event,
    scratch: &mut MatchScratch,
) -> Vec<S> {
    scratch.reset(dag.capacity(), dag.max_level());
    let mut matches = Vec::new();

    // Frontier pass: evaluate every primed leaf and wake its parents.
    for leaf in dag.frontier() {
        if scratch.results[leaf].is_some() {
            continue;
        }
        let truth = evaluate(dag, leaf, event, scratch);
        settle(dag, leaf, truth, scratch, &mut matches);
    }

    // Level sweep, lowest first, so children resolve before their parents.
    for level in 2..=dag.max_level() as usize {
        while let Some(id) = scratch.worklists[level].pop() {
            if scratch.results[id].is_some() {
                continue;
            }
            let truth = evaluate(dag, id, event, scratch);
            settle(dag, id, truth, scratch, &mut matches);
        }
    }

    trace!(
        matches = matches.len(),
        predicate_evals = scratch.predicate_evals,
        "event matched"
    );
    matches
}

/// Evaluates a node, recursing into unresolved children on demand.
///
/// Predicate leaves are evaluated lazily; children are combined in stored
/// order (cheapest first) with early exit, so an And stops at its first
/// false child and an Or at its first true one.
fn evaluate<S: Clone + Eq + Hash>(
    dag: &Dag<S>,
    id: NodeId,
    event: &Event,
    scratch: &mut MatchScratch,
) -> Truth {
    if let Some(truth) = scratch.results[id] {
        return truth;
    }
    let truth = match &dag.entry(id).node {
        Node::Leaf(predicate) => {
            scratch.predicate_evals += 1;
            predicate.evaluate(event.value(predicate.attribute))
        }
        Node::Op {
            connective,
            children,
        } => {
            let mut undefined = false;
            let mut resolved = None;
            for &child in children {
                match (connective, evaluate(dag, child, event, scratch)) {
                    (Connective::And, Truth::False) => {
                        resolved = Some(Truth::False);
                        break;
                    }
                    (Connective::Or, Truth::True) => {
                        resolved = Some(Truth::True);
                        break;
                    }
                    (_, Truth::Undefined) => undefined = true,
                    _ => (),
                }
            }
            resolved.unwrap_or(if undefined {
                Truth::Undefined
            } else {
                match connective {
                    Connective::And => Truth::True,
                    Connective::Or => Truth::False,
                }
            })
        }
    };
    scratch.results[id] = Some(truth);
    truth
}

/// Records a freshly resolved node: collects its subscriptions when true and
/// propagates to its parents.
fn settle<S: Clone + Eq + Hash>(
    dag: &Dag<S>,
    id: NodeId,
    truth: Truth,
    scratch: &mut MatchScratch,
    matches: &mut Vec<S>,
) {
    let entry = dag.entry(id);
    if truth == Truth::True && entry.is_root() {
        matches.extend(entry.subscriptions.iter().cloned());
    }
    // A false child resolves And parents immediately, without visiting
    // their siblings; resolution can cascade through ancestor chains.
    let mut cascades = Vec::new();
    wake_parents(dag, id, truth, scratch, &mut cascades);
    while let Some(parent) = cascades.pop() {
        wake_parents(dag, parent, Truth::False, scratch, &mut cascades);
    }
}

/// Applies the scheduling rule to every unresolved parent of one node:
/// short-circuit And parents of a false child, enqueue the rest at their
/// level. Short-circuited roots are thereby suppressed from the match list.
fn wake_parents<S: Clone + Eq + Hash>(
    dag: &Dag<S>,
    id: NodeId,
    truth: Truth,
    scratch: &mut MatchScratch,
    cascades: &mut Vec<NodeId>,
) {
    for &parent in &dag.entry(id).parents {
        if scratch.results[parent].is_some() {
            continue;
        }
        let parent_entry = dag.entry(parent);
        let is_and = matches!(
            parent_entry.node,
            Node::Op {
                connective: Connective::And,
                ..
            }
        );
        if truth == Truth::False && is_and {
            scratch.results[parent] = Some(Truth::False);
            cascades.push(parent);
        } else {
            scratch.worklists[parent_entry.level as usize].push(parent);
        }
    }
}
