//! The engine: schema, string table, rule store, and matcher glued together
//! behind the public API.

use std::fmt::Write;
use std::hash::Hash;
use std::sync::Arc;

use crate::core::attr::{AttributeDef, Schema};
use crate::core::dag::{Dag, Node};
use crate::core::event::{Event, EventBuilder};
use crate::core::expr::{optimize, Connective, Expr};
use crate::core::matcher::{search, MatchScratch};
use crate::core::predicate::{
    CmpOp, EqOp, Haystack, ListOp, NullOp, NumLit, Predicate, PredicateKind, ScalarLit, SetOp,
};
use crate::core::strings::StringTable;
use crate::error::Result;

/// A boolean expression matching engine.
///
/// Subscribers register rules over a fixed attribute schema; events are
/// matched against the entire rule set at once. Rules sharing common
/// sub-expressions share DAG nodes, so the per-event work scales with the
/// number of distinct sub-expressions rather than the number of rules.
///
/// `S` identifies subscriptions; any cloneable, hashable type works. One
/// engine instance is single-threaded: rule insertion and removal must be
/// serialized externally, and only the string table may be shared between
/// instances.
#[derive(Debug)]
pub struct Engine<S> {
    schema: Schema,
    strings: Arc<StringTable>,
    dag: Dag<S>,
}

impl<S: Clone + Eq + Hash> Engine<S> {
    /// Creates an engine with a private string table.
    pub fn new(schema: impl IntoIterator<Item = AttributeDef>) -> Result<Self> {
        Self::with_strings(schema, Arc::new(StringTable::new()))
    }

    /// Creates an engine backed by a shared string table.
    ///
    /// Useful when several engine instances match events carrying the same
    /// string universe; the table is safe for concurrent interning.
    pub fn with_strings(
        schema: impl IntoIterator<Item = AttributeDef>,
        strings: Arc<StringTable>,
    ) -> Result<Self> {
        Ok(Self {
            schema: Schema::new(schema)?,
            strings,
            dag: Dag::new(),
        })
    }

    /// Registers a rule for a subscription.
    ///
    /// The expression is rewritten into its canonical negation-free form and
    /// interned into the shared DAG. On error the store is untouched.
    pub fn add_rule(&mut self, subscription: S, expression: &Expr) -> Result<()> {
        let optimized = optimize(expression, &self.schema, &self.strings)?;
        self.dag.insert_root(subscription, &optimized)
    }

    /// Unregisters a rule, releasing all nodes only it used. Removing an
    /// unknown subscription is a no-op.
    pub fn remove_rule(&mut self, subscription: &S) {
        self.dag.remove_rule(subscription);
    }

    /// Starts building an event against this engine's schema.
    pub fn event(&self) -> EventBuilder<'_> {
        EventBuilder::new(&self.schema, &self.strings)
    }

    /// Matches one event against all rules, allocating fresh scratch state.
    pub fn matches(&self, event: &Event) -> Vec<S> {
        let mut scratch = MatchScratch::new();
        self.matches_with(event, &mut scratch)
    }

    /// Matches one event, reusing caller-provided scratch state.
    ///
    /// Matching holds no locks and takes `&self`; callers that want
    /// concurrent matching on one instance keep one scratch per thread and
    /// must not mutate rules in flight.
    pub fn matches_with(&self, event: &Event, scratch: &mut MatchScratch) -> Vec<S> {
        search(&self.dag, event, scratch)
    }

    /// Number of registered rules.
    pub fn rule_count(&self) -> usize {
        self.dag.rule_count()
    }

    /// Number of live DAG nodes.
    pub fn node_count(&self) -> usize {
        self.dag.live_count()
    }

    pub(crate) fn dag(&self) -> &Dag<S> {
        &self.dag
    }

    /// Renders the live DAG in Graphviz dot syntax, for diagnostics.
    ///
    /// Leaves are labelled with their predicate, connectives with their
    /// operator; root nodes are drawn with double borders and list their
    /// subscription count. Edges point from children to parents.
    pub fn to_graphviz(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph rules {{");
        let _ = writeln!(out, "  rankdir=BT;");
        let _ = writeln!(out, "  node [shape=box];");
        for (id, entry) in self.dag.iter_live() {
            let label = match &entry.node {
                Node::Leaf(predicate) => self.predicate_label(predicate),
                Node::Op {
                    connective: Connective::And,
                    ..
                } => "and".to_string(),
                Node::Op {
                    connective: Connective::Or,
                    ..
                } => "or".to_string(),
            };
            let peripheries = if entry.is_root() { 2 } else { 1 };
            let _ = writeln!(
                out,
                "  n{id} [label=\"{}\", peripheries={peripheries}];",
                label.replace('"', "\\\"")
            );
        }
        for (id, entry) in self.dag.iter_live() {
            if let Node::Op { children, .. } = &entry.node {
                for child in children {
                    let _ = writeln!(out, "  n{child} -> n{id};");
                }
            }
        }
        let _ = writeln!(out, "}}");
        out
    }

    fn predicate_label(&self, predicate: &Predicate) -> String {
        let name = self.schema.get_by_id(predicate.attribute).name();
        let string = |reference| {
            self.strings
                .resolve(reference)
                .unwrap_or_else(|| "?".to_string())
        };
        let scalar = |literal: &ScalarLit| match literal {
            ScalarLit::Bool(value) => value.to_string(),
            ScalarLit::Int(value) => value.to_string(),
            ScalarLit::Float(value) => value.to_string(),
            ScalarLit::String(value) => format!("'{}'", string(*value)),
        };
        match &predicate.kind {
            PredicateKind::Variable => name.to_string(),
            PredicateKind::NegatedVariable => format!("!{name}"),
            PredicateKind::Equality(op, literal) => {
                let op = match op {
                    EqOp::Eq => "=",
                    EqOp::Ne => "!=",
                };
                format!("{name} {op} {}", scalar(literal))
            }
            PredicateKind::Comparison(op, value) => {
                let op = match op {
                    CmpOp::Lt => "<",
                    CmpOp::Le => "<=",
                    CmpOp::Gt => ">",
                    CmpOp::Ge => ">=",
                };
                let value = match value {
                    NumLit::Int(value) => value.to_string(),
                    NumLit::Float(value) => value.to_string(),
                };
                format!("{name} {op} {value}")
            }
            PredicateKind::Set(op, haystack) => {
                let op = match op {
                    SetOp::In => "in",
                    SetOp::NotIn => "not in",
                };
                let items = match haystack {
                    Haystack::Int(values) => values
                        .iter()
                        .map(i64::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                    Haystack::String(values) => values
                        .iter()
                        .map(|value| format!("'{}'", string(*value)))
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                format!("{name} {op} {{{items}}}")
            }
            PredicateKind::List(op, probe) => {
                let op = match op {
                    ListOp::OneOf => "one of",
                    ListOp::NoneOf => "none of",
                    ListOp::AllOf => "all of",
                    ListOp::NotAllOf => "not all of",
                };
                format!("{name} {op} [{} items]", probe.len())
            }
            PredicateKind::Null(op) => {
                let op = match op {
                    NullOp::IsNull => "is null",
                    NullOp::IsNotNull => "is not null",
                    NullOp::IsEmpty => "is empty",
                    NullOp::IsNotEmpty => "is not empty",
                };
                format!("{name} {op}")
            }
        }
    }
}
