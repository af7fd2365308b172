//! Leaf predicates: stable identifiers, cost estimates, negation, and
//! tri-state evaluation against event values.

use crate::core::attr::AttributeId;
use crate::core::hash::StableHasher;
use crate::core::strings::StringRef;
use crate::core::value::{AttributeValue, Truth};

/// Equality operators.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub(crate) enum EqOp {
    Eq,
    Ne,
}

/// Ordering comparison operators over numeric scalars.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub(crate) enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// Membership operators testing one scalar against a sorted haystack.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub(crate) enum SetOp {
    In,
    NotIn,
}

/// Operators testing a probe list against an event's list value.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub(crate) enum ListOp {
    OneOf,
    NoneOf,
    AllOf,
    NotAllOf,
}

/// Definedness and emptiness tests.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub(crate) enum NullOp {
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
}

/// A scalar literal carried by an equality predicate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ScalarLit {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(StringRef),
}

/// A numeric literal carried by a comparison predicate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NumLit {
    Int(i64),
    Float(f64),
}

/// The sorted, deduplicated haystack of a set-membership predicate.
///
/// Sortedness is established at construction so evaluation can binary-search.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Haystack {
    Int(Vec<i64>),
    String(Vec<StringRef>),
}

impl Haystack {
    pub(crate) fn len(&self) -> usize {
        match self {
            Haystack::Int(values) => values.len(),
            Haystack::String(values) => values.len(),
        }
    }
}

/// The probe list of a list predicate.
///
/// Int and String probes are sorted ascending at construction; the event-side
/// list they are tested against is unsorted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Probe {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<StringRef>),
}

impl Probe {
    pub(crate) fn len(&self) -> usize {
        match self {
            Probe::Bool(values) => values.len(),
            Probe::Int(values) => values.len(),
            Probe::Float(values) => values.len(),
            Probe::String(values) => values.len(),
        }
    }
}

/// The closed set of leaf tests over one attribute.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PredicateKind {
    /// A boolean attribute used directly as a truth value.
    Variable,

    /// The complement of [PredicateKind::Variable].
    NegatedVariable,

    Equality(EqOp, ScalarLit),
    Comparison(CmpOp, NumLit),
    Set(SetOp, Haystack),
    List(ListOp, Probe),
    Null(NullOp),
}

/// A leaf test bound to one attribute.
///
/// Two predicates are equal iff their attribute and kind are structurally
/// equal; the content-addressed [Predicate::id] then collides by
/// construction, which is what lets the DAG share one node between rules.
/// The identifier and the cost estimate are computed once, at construction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub(crate) attribute: AttributeId,
    pub(crate) kind: PredicateKind,
    pub(crate) id: u64,
    pub(crate) cost: u64,
}

impl Predicate {
    /// Binds a kind to an attribute, computing the stable id and the cost.
    ///
    /// The `(kind, attribute kind)` pairing has already been validated by the
    /// rewriter, which is the only construction site with the attribute name
    /// at hand for error reporting.
    pub(crate) fn new(attribute: AttributeId, kind: PredicateKind) -> Self {
        let id = Self::compute_id(attribute, &kind);
        let cost = Self::compute_cost(&kind);
        Self {
            attribute,
            kind,
            id,
            cost,
        }
    }

    /// Hashes the canonicalized payload: a variant tag, the attribute id, and
    /// the literal bytes in little-endian order. List contents are hashed in
    /// their sorted in-memory order.
    fn compute_id(attribute: AttributeId, kind: &PredicateKind) -> u64 {
        let mut hasher = StableHasher::new();
        hasher.write_u32(attribute);
        match kind {
            PredicateKind::Variable => hasher.write_u8(0),
            PredicateKind::NegatedVariable => hasher.write_u8(1),
            PredicateKind::Equality(op, literal) => {
                hasher.write_u8(2);
                hasher.write_u8(*op as u8);
                match literal {
                    ScalarLit::Bool(value) => {
                        hasher.write_u8(0);
                        hasher.write_u8(u8::from(*value));
                    }
                    ScalarLit::Int(value) => {
                        hasher.write_u8(1);
                        hasher.write_i64(*value);
                    }
                    ScalarLit::Float(value) => {
                        hasher.write_u8(2);
                        hasher.write_f64(*value);
                    }
                    ScalarLit::String(value) => {
                        hasher.write_u8(3);
                        hasher.write_u32(value.0);
                    }
                }
            }
            PredicateKind::Comparison(op, value) => {
                hasher.write_u8(3);
                hasher.write_u8(*op as u8);
                match value {
                    NumLit::Int(value) => {
                        hasher.write_u8(0);
                        hasher.write_i64(*value);
                    }
                    NumLit::Float(value) => {
                        hasher.write_u8(1);
                        hasher.write_f64(*value);
                    }
                }
            }
            PredicateKind::Set(op, haystack) => {
                hasher.write_u8(4);
                hasher.write_u8(*op as u8);
                match haystack {
                    Haystack::Int(values) => {
                        hasher.write_u8(0);
                        for value in values {
                            hasher.write_i64(*value);
                        }
                    }
                    Haystack::String(values) => {
                        hasher.write_u8(1);
                        for value in values {
                            hasher.write_u32(value.0);
                        }
                    }
                }
            }
            PredicateKind::List(op, probe) => {
                hasher.write_u8(5);
                hasher.write_u8(*op as u8);
                match probe {
                    Probe::Bool(values) => {
                        hasher.write_u8(0);
                        for value in values {
                            hasher.write_u8(u8::from(*value));
                        }
                    }
                    Probe::Int(values) => {
                        hasher.write_u8(1);
                        for value in values {
                            hasher.write_i64(*value);
                        }
                    }
                    Probe::Float(values) => {
                        hasher.write_u8(2);
                        for value in values {
                            hasher.write_f64(*value);
                        }
                    }
                    Probe::String(values) => {
                        hasher.write_u8(3);
                        for value in values {
                            hasher.write_u32(value.0);
                        }
                    }
                }
            }
            PredicateKind::Null(op) => {
                hasher.write_u8(6);
                hasher.write_u8(*op as u8);
            }
        }
        hasher.finish()
    }

    /// Estimates evaluation cost. Scalar tests are free; set membership pays
    /// per haystack element, list tests pay double per probe element.
    fn compute_cost(kind: &PredicateKind) -> u64 {
        match kind {
            PredicateKind::Variable
            | PredicateKind::NegatedVariable
            | PredicateKind::Equality(..)
            | PredicateKind::Comparison(..)
            | PredicateKind::Null(..) => 0,
            PredicateKind::Set(_, haystack) => haystack.len() as u64,
            PredicateKind::List(_, probe) => 2 * probe.len() as u64,
        }
    }

    /// Returns the predicate testing the complement, preserving the payload.
    ///
    /// Negation swaps the operator and is an involution.
    pub(crate) fn negate(&self) -> Self {
        let kind = match &self.kind {
            PredicateKind::Variable => PredicateKind::NegatedVariable,
            PredicateKind::NegatedVariable => PredicateKind::Variable,
            PredicateKind::Equality(op, literal) => {
                let op = match op {
                    EqOp::Eq => EqOp::Ne,
                    EqOp::Ne => EqOp::Eq,
                };
                PredicateKind::Equality(op, literal.clone())
            }
            PredicateKind::Comparison(op, value) => {
                let op = match op {
                    CmpOp::Lt => CmpOp::Ge,
                    CmpOp::Ge => CmpOp::Lt,
                    CmpOp::Le => CmpOp::Gt,
                    CmpOp::Gt => CmpOp::Le,
                };
                PredicateKind::Comparison(op, value.clone())
            }
            PredicateKind::Set(op, haystack) => {
                let op = match op {
                    SetOp::In => SetOp::NotIn,
                    SetOp::NotIn => SetOp::In,
                };
                PredicateKind::Set(op, haystack.clone())
            }
            PredicateKind::List(op, probe) => {
                let op = match op {
                    ListOp::OneOf => ListOp::NoneOf,
                    ListOp::NoneOf => ListOp::OneOf,
                    ListOp::AllOf => ListOp::NotAllOf,
                    ListOp::NotAllOf => ListOp::AllOf,
                };
                PredicateKind::List(op, probe.clone())
            }
            PredicateKind::Null(op) => {
                let op = match op {
                    NullOp::IsNull => NullOp::IsNotNull,
                    NullOp::IsNotNull => NullOp::IsNull,
                    NullOp::IsEmpty => NullOp::IsNotEmpty,
                    NullOp::IsNotEmpty => NullOp::IsEmpty,
                };
                PredicateKind::Null(op)
            }
        };
        Self::new(self.attribute, kind)
    }

    /// Evaluates this predicate against the event's value for its attribute.
    ///
    /// A missing value yields [Truth::Undefined] for every kind except
    /// [PredicateKind::Null], which inspects the value directly. The value's
    /// kind always matches the predicate's expectation here, both were
    /// validated against the same frozen schema; a mismatch is an engine bug.
    pub(crate) fn evaluate(&self, value: &AttributeValue) -> Truth {
        if let PredicateKind::Null(op) = &self.kind {
            return Self::evaluate_null(*op, value);
        }
        if value.is_undefined() {
            return Truth::Undefined;
        }
        match (&self.kind, value) {
            (PredicateKind::Variable, AttributeValue::Bool(actual)) => Truth::from_bool(*actual),
            (PredicateKind::NegatedVariable, AttributeValue::Bool(actual)) => {
                Truth::from_bool(!*actual)
            }
            (PredicateKind::Equality(op, literal), _) => {
                let equal = match (literal, value) {
                    (ScalarLit::Bool(expected), AttributeValue::Bool(actual)) => expected == actual,
                    (ScalarLit::Int(expected), AttributeValue::Int(actual)) => expected == actual,
                    (ScalarLit::Float(expected), AttributeValue::Float(actual)) => {
                        expected == actual
                    }
                    (ScalarLit::String(expected), AttributeValue::String(actual)) => {
                        expected == actual
                    }
                    _ => unreachable!("equality literal and value diverge from schema"),
                };
                Truth::from_bool(match op {
                    EqOp::Eq => equal,
                    EqOp::Ne => !equal,
                })
            }
            (PredicateKind::Comparison(op, expected), _) => {
                let ordering = match (expected, value) {
                    (NumLit::Int(expected), AttributeValue::Int(actual)) => {
                        actual.partial_cmp(expected)
                    }
                    (NumLit::Float(expected), AttributeValue::Float(actual)) => {
                        actual.partial_cmp(expected)
                    }
                    _ => unreachable!("comparison literal and value diverge from schema"),
                };
                let Some(ordering) = ordering else {
                    // NaN on either side compares to nothing.
                    return Truth::False;
                };
                Truth::from_bool(match op {
                    CmpOp::Lt => ordering.is_lt(),
                    CmpOp::Le => ordering.is_le(),
                    CmpOp::Gt => ordering.is_gt(),
                    CmpOp::Ge => ordering.is_ge(),
                })
            }
            (PredicateKind::Set(op, haystack), _) => {
                let found = match (haystack, value) {
                    (Haystack::Int(values), AttributeValue::Int(actual)) => {
                        values.binary_search(actual).is_ok()
                    }
                    (Haystack::String(values), AttributeValue::String(actual)) => {
                        values.binary_search(actual).is_ok()
                    }
                    _ => unreachable!("set haystack and value diverge from schema"),
                };
                Truth::from_bool(match op {
                    SetOp::In => found,
                    SetOp::NotIn => !found,
                })
            }
            (PredicateKind::List(op, probe), _) => Self::evaluate_list(*op, probe, value),
            _ => unreachable!("predicate kind and value diverge from schema"),
        }
    }

    fn evaluate_null(op: NullOp, value: &AttributeValue) -> Truth {
        let holds = match op {
            NullOp::IsNull => value.is_undefined(),
            NullOp::IsNotNull => !value.is_undefined(),
            NullOp::IsEmpty => value.list_len() == Some(0),
            NullOp::IsNotEmpty => value.list_len() != Some(0),
        };
        Truth::from_bool(holds)
    }

    /// List semantics: OneOf tests for a non-empty intersection, AllOf for
    /// probe inclusion in the event list (vacuously true for an empty probe);
    /// NoneOf and NotAllOf are their complements.
    fn evaluate_list(op: ListOp, probe: &Probe, value: &AttributeValue) -> Truth {
        Truth::from_bool(match op {
            ListOp::OneOf => Self::intersects(probe, value),
            ListOp::NoneOf => !Self::intersects(probe, value),
            ListOp::AllOf => Self::includes_probe(probe, value),
            ListOp::NotAllOf => !Self::includes_probe(probe, value),
        })
    }

    /// Whether the probe and the event list share at least one element.
    /// Sorted probes (Int, String) are binary-searched per event element.
    fn intersects(probe: &Probe, value: &AttributeValue) -> bool {
        match (probe, value) {
            (Probe::Bool(probe), AttributeValue::BoolList(actual)) => {
                probe.iter().any(|wanted| actual.contains(wanted))
            }
            (Probe::Int(probe), AttributeValue::IntList(actual)) => {
                actual.iter().any(|seen| probe.binary_search(seen).is_ok())
            }
            (Probe::Float(probe), AttributeValue::FloatList(actual)) => {
                probe.iter().any(|wanted| actual.contains(wanted))
            }
            (Probe::String(probe), AttributeValue::StringList(actual)) => {
                actual.iter().any(|seen| probe.binary_search(seen).is_ok())
            }
            _ => unreachable!("list probe and value diverge from schema"),
        }
    }

    /// Whether every probe element appears in the (unsorted) event list.
    fn includes_probe(probe: &Probe, value: &AttributeValue) -> bool {
        match (probe, value) {
            (Probe::Bool(probe), AttributeValue::BoolList(actual)) => {
                probe.iter().all(|wanted| actual.contains(wanted))
            }
            (Probe::Int(probe), AttributeValue::IntList(actual)) => {
                probe.iter().all(|wanted| actual.contains(wanted))
            }
            (Probe::Float(probe), AttributeValue::FloatList(actual)) => {
                probe.iter().all(|wanted| actual.contains(wanted))
            }
            (Probe::String(probe), AttributeValue::StringList(actual)) => {
                probe.iter().all(|wanted| actual.contains(wanted))
            }
            _ => unreachable!("list probe and value diverge from schema"),
        }
    }
}
