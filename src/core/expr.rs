//! User-facing expression trees and their rewrite into the canonical,
//! hash-addressable form interned by the DAG.
//!
//! An [Expr] is what subscribers hand to `add_rule`: an And/Or/Not tree whose
//! leaves carry attribute *names* and plain literals. The rewrite resolves
//! every leaf against the schema, pushes negation down to the leaves with
//! De Morgan's laws, orders commutative children canonically, and emits an
//! [Optimized] whose identifier is the same for all semantically equal
//! expressions up to commutativity and placement of Not.

use std::fmt;

use crate::core::attr::{AttributeKind, Schema};
use crate::core::hash::{self, AND_SALT, OR_SALT};
use crate::core::predicate::{
    CmpOp, EqOp, Haystack, ListOp, NullOp, NumLit, Predicate, PredicateKind, Probe, ScalarLit,
    SetOp,
};
use crate::core::strings::StringTable;
use crate::error::{EngineError, Result};

/// A scalar literal in a user expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

/// A list literal in a user expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ListLit {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
}

impl From<Vec<bool>> for ListLit {
    fn from(values: Vec<bool>) -> Self {
        ListLit::Bool(values)
    }
}

impl From<Vec<i64>> for ListLit {
    fn from(values: Vec<i64>) -> Self {
        ListLit::Int(values)
    }
}

impl From<Vec<f64>> for ListLit {
    fn from(values: Vec<f64>) -> Self {
        ListLit::Float(values)
    }
}

impl From<Vec<String>> for ListLit {
    fn from(values: Vec<String>) -> Self {
        ListLit::String(values)
    }
}

impl From<Vec<&str>> for ListLit {
    fn from(values: Vec<&str>) -> Self {
        ListLit::String(values.into_iter().map(str::to_string).collect())
    }
}

/// The leaf test of a user expression, not yet resolved against a schema.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Test {
    Var,
    NotVar,
    Eq(Scalar),
    Ne(Scalar),
    Lt(Scalar),
    Le(Scalar),
    Gt(Scalar),
    Ge(Scalar),
    In(ListLit),
    NotIn(ListLit),
    OneOf(ListLit),
    NoneOf(ListLit),
    AllOf(ListLit),
    NotAllOf(ListLit),
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
}

/// A user expression tree over named attributes.
///
/// Built with the associated constructors below; attribute names stay
/// unresolved until the tree is handed to the engine, so one tree value can
/// be inspected or printed without a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub(crate) node: ExprNode,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprNode {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Value { attribute: String, test: Test },
}

impl Expr {
    fn leaf(attribute: &str, test: Test) -> Self {
        Self {
            node: ExprNode::Value {
                attribute: attribute.to_string(),
                test,
            },
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self {
            node: ExprNode::And(Box::new(left), Box::new(right)),
        }
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self {
            node: ExprNode::Or(Box::new(left), Box::new(right)),
        }
    }

    pub fn not(inner: Expr) -> Self {
        Self {
            node: ExprNode::Not(Box::new(inner)),
        }
    }

    /// A boolean attribute used directly as a truth value.
    pub fn var(attribute: &str) -> Self {
        Self::leaf(attribute, Test::Var)
    }

    pub fn not_var(attribute: &str) -> Self {
        Self::leaf(attribute, Test::NotVar)
    }

    pub fn eq(attribute: &str, literal: impl Into<Scalar>) -> Self {
        Self::leaf(attribute, Test::Eq(literal.into()))
    }

    pub fn ne(attribute: &str, literal: impl Into<Scalar>) -> Self {
        Self::leaf(attribute, Test::Ne(literal.into()))
    }

    pub fn lt(attribute: &str, literal: impl Into<Scalar>) -> Self {
        Self::leaf(attribute, Test::Lt(literal.into()))
    }

    pub fn le(attribute: &str, literal: impl Into<Scalar>) -> Self {
        Self::leaf(attribute, Test::Le(literal.into()))
    }

    pub fn gt(attribute: &str, literal: impl Into<Scalar>) -> Self {
        Self::leaf(attribute, Test::Gt(literal.into()))
    }

    pub fn ge(attribute: &str, literal: impl Into<Scalar>) -> Self {
        Self::leaf(attribute, Test::Ge(literal.into()))
    }

    /// Membership of a scalar attribute in a literal set.
    pub fn in_set(attribute: &str, haystack: impl Into<ListLit>) -> Self {
        Self::leaf(attribute, Test::In(haystack.into()))
    }

    pub fn not_in_set(attribute: &str, haystack: impl Into<ListLit>) -> Self {
        Self::leaf(attribute, Test::NotIn(haystack.into()))
    }

    /// Non-empty intersection between a list attribute and the probe.
    pub fn one_of(attribute: &str, probe: impl Into<ListLit>) -> Self {
        Self::leaf(attribute, Test::OneOf(probe.into()))
    }

    pub fn none_of(attribute: &str, probe: impl Into<ListLit>) -> Self {
        Self::leaf(attribute, Test::NoneOf(probe.into()))
    }

    /// Probe inclusion in a list attribute, vacuously true for an empty probe.
    pub fn all_of(attribute: &str, probe: impl Into<ListLit>) -> Self {
        Self::leaf(attribute, Test::AllOf(probe.into()))
    }

    pub fn not_all_of(attribute: &str, probe: impl Into<ListLit>) -> Self {
        Self::leaf(attribute, Test::NotAllOf(probe.into()))
    }

    pub fn is_null(attribute: &str) -> Self {
        Self::leaf(attribute, Test::IsNull)
    }

    pub fn is_not_null(attribute: &str) -> Self {
        Self::leaf(attribute, Test::IsNotNull)
    }

    pub fn is_empty(attribute: &str) -> Self {
        Self::leaf(attribute, Test::IsEmpty)
    }

    pub fn is_not_empty(attribute: &str) -> Self {
        Self::leaf(attribute, Test::IsNotEmpty)
    }
}

/// Displays an expression tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.node {
            ExprNode::And(left, right) => write!(f, "And({left}, {right})"),
            ExprNode::Or(left, right) => write!(f, "Or({left}, {right})"),
            ExprNode::Not(inner) => write!(f, "Not({inner})"),
            ExprNode::Value { attribute, test } => format_leaf(f, attribute, test),
        }
    }
}

fn format_leaf(f: &mut fmt::Formatter, attribute: &str, test: &Test) -> fmt::Result {
    let scalar = |literal: &Scalar| match literal {
        Scalar::Bool(value) => value.to_string(),
        Scalar::Int(value) => value.to_string(),
        Scalar::Float(value) => value.to_string(),
        Scalar::String(value) => format!("\"{value}\""),
    };
    match test {
        Test::Var => write!(f, "{attribute}"),
        Test::NotVar => write!(f, "!{attribute}"),
        Test::Eq(lit) => write!(f, "{attribute} = {}", scalar(lit)),
        Test::Ne(lit) => write!(f, "{attribute} != {}", scalar(lit)),
        Test::Lt(lit) => write!(f, "{attribute} < {}", scalar(lit)),
        Test::Le(lit) => write!(f, "{attribute} <= {}", scalar(lit)),
        Test::Gt(lit) => write!(f, "{attribute} > {}", scalar(lit)),
        Test::Ge(lit) => write!(f, "{attribute} >= {}", scalar(lit)),
        Test::In(_) => write!(f, "{attribute} in [..]"),
        Test::NotIn(_) => write!(f, "{attribute} not in [..]"),
        Test::OneOf(_) => write!(f, "{attribute} one of [..]"),
        Test::NoneOf(_) => write!(f, "{attribute} none of [..]"),
        Test::AllOf(_) => write!(f, "{attribute} all of [..]"),
        Test::NotAllOf(_) => write!(f, "{attribute} not all of [..]"),
        Test::IsNull => write!(f, "{attribute} is null"),
        Test::IsNotNull => write!(f, "{attribute} is not null"),
        Test::IsEmpty => write!(f, "{attribute} is empty"),
        Test::IsNotEmpty => write!(f, "{attribute} is not empty"),
    }
}

/// Binary connectives surviving the rewrite.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub(crate) enum Connective {
    And,
    Or,
}

/// A normalized expression: negation-free, canonically ordered, and
/// content-addressed.
///
/// The identifier is combined from child identifiers with a per-operator
/// salt; the cost is the children's cost plus a fixed charge per connective.
/// Both are computed once, by the constructors, which also establish the
/// canonical child order (ascending cost, identifier as tie-break). Equal
/// identifiers are what the DAG dedups on.
#[derive(Debug, Clone)]
pub(crate) struct Optimized {
    pub(crate) id: u64,
    pub(crate) cost: u64,
    pub(crate) op: OptimizedOp,
}

#[derive(Debug, Clone)]
pub(crate) enum OptimizedOp {
    Value(Predicate),
    And(Box<Optimized>, Box<Optimized>),
    Or(Box<Optimized>, Box<Optimized>),
}

/// Fixed cost charged for evaluating a conjunction node.
const AND_COST: u64 = 50;

/// Fixed cost charged for evaluating a disjunction node.
const OR_COST: u64 = 60;

impl Optimized {
    pub(crate) fn value(predicate: Predicate) -> Self {
        Self {
            id: predicate.id,
            cost: predicate.cost,
            op: OptimizedOp::Value(predicate),
        }
    }

    pub(crate) fn and(left: Optimized, right: Optimized) -> Self {
        Self::binary(Connective::And, left, right)
    }

    pub(crate) fn or(left: Optimized, right: Optimized) -> Self {
        Self::binary(Connective::Or, left, right)
    }

    fn binary(connective: Connective, mut left: Optimized, mut right: Optimized) -> Self {
        if (right.cost, right.id) < (left.cost, left.id) {
            std::mem::swap(&mut left, &mut right);
        }
        let (salt, charge) = match connective {
            Connective::And => (AND_SALT, AND_COST),
            Connective::Or => (OR_SALT, OR_COST),
        };
        let id = hash::combine(salt, left.id, right.id);
        let cost = left.cost + right.cost + charge;
        let op = match connective {
            Connective::And => OptimizedOp::And(Box::new(left), Box::new(right)),
            Connective::Or => OptimizedOp::Or(Box::new(left), Box::new(right)),
        };
        Self { id, cost, op }
    }
}

/// Rewrites a user expression into its normalized form.
///
/// Threads a single `negate` flag downward: Not flips it, And and Or swap
/// into each other under it (De Morgan), and leaves absorb it into the
/// predicate via [Predicate::negate]. Double negation cancels for free
/// because flipping the flag twice restores it.
pub(crate) fn optimize(expr: &Expr, schema: &Schema, strings: &StringTable) -> Result<Optimized> {
    rewrite(expr, false, schema, strings)
}

fn rewrite(expr: &Expr, negate: bool, schema: &Schema, strings: &StringTable) -> Result<Optimized> {
    match &expr.node {
        ExprNode::Not(inner) => rewrite(inner, !negate, schema, strings),
        ExprNode::And(left, right) => {
            let left = rewrite(left, negate, schema, strings)?;
            let right = rewrite(right, negate, schema, strings)?;
            Ok(if negate {
                Optimized::or(left, right)
            } else {
                Optimized::and(left, right)
            })
        }
        ExprNode::Or(left, right) => {
            let left = rewrite(left, negate, schema, strings)?;
            let right = rewrite(right, negate, schema, strings)?;
            Ok(if negate {
                Optimized::and(left, right)
            } else {
                Optimized::or(left, right)
            })
        }
        ExprNode::Value { attribute, test } => {
            let predicate = resolve_leaf(attribute, test, schema, strings)?;
            Ok(Optimized::value(if negate {
                predicate.negate()
            } else {
                predicate
            }))
        }
    }
}

/// Resolves a leaf against the schema, validating the kind pairing and
/// interning string literals. This is where [EngineError::UnknownAttribute]
/// and [EngineError::SchemaMismatch] originate.
pub(crate) fn resolve_leaf(
    attribute: &str,
    test: &Test,
    schema: &Schema,
    strings: &StringTable,
) -> Result<Predicate> {
    let (id, kind) = schema.resolve(attribute)?;
    let mismatch = |found: &str| EngineError::SchemaMismatch {
        attribute: attribute.to_string(),
        expected: kind,
        found: found.to_string(),
    };
    let predicate_kind = match test {
        Test::Var | Test::NotVar => {
            if kind != AttributeKind::Bool {
                return Err(mismatch("boolean variable predicate"));
            }
            match test {
                Test::Var => PredicateKind::Variable,
                _ => PredicateKind::NegatedVariable,
            }
        }
        Test::Eq(literal) | Test::Ne(literal) => {
            let op = match test {
                Test::Eq(_) => EqOp::Eq,
                _ => EqOp::Ne,
            };
            let literal = match (literal, kind) {
                (Scalar::Bool(value), AttributeKind::Bool) => ScalarLit::Bool(*value),
                (Scalar::Int(value), AttributeKind::Int) => ScalarLit::Int(*value),
                (Scalar::Float(value), AttributeKind::Float) => ScalarLit::Float(*value),
                (Scalar::String(value), AttributeKind::String) => {
                    ScalarLit::String(strings.intern(value))
                }
                (literal, _) => return Err(mismatch(&format!("equality with {literal:?}"))),
            };
            PredicateKind::Equality(op, literal)
        }
        Test::Lt(literal) | Test::Le(literal) | Test::Gt(literal) | Test::Ge(literal) => {
            let op = match test {
                Test::Lt(_) => CmpOp::Lt,
                Test::Le(_) => CmpOp::Le,
                Test::Gt(_) => CmpOp::Gt,
                _ => CmpOp::Ge,
            };
            let value = match (literal, kind) {
                (Scalar::Int(value), AttributeKind::Int) => NumLit::Int(*value),
                (Scalar::Float(value), AttributeKind::Float) => NumLit::Float(*value),
                (literal, _) => return Err(mismatch(&format!("comparison with {literal:?}"))),
            };
            PredicateKind::Comparison(op, value)
        }
        Test::In(haystack) | Test::NotIn(haystack) => {
            let op = match test {
                Test::In(_) => SetOp::In,
                _ => SetOp::NotIn,
            };
            let haystack = match (haystack, kind) {
                (ListLit::Int(values), AttributeKind::Int) => {
                    let mut values = values.clone();
                    values.sort_unstable();
                    values.dedup();
                    Haystack::Int(values)
                }
                (ListLit::String(values), AttributeKind::String) => {
                    let mut values: Vec<_> =
                        values.iter().map(|value| strings.intern(value)).collect();
                    values.sort_unstable();
                    values.dedup();
                    Haystack::String(values)
                }
                (haystack, _) => {
                    return Err(mismatch(&format!("set membership over {haystack:?}")))
                }
            };
            if haystack.len() == 0 {
                return Err(EngineError::InvalidExpression(format!(
                    "empty set haystack for attribute '{attribute}'"
                )));
            }
            PredicateKind::Set(op, haystack)
        }
        Test::OneOf(probe) | Test::NoneOf(probe) | Test::AllOf(probe) | Test::NotAllOf(probe) => {
            let op = match test {
                Test::OneOf(_) => ListOp::OneOf,
                Test::NoneOf(_) => ListOp::NoneOf,
                Test::AllOf(_) => ListOp::AllOf,
                _ => ListOp::NotAllOf,
            };
            let probe = match (probe, kind) {
                (ListLit::Bool(values), AttributeKind::BoolList) => Probe::Bool(values.clone()),
                (ListLit::Int(values), AttributeKind::IntList) => {
                    let mut values = values.clone();
                    values.sort_unstable();
                    Probe::Int(values)
                }
                (ListLit::Float(values), AttributeKind::FloatList) => Probe::Float(values.clone()),
                (ListLit::String(values), AttributeKind::StringList) => {
                    let mut values: Vec<_> =
                        values.iter().map(|value| strings.intern(value)).collect();
                    values.sort_unstable();
                    Probe::String(values)
                }
                (probe, _) => return Err(mismatch(&format!("list test over {probe:?}"))),
            };
            PredicateKind::List(op, probe)
        }
        Test::IsNull => PredicateKind::Null(NullOp::IsNull),
        Test::IsNotNull => PredicateKind::Null(NullOp::IsNotNull),
        Test::IsEmpty | Test::IsNotEmpty => {
            if !kind.is_list() {
                return Err(mismatch("emptiness test"));
            }
            match test {
                Test::IsEmpty => PredicateKind::Null(NullOp::IsEmpty),
                _ => PredicateKind::Null(NullOp::IsNotEmpty),
            }
        }
    };
    Ok(Predicate::new(id, predicate_kind))
}
