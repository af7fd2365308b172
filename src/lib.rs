//! matchy matches events against thousands of boolean-expression rules in a
//! single pass.
//!
//! * Subscribers register rules over a fixed attribute schema with
//!   [Engine::add_rule]; [Engine::matches] returns every subscription whose
//!   rule evaluates true for one event.
//! * Rules are rewritten into a canonical negation-free form and interned
//!   into one shared DAG, so common sub-expressions are stored and evaluated
//!   once no matter how many rules use them.
//! * Matching evaluates a precomputed predicate frontier, then sweeps the
//!   DAG level by level with AND short-circuiting, making the work per event
//!   proportional to the reachable share of the DAG.
//!
//! As a starting point, see [Engine] for the API and
//! [core::dag::Dag] and [core::matcher] for the central algorithms.

#![allow(rustdoc::private_intra_doc_links)]

mod core;
mod engine;
mod error;
#[cfg(test)]
mod tests;

pub use crate::core::attr::{AttributeDef, AttributeId, AttributeKind};
pub use crate::core::event::{Event, EventBuilder};
pub use crate::core::expr::{Expr, ListLit, Scalar};
pub use crate::core::matcher::MatchScratch;
pub use crate::core::strings::{StringRef, StringTable};
pub use crate::core::value::{AttributeValue, Truth};
pub use crate::engine::Engine;
pub use crate::error::{EngineError, Result};
