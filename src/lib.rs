//! Composable boolean filters over named fields, with a simplifier
//! that rewrites any filter into disjunctive normal form.
//!
//! Filters are built from atomic comparisons (`=`, `!=`, `<`, `<=`,
//! `>`, `>=`, `in`, `!in`, `regexp`) combined with AND, OR and NOT,
//! either through the fluent builder or from JSON literals in a
//! nested-array encoding:
//!
//! ```
//! use siftlogic::{field, Filter, Record};
//!
//! let mut filter = Filter::new();
//! filter.and_rule(field("age").gte(18) & field("name").matches("^A"))?;
//!
//! assert!(filter.matches(&Record::new().set("age", 30).set("name", "Alice"))?);
//!
//! filter.simplify()?;
//! # Ok::<(), siftlogic::FilterError>(())
//! ```
//!
//! Simplification removes negations, merges redundant constraints per
//! field, prunes contradictory branches and floats every disjunction to
//! the root, so the result is an OR of AND cases (or a single rule when
//! one remains). A filter proven contradictory exports as the bare
//! `["and"]` marker and refuses further composition.

pub mod evaluate;
pub mod export;
mod filter;
pub mod parse;
pub mod simplify;
pub mod types;

pub use evaluate::{Filterer, FnFilterer, RecordFilterer, RuleFilterer};
pub use filter::{Filter, Visit};
pub use types::{
    field, Atomic, ConstructionError, EvaluationError, FieldExpr, FilterError, GrammarError,
    NodeOptions, Operator, Predicate, Record, Rule, SimplifyOptions, Step, Value,
    DEFAULT_IN_THRESHOLD,
};
