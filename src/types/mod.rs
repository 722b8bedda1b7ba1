//! Core data model: values, operators, rules and their options.

mod error;
mod expr;
mod operator;
mod options;
mod record;
mod rule;
mod value;

pub use error::{ConstructionError, EvaluationError, FilterError, GrammarError};
pub use expr::{field, FieldExpr};
pub use operator::Operator;
pub use options::{SimplifyOptions, DEFAULT_IN_THRESHOLD};
pub use record::Record;
pub use rule::{Atomic, NodeOptions, Operation, Predicate, Rule, Step};
pub use value::Value;
