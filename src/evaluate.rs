//! Rule evaluation against concrete items.
//!
//! [`Filterer`] is the seam: implementors only decide how a single
//! atomic rule applies to an item, the combinator walk is shared.
//! [`RecordFilterer`] evaluates against flat field/value rows,
//! [`RuleFilterer`] evaluates matcher rules against rule trees (the
//! engine behind [`Filter::on_each_rule`](crate::Filter::on_each_rule))
//! and [`FnFilterer`] delegates to a closure.

use std::borrow::Borrow;
use std::marker::PhantomData;

use regex::Regex;

use crate::export;
use crate::types::{Atomic, EvaluationError, Operator, Predicate, Record, Rule, Value};

pub trait Filterer {
    type Item: ?Sized;

    /// Decide whether one atomic rule matches the item.
    fn matches_atomic(&self, atomic: &Atomic, item: &Self::Item)
        -> Result<bool, EvaluationError>;

    /// Walk a whole rule tree. Empty operations are the unsatisfiable
    /// markers of the array encoding and match nothing.
    fn matches(&self, rule: &Rule, item: &Self::Item) -> Result<bool, EvaluationError> {
        match rule {
            Rule::Atomic(atomic) => self.matches_atomic(atomic, item),
            Rule::And(op) => {
                if op.operands.is_empty() {
                    return Ok(false);
                }
                for operand in &op.operands {
                    if !self.matches(operand, item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Rule::Or(op) => {
                for operand in &op.operands {
                    if self.matches(operand, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Rule::Not(inner) => Ok(!self.matches(inner, item)?),
        }
    }

    /// Keep the items the rule matches.
    fn filter<T: Borrow<Self::Item>>(
        &self,
        rule: &Rule,
        items: Vec<T>,
    ) -> Result<Vec<T>, EvaluationError> {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if self.matches(rule, item.borrow())? {
                kept.push(item);
            }
        }
        Ok(kept)
    }
}

/// Evaluates rules against [`Record`] rows. A missing field reads as
/// null, so `["f", "=", null]` matches rows without an `f` at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFilterer;

impl Filterer for RecordFilterer {
    type Item = Record;

    fn matches_atomic(&self, atomic: &Atomic, item: &Record) -> Result<bool, EvaluationError> {
        let current = item.get(&atomic.field).cloned().unwrap_or(Value::Null);
        match &atomic.predicate {
            Predicate::Equal(v) => Ok(current.loose_eq(v)),
            Predicate::NotEqual(v) => Ok(!current.loose_eq(v)),
            // A null bound restricts nothing.
            Predicate::Above(Value::Null)
            | Predicate::AboveOrEqual(Value::Null)
            | Predicate::Below(Value::Null)
            | Predicate::BelowOrEqual(Value::Null) => Ok(true),
            Predicate::Above(v) => Ok(current.compare(Operator::Above, v).unwrap_or(false)),
            Predicate::AboveOrEqual(v) => {
                Ok(current.compare(Operator::AboveOrEqual, v).unwrap_or(false))
            }
            Predicate::Below(v) => Ok(current.compare(Operator::Below, v).unwrap_or(false)),
            Predicate::BelowOrEqual(v) => {
                Ok(current.compare(Operator::BelowOrEqual, v).unwrap_or(false))
            }
            Predicate::In(values) => Ok(values.iter().any(|v| current.loose_eq(v))),
            Predicate::NotIn(values) => Ok(!values.iter().any(|v| current.loose_eq(v))),
            Predicate::Regexp(pattern) => {
                let regex = Regex::new(pattern).map_err(|e| EvaluationError::InvalidRegex {
                    pattern: pattern.clone(),
                    source: Box::new(e),
                })?;
                Ok(current.as_text().is_some_and(|text| regex.is_match(&text)))
            }
        }
    }
}

/// Evaluates matcher rules against rule trees. The matcher vocabulary
/// is a fixed set of node properties:
///
/// * `field` the field name of an atomic rule
/// * `operator` the node's token (`=`, `in`, `and`, ...)
/// * `value` the scalar bound of an atomic rule
/// * `children` the operand count of an operation
/// * `description` the JSON text of the node's array encoding
///
/// A property that does not apply to the node under test (`children`
/// on an atomic, `value` on an operation) is permissive and matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFilterer;

impl RuleFilterer {
    fn property_value(atomic: &Atomic, node: &Rule) -> Result<Option<Value>, EvaluationError> {
        Ok(match atomic.field.as_str() {
            "field" => node.as_atomic().map(|a| Value::from(a.field.as_str())),
            "operator" => Some(Value::from(node.token())),
            "value" => node.as_atomic().and_then(|a| match &a.predicate {
                Predicate::Equal(v)
                | Predicate::NotEqual(v)
                | Predicate::Above(v)
                | Predicate::AboveOrEqual(v)
                | Predicate::Below(v)
                | Predicate::BelowOrEqual(v) => Some(v.clone()),
                Predicate::Regexp(pattern) => Some(Value::from(pattern.as_str())),
                Predicate::In(_) | Predicate::NotIn(_) => None,
            }),
            "children" => match node {
                Rule::And(_) | Rule::Or(_) | Rule::Not(_) => {
                    Some(Value::Int(node.operands().len() as i64))
                }
                Rule::Atomic(_) => None,
            },
            "description" => Some(Value::from(export::to_array(node).to_string())),
            other => {
                return Err(EvaluationError::UnknownRuleProperty {
                    field: other.to_owned(),
                })
            }
        })
    }
}

impl Filterer for RuleFilterer {
    type Item = Rule;

    fn matches_atomic(&self, atomic: &Atomic, node: &Rule) -> Result<bool, EvaluationError> {
        let Some(current) = Self::property_value(atomic, node)? else {
            return Ok(true);
        };
        match &atomic.predicate {
            Predicate::Equal(v) => Ok(current.loose_eq(v)),
            Predicate::NotEqual(v) => Ok(!current.loose_eq(v)),
            Predicate::In(values) => Ok(values.iter().any(|v| current.loose_eq(v))),
            Predicate::NotIn(values) => Ok(!values.iter().any(|v| current.loose_eq(v))),
            Predicate::Above(Value::Null)
            | Predicate::AboveOrEqual(Value::Null)
            | Predicate::Below(Value::Null)
            | Predicate::BelowOrEqual(Value::Null) => Ok(true),
            Predicate::Above(v)
            | Predicate::AboveOrEqual(v)
            | Predicate::Below(v)
            | Predicate::BelowOrEqual(v) => Ok(current
                .compare(atomic.predicate.operator(), v)
                .unwrap_or(false)),
            Predicate::Regexp(_) => Err(EvaluationError::UnsupportedComparison {
                operator: Operator::Regexp,
                value: current.to_string(),
            }),
        }
    }
}

/// Adapts a closure into a [`Filterer`], for items the built-in
/// filterers do not know about.
pub struct FnFilterer<Item, F> {
    f: F,
    _marker: PhantomData<fn(&Item)>,
}

impl<Item, F> FnFilterer<Item, F>
where
    F: Fn(&Atomic, &Item) -> Result<bool, EvaluationError>,
{
    pub fn new(f: F) -> Self {
        FnFilterer {
            f,
            _marker: PhantomData,
        }
    }
}

impl<Item, F> Filterer for FnFilterer<Item, F>
where
    F: Fn(&Atomic, &Item) -> Result<bool, EvaluationError>,
{
    type Item = Item;

    fn matches_atomic(&self, atomic: &Atomic, item: &Item) -> Result<bool, EvaluationError> {
        (self.f)(atomic, item)
    }
}
