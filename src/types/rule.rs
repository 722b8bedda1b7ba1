use std::cell::RefCell;

use super::operator::Operator;
use super::value::Value;

/// Per-node overlay on the global simplification options, set through
/// [`Filter::on_each_rule`](crate::Filter::on_each_rule). A node-level
/// setting wins over the global one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOptions {
    /// Overrides `in_normalization_threshold` for this rule.
    pub in_threshold: Option<usize>,
    /// Forces compound-atomic normalization on or off for this rule.
    pub normalization: Option<bool>,
}

impl NodeOptions {
    #[must_use]
    pub fn in_threshold(mut self, threshold: usize) -> Self {
        self.in_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn normalization(mut self, on: bool) -> Self {
        self.normalization = Some(on);
        self
    }
}

/// Progress marker recording which rewrite phases already ran over an
/// operation node. It only advances; mutating the operand list resets
/// it. Negation removal skips any node at or past [`Step::NegationsRemoved`]
/// and the later phases skip subtrees that already reached
/// [`Step::Simplified`], so re-entrant simplification is idempotent
/// and cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Step {
    #[default]
    None,
    NegationsRemoved,
    BranchesPruned,
    DisjunctionsRootified,
    MonoOperandsRemoved,
    Simplified,
}

/// Memoized canonical array export. Cloning a rule intentionally starts
/// with an empty cache, and cache contents never participate in equality.
#[derive(Default)]
pub struct ExportCache(pub(crate) RefCell<Option<serde_json::Value>>);

impl ExportCache {
    pub(crate) fn clear(&self) {
        self.0.borrow_mut().take();
    }
}

impl Clone for ExportCache {
    fn clone(&self) -> Self {
        ExportCache::default()
    }
}

impl PartialEq for ExportCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl std::fmt::Debug for ExportCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.0.borrow().is_some() {
            "cached"
        } else {
            "empty"
        };
        f.write_str(state)
    }
}

/// The predicate half of an atomic rule: one variant per operator,
/// carrying exactly the payload that operator needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equal(Value),
    NotEqual(Value),
    Below(Value),
    BelowOrEqual(Value),
    Above(Value),
    AboveOrEqual(Value),
    /// Ordered-unique list of accepted values.
    In(Vec<Value>),
    /// Ordered-unique list of rejected values.
    NotIn(Vec<Value>),
    Regexp(String),
}

impl Predicate {
    #[must_use]
    pub fn operator(&self) -> Operator {
        match self {
            Predicate::Equal(_) => Operator::Equal,
            Predicate::NotEqual(_) => Operator::NotEqual,
            Predicate::Below(_) => Operator::Below,
            Predicate::BelowOrEqual(_) => Operator::BelowOrEqual,
            Predicate::Above(_) => Operator::Above,
            Predicate::AboveOrEqual(_) => Operator::AboveOrEqual,
            Predicate::In(_) => Operator::In,
            Predicate::NotIn(_) => Operator::NotIn,
            Predicate::Regexp(_) => Operator::Regexp,
        }
    }
}

/// A single field/operator/value comparison leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Atomic {
    pub field: String,
    pub predicate: Predicate,
    pub options: NodeOptions,
}

impl Atomic {
    /// Whether this rule, standing alone, can be satisfied by some value.
    ///
    /// `> null` / `< null` are unrestricted, `> +inf`, `< -inf` and NaN
    /// bounds admit nothing, an empty `in` list admits nothing.
    /// Everything else only becomes contradictory in combination with
    /// siblings.
    #[must_use]
    pub fn has_solution(&self) -> bool {
        match &self.predicate {
            Predicate::Above(min) | Predicate::AboveOrEqual(min) => {
                !(min.is_nan() || min.is_positive_infinity())
            }
            Predicate::Below(max) | Predicate::BelowOrEqual(max) => {
                !(max.is_nan() || max.is_negative_infinity())
            }
            Predicate::In(possibilities) => !possibilities.is_empty(),
            Predicate::Equal(_)
            | Predicate::NotEqual(_)
            | Predicate::NotIn(_)
            | Predicate::Regexp(_) => true,
        }
    }

    /// Effective expansion threshold for `in`/`!in` lists on this node.
    #[must_use]
    pub fn effective_threshold(&self, global: usize) -> usize {
        self.options.in_threshold.unwrap_or(global)
    }
}

/// An AND or OR combinator: ordered operand list plus the progress
/// marker and memoized export.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Operation {
    pub operands: Vec<Rule>,
    pub step: Step,
    pub(crate) cache: ExportCache,
}

impl Operation {
    #[must_use]
    pub fn new(operands: Vec<Rule>) -> Self {
        Operation {
            operands,
            step: Step::None,
            cache: ExportCache::default(),
        }
    }

    /// Advance the progress marker; it never regresses.
    pub fn advance_step(&mut self, step: Step) {
        self.step = self.step.max(step);
    }
}

/// A boolean filter expression tree.
///
/// Operand lists are strict trees: a parent exclusively owns its
/// operands, and deep copies (via `Clone`) start with empty export
/// caches.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Atomic(Atomic),
    And(Operation),
    Or(Operation),
    Not(Box<Rule>),
}

impl Rule {
    // -- atomic constructors ------------------------------------------------

    pub fn equal(field: impl Into<String>, value: impl Into<Value>) -> Rule {
        Rule::atomic(field, Predicate::Equal(value.into().canonicalized()))
    }

    pub fn not_equal(field: impl Into<String>, value: impl Into<Value>) -> Rule {
        Rule::atomic(field, Predicate::NotEqual(value.into().canonicalized()))
    }

    pub fn above(field: impl Into<String>, minimum: impl Into<Value>) -> Rule {
        Rule::atomic(field, Predicate::Above(minimum.into().canonicalized()))
    }

    pub fn above_or_equal(field: impl Into<String>, minimum: impl Into<Value>) -> Rule {
        Rule::atomic(field, Predicate::AboveOrEqual(minimum.into().canonicalized()))
    }

    pub fn below(field: impl Into<String>, maximum: impl Into<Value>) -> Rule {
        Rule::atomic(field, Predicate::Below(maximum.into().canonicalized()))
    }

    pub fn below_or_equal(field: impl Into<String>, maximum: impl Into<Value>) -> Rule {
        Rule::atomic(field, Predicate::BelowOrEqual(maximum.into().canonicalized()))
    }

    /// `in`: the possibility list is deduplicated, keeping first
    /// occurrences in insertion order.
    pub fn in_list(field: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Rule {
        Rule::atomic(field, Predicate::In(dedup_canonical(values)))
    }

    pub fn not_in_list(field: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Rule {
        Rule::atomic(field, Predicate::NotIn(dedup_canonical(values)))
    }

    pub fn regexp(field: impl Into<String>, pattern: impl Into<String>) -> Rule {
        Rule::atomic(field, Predicate::Regexp(pattern.into()))
    }

    fn atomic(field: impl Into<String>, predicate: Predicate) -> Rule {
        Rule::Atomic(Atomic {
            field: field.into(),
            predicate,
            options: NodeOptions::default(),
        })
    }

    // -- operation constructors ---------------------------------------------

    #[must_use]
    pub fn and_rules(operands: Vec<Rule>) -> Rule {
        Rule::And(Operation::new(operands))
    }

    #[must_use]
    pub fn or_rules(operands: Vec<Rule>) -> Rule {
        Rule::Or(Operation::new(operands))
    }

    #[must_use]
    pub fn negate(operand: Rule) -> Rule {
        Rule::Not(Box::new(operand))
    }

    // -- accessors ----------------------------------------------------------

    #[must_use]
    pub fn as_atomic(&self) -> Option<&Atomic> {
        match self {
            Rule::Atomic(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_atomic_mut(&mut self) -> Option<&mut Atomic> {
        match self {
            Rule::Atomic(a) => Some(a),
            _ => None,
        }
    }

    /// Operands of an AND/OR node, or the single operand of a NOT.
    #[must_use]
    pub fn operands(&self) -> &[Rule] {
        match self {
            Rule::And(op) | Rule::Or(op) => &op.operands,
            Rule::Not(inner) => std::slice::from_ref(inner),
            Rule::Atomic(_) => &[],
        }
    }

    /// Append an operand to an AND/OR node. Returns false (and leaves
    /// the tree untouched) for atomic and NOT nodes.
    pub fn add_operand(&mut self, operand: Rule) -> bool {
        match self {
            Rule::And(op) | Rule::Or(op) => {
                op.cache.clear();
                // A fresh operand has not been through any phase yet.
                op.step = Step::None;
                op.operands.push(operand);
                true
            }
            Rule::Atomic(_) | Rule::Not(_) => false,
        }
    }

    /// Token in the array encoding: an operator token for atomics,
    /// `and`/`or`/`not` for operations.
    #[must_use]
    pub fn token(&self) -> &'static str {
        match self {
            Rule::Atomic(a) => a.predicate.operator().token(),
            Rule::And(_) => "and",
            Rule::Or(_) => "or",
            Rule::Not(_) => "not",
        }
    }

    #[must_use]
    pub fn step(&self) -> Step {
        match self {
            Rule::And(op) | Rule::Or(op) => op.step,
            Rule::Atomic(_) | Rule::Not(_) => Step::None,
        }
    }

    /// Checks whether the tree below this node can have solutions or
    /// contains contradictory rules. Bottom-up; an empty operation is the
    /// unsatisfiable marker.
    #[must_use]
    pub fn has_solution(&self) -> bool {
        match self {
            Rule::Atomic(a) => a.has_solution(),
            Rule::Or(op) => op.operands.iter().any(Rule::has_solution),
            Rule::And(op) => {
                !op.operands.is_empty()
                    && op.operands.iter().all(Rule::has_solution)
                    && crate::simplify::and_operands_consistent(&op.operands)
            }
            // Un-rewritten negations are conservatively satisfiable.
            Rule::Not(_) => true,
        }
    }

    /// True once the whole subtree has been through the full pipeline.
    #[must_use]
    pub fn is_simplified(&self) -> bool {
        match self {
            Rule::And(op) | Rule::Or(op) => op.step == Step::Simplified,
            Rule::Atomic(_) => true,
            Rule::Not(_) => false,
        }
    }

    /// Merge per-node options into this rule (atomics only).
    pub fn set_options(&mut self, options: NodeOptions) {
        if let Rule::Atomic(a) = self {
            if options.in_threshold.is_some() {
                a.options.in_threshold = options.in_threshold;
            }
            if options.normalization.is_some() {
                a.options.normalization = options.normalization;
            }
        }
    }

    /// Drop memoized exports in the whole subtree. Called by mutating
    /// facade entry points before handing out `&mut` access.
    pub(crate) fn clear_export_caches(&self) {
        match self {
            Rule::And(op) | Rule::Or(op) => {
                op.cache.clear();
                for operand in &op.operands {
                    operand.clear_export_caches();
                }
            }
            Rule::Not(inner) => inner.clear_export_caches(),
            Rule::Atomic(_) => {}
        }
    }
}

fn dedup_canonical(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for value in values {
        let value = value.canonicalized();
        if !out.iter().any(|v| v.loose_eq(&value)) {
            out.push(value);
        }
    }
    out
}
