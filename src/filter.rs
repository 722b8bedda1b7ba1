//! The `Filter` facade: owns one rule tree plus the simplification
//! options, and is the only place trees are mutated after construction.

use serde_json::Value as Json;

use crate::evaluate::{Filterer, RecordFilterer, RuleFilterer};
use crate::export;
use crate::parse;
use crate::simplify;
use crate::types::{
    EvaluationError, FilterError, GrammarError, Record, Rule, SimplifyOptions, Step,
};

/// Visitor verdict for [`Filter::on_each_rule`].
pub enum Visit {
    /// Keep the node, including any in-place mutation the visitor made.
    Keep,
    /// Swap the node for another rule.
    Replace(Rule),
    /// Remove the node from its parent operation.
    Drop,
}

/// A boolean filter over named fields.
///
/// An empty filter matches everything. Conjoining or disjoining rules
/// never fails on a live filter; only a filter whose simplification
/// proved it contradictory refuses further composition.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    root: Option<Rule>,
    options: SimplifyOptions,
}

impl Filter {
    #[must_use]
    pub fn new() -> Self {
        Filter::default()
    }

    #[must_use]
    pub fn with_options(options: SimplifyOptions) -> Self {
        Filter {
            root: None,
            options,
        }
    }

    /// Build a filter from a JSON literal in the array encoding.
    pub fn from_json(literal: &str) -> Result<Self, FilterError> {
        Ok(Filter {
            root: Some(parse::parse_str(literal)?),
            ..Filter::default()
        })
    }

    /// Build a filter from an already-decoded literal.
    pub fn from_literal(literal: &Json) -> Result<Self, FilterError> {
        Ok(Filter {
            root: Some(parse::parse(literal)?),
            ..Filter::default()
        })
    }

    #[must_use]
    pub fn options(&self) -> &SimplifyOptions {
        &self.options
    }

    /// The current rule tree, if any rule has been added.
    #[must_use]
    pub fn rules(&self) -> Option<&Rule> {
        self.root.as_ref()
    }

    /// A deep copy sharing nothing with this filter.
    #[must_use]
    pub fn copy(&self) -> Self {
        self.clone()
    }

    // -- composition --------------------------------------------------------

    /// Conjoin a rule: the filter now requires both the previous tree
    /// and `rule`.
    pub fn and_rule(&mut self, rule: Rule) -> Result<&mut Self, FilterError> {
        self.guard_contradiction()?;
        self.root = Some(match self.root.take() {
            None => rule,
            Some(mut existing @ Rule::And(_)) => {
                existing.add_operand(rule);
                existing
            }
            Some(other) => Rule::and_rules(vec![other, rule]),
        });
        Ok(self)
    }

    /// Disjoin a rule: the filter now accepts either the previous tree
    /// or `rule`.
    pub fn or_rule(&mut self, rule: Rule) -> Result<&mut Self, FilterError> {
        self.guard_contradiction()?;
        self.root = Some(match self.root.take() {
            None => rule,
            Some(mut existing @ Rule::Or(_)) => {
                existing.add_operand(rule);
                existing
            }
            Some(other) => Rule::or_rules(vec![other, rule]),
        });
        Ok(self)
    }

    /// Conjoin a rule given as a literal.
    pub fn and_literal(&mut self, literal: &Json) -> Result<&mut Self, FilterError> {
        let rule = parse::parse(literal)?;
        self.and_rule(rule)
    }

    /// Disjoin a rule given as a literal.
    pub fn or_literal(&mut self, literal: &Json) -> Result<&mut Self, FilterError> {
        let rule = parse::parse(literal)?;
        self.or_rule(rule)
    }

    /// Composing onto a proven contradiction would silently revive a
    /// filter that already matches nothing.
    fn guard_contradiction(&self) -> Result<(), FilterError> {
        match &self.root {
            Some(Rule::And(op)) if op.operands.is_empty() && op.step == Step::Simplified => {
                Err(GrammarError::ContradictoryFilter.into())
            }
            Some(Rule::Or(op)) if op.operands.is_empty() && op.step == Step::Simplified => {
                Err(GrammarError::ContradictoryFilter.into())
            }
            _ => Ok(()),
        }
    }

    // -- simplification -----------------------------------------------------

    /// Rewrite the tree into disjunctive normal form in place.
    pub fn simplify(&mut self) -> Result<&mut Self, FilterError> {
        if let Some(root) = &mut self.root {
            simplify::simplify(root, &self.options)?;
        }
        Ok(self)
    }

    /// A simplified deep copy, leaving this filter untouched.
    pub fn simplified(&self) -> Result<Self, FilterError> {
        let mut copy = self.clone();
        copy.simplify()?;
        Ok(copy)
    }

    /// Simplify, then report whether any assignment of field values can
    /// match. The simplification is kept.
    pub fn has_solution(&mut self) -> Result<bool, FilterError> {
        self.simplify()?;
        Ok(self.root.as_ref().is_none_or(Rule::has_solution))
    }

    /// Like [`has_solution`](Filter::has_solution) but works on a copy,
    /// leaving this filter's tree as built.
    pub fn has_solution_unsaved(&self) -> Result<bool, FilterError> {
        self.simplified()?.has_solution()
    }

    // -- evaluation ---------------------------------------------------------

    /// Whether the filter matches one record. An empty filter matches.
    pub fn matches(&self, record: &Record) -> Result<bool, EvaluationError> {
        match &self.root {
            None => Ok(true),
            Some(root) => RecordFilterer.matches(root, record),
        }
    }

    /// Keep the records the filter matches.
    pub fn apply(&self, records: Vec<Record>) -> Result<Vec<Record>, EvaluationError> {
        match &self.root {
            None => Ok(records),
            Some(root) => RecordFilterer.filter(root, records),
        }
    }

    // -- traversal ----------------------------------------------------------

    /// Visit every node the matcher rule selects, in parent-first
    /// order. The matcher uses the [`RuleFilterer`] property
    /// vocabulary, so `field("field").eq("age")` selects the atomic
    /// rules on `age`.
    pub fn on_each_rule(
        &mut self,
        matcher: &Rule,
        mut visitor: impl FnMut(&mut Rule) -> Visit,
    ) -> Result<&mut Self, FilterError> {
        if let Some(mut root) = self.root.take() {
            root.clear_export_caches();
            let kept = walk(&mut root, matcher, &mut visitor)?;
            if kept {
                reset_steps(&mut root);
                self.root = Some(root);
            }
        }
        Ok(self)
    }

    /// Force the `OR(AND(..))` shell and visit each case's conjunction.
    /// The visitor gets mutable access, typically to
    /// [`add_operand`](Rule::add_operand) extra constraints per case.
    pub fn on_each_case(
        &mut self,
        mut visitor: impl FnMut(&mut Rule),
    ) -> Result<&mut Self, FilterError> {
        let Some(root) = &mut self.root else {
            return Ok(self);
        };
        let mut options = self.options.clone();
        options.force_logical_core = true;
        simplify::simplify(root, &options)?;
        *root = simplify::force_core(std::mem::replace(root, Rule::and_rules(vec![])));
        root.clear_export_caches();
        if let Rule::Or(op) = root {
            for case in &mut op.operands {
                visitor(case);
            }
        }
        reset_steps(root);
        Ok(self)
    }

    // -- exports ------------------------------------------------------------

    /// Canonical array encoding; `null` for an empty filter.
    #[must_use]
    pub fn to_array(&self) -> Json {
        self.root.as_ref().map_or(Json::Null, export::to_array)
    }

    /// Canonical encoding as JSON text.
    #[must_use]
    pub fn to_json(&self) -> String {
        self.to_array().to_string()
    }

    /// One-line human-readable rendering.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.root.as_ref().map(export::to_text).unwrap_or_default()
    }

    /// Multi-line rendering nested by `indent_unit`.
    #[must_use]
    pub fn to_text_indented(&self, indent_unit: &str) -> String {
        self.root
            .as_ref()
            .map(|r| export::to_text_indented(r, indent_unit))
            .unwrap_or_default()
    }

    /// Order-insensitive content id of the tree.
    #[must_use]
    pub fn semantic_id(&self) -> Option<String> {
        self.root.as_ref().map(export::semantic_id)
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn walk(
    node: &mut Rule,
    matcher: &Rule,
    visitor: &mut impl FnMut(&mut Rule) -> Visit,
) -> Result<bool, FilterError> {
    if RuleFilterer.matches(matcher, node)? {
        match visitor(node) {
            Visit::Keep => {}
            Visit::Replace(replacement) => *node = replacement,
            Visit::Drop => return Ok(false),
        }
    }
    match node {
        Rule::And(op) | Rule::Or(op) => {
            let operands = std::mem::take(&mut op.operands);
            for mut operand in operands {
                if walk(&mut operand, matcher, visitor)? {
                    op.operands.push(operand);
                }
            }
        }
        Rule::Not(inner) => {
            if !walk(inner, matcher, visitor)? {
                return Ok(false);
            }
        }
        Rule::Atomic(_) => {}
    }
    Ok(true)
}

/// Mutated subtrees have to go through the pipeline again.
fn reset_steps(rule: &mut Rule) {
    match rule {
        Rule::And(op) | Rule::Or(op) => {
            op.step = Step::None;
            for operand in &mut op.operands {
                reset_steps(operand);
            }
        }
        Rule::Not(inner) => reset_steps(inner),
        Rule::Atomic(_) => {}
    }
}
