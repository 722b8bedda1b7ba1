//! The normalization pipeline: rewrites a rule tree into disjunctive
//! normal form, merging redundant constraints and pruning branches that
//! admit no solution.
//!
//! Phases, in order:
//!
//! 1. negation removal (De Morgan plus per-operator complements)
//! 2. operand cleanup (flatten nested same-kind operations, dedupe)
//! 3. compound-atomic expansion (`in` to OR of equalities, ...)
//! 4. operand unification and per-field constraint resolution
//! 5. invalid-branch pruning
//! 6. disjunction rootification (cartesian distribution)
//! 7. mono-operand collapse
//!
//! A contradictory conjunction collapses to an empty AND and a
//! disjunction whose branches all died collapses to an empty OR; both
//! are the unsatisfiable markers of the array encoding. Unification can
//! shrink an `in` list below the expansion threshold, so the driver
//! repeats the pass until the canonical export stops changing.

use std::cmp::Ordering;

use crate::export;
use crate::types::{
    Atomic, EvaluationError, FilterError, NodeOptions, Operation, Operator, Predicate, Rule,
    SimplifyOptions, Step, Value,
};

/// Upper bound on fixpoint iterations. Each pass strictly reduces the
/// tree or stabilizes, so this is never reached in practice.
const MAX_PASSES: usize = 8;

/// Run the full pipeline over `rule` in place.
pub fn simplify(rule: &mut Rule, options: &SimplifyOptions) -> Result<(), FilterError> {
    if rule.is_simplified() {
        return Ok(());
    }

    let mut current = std::mem::replace(rule, Rule::and_rules(vec![]));
    let mut previous = export::to_array(&current);
    for _ in 0..MAX_PASSES {
        current = simplify_pass(current, options)?;
        let exported = export::to_array(&current);
        if exported == previous {
            break;
        }
        previous = exported;
    }
    advance_all(&mut current, Step::Simplified);
    *rule = current;
    Ok(())
}

fn simplify_pass(rule: Rule, options: &SimplifyOptions) -> Result<Rule, FilterError> {
    let rule = remove_negations(rule)?;
    let rule = clean(rule);
    let rule = expand_atomics(rule, options);
    let rule = clean(rule);
    let rule = unify(rule, options);
    let rule = prune(rule);
    let rule = rootify(rule);
    let rule = clean(rule);
    let rule = unify(rule, options);
    let rule = prune(rule);
    let rule = collapse_mono_operands(rule, options.force_logical_core, 0);
    Ok(if options.force_logical_core {
        force_core(rule)
    } else {
        rule
    })
}

fn advance_all(rule: &mut Rule, step: Step) {
    match rule {
        Rule::And(op) | Rule::Or(op) => {
            op.advance_step(step);
            for operand in &mut op.operands {
                advance_all(operand, step);
            }
        }
        Rule::Not(inner) => advance_all(inner, step),
        Rule::Atomic(_) => {}
    }
}

// -- phase 1: negation removal ---------------------------------------------

fn remove_negations(rule: Rule) -> Result<Rule, FilterError> {
    match rule {
        Rule::Not(inner) => negate(remove_negations(*inner)?),
        // No phase reintroduces a negation below a marked node, and
        // mutation resets the marker, so the whole subtree can be skipped.
        Rule::And(op) if op.step >= Step::NegationsRemoved => Ok(Rule::And(op)),
        Rule::Or(op) if op.step >= Step::NegationsRemoved => Ok(Rule::Or(op)),
        Rule::And(op) => {
            let mut out = Operation::new(op_try_map(op.operands, remove_negations)?);
            out.step = op.step.max(Step::NegationsRemoved);
            Ok(Rule::And(out))
        }
        Rule::Or(op) => {
            let mut out = Operation::new(op_try_map(op.operands, remove_negations)?);
            out.step = op.step.max(Step::NegationsRemoved);
            Ok(Rule::Or(out))
        }
        atomic => Ok(atomic),
    }
}

/// Logical complement of a negation-free tree.
fn negate(rule: Rule) -> Result<Rule, FilterError> {
    match rule {
        Rule::Atomic(a) => negate_atomic(a),
        // De Morgan.
        Rule::And(op) => Ok(Rule::or_rules(op_try_map(op.operands, negate)?)),
        Rule::Or(op) => Ok(Rule::and_rules(op_try_map(op.operands, negate)?)),
        Rule::Not(inner) => remove_negations(*inner),
    }
}

fn negate_atomic(atomic: Atomic) -> Result<Rule, FilterError> {
    let Atomic {
        field,
        predicate,
        options,
    } = atomic;
    let keep = |predicate: Predicate, options: NodeOptions| {
        Rule::Atomic(Atomic {
            field: field.clone(),
            predicate,
            options,
        })
    };
    Ok(match predicate {
        Predicate::Equal(v) => keep(Predicate::NotEqual(v), options),
        Predicate::NotEqual(v) => keep(Predicate::Equal(v), options),
        // Strict bounds complement to the open side plus the boundary.
        Predicate::Above(v) => Rule::or_rules(vec![
            keep(Predicate::Below(v.clone()), options.clone()),
            keep(Predicate::Equal(v), options),
        ]),
        Predicate::Below(v) => Rule::or_rules(vec![
            keep(Predicate::Above(v.clone()), options.clone()),
            keep(Predicate::Equal(v), options),
        ]),
        Predicate::AboveOrEqual(v) => keep(Predicate::Below(v), options),
        Predicate::BelowOrEqual(v) => keep(Predicate::Above(v), options),
        Predicate::In(values) => keep(Predicate::NotIn(values), options),
        Predicate::NotIn(values) => keep(Predicate::In(values), options),
        Predicate::Regexp(_) => {
            return Err(EvaluationError::UnsupportedNegation {
                operator: Operator::Regexp,
            }
            .into())
        }
    })
}

// -- phase 2: operand cleanup ----------------------------------------------

fn clean(rule: Rule) -> Rule {
    match rule {
        Rule::And(op) => {
            let operands = clean_operands(op.operands, clean, |r| match r {
                // Empty children are unsatisfiable markers, not noise.
                Rule::And(inner) if !inner.operands.is_empty() => Ok(inner.operands),
                other => Err(other),
            });
            Rule::And(Operation {
                operands,
                step: op.step,
                cache: Default::default(),
            })
        }
        Rule::Or(op) => {
            let operands = clean_operands(op.operands, clean, |r| match r {
                Rule::Or(inner) if !inner.operands.is_empty() => Ok(inner.operands),
                other => Err(other),
            });
            Rule::Or(Operation {
                operands,
                step: op.step,
                cache: Default::default(),
            })
        }
        Rule::Not(inner) => Rule::negate(clean(*inner)),
        atomic => atomic,
    }
}

fn clean_operands(
    operands: Vec<Rule>,
    recurse: fn(Rule) -> Rule,
    splice: fn(Rule) -> Result<Vec<Rule>, Rule>,
) -> Vec<Rule> {
    let mut out: Vec<Rule> = Vec::with_capacity(operands.len());
    for operand in operands {
        let cleaned = recurse(operand);
        match splice(cleaned) {
            Ok(spliced) => {
                for inner in spliced {
                    if !out.contains(&inner) {
                        out.push(inner);
                    }
                }
            }
            Err(kept) => {
                if !out.contains(&kept) {
                    out.push(kept);
                }
            }
        }
    }
    out
}

// -- phase 3: compound-atomic expansion ------------------------------------

fn expand_atomics(rule: Rule, options: &SimplifyOptions) -> Rule {
    match rule {
        Rule::And(op) => Rule::And(Operation {
            operands: op
                .operands
                .into_iter()
                .map(|o| expand_atomics(o, options))
                .collect(),
            step: op.step,
            cache: Default::default(),
        }),
        Rule::Or(op) => Rule::Or(Operation {
            operands: op
                .operands
                .into_iter()
                .map(|o| expand_atomics(o, options))
                .collect(),
            step: op.step,
            cache: Default::default(),
        }),
        Rule::Not(inner) => Rule::negate(expand_atomics(*inner, options)),
        Rule::Atomic(atomic) => expand_atomic(atomic, options),
    }
}

fn expand_atomic(atomic: Atomic, options: &SimplifyOptions) -> Rule {
    let threshold = atomic.effective_threshold(options.in_normalization_threshold);
    match &atomic.predicate {
        Predicate::In(values)
            if !values.is_empty()
                && atomic.options.normalization != Some(false)
                && values.len() <= threshold =>
        {
            Rule::or_rules(
                values
                    .iter()
                    .map(|v| Rule::equal(atomic.field.clone(), v.clone()))
                    .collect(),
            )
        }
        Predicate::NotEqual(v)
            if !matches!(v, Value::Null)
                && atomic
                    .options
                    .normalization
                    .unwrap_or(options.not_equal_normalization) =>
        {
            Rule::or_rules(vec![
                Rule::above(atomic.field.clone(), v.clone()),
                Rule::below(atomic.field.clone(), v.clone()),
            ])
        }
        Predicate::NotIn(values)
            if !values.is_empty()
                && atomic
                    .options
                    .normalization
                    .unwrap_or(options.not_in_normalization)
                && values.len() <= threshold =>
        {
            let conjuncts = values
                .iter()
                .map(|v| Rule::not_equal(atomic.field.clone(), v.clone()))
                .collect();
            // The equalities may themselves expand to ranges.
            expand_atomics(Rule::and_rules(conjuncts), options)
        }
        _ => Rule::Atomic(atomic),
    }
}

// -- phase 4: unification and per-field resolution -------------------------

fn unify(rule: Rule, options: &SimplifyOptions) -> Rule {
    match rule {
        Rule::And(op) => {
            let operands: Vec<Rule> = op
                .operands
                .into_iter()
                .map(|o| unify(o, options))
                .collect();
            let operands = match resolve_and_operands(operands) {
                Some(resolved) => resolved,
                // Contradiction: collapse to the empty-AND marker.
                None => vec![],
            };
            Rule::And(Operation {
                operands,
                step: op.step,
                cache: Default::default(),
            })
        }
        Rule::Or(op) => {
            let operands: Vec<Rule> = op
                .operands
                .into_iter()
                .map(|o| unify(o, options))
                .collect();
            Rule::Or(Operation {
                operands: unify_or_operands(operands),
                step: op.step,
                cache: Default::default(),
            })
        }
        other => other,
    }
}

/// Whether a conjunction's atomic operands are mutually consistent.
/// Used by [`Rule::has_solution`].
pub(crate) fn and_operands_consistent(operands: &[Rule]) -> bool {
    resolve_and_operands(operands.to_vec()).is_some()
}

/// Merge the atomic operands of a conjunction field by field. `None`
/// means the conjunction is contradictory.
fn resolve_and_operands(operands: Vec<Rule>) -> Option<Vec<Rule>> {
    let mut fields: Vec<(String, FieldConstraints)> = Vec::new();
    let mut compound: Vec<Rule> = Vec::new();

    for operand in operands {
        match operand {
            Rule::Atomic(atomic) => {
                let slot = match fields.iter().position(|(f, _)| *f == atomic.field) {
                    Some(index) => index,
                    None => {
                        fields.push((atomic.field.clone(), FieldConstraints::default()));
                        fields.len() - 1
                    }
                };
                fields[slot].1.absorb(atomic);
            }
            other => compound.push(other),
        }
    }

    let mut resolved: Vec<Rule> = Vec::new();
    for (field, constraints) in fields {
        for (predicate, options) in constraints.resolve()? {
            resolved.push(Rule::Atomic(Atomic {
                field: field.clone(),
                predicate,
                options,
            }));
        }
    }
    resolved.extend(compound);
    Some(resolved)
}

/// A comparison bound; strict excludes the boundary value itself.
#[derive(Debug, Clone)]
struct Bound {
    value: Value,
    strict: bool,
}

/// Everything a conjunction asserts about one field.
#[derive(Debug, Default)]
struct FieldConstraints {
    equals: Vec<Value>,
    not_equals: Vec<Value>,
    lowers: Vec<Bound>,
    uppers: Vec<Bound>,
    ins: Vec<(Vec<Value>, NodeOptions)>,
    not_ins: Vec<(Vec<Value>, NodeOptions)>,
    regexps: Vec<String>,
}

impl FieldConstraints {
    fn absorb(&mut self, atomic: Atomic) {
        let options = atomic.options;
        match atomic.predicate {
            Predicate::Equal(v) => self.equals.push(v),
            Predicate::NotEqual(v) => self.not_equals.push(v),
            Predicate::Above(v) => self.lowers.push(Bound {
                value: v,
                strict: true,
            }),
            Predicate::AboveOrEqual(v) => self.lowers.push(Bound {
                value: v,
                strict: false,
            }),
            Predicate::Below(v) => self.uppers.push(Bound {
                value: v,
                strict: true,
            }),
            Predicate::BelowOrEqual(v) => self.uppers.push(Bound {
                value: v,
                strict: false,
            }),
            Predicate::In(values) => self.ins.push((values, options)),
            Predicate::NotIn(values) => self.not_ins.push((values, options)),
            Predicate::Regexp(pattern) => {
                if !self.regexps.contains(&pattern) {
                    self.regexps.push(pattern);
                }
            }
        }
    }

    fn resolve(mut self) -> Option<Vec<(Predicate, NodeOptions)>> {
        dedup_loose(&mut self.equals);
        dedup_loose(&mut self.not_equals);
        self.lowers = unify_bounds(self.lowers, BoundSide::Lower);
        self.uppers = unify_bounds(self.uppers, BoundSide::Upper);

        // `>= x & <= x` pins the value.
        if self.equals.is_empty() {
            if let Some(pinned) = self.pinned_value()? {
                self.equals.push(pinned);
            }
        }

        if self.equals.len() > 1 {
            return None;
        }
        if let Some(v) = self.equals.first().cloned() {
            return self.resolve_around_equal(v);
        }

        // Non-null ranges and regexps already exclude null. An `in` list
        // may carry a null member, so it is strained instead, and a null
        // bound restricts nothing at all.
        let excludes_null = !self.regexps.is_empty()
            || self
                .lowers
                .iter()
                .chain(self.uppers.iter())
                .any(|b| !matches!(b.value, Value::Null));
        if excludes_null {
            self.not_equals.retain(|v| !matches!(v, Value::Null));
        }
        // A `!=` whose value the bounds exclude anyway is redundant.
        self.not_equals.retain(|v| {
            matches!(v, Value::Null)
                || (self
                    .lowers
                    .iter()
                    .all(|b| satisfies_bound(v, b, BoundSide::Lower) != Some(false))
                    && self
                        .uppers
                        .iter()
                        .all(|b| satisfies_bound(v, b, BoundSide::Upper) != Some(false)))
        });

        let mut out: Vec<(Predicate, NodeOptions)> = Vec::new();
        if self.ins.is_empty() {
            for bound in self.lowers {
                let predicate = if bound.strict {
                    Predicate::Above(bound.value)
                } else {
                    Predicate::AboveOrEqual(bound.value)
                };
                out.push((predicate, NodeOptions::default()));
            }
            for bound in self.uppers {
                let predicate = if bound.strict {
                    Predicate::Below(bound.value)
                } else {
                    Predicate::BelowOrEqual(bound.value)
                };
                out.push((predicate, NodeOptions::default()));
            }
            if !self.not_ins.is_empty() {
                let mut union: Vec<Value> = Vec::new();
                let options = self.not_ins[0].1.clone();
                for (values, _) in self.not_ins {
                    for v in values {
                        if !union.iter().any(|u| u.loose_eq(&v)) {
                            union.push(v);
                        }
                    }
                }
                // Value order, not insertion order: merges stay
                // deterministic whichever way the operands arrived.
                union.sort_by(Value::sort_cmp);
                out.push((Predicate::NotIn(union), options));
            }
            for v in self.not_equals {
                out.push((Predicate::NotEqual(v), NodeOptions::default()));
            }
        } else {
            let survivors = self.intersect_ins();
            if survivors.is_empty() {
                return None;
            }
            // A bound every surviving member compares against is encoded
            // in the survivors. One that is incomparable with some member
            // still restricts the record and stays alongside the list.
            let mut leftovers: Vec<(Predicate, NodeOptions)> = Vec::new();
            for bound in self.lowers {
                if survivors
                    .iter()
                    .any(|m| satisfies_bound(m, &bound, BoundSide::Lower).is_none())
                {
                    let predicate = if bound.strict {
                        Predicate::Above(bound.value)
                    } else {
                        Predicate::AboveOrEqual(bound.value)
                    };
                    leftovers.push((predicate, NodeOptions::default()));
                }
            }
            for bound in self.uppers {
                if survivors
                    .iter()
                    .any(|m| satisfies_bound(m, &bound, BoundSide::Upper).is_none())
                {
                    let predicate = if bound.strict {
                        Predicate::Below(bound.value)
                    } else {
                        Predicate::BelowOrEqual(bound.value)
                    };
                    leftovers.push((predicate, NodeOptions::default()));
                }
            }
            let options = self.ins[0].1.clone();
            out.push((Predicate::In(survivors), options));
            out.extend(leftovers);
        }
        for pattern in self.regexps {
            out.push((Predicate::Regexp(pattern), NodeOptions::default()));
        }
        Some(out)
    }

    /// Detects `>= x & <= x`. Outer `None` is a contradiction (crossed
    /// bounds), inner `None` means nothing is pinned.
    #[allow(clippy::option_option)]
    fn pinned_value(&mut self) -> Option<Option<Value>> {
        let mut touching = None;
        for (li, lower) in self.lowers.iter().enumerate() {
            if matches!(lower.value, Value::Null) {
                continue;
            }
            for (ui, upper) in self.uppers.iter().enumerate() {
                if matches!(upper.value, Value::Null) {
                    continue;
                }
                match lower.value.partial_cmp_value(&upper.value) {
                    Some(Ordering::Greater) => return None,
                    Some(Ordering::Equal) => {
                        if lower.strict || upper.strict {
                            return None;
                        }
                        touching = Some((li, ui));
                    }
                    Some(Ordering::Less) | None => {}
                }
            }
        }
        Some(touching.map(|(li, ui)| {
            let pinned = self.lowers.remove(li).value;
            self.uppers.remove(ui);
            pinned
        }))
    }

    /// Checks every other constraint against the pinned value and, if
    /// consistent, keeps only the equality (plus regexps and any bounds
    /// of an incomparable kind).
    fn resolve_around_equal(self, v: Value) -> Option<Vec<(Predicate, NodeOptions)>> {
        if self.not_equals.iter().any(|ne| ne.loose_eq(&v)) {
            return None;
        }
        for (values, _) in &self.not_ins {
            if values.iter().any(|nv| nv.loose_eq(&v)) {
                return None;
            }
        }
        for (values, _) in &self.ins {
            if !values.iter().any(|iv| iv.loose_eq(&v)) {
                return None;
            }
        }

        let mut leftovers: Vec<(Predicate, NodeOptions)> = Vec::new();
        if matches!(v, Value::Null) {
            // Non-null bounds never match a null field; null bounds
            // restrict nothing.
            if self
                .lowers
                .iter()
                .chain(self.uppers.iter())
                .any(|b| !matches!(b.value, Value::Null))
            {
                return None;
            }
        } else {
            for bound in self.lowers {
                match satisfies_bound(&v, &bound, BoundSide::Lower) {
                    Some(false) => return None,
                    Some(true) => {}
                    None => leftovers.push((
                        if bound.strict {
                            Predicate::Above(bound.value)
                        } else {
                            Predicate::AboveOrEqual(bound.value)
                        },
                        NodeOptions::default(),
                    )),
                }
            }
            for bound in self.uppers {
                match satisfies_bound(&v, &bound, BoundSide::Upper) {
                    Some(false) => return None,
                    Some(true) => {}
                    None => leftovers.push((
                        if bound.strict {
                            Predicate::Below(bound.value)
                        } else {
                            Predicate::BelowOrEqual(bound.value)
                        },
                        NodeOptions::default(),
                    )),
                }
            }
        }

        let mut out = vec![(Predicate::Equal(v), NodeOptions::default())];
        out.extend(leftovers);
        for pattern in self.regexps {
            out.push((Predicate::Regexp(pattern), NodeOptions::default()));
        }
        Some(out)
    }

    /// Intersect all `in` lists, then strain the members through the
    /// field's other constraints.
    fn intersect_ins(&self) -> Vec<Value> {
        let mut members: Vec<Value> = self.ins[0].0.clone();
        for (values, _) in &self.ins[1..] {
            members.retain(|m| values.iter().any(|v| v.loose_eq(m)));
        }
        members.retain(|m| {
            let in_range = if matches!(m, Value::Null) {
                // A null member survives any null bound but no real one.
                !self
                    .lowers
                    .iter()
                    .chain(self.uppers.iter())
                    .any(|b| !matches!(b.value, Value::Null))
            } else {
                self.lowers
                    .iter()
                    .all(|b| satisfies_bound(m, b, BoundSide::Lower) != Some(false))
                    && self
                        .uppers
                        .iter()
                        .all(|b| satisfies_bound(m, b, BoundSide::Upper) != Some(false))
            };
            in_range
                && !self.not_equals.iter().any(|ne| ne.loose_eq(m))
                && !self
                    .not_ins
                    .iter()
                    .any(|(values, _)| values.iter().any(|v| v.loose_eq(m)))
        });
        members.sort_by(Value::sort_cmp);
        members
    }
}

#[derive(Clone, Copy, PartialEq)]
enum BoundSide {
    Lower,
    Upper,
}

/// Does value `v` satisfy the bound? `None` when the kinds are not
/// comparable. A null bound restricts nothing.
fn satisfies_bound(v: &Value, bound: &Bound, side: BoundSide) -> Option<bool> {
    if matches!(bound.value, Value::Null) {
        return Some(true);
    }
    let ordering = v.partial_cmp_value(&bound.value)?;
    Some(match (side, ordering) {
        (_, Ordering::Equal) => !bound.strict,
        (BoundSide::Lower, Ordering::Greater) | (BoundSide::Upper, Ordering::Less) => true,
        _ => false,
    })
}

/// Keep only the strongest bounds of each comparable kind. Lower bounds
/// keep the largest value, upper bounds the smallest; at equal values
/// strict wins. Null bounds are the weakest.
fn unify_bounds(bounds: Vec<Bound>, side: BoundSide) -> Vec<Bound> {
    let mut kept: Vec<Bound> = Vec::new();
    'next: for bound in bounds {
        if matches!(bound.value, Value::Null) {
            if kept.is_empty() {
                kept.push(bound);
            }
            continue;
        }
        for existing in kept.iter_mut() {
            if matches!(existing.value, Value::Null) {
                *existing = bound;
                continue 'next;
            }
            match bound.value.partial_cmp_value(&existing.value) {
                Some(Ordering::Equal) => {
                    existing.strict = existing.strict || bound.strict;
                    continue 'next;
                }
                Some(ordering) => {
                    let stronger = match side {
                        BoundSide::Lower => ordering == Ordering::Greater,
                        BoundSide::Upper => ordering == Ordering::Less,
                    };
                    if stronger {
                        *existing = bound;
                    }
                    continue 'next;
                }
                None => {}
            }
        }
        kept.push(bound);
    }
    kept
}

/// Inside a disjunction only widening merges are sound: `in` lists
/// union, and among same-operator bounds the most permissive survives.
fn unify_or_operands(operands: Vec<Rule>) -> Vec<Rule> {
    let mut out: Vec<Rule> = Vec::new();
    'next: for operand in operands {
        let Rule::Atomic(atomic) = operand else {
            out.push(operand);
            continue;
        };
        let operator = atomic.predicate.operator();
        if !matches!(
            operator,
            Operator::In
                | Operator::Above
                | Operator::AboveOrEqual
                | Operator::Below
                | Operator::BelowOrEqual
        ) {
            out.push(Rule::Atomic(atomic));
            continue;
        }
        for existing in out.iter_mut() {
            let Rule::Atomic(kept) = existing else {
                continue;
            };
            if kept.field != atomic.field || kept.predicate.operator() != operator {
                continue;
            }
            match (&mut kept.predicate, &atomic.predicate) {
                (Predicate::In(merged), Predicate::In(incoming)) => {
                    for v in incoming {
                        if !merged.iter().any(|m| m.loose_eq(v)) {
                            merged.push(v.clone());
                        }
                    }
                    merged.sort_by(Value::sort_cmp);
                    continue 'next;
                }
                (
                    Predicate::Above(e) | Predicate::AboveOrEqual(e),
                    Predicate::Above(n) | Predicate::AboveOrEqual(n),
                ) => {
                    if widen_bound(e, n, BoundSide::Lower) {
                        continue 'next;
                    }
                }
                (
                    Predicate::Below(e) | Predicate::BelowOrEqual(e),
                    Predicate::Below(n) | Predicate::BelowOrEqual(n),
                ) => {
                    if widen_bound(e, n, BoundSide::Upper) {
                        continue 'next;
                    }
                }
                _ => {}
            }
        }
        out.push(Rule::Atomic(atomic));
    }
    out
}

/// Merge `incoming` into `existing`, keeping the more permissive bound.
/// Returns false when the two are not comparable.
fn widen_bound(existing: &mut Value, incoming: &Value, side: BoundSide) -> bool {
    if matches!(existing, Value::Null) {
        return true;
    }
    if matches!(incoming, Value::Null) {
        *existing = Value::Null;
        return true;
    }
    match incoming.partial_cmp_value(existing) {
        Some(ordering) => {
            let wider = match side {
                BoundSide::Lower => ordering == Ordering::Less,
                BoundSide::Upper => ordering == Ordering::Greater,
            };
            if wider {
                *existing = incoming.clone();
            }
            true
        }
        None => false,
    }
}

fn dedup_loose(values: &mut Vec<Value>) {
    let mut seen: Vec<Value> = Vec::with_capacity(values.len());
    values.retain(|v| {
        if seen.iter().any(|s| s.loose_eq(v)) {
            false
        } else {
            seen.push(v.clone());
            true
        }
    });
}

// -- phase 5: invalid-branch pruning ---------------------------------------

fn prune(rule: Rule) -> Rule {
    match rule {
        // A later pass can reopen pruning below a node marked
        // `BranchesPruned` (unification may shrink an `in` list and
        // expansion then rebuilds a disjunction under it), so only a
        // fully simplified subtree is conclusively stable.
        Rule::And(op) if op.step >= Step::Simplified => Rule::And(op),
        Rule::Or(op) if op.step >= Step::Simplified => Rule::Or(op),
        Rule::And(op) => {
            let operands: Vec<Rule> = op.operands.into_iter().map(prune).collect();
            let step = op.step.max(Step::BranchesPruned);
            if let Some(pos) = operands.iter().position(|o| !o.has_solution()) {
                // The node that detected the dead end keeps its kind:
                // an exhausted disjunction stays an empty OR.
                let mut marker = Operation::new(vec![]);
                marker.step = step;
                if matches!(&operands[pos], Rule::Or(inner) if inner.operands.is_empty()) {
                    return Rule::Or(marker);
                }
                return Rule::And(marker);
            }
            let mut pruned = Operation::new(operands);
            pruned.step = step;
            Rule::And(pruned)
        }
        Rule::Or(op) => {
            let mut operands: Vec<Rule> = op.operands.into_iter().map(prune).collect();
            operands.retain(Rule::has_solution);
            let mut pruned = Operation::new(operands);
            pruned.step = op.step.max(Step::BranchesPruned);
            Rule::Or(pruned)
        }
        other => other,
    }
}

// -- phase 6: disjunction rootification ------------------------------------

/// Distribute conjunctions over disjunctions so every OR floats to the
/// root: `AND(a, OR(b, c))` becomes `OR(AND(a, b), AND(a, c))`.
/// Expects a negation-free tree.
fn rootify(rule: Rule) -> Rule {
    match rule {
        Rule::And(op) if op.step >= Step::Simplified => Rule::And(op),
        Rule::Or(op) if op.step >= Step::Simplified => Rule::Or(op),
        Rule::Or(op) => {
            let mut cases: Vec<Rule> = Vec::with_capacity(op.operands.len());
            for operand in op.operands {
                match rootify(operand) {
                    Rule::Or(inner) => cases.extend(inner.operands),
                    other => cases.push(other),
                }
            }
            let mut rooted = Operation::new(cases);
            rooted.step = op.step.max(Step::DisjunctionsRootified);
            Rule::Or(rooted)
        }
        Rule::And(op) => {
            let step = op.step.max(Step::DisjunctionsRootified);
            let operands: Vec<Rule> = op.operands.into_iter().map(rootify).collect();
            if !operands.iter().any(|o| matches!(o, Rule::Or(_))) {
                let mut rooted = Operation::new(operands);
                rooted.step = step;
                return Rule::And(rooted);
            }
            let mut combinations: Vec<Vec<Rule>> = vec![vec![]];
            for operand in operands {
                match operand {
                    Rule::Or(inner) => {
                        let mut next =
                            Vec::with_capacity(combinations.len() * inner.operands.len());
                        for combination in &combinations {
                            for case in &inner.operands {
                                let mut extended = combination.clone();
                                push_flattened(&mut extended, case.clone());
                                next.push(extended);
                            }
                        }
                        combinations = next;
                    }
                    other => {
                        for combination in &mut combinations {
                            push_flattened(combination, other.clone());
                        }
                    }
                }
            }
            let cases = combinations
                .into_iter()
                .map(|operands| {
                    let mut case = Operation::new(operands);
                    case.step = step;
                    Rule::And(case)
                })
                .collect();
            let mut rooted = Operation::new(cases);
            rooted.step = step;
            Rule::Or(rooted)
        }
        other => other,
    }
}

fn push_flattened(list: &mut Vec<Rule>, rule: Rule) {
    match rule {
        Rule::And(inner) if !inner.operands.is_empty() => list.extend(inner.operands),
        other => list.push(other),
    }
}

// -- phase 7: mono-operand collapse ----------------------------------------

fn collapse_mono_operands(rule: Rule, keep_core: bool, depth: usize) -> Rule {
    match rule {
        Rule::And(op) if op.step >= Step::Simplified => Rule::And(op),
        Rule::Or(op) if op.step >= Step::Simplified => Rule::Or(op),
        Rule::And(op) => {
            let mut operands: Vec<Rule> = op
                .operands
                .into_iter()
                .map(|o| collapse_mono_operands(o, keep_core, depth + 1))
                .collect();
            if operands.len() == 1 && !(keep_core && depth < 2) {
                return operands.pop().unwrap();
            }
            let mut collapsed = Operation::new(operands);
            collapsed.step = op.step.max(Step::MonoOperandsRemoved);
            Rule::And(collapsed)
        }
        Rule::Or(op) => {
            let mut operands: Vec<Rule> = op
                .operands
                .into_iter()
                .map(|o| collapse_mono_operands(o, keep_core, depth + 1))
                .collect();
            if operands.len() == 1 && !(keep_core && depth < 2) {
                return operands.pop().unwrap();
            }
            let mut collapsed = Operation::new(operands);
            collapsed.step = op.step.max(Step::MonoOperandsRemoved);
            Rule::Or(collapsed)
        }
        other => other,
    }
}

/// Reshape the tree into the `OR(AND(...), ...)` shell, wrapping bare
/// atomics and conjunctions as needed.
pub(crate) fn force_core(rule: Rule) -> Rule {
    match rule {
        Rule::Or(op) => {
            let cases = op
                .operands
                .into_iter()
                .map(|case| match case {
                    and @ Rule::And(_) => and,
                    other => Rule::and_rules(vec![other]),
                })
                .collect();
            Rule::Or(Operation {
                operands: cases,
                step: op.step,
                cache: Default::default(),
            })
        }
        and @ Rule::And(_) => Rule::or_rules(vec![and]),
        other => Rule::or_rules(vec![Rule::and_rules(vec![other])]),
    }
}

// -- small helpers ----------------------------------------------------------

fn op_try_map(
    operands: Vec<Rule>,
    f: fn(Rule) -> Result<Rule, FilterError>,
) -> Result<Vec<Rule>, FilterError> {
    operands.into_iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field;
    use serde_json::json;

    fn simplified(rule: Rule) -> serde_json::Value {
        let mut root = Rule::and_rules(vec![rule]);
        simplify(&mut root, &SimplifyOptions::default()).unwrap();
        export::to_array(&root)
    }

    #[test]
    fn negation_of_equality() {
        assert_eq!(
            simplified(!field("f").eq(3)),
            json!(["f", "!=", 3])
        );
    }

    #[test]
    fn negation_of_strict_bound_splits() {
        assert_eq!(
            simplified(!field("f").gt(3)),
            json!(["or", ["f", "<", 3], ["f", "=", 3]])
        );
    }

    #[test]
    fn negation_of_regexp_is_an_error() {
        let mut root = Rule::and_rules(vec![!field("f").matches("^a")]);
        let err = simplify(&mut root, &SimplifyOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            FilterError::Evaluation(EvaluationError::UnsupportedNegation { .. })
        ));
    }

    #[test]
    fn conjunction_keeps_strongest_lower_bound() {
        assert_eq!(
            simplified(field("f").gt(3) & field("f").gt(5) & field("f").gte(5)),
            json!(["f", ">", 5])
        );
    }

    #[test]
    fn crossed_bounds_are_contradictory() {
        assert_eq!(simplified(field("f").gt(5) & field("f").lt(3)), json!(["and"]));
    }

    #[test]
    fn touching_inclusive_bounds_pin_the_value() {
        assert_eq!(
            simplified(field("f").gte(5) & field("f").lte(5)),
            json!(["f", "=", 5])
        );
    }

    #[test]
    fn equal_anchor_swallows_ranges() {
        assert_eq!(
            simplified(field("f").eq(4) & field("f").gt(3) & field("f").lte(10)),
            json!(["f", "=", 4])
        );
        assert_eq!(simplified(field("f").eq(3) & field("f").gt(3)), json!(["and"]));
    }

    #[test]
    fn in_lists_intersect_in_conjunctions() {
        let rule = field("f").one_of(vec![1, 2, 3, 4]) & field("f").none_of(vec![3, 4, 5, 6]);
        // Two survivors, under the expansion threshold.
        assert_eq!(
            simplified(rule),
            json!(["or", ["f", "=", 1], ["f", "=", 2]])
        );
    }

    #[test]
    fn range_strains_in_list() {
        let members: Vec<i64> = (1..=20).collect();
        let rule = field("f").one_of(members) & field("f").gt(10) & field("f").lte(12);
        assert_eq!(
            simplified(rule),
            json!(["or", ["f", "=", 11], ["f", "=", 12]])
        );
    }

    #[test]
    fn marked_nodes_skip_negation_removal() {
        let mut marked = Operation::new(vec![!field("f").eq(3)]);
        marked.advance_step(Step::NegationsRemoved);
        let skipped = remove_negations(Rule::And(marked)).unwrap();
        assert!(
            matches!(&skipped, Rule::And(op) if matches!(op.operands[0], Rule::Not(_)))
        );

        let fresh = Rule::And(Operation::new(vec![!field("f").eq(3)]));
        let rewritten = remove_negations(fresh).unwrap();
        assert!(
            matches!(&rewritten, Rule::And(op) if matches!(op.operands[0], Rule::Atomic(_)))
        );
    }

    #[test]
    fn incomparable_bound_survives_the_in_strain() {
        let mut members: Vec<Value> = (0..10).map(Value::from).collect();
        members.extend((0..10).map(|i| Value::from(format!("s{i}"))));
        let rule = field("f").one_of(members) & field("f").gt(3);
        // Numeric members strain against the bound; string members
        // cannot, so the bound stays next to the list.
        let strained: Vec<serde_json::Value> = (4..10)
            .map(|i| json!(i))
            .chain((0..10).map(|i| json!(format!("s{i}"))))
            .collect();
        assert_eq!(
            simplified(rule),
            json!(["and", ["f", "in", strained], ["f", ">", 3]])
        );
    }

    #[test]
    fn disjunctions_are_rootified() {
        let rule = field("a").eq(1) & (field("b").eq(2) | field("b").eq(3));
        assert_eq!(
            simplified(rule),
            json!([
                "or",
                ["and", ["a", "=", 1], ["b", "=", 2]],
                ["and", ["a", "=", 1], ["b", "=", 3]]
            ])
        );
    }

    #[test]
    fn dead_or_branches_are_dropped() {
        let rule = (field("f").gt(5) & field("f").lt(3)) | field("g").eq(1);
        assert_eq!(simplified(rule), json!(["g", "=", 1]));
    }

    #[test]
    fn all_branches_dead_leaves_empty_or() {
        let rule = (field("f").gt(5) & field("f").lt(3)) | (field("g").eq(1) & field("g").eq(2));
        assert_eq!(simplified(rule), json!(["or"]));
    }

    #[test]
    fn in_above_threshold_stays_compound() {
        let members: Vec<i64> = (1..=20).collect();
        let exported = simplified(field("f").one_of(members.clone()));
        assert_eq!(
            exported,
            json!(["f", "in", members])
        );
    }

    #[test]
    fn not_equal_normalization_is_opt_in() {
        assert_eq!(simplified(field("f").ne(3)), json!(["f", "!=", 3]));

        let mut root = Rule::and_rules(vec![field("f").ne(3)]);
        let options = SimplifyOptions::default().normalize_not_equal(true);
        simplify(&mut root, &options).unwrap();
        assert_eq!(
            export::to_array(&root),
            json!(["or", ["f", ">", 3], ["f", "<", 3]])
        );
    }

    #[test]
    fn null_equality_contradicts_ranges() {
        assert_eq!(
            simplified(field("f").is_null() & field("f").gt(3)),
            json!(["and"])
        );
        assert_eq!(
            simplified(field("f").is_not_null() & field("f").gt(3)),
            json!(["f", ">", 3])
        );
    }

    #[test]
    fn simplification_is_idempotent() {
        let mut root = Rule::and_rules(vec![
            field("a").eq(1) & (field("b").eq(2) | field("b").eq(3)),
        ]);
        let options = SimplifyOptions::default();
        simplify(&mut root, &options).unwrap();
        let first = export::to_array(&root);
        simplify(&mut root, &options).unwrap();
        assert_eq!(export::to_array(&root), first);
        assert!(root.is_simplified());
    }

    #[test]
    fn unification_reopens_expansion() {
        // The intersection drops below the threshold, so a later pass
        // expands it even though the raw lists would not.
        let members: Vec<i64> = (1..=20).collect();
        let rule = field("f").one_of(members) & field("f").lt(3);
        assert_eq!(
            simplified(rule),
            json!(["or", ["f", "=", 1], ["f", "=", 2]])
        );
    }

    #[test]
    fn force_logical_core_keeps_the_shell() {
        let mut root = Rule::and_rules(vec![field("f").eq(1)]);
        let options = SimplifyOptions::default().logical_core(true);
        simplify(&mut root, &options).unwrap();
        assert_eq!(
            export::to_array(&root),
            json!(["or", ["and", ["f", "=", 1]]])
        );
    }
}
