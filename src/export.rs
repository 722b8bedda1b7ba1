//! Exports of rule trees: the canonical nested-array encoding, a
//! human-readable text form and order-insensitive semantic ids.
//!
//! The array encoding is the source of truth: it round-trips through
//! the literal grammar and is what the fixpoint driver compares between
//! passes. Operation nodes memoize their encoding; the cache is dropped
//! on clone and whenever the facade hands out mutable access.

use serde_json::Value as Json;

use crate::types::{Atomic, Operation, Predicate, Rule};

/// Canonical nested-array encoding, as decoded JSON.
pub fn to_array(rule: &Rule) -> Json {
    match rule {
        Rule::Atomic(atomic) => atomic_array(atomic),
        Rule::And(op) => cached_array(op, "and"),
        Rule::Or(op) => cached_array(op, "or"),
        Rule::Not(inner) => Json::Array(vec![Json::from("not"), to_array(inner)]),
    }
}

/// Canonical encoding as JSON text.
pub fn to_json(rule: &Rule) -> String {
    to_array(rule).to_string()
}

fn cached_array(op: &Operation, token: &str) -> Json {
    if let Some(cached) = op.cache.0.borrow().as_ref() {
        return cached.clone();
    }
    let mut items = Vec::with_capacity(op.operands.len() + 1);
    items.push(Json::from(token));
    items.extend(op.operands.iter().map(to_array));
    let encoded = Json::Array(items);
    *op.cache.0.borrow_mut() = Some(encoded.clone());
    encoded
}

fn atomic_array(atomic: &Atomic) -> Json {
    let value = match &atomic.predicate {
        Predicate::Equal(v)
        | Predicate::NotEqual(v)
        | Predicate::Above(v)
        | Predicate::AboveOrEqual(v)
        | Predicate::Below(v)
        | Predicate::BelowOrEqual(v) => v.to_json(),
        Predicate::In(values) | Predicate::NotIn(values) => {
            Json::Array(values.iter().map(crate::types::Value::to_json).collect())
        }
        Predicate::Regexp(pattern) => Json::from(pattern.as_str()),
    };
    Json::Array(vec![
        Json::from(atomic.field.as_str()),
        Json::from(atomic.predicate.operator().token()),
        value,
    ])
}

/// One-line text rendering, quoting strings the way the literal
/// grammar's documentation does: `['and', ['age', '>', 3]]`.
pub fn to_text(rule: &Rule) -> String {
    render(rule, None, 0)
}

/// Multi-line rendering, one operand per line, nested by `indent_unit`.
pub fn to_text_indented(rule: &Rule, indent_unit: &str) -> String {
    render(rule, Some(indent_unit), 0)
}

fn render(rule: &Rule, indent: Option<&str>, depth: usize) -> String {
    match rule {
        Rule::Atomic(atomic) => render_atomic(atomic),
        Rule::And(op) => render_operands("and", &op.operands, indent, depth),
        Rule::Or(op) => render_operands("or", &op.operands, indent, depth),
        Rule::Not(inner) => {
            render_operands("not", std::slice::from_ref(inner.as_ref()), indent, depth)
        }
    }
}

fn render_operands(token: &str, operands: &[Rule], indent: Option<&str>, depth: usize) -> String {
    match indent {
        None => {
            let mut parts = vec![format!("'{token}'")];
            parts.extend(operands.iter().map(|o| render(o, None, 0)));
            format!("[{}]", parts.join(", "))
        }
        Some(unit) => {
            let pad = unit.repeat(depth + 1);
            let closing_pad = unit.repeat(depth);
            let mut out = format!("['{token}',");
            for operand in operands {
                out.push('\n');
                out.push_str(&pad);
                out.push_str(&render(operand, indent, depth + 1));
                out.push(',');
            }
            out.push('\n');
            out.push_str(&closing_pad);
            out.push(']');
            out
        }
    }
}

fn render_atomic(atomic: &Atomic) -> String {
    let token = atomic.predicate.operator().token();
    let value = match &atomic.predicate {
        Predicate::Equal(v)
        | Predicate::NotEqual(v)
        | Predicate::Above(v)
        | Predicate::AboveOrEqual(v)
        | Predicate::Below(v)
        | Predicate::BelowOrEqual(v) => v.to_string(),
        Predicate::In(values) | Predicate::NotIn(values) => {
            let members: Vec<String> = values.iter().map(ToString::to_string).collect();
            format!("[{}]", members.join(", "))
        }
        Predicate::Regexp(pattern) => format!("'{pattern}'"),
    };
    format!("['{}', '{}', {}]", atomic.field, token, value)
}

/// Content-addressed id of a rule, insensitive to operand order:
/// operations hash the sorted ids of their operands. Two filters with
/// the same semantics after simplification share ids.
pub fn semantic_id(rule: &Rule) -> String {
    let digest = match rule {
        Rule::Atomic(_) => blake3::hash(to_array(rule).to_string().as_bytes()),
        Rule::And(op) | Rule::Or(op) => {
            let mut ids: Vec<String> = op.operands.iter().map(semantic_id).collect();
            ids.sort_unstable();
            let mut hasher = blake3::Hasher::new();
            hasher.update(rule.token().as_bytes());
            for id in ids {
                hasher.update(id.as_bytes());
            }
            hasher.finalize()
        }
        Rule::Not(inner) => {
            let mut hasher = blake3::Hasher::new();
            hasher.update(b"not");
            hasher.update(semantic_id(inner).as_bytes());
            hasher.finalize()
        }
    };
    digest.to_hex()[..16].to_string()
}

impl serde::Serialize for Rule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_array(self).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Rule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = Json::deserialize(deserializer)?;
        crate::parse::parse(&literal).map_err(serde::de::Error::custom)
    }
}
