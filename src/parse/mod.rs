//! Nested-array literal grammar.
//!
//! Rules come in as JSON arrays in one of three shapes:
//!
//! * atomic triple: `["field", ">", 3]`
//! * prefixed operation: `["or", A, B, ...]`, `["not", A]`
//! * interleaved operation: `[A, "or", B, "or", C]`
//!
//! Operands nest recursively. Interleaved lists must use a single
//! token throughout; mixing `and` and `or` at one level is rejected
//! rather than guessed at.

use serde_json::Value as Json;

use crate::types::{ConstructionError, FilterError, GrammarError, Operator, Rule, Value};

const LOGIC_TOKENS: [&str; 4] = ["and", "or", "not", "!"];

/// Parse a JSON string into a rule tree.
pub fn parse_str(literal: &str) -> Result<Rule, FilterError> {
    let json: Json = serde_json::from_str(literal).map_err(|e| GrammarError::InvalidLiteral {
        detail: e.to_string(),
    })?;
    parse(&json)
}

/// Parse an already-decoded JSON literal into a rule tree.
pub fn parse(literal: &Json) -> Result<Rule, FilterError> {
    let Json::Array(items) = literal else {
        return Err(GrammarError::InvalidLiteral {
            detail: format!("expected an array literal, got {literal}"),
        }
        .into());
    };

    if items.is_empty() {
        return Err(GrammarError::InvalidLiteral {
            detail: "empty rule literal".into(),
        }
        .into());
    }

    if let Some(token) = logic_token(&items[0]) {
        return parse_prefixed(token, &items[1..]);
    }

    if is_atomic_triple(items) {
        return parse_atomic(items);
    }

    if items.iter().skip(1).any(|item| logic_token(item).is_some()) {
        return parse_interleaved(items);
    }

    // Triple-shaped but with a token nothing recognizes.
    if items.len() == 3 && items[0].is_string() {
        if let Some(token) = items[1].as_str() {
            return Err(GrammarError::UnsupportedOperator {
                token: token.to_string(),
            }
            .into());
        }
    }

    Err(GrammarError::MissingOperator {
        literal: literal.to_string(),
    }
    .into())
}

fn logic_token(item: &Json) -> Option<&str> {
    item.as_str().filter(|s| LOGIC_TOKENS.contains(s))
}

fn is_atomic_triple(items: &[Json]) -> bool {
    items.len() == 3
        && items[0].is_string()
        && items[1]
            .as_str()
            .is_some_and(|token| Operator::from_token(token).is_ok())
}

fn parse_prefixed(token: &str, operands: &[Json]) -> Result<Rule, FilterError> {
    match token {
        "and" => Ok(Rule::and_rules(parse_operands(operands)?)),
        "or" => Ok(Rule::or_rules(parse_operands(operands)?)),
        _ => {
            // "not" / "!"
            if operands.len() != 1 {
                return Err(GrammarError::NotArity {
                    count: operands.len(),
                }
                .into());
            }
            Ok(Rule::negate(parse(&operands[0])?))
        }
    }
}

fn parse_operands(operands: &[Json]) -> Result<Vec<Rule>, FilterError> {
    operands.iter().map(parse).collect()
}

fn parse_interleaved(items: &[Json]) -> Result<Rule, FilterError> {
    let mut tokens: Vec<&str> = Vec::new();
    let mut operands: Vec<Rule> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        if index % 2 == 1 {
            let Some(token) = logic_token(item) else {
                return Err(GrammarError::MissingOperator {
                    literal: Json::Array(items.to_vec()).to_string(),
                }
                .into());
            };
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        } else {
            operands.push(parse(item)?);
        }
    }

    // A trailing token means the list ended on an odd index.
    if items.len() % 2 == 0 {
        return Err(GrammarError::InvalidLiteral {
            detail: format!(
                "dangling operator at the end of {}",
                Json::Array(items.to_vec())
            ),
        }
        .into());
    }

    if tokens.len() > 1 {
        return Err(GrammarError::MixedOperators {
            tokens: tokens.into_iter().map(str::to_owned).collect(),
        }
        .into());
    }

    match tokens[0] {
        "and" => Ok(Rule::and_rules(operands)),
        "or" => Ok(Rule::or_rules(operands)),
        token => Err(GrammarError::InvalidLiteral {
            detail: format!("'{token}' cannot be used in interleaved position"),
        }
        .into()),
    }
}

fn parse_atomic(items: &[Json]) -> Result<Rule, FilterError> {
    let field = items[0].as_str().unwrap_or_default();
    let operator = Operator::from_token(items[1].as_str().unwrap_or_default())?;
    let literal = &items[2];

    match operator {
        Operator::In | Operator::NotIn => {
            let Json::Array(raw) = literal else {
                return Err(ConstructionError::ExpectedList { operator }.into());
            };
            let values = raw
                .iter()
                .map(|item| scalar_value(operator, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match operator {
                Operator::In => Rule::in_list(field, values),
                _ => Rule::not_in_list(field, values),
            })
        }
        Operator::Regexp => {
            let Some(pattern) = literal.as_str() else {
                return Err(ConstructionError::ExpectedPattern {
                    value: literal.to_string(),
                }
                .into());
            };
            Ok(Rule::regexp(field, pattern))
        }
        _ => {
            let value = scalar_value(operator, literal)?;
            Ok(match operator {
                Operator::Equal => Rule::equal(field, value),
                Operator::NotEqual => Rule::not_equal(field, value),
                Operator::Below => Rule::below(field, value),
                Operator::BelowOrEqual => Rule::below_or_equal(field, value),
                Operator::Above => Rule::above(field, value),
                _ => Rule::above_or_equal(field, value),
            })
        }
    }
}

fn scalar_value(operator: Operator, literal: &Json) -> Result<Value, ConstructionError> {
    Value::from_json(literal).ok_or_else(|| ConstructionError::NonScalarBound {
        operator,
        value: literal.to_string(),
    })
}
