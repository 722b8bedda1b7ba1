use std::fmt;

use super::error::GrammarError;

/// Comparison operators an atomic rule can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    Below,
    BelowOrEqual,
    Above,
    AboveOrEqual,
    In,
    NotIn,
    Regexp,
}

impl Operator {
    /// Canonical token used in the array encoding.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Below => "<",
            Operator::BelowOrEqual => "<=",
            Operator::Above => ">",
            Operator::AboveOrEqual => ">=",
            Operator::In => "in",
            Operator::NotIn => "!in",
            Operator::Regexp => "regexp",
        }
    }

    /// Parse a token. Word aliases (`equal`, `above`, `below`, ...) are
    /// accepted alongside the symbolic forms.
    pub fn from_token(token: &str) -> Result<Operator, GrammarError> {
        Ok(match token {
            "=" | "equal" => Operator::Equal,
            "!=" | "not_equal" => Operator::NotEqual,
            "<" | "below" => Operator::Below,
            "<=" | "below_or_equal" => Operator::BelowOrEqual,
            ">" | "above" => Operator::Above,
            ">=" | "above_or_equal" => Operator::AboveOrEqual,
            "in" => Operator::In,
            "!in" | "not_in" => Operator::NotIn,
            "regexp" => Operator::Regexp,
            other => {
                return Err(GrammarError::UnsupportedOperator {
                    token: other.to_owned(),
                })
            }
        })
    }

    /// True for the four range operators.
    #[must_use]
    pub fn is_range(self) -> bool {
        matches!(
            self,
            Operator::Below | Operator::BelowOrEqual | Operator::Above | Operator::AboveOrEqual
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
