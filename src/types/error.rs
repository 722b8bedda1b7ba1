use thiserror::Error;

use super::operator::Operator;

/// Errors raised while building a rule tree from a literal.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("mixing different operations in the same rule level is not implemented: [{}]", tokens.join(", "))]
    MixedOperators { tokens: Vec<String> },

    #[error("please provide an operator for the operation: {literal}")]
    MissingOperator { literal: String },

    #[error("negations can have only one operand, got {count}")]
    NotArity { count: usize },

    #[error("unsupported operator token '{token}'")]
    UnsupportedOperator { token: String },

    #[error("invalid filter literal: {detail}")]
    InvalidLiteral { detail: String },

    #[error("cannot add rules to a filter whose simplification left only a contradiction")]
    ContradictoryFilter,
}

/// Errors raised by atomic rule constructors when the value does not fit
/// the operator.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("'{operator}' requires a scalar or null bound, got {value}")]
    NonScalarBound { operator: Operator, value: String },

    #[error("'{operator}' requires a list of possibilities")]
    ExpectedList { operator: Operator },

    #[error("'regexp' requires a string pattern, got {value}")]
    ExpectedPattern { value: String },
}

/// Errors raised while evaluating a filter against a target, or when a
/// rewrite needs an operation the operator vocabulary cannot express.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("invalid regular expression {pattern:?}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error(
        "rule filters must target one of [field, operator, value, children, description], got '{field}'"
    )]
    UnknownRuleProperty { field: String },

    #[error("the '{operator}' operator has no logical complement")]
    UnsupportedNegation { operator: Operator },

    #[error("cannot apply '{operator}' to {value}")]
    UnsupportedComparison { operator: Operator, value: String },
}

/// Unified error type covering grammar, construction and evaluation
/// failures. Returned by the `Filter` facade entry points.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_operators_message() {
        let err = GrammarError::MixedOperators {
            tokens: vec!["and".into(), "or".into()],
        };
        assert_eq!(
            err.to_string(),
            "mixing different operations in the same rule level is not implemented: [and, or]"
        );
    }

    #[test]
    fn missing_operator_message() {
        let err = GrammarError::MissingOperator {
            literal: "[[\"a\",\">\",3],[\"b\",\"<\",2]]".into(),
        };
        assert!(err
            .to_string()
            .starts_with("please provide an operator for the operation:"));
    }

    #[test]
    fn not_arity_message() {
        let err = GrammarError::NotArity { count: 2 };
        assert_eq!(err.to_string(), "negations can have only one operand, got 2");
    }

    #[test]
    fn non_scalar_bound_message() {
        let err = ConstructionError::NonScalarBound {
            operator: Operator::Above,
            value: "[1, 2]".into(),
        };
        assert_eq!(
            err.to_string(),
            "'>' requires a scalar or null bound, got [1, 2]"
        );
    }

    #[test]
    fn unsupported_negation_message() {
        let err = EvaluationError::UnsupportedNegation {
            operator: Operator::Regexp,
        };
        assert_eq!(
            err.to_string(),
            "the 'regexp' operator has no logical complement"
        );
    }

    #[test]
    fn filter_error_is_transparent() {
        let err = FilterError::from(GrammarError::NotArity { count: 0 });
        assert_eq!(err.to_string(), "negations can have only one operand, got 0");
    }
}
