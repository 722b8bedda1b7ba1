use super::rule::Rule;
use super::value::Value;

/// Entry point of the fluent builder:
///
/// ```
/// use siftlogic::field;
///
/// let rule = field("age").gte(18) & field("name").matches("^[A-Z]");
/// ```
#[must_use]
pub fn field(name: impl Into<String>) -> FieldExpr {
    FieldExpr { name: name.into() }
}

/// A field name waiting for its comparison.
#[derive(Debug, Clone)]
pub struct FieldExpr {
    name: String,
}

impl FieldExpr {
    #[must_use]
    pub fn eq(self, value: impl Into<Value>) -> Rule {
        Rule::equal(self.name, value)
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Rule {
        Rule::not_equal(self.name, value)
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Rule {
        Rule::above(self.name, value)
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Rule {
        Rule::above_or_equal(self.name, value)
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Rule {
        Rule::below(self.name, value)
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Rule {
        Rule::below_or_equal(self.name, value)
    }

    #[must_use]
    pub fn one_of(self, values: impl IntoIterator<Item = impl Into<Value>>) -> Rule {
        Rule::in_list(self.name, values.into_iter().map(Into::into))
    }

    #[must_use]
    pub fn none_of(self, values: impl IntoIterator<Item = impl Into<Value>>) -> Rule {
        Rule::not_in_list(self.name, values.into_iter().map(Into::into))
    }

    #[must_use]
    pub fn matches(self, pattern: impl Into<String>) -> Rule {
        Rule::regexp(self.name, pattern)
    }

    #[must_use]
    pub fn is_null(self) -> Rule {
        Rule::equal(self.name, Value::Null)
    }

    #[must_use]
    pub fn is_not_null(self) -> Rule {
        Rule::not_equal(self.name, Value::Null)
    }
}

impl std::ops::BitAnd for Rule {
    type Output = Rule;

    fn bitand(self, rhs: Rule) -> Rule {
        match self {
            // Flatten chains so a & b & c builds one AND node.
            Rule::And(_) => {
                let mut lhs = self;
                lhs.add_operand(rhs);
                lhs
            }
            other => Rule::and_rules(vec![other, rhs]),
        }
    }
}

impl std::ops::BitOr for Rule {
    type Output = Rule;

    fn bitor(self, rhs: Rule) -> Rule {
        match self {
            Rule::Or(_) => {
                let mut lhs = self;
                lhs.add_operand(rhs);
                lhs
            }
            other => Rule::or_rules(vec![other, rhs]),
        }
    }
}

impl std::ops::Not for Rule {
    type Output = Rule;

    fn not(self) -> Rule {
        Rule::negate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::rule::Predicate;

    #[test]
    fn builder_produces_atomics() {
        let rule = field("age").gte(18);
        let atomic = rule.as_atomic().unwrap();
        assert_eq!(atomic.field, "age");
        assert_eq!(atomic.predicate, Predicate::AboveOrEqual(Value::Int(18)));
    }

    #[test]
    fn bitand_flattens_chains() {
        let rule = field("a").eq(1) & field("b").eq(2) & field("c").eq(3);
        match rule {
            Rule::And(op) => assert_eq!(op.operands.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn bitor_builds_disjunctions() {
        let rule = field("a").eq(1) | field("a").eq(2);
        match rule {
            Rule::Or(op) => assert_eq!(op.operands.len(), 2),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn not_wraps() {
        let rule = !field("a").eq(1);
        assert!(matches!(rule, Rule::Not(_)));
    }

    #[test]
    fn null_helpers() {
        assert_eq!(field("f").is_null(), Rule::equal("f", Value::Null));
        assert_eq!(field("f").is_not_null(), Rule::not_equal("f", Value::Null));
    }
}
