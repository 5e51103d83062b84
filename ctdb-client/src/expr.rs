/// Expression and predicate builders
///
/// # Example
/// ```
/// use ctdb_client::expr::{col, is_not_null, lit};
///
/// let predicate = col("value").gt(lit(10)).and(is_not_null("id"));
/// ```
use crate::convert::value_to_literal;
use crate::names::column_name;
use crate::value::Value;
use ctdb_proto::{self as proto, expression::Exp, predicate::Predicate as P};

/// A value-producing expression: column reference, literal or function call
#[derive(Debug, Clone)]
pub struct Expr(proto::Expression);

/// A boolean predicate used in `where` clauses
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate(proto::Predicate);

/// Reference a column by name
pub fn col(name: &str) -> Expr {
    Expr(proto::Expression {
        exp: Some(Exp::Column(column_name(name))),
    })
}

/// A literal value
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr(proto::Expression {
        exp: Some(Exp::Literal(value_to_literal(&value.into()))),
    })
}

/// Call a server-side function, e.g. a distance function
pub fn func(name: &str, arguments: impl IntoIterator<Item = Expr>) -> Expr {
    Expr(proto::Expression {
        exp: Some(Exp::Function(proto::Function {
            name: Some(proto::FunctionName {
                name: name.to_string(),
            }),
            arguments: arguments.into_iter().map(Expr::into_proto).collect(),
        })),
    })
}

impl Expr {
    pub fn into_proto(self) -> proto::Expression {
        self.0
    }

    fn compare(self, op: proto::ComparisonOperator, right: Vec<Expr>) -> Predicate {
        Predicate(proto::Predicate {
            predicate: Some(P::Comparison(proto::Comparison {
                left: Some(self.0),
                operator: op as i32,
                right: right.into_iter().map(Expr::into_proto).collect(),
                not: false,
            })),
        })
    }

    pub fn eq(self, other: Expr) -> Predicate {
        self.compare(proto::ComparisonOperator::Equal, vec![other])
    }

    pub fn ne(self, other: Expr) -> Predicate {
        self.eq(other).not()
    }

    pub fn gt(self, other: Expr) -> Predicate {
        self.compare(proto::ComparisonOperator::Greater, vec![other])
    }

    pub fn lt(self, other: Expr) -> Predicate {
        self.compare(proto::ComparisonOperator::Less, vec![other])
    }

    pub fn ge(self, other: Expr) -> Predicate {
        self.compare(proto::ComparisonOperator::Gequal, vec![other])
    }

    pub fn le(self, other: Expr) -> Predicate {
        self.compare(proto::ComparisonOperator::Lequal, vec![other])
    }

    pub fn like(self, pattern: &str) -> Predicate {
        self.compare(proto::ComparisonOperator::Like, vec![lit(pattern)])
    }

    pub fn between(self, lower: Expr, upper: Expr) -> Predicate {
        self.compare(proto::ComparisonOperator::Between, vec![lower, upper])
    }

    pub fn in_list(self, values: impl IntoIterator<Item = Expr>) -> Predicate {
        self.compare(proto::ComparisonOperator::In, values.into_iter().collect())
    }
}

/// Rows where `column` holds no value
pub fn is_null(column: &str) -> Predicate {
    Predicate(proto::Predicate {
        predicate: Some(P::Isnull(proto::IsNull {
            column: Some(column_name(column)),
            not: false,
        })),
    })
}

pub fn is_not_null(column: &str) -> Predicate {
    is_null(column).not()
}

impl Predicate {
    /// Constant predicate; `always(true)` selects every row
    pub fn always(value: bool) -> Self {
        Predicate(proto::Predicate {
            predicate: Some(P::Literal(value_to_literal(&Value::Boolean(value)))),
        })
    }

    pub fn into_proto(self) -> proto::Predicate {
        self.0
    }

    pub fn and(self, other: Predicate) -> Predicate {
        self.connect(proto::ConnectionOperator::And, other)
    }

    pub fn or(self, other: Predicate) -> Predicate {
        self.connect(proto::ConnectionOperator::Or, other)
    }

    /// Negate. Constant predicates are folded; everything else flips its `not` flag.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        let predicate = match self.0.predicate {
            Some(P::Literal(proto::Literal {
                data: Some(proto::literal::Data::BooleanData(b)),
            })) => return Predicate::always(!b),
            Some(P::Comparison(mut c)) => {
                c.not = !c.not;
                P::Comparison(c)
            }
            Some(P::Isnull(mut n)) => {
                n.not = !n.not;
                P::Isnull(n)
            }
            Some(P::Compound(mut c)) => {
                c.not = !c.not;
                P::Compound(c)
            }
            Some(other) => P::Compound(proto::Compound {
                operator: proto::ConnectionOperator::And as i32,
                operands: vec![proto::Predicate {
                    predicate: Some(other),
                }],
                not: true,
            }),
            None => return Predicate::always(false),
        };
        Predicate(proto::Predicate {
            predicate: Some(predicate),
        })
    }

    fn connect(self, op: proto::ConnectionOperator, other: Predicate) -> Predicate {
        // Flatten chains of the same connective into one operand list.
        let mut operands = match self.0.predicate {
            Some(P::Compound(c)) if c.operator == op as i32 && !c.not => c.operands,
            predicate => vec![proto::Predicate { predicate }],
        };
        operands.push(other.0);

        Predicate(proto::Predicate {
            predicate: Some(P::Compound(proto::Compound {
                operator: op as i32,
                operands,
                not: false,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison() {
        let p = col("value").gt(lit(3)).into_proto();
        match p.predicate {
            Some(P::Comparison(c)) => {
                assert_eq!(c.operator, proto::ComparisonOperator::Greater as i32);
                assert_eq!(c.right.len(), 1);
                assert!(!c.not);
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_and_chain_flattens() {
        let p = col("a")
            .eq(lit(1))
            .and(col("b").eq(lit(2)))
            .and(col("c").eq(lit(3)))
            .into_proto();
        match p.predicate {
            Some(P::Compound(c)) => {
                assert_eq!(c.operator, proto::ConnectionOperator::And as i32);
                assert_eq!(c.operands.len(), 3);
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_or_inside_and_is_nested() {
        let p = col("a")
            .eq(lit(1))
            .or(col("b").eq(lit(2)))
            .and(col("c").eq(lit(3)))
            .into_proto();
        match p.predicate {
            Some(P::Compound(c)) => {
                assert_eq!(c.operator, proto::ConnectionOperator::And as i32);
                assert_eq!(c.operands.len(), 2);
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_not() {
        assert_eq!(Predicate::always(true).not(), Predicate::always(false));
        match is_not_null("id").into_proto().predicate {
            Some(P::Isnull(n)) => {
                assert!(n.not);
                assert_eq!(n.column.unwrap().name, "id");
            }
            other => panic!("unexpected predicate {:?}", other),
        }
        match col("x").ne(lit(1)).not().into_proto().predicate {
            Some(P::Comparison(c)) => assert!(!c.not),
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_is_null_names_column() {
        match is_null("value").into_proto().predicate {
            Some(P::Isnull(n)) => {
                assert!(!n.not);
                assert_eq!(n.column.unwrap().name, "value");
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_function() {
        let e = func("manhattan", [col("feature"), lit(vec![1.0f32, 2.0])]).into_proto();
        match e.exp {
            Some(Exp::Function(f)) => {
                assert_eq!(f.name.unwrap().name, "manhattan");
                assert_eq!(f.arguments.len(), 2);
            }
            other => panic!("unexpected expression {:?}", other),
        }
    }
}
