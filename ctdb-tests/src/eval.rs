/// Expression, predicate and query evaluation over the in-memory catalog
use crate::catalog::{is_null, null, Catalog, Table};
use ctdb_proto::{
    self as proto, expression::Exp, literal::Data, predicate::Predicate,
    projection::ProjectionOperation, source::Source, vector::VectorData, ComparisonOperator,
    ConnectionOperator,
};
use std::cmp::Ordering;
use tonic::Status;

/// Column names and values of one row
pub struct RowRef<'a> {
    pub names: &'a [String],
    pub values: &'a [proto::Literal],
}

impl RowRef<'_> {
    fn get(&self, column: &str) -> Result<proto::Literal, Status> {
        self.names
            .iter()
            .position(|n| n == column)
            .map(|i| self.values[i].clone())
            .ok_or_else(|| Status::invalid_argument(format!("unknown column '{}'", column)))
    }
}

pub fn evaluate(expression: &proto::Expression, row: &RowRef<'_>) -> Result<proto::Literal, Status> {
    match &expression.exp {
        Some(Exp::Literal(literal)) => Ok(literal.clone()),
        Some(Exp::Column(column)) => row.get(&column.name),
        Some(Exp::Function(function)) => {
            let name = function
                .name
                .as_ref()
                .map(|n| n.name.as_str())
                .unwrap_or_default();
            let arguments = function
                .arguments
                .iter()
                .map(|a| evaluate(a, row))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &arguments)
        }
        None => Err(Status::invalid_argument("empty expression")),
    }
}

fn call(name: &str, arguments: &[proto::Literal]) -> Result<proto::Literal, Status> {
    let (a, b) = match arguments {
        [a, b] => (vector(a), vector(b)),
        _ => {
            return Err(Status::invalid_argument(format!(
                "function '{}' takes two arguments",
                name
            )))
        }
    };
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) if a.len() == b.len() => (a, b),
        _ => {
            return Err(Status::invalid_argument(format!(
                "function '{}' needs two vectors of equal length",
                name
            )))
        }
    };

    let pairs = a.iter().zip(b.iter());
    let distance = match name {
        "manhattan" => pairs.map(|(x, y)| (x - y).abs()).sum(),
        "euclidean" => pairs.map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt(),
        "squaredeuclidean" => pairs.map(|(x, y)| (x - y) * (x - y)).sum(),
        _ => return Err(Status::unimplemented(format!("unknown function '{}'", name))),
    };
    Ok(proto::Literal {
        data: Some(Data::DoubleData(distance)),
    })
}

pub fn matches(predicate: &proto::Predicate, row: &RowRef<'_>) -> Result<bool, Status> {
    match &predicate.predicate {
        Some(Predicate::Literal(literal)) => Ok(matches!(literal.data, Some(Data::BooleanData(true)))),
        Some(Predicate::Isnull(isnull)) => {
            let column = isnull
                .column
                .as_ref()
                .ok_or_else(|| Status::invalid_argument("column required"))?;
            Ok(is_null(&row.get(&column.name)?) != isnull.not)
        }
        Some(Predicate::Comparison(comparison)) => {
            let left = comparison
                .left
                .as_ref()
                .ok_or_else(|| Status::invalid_argument("left operand required"))?;
            let left = evaluate(left, row)?;
            let right = comparison
                .right
                .iter()
                .map(|r| evaluate(r, row))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(compare_with(comparison.operator(), &left, &right)? != comparison.not)
        }
        Some(Predicate::Compound(compound)) => {
            let mut outcomes = compound.operands.iter().map(|p| matches(p, row));
            let result = match compound.operator() {
                ConnectionOperator::And => outcomes.try_fold(true, |acc, r| r.map(|m| acc && m))?,
                ConnectionOperator::Or => outcomes.try_fold(false, |acc, r| r.map(|m| acc || m))?,
            };
            Ok(result != compound.not)
        }
        None => Ok(true),
    }
}

fn compare_with(
    operator: ComparisonOperator,
    left: &proto::Literal,
    right: &[proto::Literal],
) -> Result<bool, Status> {
    let single = || {
        right
            .first()
            .ok_or_else(|| Status::invalid_argument("right operand required"))
    };

    Ok(match operator {
        ComparisonOperator::Equal => compare(left, single()?) == Some(Ordering::Equal),
        ComparisonOperator::Greater => compare(left, single()?) == Some(Ordering::Greater),
        ComparisonOperator::Less => compare(left, single()?) == Some(Ordering::Less),
        ComparisonOperator::Gequal => matches!(
            compare(left, single()?),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ComparisonOperator::Lequal => matches!(
            compare(left, single()?),
            Some(Ordering::Less | Ordering::Equal)
        ),
        ComparisonOperator::In => right
            .iter()
            .any(|r| compare(left, r) == Some(Ordering::Equal)),
        ComparisonOperator::Between => match right {
            [low, high] => {
                matches!(compare(left, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(compare(left, high), Some(Ordering::Less | Ordering::Equal))
            }
            _ => return Err(Status::invalid_argument("BETWEEN takes two bounds")),
        },
        ComparisonOperator::Like => match (&left.data, &single()?.data) {
            (Some(Data::StringData(value)), Some(Data::StringData(pattern))) => {
                like(value.as_bytes(), pattern.as_bytes())
            }
            _ => false,
        },
    })
}

/// SQL LIKE with `%` and `_` wildcards
fn like(value: &[u8], pattern: &[u8]) -> bool {
    match pattern.split_first() {
        None => value.is_empty(),
        Some((b'%', rest)) => (0..=value.len()).any(|i| like(&value[i..], rest)),
        Some((b'_', rest)) => !value.is_empty() && like(&value[1..], rest),
        Some((c, rest)) => value.first() == Some(c) && like(&value[1..], rest),
    }
}

fn number(literal: &proto::Literal) -> Option<f64> {
    match literal.data {
        Some(Data::IntData(i)) => Some(i as f64),
        Some(Data::LongData(l)) => Some(l as f64),
        Some(Data::FloatData(f)) => Some(f as f64),
        Some(Data::DoubleData(d)) => Some(d),
        _ => None,
    }
}

fn vector(literal: &proto::Literal) -> Option<Vec<f64>> {
    match &literal.data {
        Some(Data::VectorData(v)) => match &v.vector_data {
            Some(VectorData::FloatVector(v)) => Some(v.vector.iter().map(|x| *x as f64).collect()),
            Some(VectorData::DoubleVector(v)) => Some(v.vector.clone()),
            Some(VectorData::IntVector(v)) => Some(v.vector.iter().map(|x| *x as f64).collect()),
            Some(VectorData::LongVector(v)) => Some(v.vector.iter().map(|x| *x as f64).collect()),
            _ => None,
        },
        _ => None,
    }
}

/// Ordering of two literals; nulls sort first, incomparable kinds yield None
pub fn compare(a: &proto::Literal, b: &proto::Literal) -> Option<Ordering> {
    match (is_null(a), is_null(b)) {
        (true, true) => return Some(Ordering::Equal),
        (true, false) => return Some(Ordering::Less),
        (false, true) => return Some(Ordering::Greater),
        _ => {}
    }

    if let (Some(x), Some(y)) = (number(a), number(b)) {
        return x.partial_cmp(&y);
    }
    match (&a.data, &b.data) {
        (Some(Data::StringData(x)), Some(Data::StringData(y))) => Some(x.cmp(y)),
        (Some(Data::BooleanData(x)), Some(Data::BooleanData(y))) => Some(x.cmp(y)),
        (Some(Data::DateData(x)), Some(Data::DateData(y))) => {
            Some(x.utc_timestamp.cmp(&y.utc_timestamp))
        }
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// Resolve a source to its table and the rows it yields
pub fn source_rows<'a>(
    catalog: &'a Catalog,
    source: Option<&proto::Source>,
) -> Result<(&'a Table, Vec<&'a Vec<proto::Literal>>), Status> {
    match source.and_then(|s| s.source.as_ref()) {
        Some(Source::Scan(scan)) => {
            let table = catalog.table(scan.entity.as_ref())?;
            Ok((table, table.rows.iter().collect()))
        }
        Some(Source::Sample(sample)) => {
            let table = catalog.table(sample.entity.as_ref())?;
            let mut state = sample.seed as u64;
            let rows = table
                .rows
                .iter()
                .filter(|_| {
                    // Linear congruential step, reproducible for a given seed
                    state = state
                        .wrapping_mul(6364136223846793005)
                        .wrapping_add(1442695040888963407);
                    ((state >> 33) as f64 / (1u64 << 31) as f64) < sample.probability as f64
                })
                .collect();
            Ok((table, rows))
        }
        None => Err(Status::invalid_argument("source required")),
    }
}

pub fn column_names(table: &Table) -> Vec<String> {
    table.columns.iter().map(|c| c.name.clone()).collect()
}

/// Indices of the rows a predicate selects
pub fn filter_rows(
    names: &[String],
    rows: &[&Vec<proto::Literal>],
    predicate: Option<&proto::Predicate>,
) -> Result<Vec<usize>, Status> {
    let mut selected = Vec::new();
    for (i, values) in rows.iter().enumerate() {
        let keep = match predicate {
            Some(p) => matches(p, &RowRef { names, values })?,
            None => true,
        };
        if keep {
            selected.push(i);
        }
    }
    Ok(selected)
}

/// Tabular result of a query
#[derive(Debug, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<proto::Literal>>,
}

pub fn execute(catalog: &Catalog, query: &proto::Query) -> Result<ResultSet, Status> {
    let (table, rows) = source_rows(catalog, query.from.as_ref())?;
    let names = column_names(table);
    let selected = filter_rows(&names, &rows, query.r#where.as_ref())?;

    let projection = query.projection.clone().unwrap_or_default();
    match projection.op() {
        ProjectionOperation::Count => {
            return Ok(ResultSet {
                columns: vec!["count".to_string()],
                rows: vec![vec![proto::Literal {
                    data: Some(Data::LongData(selected.len() as i64)),
                }]],
            })
        }
        ProjectionOperation::Exists => {
            return Ok(ResultSet {
                columns: vec!["exists".to_string()],
                rows: vec![vec![proto::Literal {
                    data: Some(Data::BooleanData(!selected.is_empty())),
                }]],
            })
        }
        ProjectionOperation::Select | ProjectionOperation::SelectDistinct => {}
    }

    // Expand `*` and name every output column
    let mut outputs: Vec<(String, proto::Expression)> = Vec::new();
    for element in &projection.elements {
        let expression = element.expression.clone().unwrap_or_default();
        match &expression.exp {
            Some(Exp::Column(c)) if c.name == "*" => {
                for name in &names {
                    outputs.push((name.clone(), column_expression(name)));
                }
            }
            exp => {
                let name = match (&element.alias, exp) {
                    (Some(alias), _) => alias.name.clone(),
                    (None, Some(Exp::Column(c))) => c.name.clone(),
                    (None, Some(Exp::Function(f))) => {
                        f.name.as_ref().map(|n| n.name.clone()).unwrap_or_default()
                    }
                    (None, _) => format!("column_{}", outputs.len()),
                };
                outputs.push((name, expression));
            }
        }
    }

    let mut projected = Vec::with_capacity(selected.len());
    for i in selected {
        let row = RowRef {
            names: &names,
            values: rows[i],
        };
        let values = outputs
            .iter()
            .map(|(_, e)| evaluate(e, &row))
            .collect::<Result<Vec<_>, _>>()?;
        projected.push((values, rows[i]));
    }

    let columns: Vec<String> = outputs.into_iter().map(|(n, _)| n).collect();
    if let Some(order) = &query.order {
        let mut keys = Vec::new();
        for component in &order.components {
            let name = component
                .column
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or_default();
            let key = if let Some(i) = columns.iter().position(|c| c == name) {
                (true, i)
            } else if let Some(i) = names.iter().position(|c| c == name) {
                (false, i)
            } else {
                return Err(Status::invalid_argument(format!("unknown column '{}'", name)));
            };
            keys.push((key, component.direction() == proto::order::Direction::Descending));
        }

        projected.sort_by(|(a_out, a_src), (b_out, b_src)| {
            for ((from_output, i), descending) in &keys {
                let (a, b) = if *from_output {
                    (&a_out[*i], &b_out[*i])
                } else {
                    (&a_src[*i], &b_src[*i])
                };
                let ordering = compare(a, b).unwrap_or(Ordering::Equal);
                let ordering = if *descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let mut out: Vec<Vec<proto::Literal>> = projected.into_iter().map(|(v, _)| v).collect();
    if projection.op() == ProjectionOperation::SelectDistinct {
        let mut seen: Vec<Vec<proto::Literal>> = Vec::new();
        out.retain(|row| {
            if seen.contains(row) {
                false
            } else {
                seen.push(row.clone());
                true
            }
        });
    }

    let skip = query.skip.max(0) as usize;
    let rows = out.into_iter().skip(skip);
    let rows = if query.limit > 0 {
        rows.take(query.limit as usize).collect()
    } else {
        rows.collect()
    };

    Ok(ResultSet { columns, rows })
}

fn column_expression(name: &str) -> proto::Expression {
    proto::Expression {
        exp: Some(Exp::Column(proto::ColumnName {
            entity: None,
            name: name.to_string(),
        })),
    }
}

/// Assign update expressions to a row in place
pub fn apply_updates(
    row: &mut [proto::Literal],
    names: &[String],
    updates: &[proto::update_message::UpdateElement],
) -> Result<(), Status> {
    let current = row.to_vec();
    let context = RowRef {
        names,
        values: &current,
    };
    for update in updates {
        let column = update
            .column
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("update column required"))?;
        let index = names
            .iter()
            .position(|n| *n == column.name)
            .ok_or_else(|| Status::invalid_argument(format!("unknown column '{}'", column.name)))?;
        row[index] = match &update.value {
            Some(expression) => evaluate(expression, &context)?,
            None => null(),
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long(v: i64) -> proto::Literal {
        proto::Literal {
            data: Some(Data::LongData(v)),
        }
    }

    fn string(v: &str) -> proto::Literal {
        proto::Literal {
            data: Some(Data::StringData(v.to_string())),
        }
    }

    #[test]
    fn test_like() {
        assert!(like(b"test_10", b"test%"));
        assert!(like(b"abc", b"a_c"));
        assert!(!like(b"abc", b"b%"));
        assert!(like(b"", b"%"));
    }

    #[test]
    fn test_compare_mixed_numbers() {
        let int = proto::Literal {
            data: Some(Data::IntData(2)),
        };
        assert_eq!(compare(&int, &long(2)), Some(Ordering::Equal));
        assert_eq!(compare(&null(), &long(0)), Some(Ordering::Less));
        assert_eq!(compare(&string("a"), &long(0)), None);
    }

    #[test]
    fn test_manhattan_distance() {
        let v = |x: Vec<f32>| proto::Literal {
            data: Some(Data::VectorData(proto::Vector {
                vector_data: Some(VectorData::FloatVector(proto::FloatVector { vector: x })),
            })),
        };
        let d = call("manhattan", &[v(vec![1.0, 0.0]), v(vec![0.0, 1.0])]).unwrap();
        assert_eq!(d.data, Some(Data::DoubleData(2.0)));
        assert!(call("manhattan", &[v(vec![1.0]), v(vec![0.0, 1.0])]).is_err());
    }
}
