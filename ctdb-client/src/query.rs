/// Query builders: general queries, samples and nearest-neighbor search
use crate::error::{ClientError, Result};
use crate::expr::{col, func, lit, Expr, Predicate};
use crate::names::{column_name, entity_name, scan};
use crate::response::{collect, Record};
use crate::value::Value;
use ctdb_proto::{self as proto, projection::ProjectionOperation, DqlClient};
use tonic::transport::Channel;

pub use ctdb_proto::order::Direction;

/// Column name that selects every column of the source
pub const ALL_COLUMNS: &str = "*";

/// Distance function used by nearest-neighbor search unless overridden
pub const DEFAULT_DISTANCE: &str = "manhattan";

/// Alias under which nearest-neighbor search returns the computed distance
pub const DISTANCE_COLUMN: &str = "distance";

/// Query builder
///
/// # Example
/// ```
/// use ctdb_client::expr::{col, lit};
/// use ctdb_client::{Direction, Query};
///
/// let query = Query::scan("schema_test", "entity_test")
///     .select(col("id"))
///     .select_as(col("value"), "v")
///     .filter(col("value").ge(lit(10)))
///     .order_by("v", Direction::Descending)
///     .limit(5);
/// ```
pub struct Query {
    source: proto::Source,
    operation: ProjectionOperation,
    projection: Vec<(Expr, Option<String>)>,
    predicate: Option<Predicate>,
    order: Vec<(String, Direction)>,
    limit: Option<u64>,
    skip: Option<u64>,
}

impl Query {
    /// Full scan over one entity
    pub fn scan(schema: &str, entity: &str) -> Self {
        Self::from_source(scan(schema, entity))
    }

    /// Random sample of an entity
    pub fn sample(schema: &str, entity: &str, probability: f32, seed: i64) -> Self {
        Self::from_source(proto::Source {
            source: Some(proto::source::Source::Sample(proto::Sample {
                entity: Some(entity_name(schema, entity)),
                probability,
                seed,
            })),
        })
    }

    pub fn from_source(source: proto::Source) -> Self {
        Self {
            source,
            operation: ProjectionOperation::Select,
            projection: Vec::new(),
            predicate: None,
            order: Vec::new(),
            limit: None,
            skip: None,
        }
    }

    /// Add an output expression
    pub fn select(mut self, expr: Expr) -> Self {
        self.projection.push((expr, None));
        self
    }

    /// Add an output expression under an alias
    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.projection.push((expr, Some(alias.into())));
        self
    }

    pub fn select_all(self) -> Self {
        self.select(col(ALL_COLUMNS))
    }

    pub fn distinct(mut self) -> Self {
        self.operation = ProjectionOperation::SelectDistinct;
        self
    }

    /// Return the number of matching rows instead of the rows
    pub fn count(mut self) -> Self {
        self.operation = ProjectionOperation::Count;
        self
    }

    /// Restrict to rows matching the predicate; repeated calls are AND-ed
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push((column.into(), direction));
        self
    }

    /// Return at most `limit` rows.
    ///
    /// The wire encodes "no limit" as 0, so `limit(0)` cannot be sent and is
    /// rejected when the query is built. Leave the limit unset to get every row.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `skip` rows; 0 is the same as no skip
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Build the wire query. Fails for `limit(0)` and for a limit or skip
    /// above `i64::MAX`.
    pub fn into_proto(self) -> Result<proto::Query> {
        let limit = match self.limit {
            Some(0) => {
                return Err(ClientError::InvalidArgument(
                    "limit must be at least 1, leave it unset for all rows".to_string(),
                ))
            }
            limit => wire_count("limit", limit)?,
        };
        let skip = wire_count("skip", self.skip)?;

        let mut projection = self.projection;
        if projection.is_empty() {
            projection.push((col(ALL_COLUMNS), None));
        }

        Ok(proto::Query {
            from: Some(self.source),
            projection: Some(proto::Projection {
                op: self.operation as i32,
                elements: projection
                    .into_iter()
                    .map(|(expr, alias)| proto::projection::ProjectionElement {
                        expression: Some(expr.into_proto()),
                        alias: alias.as_deref().map(column_name),
                    })
                    .collect(),
            }),
            r#where: self.predicate.map(Predicate::into_proto),
            order: if self.order.is_empty() {
                None
            } else {
                Some(proto::Order {
                    components: self
                        .order
                        .into_iter()
                        .map(|(column, direction)| proto::order::Component {
                            column: Some(column_name(&column)),
                            direction: direction as i32,
                        })
                        .collect(),
                })
            },
            limit,
            skip,
        })
    }

    pub fn into_message(self, tx_id: Option<proto::TransactionId>) -> Result<proto::QueryMessage> {
        Ok(proto::QueryMessage {
            tx_id,
            query: Some(self.into_proto()?),
        })
    }

    /// Execute the query, draining the whole response stream
    pub async fn execute(
        self,
        client: &mut DqlClient<Channel>,
        tx_id: Option<proto::TransactionId>,
    ) -> Result<Vec<Record>> {
        let message = self.into_message(tx_id)?;
        let stream = client.query(message).await?.into_inner();
        collect(stream).await
    }
}

/// Wire value of an optional row count, 0 when unset
fn wire_count(name: &str, value: Option<u64>) -> Result<i64> {
    value.map_or(Ok(0), |n| {
        i64::try_from(n)
            .map_err(|_| ClientError::InvalidArgument(format!("{} {} is out of range", name, n)))
    })
}

/// Nearest-neighbor search builder.
///
/// Projects the identifier column and `distance(column, query)` aliased as
/// `distance`, ordered by ascending distance. The distance is computed by the
/// server.
///
/// # Example
/// ```
/// use ctdb_client::NearestNeighbors;
///
/// let knn = NearestNeighbors::new("s", "features", "feature", vec![0.1f32, 0.2, 0.3], "id")
///     .distance("euclidean")
///     .limit(10);
/// ```
pub struct NearestNeighbors {
    schema: String,
    entity: String,
    column: String,
    query: Value,
    id_column: String,
    distance: String,
    limit: Option<u64>,
}

impl NearestNeighbors {
    pub fn new(
        schema: impl Into<String>,
        entity: impl Into<String>,
        column: impl Into<String>,
        query: impl Into<Value>,
        id_column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            entity: entity.into(),
            column: column.into(),
            query: query.into(),
            id_column: id_column.into(),
            distance: DEFAULT_DISTANCE.to_string(),
            limit: None,
        }
    }

    /// Name of the server-side distance function
    pub fn distance(mut self, distance: impl Into<String>) -> Self {
        self.distance = distance.into();
        self
    }

    /// Return at most `k` neighbors; `k` must be at least 1
    pub fn limit(mut self, k: u64) -> Self {
        self.limit = Some(k);
        self
    }

    pub fn into_query(self) -> Query {
        let distance = func(&self.distance, [col(&self.column), lit(self.query)]);
        let query = Query::scan(&self.schema, &self.entity)
            .select(col(&self.id_column))
            .select_as(distance, DISTANCE_COLUMN)
            .order_by(DISTANCE_COLUMN, Direction::Ascending);

        match self.limit {
            Some(k) => query.limit(k),
            None => query,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctdb_proto::expression::Exp;

    #[test]
    fn test_default_projection_selects_all() {
        let q = Query::scan("s", "e").into_proto().unwrap();
        let projection = q.projection.unwrap();
        assert_eq!(projection.op, ProjectionOperation::Select as i32);
        assert_eq!(projection.elements.len(), 1);
        match projection.elements[0].expression.as_ref().unwrap().exp.as_ref() {
            Some(Exp::Column(c)) => assert_eq!(c.name, ALL_COLUMNS),
            other => panic!("unexpected expression {:?}", other),
        }
        assert!(q.order.is_none());
        assert!(q.r#where.is_none());
        assert_eq!(q.limit, 0);
        assert_eq!(q.skip, 0);
    }

    #[test]
    fn test_filters_are_anded() {
        let q = Query::scan("s", "e")
            .filter(col("a").eq(lit(1)))
            .filter(col("b").eq(lit(2)))
            .into_proto()
            .unwrap();
        match q.r#where.unwrap().predicate {
            Some(proto::predicate::Predicate::Compound(c)) => {
                assert_eq!(c.operands.len(), 2)
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_nearest_neighbors_query() {
        let q = NearestNeighbors::new("s", "e", "feature", vec![1.0f32, 0.0], "id")
            .limit(1)
            .into_query()
            .into_proto()
            .unwrap();

        assert_eq!(q.limit, 1);
        let elements = q.projection.unwrap().elements;
        assert_eq!(elements.len(), 2);
        assert!(elements[0].alias.is_none());
        assert_eq!(elements[1].alias.as_ref().unwrap().name, DISTANCE_COLUMN);
        match elements[1].expression.as_ref().unwrap().exp.as_ref() {
            Some(Exp::Function(f)) => {
                assert_eq!(f.name.as_ref().unwrap().name, DEFAULT_DISTANCE);
                assert_eq!(f.arguments.len(), 2);
            }
            other => panic!("unexpected expression {:?}", other),
        }

        let order = q.order.unwrap().components;
        assert_eq!(order.len(), 1);
        assert_eq!(order[0].column.as_ref().unwrap().name, DISTANCE_COLUMN);
        assert_eq!(order[0].direction, Direction::Ascending as i32);
    }

    #[test]
    fn test_nearest_neighbors_without_limit() {
        let q = NearestNeighbors::new("s", "e", "feature", vec![1.0f64], "id")
            .distance("euclidean")
            .into_query()
            .into_proto()
            .unwrap();
        assert_eq!(q.limit, 0);
    }

    #[test]
    fn test_sample_source() {
        let q = Query::sample("s", "e", 0.5, 7).count().into_proto().unwrap();
        assert_eq!(q.projection.unwrap().op, ProjectionOperation::Count as i32);
        match q.from.unwrap().source {
            Some(proto::source::Source::Sample(sample)) => {
                assert_eq!(sample.seed, 7);
                assert_eq!(sample.probability, 0.5);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = Query::scan("s", "e").limit(0).into_proto().unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(ref m) if m.contains("limit")));

        let err = NearestNeighbors::new("s", "e", "feature", vec![1.0f32], "id")
            .limit(0)
            .into_query()
            .into_proto()
            .unwrap_err();
        assert!(err.is_local());

        let q = Query::scan("s", "e").skip(0).into_proto().unwrap();
        assert_eq!(q.skip, 0);
    }

    #[test]
    fn test_oversized_counts_rejected() {
        let err = Query::scan("s", "e").limit(u64::MAX).into_proto().unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(ref m) if m.starts_with("limit")));

        let err = Query::scan("s", "e").skip(1 << 63).into_proto().unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(ref m) if m.starts_with("skip")));

        let q = Query::scan("s", "e")
            .limit(i64::MAX as u64)
            .skip(i64::MAX as u64)
            .into_proto()
            .unwrap();
        assert_eq!(q.limit, i64::MAX);
        assert_eq!(q.skip, i64::MAX);
    }
}
