/// Insert and batch insert request builders
use crate::convert::value_to_literal;
use crate::error::{ClientError, Result};
use crate::names::{column_name, scan};
use crate::response::{flatten, Record};
use crate::value::Value;
use ctdb_proto::{self as proto, DmlClient};
use tonic::transport::Channel;

/// Single-row insert builder; columns keep the order they were added in
pub struct Insert {
    schema: String,
    entity: String,
    elements: Vec<(String, Value)>,
}

impl Insert {
    pub fn new(schema: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            entity: entity.into(),
            elements: Vec::new(),
        }
    }

    /// Set a column value
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.elements.push((column.into(), value.into()));
        self
    }

    pub fn values<I, K>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.elements
            .extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn into_message(self, tx_id: Option<proto::TransactionId>) -> proto::InsertMessage {
        proto::InsertMessage {
            tx_id,
            from: Some(scan(&self.schema, &self.entity)),
            elements: self
                .elements
                .iter()
                .map(|(column, value)| proto::insert_message::InsertElement {
                    column: Some(column_name(column)),
                    value: Some(value_to_literal(value)),
                })
                .collect(),
        }
    }

    /// Execute the insert
    pub async fn execute(
        self,
        client: &mut DmlClient<Channel>,
        tx_id: Option<proto::TransactionId>,
    ) -> Result<Vec<Record>> {
        let response = client.insert(self.into_message(tx_id)).await?.into_inner();
        Ok(flatten(response))
    }
}

/// Batch insert builder: one shared column list, many value rows, one request
///
/// # Example
/// ```
/// use ctdb_client::{BatchInsert, Value};
///
/// let batch = BatchInsert::new("schema_test", "entity_test")
///     .columns(["id", "value"])
///     .row(vec![Value::from("test_0"), Value::Int(0)])
///     .row(vec![Value::from("test_1"), Value::Int(1)]);
/// assert_eq!(batch.len(), 2);
/// ```
pub struct BatchInsert {
    schema: String,
    entity: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl BatchInsert {
    pub fn new(schema: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            entity: entity.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a row; values are matched to columns by position
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build the request, rejecting rows whose width differs from the column list
    pub fn into_message(
        self,
        tx_id: Option<proto::TransactionId>,
    ) -> Result<proto::BatchInsertMessage> {
        if self.columns.is_empty() {
            return Err(ClientError::InvalidArgument(
                "batch insert needs at least one column".to_string(),
            ));
        }
        if let Some((index, row)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.columns.len())
        {
            return Err(ClientError::InvalidArgument(format!(
                "row {} has {} values, expected {}",
                index,
                row.len(),
                self.columns.len()
            )));
        }

        Ok(proto::BatchInsertMessage {
            tx_id,
            from: Some(scan(&self.schema, &self.entity)),
            columns: self.columns.iter().map(|c| column_name(c)).collect(),
            inserts: self
                .rows
                .iter()
                .map(|row| proto::batch_insert_message::Insert {
                    values: row.iter().map(value_to_literal).collect(),
                })
                .collect(),
        })
    }

    /// Execute the batch insert
    pub async fn execute(
        self,
        client: &mut DmlClient<Channel>,
        tx_id: Option<proto::TransactionId>,
    ) -> Result<Vec<Record>> {
        let message = self.into_message(tx_id)?;
        let response = client.insert_batch(message).await?.into_inner();
        Ok(flatten(response))
    }
}
