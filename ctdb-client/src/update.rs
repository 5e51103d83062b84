/// Update and delete request builders
use crate::error::Result;
use crate::expr::{Expr, Predicate};
use crate::names::{column_name, scan};
use crate::response::{flatten, Record};
use ctdb_proto::{self as proto, DmlClient};
use tonic::transport::Channel;

/// Update builder: `SET column = expression ... WHERE predicate`
///
/// # Example
/// ```
/// use ctdb_client::expr::{col, lit};
/// use ctdb_client::Update;
///
/// let update = Update::new("schema_test", "entity_test", col("id").eq(lit("test_0")))
///     .set("value", lit(42));
/// ```
pub struct Update {
    schema: String,
    entity: String,
    predicate: Predicate,
    updates: Vec<(String, Expr)>,
}

impl Update {
    pub fn new(schema: impl Into<String>, entity: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            schema: schema.into(),
            entity: entity.into(),
            predicate,
            updates: Vec::new(),
        }
    }

    /// Assign an expression to a column of every matching row
    pub fn set(mut self, column: impl Into<String>, value: Expr) -> Self {
        self.updates.push((column.into(), value));
        self
    }

    pub fn into_message(self, tx_id: Option<proto::TransactionId>) -> proto::UpdateMessage {
        proto::UpdateMessage {
            tx_id,
            from: Some(scan(&self.schema, &self.entity)),
            r#where: Some(self.predicate.into_proto()),
            updates: self
                .updates
                .into_iter()
                .map(|(column, value)| proto::update_message::UpdateElement {
                    column: Some(column_name(&column)),
                    value: Some(value.into_proto()),
                })
                .collect(),
        }
    }

    /// Execute the update
    pub async fn execute(
        self,
        client: &mut DmlClient<Channel>,
        tx_id: Option<proto::TransactionId>,
    ) -> Result<Vec<Record>> {
        let response = client.update(self.into_message(tx_id)).await?.into_inner();
        Ok(flatten(response))
    }
}

/// Delete builder: removes every row matching the predicate
pub struct Delete {
    schema: String,
    entity: String,
    predicate: Predicate,
}

impl Delete {
    pub fn new(schema: impl Into<String>, entity: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            schema: schema.into(),
            entity: entity.into(),
            predicate,
        }
    }

    pub fn into_message(self, tx_id: Option<proto::TransactionId>) -> proto::DeleteMessage {
        proto::DeleteMessage {
            tx_id,
            from: Some(scan(&self.schema, &self.entity)),
            r#where: Some(self.predicate.into_proto()),
        }
    }

    /// Execute the delete
    pub async fn execute(
        self,
        client: &mut DmlClient<Channel>,
        tx_id: Option<proto::TransactionId>,
    ) -> Result<Vec<Record>> {
        let response = client.delete(self.into_message(tx_id)).await?.into_inner();
        Ok(flatten(response))
    }
}
