/// Cottontail DB session wrapper
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::insert::{BatchInsert, Insert};
use crate::names::{entity_name, index_name, schema_name, simple_name};
use crate::query::{NearestNeighbors, Query};
use crate::response::{collect, first_column_strings, flatten, Record};
use crate::schema::{entity_definition, parse_entity_details, ColumnDef, EntityDetails, IndexDef};
use crate::update::{Delete, Update};
use crate::value::Value;
use crate::expr::Predicate;
use ctdb_proto::{self as proto, DdlClient, DmlClient, DqlClient, TxnClient};
use futures::future::BoxFuture;
use tonic::transport::Channel;
use tracing::{debug, warn};

/// A session with one Cottontail DB server.
///
/// Holds one stub per service group over a shared channel, plus the id of
/// the transaction opened by this session, if any. Every request carries that
/// id. Calls are strictly sequential: each method waits for its complete
/// (possibly streamed) response before returning.
pub struct Client {
    pub(crate) ddl: DdlClient<Channel>,
    pub(crate) dml: DmlClient<Channel>,
    pub(crate) txn: TxnClient<Channel>,
    pub(crate) dql: DqlClient<Channel>,
    pub(crate) tx: Option<proto::TransactionId>,
}

impl Client {
    /// Connect to a Cottontail DB server
    ///
    /// # Example
    /// ```no_run
    /// # use ctdb_client::{Client, ClientConfig};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut client = Client::connect(ClientConfig::new("localhost", 1865)).await?;
    /// client.ping().await?;
    /// client.close().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        let channel = Channel::from_shared(endpoint.clone())
            .map_err(|e| ClientError::ConnectionError(format!("Invalid address: {}", e)))?
            .connect()
            .await
            .map_err(|e| ClientError::ConnectionError(format!("Failed to connect: {}", e)))?;
        debug!(%endpoint, "connected");

        let mut client = Self::from_channel(channel);
        if config.with_transaction {
            client.start_transaction().await?;
        }
        Ok(client)
    }

    /// Build a session over an existing channel
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            ddl: DdlClient::new(channel.clone()),
            dml: DmlClient::new(channel.clone()),
            txn: TxnClient::new(channel.clone()),
            dql: DqlClient::new(channel),
            tx: None,
        }
    }

    /// Run `f` inside a session that is closed afterwards, whether `f`
    /// succeeded or not. Closing commits a transaction left open by `f`.
    ///
    /// When both `f` and the close fail, `f`'s error is returned and the close
    /// error is logged at `warn`.
    ///
    /// # Example
    /// ```no_run
    /// # use ctdb_client::{Client, ClientConfig};
    /// # async fn example() -> ctdb_client::Result<()> {
    /// let schemas = Client::with_session(ClientConfig::default(), |client| {
    ///     Box::pin(async move { client.list_schemas().await })
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_session<T, F>(config: ClientConfig, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut Client) -> BoxFuture<'c, Result<T>>,
    {
        let mut client = Client::connect(config).await?;
        let outcome = f(&mut client).await;
        let closed = client.close().await;

        match (outcome, closed) {
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "closing session failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Commit an open transaction and release the connection
    pub async fn close(mut self) -> Result<()> {
        if let Some(tx_id) = self.tx.take() {
            debug!(tx = tx_id.value, "committing on close");
            self.txn.commit(tx_id).await?;
        }
        Ok(())
    }

    /// Transaction id attached to outgoing requests
    pub(crate) fn tx_id(&self) -> Option<proto::TransactionId> {
        self.tx.clone()
    }

    /// Returns normally if the server answers
    pub async fn ping(&mut self) -> Result<()> {
        debug!("ping");
        self.dql.ping(()).await?;
        Ok(())
    }

    // ========================================================================
    // Data definition
    // ========================================================================

    /// Create a schema.
    ///
    /// With `exist_ok`, the schema list is checked first and nothing is sent
    /// if the schema is already there; the create message also carries
    /// `mayExist`. The check is best effort, not atomic.
    pub async fn create_schema(&mut self, schema: &str, exist_ok: bool) -> Result<Vec<Record>> {
        if exist_ok && self.has_schema(schema).await? {
            debug!(schema, "schema exists, create skipped");
            return Ok(Vec::new());
        }

        let message = proto::CreateSchemaMessage {
            tx_id: self.tx_id(),
            schema: Some(schema_name(schema)),
            may_exist: exist_ok,
        };
        debug!(schema, "create schema");
        let response = self.ddl.create_schema(message).await?.into_inner();
        Ok(flatten(response))
    }

    /// Drop a schema; with `not_exist_ok` a missing schema is not an error
    pub async fn drop_schema(&mut self, schema: &str, not_exist_ok: bool) -> Result<Vec<Record>> {
        if not_exist_ok && !self.has_schema(schema).await? {
            debug!(schema, "schema missing, drop skipped");
            return Ok(Vec::new());
        }

        let message = proto::DropSchemaMessage {
            tx_id: self.tx_id(),
            schema: Some(schema_name(schema)),
        };
        debug!(schema, "drop schema");
        let response = self.ddl.drop_schema(message).await?.into_inner();
        Ok(flatten(response))
    }

    /// Fully qualified names of all schemas
    pub async fn list_schemas(&mut self) -> Result<Vec<String>> {
        let message = proto::ListSchemaMessage {
            tx_id: self.tx_id(),
        };
        debug!("list schemas");
        let stream = self.ddl.list_schemas(message).await?.into_inner();
        Ok(first_column_strings(&collect(stream).await?))
    }

    async fn has_schema(&mut self, schema: &str) -> Result<bool> {
        Ok(self
            .list_schemas()
            .await?
            .iter()
            .any(|s| simple_name(s) == schema))
    }

    /// Create an entity. `exist_ok` behaves as in [`Client::create_schema`].
    pub async fn create_entity(
        &mut self,
        schema: &str,
        entity: &str,
        columns: Vec<ColumnDef>,
        exist_ok: bool,
    ) -> Result<Vec<Record>> {
        if exist_ok && self.has_entity(schema, entity).await? {
            debug!(schema, entity, "entity exists, create skipped");
            return Ok(Vec::new());
        }

        let message = proto::CreateEntityMessage {
            tx_id: self.tx_id(),
            definition: Some(entity_definition(schema, entity, columns)),
            may_exist: exist_ok,
        };
        debug!(schema, entity, "create entity");
        let response = self.ddl.create_entity(message).await?.into_inner();
        Ok(flatten(response))
    }

    /// Drop an entity; with `not_exist_ok` a missing entity is not an error
    pub async fn drop_entity(
        &mut self,
        schema: &str,
        entity: &str,
        not_exist_ok: bool,
    ) -> Result<Vec<Record>> {
        if not_exist_ok && !self.has_entity(schema, entity).await? {
            debug!(schema, entity, "entity missing, drop skipped");
            return Ok(Vec::new());
        }

        let message = proto::DropEntityMessage {
            tx_id: self.tx_id(),
            entity: Some(entity_name(schema, entity)),
        };
        debug!(schema, entity, "drop entity");
        let response = self.ddl.drop_entity(message).await?.into_inner();
        Ok(flatten(response))
    }

    /// Remove every row of an entity, keeping its definition
    pub async fn truncate_entity(&mut self, schema: &str, entity: &str) -> Result<Vec<Record>> {
        let message = proto::TruncateEntityMessage {
            tx_id: self.tx_id(),
            entity: Some(entity_name(schema, entity)),
        };
        debug!(schema, entity, "truncate entity");
        let response = self.ddl.truncate_entity(message).await?.into_inner();
        Ok(flatten(response))
    }

    /// Ask the server to refresh statistics for an entity
    pub async fn analyze_entity(&mut self, schema: &str, entity: &str) -> Result<Vec<Record>> {
        let message = proto::AnalyzeEntityMessage {
            tx_id: self.tx_id(),
            entity: Some(entity_name(schema, entity)),
        };
        debug!(schema, entity, "analyze entity");
        let response = self.ddl.analyze_entity(message).await?.into_inner();
        Ok(flatten(response))
    }

    /// Fully qualified names of the entities in a schema
    pub async fn list_entities(&mut self, schema: &str) -> Result<Vec<String>> {
        let message = proto::ListEntityMessage {
            tx_id: self.tx_id(),
            schema: Some(schema_name(schema)),
        };
        debug!(schema, "list entities");
        let stream = self.ddl.list_entities(message).await?.into_inner();
        Ok(first_column_strings(&collect(stream).await?))
    }

    async fn has_entity(&mut self, schema: &str, entity: &str) -> Result<bool> {
        Ok(self
            .list_entities(schema)
            .await?
            .iter()
            .any(|e| simple_name(e) == entity))
    }

    /// Row count, columns and indexes of an entity
    pub async fn entity_details(&mut self, schema: &str, entity: &str) -> Result<EntityDetails> {
        let message = proto::EntityDetailsMessage {
            tx_id: self.tx_id(),
            entity: Some(entity_name(schema, entity)),
        };
        debug!(schema, entity, "entity details");
        let response = self.ddl.entity_details(message).await?.into_inner();
        parse_entity_details(&flatten(response))
    }

    pub async fn create_index(
        &mut self,
        schema: &str,
        entity: &str,
        index: IndexDef,
    ) -> Result<Vec<Record>> {
        let message = index.into_message(self.tx_id(), schema, entity);
        debug!(schema, entity, "create index");
        let response = self.ddl.create_index(message).await?.into_inner();
        Ok(flatten(response))
    }

    pub async fn drop_index(&mut self, schema: &str, entity: &str, index: &str) -> Result<Vec<Record>> {
        let message = proto::DropIndexMessage {
            tx_id: self.tx_id(),
            index: Some(index_name(schema, entity, index)),
        };
        debug!(schema, entity, index, "drop index");
        let response = self.ddl.drop_index(message).await?.into_inner();
        Ok(flatten(response))
    }

    pub async fn rebuild_index(
        &mut self,
        schema: &str,
        entity: &str,
        index: &str,
    ) -> Result<Vec<Record>> {
        let message = proto::RebuildIndexMessage {
            tx_id: self.tx_id(),
            index: Some(index_name(schema, entity, index)),
        };
        debug!(schema, entity, index, "rebuild index");
        let response = self.ddl.rebuild_index(message).await?.into_inner();
        Ok(flatten(response))
    }

    // ========================================================================
    // Data manipulation
    // ========================================================================

    /// Insert one row given as (column, value) pairs
    ///
    /// # Example
    /// ```no_run
    /// # use ctdb_client::{Client, ClientConfig, Value};
    /// # async fn example() -> ctdb_client::Result<()> {
    /// let mut client = Client::connect(ClientConfig::default()).await?;
    /// client
    ///     .insert("schema_test", "entity_test", [
    ///         ("id", Value::from("test_0")),
    ///         ("value", Value::Int(0)),
    ///     ])
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn insert<I, K>(&mut self, schema: &str, entity: &str, values: I) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let tx_id = self.tx_id();
        debug!(schema, entity, "insert");
        Insert::new(schema, entity)
            .values(values)
            .execute(&mut self.dml, tx_id)
            .await
    }

    /// Insert many rows in a single request
    pub async fn insert_batch(&mut self, batch: BatchInsert) -> Result<Vec<Record>> {
        let tx_id = self.tx_id();
        debug!(rows = batch.len(), "insert batch");
        batch.execute(&mut self.dml, tx_id).await
    }

    /// Assign expressions to columns of every row matching `predicate`
    pub async fn update<I, K>(
        &mut self,
        schema: &str,
        entity: &str,
        predicate: Predicate,
        updates: I,
    ) -> Result<Vec<Record>>
    where
        I: IntoIterator<Item = (K, crate::expr::Expr)>,
        K: Into<String>,
    {
        let tx_id = self.tx_id();
        debug!(schema, entity, "update");
        updates
            .into_iter()
            .fold(Update::new(schema, entity, predicate), |update, (column, value)| {
                update.set(column, value)
            })
            .execute(&mut self.dml, tx_id)
            .await
    }

    /// Delete every row matching `predicate`
    pub async fn delete(
        &mut self,
        schema: &str,
        entity: &str,
        predicate: Predicate,
    ) -> Result<Vec<Record>> {
        let tx_id = self.tx_id();
        debug!(schema, entity, "delete");
        Delete::new(schema, entity, predicate)
            .execute(&mut self.dml, tx_id)
            .await
    }

    // ========================================================================
    // Data query
    // ========================================================================

    /// Run a query and return every row of every response message in arrival order
    pub async fn query(&mut self, query: Query) -> Result<Vec<Record>> {
        let tx_id = self.tx_id();
        debug!("query");
        query.execute(&mut self.dql, tx_id).await
    }

    /// Execution plan the server would use for a query
    pub async fn explain(&mut self, query: Query) -> Result<Vec<Record>> {
        let message = query.into_message(self.tx_id())?;
        debug!("explain");
        let stream = self.dql.explain(message).await?.into_inner();
        collect(stream).await
    }

    /// First rows of an entity, all columns. `limit` must be at least 1.
    pub async fn sample(
        &mut self,
        schema: &str,
        entity: &str,
        limit: u64,
        skip: u64,
    ) -> Result<Vec<Record>> {
        let query = Query::scan(schema, entity)
            .select_all()
            .limit(limit)
            .skip(skip);
        self.query(query).await
    }

    /// Number of rows in an entity
    pub async fn count(&mut self, schema: &str, entity: &str) -> Result<i64> {
        let records = self.query(Query::scan(schema, entity).count()).await?;
        records
            .first()
            .and_then(|record| record.iter().next())
            .and_then(|(_, value)| value.as_i64())
            .ok_or_else(|| ClientError::InvalidResponse("count returned no number".to_string()))
    }

    /// Nearest neighbors of a query vector, closest first
    pub async fn nearest_neighbors(&mut self, search: NearestNeighbors) -> Result<Vec<Record>> {
        self.query(search.into_query()).await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(tx_id) = &self.tx {
            warn!(
                tx = tx_id.value,
                "client dropped with an open transaction; call close() to commit it"
            );
        }
    }
}
