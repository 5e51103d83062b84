/// gRPC services of the in-memory Cottontail DB
use crate::catalog::{null, State, Table, ROOT};
use crate::eval::{self, apply_updates, column_names, filter_rows, RowRef};
use ctdb_proto::{
    self as proto, literal::Data, query_response_message::Tuple, source::Source, Ddl, Dml, Dql,
    Txn,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::debug;

/// Rows per streamed response message unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 2;

type ResponseStream =
    futures::stream::Iter<std::vec::IntoIter<Result<proto::QueryResponseMessage, Status>>>;

/// One request received by the service
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub rpc: &'static str,
    pub tx_id: Option<i64>,
}

/// In-memory implementation of all four service groups
#[derive(Clone)]
pub struct MockCottontail {
    state: Arc<Mutex<State>>,
    calls: Arc<Mutex<Vec<Call>>>,
    chunk_size: usize,
}

impl Default for MockCottontail {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCottontail {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Split streamed responses into messages of at most `chunk_size` rows
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            calls: Arc::new(Mutex::new(Vec::new())),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Every request received so far, in arrival order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Number of received requests to `rpc`
    pub fn count_calls(&self, rpc: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.rpc == rpc).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Ids of transactions begun and not yet finished
    pub fn open_transactions(&self) -> Vec<i64> {
        self.state.lock().open_transactions()
    }

    /// End a transaction from the server side, as an administrator would
    pub fn abort_transaction(&self, tx_id: i64) -> Result<(), Status> {
        self.state.lock().rollback(tx_id)
    }

    fn record(&self, rpc: &'static str, tx_id: Option<&proto::TransactionId>) {
        let tx_id = tx_id.map(|t| t.value);
        debug!(rpc, ?tx_id, "mock request");
        self.calls.lock().push(Call { rpc, tx_id });
    }

    fn stream(
        &self,
        tx_id: Option<proto::TransactionId>,
        columns: &[String],
        rows: Vec<Vec<proto::Literal>>,
    ) -> Response<ResponseStream> {
        let mut messages = Vec::new();
        let mut rows = rows.into_iter().peekable();
        loop {
            let chunk: Vec<_> = rows.by_ref().take(self.chunk_size).collect();
            messages.push(Ok(message(tx_id.clone(), columns, chunk)));
            if rows.peek().is_none() {
                break;
            }
        }
        Response::new(futures::stream::iter(messages))
    }
}

fn message(
    tx_id: Option<proto::TransactionId>,
    columns: &[String],
    rows: Vec<Vec<proto::Literal>>,
) -> proto::QueryResponseMessage {
    proto::QueryResponseMessage {
        tx_id,
        columns: columns
            .iter()
            .map(|c| proto::ColumnName {
                entity: None,
                name: c.clone(),
            })
            .collect(),
        tuples: rows.into_iter().map(|data| Tuple { data }).collect(),
    }
}

fn string(s: impl Into<String>) -> proto::Literal {
    proto::Literal {
        data: Some(Data::StringData(s.into())),
    }
}

fn long(v: i64) -> proto::Literal {
    proto::Literal {
        data: Some(Data::LongData(v)),
    }
}

fn strings(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// Single-row acknowledgement of a definition request
fn acknowledge(
    tx_id: Option<proto::TransactionId>,
    dbo: String,
    action: &str,
) -> Response<proto::QueryResponseMessage> {
    Response::new(message(
        tx_id,
        &strings(&["dbo", "action"]),
        vec![vec![string(dbo), string(action)]],
    ))
}

/// Single-row count of affected rows
fn affected(
    tx_id: Option<proto::TransactionId>,
    column: &str,
    count: usize,
) -> Response<proto::QueryResponseMessage> {
    Response::new(message(
        tx_id,
        &strings(&[column]),
        vec![vec![long(count as i64)]],
    ))
}

fn entity_fqn(name: Option<&proto::EntityName>) -> String {
    let name = name.cloned().unwrap_or_default();
    let schema = name.schema.map(|s| s.name).unwrap_or_default();
    format!("{}.{}.{}", ROOT, schema, name.name)
}

fn scan_entity(source: Option<&proto::Source>) -> Result<Option<&proto::EntityName>, Status> {
    match source.and_then(|s| s.source.as_ref()) {
        Some(Source::Scan(scan)) => Ok(scan.entity.as_ref()),
        Some(Source::Sample(_)) => Err(Status::invalid_argument("data manipulation needs a scan source")),
        None => Err(Status::invalid_argument("source required")),
    }
}

fn details(fqn: &str, table: &Table) -> Vec<Vec<proto::Literal>> {
    let mut rows = vec![vec![
        string(fqn),
        string("ENTITY"),
        null(),
        long(table.rows.len() as i64),
        null(),
        null(),
    ]];

    for column in &table.columns {
        rows.push(vec![
            string(format!("{}.{}", fqn, column.name)),
            string("COLUMN"),
            string(column.r#type().as_str_name()),
            null(),
            proto::Literal {
                data: Some(Data::IntData(column.length)),
            },
            proto::Literal {
                data: Some(Data::BooleanData(column.nullable)),
            },
        ]);
    }

    for index in &table.indexes {
        let name = index.name.as_ref().map(|n| n.name.as_str()).unwrap_or_default();
        rows.push(vec![
            string(format!("{}.{}", fqn, name)),
            string("INDEX"),
            string(index.r#type().as_str_name()),
            null(),
            null(),
            null(),
        ]);
    }

    rows
}

#[tonic::async_trait]
impl Ddl for MockCottontail {
    type ListSchemasStream = ResponseStream;
    type ListEntitiesStream = ResponseStream;

    async fn list_schemas(
        &self,
        request: Request<proto::ListSchemaMessage>,
    ) -> Result<Response<Self::ListSchemasStream>, Status> {
        let req = request.into_inner();
        self.record("ListSchemas", req.tx_id.as_ref());

        let schemas = self.state.lock().catalog(req.tx_id.as_ref())?.list_schemas();
        let rows = schemas.into_iter().map(|s| vec![string(s)]).collect();
        Ok(self.stream(req.tx_id, &strings(&["dbo"]), rows))
    }

    async fn create_schema(
        &self,
        request: Request<proto::CreateSchemaMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("CreateSchema", req.tx_id.as_ref());

        let schema = req
            .schema
            .ok_or_else(|| Status::invalid_argument("schema name required"))?
            .name;
        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .create_schema(&schema, req.may_exist)?;
        Ok(acknowledge(req.tx_id, format!("{}.{}", ROOT, schema), "CREATE"))
    }

    async fn drop_schema(
        &self,
        request: Request<proto::DropSchemaMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("DropSchema", req.tx_id.as_ref());

        let schema = req
            .schema
            .ok_or_else(|| Status::invalid_argument("schema name required"))?
            .name;
        self.state.lock().catalog(req.tx_id.as_ref())?.drop_schema(&schema)?;
        Ok(acknowledge(req.tx_id, format!("{}.{}", ROOT, schema), "DROP"))
    }

    async fn list_entities(
        &self,
        request: Request<proto::ListEntityMessage>,
    ) -> Result<Response<Self::ListEntitiesStream>, Status> {
        let req = request.into_inner();
        self.record("ListEntities", req.tx_id.as_ref());

        let schema = req
            .schema
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("schema name required"))?;
        let entities = self
            .state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .list_entities(&schema.name)?;
        let rows = entities.into_iter().map(|e| vec![string(e)]).collect();
        Ok(self.stream(req.tx_id, &strings(&["dbo"]), rows))
    }

    async fn entity_details(
        &self,
        request: Request<proto::EntityDetailsMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("EntityDetails", req.tx_id.as_ref());

        let mut state = self.state.lock();
        let table = state.catalog(req.tx_id.as_ref())?.table(req.entity.as_ref())?;
        let rows = details(&entity_fqn(req.entity.as_ref()), table);
        Ok(Response::new(message(
            req.tx_id.clone(),
            &strings(&["dbo", "class", "type", "rows", "l_size", "nullable"]),
            rows,
        )))
    }

    async fn create_entity(
        &self,
        request: Request<proto::CreateEntityMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("CreateEntity", req.tx_id.as_ref());

        let definition = req
            .definition
            .ok_or_else(|| Status::invalid_argument("entity definition required"))?;
        let fqn = entity_fqn(definition.entity.as_ref());
        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .create_entity(definition, req.may_exist)?;
        Ok(acknowledge(req.tx_id, fqn, "CREATE"))
    }

    async fn drop_entity(
        &self,
        request: Request<proto::DropEntityMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("DropEntity", req.tx_id.as_ref());

        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .drop_entity(req.entity.as_ref())?;
        Ok(acknowledge(req.tx_id, entity_fqn(req.entity.as_ref()), "DROP"))
    }

    async fn truncate_entity(
        &self,
        request: Request<proto::TruncateEntityMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("TruncateEntity", req.tx_id.as_ref());

        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .table_mut(req.entity.as_ref())?
            .rows
            .clear();
        Ok(acknowledge(req.tx_id, entity_fqn(req.entity.as_ref()), "TRUNCATE"))
    }

    async fn analyze_entity(
        &self,
        request: Request<proto::AnalyzeEntityMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("AnalyzeEntity", req.tx_id.as_ref());

        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .table(req.entity.as_ref())?;
        Ok(acknowledge(req.tx_id, entity_fqn(req.entity.as_ref()), "ANALYZE"))
    }

    async fn create_index(
        &self,
        request: Request<proto::CreateIndexMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("CreateIndex", req.tx_id.as_ref());

        let definition = req
            .definition
            .ok_or_else(|| Status::invalid_argument("index definition required"))?;
        let name = definition.name.clone().unwrap_or_default();
        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .create_index(definition)?;
        let fqn = format!("{}.{}", entity_fqn(name.entity.as_ref()), name.name);
        Ok(acknowledge(req.tx_id, fqn, "CREATE"))
    }

    async fn drop_index(
        &self,
        request: Request<proto::DropIndexMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("DropIndex", req.tx_id.as_ref());

        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .drop_index(req.index.as_ref())?;
        let name = req.index.unwrap_or_default();
        let fqn = format!("{}.{}", entity_fqn(name.entity.as_ref()), name.name);
        Ok(acknowledge(req.tx_id, fqn, "DROP"))
    }

    async fn rebuild_index(
        &self,
        request: Request<proto::RebuildIndexMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("RebuildIndex", req.tx_id.as_ref());

        self.state
            .lock()
            .catalog(req.tx_id.as_ref())?
            .has_index(req.index.as_ref())?;
        let name = req.index.unwrap_or_default();
        let fqn = format!("{}.{}", entity_fqn(name.entity.as_ref()), name.name);
        Ok(acknowledge(req.tx_id, fqn, "REBUILD"))
    }
}

#[tonic::async_trait]
impl Dml for MockCottontail {
    async fn insert(
        &self,
        request: Request<proto::InsertMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("Insert", req.tx_id.as_ref());

        let mut state = self.state.lock();
        let table = state
            .catalog(req.tx_id.as_ref())?
            .table_mut(scan_entity(req.from.as_ref())?)?;
        let pairs = req.elements.into_iter().map(|e| {
            (
                e.column.map(|c| c.name).unwrap_or_default(),
                e.value.unwrap_or_else(null),
            )
        });
        let row = table.row_from_pairs(pairs)?;
        table.rows.push(row);
        Ok(affected(req.tx_id.clone(), "inserted", 1))
    }

    async fn insert_batch(
        &self,
        request: Request<proto::BatchInsertMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("InsertBatch", req.tx_id.as_ref());

        let columns: Vec<String> = req.columns.into_iter().map(|c| c.name).collect();
        let mut state = self.state.lock();
        let table = state
            .catalog(req.tx_id.as_ref())?
            .table_mut(scan_entity(req.from.as_ref())?)?;

        // Validate every row before touching the table
        let mut rows = Vec::with_capacity(req.inserts.len());
        for insert in req.inserts {
            if insert.values.len() != columns.len() {
                return Err(Status::invalid_argument(format!(
                    "row has {} values for {} columns",
                    insert.values.len(),
                    columns.len()
                )));
            }
            rows.push(table.row_from_pairs(columns.iter().cloned().zip(insert.values))?);
        }

        let count = rows.len();
        table.rows.extend(rows);
        Ok(affected(req.tx_id.clone(), "inserted", count))
    }

    async fn update(
        &self,
        request: Request<proto::UpdateMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("Update", req.tx_id.as_ref());

        let mut state = self.state.lock();
        let table = state
            .catalog(req.tx_id.as_ref())?
            .table_mut(scan_entity(req.from.as_ref())?)?;
        let names = column_names(table);

        let mut updated = Vec::new();
        for row in &table.rows {
            let selected = match &req.r#where {
                Some(p) => eval::matches(p, &RowRef { names: &names, values: row })?,
                None => true,
            };
            let mut row = row.clone();
            if selected {
                apply_updates(&mut row, &names, &req.updates)?;
            }
            updated.push((selected, row));
        }

        let count = updated.iter().filter(|(selected, _)| *selected).count();
        table.rows = updated.into_iter().map(|(_, row)| row).collect();
        Ok(affected(req.tx_id.clone(), "updated", count))
    }

    async fn delete(
        &self,
        request: Request<proto::DeleteMessage>,
    ) -> Result<Response<proto::QueryResponseMessage>, Status> {
        let req = request.into_inner();
        self.record("Delete", req.tx_id.as_ref());

        let mut state = self.state.lock();
        let table = state
            .catalog(req.tx_id.as_ref())?
            .table_mut(scan_entity(req.from.as_ref())?)?;
        let names = column_names(table);

        let rows: Vec<&Vec<proto::Literal>> = table.rows.iter().collect();
        let selected = filter_rows(&names, &rows, req.r#where.as_ref())?;
        let count = selected.len();

        let mut index = 0;
        table.rows.retain(|_| {
            let keep = selected.binary_search(&index).is_err();
            index += 1;
            keep
        });
        Ok(affected(req.tx_id.clone(), "deleted", count))
    }
}

#[tonic::async_trait]
impl Txn for MockCottontail {
    type ListTransactionsStream = ResponseStream;
    type ListLocksStream = ResponseStream;

    async fn begin(&self, _request: Request<()>) -> Result<Response<proto::TransactionId>, Status> {
        let value = self.state.lock().begin();
        self.record("Begin", None);
        Ok(Response::new(proto::TransactionId { value }))
    }

    async fn commit(&self, request: Request<proto::TransactionId>) -> Result<Response<()>, Status> {
        let tx = request.into_inner();
        self.record("Commit", Some(&tx));
        self.state.lock().commit(tx.value)?;
        Ok(Response::new(()))
    }

    async fn rollback(&self, request: Request<proto::TransactionId>) -> Result<Response<()>, Status> {
        let tx = request.into_inner();
        self.record("Rollback", Some(&tx));
        self.state.lock().rollback(tx.value)?;
        Ok(Response::new(()))
    }

    async fn kill(&self, request: Request<proto::TransactionId>) -> Result<Response<()>, Status> {
        let tx = request.into_inner();
        self.record("Kill", Some(&tx));
        self.state.lock().rollback(tx.value)?;
        Ok(Response::new(()))
    }

    async fn list_transactions(
        &self,
        _request: Request<()>,
    ) -> Result<Response<Self::ListTransactionsStream>, Status> {
        self.record("ListTransactions", None);
        let rows = self
            .open_transactions()
            .into_iter()
            .map(|id| vec![long(id), string("USER"), string("RUNNING")])
            .collect();
        Ok(self.stream(None, &strings(&["txId", "type", "state"]), rows))
    }

    async fn list_locks(
        &self,
        _request: Request<()>,
    ) -> Result<Response<Self::ListLocksStream>, Status> {
        self.record("ListLocks", None);
        Ok(self.stream(None, &strings(&["dbo", "mode", "owners"]), Vec::new()))
    }
}

#[tonic::async_trait]
impl Dql for MockCottontail {
    type QueryStream = ResponseStream;
    type ExplainStream = ResponseStream;

    async fn query(
        &self,
        request: Request<proto::QueryMessage>,
    ) -> Result<Response<Self::QueryStream>, Status> {
        let req = request.into_inner();
        self.record("Query", req.tx_id.as_ref());

        let query = req
            .query
            .ok_or_else(|| Status::invalid_argument("query required"))?;
        let result = {
            let mut state = self.state.lock();
            eval::execute(state.catalog(req.tx_id.as_ref())?, &query)?
        };
        Ok(self.stream(req.tx_id, &result.columns, result.rows))
    }

    async fn explain(
        &self,
        request: Request<proto::QueryMessage>,
    ) -> Result<Response<Self::ExplainStream>, Status> {
        let req = request.into_inner();
        self.record("Explain", req.tx_id.as_ref());

        let query = req
            .query
            .ok_or_else(|| Status::invalid_argument("query required"))?;
        let (operator, rows) = {
            let mut state = self.state.lock();
            let catalog = state.catalog(req.tx_id.as_ref())?;
            let (_, rows) = eval::source_rows(catalog, query.from.as_ref())?;
            let operator = match query.from.as_ref().and_then(|f| f.source.as_ref()) {
                Some(Source::Sample(_)) => "EntitySample",
                _ => "EntityScan",
            };
            (operator, rows.len())
        };

        let plan = vec![vec![
            string(operator),
            proto::Literal {
                data: Some(Data::DoubleData(rows as f64)),
            },
        ]];
        Ok(self.stream(req.tx_id, &strings(&["designation", "cost"]), plan))
    }

    async fn ping(&self, _request: Request<()>) -> Result<Response<()>, Status> {
        self.record("Ping", None);
        Ok(Response::new(()))
    }
}
