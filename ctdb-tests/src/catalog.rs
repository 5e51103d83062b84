/// In-memory catalog backing the test service
///
/// Transactions are snapshots: `begin` clones the committed catalog, requests
/// carrying the transaction id work on that clone, `commit` installs it and
/// `rollback` discards it. Requests without an id act on the committed
/// catalog directly.
use ctdb_proto::{self as proto, literal::Data};
use std::collections::{BTreeMap, HashMap};
use tonic::Status;

/// Name of the root every fully qualified name starts with
pub const ROOT: &str = "warren";

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<proto::ColumnDefinition>,
    pub indexes: Vec<proto::IndexDefinition>,
    pub rows: Vec<Vec<proto::Literal>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Reorder (column, value) pairs into a full row; absent columns become null
    pub fn row_from_pairs(
        &self,
        pairs: impl IntoIterator<Item = (String, proto::Literal)>,
    ) -> Result<Vec<proto::Literal>, Status> {
        let mut row = vec![null(); self.columns.len()];
        for (column, value) in pairs {
            let index = self
                .column_index(&column)
                .ok_or_else(|| Status::invalid_argument(format!("unknown column '{}'", column)))?;
            row[index] = value;
        }

        for (definition, value) in self.columns.iter().zip(row.iter()) {
            if !definition.nullable && is_null(value) {
                return Err(Status::invalid_argument(format!(
                    "column '{}' is not nullable",
                    definition.name
                )));
            }
        }
        Ok(row)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    schemas: BTreeMap<String, BTreeMap<String, Table>>,
}

impl Catalog {
    pub fn list_schemas(&self) -> Vec<String> {
        self.schemas
            .keys()
            .map(|s| format!("{}.{}", ROOT, s))
            .collect()
    }

    pub fn create_schema(&mut self, schema: &str, may_exist: bool) -> Result<(), Status> {
        if self.schemas.contains_key(schema) {
            if may_exist {
                return Ok(());
            }
            return Err(Status::already_exists(format!(
                "schema '{}.{}' already exists",
                ROOT, schema
            )));
        }
        self.schemas.insert(schema.to_string(), BTreeMap::new());
        Ok(())
    }

    pub fn drop_schema(&mut self, schema: &str) -> Result<(), Status> {
        self.schemas
            .remove(schema)
            .map(|_| ())
            .ok_or_else(|| Status::not_found(format!("schema '{}.{}' does not exist", ROOT, schema)))
    }

    pub fn list_entities(&self, schema: &str) -> Result<Vec<String>, Status> {
        let entities = self.schema(schema)?;
        Ok(entities
            .keys()
            .map(|e| format!("{}.{}.{}", ROOT, schema, e))
            .collect())
    }

    pub fn create_entity(
        &mut self,
        definition: proto::EntityDefinition,
        may_exist: bool,
    ) -> Result<(), Status> {
        let (schema, entity) = entity_parts(definition.entity.as_ref())?;
        if definition.columns.is_empty() {
            return Err(Status::invalid_argument("an entity needs at least one column"));
        }

        let entities = self.schema_mut(&schema)?;
        if entities.contains_key(&entity) {
            if may_exist {
                return Ok(());
            }
            return Err(Status::already_exists(format!(
                "entity '{}.{}.{}' already exists",
                ROOT, schema, entity
            )));
        }

        entities.insert(
            entity,
            Table {
                columns: definition.columns,
                ..Table::default()
            },
        );
        Ok(())
    }

    pub fn drop_entity(&mut self, name: Option<&proto::EntityName>) -> Result<(), Status> {
        let (schema, entity) = entity_parts(name)?;
        self.schema_mut(&schema)?
            .remove(&entity)
            .map(|_| ())
            .ok_or_else(|| Status::not_found(format!("entity '{}.{}' does not exist", schema, entity)))
    }

    pub fn table(&self, name: Option<&proto::EntityName>) -> Result<&Table, Status> {
        let (schema, entity) = entity_parts(name)?;
        self.schema(&schema)?
            .get(&entity)
            .ok_or_else(|| Status::not_found(format!("entity '{}.{}' does not exist", schema, entity)))
    }

    pub fn table_mut(&mut self, name: Option<&proto::EntityName>) -> Result<&mut Table, Status> {
        let (schema, entity) = entity_parts(name)?;
        self.schema_mut(&schema)?
            .get_mut(&entity)
            .ok_or_else(|| Status::not_found(format!("entity '{}.{}' does not exist", schema, entity)))
    }

    pub fn create_index(&mut self, definition: proto::IndexDefinition) -> Result<(), Status> {
        let name = definition
            .name
            .clone()
            .ok_or_else(|| Status::invalid_argument("index name required"))?;
        let table = self.table_mut(name.entity.as_ref())?;

        for column in &definition.columns {
            if table.column_index(&column.name).is_none() {
                return Err(Status::invalid_argument(format!(
                    "unknown column '{}'",
                    column.name
                )));
            }
        }
        if table
            .indexes
            .iter()
            .any(|i| i.name.as_ref().map(|n| &n.name) == Some(&name.name))
        {
            return Err(Status::already_exists(format!("index '{}' already exists", name.name)));
        }

        table.indexes.push(definition);
        Ok(())
    }

    pub fn drop_index(&mut self, name: Option<&proto::IndexName>) -> Result<(), Status> {
        let name = name.ok_or_else(|| Status::invalid_argument("index name required"))?;
        let table = self.table_mut(name.entity.as_ref())?;
        let before = table.indexes.len();
        table
            .indexes
            .retain(|i| i.name.as_ref().map(|n| &n.name) != Some(&name.name));
        if table.indexes.len() == before {
            return Err(Status::not_found(format!("index '{}' does not exist", name.name)));
        }
        Ok(())
    }

    pub fn has_index(&self, name: Option<&proto::IndexName>) -> Result<(), Status> {
        let name = name.ok_or_else(|| Status::invalid_argument("index name required"))?;
        let table = self.table(name.entity.as_ref())?;
        if table
            .indexes
            .iter()
            .any(|i| i.name.as_ref().map(|n| &n.name) == Some(&name.name))
        {
            Ok(())
        } else {
            Err(Status::not_found(format!("index '{}' does not exist", name.name)))
        }
    }

    fn schema(&self, schema: &str) -> Result<&BTreeMap<String, Table>, Status> {
        self.schemas
            .get(schema)
            .ok_or_else(|| Status::not_found(format!("schema '{}.{}' does not exist", ROOT, schema)))
    }

    fn schema_mut(&mut self, schema: &str) -> Result<&mut BTreeMap<String, Table>, Status> {
        self.schemas
            .get_mut(schema)
            .ok_or_else(|| Status::not_found(format!("schema '{}.{}' does not exist", ROOT, schema)))
    }
}

/// Committed catalog plus the snapshots of open transactions
#[derive(Debug, Default)]
pub struct State {
    committed: Catalog,
    open: HashMap<i64, Catalog>,
    next_tx: i64,
}

impl State {
    /// Catalog a request operates on
    pub fn catalog(&mut self, tx_id: Option<&proto::TransactionId>) -> Result<&mut Catalog, Status> {
        match tx_id {
            None => Ok(&mut self.committed),
            Some(tx) => self.open.get_mut(&tx.value).ok_or_else(|| {
                Status::failed_precondition(format!("transaction {} is not running", tx.value))
            }),
        }
    }

    pub fn begin(&mut self) -> i64 {
        self.next_tx += 1;
        self.open.insert(self.next_tx, self.committed.clone());
        self.next_tx
    }

    pub fn commit(&mut self, tx_id: i64) -> Result<(), Status> {
        let snapshot = self.finish(tx_id)?;
        self.committed = snapshot;
        Ok(())
    }

    pub fn rollback(&mut self, tx_id: i64) -> Result<(), Status> {
        self.finish(tx_id).map(|_| ())
    }

    pub fn open_transactions(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.open.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn finish(&mut self, tx_id: i64) -> Result<Catalog, Status> {
        self.open
            .remove(&tx_id)
            .ok_or_else(|| Status::failed_precondition(format!("transaction {} is not running", tx_id)))
    }
}

fn entity_parts(name: Option<&proto::EntityName>) -> Result<(String, String), Status> {
    let name = name.ok_or_else(|| Status::invalid_argument("entity name required"))?;
    let schema = name
        .schema
        .as_ref()
        .ok_or_else(|| Status::invalid_argument("schema name required"))?;
    Ok((schema.name.clone(), name.name.clone()))
}

pub fn null() -> proto::Literal {
    proto::Literal {
        data: Some(Data::NullData(proto::Null {})),
    }
}

pub fn is_null(literal: &proto::Literal) -> bool {
    matches!(literal.data, None | Some(Data::NullData(_)))
}
