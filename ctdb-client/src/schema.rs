/// Entity and index definitions, and entity detail parsing
use crate::error::{ClientError, Result};
use crate::names::{entity_name, index_name, qualified_column_name};
use crate::response::Record;
use crate::value::Value;
use ctdb_proto::{self as proto, Engine, IndexType, Type};
use serde::Serialize;
use std::collections::HashMap;

/// Column definition builder
///
/// # Example
/// ```
/// use ctdb_client::{ColumnDef, Type};
///
/// let columns = vec![
///     ColumnDef::new("id", Type::String).primary(true),
///     ColumnDef::new("feature", Type::FloatVec).length(128),
/// ];
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    name: String,
    column_type: Type,
    length: Option<i32>,
    primary: Option<bool>,
    nullable: Option<bool>,
    engine: Engine,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: Type) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            primary: None,
            nullable: None,
            engine: Engine::Mapdb,
        }
    }

    /// Element count for vector types
    pub fn length(mut self, length: i32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_proto(self) -> proto::ColumnDefinition {
        proto::ColumnDefinition {
            name: self.name,
            r#type: self.column_type as i32,
            length: self.length.unwrap_or_default(),
            primary: self.primary.unwrap_or_default(),
            nullable: self.nullable.unwrap_or_default(),
            engine: self.engine as i32,
        }
    }
}

/// Index definition builder
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    name: String,
    index_type: IndexType,
    columns: Vec<String>,
    params: HashMap<String, String>,
    rebuild: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            name: name.into(),
            index_type,
            columns: Vec::new(),
            params: HashMap::new(),
            rebuild: false,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Index-type specific parameter passed through to the server
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Build the index right away instead of leaving it dirty
    pub fn rebuild(mut self, rebuild: bool) -> Self {
        self.rebuild = rebuild;
        self
    }

    pub(crate) fn into_message(
        self,
        tx_id: Option<proto::TransactionId>,
        schema: &str,
        entity: &str,
    ) -> proto::CreateIndexMessage {
        proto::CreateIndexMessage {
            tx_id,
            definition: Some(proto::IndexDefinition {
                name: Some(index_name(schema, entity, &self.name)),
                r#type: self.index_type as i32,
                columns: self
                    .columns
                    .iter()
                    .map(|c| qualified_column_name(schema, entity, c))
                    .collect(),
                params: self.params,
            }),
            rebuild: self.rebuild,
        }
    }
}

pub(crate) fn entity_definition(
    schema: &str,
    entity: &str,
    columns: Vec<ColumnDef>,
) -> proto::EntityDefinition {
    proto::EntityDefinition {
        entity: Some(entity_name(schema, entity)),
        columns: columns.into_iter().map(ColumnDef::into_proto).collect(),
    }
}

// ============================================================================
// Entity details
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: String,
    pub size: i64,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub index_type: String,
}

/// Summary of an entity as reported by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDetails {
    pub name: String,
    pub rows: i64,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
}

fn required<'a>(record: &'a Record, column: &str) -> Result<&'a Value> {
    record
        .get(column)
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing column '{}'", column)))
}

fn string_field(record: &Record, column: &str) -> Result<String> {
    match required(record, column)? {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => Err(ClientError::InvalidResponse(format!(
            "column '{}' is not a string: {}",
            column, other
        ))),
    }
}

fn int_field(record: &Record, column: &str) -> Result<i64> {
    match required(record, column)? {
        Value::Null => Ok(0),
        other => other.as_i64().ok_or_else(|| {
            ClientError::InvalidResponse(format!("column '{}' is not an integer: {}", column, other))
        }),
    }
}

/// Parse the rows of an entity details response.
///
/// The first row describes the entity itself (`dbo`, `rows`); the remaining
/// rows are told apart by their `class` column (`COLUMN` or `INDEX`).
pub fn parse_entity_details(records: &[Record]) -> Result<EntityDetails> {
    let entity = records
        .first()
        .ok_or_else(|| ClientError::InvalidResponse("empty entity details".to_string()))?;

    let mut details = EntityDetails {
        name: string_field(entity, "dbo")?,
        rows: int_field(entity, "rows")?,
        columns: Vec::new(),
        indexes: Vec::new(),
    };

    for record in records {
        match string_field(record, "class")?.as_str() {
            "COLUMN" => details.columns.push(ColumnInfo {
                name: string_field(record, "dbo")?,
                column_type: string_field(record, "type")?,
                size: int_field(record, "l_size")?,
                nullable: required(record, "nullable")?.as_bool().unwrap_or(false),
            }),
            "INDEX" => details.indexes.push(IndexInfo {
                name: string_field(record, "dbo")?,
                index_type: string_field(record, "type")?,
            }),
            _ => {}
        }
    }

    Ok(details)
}
