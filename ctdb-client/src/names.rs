/// Name construction for schemas, entities, columns and indexes
use crate::error::{ClientError, Result};
use ctdb_proto as proto;

pub fn schema_name(schema: &str) -> proto::SchemaName {
    proto::SchemaName {
        name: schema.to_string(),
    }
}

pub fn entity_name(schema: &str, entity: &str) -> proto::EntityName {
    proto::EntityName {
        schema: Some(schema_name(schema)),
        name: entity.to_string(),
    }
}

/// Unqualified column name, resolved by the server against the query source
pub fn column_name(column: &str) -> proto::ColumnName {
    proto::ColumnName {
        entity: None,
        name: column.to_string(),
    }
}

pub fn qualified_column_name(schema: &str, entity: &str, column: &str) -> proto::ColumnName {
    proto::ColumnName {
        entity: Some(entity_name(schema, entity)),
        name: column.to_string(),
    }
}

pub fn index_name(schema: &str, entity: &str, index: &str) -> proto::IndexName {
    proto::IndexName {
        entity: Some(entity_name(schema, entity)),
        name: index.to_string(),
    }
}

/// Full scan over one entity, the default source of every request
pub fn scan(schema: &str, entity: &str) -> proto::Source {
    proto::Source {
        source: Some(proto::source::Source::Scan(proto::Scan {
            entity: Some(entity_name(schema, entity)),
        })),
    }
}

/// Last segment of a dotted name (`warren.schema_test` -> `schema_test`)
pub fn simple_name(fqn: &str) -> &str {
    fqn.rsplit('.').next().unwrap_or(fqn)
}

/// Split `schema.entity` (optionally prefixed with the root, `warren.schema.entity`)
pub fn split_entity(fqn: &str) -> Result<(&str, &str)> {
    let mut parts = fqn.rsplitn(3, '.');
    match (parts.next(), parts.next()) {
        (Some(entity), Some(schema)) if !entity.is_empty() && !schema.is_empty() => {
            Ok((schema, entity))
        }
        _ => Err(ClientError::InvalidArgument(format!(
            "expected <schema>.<entity>, got '{}'",
            fqn
        ))),
    }
}
