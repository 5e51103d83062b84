/// Flattening of tabular query responses into records
use crate::convert::literal_to_value;
use crate::error::Result;
use crate::value::Value;
use ctdb_proto as proto;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tonic::Streaming;

/// One response row: column name -> decoded value, in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.fields.push((column.into(), value));
    }

    /// First value stored under `column`
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Zip every tuple of a response against its column names.
///
/// A tuple shorter than the column list yields a shorter record; surplus
/// values beyond the last column are dropped.
pub fn flatten(response: proto::QueryResponseMessage) -> Vec<Record> {
    let names: Vec<String> = response.columns.into_iter().map(|c| c.name).collect();

    response
        .tuples
        .into_iter()
        .map(|tuple| {
            names
                .iter()
                .cloned()
                .zip(tuple.data.into_iter().map(literal_to_value))
                .collect()
        })
        .collect()
}

/// Drain a response stream, concatenating rows in arrival order
pub async fn collect(mut stream: Streaming<proto::QueryResponseMessage>) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    while let Some(message) = stream.message().await? {
        records.extend(flatten(message));
    }
    Ok(records)
}

/// First column of every row as a string, the shape of list responses
pub fn first_column_strings(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|record| record.iter().next())
        .filter_map(|(_, value)| value.as_str().map(str::to_string))
        .collect()
}
