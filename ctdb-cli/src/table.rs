/// Rendering of query results as comfy-table tables or JSON

use crate::OutputFormat;
use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use ctdb_client::{EntityDetails, Record};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Format records as a table
///
/// Columns appear in the order the server sent them. Rows are taken to share
/// the first row's columns; a missing value is shown as "-".
pub fn format_records_table(records: &[Record]) -> String {
    let first = match records.first() {
        Some(first) => first,
        None => return "No rows".to_string(),
    };

    let columns: Vec<&str> = first.columns().collect();
    let mut table = new_table();
    table.set_header(columns.iter().map(Cell::new).collect::<Vec<_>>());

    for record in records {
        let row = columns
            .iter()
            .map(|column| match record.get(column) {
                Some(value) => Cell::new(value.to_string()),
                None => Cell::new("-"),
            })
            .collect::<Vec<_>>();
        table.add_row(row);
    }

    table.to_string()
}

pub fn format_records(records: &[Record], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_records_table(records)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
    }
}

/// Format a list of names under a single header
pub fn format_names(header: &str, names: &[String], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(names)?),
        OutputFormat::Table if names.is_empty() => Ok("No rows".to_string()),
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec![Cell::new(header)]);
            for name in names {
                table.add_row(vec![Cell::new(name)]);
            }
            Ok(table.to_string())
        }
    }
}

pub fn format_details(details: &EntityDetails, format: OutputFormat) -> Result<String> {
    if let OutputFormat::Json = format {
        return Ok(serde_json::to_string_pretty(details)?);
    }

    let mut columns = new_table();
    columns.set_header(vec!["column", "type", "size", "nullable"]);
    for column in &details.columns {
        columns.add_row(vec![
            Cell::new(&column.name),
            Cell::new(&column.column_type),
            Cell::new(column.size),
            Cell::new(column.nullable),
        ]);
    }

    let mut out = format!("Entity: {}\nRows: {}\n{}", details.name, details.rows, columns);
    if !details.indexes.is_empty() {
        let mut indexes = new_table();
        indexes.set_header(vec!["index", "type"]);
        for index in &details.indexes {
            indexes.add_row(vec![Cell::new(&index.name), Cell::new(&index.index_type)]);
        }
        out.push('\n');
        out.push_str(&indexes.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctdb_client::{ColumnInfo, Value};

    fn record(id: &str, value: i32) -> Record {
        vec![("id", Value::from(id)), ("value", Value::Int(value))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_format_empty_records() {
        assert_eq!(format_records_table(&[]), "No rows");
    }

    #[test]
    fn test_format_keeps_column_order() {
        let output = format_records_table(&[record("test_0", 0), record("test_1", 1)]);
        println!("{}", output);

        let id = output.find("id").unwrap();
        let value = output.find("value").unwrap();
        assert!(id < value);
        assert!(output.contains("test_1"));
    }

    #[test]
    fn test_format_missing_value() {
        let sparse: Record = vec![("id", Value::from("test_2"))].into_iter().collect();
        let output = format_records_table(&[record("test_0", 0), sparse]);
        assert!(output.contains('-'));
    }

    #[test]
    fn test_format_json() {
        let output = format_records(&[record("test_0", 7)], OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["id"], "test_0");
        assert_eq!(parsed[0]["value"], 7);
    }

    #[test]
    fn test_format_names() {
        let names = vec!["warren.a".to_string(), "warren.b".to_string()];
        let table = format_names("schema", &names, OutputFormat::Table).unwrap();
        assert!(table.contains("warren.b"));
        assert_eq!(format_names("schema", &[], OutputFormat::Table).unwrap(), "No rows");
    }

    #[test]
    fn test_format_details() {
        let details = EntityDetails {
            name: "warren.s.e".to_string(),
            rows: 2,
            columns: vec![ColumnInfo {
                name: "warren.s.e.id".to_string(),
                column_type: "STRING".to_string(),
                size: -1,
                nullable: false,
            }],
            indexes: Vec::new(),
        };
        let output = format_details(&details, OutputFormat::Table).unwrap();
        assert!(output.starts_with("Entity: warren.s.e\nRows: 2"));
        assert!(output.contains("STRING"));
    }
}
