/// Cottontail DB gRPC Client Library
///
/// This crate provides a Rust client for Cottontail DB: a session wrapper over
/// the DDL, DML, TXN and DQL services, request builders, and decoding of
/// streamed tabular responses into ordered records.

pub mod error;
pub mod config;
pub mod client;
pub mod transaction;
pub mod names;
pub mod value;
pub mod convert;
pub mod response;
pub mod expr;
pub mod schema;
pub mod insert;
pub mod update;
pub mod query;

// Re-export key types
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use expr::{Expr, Predicate};
pub use insert::{BatchInsert, Insert};
pub use query::{Direction, NearestNeighbors, Query};
pub use response::Record;
pub use schema::{ColumnDef, ColumnInfo, EntityDetails, IndexDef, IndexInfo};
pub use update::{Delete, Update};
pub use value::Value;
pub use ctdb_proto::{Engine, IndexType, Type, DEFAULT_PORT};
