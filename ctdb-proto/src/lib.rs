//! Cottontail DB gRPC protocol bindings
//!
//! Generated from `proto/cottontail.proto`. Each of the four service groups
//! (`DDL`, `DML`, `TXN`, `DQL`) gets a client stub and a server trait.

tonic::include_proto!("org.vitrivr.cottontail.grpc");

/// Port a Cottontail DB server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 1865;

pub use ddl_client::DdlClient;
pub use dml_client::DmlClient;
pub use dql_client::DqlClient;
pub use txn_client::TxnClient;

pub use ddl_server::{Ddl, DdlServer};
pub use dml_server::{Dml, DmlServer};
pub use dql_server::{Dql, DqlServer};
pub use txn_server::{Txn, TxnServer};
