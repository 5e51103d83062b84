/// Test utilities for the Cottontail DB client
///
/// Provides an in-memory Cottontail DB that speaks the real gRPC protocol on
/// a loopback port, so client and shell tests run without a server install.

pub mod catalog;
pub mod eval;
pub mod service;

pub use service::{Call, MockCottontail, DEFAULT_CHUNK_SIZE};

use ctdb_proto::{DdlServer, DmlServer, DqlServer, TxnServer};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Schema used by fixtures
pub const TEST_SCHEMA: &str = "schema_test";

/// Entity used by fixtures
pub const TEST_ENTITY: &str = "entity_test";

/// In-memory server bound to an ephemeral loopback port, stopped on drop
pub struct TestServer {
    addr: SocketAddr,
    service: MockCottontail,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with default settings
    pub async fn start() -> Self {
        Self::start_with(MockCottontail::new()).await
    }

    /// Start a server backed by the given service state
    pub async fn start_with(service: MockCottontail) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");

        let router = Server::builder()
            .add_service(DdlServer::new(service.clone()))
            .add_service(DmlServer::new(service.clone()))
            .add_service(TxnServer::new(service.clone()))
            .add_service(DqlServer::new(service.clone()));

        let handle = tokio::spawn(async move {
            if let Err(e) = router
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
            {
                tracing::error!("test server stopped: {}", e);
            }
        });

        Self {
            addr,
            service,
            handle,
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Shared state of the running service, for inspecting received calls
    pub fn service(&self) -> &MockCottontail {
        &self.service
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
