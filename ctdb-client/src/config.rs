/// Connection settings for a Cottontail DB session
use ctdb_proto::DEFAULT_PORT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or IP address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Begin a transaction as soon as the session is connected
    pub with_transaction: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            with_transaction: false,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            with_transaction: false,
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_transaction(mut self, enabled: bool) -> Self {
        self.with_transaction = enabled;
        self
    }

    /// Plaintext HTTP/2 endpoint URI for the channel
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
