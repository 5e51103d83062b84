/// Errors raised by a Cottontail DB session
///
/// Failures reported by the server keep their gRPC status code; everything
/// else is detected on the client before or after a request.
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a non-OK status
    #[error("{}: {}", .code.description(), .message)]
    Remote { code: Code, message: String },

    /// The channel could not be established by `Client::connect`
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Rejected locally, no request was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transaction already running: {0}")]
    TransactionAlreadyRunning(i64),

    #[error("No transaction running")]
    NoTransaction,

    /// The server answered, but not in the shape this client expects
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Status code of a server-side failure
    pub fn code(&self) -> Option<Code> {
        match self {
            ClientError::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(Code::NotFound)
    }

    pub fn is_already_exists(&self) -> bool {
        self.code() == Some(Code::AlreadyExists)
    }

    /// True for errors raised before any request reached the server.
    ///
    /// A transport failure in the middle of a call arrives as a `Remote`
    /// error with code `Unavailable` and is not local.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ClientError::TransactionAlreadyRunning(_)
                | ClientError::NoTransaction
                | ClientError::ConnectionError(_)
                | ClientError::InvalidArgument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        ClientError::Remote {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}
