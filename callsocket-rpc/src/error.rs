/// Result type for callsocket-rpc.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for callsocket-rpc.
///
/// These are local failures of the rpc machinery. A call reports them to its
/// caller as an `INTERNAL` [`crate::Status`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport failed.
    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),
    /// The connection is closed, and no further calls can be made on it.
    #[error("Connection is closed")]
    ConnectionIsClosed,
    /// A method can only be registered once.
    #[error("method {0} is already registered")]
    DuplicateMethod(String),
    /// A payload carried a different message type than the one requested.
    #[error("expected message {expected}, received {actual}")]
    UnexpectedSchema {
        /// The requested message type.
        expected: String,
        /// The message type on the wire.
        actual: String,
    },
    /// A payload could not be decoded.
    #[error("could not decode message: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The peer broke the call protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}
