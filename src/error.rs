/// The error type of the judge worker.
///
/// Ordinary grading failures (compile error, wrong answer, timeout) are not
/// errors; they are expressed in the [`Status`][crate::data::Status] of a
/// judge result. This type covers infrastructure faults only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input/output error touching the scratch directory or a
    /// subprocess.
    #[error("input/output error: {0}")]
    Io(#[from] std::io::Error),
    /// An error talking to the queue broker.
    #[error("queue broker error: {0}")]
    Broker(#[from] redis::RedisError),
    /// An error encoding or decoding a wire message.
    #[error("wire format error: {0}")]
    Wire(#[from] serde_json::Error),
    /// An invalid log level name on the command line or in the
    /// environment.
    #[error("invalid log level {0}")]
    BadLogLevel(String),
}

/// Alias for a [Result][std::result::Result] with the error type [Error].
pub type Result<T> = std::result::Result<T, Error>;
