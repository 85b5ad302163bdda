use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Schema Error - {0}")]
    Schema(String),

    #[error("Encoding Error - {0}")]
    Encoding(String),

    #[error("Transient Storage Error - {0}")]
    TransientStorage(String),

    #[error("Permanent Storage Error - {0}")]
    PermanentStorage(String),

    #[error("Ack Ordering Violation - {0}")]
    AckOrdering(String),

    #[error("Source Error - {0}")]
    Source(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Actor task is terminated - {0}")]
    ActorTaskTerminated(String),
}

impl Error {
    /// Whether the operation that produced this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientStorage(_))
    }
}
