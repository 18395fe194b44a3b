use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by containers, tables and the evaluation layer.
///
/// Arguments are validated before any state changes, so an `Err` from a
/// mutating call leaves the receiver as it was. The one exception is
/// [`CTable::append`](crate::CTable::append), which rolls columns back
/// itself before returning.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("column '{0}' already exists")]
    DuplicateName(String),

    #[error("compression error: {message}")]
    Compression {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("expression error: {0}")]
    Expression(String),

    #[error("variable name '{0}' not found")]
    UnknownVariable(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn compression(message: impl Into<String>) -> Self {
        Error::Compression {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a codec failure, keeping its cause chain.
    pub(crate) fn codec(context: impl Into<String>, err: anyhow::Error) -> Self {
        Error::Compression {
            message: format!("{}: {:#}", context.into(), err),
            source: Some(err.into()),
        }
    }

    /// Stable short code, handy for log fields and test assertions.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::LengthMismatch { .. } => "LENGTH_MISMATCH",
            Error::TypeMismatch(_) => "TYPE_MISMATCH",
            Error::DuplicateName(_) => "DUPLICATE_NAME",
            Error::Compression { .. } => "COMPRESSION_ERROR",
            Error::Expression(_) => "EXPRESSION_ERROR",
            Error::UnknownVariable(_) => "UNKNOWN_VARIABLE",
        }
    }
}
