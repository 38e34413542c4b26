//! Error types for the storehouse sweeper

use std::fmt;

#[derive(Debug)]
pub enum SweepError {
    Store(storehouse::StorehouseError),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepError::Store(err) => write!(f, "Store error: {}", err),
            SweepError::Io(err) => write!(f, "IO error: {}", err),
            SweepError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SweepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SweepError::Store(err) => Some(err),
            SweepError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<storehouse::StorehouseError> for SweepError {
    fn from(err: storehouse::StorehouseError) -> Self {
        SweepError::Store(err)
    }
}

impl From<std::io::Error> for SweepError {
    fn from(err: std::io::Error) -> Self {
        SweepError::Io(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for SweepError {
    fn from(err: tokio::task::JoinError) -> Self {
        SweepError::Io(Box::new(std::io::Error::other(err)))
    }
}

impl From<tracing_subscriber::filter::ParseError> for SweepError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        SweepError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;
