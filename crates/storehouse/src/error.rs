//! Error types for the storehouse cache tiers

use std::fmt;

#[derive(Debug)]
pub enum StorehouseError {
    /// No entry for the key, or the entry has expired
    NotFound,
    Encode(String),
    Decode(String),
    Io(Box<std::io::Error>),
    Config(String),
}

impl StorehouseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorehouseError::NotFound)
    }
}

impl fmt::Display for StorehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorehouseError::NotFound => write!(f, "Entry not found"),
            StorehouseError::Encode(msg) => write!(f, "Encode error: {}", msg),
            StorehouseError::Decode(msg) => write!(f, "Decode error: {}", msg),
            StorehouseError::Io(err) => write!(f, "IO error: {}", err),
            StorehouseError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for StorehouseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorehouseError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorehouseError {
    fn from(err: std::io::Error) -> Self {
        StorehouseError::Io(Box::new(err))
    }
}

impl From<tokio::task::JoinError> for StorehouseError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorehouseError::Io(Box::new(std::io::Error::other(err)))
    }
}

pub type Result<T> = std::result::Result<T, StorehouseError>;
