// dataload-core/src/error.rs

use std::sync::Arc;
use thiserror::Error;

/// Errors raised while configuring or driving a reader.
///
/// The type is `Clone` so that a reader which entered the failed state can
/// hand the same error back on every subsequent pull.
#[derive(Error, Debug, Clone)]
pub enum ReaderError {

    #[error("Storage error at '{store}': {message}")]
    Storage {
        store: String,
        message: String,
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    #[error("Corrupt record in '{store}' at byte {offset}: {message}")]
    CorruptRecord {
        store: String,
        offset: u64,
        message: String,
    },

    #[error("Record in '{store}' at byte {offset} is larger than {limit} bytes")]
    RecordTooLarge {
        store: String,
        offset: u64,
        limit: usize,
    },

    #[error("Field '{field}' of instance #{instance} in '{store}' is longer than {limit} characters")]
    FieldTooLarge {
        store: String,
        instance: u64,
        field: String,
        limit: usize,
    },

    #[error("Invalid instance #{instance} in '{store}': {message}")]
    InvalidInstance {
        store: String,
        instance: u64,
        message: String,
    },

    #[error("Schema error: {message}")]
    Schema {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Not supported: {message}")]
    NotSupported {
        message: String,
    },

    #[error("Reader error: {message}")]
    Reader {
        message: String,
    },

    #[error("The reader has been closed and can no longer be used")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ReaderError>;

// Convenience constructors
impl ReaderError {

    pub fn storage(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            store: store.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        store: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            store: store.into(),
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn corrupt_record(store: impl Into<String>, offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            store: store.into(),
            offset,
            message: message.into(),
        }
    }

    pub fn invalid_instance(
        store: impl Into<String>,
        instance: u64,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidInstance {
            store: store.into(),
            instance,
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }

    pub fn reader(message: impl Into<String>) -> Self {
        Self::Reader {
            message: message.into(),
        }
    }

    /// Returns true for errors local to a single record, which the batch
    /// assembler resolves through the bad batch policy.
    pub fn is_instance_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInstance { .. } | Self::FieldTooLarge { .. } | Self::RecordTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_errors_are_policy_gated() {
        assert!(ReaderError::invalid_instance("a.csv", 3, "bad").is_instance_error());
        assert!(ReaderError::FieldTooLarge {
            store: "a.csv".into(),
            instance: 0,
            field: "x".into(),
            limit: 4,
        }
        .is_instance_error());
        assert!(ReaderError::RecordTooLarge {
            store: "a.txt".into(),
            offset: 12,
            limit: 80,
        }
        .is_instance_error());

        assert!(!ReaderError::schema("dup").is_instance_error());
        assert!(!ReaderError::corrupt_record("a.rec", 0, "magic").is_instance_error());
        assert!(!ReaderError::Closed.is_instance_error());
    }

    #[test]
    fn test_clone_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ReaderError::storage_with_source("data.csv", "failed to open file", io);
        let copy = err.clone();

        assert_eq!(err.to_string(), copy.to_string());
        assert!(std::error::Error::source(&copy).is_some());
    }

    #[test]
    fn test_display() {
        let err = ReaderError::invalid_instance("train.csv", 7, "too few columns");
        assert_eq!(
            err.to_string(),
            "Invalid instance #7 in 'train.csv': too few columns"
        );
    }
}
