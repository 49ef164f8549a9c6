//! Error types for the mapping layer.

use thiserror::Error;

/// Result type for mapping and execution operations.
pub type Result<T> = std::result::Result<T, OrmError>;

/// Errors surfaced by the classifier, the value codecs and the executor.
#[derive(Debug, Error)]
pub enum OrmError {
    /// No mapping rule exists for the type.
    #[error("unsupported type: {type_name}")]
    UnsupportedType { type_name: String },

    /// A value's tag disagrees with the field it is assigned to.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The engine reported a failure status.
    #[error("sqlite error {code}: {message}")]
    Sqlite { code: i32, message: String },

    /// Text could not be parsed into a structured value.
    #[error("cannot parse {input:?} as {target}: {reason}")]
    Format {
        target: &'static str,
        input: String,
        reason: String,
    },

    /// The pluggable blob serializer failed.
    #[error("blob serializer failed for {type_name}: {source}")]
    Serialization {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Opening or configuring the connection failed.
    #[error("failed to open database: {0}")]
    Open(#[from] rusqlite::Error),
}

impl OrmError {
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    pub fn mismatch(expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch { expected, found }
    }

    pub fn sqlite(code: i32, message: impl Into<String>) -> Self {
        Self::Sqlite {
            code,
            message: message.into(),
        }
    }

    pub fn format(target: &'static str, input: impl Into<String>, reason: impl ToString) -> Self {
        Self::Format {
            target,
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn serialization(type_name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Serialization {
            type_name: type_name.into(),
            source,
        }
    }

    /// Returns true if no mapping rule matched.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedType { .. })
    }

    /// Engine status code, if this error came from the engine.
    pub fn sqlite_code(&self) -> Option<i32> {
        match self {
            Self::Sqlite { code, .. } => Some(*code),
            _ => None,
        }
    }
}
