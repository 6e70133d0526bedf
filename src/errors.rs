use rusqlite::ErrorCode;
use thiserror::Error;

/// Error type for entgraph operations.
///
/// The enum is `Clone` because a terminal policy decision is cached in the
/// [`Context`](crate::Context) and replayed verbatim on re-entry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EntGraphError {
    #[error("{label} not found")]
    NotFound { label: String },
    #[error("{label} not singular")]
    NotSingular { label: String },
    #[error("constraint failed: {message}")]
    Constraint {
        message: String,
        wrapped: Option<String>,
    },
    #[error("validation failed for field {field:?}: {message}")]
    Validation { field: String, message: String },
    #[error("privacy: deny rule: {reason}")]
    PolicyDenied { reason: String },
    #[error("operation canceled: {reason}")]
    Canceled { reason: String },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("driver error: {0}")]
    Driver(String),
    #[error("fault injected: {0}")]
    FaultInjected(String),
}

impl EntGraphError {
    pub fn not_found<T: Into<String>>(label: T) -> Self {
        EntGraphError::NotFound {
            label: label.into(),
        }
    }

    pub fn not_singular<T: Into<String>>(label: T) -> Self {
        EntGraphError::NotSingular {
            label: label.into(),
        }
    }

    pub fn constraint<T: Into<String>>(message: T) -> Self {
        EntGraphError::Constraint {
            message: message.into(),
            wrapped: None,
        }
    }

    pub fn validation<F: Into<String>, T: Into<String>>(field: F, message: T) -> Self {
        EntGraphError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn denied<T: Into<String>>(reason: T) -> Self {
        EntGraphError::PolicyDenied {
            reason: reason.into(),
        }
    }

    pub fn canceled<T: Into<String>>(reason: T) -> Self {
        EntGraphError::Canceled {
            reason: reason.into(),
        }
    }

    pub fn connection<T: Into<String>>(msg: T) -> Self {
        EntGraphError::Connection(msg.into())
    }

    pub fn driver<T: Into<String>>(msg: T) -> Self {
        EntGraphError::Driver(msg.into())
    }

    pub fn fault_injection<T: Into<String>>(msg: T) -> Self {
        EntGraphError::FaultInjected(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EntGraphError::NotFound { .. })
    }

    pub fn is_not_singular(&self) -> bool {
        matches!(self, EntGraphError::NotSingular { .. })
    }

    pub fn is_constraint(&self) -> bool {
        matches!(self, EntGraphError::Constraint { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EntGraphError::Validation { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, EntGraphError::PolicyDenied { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, EntGraphError::Canceled { .. })
    }

    /// Prefix the error message with the position of the node it belongs to
    /// inside a batch, keeping the variant intact.
    pub(crate) fn in_batch(self, index: usize) -> Self {
        match self {
            EntGraphError::Constraint { message, wrapped } => EntGraphError::Constraint {
                message: format!("batch node {index}: {message}"),
                wrapped,
            },
            EntGraphError::Validation { field, message } => EntGraphError::Validation {
                field,
                message: format!("batch node {index}: {message}"),
            },
            EntGraphError::Driver(msg) => EntGraphError::Driver(format!("batch node {index}: {msg}")),
            other => other,
        }
    }

    /// Attach a statement-level description to a driver or constraint error.
    pub(crate) fn context<T: AsRef<str>>(self, what: T) -> Self {
        match self {
            EntGraphError::Constraint { message, wrapped } => EntGraphError::Constraint {
                message: format!("{}: {message}", what.as_ref()),
                wrapped,
            },
            EntGraphError::Driver(msg) => EntGraphError::Driver(format!("{}: {msg}", what.as_ref())),
            other => other,
        }
    }
}

impl From<rusqlite::Error> for EntGraphError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => EntGraphError::Constraint {
                message: err.to_string(),
                wrapped: Some(format!("{err:?}")),
            },
            Some(ErrorCode::OperationInterrupted) => EntGraphError::canceled(err.to_string()),
            _ => EntGraphError::Driver(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for EntGraphError {
    fn from(err: serde_json::Error) -> Self {
        EntGraphError::Driver(format!("json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_codes_are_classified() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t(id INTEGER PRIMARY KEY, name TEXT UNIQUE)")
            .unwrap();
        conn.execute("INSERT INTO t(name) VALUES('a')", []).unwrap();
        let err: EntGraphError = conn
            .execute("INSERT INTO t(name) VALUES('a')", [])
            .unwrap_err()
            .into();
        assert!(err.is_constraint(), "unexpected {err:?}");

        let err: EntGraphError = conn.execute("SELECT nope FROM t", []).unwrap_err().into();
        assert!(matches!(err, EntGraphError::Driver(_)));
    }

    #[test]
    fn batch_prefix_keeps_variant() {
        let err = EntGraphError::constraint("fk taken").in_batch(3);
        assert!(err.is_constraint());
        assert_eq!(err.to_string(), "constraint failed: batch node 3: fk taken");
    }
}
