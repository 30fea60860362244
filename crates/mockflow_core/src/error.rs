//! Core error types for mockflow.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A workload or engine was configured with out-of-range values
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What was wrong
        reason: String,
    },

    /// Calibration could not produce a usable iteration/time table
    #[error("Degenerate calibration: {reason}")]
    DegenerateCalibration {
        /// What was wrong
        reason: String,
    },

    /// The compiled precedence schedule contains a cycle
    #[error("Cyclic schedule involving: {}", nodes.join(", "))]
    CyclicSchedule {
        /// Names of the algorithms that could not be ordered
        nodes: Vec<String>,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation {
        /// Offending field or element
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Not found
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of entity
        kind: String,
        /// Identifier that was looked up
        id: String,
    },

    /// Already exists
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Kind of entity
        kind: String,
        /// Identifier that collided
        id: String,
    },

    /// Parse error
    #[error("Parse error: {message}")]
    ParseError {
        /// Parser message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {message}")]
    Io {
        /// Underlying error rendered as text
        message: String,
    },

    /// Internal error (for unexpected errors)
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidConfiguration`]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`CoreError::DegenerateCalibration`]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateCalibration {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}
