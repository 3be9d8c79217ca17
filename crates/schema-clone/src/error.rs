//! Error types for the clone library.

use std::fmt;

use thiserror::Error;

/// Orchestration phase an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Target schema reconciliation.
    Schema,
    /// Dropping tables at the target.
    Drop,
    /// Creating and populating tables at the target.
    Copy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Schema => "schema",
            Phase::Drop => "drop",
            Phase::Copy => "copy",
        };
        f.write_str(s)
    }
}

/// Main error type for clone and backup operations.
#[derive(Error, Debug)]
pub enum CloneError {
    /// Invalid configuration (schema pairing rules, malformed identifiers, bad YAML values).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A strict topological sort hit a back-edge.
    #[error("Foreign key cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// A target schema is absent and may not be created.
    #[error("Target schema '{0}' does not exist and create_missing_schemas is disabled")]
    SchemaMissing(String),

    /// A drop was refused because other tables still reference the table.
    #[error("Cannot drop {table}: still referenced by {}", .referenced_by.join(", "))]
    ReferentialConflict {
        table: String,
        referenced_by: Vec<String>,
    },

    /// Opaque failure surfaced by the backend connection or statement execution.
    #[error("Backend error: {0}")]
    Backend(String),

    /// SQL Server driver error.
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// PostgreSQL driver error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error with context.
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Failure while processing a single table in a given phase.
    #[error("{phase} phase failed for table {table}")]
    Step {
        phase: Phase,
        table: String,
        #[source]
        source: Box<CloneError>,
    },

    /// The pass was cancelled between steps.
    #[error("Clone cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloneError {
    /// Create an InvalidConfiguration error.
    pub fn config(message: impl Into<String>) -> Self {
        CloneError::InvalidConfiguration(message.into())
    }

    /// Create an opaque backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        CloneError::Backend(message.into())
    }

    /// Create a Pool error with context about where it occurred.
    pub fn pool(message: impl fmt::Display, context: impl Into<String>) -> Self {
        CloneError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Attach phase and table context to an error.
    pub fn step(phase: Phase, table: impl fmt::Display, source: CloneError) -> Self {
        CloneError::Step {
            phase,
            table: table.to_string(),
            source: Box::new(source),
        }
    }

    /// Innermost error, skipping `Step` wrappers.
    pub fn root_cause(&self) -> &CloneError {
        match self {
            CloneError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self.root_cause() {
            CloneError::InvalidConfiguration(_)
            | CloneError::Yaml(_)
            | CloneError::Json(_)
            | CloneError::Io(_) => 2,
            CloneError::CycleDetected { .. } => 3,
            CloneError::SchemaMissing(_) => 4,
            CloneError::ReferentialConflict { .. } => 5,
            CloneError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for clone operations.
pub type Result<T> = std::result::Result<T, CloneError>;
