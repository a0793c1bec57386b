//! Error types for the synchronization engine.

use thiserror::Error;

/// Main error type for synchronization operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing secret, missing key, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Environment marker does not match the role this connection is used for.
    #[error(
        "Environment mismatch on {role} database: expected '{expected}', found '{found}'. \
         Refusing to continue (check that source and target connection strings are not swapped)"
    )]
    EnvironmentMismatch {
        role: String,
        expected: String,
        found: String,
    },

    /// Reading rows from the source failed for a specific table
    #[error("Extraction failed for table {table}: {message}")]
    Extraction { table: String, message: String },

    /// Writing rows into the sink failed for a specific table
    #[error("Load failed for table {table} ({rows} rows rolled back): {message}")]
    Load {
        table: String,
        rows: u64,
        message: String,
    },

    /// A configured column does not exist in the extracted data
    #[error("Schema mismatch for table {table}: column '{column}' not found")]
    SchemaMismatch { table: String, column: String },

    /// Another run currently holds the lease for this table
    #[error("Table {0} is being synchronized by another run")]
    TableBusy(String),

    /// Writing an audit record failed (logged, never propagated out of a run)
    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    /// Backup could not be decrypted (wrong key, corrupted or truncated file)
    #[error("Backup decryption failed: {0}")]
    Decryption(String),

    /// Database query error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

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

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Extraction error
    pub fn extraction(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Extraction {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Load error
    pub fn load(table: impl Into<String>, rows: u64, message: impl ToString) -> Self {
        SyncError::Load {
            table: table.into(),
            rows,
            message: message.to_string(),
        }
    }

    /// Whether repeating the failed operation could succeed.
    ///
    /// A wrong credential, a swapped database or an undecryptable backup
    /// stays wrong no matter how often it is retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SyncError::Config(_)
                | SyncError::EnvironmentMismatch { .. }
                | SyncError::Decryption(_)
                | SyncError::Yaml(_)
        )
    }

    /// Rows that were part of the failed load, if the failure happened while loading.
    pub fn failed_rows(&self) -> u64 {
        match self {
            SyncError::Load { rows, .. } => *rows,
            _ => 0,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => 2,
            SyncError::EnvironmentMismatch { .. } => 3,
            SyncError::Decryption(_) => 4,
            SyncError::Database(_) | SyncError::Pool { .. } => 5,
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

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
