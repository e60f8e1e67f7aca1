// Error handling framework

use thiserror::Error;

/// Errors produced when validating or applying scheduler configuration
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid hour {0}: must be between 0 and 23")]
    InvalidHour(i32),

    #[error("Invalid minute {0}: must be between 0 and 59")]
    InvalidMinute(i32),

    #[error("Invalid lead days {0}: must be zero or positive")]
    InvalidLeadDays(i32),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Errors from the WhatsApp gateway client
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("WhatsApp gateway is not connected; scan the QR code at {qr_url}")]
    NotConnected { qr_url: String },

    #[error("Gateway rejected the send: HTTP {status} - {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Batch-level scheduler errors
///
/// Per-member gateway failures are captured in delivery records and never
/// surface here; only failures that make it unsafe to continue the batch
/// (store or ledger unreachable) do.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Failed to select members due for reminder: {0}")]
    SelectionFailed(DatabaseError),

    #[error("Delivery ledger unavailable: {0}")]
    LedgerFailed(DatabaseError),

    #[error("Failed to persist scheduler settings: {0}")]
    SettingsPersistenceFailed(DatabaseError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Transport(format!("request timed out: {}", err))
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}
