//! Error types for NetWarden.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Alert has not been saved to the database")]
    NotPersisted,

    #[error("Plugin dependency unsatisfied: {0}")]
    DependencyUnsatisfied(String),

    #[error("External tool error: {0}")]
    ExternalTool(String),

    #[error("No plugin named '{0}' is loaded")]
    UnknownPlugin(String),

    #[error("Network id {0} does not exist")]
    UnknownNetwork(i64),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
