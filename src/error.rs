// ABOUTME: Custom error types for the sync pipeline
// ABOUTME: One variant per failure class so the orchestrator can report which gate tripped

use std::fmt;

#[derive(Debug)]
pub enum SyncError {
    Configuration(String),
    Connectivity(String),
    RemoteCommand(String),
    Transport(String),
    Database(String),
    Mirror(String),
    Permission(String),
    Service(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            SyncError::Connectivity(msg) => write!(f, "Connectivity error: {}", msg),
            SyncError::RemoteCommand(msg) => write!(f, "Remote command error: {}", msg),
            SyncError::Transport(msg) => write!(f, "Transport error: {}", msg),
            SyncError::Database(msg) => write!(f, "Database error: {}", msg),
            SyncError::Mirror(msg) => write!(f, "Mirror error: {}", msg),
            SyncError::Permission(msg) => write!(f, "Permission error: {}", msg),
            SyncError::Service(msg) => write!(f, "Service error: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}
