use thiserror::Error;

/// Failures from infrastructure adapters and process bootstrap.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database unavailable: {0}")]
    Database(String),
    #[error("configuration rejected: {0}")]
    Configuration(String),
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
