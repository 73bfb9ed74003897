use thiserror::Error;

/// Reasons a telemetry event is rejected by the validator
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid timestamp")]
    InvalidTimestamp,

    #[error("missing app_version")]
    MissingAppVersion,

    #[error("missing platform")]
    MissingPlatform,

    #[error("missing device_id")]
    MissingDeviceId,

    #[error("missing session_id")]
    MissingSessionId,

    #[error("missing scene_name")]
    MissingSceneName,

    #[error("missing fingerprint")]
    MissingFingerprint,
}

/// Errors that fail a whole ingestion request
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid JSON: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

/// Errors reported by an event store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to insert into {table}: {reason}")]
    Insert { table: &'static str, reason: String },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur when sending alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Webhook returned status {0}")]
    HttpStatus(u16),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        assert_eq!(ValidationError::InvalidTimestamp.to_string(), "invalid timestamp");
        assert_eq!(
            ValidationError::MissingAppVersion.to_string(),
            "missing app_version"
        );
        assert_eq!(
            ValidationError::MissingFingerprint.to_string(),
            "missing fingerprint"
        );
    }

    #[test]
    fn test_storage_error_names_table() {
        let err = StorageError::Insert {
            table: "crashes",
            reason: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to insert into crashes: connection reset"
        );
    }

    #[test]
    fn test_alert_error_status() {
        assert_eq!(
            AlertError::HttpStatus(503).to_string(),
            "Webhook returned status 503"
        );
    }
}
