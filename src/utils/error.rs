use thiserror::Error;

#[derive(Error, Debug)]
pub enum GpsError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Service not available: {0}")]
    ServiceNotAvailable(String),
}

impl From<serde_json::Error> for GpsError {
    fn from(err: serde_json::Error) -> Self {
        GpsError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for GpsError {
    fn from(err: toml::de::Error) -> Self {
        GpsError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for GpsError {
    fn from(err: toml::ser::Error) -> Self {
        GpsError::SerializationError(format!("TOML error: {}", err))
    }
}

impl From<std::io::Error> for GpsError {
    fn from(err: std::io::Error) -> Self {
        GpsError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<serialport::Error> for GpsError {
    fn from(err: serialport::Error) -> Self {
        GpsError::ConnectionError(format!("Serial port error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for GpsError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GpsError::Timeout
    }
}

impl From<tokio::task::JoinError> for GpsError {
    fn from(err: tokio::task::JoinError) -> Self {
        GpsError::ServiceNotAvailable(format!("Background task failed: {}", err))
    }
}
