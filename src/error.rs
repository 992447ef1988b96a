use thiserror::Error;

/// Application-level errors using thiserror for structured error handling.
///
/// These errors represent domain-specific failures that can occur during
/// engine operation. They provide context and can be chained with anyhow.

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to initialize screen capturer")]
    InitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to capture screen")]
    CaptureFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("No displays found")]
    NoDisplays,

    #[error("Capture region {0:?} is outside display bounds")]
    RegionOutOfBounds([u32; 4]),
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detection cycle exceeded its {budget_ms}ms budget")]
    CycleTimeout { budget_ms: u64 },

    #[error("Detection was cancelled")]
    Cancelled,

    #[error("A scan band worker terminated without reporting")]
    BandLost,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Pointer event simulation failed")]
    SimulationFailed,
}

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("Failed to initialize OCR engine")]
    InitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to recognize text in frame")]
    RecognitionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = DetectionError::CycleTimeout { budget_ms: 250 };
        assert_eq!(
            err.to_string(),
            "Detection cycle exceeded its 250ms budget"
        );

        let err = DispatchError::SimulationFailed;
        assert_eq!(err.to_string(), "Pointer event simulation failed");
    }

    #[test]
    fn test_error_source_chain() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let config_err = ConfigError::LoadFailed {
            path: "/test/config.json".to_string(),
            source: Box::new(io_err),
        };

        assert!(config_err.source().is_some());
        assert_eq!(
            config_err.to_string(),
            "Failed to load configuration from /test/config.json"
        );
    }
}
