use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcradError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Report parse error: {0}")]
    Parse(String),

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Invalid staging name: {0:?}")]
    InvalidStagingName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl OcradError {
    /// Builds an engine error for a native call that returned a failure status.
    pub fn engine_status(operation: &str, status: i32, errno: i32) -> Self {
        OcradError::Engine(format!(
            "{operation} failed with status {status} (errno {errno})"
        ))
    }
}

pub type Result<T> = std::result::Result<T, OcradError>;
