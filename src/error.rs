//! Error types for the tabletop tracking library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Depth sensor acquisition failed (device lost, unreadable recording)
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// The depth stream has no more frames
    #[error("End of depth stream after frame {0}")]
    EndOfStream(u64),

    /// A frame does not have the dimensions the pipeline was built for
    #[error("Frame size mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    FrameSize {
        /// Expected frame width
        expected_width: usize,
        /// Expected frame height
        expected_height: usize,
        /// Actual frame width
        width: usize,
        /// Actual frame height
        height: usize,
    },

    /// Background statistics were finalized without any accumulated frame
    #[error("Background model has no accumulated frames")]
    EmptyBackground,

    /// Calibration file missing, corrupt, or calibration fit failed
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filter initialization or processing error
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Fingertip detector selection error
    #[error("Detector error: {0}")]
    DetectorError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error terminates the tracking session
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidInput(_) | Self::FrameSize { .. })
    }
}
