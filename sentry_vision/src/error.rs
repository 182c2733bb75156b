use thiserror::Error;

/// Errors that stop a run. Configuration problems surface before the first
/// frame; everything else is a stream-level fault.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("background model used before it was seeded")]
    Unseeded,

    #[error("background model is already seeded")]
    AlreadySeeded,

    #[error("frame is {actual_width}x{actual_height} but the model expects {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("frame timestamp {current} does not follow {previous}")]
    Timestamp { previous: String, current: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Failures of the recording sink or the notifier. These are logged and
/// counted; they never reach the incident state machine.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("recording failed: {0}")]
    Recording(String),

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, VisionError>;
