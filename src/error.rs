//! Domain error enums for each failure class a caller needs to branch on.
//! Callers `match` on these to decide whether to retry rather than treating
//! every failure as fatal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("malformed location frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no screen source available")]
    NoSource,
    #[error("capture produced an empty image")]
    EmptyCapture,
    #[error("crop rectangle has non-positive area after clamping")]
    InvalidGeometry,
    #[error("failed to encode frame as jpeg: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("connection to classifier failed: {0}")]
    Connection(String),
    #[error("classifier responded with non-2xx status: {0}")]
    Status(u16),
    #[error("io error while forming batch: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("failed to open subscription: {0}")]
    Open(String),
}
