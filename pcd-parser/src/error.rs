use std::path::PathBuf;

use pcd_core::PointCloudError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported file extension: {0:?}")]
    UnsupportedExtension(String),

    #[error("format error in {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}

impl ParseError {
    pub(crate) fn format(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ParseError::Format {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
