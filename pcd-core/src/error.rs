use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointCloudError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
