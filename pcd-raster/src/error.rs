use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("degenerate extent: {0}")]
    DegenerateExtent(String),

    #[error(
        "mask is {actual_width}x{actual_height} pixels but the point cloud grid is {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}
