pub mod error;
pub mod pointcloud;

pub use error::PointCloudError;
