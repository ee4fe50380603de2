use std::path::Path;

use pcd_core::pointcloud::point::PointCloud;
use pcd_exporter::{write_point_cloud, ExportError};
use pcd_parser::{parsers::parser_for_path, ParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Read(#[from] ParseError),

    #[error("failed to write point cloud: {0}")]
    Write(#[from] ExportError),
}

/// Where point clouds come from and go to.
pub trait PointCloudStore {
    fn read(&self, path: &Path) -> Result<PointCloud, StoreError>;
    fn write(&self, cloud: &PointCloud, path: &Path) -> Result<(), StoreError>;
}

/// LAS/LAZ and CSV files on disk, picked by extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilePointCloudStore;

impl PointCloudStore for FilePointCloudStore {
    fn read(&self, path: &Path) -> Result<PointCloud, StoreError> {
        let parser = parser_for_path(path)?;
        Ok(parser.parse()?)
    }

    fn write(&self, cloud: &PointCloud, path: &Path) -> Result<(), StoreError> {
        Ok(write_point_cloud(cloud, path)?)
    }
}
