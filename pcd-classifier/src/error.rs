use std::process::ExitStatus;

use pcd_core::PointCloudError;
use pcd_raster::RasterError;
use thiserror::Error;

use crate::{orchestrator::Stage, store::StoreError};

/// Failure reported by a detection or segmentation backend.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("unusable model output: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    PointCloud(#[from] PointCloudError),
}

/// A pipeline failure together with the stage it happened in.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct ClassificationError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl ClassificationError {
    pub fn new(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}
