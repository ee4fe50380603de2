use image::Rgb;
use pcd_core::pointcloud::point::{Point, PointCloud};
use rayon::prelude::*;

use crate::{
    error::RasterError,
    grid::{validate_resolution, RasterGrid},
    LabelArray, Raster, LABEL_BACKGROUND, LABEL_OFF_RASTER, LABEL_TREE,
};

/// Mask color marking a positive pixel.
pub const SENTINEL_COLOR: Rgb<u8> = Rgb([0, 240, 0]);

/// Reads a mask raster back into one label per point.
///
/// Callers must hand in the same point cloud and resolution that produced the
/// raster the mask was painted over: the grid is rebuilt from the points, and
/// a different cloud gives a different bounding box.
#[derive(Debug, Clone, Copy)]
pub struct LabelBackProjector {
    resolution: f64,
    tolerance: u8,
}

impl LabelBackProjector {
    pub fn new(resolution: f64) -> Result<Self, RasterError> {
        validate_resolution(resolution)?;
        Ok(Self {
            resolution,
            tolerance: 0,
        })
    }

    /// Accept mask pixels whose channels each differ from the sentinel by at
    /// most `tolerance`. Zero means exact matching.
    pub fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn back_project(&self, cloud: &PointCloud, mask: &Raster) -> Result<LabelArray, RasterError> {
        let grid = RasterGrid::from_points(&cloud.points, self.resolution)?;
        self.label_points(&cloud.points, mask, &grid)
    }

    /// Labels `points` against a mask covering `grid`: `1` on a sentinel pixel,
    /// `0` elsewhere on the grid and `-1` off the grid.
    pub fn label_points(
        &self,
        points: &[Point],
        mask: &Raster,
        grid: &RasterGrid,
    ) -> Result<LabelArray, RasterError> {
        if mask.dimensions() != (grid.width, grid.height) {
            return Err(RasterError::DimensionMismatch {
                expected_width: grid.width,
                expected_height: grid.height,
                actual_width: mask.width(),
                actual_height: mask.height(),
            });
        }

        let labels = points
            .par_iter()
            .map(|point| match grid.pixel_of(point.x, point.y) {
                None => LABEL_OFF_RASTER,
                Some((col, row)) if self.matches(mask.get_pixel(col, row)) => LABEL_TREE,
                Some(_) => LABEL_BACKGROUND,
            })
            .collect();
        Ok(labels)
    }

    fn matches(&self, pixel: &Rgb<u8>) -> bool {
        pixel
            .0
            .iter()
            .zip(SENTINEL_COLOR.0.iter())
            .all(|(a, b)| a.abs_diff(*b) <= self.tolerance)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelSummary {
    pub tree: usize,
    pub background: usize,
    pub off_raster: usize,
}

impl LabelSummary {
    pub fn from_labels(labels: &[i32]) -> Self {
        let mut summary = LabelSummary::default();
        for label in labels {
            match *label {
                LABEL_TREE => summary.tree += 1,
                LABEL_OFF_RASTER => summary.off_raster += 1,
                _ => summary.background += 1,
            }
        }
        summary
    }
}
