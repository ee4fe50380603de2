use pcd_core::pointcloud::point::{BoundingVolume, Point};

use crate::error::RasterError;

/// Planimetric extent of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[Point]) -> Result<Self, RasterError> {
        let volume = BoundingVolume::from_points(points).ok_or_else(|| {
            RasterError::DegenerateExtent("point cloud has no points".to_string())
        })?;

        let bbox = BoundingBox {
            min_x: volume.min[0],
            max_x: volume.max[0],
            min_y: volume.min[1],
            max_y: volume.max[1],
        };
        // NaN coordinates never win a min/max comparison
        if bbox.min_x > bbox.max_x || bbox.min_y > bbox.max_y {
            return Err(RasterError::InvalidArgument(
                "no point has finite x and y coordinates".to_string(),
            ));
        }
        if !bbox.is_finite() {
            return Err(RasterError::InvalidArgument(format!(
                "point coordinates are not finite: {:?}",
                bbox
            )));
        }
        Ok(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    fn is_finite(&self) -> bool {
        [self.min_x, self.max_x, self.min_y, self.max_y]
            .iter()
            .all(|v| v.is_finite())
    }
}

pub(crate) fn validate_resolution(resolution: f64) -> Result<(), RasterError> {
    if resolution.is_finite() && resolution > 0.0 {
        Ok(())
    } else {
        Err(RasterError::InvalidArgument(format!(
            "resolution must be a positive number, got {}",
            resolution
        )))
    }
}

/// Pixel count along an axis spanning `extent` meters.
pub(crate) fn pixel_count(extent: f64, resolution: f64) -> Result<u32, RasterError> {
    let count = (extent / resolution).floor() + 1.0;
    if count > u32::MAX as f64 {
        return Err(RasterError::InvalidArgument(format!(
            "{} m at {} m/pixel exceeds the maximum raster size",
            extent, resolution
        )));
    }
    Ok(count as u32)
}

/// The raster laid over a point cloud's bounding box at a given resolution.
///
/// Forward projection and back-projection both go through [`RasterGrid::pixel_index`],
/// so a grid built from the same points and resolution always maps a point to
/// the same pixel in both directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGrid {
    pub bbox: BoundingBox,
    pub resolution: f64,
    pub width: u32,
    pub height: u32,
}

impl RasterGrid {
    pub fn new(bbox: BoundingBox, resolution: f64) -> Result<Self, RasterError> {
        validate_resolution(resolution)?;
        let width = pixel_count(bbox.width(), resolution)?;
        let height = pixel_count(bbox.height(), resolution)?;

        Ok(Self {
            bbox,
            resolution,
            width,
            height,
        })
    }

    pub fn from_points(points: &[Point], resolution: f64) -> Result<Self, RasterError> {
        validate_resolution(resolution)?;
        Self::new(BoundingBox::from_points(points)?, resolution)
    }

    /// Column and row of the pixel containing `(x, y)`. Rows grow southwards.
    /// The result may lie outside the grid.
    #[inline]
    pub fn pixel_index(&self, x: f64, y: f64) -> (i64, i64) {
        let col = ((x - self.bbox.min_x) / self.resolution).floor() as i64;
        let row = ((self.bbox.max_y - y) / self.resolution).floor() as i64;
        (col, row)
    }

    /// Like [`RasterGrid::pixel_index`], `None` when the pixel is off the grid
    /// or a coordinate is not finite.
    #[inline]
    pub fn pixel_of(&self, x: f64, y: f64) -> Option<(u32, u32)> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let (col, row) = self.pixel_index(x, y);
        if (0..self.width as i64).contains(&col) && (0..self.height as i64).contains(&row) {
            Some((col as u32, row as u32))
        } else {
            None
        }
    }
}
