use image::Rgb;
use pcd_core::pointcloud::point::{ColorDepth, Point, PointCloud};
use rayon::prelude::*;

use crate::{
    error::RasterError,
    grid::{validate_resolution, RasterGrid},
    Raster,
};

/// Paints point colors into a raster laid over the cloud's bounding box.
#[derive(Debug, Clone, Copy)]
pub struct RasterProjector {
    resolution: f64,
}

impl RasterProjector {
    pub fn new(resolution: f64) -> Result<Self, RasterError> {
        validate_resolution(resolution)?;
        Ok(Self { resolution })
    }

    /// Projects every point of `cloud` onto the XY plane.
    ///
    /// Several points usually fall into the same pixel; the one that comes
    /// last in the cloud wins. Pixels without points stay black.
    pub fn project(&self, cloud: &PointCloud) -> Result<Raster, RasterError> {
        let grid = RasterGrid::from_points(&cloud.points, self.resolution)?;
        let raster = project_onto(&cloud.points, &grid, cloud.color_depth());

        log::debug!(
            "projected {} points onto {}x{} pixels",
            cloud.len(),
            grid.width,
            grid.height
        );
        Ok(raster)
    }
}

/// Projects `points` onto an existing grid. Points off the grid are skipped.
pub fn project_onto(points: &[Point], grid: &RasterGrid, depth: ColorDepth) -> Raster {
    // Pixel lookup is independent per point; painting stays sequential so the
    // highest point index wins a shared pixel.
    let pixels: Vec<Option<(u32, u32)>> = points
        .par_iter()
        .map(|point| grid.pixel_of(point.x, point.y))
        .collect();

    let mut raster = Raster::new(grid.width, grid.height);
    for (point, pixel) in points.iter().zip(pixels) {
        if let Some((col, row)) = pixel {
            raster.put_pixel(col, row, Rgb(point.to_rgb8(depth)));
        }
    }
    raster
}
