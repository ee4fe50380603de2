//! Mapping between an irregular point set and a regular color raster.
//!
//! [`RasterGrid`] owns the one coordinate mapping used in both directions:
//! [`RasterProjector`] paints point colors into pixels and
//! [`LabelBackProjector`] reads a painted mask back into per-point labels.
//! [`tiling`] turns a window size in meters into a patch size in pixels.

pub mod back_projection;
pub mod error;
pub mod grid;
pub mod projection;
pub mod tiling;

pub use back_projection::{LabelBackProjector, LabelSummary, SENTINEL_COLOR};
pub use error::RasterError;
pub use grid::{BoundingBox, RasterGrid};
pub use projection::RasterProjector;
pub use tiling::compute_patch_size_pixels;

/// Row-major RGB raster, origin at the top-left pixel.
pub type Raster = image::RgbImage;

/// One label per input point, in input order.
pub type LabelArray = Vec<i32>;

pub const LABEL_OFF_RASTER: i32 = -1;
pub const LABEL_BACKGROUND: i32 = 0;
pub const LABEL_TREE: i32 = 1;
