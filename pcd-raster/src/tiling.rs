use crate::{
    error::RasterError,
    grid::{pixel_count, validate_resolution, BoundingBox},
};

/// Ground distance covered by one pixel along X.
pub fn meters_per_pixel(bbox: &BoundingBox, resolution: f64) -> Result<f64, RasterError> {
    validate_resolution(resolution)?;
    if bbox.width() <= 0.0 {
        return Err(RasterError::DegenerateExtent(format!(
            "all points share x = {}, the raster has no horizontal scale",
            bbox.min_x
        )));
    }

    let width = pixel_count(bbox.width(), resolution)?;
    Ok(bbox.width() / width as f64)
}

/// Side of a detector tile in pixels for a window of `window_size` meters.
pub fn compute_patch_size_pixels(
    bbox: &BoundingBox,
    resolution: f64,
    window_size: f64,
) -> Result<u32, RasterError> {
    if !(window_size.is_finite() && window_size > 0.0) {
        return Err(RasterError::InvalidArgument(format!(
            "window size must be a positive number of meters, got {}",
            window_size
        )));
    }

    let patch_size = (window_size / meters_per_pixel(bbox, resolution)?).trunc();
    if patch_size < 1.0 {
        return Err(RasterError::InvalidArgument(format!(
            "a {} m window is smaller than one pixel",
            window_size
        )));
    }
    Ok(patch_size.min(u32::MAX as f64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(width: f64) -> BoundingBox {
        BoundingBox {
            min_x: 100.0,
            max_x: 100.0 + width,
            min_y: 0.0,
            max_y: 50.0,
        }
    }

    #[test]
    fn patch_size_from_window_in_meters() {
        // 199 m at 0.4 m/pixel -> 498 pixels of 0.3996 m
        let patch = compute_patch_size_pixels(&bbox(199.0), 0.4, 60.0).unwrap();
        assert_eq!(patch, 150);

        let patch = compute_patch_size_pixels(&bbox(10.0), 1.0, 5.0).unwrap();
        // 11 pixels over 10 m -> 5.5 pixels, truncated
        assert_eq!(patch, 5);
    }

    #[test]
    fn shared_x_is_a_degenerate_extent() {
        assert!(matches!(
            compute_patch_size_pixels(&bbox(0.0), 0.4, 60.0),
            Err(RasterError::DegenerateExtent(_))
        ));
        assert!(matches!(
            meters_per_pixel(&bbox(0.0), 0.4),
            Err(RasterError::DegenerateExtent(_))
        ));
    }

    #[test]
    fn invalid_window_is_rejected() {
        for window in [0.0, -60.0, f64::NAN] {
            assert!(matches!(
                compute_patch_size_pixels(&bbox(100.0), 0.4, window),
                Err(RasterError::InvalidArgument(_))
            ));
        }
        assert!(compute_patch_size_pixels(&bbox(100.0), 1.0, 0.5).is_err());
    }
}
