use image::GrayImage;
use pcd_raster::Raster;
use serde::Deserialize;

use crate::error::ModelError;

/// Axis-aligned box around one candidate tree, in pixel coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
}

impl Detection {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            score: None,
            label: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
            && self.xmin <= self.xmax
            && self.ymin <= self.ymax
    }
}

/// Pixels belonging to one segmented detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMask {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl SegmentMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width as usize * height as usize],
        }
    }

    /// Any non-zero luma marks a member pixel.
    pub fn from_luma(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.pixels().map(|p| p.0[0] != 0).collect(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.pixels[self.index(x, y)]
    }

    pub fn insert(&mut self, x: u32, y: u32) {
        if x < self.width && y < self.height {
            let index = self.index(x, y);
            self.pixels[index] = true;
        }
    }

    pub fn members(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width;
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, member)| **member)
            .map(move |(i, _)| ((i % width as usize) as u32, (i / width as usize) as u32))
    }

    pub fn len(&self) -> usize {
        self.pixels.iter().filter(|member| **member).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.pixels.iter().any(|member| *member)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Tile-based tree detector.
pub trait DetectionModel {
    fn set_working_image(&mut self, raster: &Raster) -> Result<(), ModelError>;

    fn predict_tile(
        &mut self,
        raster: &Raster,
        patch_size: u32,
        patch_overlap: f64,
    ) -> Result<Vec<Detection>, ModelError>;
}

/// Box-prompted segmenter returning one mask per box.
pub trait SegmentationModel {
    fn set_image(&mut self, raster: &Raster) -> Result<(), ModelError>;

    fn predict(&mut self, detection: &Detection) -> Result<SegmentMask, ModelError>;
}

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;

    #[test]
    fn members_are_listed_row_by_row() {
        let mut mask = SegmentMask::new(4, 3);
        mask.insert(3, 0);
        mask.insert(1, 2);
        mask.insert(9, 9);

        assert_eq!(mask.members().collect::<Vec<_>>(), vec![(3, 0), (1, 2)]);
        assert_eq!(mask.len(), 2);
        assert!(mask.contains(1, 2));
        assert!(!mask.contains(9, 9));
    }

    #[test]
    fn luma_mask_uses_non_zero_pixels() {
        let mut image = GrayImage::new(2, 2);
        image.put_pixel(1, 0, Luma([255]));
        image.put_pixel(0, 1, Luma([1]));

        let mask = SegmentMask::from_luma(&image);
        assert_eq!(mask.dimensions(), (2, 2));
        assert_eq!(mask.members().collect::<Vec<_>>(), vec![(1, 0), (0, 1)]);
    }

    #[test]
    fn inverted_boxes_are_invalid() {
        assert!(Detection::new(1.0, 1.0, 5.0, 4.0).is_valid());
        assert!(!Detection::new(5.0, 1.0, 1.0, 4.0).is_valid());
        assert!(!Detection::new(f64::NAN, 1.0, 5.0, 4.0).is_valid());
    }
}
