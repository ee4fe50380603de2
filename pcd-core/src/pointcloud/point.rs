use crate::error::PointCloudError;

/// Number of values a raw point row carries: x, y, z, r, g, b.
pub const XYZRGB_CHANNELS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointFlags {
    pub synthetic: bool,
    pub key_point: bool,
    pub withheld: bool,
    pub overlap: bool,
    pub edge_of_flight_line: bool,
    pub scan_left_to_right: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointAttributes {
    pub intensity: Option<u16>,
    pub return_number: Option<u8>,
    pub number_of_returns: Option<u8>,
    pub classification: Option<u8>,
    pub scanner_channel: Option<u8>,
    pub scan_angle: Option<f32>,
    pub user_data: Option<u8>,
    pub point_source_id: Option<u16>,
    pub gps_time: Option<f64>,
    pub nir: Option<u16>,
    pub flags: PointFlags,
    /// Extra bytes already present in the source record, kept verbatim.
    pub extra_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

/// How the 16-bit color fields of a cloud are populated.
///
/// LAS stores RGB in 16-bit fields, but plenty of producers write plain 8-bit
/// values into them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    Eight,
    Sixteen,
}

impl ColorDepth {
    pub fn detect(points: &[Point]) -> Self {
        let wide = points
            .iter()
            .any(|p| p.color.r > 255 || p.color.g > 255 || p.color.b > 255);
        if wide {
            ColorDepth::Sixteen
        } else {
            ColorDepth::Eight
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: Color,
    pub attributes: PointAttributes,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64, color: Color) -> Self {
        Self {
            x,
            y,
            z,
            color,
            attributes: PointAttributes::default(),
        }
    }

    pub fn to_rgb8(&self, depth: ColorDepth) -> [u8; 3] {
        match depth {
            ColorDepth::Eight => [
                self.color.r.min(255) as u8,
                self.color.g.min(255) as u8,
                self.color.b.min(255) as u8,
            ],
            ColorDepth::Sixteen => [
                (self.color.r as f64 / 65535.0 * 255.0) as u8,
                (self.color.g as f64 / 65535.0 * 255.0) as u8,
                (self.color.b as f64 / 65535.0 * 255.0) as u8,
            ],
        }
    }
}

/// A named signed 32-bit value attached to every point of a cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraDimension {
    pub name: String,
    pub values: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct PointCloud {
    pub points: Vec<Point>,
    pub metadata: Metadata,
    pub extra_dimensions: Vec<ExtraDimension>,
}

impl PointCloud {
    pub fn new(points: Vec<Point>) -> Self {
        let bounding_volume = BoundingVolume::from_points(&points).unwrap_or_default();

        let mut digits_x = 1;
        let mut digits_y = 1;
        let mut digits_z = 1;

        for point in &points {
            for (value, digits) in [
                (point.x, &mut digits_x),
                (point.y, &mut digits_y),
                (point.z, &mut digits_z),
            ] {
                let value_str = format!("{:.7}", value);
                if let Some(dot_index) = value_str.find('.') {
                    let fractional_part = &value_str[dot_index + 1..];
                    let fractional_part = fractional_part.trim_end_matches('0');
                    *digits = (*digits).max(fractional_part.len());
                }
            }
        }

        let max_digits = digits_x.max(digits_y).max(digits_z);
        let scale = decimal_scale(max_digits);

        let metadata = Metadata {
            point_count: points.len(),
            offset: bounding_volume.min,
            bounding_volume,
            scale: [scale, scale, scale],
            las_header: None,
        };

        PointCloud {
            points,
            metadata,
            extra_dimensions: Vec::new(),
        }
    }

    /// Builds a cloud from raw `[x, y, z, r, g, b]` rows.
    ///
    /// When every color value lies in `[0, 1]` the colors are treated as
    /// normalised and scaled to 8 bits, otherwise they are taken as 8-bit values.
    pub fn from_xyzrgb_rows(rows: &[Vec<f64>]) -> Result<Self, PointCloudError> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != XYZRGB_CHANNELS)
        {
            return Err(PointCloudError::InvalidArgument(format!(
                "row {} has {} values, expected {} (x, y, z, r, g, b)",
                index,
                row.len(),
                XYZRGB_CHANNELS
            )));
        }

        let normalized = rows
            .iter()
            .all(|row| row[3..].iter().all(|c| (0.0..=1.0).contains(c)));
        let to_channel = |value: f64| -> u16 {
            let value = if normalized { value * 255.0 } else { value };
            value.round().clamp(0.0, 255.0) as u16
        };

        let points = rows
            .iter()
            .map(|row| {
                let color = Color {
                    r: to_channel(row[3]),
                    g: to_channel(row[4]),
                    b: to_channel(row[5]),
                };
                Point::new(row[0], row[1], row[2], color)
            })
            .collect();

        Ok(PointCloud::new(points))
    }

    pub fn with_las_header(mut self, header: las::Header) -> Self {
        self.metadata.las_header = Some(header);
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn color_depth(&self) -> ColorDepth {
        ColorDepth::detect(&self.points)
    }

    pub fn extra_dimension(&self, name: &str) -> Option<&ExtraDimension> {
        self.extra_dimensions.iter().find(|dim| dim.name == name)
    }

    /// Returns a copy of this cloud carrying one more per-point dimension.
    /// `self` is left untouched.
    pub fn with_extra_dimension(
        &self,
        name: &str,
        values: Vec<i32>,
    ) -> Result<PointCloud, PointCloudError> {
        if values.len() != self.points.len() {
            return Err(PointCloudError::InvalidArgument(format!(
                "dimension '{}' has {} values for {} points",
                name,
                values.len(),
                self.points.len()
            )));
        }
        if self.extra_dimension(name).is_some() {
            return Err(PointCloudError::InvalidArgument(format!(
                "dimension '{}' already exists",
                name
            )));
        }

        let mut cloud = self.clone();
        cloud.extra_dimensions.push(ExtraDimension {
            name: name.to_string(),
            values,
        });
        Ok(cloud)
    }
}

fn decimal_scale(digits: usize) -> f64 {
    format!("{:.*}", digits, 0.1_f64.powi(digits as i32))
        .parse()
        .unwrap_or(0.001)
}

// Min and max of the point coordinates, before any scale and offset are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingVolume {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingVolume {
    /// `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let mut bounding_volume = BoundingVolume {
            min: [f64::MAX, f64::MAX, f64::MAX],
            max: [f64::MIN, f64::MIN, f64::MIN],
        };
        for point in points {
            bounding_volume.max[0] = bounding_volume.max[0].max(point.x);
            bounding_volume.max[1] = bounding_volume.max[1].max(point.y);
            bounding_volume.max[2] = bounding_volume.max[2].max(point.z);
            bounding_volume.min[0] = bounding_volume.min[0].min(point.x);
            bounding_volume.min[1] = bounding_volume.min[1].min(point.y);
            bounding_volume.min[2] = bounding_volume.min[2].min(point.z);
        }
        Some(bounding_volume)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub point_count: usize,
    pub bounding_volume: BoundingVolume,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    /// Header of the LAS file the cloud was read from, passed through to the writer.
    pub las_header: Option<las::Header>,
}
