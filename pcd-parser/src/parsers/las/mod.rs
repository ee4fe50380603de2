use std::path::PathBuf;

use las::{point::ScanDirection, Reader};

use pcd_core::pointcloud::point::{Color, Point, PointAttributes, PointCloud, PointFlags};

use super::{ensure_exists, Parser, ParserProvider};
use crate::error::ParseError;

pub struct LasParserProvider {
    pub filename: PathBuf,
}

impl ParserProvider for LasParserProvider {
    fn get_parser(&self) -> Box<dyn Parser> {
        Box::new(LasParser {
            filename: self.filename.clone(),
        })
    }
}

pub struct LasParser {
    pub filename: PathBuf,
}

impl Parser for LasParser {
    fn parse(&self) -> Result<PointCloud, ParseError> {
        ensure_exists(&self.filename)?;

        let start = std::time::Instant::now();
        let mut reader = Reader::from_path(&self.filename)
            .map_err(|e| ParseError::format(&self.filename, e))?;
        let header = reader.header().clone();
        log::debug!("open LAS time: {:?}", start.elapsed());

        if !header.point_format().has_color {
            return Err(ParseError::format(
                &self.filename,
                format!(
                    "point format {:?} carries no RGB channels",
                    header.point_format().to_u8()
                ),
            ));
        }

        let start = std::time::Instant::now();
        let mut points = Vec::with_capacity(header.number_of_points() as usize);
        for las_point in reader.points() {
            let las_point = las_point.map_err(|e| ParseError::format(&self.filename, e))?;
            points.push(convert_las_point(las_point));
        }
        log::debug!("build PointCloud time: {:?}", start.elapsed());

        log::info!(
            "read {} points from {} (LAS {}.{}, point format {:?})",
            points.len(),
            self.filename.display(),
            header.version().major,
            header.version().minor,
            header.point_format().to_u8()
        );

        Ok(PointCloud::new(points).with_las_header(header))
    }
}

fn convert_las_point(las_point: las::Point) -> Point {
    let color = las_point
        .color
        .map(|c| Color {
            r: c.red,
            g: c.green,
            b: c.blue,
        })
        .unwrap_or_default();

    let attributes = PointAttributes {
        intensity: Some(las_point.intensity),
        return_number: Some(las_point.return_number),
        number_of_returns: Some(las_point.number_of_returns),
        classification: Some(u8::from(las_point.classification)),
        scanner_channel: Some(las_point.scanner_channel),
        scan_angle: Some(las_point.scan_angle),
        user_data: Some(las_point.user_data),
        point_source_id: Some(las_point.point_source_id),
        gps_time: las_point.gps_time,
        nir: las_point.nir,
        flags: PointFlags {
            synthetic: las_point.is_synthetic,
            key_point: las_point.is_key_point,
            withheld: las_point.is_withheld,
            overlap: las_point.is_overlap,
            edge_of_flight_line: las_point.is_edge_of_flight_line,
            scan_left_to_right: las_point.scan_direction == ScanDirection::LeftToRight,
        },
        extra_bytes: las_point.extra_bytes,
    };

    Point {
        x: las_point.x,
        y: las_point.y,
        z: las_point.z,
        color,
        attributes,
    }
}
