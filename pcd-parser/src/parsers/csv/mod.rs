use std::path::PathBuf;

use csv::ReaderBuilder;

use pcd_core::pointcloud::point::PointCloud;

use super::{ensure_exists, Parser, ParserProvider};
use crate::error::ParseError;

pub struct CsvParserProvider {
    pub filename: PathBuf,
}

impl ParserProvider for CsvParserProvider {
    fn get_parser(&self) -> Box<dyn Parser> {
        Box::new(CsvParser {
            filename: self.filename.clone(),
        })
    }
}

/// Reads `x,y,z,r,g,b` rows. A first row that does not parse as numbers is
/// taken as a header.
pub struct CsvParser {
    pub filename: PathBuf,
}

impl Parser for CsvParser {
    fn parse(&self) -> Result<PointCloud, ParseError> {
        ensure_exists(&self.filename)?;

        let start = std::time::Instant::now();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_path(&self.filename)
            .map_err(|e| ParseError::format(&self.filename, e))?;

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| ParseError::format(&self.filename, e))?;

            match parse_row(&record) {
                Some(row) => rows.push(row),
                None if index == 0 => {
                    log::debug!("skipping header row: {:?}", record);
                }
                None => {
                    return Err(ParseError::format(
                        &self.filename,
                        format!("record {} is not numeric: {:?}", index + 1, record),
                    ));
                }
            }
        }

        let point_cloud = PointCloud::from_xyzrgb_rows(&rows)?;
        log::info!(
            "read {} points from {} in {:?}",
            point_cloud.len(),
            self.filename.display(),
            start.elapsed()
        );

        Ok(point_cloud)
    }
}

fn parse_row(record: &csv::StringRecord) -> Option<Vec<f64>> {
    record
        .iter()
        .map(|field| field.parse::<f64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use pcd_core::pointcloud::point::Color;

    use super::*;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn parse(file: &tempfile::NamedTempFile) -> Result<PointCloud, ParseError> {
        CsvParserProvider {
            filename: file.path().to_path_buf(),
        }
        .get_parser()
        .parse()
    }

    #[test]
    fn reads_rows_with_header() {
        let file = write_csv("x,y,z,r,g,b\n0,0,1,10,20,30\n2,2,1,255,0,0\n");
        let cloud = parse(&file).unwrap();

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.points[0].color, Color { r: 10, g: 20, b: 30 });
        assert_eq!(cloud.points[1].x, 2.0);
        assert!(cloud.metadata.las_header.is_none());
    }

    #[test]
    fn wrong_channel_count_is_invalid_argument() {
        let file = write_csv("0,0,1,10,20\n");
        assert!(matches!(parse(&file), Err(ParseError::PointCloud(_))));
    }

    #[test]
    fn non_numeric_body_row_is_format_error() {
        let file = write_csv("0,0,1,10,20,30\n0,zero,1,10,20,30\n");
        assert!(matches!(parse(&file), Err(ParseError::Format { .. })));
    }
}
