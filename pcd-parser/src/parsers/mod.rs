use std::path::{Path, PathBuf};

use pcd_core::pointcloud::point::PointCloud;

use crate::error::ParseError;

pub mod csv;
pub mod las;

pub trait ParserProvider {
    fn get_parser(&self) -> Box<dyn Parser>;
}

pub trait Parser {
    fn parse(&self) -> Result<PointCloud, ParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Las,
    Laz,
    Csv,
    Txt,
}

pub fn get_extension(path: &Path) -> Result<Extension, ParseError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "las" => Ok(Extension::Las),
        "laz" => Ok(Extension::Laz),
        "csv" => Ok(Extension::Csv),
        "txt" => Ok(Extension::Txt),
        _ => Err(ParseError::UnsupportedExtension(extension)),
    }
}

/// Picks the parser matching the file extension of `path`.
pub fn parser_for_path(path: &Path) -> Result<Box<dyn Parser>, ParseError> {
    let filename = PathBuf::from(path);
    let parser = match get_extension(path)? {
        Extension::Las | Extension::Laz => las::LasParserProvider { filename }.get_parser(),
        Extension::Csv | Extension::Txt => csv::CsvParserProvider { filename }.get_parser(),
    };
    Ok(parser)
}

pub(crate) fn ensure_exists(path: &Path) -> Result<(), ParseError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ParseError::FileNotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(get_extension(Path::new("a/b.LAS")).unwrap(), Extension::Las);
        assert_eq!(get_extension(Path::new("cloud.laz")).unwrap(), Extension::Laz);
        assert_eq!(get_extension(Path::new("cloud.txt")).unwrap(), Extension::Txt);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            get_extension(Path::new("cloud.ply")),
            Err(ParseError::UnsupportedExtension(ext)) if ext == "ply"
        ));
        assert!(get_extension(Path::new("cloud")).is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let parser = parser_for_path(Path::new("does/not/exist.las")).unwrap();
        assert!(matches!(parser.parse(), Err(ParseError::FileNotFound(_))));
    }
}
