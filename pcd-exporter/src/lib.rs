pub mod csv;
pub mod error;
pub mod las;

use std::path::Path;

use pcd_core::pointcloud::point::PointCloud;

pub use error::ExportError;

/// Writes `cloud` in the format given by the extension of `path`.
///
/// The file is assembled next to its destination and only moved into place once
/// complete, so a failed export leaves nothing behind.
pub fn write_point_cloud(cloud: &PointCloud, path: &Path) -> Result<(), ExportError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "las" => crate::las::write_las(cloud, path, false),
        "laz" => crate::las::write_las(cloud, path, true),
        "csv" | "txt" => crate::csv::write_csv(cloud, path),
        _ => Err(ExportError::Format(format!(
            "unsupported output extension {:?}",
            extension
        ))),
    }
}

pub(crate) fn staging_file(path: &Path) -> Result<tempfile::NamedTempFile, ExportError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(tempfile::NamedTempFile::new_in(dir)?)
}

pub(crate) fn commit(staged: tempfile::NamedTempFile, path: &Path) -> Result<(), ExportError> {
    staged.persist(path).map_err(|e| ExportError::Io(e.error))?;
    Ok(())
}
