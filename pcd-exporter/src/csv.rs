use std::io::BufWriter;
use std::path::Path;

use pcd_core::pointcloud::point::PointCloud;

use crate::{commit, error::ExportError, staging_file};

/// Writes `x,y,z,r,g,b` followed by one column per extra dimension.
pub fn write_csv(cloud: &PointCloud, path: &Path) -> Result<(), ExportError> {
    let staged = staging_file(path)?;
    {
        let mut writer = csv::Writer::from_writer(BufWriter::new(staged.reopen()?));

        let mut header = vec!["x", "y", "z", "r", "g", "b"];
        header.extend(cloud.extra_dimensions.iter().map(|dim| dim.name.as_str()));
        writer.write_record(&header)?;

        for (index, point) in cloud.points.iter().enumerate() {
            let mut record = vec![
                point.x.to_string(),
                point.y.to_string(),
                point.z.to_string(),
                point.color.r.to_string(),
                point.color.g.to_string(),
                point.color.b.to_string(),
            ];
            record.extend(
                cloud
                    .extra_dimensions
                    .iter()
                    .map(|dim| dim.values[index].to_string()),
            );
            writer.write_record(&record)?;
        }
        writer.flush()?;
    }
    commit(staged, path)?;

    log::info!("wrote {} points to {}", cloud.len(), path.display());
    Ok(())
}
