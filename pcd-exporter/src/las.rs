use std::io::{BufWriter, Write as _};
use std::ops::Range;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt as _};
use las::{
    point::{Classification, Format, ScanDirection},
    Builder, Header, Transform, Vector, Vlr, Writer,
};
use pcd_core::pointcloud::point::{Point, PointCloud};

use crate::{commit, error::ExportError, staging_file};

pub const EXTRA_BYTES_USER_ID: &str = "LASF_Spec";
pub const EXTRA_BYTES_RECORD_ID: u16 = 4;

const EXTRA_BYTES_DESCRIPTOR_LEN: usize = 192;
const EXTRA_BYTES_NAME_LEN: usize = 32;
const EXTRA_BYTES_NAME_OFFSET: usize = 4;
const EXTRA_BYTES_DESCRIPTION_LEN: usize = 32;
// LAS 1.4 extra bytes data type code for a signed 32-bit integer
const DATA_TYPE_I32: u8 = 6;

/// Header of an output file, plus the byte ranges of the source extra bytes
/// that are dropped because the cloud carries a dimension of the same name.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub header: Header,
    replaced: Vec<Range<usize>>,
}

pub fn write_las(cloud: &PointCloud, path: &Path, compress: bool) -> Result<(), ExportError> {
    let start = std::time::Instant::now();
    let layout = build_layout(cloud, compress)?;
    let format = *layout.header.point_format();
    if format.has_waveform {
        return Err(ExportError::Format(
            "waveform point formats are not supported".to_string(),
        ));
    }

    let staged = staging_file(path)?;
    {
        let mut writer = Writer::new(BufWriter::new(staged.reopen()?), layout.header.clone())?;
        for (index, point) in cloud.points.iter().enumerate() {
            writer.write_point(to_las_point(cloud, index, point, &format, &layout.replaced)?)?;
        }
        writer.close()?;
    }
    commit(staged, path)?;

    log::info!(
        "wrote {} points to {} in {:?}",
        cloud.len(),
        path.display(),
        start.elapsed()
    );
    Ok(())
}

/// Reuses the source LAS header when there is one, otherwise derives a LAS 1.4
/// point format 2 header from the cloud's scale and offset. Every extra
/// dimension adds four bytes per point and one extra bytes descriptor; a source
/// descriptor with the same name is replaced along with its bytes.
pub fn build_layout(cloud: &PointCloud, compress: bool) -> Result<OutputLayout, ExportError> {
    let mut replaced = Vec::new();
    let mut builder = match &cloud.metadata.las_header {
        Some(header) => {
            let mut builder = Builder::from(header.clone());
            // the writer adds its own laszip VLR for the new point layout
            builder.vlrs.retain(|vlr| !las::laz::is_laszip_vlr(vlr));

            let names: Vec<&str> = cloud
                .extra_dimensions
                .iter()
                .map(|dim| dim.name.as_str())
                .collect();
            if let Some(vlr) = builder.vlrs.iter_mut().find(|vlr| is_extra_bytes_vlr(vlr)) {
                let (kept, ranges) = drop_descriptors(&vlr.data, &names)?;
                let dropped: usize = ranges.iter().map(|range| range.len()).sum();
                builder.point_format.extra_bytes = (builder.point_format.extra_bytes as usize)
                    .checked_sub(dropped)
                    .and_then(|n| u16::try_from(n).ok())
                    .ok_or_else(|| {
                        ExportError::Format(
                            "extra bytes descriptors exceed the point record".to_string(),
                        )
                    })?;
                vlr.data = kept;
                replaced = ranges;
            }
            builder
        }
        None => {
            let mut builder = Builder::from((1, 4));
            builder.point_format = Format::new(2)?;
            let [sx, sy, sz] = cloud.metadata.scale;
            let [ox, oy, oz] = cloud.metadata.offset;
            builder.transforms = Vector {
                x: Transform {
                    scale: sx,
                    offset: ox,
                },
                y: Transform {
                    scale: sy,
                    offset: oy,
                },
                z: Transform {
                    scale: sz,
                    offset: oz,
                },
            };
            builder
        }
    };
    builder.point_format.is_compressed = compress;

    if !cloud.extra_dimensions.is_empty() {
        let mut descriptors = Vec::new();
        for dimension in &cloud.extra_dimensions {
            descriptors.extend(extra_bytes_descriptor(&dimension.name)?);
        }
        builder.point_format.extra_bytes += (4 * cloud.extra_dimensions.len()) as u16;

        match builder.vlrs.iter_mut().find(|vlr| is_extra_bytes_vlr(vlr)) {
            Some(vlr) => vlr.data.extend(descriptors),
            None => builder.vlrs.push(Vlr {
                user_id: EXTRA_BYTES_USER_ID.to_string(),
                record_id: EXTRA_BYTES_RECORD_ID,
                description: "Extra Bytes".to_string(),
                data: descriptors,
            }),
        }
    }

    Ok(OutputLayout {
        header: builder.into_header()?,
        replaced,
    })
}

pub fn is_extra_bytes_vlr(vlr: &Vlr) -> bool {
    vlr.user_id == EXTRA_BYTES_USER_ID && vlr.record_id == EXTRA_BYTES_RECORD_ID
}

fn extra_bytes_descriptor(name: &str) -> Result<Vec<u8>, ExportError> {
    descriptor(name, DATA_TYPE_I32, 0, "tree classification label")
}

fn descriptor(
    name: &str,
    data_type: u8,
    options: u8,
    description: &str,
) -> Result<Vec<u8>, ExportError> {
    if name.len() > EXTRA_BYTES_NAME_LEN {
        return Err(ExportError::Format(format!(
            "extra dimension name {:?} is longer than {} bytes",
            name, EXTRA_BYTES_NAME_LEN
        )));
    }

    let mut descriptor = Vec::with_capacity(EXTRA_BYTES_DESCRIPTOR_LEN);
    descriptor.write_all(&[0, 0])?;
    descriptor.write_u8(data_type)?;
    descriptor.write_u8(options)?;
    let mut name_field = [0u8; EXTRA_BYTES_NAME_LEN];
    name_field[..name.len()].copy_from_slice(name.as_bytes());
    descriptor.write_all(&name_field)?;
    descriptor.resize(EXTRA_BYTES_DESCRIPTOR_LEN - EXTRA_BYTES_DESCRIPTION_LEN, 0);
    let mut description_field = [0u8; EXTRA_BYTES_DESCRIPTION_LEN];
    let text = &description.as_bytes()[..description.len().min(EXTRA_BYTES_DESCRIPTION_LEN)];
    description_field[..text.len()].copy_from_slice(text);
    descriptor.write_all(&description_field)?;

    Ok(descriptor)
}

fn descriptor_name(descriptor: &[u8]) -> String {
    let field = &descriptor[EXTRA_BYTES_NAME_OFFSET..EXTRA_BYTES_NAME_OFFSET + EXTRA_BYTES_NAME_LEN];
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Bytes per point taken by a descriptor; `None` for the deprecated array types.
fn descriptor_size(descriptor: &[u8]) -> Option<usize> {
    match descriptor[2] {
        // undocumented extra bytes keep their length in the options field
        0 => Some(descriptor[3] as usize),
        1 | 2 => Some(1),
        3 | 4 => Some(2),
        5 | 6 | 9 => Some(4),
        7 | 8 | 10 => Some(8),
        _ => None,
    }
}

/// Splits extra bytes descriptors into the ones to keep and the per-point byte
/// ranges of those named in `names`.
fn drop_descriptors(
    data: &[u8],
    names: &[&str],
) -> Result<(Vec<u8>, Vec<Range<usize>>), ExportError> {
    if data.len() % EXTRA_BYTES_DESCRIPTOR_LEN != 0 {
        return Err(ExportError::Format(format!(
            "extra bytes VLR of {} bytes is not a whole number of descriptors",
            data.len()
        )));
    }

    let mut kept = Vec::with_capacity(data.len());
    let mut ranges = Vec::new();
    let mut offset = Some(0usize);
    for descriptor in data.chunks(EXTRA_BYTES_DESCRIPTOR_LEN) {
        let name = descriptor_name(descriptor);
        let size = descriptor_size(descriptor);
        if names.contains(&name.as_str()) {
            let (start, size) = offset.zip(size).ok_or_else(|| {
                ExportError::Format(format!(
                    "cannot locate the bytes of existing extra dimension {:?}",
                    name
                ))
            })?;
            ranges.push(start..start + size);
        } else {
            kept.extend_from_slice(descriptor);
        }
        offset = offset.zip(size).map(|(start, size)| start + size);
    }
    Ok((kept, ranges))
}

fn strip_ranges(bytes: &[u8], ranges: &[Range<usize>]) -> Result<Vec<u8>, ExportError> {
    let mut kept = Vec::with_capacity(bytes.len());
    let mut position = 0;
    for range in ranges {
        if range.end > bytes.len() {
            return Err(ExportError::Format(format!(
                "point has {} extra bytes, expected at least {}",
                bytes.len(),
                range.end
            )));
        }
        kept.extend_from_slice(&bytes[position..range.start]);
        position = range.end;
    }
    kept.extend_from_slice(&bytes[position..]);
    Ok(kept)
}

fn to_las_point(
    cloud: &PointCloud,
    index: usize,
    point: &Point,
    format: &Format,
    replaced: &[Range<usize>],
) -> Result<las::Point, ExportError> {
    let attributes = &point.attributes;

    let mut extra_bytes = strip_ranges(&attributes.extra_bytes, replaced)?;
    for dimension in &cloud.extra_dimensions {
        extra_bytes.write_i32::<LittleEndian>(dimension.values[index])?;
    }

    let classification = Classification::new(attributes.classification.unwrap_or(0))?;
    let scan_direction = if attributes.flags.scan_left_to_right {
        ScanDirection::LeftToRight
    } else {
        ScanDirection::RightToLeft
    };

    Ok(las::Point {
        x: point.x,
        y: point.y,
        z: point.z,
        intensity: attributes.intensity.unwrap_or(0),
        return_number: attributes.return_number.unwrap_or(1),
        number_of_returns: attributes.number_of_returns.unwrap_or(1),
        scan_direction,
        is_edge_of_flight_line: attributes.flags.edge_of_flight_line,
        classification,
        is_synthetic: attributes.flags.synthetic,
        is_key_point: attributes.flags.key_point,
        is_withheld: attributes.flags.withheld,
        is_overlap: attributes.flags.overlap,
        scanner_channel: attributes.scanner_channel.unwrap_or(0),
        scan_angle: attributes.scan_angle.unwrap_or(0.0),
        user_data: attributes.user_data.unwrap_or(0),
        point_source_id: attributes.point_source_id.unwrap_or(0),
        gps_time: format
            .has_gps_time
            .then(|| attributes.gps_time.unwrap_or(0.0)),
        color: format
            .has_color
            .then(|| las::Color::new(point.color.r, point.color.g, point.color.b)),
        waveform: None,
        nir: format.has_nir.then(|| attributes.nir.unwrap_or(0)),
        extra_bytes,
    })
}
