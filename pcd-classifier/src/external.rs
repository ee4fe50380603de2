//! Detection and segmentation backends running as external programs.
//!
//! The raster is handed over as a PNG in a private temporary directory.
//! Detectors print boxes as CSV on stdout with at least the columns
//! `xmin,ymin,xmax,ymax`; segmenters write a grayscale PNG mask where any
//! non-zero pixel belongs to the segment.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use pcd_raster::Raster;
use tempfile::TempDir;

use crate::{
    error::ModelError,
    model::{Detection, DetectionModel, SegmentMask, SegmentationModel},
};

const RASTER_FILE_NAME: &str = "raster.png";

struct Workspace {
    dir: TempDir,
    image_path: Option<PathBuf>,
}

impl Workspace {
    fn new() -> Result<Self, ModelError> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            image_path: None,
        })
    }

    fn store_image(&mut self, raster: &Raster) -> Result<PathBuf, ModelError> {
        let path = self.dir.path().join(RASTER_FILE_NAME);
        raster.save(&path)?;
        self.image_path = Some(path.clone());
        Ok(path)
    }

    fn image_or_store(&mut self, raster: &Raster) -> Result<PathBuf, ModelError> {
        match &self.image_path {
            Some(path) => Ok(path.clone()),
            None => self.store_image(raster),
        }
    }
}

fn run(program: &str, args: &[String]) -> Result<Vec<u8>, ModelError> {
    log::debug!("running {} {:?}", program, args);
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ModelError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ModelError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    workspace: Workspace,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, ModelError> {
        Ok(Self {
            program: program.into(),
            args,
            workspace: Workspace::new()?,
        })
    }
}

impl DetectionModel for CommandDetector {
    fn set_working_image(&mut self, raster: &Raster) -> Result<(), ModelError> {
        self.workspace.store_image(raster)?;
        Ok(())
    }

    fn predict_tile(
        &mut self,
        raster: &Raster,
        patch_size: u32,
        patch_overlap: f64,
    ) -> Result<Vec<Detection>, ModelError> {
        let image = self.workspace.image_or_store(raster)?;

        let mut args = self.args.clone();
        args.extend([
            "--image".to_string(),
            path_arg(&image),
            "--patch-size".to_string(),
            patch_size.to_string(),
            "--patch-overlap".to_string(),
            patch_overlap.to_string(),
        ]);

        let stdout = run(&self.program, &args)?;
        parse_detections(&stdout)
    }
}

/// Parses detector CSV output. Columns other than the box corners, `score` and
/// `label` are ignored.
pub fn parse_detections(csv_bytes: &[u8]) -> Result<Vec<Detection>, ModelError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(csv_bytes);

    let mut detections = Vec::new();
    for record in reader.deserialize::<Detection>() {
        let detection = record?;
        if !detection.is_valid() {
            return Err(ModelError::Output(format!(
                "invalid detection box {:?}",
                detection
            )));
        }
        detections.push(detection);
    }
    Ok(detections)
}

pub struct CommandSegmenter {
    program: String,
    args: Vec<String>,
    workspace: Workspace,
    predictions: usize,
}

impl CommandSegmenter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, ModelError> {
        Ok(Self {
            program: program.into(),
            args,
            workspace: Workspace::new()?,
            predictions: 0,
        })
    }
}

impl SegmentationModel for CommandSegmenter {
    fn set_image(&mut self, raster: &Raster) -> Result<(), ModelError> {
        self.workspace.store_image(raster)?;
        Ok(())
    }

    fn predict(&mut self, detection: &Detection) -> Result<SegmentMask, ModelError> {
        let image = self
            .workspace
            .image_path
            .clone()
            .ok_or_else(|| ModelError::Output("segmenter has no image set".to_string()))?;

        self.predictions += 1;
        let mask_path = self
            .workspace
            .dir
            .path()
            .join(format!("mask_{}.png", self.predictions));

        let mut args = self.args.clone();
        args.extend([
            "--image".to_string(),
            path_arg(&image),
            "--box".to_string(),
            format!(
                "{},{},{},{}",
                detection.xmin, detection.ymin, detection.xmax, detection.ymax
            ),
            "--output".to_string(),
            path_arg(&mask_path),
        ]);
        run(&self.program, &args)?;

        let mask = image::open(&mask_path)?.to_luma8();
        if let Err(e) = std::fs::remove_file(&mask_path) {
            log::debug!("could not remove {}: {}", mask_path.display(), e);
        }
        Ok(SegmentMask::from_luma(&mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boxes_and_ignores_extra_columns() {
        let output = b",xmin,ymin,xmax,ymax,label,score,image_path\n\
            0,1.5,2,10,12.5,Tree,0.87,raster.png\n\
            1,20,22,30,35,Tree,0.42,raster.png\n";
        let detections = parse_detections(output).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].xmin, 1.5);
        assert_eq!(detections[0].ymax, 12.5);
        assert_eq!(detections[0].score, Some(0.87));
        assert_eq!(detections[1].label.as_deref(), Some("Tree"));
    }

    #[test]
    fn minimal_columns_are_enough() {
        let detections = parse_detections(b"xmin,ymin,xmax,ymax\n0,0,4,4\n").unwrap();
        assert_eq!(detections, vec![Detection::new(0.0, 0.0, 4.0, 4.0)]);
    }

    #[test]
    fn empty_output_means_no_detections() {
        assert!(parse_detections(b"").unwrap().is_empty());
        assert!(parse_detections(b"xmin,ymin,xmax,ymax\n").unwrap().is_empty());
    }

    #[test]
    fn malformed_output_is_a_model_error() {
        assert!(matches!(
            parse_detections(b"xmin,ymin,xmax,ymax\n0,zero,4,4\n"),
            Err(ModelError::Csv(_))
        ));
        assert!(matches!(
            parse_detections(b"xmin,ymin,xmax,ymax\n9,0,4,4\n"),
            Err(ModelError::Output(_))
        ));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let mut detector =
            CommandDetector::new("/nonexistent/forest-detector", Vec::new()).unwrap();
        let raster = Raster::new(2, 2);
        assert!(matches!(
            detector.predict_tile(&raster, 150, 0.25),
            Err(ModelError::Spawn { .. })
        ));
    }

    #[test]
    fn segmenter_needs_an_image() {
        let mut segmenter = CommandSegmenter::new("true", Vec::new()).unwrap();
        assert!(matches!(
            segmenter.predict(&Detection::new(0.0, 0.0, 1.0, 1.0)),
            Err(ModelError::Output(_))
        ));
    }
}
