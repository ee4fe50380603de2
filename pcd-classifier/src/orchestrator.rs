use std::{fmt, path::Path, time::Instant};

use indicatif::{ProgressBar, ProgressStyle};
use pcd_core::pointcloud::point::PointCloud;
use pcd_raster::{
    compute_patch_size_pixels, BoundingBox, LabelBackProjector, LabelSummary, Raster,
    RasterError, RasterProjector, SENTINEL_COLOR,
};

use crate::{
    error::{ClassificationError, ModelError},
    model::{Detection, DetectionModel, SegmentationModel},
    store::{PointCloudStore, StoreError},
};

/// Name of the per-point label dimension added to the output cloud.
pub const TREE_LABELS_DIMENSION: &str = "tree_labels";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationParams {
    /// Raster cell size in meters.
    pub resolution: f64,
    /// Detector window side in meters.
    pub window_size: f64,
    /// Fraction of overlap between neighbouring detector windows, passed to the detector as is.
    pub patch_overlap: f64,
}

impl Default for ClassificationParams {
    fn default() -> Self {
        Self {
            resolution: 0.4,
            window_size: 60.0,
            patch_overlap: 0.25,
        }
    }
}

/// Pipeline states, in the order a run goes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    Projected,
    Detected,
    Segmented,
    BackProjected,
    Attached,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "load",
            Stage::Projected => "projection",
            Stage::Detected => "detection",
            Stage::Segmented => "segmentation",
            Stage::BackProjected => "back-projection",
            Stage::Attached => "attach",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Everything a run produced. Only `cloud` is needed to persist the result;
/// the rasters are kept for inspection.
#[derive(Debug, Clone)]
pub struct ClassificationOutput {
    pub cloud: PointCloud,
    pub raster: Raster,
    pub mask: Raster,
    pub detections: Vec<Detection>,
    pub summary: LabelSummary,
}

pub struct ClassificationOrchestrator {
    store: Box<dyn PointCloudStore>,
    detector: Box<dyn DetectionModel>,
    segmenter: Box<dyn SegmentationModel>,
}

impl ClassificationOrchestrator {
    pub fn new(
        store: Box<dyn PointCloudStore>,
        detector: Box<dyn DetectionModel>,
        segmenter: Box<dyn SegmentationModel>,
    ) -> Self {
        Self {
            store,
            detector,
            segmenter,
        }
    }

    /// Reads the cloud at `path` and classifies its tree points.
    pub fn classify(
        &mut self,
        path: &Path,
        params: &ClassificationParams,
    ) -> Result<ClassificationOutput, ClassificationError> {
        log::info!("loading {}", path.display());
        let start = Instant::now();
        let cloud = self
            .store
            .read(path)
            .map_err(|e| ClassificationError::new(Stage::Loaded, e))?;
        log::info!("loaded {} points in {:?}", cloud.len(), start.elapsed());

        self.classify_cloud(&cloud, params)
    }

    /// Runs every stage after loading. `cloud` is not modified; the result
    /// carries a copy with the `tree_labels` dimension.
    pub fn classify_cloud(
        &mut self,
        cloud: &PointCloud,
        params: &ClassificationParams,
    ) -> Result<ClassificationOutput, ClassificationError> {
        let raster = self.project(cloud, params)?;
        let detections = self.detect(cloud, &raster, params)?;
        let mask = self.segment(&raster, &detections)?;

        let start = Instant::now();
        let labels = LabelBackProjector::new(params.resolution)
            .and_then(|projector| projector.back_project(cloud, &mask))
            .map_err(|e| ClassificationError::new(Stage::BackProjected, e))?;
        let summary = LabelSummary::from_labels(&labels);
        log::info!(
            "labelled {} tree, {} background and {} off-raster points in {:?}",
            summary.tree,
            summary.background,
            summary.off_raster,
            start.elapsed()
        );

        let labelled = cloud
            .with_extra_dimension(TREE_LABELS_DIMENSION, labels)
            .map_err(|e| ClassificationError::new(Stage::Attached, e))?;

        log::info!("classification {}", Stage::Done);
        Ok(ClassificationOutput {
            cloud: labelled,
            raster,
            mask,
            detections,
            summary,
        })
    }

    pub fn save(&self, cloud: &PointCloud, path: &Path) -> Result<(), StoreError> {
        self.store.write(cloud, path)
    }

    fn project(
        &mut self,
        cloud: &PointCloud,
        params: &ClassificationParams,
    ) -> Result<Raster, ClassificationError> {
        let at = |e: RasterError| ClassificationError::new(Stage::Projected, e);

        log::info!("projecting into 2D image at {} m/pixel", params.resolution);
        let start = Instant::now();
        let raster = RasterProjector::new(params.resolution)
            .and_then(|projector| projector.project(cloud))
            .map_err(at)?;
        log::info!(
            "projected onto {}x{} pixels in {:?}",
            raster.width(),
            raster.height(),
            start.elapsed()
        );

        self.detector
            .set_working_image(&raster)
            .map_err(|e| ClassificationError::new(Stage::Projected, e))?;
        Ok(raster)
    }

    fn detect(
        &mut self,
        cloud: &PointCloud,
        raster: &Raster,
        params: &ClassificationParams,
    ) -> Result<Vec<Detection>, ClassificationError> {
        let at = |e: RasterError| ClassificationError::new(Stage::Detected, e);

        let bbox = BoundingBox::from_points(&cloud.points).map_err(at)?;
        let patch_size =
            compute_patch_size_pixels(&bbox, params.resolution, params.window_size).map_err(at)?;
        log::info!(
            "detecting trees with {} px patches ({} m window, {} overlap)",
            patch_size,
            params.window_size,
            params.patch_overlap
        );

        let start = Instant::now();
        let detections = self
            .detector
            .predict_tile(raster, patch_size, params.patch_overlap)
            .map_err(|e| ClassificationError::new(Stage::Detected, e))?;
        log::info!(
            "{} detections in {:?}",
            detections.len(),
            start.elapsed()
        );
        Ok(detections)
    }

    /// Paints every detection's mask into a fresh composite; later detections
    /// overwrite earlier ones.
    fn segment(
        &mut self,
        raster: &Raster,
        detections: &[Detection],
    ) -> Result<Raster, ClassificationError> {
        let at = |e: ModelError| ClassificationError::new(Stage::Segmented, e);

        log::info!("segmenting {} detections", detections.len());
        let start = Instant::now();
        self.segmenter.set_image(raster).map_err(at)?;

        let mut composite = Raster::new(raster.width(), raster.height());
        let progress = progress_bar(detections.len() as u64);
        for detection in detections {
            let mask = self.segmenter.predict(detection).map_err(at)?;
            if mask.dimensions() != raster.dimensions() {
                return Err(at(ModelError::Output(format!(
                    "mask is {:?} pixels, raster is {:?}",
                    mask.dimensions(),
                    raster.dimensions()
                ))));
            }
            for (x, y) in mask.members() {
                composite.put_pixel(x, y, SENTINEL_COLOR);
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        log::info!("segmented in {:?}", start.elapsed());
        Ok(composite)
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{bar:40.green/blue}] {pos}/{len} masks ({percent}%)")
    {
        pb.set_style(style.progress_chars("▉▊▋▌▍▎▏ "));
    }
    pb
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap, path::PathBuf, rc::Rc};

    use image::Rgb;
    use pcd_core::pointcloud::point::{Color, Point};
    use pcd_parser::ParseError;

    use super::*;
    use crate::{error::StageError, model::SegmentMask};

    #[derive(Default)]
    struct MemoryStore {
        clouds: HashMap<PathBuf, PointCloud>,
        written: Rc<RefCell<Vec<(PathBuf, PointCloud)>>>,
    }

    impl PointCloudStore for MemoryStore {
        fn read(&self, path: &Path) -> Result<PointCloud, StoreError> {
            self.clouds
                .get(path)
                .cloned()
                .ok_or_else(|| StoreError::Read(ParseError::FileNotFound(path.to_path_buf())))
        }

        fn write(&self, cloud: &PointCloud, path: &Path) -> Result<(), StoreError> {
            self.written
                .borrow_mut()
                .push((path.to_path_buf(), cloud.clone()));
            Ok(())
        }
    }

    #[derive(Default, Clone)]
    struct Calls {
        working_images: Vec<(u32, u32)>,
        tiles: Vec<(u32, f64)>,
        prompts: Vec<Detection>,
    }

    struct FixedDetector {
        boxes: Vec<Detection>,
        calls: Rc<RefCell<Calls>>,
    }

    impl DetectionModel for FixedDetector {
        fn set_working_image(&mut self, raster: &Raster) -> Result<(), ModelError> {
            self.calls.borrow_mut().working_images.push(raster.dimensions());
            Ok(())
        }

        fn predict_tile(
            &mut self,
            _raster: &Raster,
            patch_size: u32,
            patch_overlap: f64,
        ) -> Result<Vec<Detection>, ModelError> {
            self.calls.borrow_mut().tiles.push((patch_size, patch_overlap));
            Ok(self.boxes.clone())
        }
    }

    /// Fills the whole box, or fails when `fail` is set.
    struct BoxSegmenter {
        size: (u32, u32),
        calls: Rc<RefCell<Calls>>,
        fail: bool,
    }

    impl SegmentationModel for BoxSegmenter {
        fn set_image(&mut self, raster: &Raster) -> Result<(), ModelError> {
            self.size = raster.dimensions();
            Ok(())
        }

        fn predict(&mut self, detection: &Detection) -> Result<SegmentMask, ModelError> {
            if self.fail {
                return Err(ModelError::Output("segmenter exploded".to_string()));
            }
            self.calls.borrow_mut().prompts.push(detection.clone());
            let mut mask = SegmentMask::new(self.size.0, self.size.1);
            for y in detection.ymin as u32..=detection.ymax as u32 {
                for x in detection.xmin as u32..=detection.xmax as u32 {
                    mask.insert(x, y);
                }
            }
            Ok(mask)
        }
    }

    fn point(x: f64, y: f64) -> Point {
        Point::new(x, y, 1.0, Color { r: 40, g: 90, b: 30 })
    }

    /// Corners of a 2 x 2 m square plus its center.
    fn square_cloud() -> PointCloud {
        PointCloud::new(vec![
            point(0.0, 0.0),
            point(2.0, 0.0),
            point(0.0, 2.0),
            point(2.0, 2.0),
            point(1.0, 1.0),
        ])
    }

    fn params() -> ClassificationParams {
        ClassificationParams {
            resolution: 1.0,
            window_size: 2.5,
            patch_overlap: 0.25,
        }
    }

    fn orchestrator(
        store: MemoryStore,
        boxes: Vec<Detection>,
        fail_segmentation: bool,
    ) -> (ClassificationOrchestrator, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let orchestrator = ClassificationOrchestrator::new(
            Box::new(store),
            Box::new(FixedDetector {
                boxes,
                calls: calls.clone(),
            }),
            Box::new(BoxSegmenter {
                size: (0, 0),
                calls: calls.clone(),
                fail: fail_segmentation,
            }),
        );
        (orchestrator, calls)
    }

    #[test]
    fn center_detection_labels_only_the_center_point() {
        let (mut orchestrator, calls) = orchestrator(
            MemoryStore::default(),
            vec![Detection::new(1.0, 1.0, 1.0, 1.0)],
            false,
        );
        let output = orchestrator.classify_cloud(&square_cloud(), &params()).unwrap();

        let labels = output.cloud.extra_dimension(TREE_LABELS_DIMENSION).unwrap();
        assert_eq!(labels.values, vec![0, 0, 0, 0, 1]);
        assert_eq!(output.raster.dimensions(), (3, 3));
        assert_eq!(output.mask.get_pixel(1, 1), &SENTINEL_COLOR);
        assert_eq!(output.mask.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(
            output.summary,
            LabelSummary {
                tree: 1,
                background: 4,
                off_raster: 0
            }
        );

        let calls = calls.borrow();
        assert_eq!(calls.working_images, vec![(3, 3)]);
        // 2 m over 3 pixels -> 0.667 m/pixel -> a 2.5 m window is 3.75 pixels
        assert_eq!(calls.tiles, vec![(3, 0.25)]);
    }

    #[test]
    fn detections_are_segmented_in_detector_order() {
        let boxes = vec![
            Detection::new(0.0, 0.0, 0.0, 0.0),
            Detection::new(2.0, 2.0, 2.0, 2.0),
            Detection::new(0.0, 2.0, 0.0, 2.0),
        ];
        let (mut orchestrator, calls) =
            orchestrator(MemoryStore::default(), boxes.clone(), false);
        let output = orchestrator.classify_cloud(&square_cloud(), &params()).unwrap();

        assert_eq!(calls.borrow().prompts, boxes);
        // pixel rows run from max y down
        assert_eq!(
            output.cloud.extra_dimension(TREE_LABELS_DIMENSION).unwrap().values,
            vec![1, 1, 1, 0, 0]
        );
    }

    #[test]
    fn no_detections_means_all_background() {
        let (mut orchestrator, _) = orchestrator(MemoryStore::default(), Vec::new(), false);
        let output = orchestrator.classify_cloud(&square_cloud(), &params()).unwrap();

        assert_eq!(
            output.cloud.extra_dimension(TREE_LABELS_DIMENSION).unwrap().values,
            vec![0; 5]
        );
    }

    #[test]
    fn input_cloud_is_not_modified() {
        let cloud = square_cloud();
        let (mut orchestrator, _) = orchestrator(
            MemoryStore::default(),
            vec![Detection::new(0.0, 0.0, 2.0, 2.0)],
            false,
        );
        let output = orchestrator.classify_cloud(&cloud, &params()).unwrap();

        assert!(cloud.extra_dimensions.is_empty());
        assert_eq!(output.cloud.points, cloud.points);
        assert_eq!(output.cloud.len(), cloud.len());
    }

    #[test]
    fn classify_reads_through_the_store() {
        let path = PathBuf::from("plot.las");
        let mut store = MemoryStore::default();
        store.clouds.insert(path.clone(), square_cloud());
        let written = store.written.clone();

        let (mut orchestrator, _) = orchestrator(store, Vec::new(), false);
        let output = orchestrator.classify(&path, &params()).unwrap();
        orchestrator
            .save(&output.cloud, Path::new("tree_cloud.las"))
            .unwrap();

        let written = written.borrow();
        assert_eq!(written.len(), 1);
        assert!(written[0]
            .1
            .extra_dimension(TREE_LABELS_DIMENSION)
            .is_some());
    }

    #[test]
    fn missing_input_fails_in_load_stage() {
        let (mut orchestrator, _) = orchestrator(MemoryStore::default(), Vec::new(), false);
        let err = orchestrator
            .classify(Path::new("missing.las"), &params())
            .unwrap_err();

        assert_eq!(err.stage, Stage::Loaded);
        assert!(matches!(
            err.source,
            StageError::Store(StoreError::Read(ParseError::FileNotFound(_)))
        ));
        assert!(err.to_string().starts_with("load stage failed"));
    }

    #[test]
    fn bad_resolution_fails_in_projection_stage() {
        let (mut orchestrator, calls) = orchestrator(MemoryStore::default(), Vec::new(), false);
        let params = ClassificationParams {
            resolution: 0.0,
            ..params()
        };
        let err = orchestrator.classify_cloud(&square_cloud(), &params).unwrap_err();

        assert_eq!(err.stage, Stage::Projected);
        assert!(calls.borrow().working_images.is_empty());
    }

    #[test]
    fn shared_x_fails_in_detection_stage() {
        let cloud = PointCloud::new(vec![point(5.0, 0.0), point(5.0, 3.0)]);
        let (mut orchestrator, calls) = orchestrator(MemoryStore::default(), Vec::new(), false);
        let err = orchestrator.classify_cloud(&cloud, &params()).unwrap_err();

        assert_eq!(err.stage, Stage::Detected);
        assert!(matches!(
            err.source,
            StageError::Raster(pcd_raster::RasterError::DegenerateExtent(_))
        ));
        assert!(calls.borrow().tiles.is_empty());
    }

    #[test]
    fn segmenter_failure_aborts_the_run() {
        let (mut orchestrator, _) = orchestrator(
            MemoryStore::default(),
            vec![Detection::new(0.0, 0.0, 1.0, 1.0)],
            true,
        );
        let err = orchestrator.classify_cloud(&square_cloud(), &params()).unwrap_err();

        assert_eq!(err.stage, Stage::Segmented);
        assert!(matches!(err.source, StageError::Model(_)));
    }

    #[test]
    fn mask_of_wrong_size_is_rejected() {
        struct TinySegmenter;
        impl SegmentationModel for TinySegmenter {
            fn set_image(&mut self, _raster: &Raster) -> Result<(), ModelError> {
                Ok(())
            }
            fn predict(&mut self, _detection: &Detection) -> Result<SegmentMask, ModelError> {
                Ok(SegmentMask::new(1, 1))
            }
        }

        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut orchestrator = ClassificationOrchestrator::new(
            Box::new(MemoryStore::default()),
            Box::new(FixedDetector {
                boxes: vec![Detection::new(0.0, 0.0, 1.0, 1.0)],
                calls,
            }),
            Box::new(TinySegmenter),
        );
        let err = orchestrator.classify_cloud(&square_cloud(), &params()).unwrap_err();
        assert_eq!(err.stage, Stage::Segmented);
    }
}
