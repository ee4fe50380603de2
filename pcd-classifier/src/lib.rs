pub mod error;
pub mod external;
pub mod model;
pub mod orchestrator;
pub mod store;

pub use error::{ClassificationError, ModelError, StageError};
pub use model::{Detection, DetectionModel, SegmentMask, SegmentationModel};
pub use orchestrator::{
    ClassificationOrchestrator, ClassificationOutput, ClassificationParams, Stage,
    TREE_LABELS_DIMENSION,
};
pub use store::{FilePointCloudStore, PointCloudStore, StoreError};
