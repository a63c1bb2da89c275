pub mod adapters;
pub mod factory;

use crate::models::{BoundingBox, Frame, InferenceOutput};

pub use adapters::{
    AttributesAdapter, DetectionAdapter, HeadPoseAdapter, LandmarksAdapter,
    ReidentificationAdapter, SegmentationAdapter,
};
pub use factory::AdapterFactory;

/// Every inference task the factory knows how to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    FaceDetection,
    AgeGenderRecognition,
    EmotionRecognition,
    HeadPoseEstimation,
    ObjectDetection,
    ObjectSegmentation,
    PersonReidentification,
    FaceReidentification,
    PersonAttribsDetection,
    VehicleAttribsDetection,
    LicensePlateDetection,
    LandmarksDetection,
}

impl TaskKind {
    pub const ALL: [TaskKind; 12] = [
        TaskKind::FaceDetection,
        TaskKind::AgeGenderRecognition,
        TaskKind::EmotionRecognition,
        TaskKind::HeadPoseEstimation,
        TaskKind::ObjectDetection,
        TaskKind::ObjectSegmentation,
        TaskKind::PersonReidentification,
        TaskKind::FaceReidentification,
        TaskKind::PersonAttribsDetection,
        TaskKind::VehicleAttribsDetection,
        TaskKind::LicensePlateDetection,
        TaskKind::LandmarksDetection,
    ];

    /// The tag used in configuration records.
    pub fn tag(self) -> &'static str {
        match self {
            TaskKind::FaceDetection => "FaceDetection",
            TaskKind::AgeGenderRecognition => "AgeGenderRecognition",
            TaskKind::EmotionRecognition => "EmotionRecognition",
            TaskKind::HeadPoseEstimation => "HeadPoseEstimation",
            TaskKind::ObjectDetection => "ObjectDetection",
            TaskKind::ObjectSegmentation => "ObjectSegmentation",
            TaskKind::PersonReidentification => "PersonReidentification",
            TaskKind::FaceReidentification => "FaceReidentification",
            TaskKind::PersonAttribsDetection => "PersonAttribsDetection",
            TaskKind::VehicleAttribsDetection => "VehicleAttribsDetection",
            TaskKind::LicensePlateDetection => "LicensePlateDetection",
            TaskKind::LandmarksDetection => "LandmarksDetection",
        }
    }

    /// Tasks that localize things in the frame and therefore feed regions to
    /// chained downstream stages.
    pub fn produces_regions(self) -> bool {
        matches!(
            self,
            TaskKind::FaceDetection | TaskKind::ObjectDetection | TaskKind::LicensePlateDetection
        )
    }

    /// The empty output of this task's result family. Emitted when a chained
    /// stage has no upstream regions to run on.
    pub fn empty_output(self) -> InferenceOutput {
        match self {
            TaskKind::FaceDetection | TaskKind::ObjectDetection | TaskKind::LicensePlateDetection => {
                InferenceOutput::Detections(Vec::new())
            }
            TaskKind::AgeGenderRecognition
            | TaskKind::EmotionRecognition
            | TaskKind::PersonAttribsDetection
            | TaskKind::VehicleAttribsDetection => InferenceOutput::Attributes(Vec::new()),
            TaskKind::HeadPoseEstimation => InferenceOutput::HeadPose(Vec::new()),
            TaskKind::ObjectSegmentation => InferenceOutput::Masks(Vec::new()),
            TaskKind::PersonReidentification | TaskKind::FaceReidentification => {
                InferenceOutput::Embeddings(Vec::new())
            }
            TaskKind::LandmarksDetection => InferenceOutput::Landmarks(Vec::new()),
        }
    }
}

/// One wired inference stage of a pipeline.
///
/// `process` receives the frame plus the regions selected by upstream stages
/// (empty slice = whole frame) and returns the stage's typed output.
pub trait InferenceAdapter: Send + Sync {
    /// Stage name from the configuration, used in logs and results.
    fn name(&self) -> &str;

    fn task(&self) -> TaskKind;

    fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> anyhow::Result<InferenceOutput>;
}

impl std::fmt::Debug for dyn InferenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceAdapter")
            .field("name", &self.name())
            .field("task", &self.task())
            .finish()
    }
}
