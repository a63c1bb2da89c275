use std::collections::HashMap;
use std::sync::Arc;

use image::DynamicImage;

/// Bounding box in frame coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn full_frame(frame: &Frame) -> Self {
        Self {
            x: 0,
            y: 0,
            width: frame.image.width(),
            height: frame.image.height(),
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// One unit of work flowing through a pipeline: a captured image plus
/// provenance. The image is shared so chained stages can crop regions
/// without copying the full frame.
#[derive(Clone)]
pub struct Frame {
    pub image: Arc<DynamicImage>,
    /// Name of the input source the frame came from.
    pub source: String,
    /// Monotone per-source sequence number.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: DynamicImage, source: impl Into<String>, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            source: source.into(),
            sequence,
        }
    }
}

/// A single localized result from a detection-style task.
#[derive(Debug, Clone)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Landmark point in frame coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

/// Typed result emitted by one inference stage for one frame.
///
/// Detection-style outputs carry regions that downstream chained stages
/// consume (e.g. age/gender runs on the boxes face detection produced);
/// the other variants are leaf results.
#[derive(Debug, Clone)]
pub enum InferenceOutput {
    Detections(Vec<Detection>),
    /// Per-region string attributes, e.g. {"age": "34", "gender": "female"}.
    Attributes(Vec<HashMap<String, String>>),
    /// Per-region yaw/pitch/roll in degrees.
    HeadPose(Vec<[f32; 3]>),
    /// Per-region landmark sets.
    Landmarks(Vec<Vec<Landmark>>),
    /// Per-region embedding vectors for re-identification.
    Embeddings(Vec<Vec<f32>>),
    /// Per-region segmentation masks, row-major over the region.
    Masks(Vec<Vec<u8>>),
}

impl InferenceOutput {
    /// Regions this output offers to downstream stages. Empty for leaf
    /// result kinds.
    pub fn regions(&self) -> Vec<BoundingBox> {
        match self {
            InferenceOutput::Detections(dets) => dets.iter().map(|d| d.bbox.clone()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            InferenceOutput::Detections(v) => v.len(),
            InferenceOutput::Attributes(v) => v.len(),
            InferenceOutput::HeadPose(v) => v.len(),
            InferenceOutput::Landmarks(v) => v.len(),
            InferenceOutput::Embeddings(v) => v.len(),
            InferenceOutput::Masks(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything one pipeline pass produced for one frame, keyed by stage name.
/// This is what output sinks receive.
#[derive(Clone)]
pub struct FrameResults {
    pub frame: Frame,
    pub outputs: Vec<(String, InferenceOutput)>,
}

impl FrameResults {
    pub fn output_for(&self, stage: &str) -> Option<&InferenceOutput> {
        self.outputs
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, out)| out)
    }
}
