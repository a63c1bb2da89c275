//! Concrete adapter implementations, one per result family.
//!
//! All adapters delegate execution to a shared [`InferenceEngine`] handle and
//! do the task-specific work around it: batching regions, filtering by
//! confidence, and rejecting malformed backend output.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::engine::InferenceEngine;
use crate::models::{BoundingBox, Frame, InferenceOutput};

use super::{InferenceAdapter, TaskKind};

/// Run the engine over `regions` in `batch_size` chunks and merge the
/// outputs. An empty region set is a single whole-frame request.
fn infer_batched(
    engine: &Arc<dyn InferenceEngine>,
    frame: &Frame,
    regions: &[BoundingBox],
    batch_size: usize,
) -> Result<InferenceOutput> {
    if regions.is_empty() {
        return engine.infer(frame, &[]);
    }

    let mut chunks = regions.chunks(batch_size.max(1));
    let mut merged = match chunks.next() {
        Some(chunk) => engine.infer(frame, chunk)?,
        None => return engine.infer(frame, &[]),
    };
    for chunk in chunks {
        merged = merge(merged, engine.infer(frame, chunk)?)?;
    }
    Ok(merged)
}

fn merge(a: InferenceOutput, b: InferenceOutput) -> Result<InferenceOutput> {
    use InferenceOutput::*;
    Ok(match (a, b) {
        (Detections(mut x), Detections(y)) => Detections({
            x.extend(y);
            x
        }),
        (Attributes(mut x), Attributes(y)) => Attributes({
            x.extend(y);
            x
        }),
        (HeadPose(mut x), HeadPose(y)) => HeadPose({
            x.extend(y);
            x
        }),
        (Landmarks(mut x), Landmarks(y)) => Landmarks({
            x.extend(y);
            x
        }),
        (Embeddings(mut x), Embeddings(y)) => Embeddings({
            x.extend(y);
            x
        }),
        (Masks(mut x), Masks(y)) => Masks({
            x.extend(y);
            x
        }),
        _ => bail!("engine returned mixed output kinds across batches"),
    })
}

/// Localization tasks: face, object, and license-plate detection.
pub struct DetectionAdapter {
    name: String,
    task: TaskKind,
    engine: Arc<dyn InferenceEngine>,
    batch_size: usize,
    confidence_threshold: f32,
}

impl DetectionAdapter {
    pub fn new(
        name: String,
        task: TaskKind,
        engine: Arc<dyn InferenceEngine>,
        batch_size: usize,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            name,
            task,
            engine,
            batch_size,
            confidence_threshold,
        }
    }
}

impl InferenceAdapter for DetectionAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn task(&self) -> TaskKind {
        self.task
    }

    fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> Result<InferenceOutput> {
        match infer_batched(&self.engine, frame, regions, self.batch_size)? {
            InferenceOutput::Detections(dets) => Ok(InferenceOutput::Detections(
                dets.into_iter()
                    .filter(|d| d.confidence >= self.confidence_threshold)
                    .collect(),
            )),
            _ => bail!("engine for {:?} did not return detections", self.task.tag()),
        }
    }
}

/// Classification tasks that attach string attributes to regions: age/gender,
/// emotion, person attributes, vehicle attributes.
pub struct AttributesAdapter {
    name: String,
    task: TaskKind,
    engine: Arc<dyn InferenceEngine>,
    batch_size: usize,
}

impl AttributesAdapter {
    pub fn new(
        name: String,
        task: TaskKind,
        engine: Arc<dyn InferenceEngine>,
        batch_size: usize,
    ) -> Self {
        Self {
            name,
            task,
            engine,
            batch_size,
        }
    }
}

impl InferenceAdapter for AttributesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn task(&self) -> TaskKind {
        self.task
    }

    fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> Result<InferenceOutput> {
        match infer_batched(&self.engine, frame, regions, self.batch_size)? {
            out @ InferenceOutput::Attributes(_) => Ok(out),
            _ => bail!("engine for {:?} did not return attributes", self.task.tag()),
        }
    }
}

pub struct HeadPoseAdapter {
    name: String,
    engine: Arc<dyn InferenceEngine>,
    batch_size: usize,
}

impl HeadPoseAdapter {
    pub fn new(name: String, engine: Arc<dyn InferenceEngine>, batch_size: usize) -> Self {
        Self {
            name,
            engine,
            batch_size,
        }
    }
}

impl InferenceAdapter for HeadPoseAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn task(&self) -> TaskKind {
        TaskKind::HeadPoseEstimation
    }

    fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> Result<InferenceOutput> {
        match infer_batched(&self.engine, frame, regions, self.batch_size)? {
            out @ InferenceOutput::HeadPose(_) => Ok(out),
            _ => bail!("engine for HeadPoseEstimation did not return pose angles"),
        }
    }
}

pub struct SegmentationAdapter {
    name: String,
    engine: Arc<dyn InferenceEngine>,
}

impl SegmentationAdapter {
    pub fn new(name: String, engine: Arc<dyn InferenceEngine>) -> Self {
        Self { name, engine }
    }
}

impl InferenceAdapter for SegmentationAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn task(&self) -> TaskKind {
        TaskKind::ObjectSegmentation
    }

    fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> Result<InferenceOutput> {
        // Segmentation always covers the whole frame; upstream regions are
        // passed through so the backend can mask within them.
        match self.engine.infer(frame, regions)? {
            out @ InferenceOutput::Masks(_) => Ok(out),
            _ => bail!("engine for ObjectSegmentation did not return masks"),
        }
    }
}

/// Person and face re-identification: embeddings per region.
pub struct ReidentificationAdapter {
    name: String,
    task: TaskKind,
    engine: Arc<dyn InferenceEngine>,
    batch_size: usize,
}

impl ReidentificationAdapter {
    pub fn new(
        name: String,
        task: TaskKind,
        engine: Arc<dyn InferenceEngine>,
        batch_size: usize,
    ) -> Self {
        Self {
            name,
            task,
            engine,
            batch_size,
        }
    }
}

impl InferenceAdapter for ReidentificationAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn task(&self) -> TaskKind {
        self.task
    }

    fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> Result<InferenceOutput> {
        match infer_batched(&self.engine, frame, regions, self.batch_size)? {
            out @ InferenceOutput::Embeddings(_) => Ok(out),
            _ => bail!("engine for {:?} did not return embeddings", self.task.tag()),
        }
    }
}

pub struct LandmarksAdapter {
    name: String,
    engine: Arc<dyn InferenceEngine>,
    batch_size: usize,
}

impl LandmarksAdapter {
    pub fn new(name: String, engine: Arc<dyn InferenceEngine>, batch_size: usize) -> Self {
        Self {
            name,
            engine,
            batch_size,
        }
    }
}

impl InferenceAdapter for LandmarksAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn task(&self) -> TaskKind {
        TaskKind::LandmarksDetection
    }

    fn process(&self, frame: &Frame, regions: &[BoundingBox]) -> Result<InferenceOutput> {
        match infer_batched(&self.engine, frame, regions, self.batch_size)? {
            out @ InferenceOutput::Landmarks(_) => Ok(out),
            _ => bail!("engine for LandmarksDetection did not return landmarks"),
        }
    }
}
