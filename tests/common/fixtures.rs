//! Shared fixtures: a mock engine backend, config builders, and a registry
//! wired with a collecting sink.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use visionflow::engine::InferenceEngine;
use visionflow::{
    AdapterFactory, BoundingBox, ChannelSink, Detection, EngineProvider, Frame, FrameResults,
    InferConfig, InferenceOutput, InputConfig, IoFactory, OutputConfig, PipelineConfig,
    PipelineRegistry,
};

/// Backend stand-in. The model name's prefix selects the result family, so
/// one loader serves every task: `det:*` yields detections, `attr:*`
/// attributes, `pose:*` head poses, `reid:*` embeddings, `marks:*`
/// landmarks, `seg:*` masks, and `fail:*` errors on every inference call.
pub struct MockEngine {
    model: String,
}

impl InferenceEngine for MockEngine {
    fn infer(&self, frame: &Frame, regions: &[BoundingBox]) -> anyhow::Result<InferenceOutput> {
        if self.model.starts_with("fail:") {
            anyhow::bail!("mock engine failure for {}", self.model);
        }
        let count = regions.len().max(1);
        let out = if self.model.starts_with("attr:") {
            InferenceOutput::Attributes(
                (0..count)
                    .map(|_| {
                        let mut attrs = HashMap::new();
                        attrs.insert("age".to_string(), "34".to_string());
                        attrs
                    })
                    .collect(),
            )
        } else if self.model.starts_with("pose:") {
            InferenceOutput::HeadPose(vec![[0.0, 0.0, 0.0]; count])
        } else if self.model.starts_with("reid:") {
            InferenceOutput::Embeddings(vec![vec![0.5; 16]; count])
        } else if self.model.starts_with("marks:") {
            InferenceOutput::Landmarks(vec![Vec::new(); count])
        } else if self.model.starts_with("seg:") {
            InferenceOutput::Masks(vec![Vec::new(); count])
        } else {
            InferenceOutput::Detections(
                (0..count)
                    .map(|i| Detection {
                        label: "object".to_string(),
                        confidence: 0.9,
                        bbox: BoundingBox {
                            x: i as u32 * 10,
                            y: 0,
                            width: frame.image.width() / 4,
                            height: frame.image.height() / 4,
                        },
                    })
                    .collect(),
            )
        };
        Ok(out)
    }
}

/// Engine provider backed by [`MockEngine`]. The device "BROKEN" refuses to
/// initialize, for exercising engine-init failures.
pub fn mock_engines() -> EngineProvider {
    EngineProvider::new(Box::new(|key| {
        if key.device == "BROKEN" {
            anyhow::bail!("no such device");
        }
        Ok(Arc::new(MockEngine {
            model: key.model.clone(),
        }) as Arc<dyn InferenceEngine>)
    }))
}

pub fn mock_registry() -> PipelineRegistry {
    PipelineRegistry::new(
        AdapterFactory::with_builtin_tasks(),
        IoFactory::with_builtins(),
        mock_engines(),
    )
}

/// Registry whose "collect" sink kind forwards every delivery to the
/// returned receiver.
pub fn registry_with_collector() -> (PipelineRegistry, Receiver<FrameResults>) {
    let (sender, receiver) = mpsc::channel();
    let mut io = IoFactory::with_builtins();
    io.register_sink(
        "collect",
        Box::new(move |config| Ok(Box::new(ChannelSink::new(&config.name, sender.clone())) as _)),
    );
    let registry = PipelineRegistry::new(AdapterFactory::with_builtin_tasks(), io, mock_engines());
    (registry, receiver)
}

pub fn synthetic_input(name: &str, frames: u64) -> InputConfig {
    let mut params = serde_json::Map::new();
    params.insert("frames".into(), frames.into());
    params.insert("interval_ms".into(), 1u64.into());
    params.insert("width".into(), 64u64.into());
    params.insert("height".into(), 64u64.into());
    InputConfig {
        name: name.to_string(),
        kind: "synthetic".to_string(),
        params,
    }
}

pub fn log_output(name: &str) -> OutputConfig {
    OutputConfig {
        name: name.to_string(),
        kind: "log".to_string(),
        params: Default::default(),
    }
}

pub fn infer_stage(name: &str, task: &str, model: &str, inputs: &[&str]) -> InferConfig {
    InferConfig {
        name: name.to_string(),
        task: task.to_string(),
        model: model.to_string(),
        device: "CPU".to_string(),
        batch_size: None,
        confidence_threshold: None,
        inputs: inputs.iter().map(|s| s.to_string()).collect(),
    }
}

/// A face-detection pipeline over a bounded synthetic source. `frames` of 0
/// means unbounded.
pub fn face_pipeline(name: &str, frames: u64) -> PipelineConfig {
    PipelineConfig {
        name: name.to_string(),
        inputs: vec![synthetic_input("webcam0", frames)],
        outputs: vec![log_output("display0")],
        infers: vec![infer_stage("faces", "FaceDetection", "det:face.xml", &[])],
    }
}

/// Face detection chained into age/gender recognition.
pub fn chained_pipeline(name: &str, frames: u64) -> PipelineConfig {
    PipelineConfig {
        name: name.to_string(),
        inputs: vec![synthetic_input("webcam0", frames)],
        outputs: vec![log_output("display0")],
        infers: vec![
            infer_stage("faces", "FaceDetection", "det:face.xml", &[]),
            infer_stage("age", "AgeGenderRecognition", "attr:age.xml", &["faces"]),
        ],
    }
}
