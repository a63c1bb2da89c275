//! Task-tag to constructor dispatch.
//!
//! The factory holds a registration table populated once at construction, so
//! supporting a new task is one `register` call rather than a new branch in a
//! match ladder. Hosts can register their own tags next to the built-ins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::InferConfig;
use crate::engine::{EngineKey, EngineProvider};
use crate::error::{Error, Result};

use super::adapters::{
    AttributesAdapter, DetectionAdapter, HeadPoseAdapter, LandmarksAdapter,
    ReidentificationAdapter, SegmentationAdapter,
};
use super::{InferenceAdapter, TaskKind};

const DEFAULT_BATCH_SIZE: usize = 1;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Builds one adapter from its validated declaration and an engine handle
/// obtained from the provider.
pub type AdapterConstructor =
    Box<dyn Fn(&InferConfig, &EngineProvider) -> Result<Arc<dyn InferenceAdapter>> + Send + Sync>;

pub struct AdapterFactory {
    constructors: HashMap<String, AdapterConstructor>,
}

impl AdapterFactory {
    /// A factory with every built-in task registered.
    pub fn with_builtin_tasks() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        for task in TaskKind::ALL {
            factory.register(task.tag(), builtin_constructor(task));
        }
        factory
    }

    /// Register (or override) the constructor for a task tag.
    pub fn register(&mut self, tag: impl Into<String>, constructor: AdapterConstructor) {
        self.constructors.insert(tag.into(), constructor);
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build the adapter for one inference declaration.
    ///
    /// Checks run in order: tag recognized, parameters present and sane,
    /// engine handle obtainable. An unknown tag is an explicit error; a
    /// silent no-op adapter is never produced.
    pub fn build(
        &self,
        infer: &InferConfig,
        engines: &EngineProvider,
    ) -> Result<Arc<dyn InferenceAdapter>> {
        let constructor = self
            .constructors
            .get(&infer.task)
            .ok_or_else(|| Error::UnsupportedTask(infer.task.clone()))?;
        constructor(infer, engines)
    }
}

/// Shared parameter checks for the built-in tasks. Path existence is the
/// backend's concern, not ours; we validate presence and semantic range.
fn validate_common(infer: &InferConfig) -> Result<(EngineKey, usize)> {
    if infer.model.trim().is_empty() {
        return Err(Error::MissingParameter {
            stage: infer.name.clone(),
            param: "model",
        });
    }
    if infer.device.trim().is_empty() {
        return Err(Error::MissingParameter {
            stage: infer.name.clone(),
            param: "device",
        });
    }
    let batch_size = match infer.batch_size {
        Some(0) => {
            return Err(Error::MissingParameter {
                stage: infer.name.clone(),
                param: "batch_size",
            });
        }
        Some(n) => n,
        None => DEFAULT_BATCH_SIZE,
    };
    Ok((EngineKey::new(&infer.model, &infer.device), batch_size))
}

fn validate_threshold(infer: &InferConfig) -> Result<f32> {
    match infer.confidence_threshold {
        Some(t) if (0.0..=1.0).contains(&t) => Ok(t),
        Some(_) => Err(Error::MissingParameter {
            stage: infer.name.clone(),
            param: "confidence_threshold",
        }),
        None => Ok(DEFAULT_CONFIDENCE_THRESHOLD),
    }
}

fn builtin_constructor(task: TaskKind) -> AdapterConstructor {
    Box::new(move |infer, engines| {
        let (key, batch_size) = validate_common(infer)?;
        let name = infer.name.clone();

        let adapter: Arc<dyn InferenceAdapter> = match task {
            TaskKind::FaceDetection
            | TaskKind::ObjectDetection
            | TaskKind::LicensePlateDetection => {
                let threshold = validate_threshold(infer)?;
                let engine = engines.acquire(&key)?;
                Arc::new(DetectionAdapter::new(name, task, engine, batch_size, threshold))
            }
            TaskKind::AgeGenderRecognition
            | TaskKind::EmotionRecognition
            | TaskKind::PersonAttribsDetection
            | TaskKind::VehicleAttribsDetection => {
                let engine = engines.acquire(&key)?;
                Arc::new(AttributesAdapter::new(name, task, engine, batch_size))
            }
            TaskKind::HeadPoseEstimation => {
                let engine = engines.acquire(&key)?;
                Arc::new(HeadPoseAdapter::new(name, engine, batch_size))
            }
            TaskKind::ObjectSegmentation => {
                let engine = engines.acquire(&key)?;
                Arc::new(SegmentationAdapter::new(name, engine))
            }
            TaskKind::PersonReidentification | TaskKind::FaceReidentification => {
                let engine = engines.acquire(&key)?;
                Arc::new(ReidentificationAdapter::new(name, task, engine, batch_size))
            }
            TaskKind::LandmarksDetection => {
                let engine = engines.acquire(&key)?;
                Arc::new(LandmarksAdapter::new(name, engine, batch_size))
            }
        };
        Ok(adapter)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, Frame, InferenceOutput};

    struct StubEngine;

    impl crate::engine::InferenceEngine for StubEngine {
        fn infer(
            &self,
            _frame: &Frame,
            _regions: &[BoundingBox],
        ) -> anyhow::Result<InferenceOutput> {
            Ok(InferenceOutput::Detections(Vec::new()))
        }
    }

    fn provider() -> EngineProvider {
        EngineProvider::new(Box::new(|_key| {
            Ok(Arc::new(StubEngine) as Arc<dyn crate::engine::InferenceEngine>)
        }))
    }

    fn infer_config(task: &str) -> InferConfig {
        InferConfig {
            name: "stage0".into(),
            task: task.into(),
            model: "model.xml".into(),
            device: "CPU".into(),
            batch_size: None,
            confidence_threshold: None,
            inputs: Vec::new(),
        }
    }

    #[test]
    fn every_builtin_tag_constructs() {
        let factory = AdapterFactory::with_builtin_tasks();
        let engines = provider();
        for task in TaskKind::ALL {
            let adapter = factory.build(&infer_config(task.tag()), &engines).unwrap();
            assert_eq!(adapter.task(), task);
        }
    }

    #[test]
    fn unknown_tag_is_an_explicit_error() {
        let factory = AdapterFactory::with_builtin_tasks();
        let err = factory
            .build(&infer_config("TelekinesisDetection"), &provider())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTask(tag) if tag == "TelekinesisDetection"));
    }

    #[test]
    fn missing_model_is_rejected() {
        let factory = AdapterFactory::with_builtin_tasks();
        let mut config = infer_config("FaceDetection");
        config.model.clear();
        let err = factory.build(&config, &provider()).unwrap_err();
        assert!(matches!(err, Error::MissingParameter { param: "model", .. }));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let factory = AdapterFactory::with_builtin_tasks();
        let mut config = infer_config("ObjectDetection");
        config.confidence_threshold = Some(1.5);
        let err = factory.build(&config, &provider()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameter {
                param: "confidence_threshold",
                ..
            }
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let factory = AdapterFactory::with_builtin_tasks();
        let mut config = infer_config("FaceDetection");
        config.batch_size = Some(0);
        let err = factory.build(&config, &provider()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingParameter {
                param: "batch_size",
                ..
            }
        ));
    }

    #[test]
    fn hosts_can_register_custom_tags() {
        let mut factory = AdapterFactory::with_builtin_tasks();
        factory.register(
            "GazeEstimation",
            Box::new(|infer, engines| {
                let (key, batch_size) = validate_common(infer)?;
                let engine = engines.acquire(&key)?;
                Ok(Arc::new(HeadPoseAdapter::new(infer.name.clone(), engine, batch_size))
                    as Arc<dyn InferenceAdapter>)
            }),
        );
        assert!(factory.supports("GazeEstimation"));
        factory
            .build(&infer_config("GazeEstimation"), &provider())
            .unwrap();
    }
}
