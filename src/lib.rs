pub mod config;
pub mod engine;
pub mod error;
pub mod inference;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod service;

pub use config::{InferConfig, InputConfig, OutputConfig, PipelineConfig, PipelineFile};
pub use engine::{EngineKey, EngineLoader, EngineProvider, InferenceEngine};
pub use error::{Error, Result};
pub use inference::{AdapterFactory, InferenceAdapter, TaskKind};
pub use io::{ChannelSink, InputSource, IoFactory, OutputSink, SyntheticSource, TracingSink};
pub use models::{BoundingBox, Detection, Frame, FrameResults, InferenceOutput, Landmark};
pub use pipeline::{build_pipeline, Pipeline};
pub use registry::{PipelineRegistry, PipelineSnapshot, PipelineState};
pub use service::{run_service, service_channel, ServiceHandle, ServiceRequest};
