use std::path::Path;

use serde::{Deserialize, Serialize};

/// Declaration of one input source, e.g. a camera or a file stream.
/// The `kind` tag selects which registered source constructor builds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Declaration of one output sink (renderer, publisher, file writer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Declaration of one inference stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferConfig {
    pub name: String,
    /// Task tag, e.g. "FaceDetection" or "AgeGenderRecognition".
    pub task: String,
    /// Model reference handed to the engine backend.
    #[serde(default)]
    pub model: String,
    /// Target device, e.g. "CPU", "GPU", "MYRIAD".
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
    /// Names of upstream inference stages whose result regions this stage
    /// consumes. Empty means the stage runs on the whole frame.
    #[serde(default)]
    pub inputs: Vec<String>,
}

fn default_device() -> String {
    "CPU".to_string()
}

/// Full declarative description of one pipeline. Immutable once accepted by
/// the registry; updates replace the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub inputs: Vec<InputConfig>,
    pub outputs: Vec<OutputConfig>,
    pub infers: Vec<InferConfig>,
}

impl PipelineConfig {
    pub fn infer(&self, name: &str) -> Option<&InferConfig> {
        self.infers.iter().find(|i| i.name == name)
    }
}

/// On-disk pipeline set consumed by the CLI. The production parser lives in
/// the host application; this covers the JSON subset the demo driver and the
/// tests need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    pub pipelines: Vec<PipelineConfig>,
}

impl PipelineFile {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let file: PipelineFile = serde_json::from_str(&raw)?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_defaults() {
        let raw = r#"{"name": "faces", "task": "FaceDetection", "model": "face.xml"}"#;
        let infer: InferConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(infer.device, "CPU");
        assert!(infer.inputs.is_empty());
        assert!(infer.batch_size.is_none());
    }

    #[test]
    fn pipeline_file_round_trips() {
        let config = PipelineConfig {
            name: "cam0".into(),
            inputs: vec![InputConfig {
                name: "webcam0".into(),
                kind: "synthetic".into(),
                params: Default::default(),
            }],
            outputs: vec![],
            infers: vec![],
        };
        let file = PipelineFile {
            pipelines: vec![config],
        };
        let raw = serde_json::to_string(&file).unwrap();
        let parsed: PipelineFile = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.pipelines[0].name, "cam0");
        assert_eq!(parsed.pipelines[0].inputs[0].kind, "synthetic");
    }
}
