//! Input-source and output-sink collaborator interfaces.
//!
//! Concrete capture devices and publishers live in the host application and
//! are plugged in as constructors keyed by the declaration's `kind` tag. The
//! built-ins here are deliberately small: a synthetic frame generator and two
//! sinks, enough for the CLI demo and the test suite.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::time::Duration;

use image::DynamicImage;
use tracing::info;

use crate::config::{InputConfig, OutputConfig};
use crate::error::{Error, Result};
use crate::models::{Frame, FrameResults};

/// A resolved input source, owned and driven by one pipeline's worker thread.
pub trait InputSource: Send {
    fn name(&self) -> &str;

    /// Pull the next frame. `Ok(None)` means end of stream and ends the
    /// worker loop gracefully.
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;
}

/// A resolved output sink, owned and driven by one pipeline's worker thread.
pub trait OutputSink: Send {
    fn name(&self) -> &str;

    fn deliver(&mut self, results: &FrameResults) -> anyhow::Result<()>;
}

pub type SourceConstructor =
    Box<dyn Fn(&InputConfig) -> anyhow::Result<Box<dyn InputSource>> + Send + Sync>;
pub type SinkConstructor =
    Box<dyn Fn(&OutputConfig) -> anyhow::Result<Box<dyn OutputSink>> + Send + Sync>;

/// Registry of source/sink constructors, keyed by declaration kind.
pub struct IoFactory {
    sources: HashMap<String, SourceConstructor>,
    sinks: HashMap<String, SinkConstructor>,
}

impl IoFactory {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            sinks: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in stand-ins: the "synthetic"
    /// source and the "log" sink.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register_source(
            "synthetic",
            Box::new(|config| Ok(Box::new(SyntheticSource::from_config(config)?) as _)),
        );
        factory.register_sink(
            "log",
            Box::new(|config| Ok(Box::new(TracingSink::new(&config.name)) as _)),
        );
        factory
    }

    pub fn register_source(&mut self, kind: impl Into<String>, constructor: SourceConstructor) {
        self.sources.insert(kind.into(), constructor);
    }

    pub fn register_sink(&mut self, kind: impl Into<String>, constructor: SinkConstructor) {
        self.sinks.insert(kind.into(), constructor);
    }

    pub fn build_source(&self, config: &InputConfig) -> Result<Box<dyn InputSource>> {
        let constructor =
            self.sources
                .get(&config.kind)
                .ok_or_else(|| Error::UnsupportedKind {
                    kind: config.kind.clone(),
                    context: "input source",
                })?;
        constructor(config).map_err(|err| Error::InvalidParams {
            name: config.name.clone(),
            message: err.to_string(),
        })
    }

    pub fn build_sink(&self, config: &OutputConfig) -> Result<Box<dyn OutputSink>> {
        let constructor = self
            .sinks
            .get(&config.kind)
            .ok_or_else(|| Error::UnsupportedKind {
                kind: config.kind.clone(),
                context: "output sink",
            })?;
        constructor(config).map_err(|err| Error::InvalidParams {
            name: config.name.clone(),
            message: err.to_string(),
        })
    }
}

impl Default for IoFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Generates flat gray frames, optionally bounded and paced. Used where a
/// real capture device would be plugged in.
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    /// 0 = unbounded.
    frame_limit: u64,
    interval: Duration,
    produced: u64,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, width: u32, height: u32, frame_limit: u64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            frame_limit,
            interval: Duration::ZERO,
            produced: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn from_config(config: &InputConfig) -> anyhow::Result<Self> {
        let int_param = |key: &str, default: u64| -> anyhow::Result<u64> {
            match config.params.get(key) {
                None => Ok(default),
                Some(value) => value
                    .as_u64()
                    .ok_or_else(|| anyhow::anyhow!("{key} must be a non-negative integer")),
            }
        };
        let width = int_param("width", 320)? as u32;
        let height = int_param("height", 240)? as u32;
        let frame_limit = int_param("frames", 0)?;
        let interval = Duration::from_millis(int_param("interval_ms", 10)?);
        Ok(Self::new(&config.name, width, height, frame_limit).with_interval(interval))
    }
}

impl InputSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        if self.frame_limit != 0 && self.produced >= self.frame_limit {
            return Ok(None);
        }
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }
        let image = DynamicImage::new_rgb8(self.width, self.height);
        let frame = Frame::new(image, self.name.clone(), self.produced);
        self.produced += 1;
        Ok(Some(frame))
    }
}

/// Logs a one-line summary per delivered frame.
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl OutputSink for TracingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, results: &FrameResults) -> anyhow::Result<()> {
        let total: usize = results.outputs.iter().map(|(_, out)| out.len()).sum();
        info!(
            sink = %self.name,
            source = %results.frame.source,
            sequence = results.frame.sequence,
            stages = results.outputs.len(),
            results = total,
            "frame delivered"
        );
        Ok(())
    }
}

/// Forwards every delivery over an mpsc channel; the test suite's way of
/// observing pipeline output.
pub struct ChannelSink {
    name: String,
    sender: Sender<FrameResults>,
}

impl ChannelSink {
    pub fn new(name: impl Into<String>, sender: Sender<FrameResults>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

impl OutputSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&mut self, results: &FrameResults) -> anyhow::Result<()> {
        // A dropped receiver is not an error; the consumer just went away.
        let _ = self.sender.send(results.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_honors_frame_limit() {
        let mut source = SyntheticSource::new("cam", 8, 8, 2);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn unknown_source_kind_fails() {
        let factory = IoFactory::with_builtins();
        let config = InputConfig {
            name: "webcam0".into(),
            kind: "quantum-camera".into(),
            params: Default::default(),
        };
        assert!(matches!(
            factory.build_source(&config),
            Err(Error::UnsupportedKind { context: "input source", .. })
        ));
    }
}
