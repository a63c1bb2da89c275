//! Pipeline assembly and per-frame execution.
//!
//! [`build_pipeline`] is a one-shot translation of a [`PipelineConfig`] into
//! a runnable [`Pipeline`]: sources and sinks are resolved by name through
//! the [`IoFactory`], inference declarations go through the
//! [`AdapterFactory`], and upstream references between stages are wired into
//! a dependency order. Building never mutates registry state, so a failed
//! build leaves whatever record existed before untouched.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::engine::EngineProvider;
use crate::error::{Error, Result};
use crate::inference::{AdapterFactory, InferenceAdapter};
use crate::io::{InputSource, IoFactory, OutputSink};
use crate::models::{BoundingBox, Frame, FrameResults, InferenceOutput};

/// One wired stage: the adapter plus the indices of its upstream stages.
/// Stages are stored in dependency order, so upstream indices always point
/// at earlier entries.
struct Stage {
    adapter: Arc<dyn InferenceAdapter>,
    upstream: Vec<usize>,
}

/// An assembled, runnable graph for one named configuration. Owned by its
/// registry slot and driven exclusively by that slot's worker thread while
/// running.
pub struct Pipeline {
    name: String,
    sources: Vec<Box<dyn InputSource>>,
    stages: Vec<Stage>,
    sinks: Vec<Box<dyn OutputSink>>,
    exhausted: Vec<bool>,
    next_source: usize,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .map(|s| s.adapter.name().to_string())
            .collect()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Process one unit of work: pull a frame from the next live source,
    /// run it through the stages in dependency order, deliver the results
    /// to every sink. Returns `Ok(false)` once every source has ended.
    pub fn process_next(&mut self) -> Result<bool> {
        let Some(frame) = self.pull_frame()? else {
            return Ok(false);
        };

        let mut outputs: Vec<InferenceOutput> = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let output = if stage.upstream.is_empty() {
                self.run_stage(stage, &frame, &[])?
            } else {
                let regions: Vec<BoundingBox> = stage
                    .upstream
                    .iter()
                    .flat_map(|&idx| outputs[idx].regions())
                    .collect();
                if regions.is_empty() {
                    // Nothing upstream localized anything this frame.
                    stage.adapter.task().empty_output()
                } else {
                    self.run_stage(stage, &frame, &regions)?
                }
            };
            outputs.push(output);
        }

        let results = FrameResults {
            frame,
            outputs: self
                .stages
                .iter()
                .zip(outputs)
                .map(|(stage, out)| (stage.adapter.name().to_string(), out))
                .collect(),
        };

        for sink in &mut self.sinks {
            let sink_name = sink.name().to_string();
            sink.deliver(&results).map_err(|err| Error::Inference {
                pipeline: self.name.clone(),
                stage: sink_name,
                source: err,
            })?;
        }
        Ok(true)
    }

    fn run_stage(
        &self,
        stage: &Stage,
        frame: &Frame,
        regions: &[BoundingBox],
    ) -> Result<InferenceOutput> {
        stage
            .adapter
            .process(frame, regions)
            .map_err(|err| Error::Inference {
                pipeline: self.name.clone(),
                stage: stage.adapter.name().to_string(),
                source: err,
            })
    }

    /// Round-robin over sources, skipping ones that already ended. `None`
    /// once all sources are exhausted.
    fn pull_frame(&mut self) -> Result<Option<Frame>> {
        if self.sources.is_empty() {
            return Ok(None);
        }
        for _ in 0..self.sources.len() {
            let idx = self.next_source;
            self.next_source = (self.next_source + 1) % self.sources.len();
            if self.exhausted[idx] {
                continue;
            }
            let source_name = self.sources[idx].name().to_string();
            match self.sources[idx].next_frame() {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {
                    debug!(pipeline = %self.name, source = %source_name, "source ended");
                    self.exhausted[idx] = true;
                }
                Err(err) => {
                    return Err(Error::Inference {
                        pipeline: self.name.clone(),
                        stage: source_name,
                        source: err,
                    });
                }
            }
        }
        Ok(None)
    }
}

/// Resolve and wire a full pipeline from its configuration. One-shot: either
/// a complete `Pipeline` comes back or nothing was built.
pub fn build_pipeline(
    config: &PipelineConfig,
    adapters: &AdapterFactory,
    io: &IoFactory,
    engines: &EngineProvider,
) -> Result<Pipeline> {
    // Stage names must be unique for upstream references to be meaningful.
    let mut index_by_name: HashMap<&str, usize> = HashMap::new();
    for (idx, infer) in config.infers.iter().enumerate() {
        if index_by_name.insert(infer.name.as_str(), idx).is_some() {
            return Err(Error::InvalidParams {
                name: infer.name.clone(),
                message: "duplicate inference stage name".to_string(),
            });
        }
    }

    for infer in &config.infers {
        for upstream in &infer.inputs {
            if !index_by_name.contains_key(upstream.as_str()) {
                return Err(Error::UnresolvedReference {
                    reference: upstream.clone(),
                    context: format!("inference stage {:?}", infer.name),
                });
            }
        }
    }

    let order = dependency_order(config, &index_by_name)?;

    let mut stages = Vec::with_capacity(order.len());
    let mut topo_index: HashMap<usize, usize> = HashMap::new();
    for (position, &config_idx) in order.iter().enumerate() {
        let infer = &config.infers[config_idx];
        let adapter = adapters.build(infer, engines)?;
        let upstream = infer
            .inputs
            .iter()
            .map(|name| topo_index[&index_by_name[name.as_str()]])
            .collect();
        topo_index.insert(config_idx, position);
        stages.push(Stage { adapter, upstream });
    }

    let sources = config
        .inputs
        .iter()
        .map(|input| io.build_source(input))
        .collect::<Result<Vec<_>>>()?;
    let sinks = config
        .outputs
        .iter()
        .map(|output| io.build_sink(output))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        pipeline = %config.name,
        sources = sources.len(),
        stages = stages.len(),
        sinks = sinks.len(),
        "pipeline assembled"
    );

    let exhausted = vec![false; sources.len()];
    Ok(Pipeline {
        name: config.name.clone(),
        sources,
        stages,
        sinks,
        exhausted,
        next_source: 0,
    })
}

/// Kahn's algorithm over the upstream references. Inference stages must form
/// a DAG; anything left unordered is part of a cycle.
fn dependency_order(
    config: &PipelineConfig,
    index_by_name: &HashMap<&str, usize>,
) -> Result<Vec<usize>> {
    let n = config.infers.len();
    let mut indegree = vec![0usize; n];
    let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (idx, infer) in config.infers.iter().enumerate() {
        for upstream in &infer.inputs {
            let from = index_by_name[upstream.as_str()];
            downstream[from].push(idx);
            indegree[idx] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(idx) = queue.pop_front() {
        order.push(idx);
        for &next in &downstream[idx] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != n {
        let mut cycle: Vec<String> = (0..n)
            .filter(|&i| indegree[i] > 0)
            .map(|i| config.infers[i].name.clone())
            .collect();
        cycle.sort();
        return Err(Error::CycleDetected(cycle));
    }
    Ok(order)
}
