use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use visionflow::engine::InferenceEngine;
use visionflow::{
    AdapterFactory, BoundingBox, Detection, EngineProvider, Frame, InferenceOutput, IoFactory,
    PipelineFile, PipelineRegistry,
};

#[derive(Parser)]
#[command(name = "visionflow")]
#[command(about = "Run declaratively configured computer-vision inference pipelines")]
struct Cli {
    /// Path to a JSON pipeline file
    #[arg(value_name = "PIPELINES")]
    pipeline_file: PathBuf,

    /// Validate and build the pipelines, print them, and exit without running
    #[arg(long)]
    check: bool,
}

/// Stand-in backend for the demo driver: reports one centered detection per
/// request. Real deployments plug their backend in through the engine
/// loader.
struct DemoEngine {
    model: String,
}

impl InferenceEngine for DemoEngine {
    fn infer(&self, frame: &Frame, regions: &[BoundingBox]) -> anyhow::Result<InferenceOutput> {
        let count = regions.len().max(1);
        let bbox = BoundingBox {
            x: frame.image.width() / 4,
            y: frame.image.height() / 4,
            width: frame.image.width() / 2,
            height: frame.image.height() / 2,
        };
        Ok(InferenceOutput::Detections(
            (0..count)
                .map(|_| Detection {
                    label: self.model.clone(),
                    confidence: 0.9,
                    bbox: bbox.clone(),
                })
                .collect(),
        ))
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Cli::parse();

    let file = PipelineFile::load(&args.pipeline_file)
        .with_context(|| format!("failed to load {:?}", args.pipeline_file))?;

    let engines = EngineProvider::new(Box::new(|key| {
        Ok(Arc::new(DemoEngine {
            model: key.model.clone(),
        }) as Arc<dyn InferenceEngine>)
    }));
    let registry = PipelineRegistry::new(
        AdapterFactory::with_builtin_tasks(),
        IoFactory::with_builtins(),
        engines,
    );

    for config in file.pipelines {
        let snapshot = registry.create_pipeline(config)?;
        println!(
            "created pipeline {:?} ({} inputs, {} stages, {} outputs)",
            snapshot.name,
            snapshot.config.inputs.len(),
            snapshot.config.infers.len(),
            snapshot.config.outputs.len(),
        );
    }

    if args.check {
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_shutdown.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    registry.run_all();
    println!("running {} pipeline(s), Ctrl-C to stop", registry.worker_count());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            registry.stop_all();
            break;
        }
        // Reap pipelines whose sources ended on their own.
        registry.join_all();
        if registry.worker_count() == 0 {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    registry.join_all();

    for (name, snapshot) in registry.pipelines() {
        println!("pipeline {:?}: {}", name, snapshot.state);
    }
    Ok(())
}
