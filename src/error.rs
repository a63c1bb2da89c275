use thiserror::Error;

/// Errors surfaced by the pipeline core.
///
/// Build-time failures (configuration, engine initialization) are returned
/// synchronously from `create_pipeline`/`update_pipeline` and leave the
/// registry untouched. Runtime inference failures never reach the caller
/// directly; they park the affected record in [`PipelineState::Error`]
/// instead.
///
/// [`PipelineState::Error`]: crate::registry::PipelineState::Error
#[derive(Debug, Error)]
pub enum Error {
    /// An inference declaration used a task tag no constructor is registered for.
    #[error("unsupported inference task {0:?}")]
    UnsupportedTask(String),

    /// An input/output declaration used a kind tag no constructor is
    /// registered for.
    #[error("unsupported {context} kind {kind:?}")]
    UnsupportedKind { kind: String, context: &'static str },

    /// A required parameter was absent or semantically invalid for the task.
    #[error("inference stage {stage:?}: missing or invalid parameter {param:?}")]
    MissingParameter { stage: String, param: &'static str },

    /// A source/sink declaration carried parameters its constructor rejected.
    #[error("invalid parameters for {name:?}: {message}")]
    InvalidParams { name: String, message: String },

    /// A declaration referenced a name that is not declared anywhere in the config.
    #[error("unresolved reference {reference:?} in {context}")]
    UnresolvedReference { reference: String, context: String },

    /// The upstream references between inference stages form a cycle.
    #[error("cycle detected among inference stages: {0:?}")]
    CycleDetected(Vec<String>),

    /// The backend for a model/device pair could not be initialized.
    /// Cached per engine key, so later acquisitions fail the same way.
    #[error("engine initialization failed for model {model:?} on {device:?}: {message}")]
    EngineInit {
        model: String,
        device: String,
        message: String,
    },

    /// An adapter, source, or sink failed while a pipeline was running.
    #[error("pipeline {pipeline:?} failed at {stage:?}: {source}")]
    Inference {
        pipeline: String,
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    /// A lifecycle operation named a pipeline the registry does not hold.
    #[error("unknown pipeline {0:?}")]
    UnknownPipeline(String),

    /// `create_pipeline` collided with an existing Running/Paused record.
    #[error("pipeline {0:?} already exists and is active")]
    DuplicateActive(String),

    /// Pause/resume was requested in a state that does not allow it.
    #[error("pipeline {pipeline:?} cannot go from {from} to {to}")]
    InvalidTransition {
        pipeline: String,
        from: &'static str,
        to: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
