//! Runtime control service.
//!
//! `run_service` is the long-lived loop a host integration drives to create,
//! update, and control pipelines while the process runs. Requests arrive on
//! an mpsc channel and are applied to the registry in arrival order; each
//! carries its own reply channel. [`ServiceHandle`] is the cloneable client
//! side.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::registry::{PipelineRegistry, PipelineSnapshot};

type Reply<T> = Sender<T>;

pub enum ServiceRequest {
    Create(PipelineConfig, Reply<crate::Result<PipelineSnapshot>>),
    Update(String, PipelineConfig, Reply<crate::Result<PipelineSnapshot>>),
    Remove(String, Reply<crate::Result<()>>),
    Pause(String, Reply<crate::Result<()>>),
    Resume(String, Reply<crate::Result<()>>),
    RunAll(Reply<()>),
    StopAll(Reply<()>),
    JoinAll(Reply<()>),
    List(Reply<HashMap<String, PipelineSnapshot>>),
    Shutdown,
}

/// Client handle for submitting requests to a running service loop. Cheap to
/// clone; every method blocks until the loop has applied the request.
#[derive(Clone)]
pub struct ServiceHandle {
    sender: Sender<ServiceRequest>,
}

/// Create the request channel for a service loop.
pub fn service_channel() -> (ServiceHandle, Receiver<ServiceRequest>) {
    let (sender, receiver) = mpsc::channel();
    (ServiceHandle { sender }, receiver)
}

impl ServiceHandle {
    fn call<T>(&self, build: impl FnOnce(Reply<T>) -> ServiceRequest) -> anyhow::Result<T> {
        let (reply, result) = mpsc::channel();
        self.sender
            .send(build(reply))
            .map_err(|_| anyhow::anyhow!("pipeline service is not running"))?;
        result
            .recv()
            .map_err(|_| anyhow::anyhow!("pipeline service dropped the request"))
    }

    pub fn create(&self, config: PipelineConfig) -> anyhow::Result<PipelineSnapshot> {
        Ok(self.call(|reply| ServiceRequest::Create(config, reply))??)
    }

    pub fn update(&self, name: &str, config: PipelineConfig) -> anyhow::Result<PipelineSnapshot> {
        let name = name.to_string();
        Ok(self.call(|reply| ServiceRequest::Update(name, config, reply))??)
    }

    pub fn remove(&self, name: &str) -> anyhow::Result<()> {
        let name = name.to_string();
        Ok(self.call(|reply| ServiceRequest::Remove(name, reply))??)
    }

    pub fn pause(&self, name: &str) -> anyhow::Result<()> {
        let name = name.to_string();
        Ok(self.call(|reply| ServiceRequest::Pause(name, reply))??)
    }

    pub fn resume(&self, name: &str) -> anyhow::Result<()> {
        let name = name.to_string();
        Ok(self.call(|reply| ServiceRequest::Resume(name, reply))??)
    }

    pub fn run_all(&self) -> anyhow::Result<()> {
        self.call(ServiceRequest::RunAll)
    }

    pub fn stop_all(&self) -> anyhow::Result<()> {
        self.call(ServiceRequest::StopAll)
    }

    pub fn join_all(&self) -> anyhow::Result<()> {
        self.call(ServiceRequest::JoinAll)
    }

    pub fn list(&self) -> anyhow::Result<HashMap<String, PipelineSnapshot>> {
        self.call(ServiceRequest::List)
    }

    /// Ask the loop to exit. Running pipelines are left to the caller to
    /// stop and join through the registry.
    pub fn shutdown(&self) {
        let _ = self.sender.send(ServiceRequest::Shutdown);
    }
}

/// Apply requests to the registry until the channel closes or a `Shutdown`
/// request arrives. Replies to callers that already gave up are dropped
/// silently.
pub fn run_service(registry: &PipelineRegistry, requests: Receiver<ServiceRequest>) {
    info!("pipeline service started");
    while let Ok(request) = requests.recv() {
        match request {
            ServiceRequest::Create(config, reply) => {
                debug!(pipeline = %config.name, "service: create");
                let _ = reply.send(registry.create_pipeline(config));
            }
            ServiceRequest::Update(name, config, reply) => {
                debug!(pipeline = %name, "service: update");
                let _ = reply.send(registry.update_pipeline(&name, config));
            }
            ServiceRequest::Remove(name, reply) => {
                debug!(pipeline = %name, "service: remove");
                let _ = reply.send(registry.remove_pipeline(&name));
            }
            ServiceRequest::Pause(name, reply) => {
                let _ = reply.send(registry.pause_pipeline(&name));
            }
            ServiceRequest::Resume(name, reply) => {
                let _ = reply.send(registry.resume_pipeline(&name));
            }
            ServiceRequest::RunAll(reply) => {
                registry.run_all();
                let _ = reply.send(());
            }
            ServiceRequest::StopAll(reply) => {
                registry.stop_all();
                let _ = reply.send(());
            }
            ServiceRequest::JoinAll(reply) => {
                registry.join_all();
                let _ = reply.send(());
            }
            ServiceRequest::List(reply) => {
                let _ = reply.send(registry.pipelines());
            }
            ServiceRequest::Shutdown => break,
        }
    }
    info!("pipeline service stopped");
}
