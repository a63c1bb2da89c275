//! Shared inference-engine handles.
//!
//! Backend initialization (model compilation, device setup) is expensive, so
//! handles are cached per model/device pair and shared by every adapter that
//! asks for the same pair. The concrete backend stays outside this crate; the
//! provider is handed a loader that produces one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{BoundingBox, Frame, InferenceOutput};

/// Execution handle for one compiled model on one device. Implemented by the
/// host's backend integration; test suites plug in mocks.
pub trait InferenceEngine: Send + Sync {
    /// Run the model over the given regions of a frame. An empty region
    /// slice means the whole frame.
    fn infer(&self, frame: &Frame, regions: &[BoundingBox]) -> anyhow::Result<InferenceOutput>;
}

/// Cache key: which model on which device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineKey {
    pub model: String,
    pub device: String,
}

impl EngineKey {
    pub fn new(model: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            device: device.into(),
        }
    }
}

enum EngineSlot {
    Ready(Arc<dyn InferenceEngine>),
    /// Initialization failed once; kept so repeated acquisitions fail fast
    /// instead of re-initializing a broken backend on every build.
    Failed(String),
}

/// Builds a backend handle for a key. Injected so the concrete backend and
/// its model files stay out of this crate.
pub type EngineLoader =
    Box<dyn Fn(&EngineKey) -> anyhow::Result<Arc<dyn InferenceEngine>> + Send + Sync>;

/// Process-wide provider of shared engine handles, keyed by model/device.
pub struct EngineProvider {
    loader: EngineLoader,
    cache: Mutex<HashMap<EngineKey, EngineSlot>>,
}

impl EngineProvider {
    pub fn new(loader: EngineLoader) -> Self {
        Self {
            loader,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get the shared handle for `key`, initializing the backend on first
    /// use. Repeated calls with the same key return the same handle; a key
    /// whose initialization failed keeps failing without touching the
    /// backend again.
    pub fn acquire(&self, key: &EngineKey) -> Result<Arc<dyn InferenceEngine>> {
        let mut cache = self.cache.lock();
        if let Some(slot) = cache.get(key) {
            return match slot {
                EngineSlot::Ready(engine) => Ok(engine.clone()),
                EngineSlot::Failed(message) => Err(Error::EngineInit {
                    model: key.model.clone(),
                    device: key.device.clone(),
                    message: message.clone(),
                }),
            };
        }

        info!(model = %key.model, device = %key.device, "initializing engine backend");
        match (self.loader)(key) {
            Ok(engine) => {
                cache.insert(key.clone(), EngineSlot::Ready(engine.clone()));
                Ok(engine)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(model = %key.model, device = %key.device, error = %message,
                    "engine initialization failed; caching failure");
                cache.insert(key.clone(), EngineSlot::Failed(message.clone()));
                Err(Error::EngineInit {
                    model: key.model.clone(),
                    device: key.device.clone(),
                    message,
                })
            }
        }
    }

    /// Number of keys currently cached (ready or failed).
    pub fn cached_keys(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullEngine;

    impl InferenceEngine for NullEngine {
        fn infer(
            &self,
            _frame: &Frame,
            _regions: &[BoundingBox],
        ) -> anyhow::Result<InferenceOutput> {
            Ok(InferenceOutput::Detections(Vec::new()))
        }
    }

    #[test]
    fn same_key_shares_one_backend() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let provider = EngineProvider::new(Box::new(move |_key| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullEngine) as Arc<dyn InferenceEngine>)
        }));

        let key = EngineKey::new("face.xml", "CPU");
        let first = provider.acquire(&key).unwrap();
        let second = provider.acquire(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        provider.acquire(&EngineKey::new("face.xml", "GPU")).unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_is_cached_permanently() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let provider = EngineProvider::new(Box::new(move |_key| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("device unavailable")
        }));

        let key = EngineKey::new("face.xml", "MYRIAD");
        assert!(matches!(
            provider.acquire(&key),
            Err(Error::EngineInit { .. })
        ));
        assert!(matches!(
            provider.acquire(&key),
            Err(Error::EngineInit { .. })
        ));
        // The loader ran once; the second failure came from the cache.
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
