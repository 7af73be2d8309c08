//! The single shared model instance and its lifecycle.
//!
//! At most one model is loaded process-wide, shared by every origin. All
//! loads pass through one async critical section: concurrent `ensure_model`
//! calls for the same target converge on a single underlying load, and a
//! request from one origin can evict the model another origin loaded.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use voxkey_core::error::{Result, VoxError};
use voxkey_core::protocol::ManagerStatus;
use voxkey_core::types::{BackendProbe, Device, ModelId};

use crate::backend::{LoadedModel, ModelBackend};
use crate::probe::{GpuDetect, GpuProbe};

/// Outcome of [`ModelManager::ensure_model`].
#[derive(Debug)]
pub struct EnsuredModel<M> {
    pub instance: Arc<M>,
    pub model: ModelId,
    pub device: Device,
    pub from_cache: bool,
}

struct Loaded<M> {
    model: ModelId,
    device: Device,
    instance: Arc<M>,
}

/// Owns the at-most-one live model instance and the backend used to load it.
pub struct ModelManager<B: ModelBackend, D> {
    backend: B,
    probe: GpuProbe<D>,
    default_model: ModelId,
    preferred_backend: Device,
    // Held across loads: doubles as the global load critical section and as
    // the in-flight load handle concurrent callers converge on.
    inner: Mutex<Option<Loaded<B::Model>>>,
}

impl<B, D> ModelManager<B, D>
where
    B: ModelBackend,
    D: GpuDetect,
{
    pub fn new(backend: B, detector: D, default_model: ModelId, preferred_backend: Device) -> Self {
        Self {
            backend,
            probe: GpuProbe::new(detector),
            default_model,
            preferred_backend,
            inner: Mutex::new(None),
        }
    }

    /// Make sure the requested model is loaded and return a handle to it.
    ///
    /// A matching loaded model is returned immediately with
    /// `from_cache = true`. A mismatching one is disposed first (disposal is
    /// best-effort), then the requested model is loaded. Callers arriving
    /// while a load is in flight wait on the critical section and observe
    /// the fresh cache instead of issuing a duplicate load.
    pub async fn ensure_model(&self, requested: ModelId) -> Result<EnsuredModel<B::Model>> {
        let mut inner = self.inner.lock().await;

        if let Some(loaded) = inner.as_ref() {
            if loaded.model == requested {
                return Ok(EnsuredModel {
                    instance: Arc::clone(&loaded.instance),
                    model: loaded.model,
                    device: loaded.device,
                    from_cache: true,
                });
            }
        }

        if let Some(previous) = inner.take() {
            debug!(from = %previous.model, to = %requested, "Replacing loaded model");
            previous.instance.dispose();
        }

        let loaded = self.load_with_fallback(requested).await?;
        let ensured = EnsuredModel {
            instance: Arc::clone(&loaded.instance),
            model: loaded.model,
            device: loaded.device,
            from_cache: false,
        };
        *inner = Some(loaded);
        Ok(ensured)
    }

    /// Bounded retry policy: try the requested model across backend
    /// candidates; on total failure, fall back once to the default model.
    /// If the default also fails, surface the *original* error.
    async fn load_with_fallback(&self, requested: ModelId) -> Result<Loaded<B::Model>> {
        match self.load_candidates(requested).await {
            Ok(loaded) => Ok(loaded),
            Err(original) => {
                if requested == self.default_model {
                    return Err(original);
                }
                warn!(
                    requested = %requested,
                    fallback = %self.default_model,
                    error = %original,
                    "Model load failed, falling back to default model"
                );
                match self.load_candidates(self.default_model).await {
                    Ok(loaded) => Ok(loaded),
                    Err(fallback_err) => {
                        debug!(error = %fallback_err, "Default model fallback also failed");
                        Err(original)
                    }
                }
            }
        }
    }

    /// Try each backend candidate in order. A failed candidate leaves no
    /// partial state; the next one is attempted. Fails only after all
    /// candidates are exhausted.
    async fn load_candidates(&self, model: ModelId) -> Result<Loaded<B::Model>> {
        let mut last_err = None;

        for device in self.candidate_devices() {
            match self.backend.load(model, device).await {
                Ok(instance) => {
                    info!(model = %model, device = %device, "Model loaded");
                    return Ok(Loaded {
                        model,
                        device,
                        instance: Arc::new(instance),
                    });
                }
                Err(e) => {
                    debug!(model = %model, device = %device, error = %e, "Backend candidate failed");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| VoxError::Model("no backend candidates available".to_string())))
    }

    /// GPU leads only when it is preferred and the (advisory) probe walked
    /// the full acquisition sequence; CPU is always present as the fallback.
    fn candidate_devices(&self) -> Vec<Device> {
        if self.preferred_backend == Device::Gpu && self.probe.probe(false).usable() {
            vec![Device::Gpu, Device::Cpu]
        } else {
            vec![Device::Cpu]
        }
    }

    /// Release the current model instance, if any. Never errors.
    pub async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(loaded) = inner.take() {
            info!(model = %loaded.model, "Disposing loaded model");
            loaded.instance.dispose();
        }
    }

    /// Run or reuse a GPU capability probe.
    pub fn probe(&self, force: bool) -> BackendProbe {
        self.probe.probe(force)
    }

    /// Capability snapshot for the ping/status query.
    pub async fn status(&self) -> ManagerStatus {
        let inner = self.inner.lock().await;
        ManagerStatus {
            preferred_backend: self.preferred_backend,
            active_backend: inner.as_ref().map(|l| l.device),
            active_model: inner.as_ref().map(|l| l.model),
            has_model_loaded: inner.is_some(),
            probe: Some(self.probe.probe(false)),
        }
    }
}
