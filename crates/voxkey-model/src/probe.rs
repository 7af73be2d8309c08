//! GPU capability probe with a short-lived cache.
//!
//! The probe answers one question: can we acquire a GPU adapter and device
//! right now? It is advisory only: it informs backend candidate selection
//! and never blocks a load. All failures are captured into the result; the
//! probe itself never errors.
//!
//! The real detection sequence (behind the `gpu-probe` feature) requests a
//! wgpu adapter, then a device from that adapter, then releases both.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;

use voxkey_core::types::BackendProbe;

/// How long a probe result stays fresh before the next non-forced call
/// re-runs detection.
pub const PROBE_TTL: Duration = Duration::from_secs(10);

/// Raw outcome of one detection run.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub api_present: bool,
    pub adapter_acquired: bool,
    pub device_acquired: bool,
    pub error: Option<String>,
}

/// Capability seam for GPU detection, so probe consumers can be tested
/// without graphics drivers.
pub trait GpuDetect: Send + Sync {
    fn detect(&self) -> Detection;
}

/// Fixed detection result, for tests and for wiring up a known-good or
/// known-absent environment.
#[derive(Debug, Clone, Default)]
pub struct StaticDetect {
    pub detection: Detection,
}

impl StaticDetect {
    /// A detector reporting a fully usable GPU.
    pub fn usable() -> Self {
        Self {
            detection: Detection {
                api_present: true,
                adapter_acquired: true,
                device_acquired: true,
                error: None,
            },
        }
    }

    /// A detector reporting no GPU at all.
    pub fn absent() -> Self {
        Self::default()
    }
}

impl GpuDetect for StaticDetect {
    fn detect(&self) -> Detection {
        self.detection.clone()
    }
}

/// Caching probe front-end over a [`GpuDetect`] implementation.
pub struct GpuProbe<D> {
    detector: D,
    cache: Mutex<Option<(Instant, BackendProbe)>>,
}

impl<D: GpuDetect> GpuProbe<D> {
    pub fn new(detector: D) -> Self {
        Self {
            detector,
            cache: Mutex::new(None),
        }
    }

    /// Run or reuse a capability probe.
    ///
    /// Without `force`, a cached result younger than [`PROBE_TTL`] is
    /// returned as-is. Detection is expensive on some drivers, so callers
    /// default to the cache.
    pub fn probe(&self, force: bool) -> BackendProbe {
        let mut cache = self.cache.lock().expect("probe cache poisoned");

        if !force {
            if let Some((at, result)) = cache.as_ref() {
                if at.elapsed() < PROBE_TTL {
                    return result.clone();
                }
            }
        }

        let d = self.detector.detect();
        let result = BackendProbe {
            gpu_api_present: d.api_present,
            adapter_acquired: d.adapter_acquired,
            device_acquired: d.device_acquired,
            error: d.error,
            checked_at: Utc::now(),
        };

        tracing::debug!(
            api = result.gpu_api_present,
            adapter = result.adapter_acquired,
            device = result.device_acquired,
            error = ?result.error,
            "GPU probe completed"
        );

        *cache = Some((Instant::now(), result.clone()));
        result
    }
}

/// Real wgpu-based detector.
///
/// With the `gpu-probe` feature, walks the adapter/device acquisition
/// sequence and releases the device immediately. Without it, reports the
/// API as absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct WgpuDetect;

#[cfg(feature = "gpu-probe")]
impl GpuDetect for WgpuDetect {
    fn detect(&self) -> Detection {
        let instance = wgpu::Instance::default();

        let adapter = match pollster::block_on(instance.request_adapter(
            &wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        )) {
            Some(a) => a,
            None => {
                return Detection {
                    api_present: true,
                    adapter_acquired: false,
                    device_acquired: false,
                    error: Some("no suitable GPU adapter".to_string()),
                }
            }
        };

        match pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        )) {
            // Device and queue drop here, releasing the acquisition.
            Ok((_device, _queue)) => Detection {
                api_present: true,
                adapter_acquired: true,
                device_acquired: true,
                error: None,
            },
            Err(e) => Detection {
                api_present: true,
                adapter_acquired: true,
                device_acquired: false,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(not(feature = "gpu-probe"))]
impl GpuDetect for WgpuDetect {
    fn detect(&self) -> Detection {
        Detection {
            api_present: false,
            adapter_acquired: false,
            device_acquired: false,
            error: Some("built without the gpu-probe feature".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingDetect {
        calls: Arc<AtomicUsize>,
        detection: Detection,
    }

    impl GpuDetect for CountingDetect {
        fn detect(&self) -> Detection {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.detection.clone()
        }
    }

    #[test]
    fn test_probe_caches_within_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = GpuProbe::new(CountingDetect {
            calls: Arc::clone(&calls),
            detection: Detection::default(),
        });

        probe.probe(false);
        probe.probe(false);
        probe.probe(false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_probe_force_refreshes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = GpuProbe::new(CountingDetect {
            calls: Arc::clone(&calls),
            detection: Detection::default(),
        });

        probe.probe(false);
        probe.probe(true);
        probe.probe(true);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_probe_captures_failure_without_erroring() {
        let probe = GpuProbe::new(StaticDetect {
            detection: Detection {
                api_present: true,
                adapter_acquired: false,
                device_acquired: false,
                error: Some("no adapter".to_string()),
            },
        });

        let result = probe.probe(false);
        assert!(result.gpu_api_present);
        assert!(!result.adapter_acquired);
        assert!(!result.device_acquired);
        assert!(!result.usable());
        assert_eq!(result.error.as_deref(), Some("no adapter"));
    }

    #[test]
    fn test_static_detect_usable() {
        let probe = GpuProbe::new(StaticDetect::usable());
        assert!(probe.probe(false).usable());
    }

    #[cfg(not(feature = "gpu-probe"))]
    #[test]
    fn test_wgpu_detect_stub_reports_absent() {
        let d = WgpuDetect.detect();
        assert!(!d.api_present);
        assert!(d.error.is_some());
    }
}
