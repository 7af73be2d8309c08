//! Real microphone capture via cpal.
//!
//! Opens the configured input device, downmixes to mono, resamples to
//! [`CAPTURE_SAMPLE_RATE`], and delivers frames over the channel returned
//! by [`AudioCapture::start`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{debug, info};

use voxkey_core::error::{Result, VoxError};

use crate::capture::{AudioCapture, CAPTURE_SAMPLE_RATE};

/// Configuration for the cpal capture service.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Name or substring of the input device. "default" selects the
    /// system default input.
    pub device_name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
        }
    }
}

/// Wrapper to make `cpal::Stream` usable inside `Mutex`.
///
/// `cpal::Stream` on Windows contains a `*mut ()` marker that prevents auto
/// `Send`/`Sync`. The stream itself is safe to share via a `Mutex` because
/// we only ever drop it (to stop capture) or store it (to keep it alive).
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: SendStream wraps a cpal::Stream which manages its own audio thread.
// 1. The Stream handle is only used to start/stop capture, not to share data
// 2. Audio callbacks run on a separate OS thread managed by cpal
// 3. No mutable shared state between the Stream handle and callbacks
unsafe impl Send for SendStream {}
unsafe impl Sync for SendStream {}

/// Microphone capture service backed by cpal.
///
/// The stream stays alive while stored; dropping it stops capture.
pub struct CpalCapture {
    config: CaptureConfig,
    active: Arc<AtomicBool>,
    stream: Mutex<Option<SendStream>>,
}

impl CpalCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
            stream: Mutex::new(None),
        }
    }

    fn find_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if self.config.device_name == "default" {
            host.default_input_device()
                .ok_or_else(|| VoxError::Audio("No default input device found".into()))
        } else {
            let name_lower = self.config.device_name.to_lowercase();
            host.input_devices()
                .map_err(|e| VoxError::Audio(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| {
                    d.name()
                        .map(|n| n.to_lowercase().contains(&name_lower))
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    VoxError::Audio(format!(
                        "Audio device '{}' not found",
                        self.config.device_name
                    ))
                })
        }
    }
}

impl AudioCapture for CpalCapture {
    async fn start(&self) -> Result<mpsc::Receiver<Vec<f32>>> {
        if self.active.load(Ordering::Relaxed) {
            return Err(VoxError::Audio("Audio capture already active".into()));
        }

        let device = self.find_device()?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        debug!(device = %device_name, "Selected audio device");

        // Use the device's preferred config. Many devices don't support
        // arbitrary sample rates or channel counts, so convert in the
        // callback instead of forcing a format at open time.
        let supported = device
            .default_input_config()
            .map_err(|e| VoxError::Audio(format!("Could not query input config: {}", e)))?;
        let stream_config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let device_rate = stream_config.sample_rate.0;
        let device_channels = stream_config.channels;
        if device_rate != CAPTURE_SAMPLE_RATE || device_channels != 1 {
            info!(
                device_rate,
                device_channels,
                target_rate = CAPTURE_SAMPLE_RATE,
                "Audio callback will downmix/resample"
            );
        }

        let (tx, rx) = mpsc::channel::<Vec<f32>>(256);
        let active_flag = Arc::clone(&self.active);
        let error_flag = Arc::clone(&self.active);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frame = convert_frame(data, device_channels, device_rate);
                    // A full channel means the consumer fell behind; the
                    // frame is dropped rather than blocking the audio thread.
                    if tx.try_send(frame).is_err() && !tx.is_closed() {
                        tracing::warn!("Capture channel full, dropping frame");
                    }
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                    error_flag.store(false, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| VoxError::Audio(format!("Failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| VoxError::Audio(format!("Failed to start audio stream: {}", e)))?;

        if let Ok(mut guard) = self.stream.lock() {
            *guard = Some(SendStream(stream));
        }
        active_flag.store(true, Ordering::Relaxed);
        info!(
            device = %device_name,
            device_rate,
            device_channels,
            target_rate = CAPTURE_SAMPLE_RATE,
            "Audio capture started"
        );

        Ok(rx)
    }

    async fn stop(&self) -> Result<()> {
        if !self.active.load(Ordering::Relaxed) {
            return Err(VoxError::Audio("Audio capture is not active".into()));
        }

        // Dropping the stream stops capture and closes the frame channel.
        if let Ok(mut guard) = self.stream.lock() {
            *guard = None;
        }
        self.active.store(false, Ordering::Relaxed);
        info!("Audio capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// Downmix interleaved device samples to mono and resample to
/// [`CAPTURE_SAMPLE_RATE`] via linear interpolation.
fn convert_frame(data: &[f32], channels: u16, rate: u32) -> Vec<f32> {
    let mono: Vec<f32> = if channels > 1 {
        let ch = channels as usize;
        data.chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    } else {
        data.to_vec()
    };

    if rate == CAPTURE_SAMPLE_RATE || mono.is_empty() {
        return mono;
    }

    let ratio = rate as f64 / CAPTURE_SAMPLE_RATE as f64;
    let out_len = (mono.len() as f64 / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx0 = src.floor() as usize;
        let idx1 = (idx0 + 1).min(mono.len() - 1);
        let frac = (src - idx0 as f64) as f32;
        out.push(mono[idx0] * (1.0 - frac) + mono[idx1] * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_default() {
        assert_eq!(CaptureConfig::default().device_name, "default");
    }

    #[test]
    fn test_convert_frame_stereo_downmix() {
        let stereo = vec![0.4f32, 0.6, 0.2, 0.8, 1.0, 0.0];
        let mono = convert_frame(&stereo, 2, CAPTURE_SAMPLE_RATE);
        assert_eq!(mono.len(), 3);
        for sample in mono {
            assert!((sample - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_convert_frame_passthrough_at_native_rate() {
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(convert_frame(&input, 1, CAPTURE_SAMPLE_RATE), input);
    }

    #[test]
    fn test_convert_frame_resamples_96k() {
        // 96 kHz → 48 kHz is a 2:1 ratio.
        let input: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let out = convert_frame(&input, 1, 96_000);
        assert_eq!(out.len(), 10);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 2.0).abs() < 1e-6);
        assert!((out[9] - 18.0).abs() < 1e-6);
    }

    #[test]
    fn test_convert_frame_empty() {
        assert!(convert_frame(&[], 2, 96_000).is_empty());
    }
}
