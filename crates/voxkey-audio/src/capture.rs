//! The audio capture seam and its hardware-free mock.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use voxkey_core::error::{Result, VoxError};

/// Sample rate every capture implementation delivers, mono f32.
pub const CAPTURE_SAMPLE_RATE: u32 = 48_000;

/// Service producing a stream of mono f32 sample frames at
/// [`CAPTURE_SAMPLE_RATE`].
///
/// At most one capture may be active per service instance; `start` while
/// active is an error.
pub trait AudioCapture: Send + Sync {
    /// Open the source and return the frame stream. The stream ends when
    /// `stop` is called or the device fails.
    fn start(&self) -> impl Future<Output = Result<mpsc::Receiver<Vec<f32>>>> + Send;

    /// Tear down the source. Stopping an inactive capture is an error.
    fn stop(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether a capture is currently active.
    fn is_active(&self) -> bool;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock capture fed from scripted frames, for testing the recorder and
/// coordinator without audio hardware.
pub struct MockCapture {
    active: AtomicBool,
    fail_next_start: AtomicBool,
    script: Mutex<Vec<Vec<f32>>>,
    live_tx: Mutex<Option<mpsc::Sender<Vec<f32>>>>,
}

impl Default for MockCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCapture {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            fail_next_start: AtomicBool::new(false),
            script: Mutex::new(Vec::new()),
            live_tx: Mutex::new(None),
        }
    }

    /// Queue frames that are delivered immediately when `start` is called.
    pub fn push_frames(&self, frames: Vec<Vec<f32>>) {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .extend(frames);
    }

    /// Queue one frame of `len` samples at constant `amplitude`.
    pub fn push_tone(&self, amplitude: f32, len: usize) {
        self.push_frames(vec![vec![amplitude; len]]);
    }

    /// Make the next `start` call fail, simulating a device error.
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    /// Feed a frame into an active capture.
    pub fn feed(&self, frame: Vec<f32>) {
        if let Some(tx) = self.live_tx.lock().expect("live_tx mutex poisoned").as_ref() {
            let _ = tx.try_send(frame);
        }
    }
}

impl AudioCapture for MockCapture {
    async fn start(&self) -> Result<mpsc::Receiver<Vec<f32>>> {
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(VoxError::Audio("mock device unavailable".to_string()));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(VoxError::Audio("capture already active".to_string()));
        }

        let (tx, rx) = mpsc::channel(1024);
        for frame in self.script.lock().expect("script mutex poisoned").drain(..) {
            let _ = tx.try_send(frame);
        }
        *self.live_tx.lock().expect("live_tx mutex poisoned") = Some(tx);

        tracing::debug!("Mock capture started");
        Ok(rx)
    }

    async fn stop(&self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Err(VoxError::Audio("capture is not active".to_string()));
        }
        *self.live_tx.lock().expect("live_tx mutex poisoned") = None;
        tracing::debug!("Mock capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
