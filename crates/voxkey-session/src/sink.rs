//! Delivering results to the focused application.
//!
//! On Windows, transcribed text is typed into the focused window via
//! `SendInput` with Unicode keystrokes. Non-terminal outcomes (silence,
//! unintelligible speech, timeouts, failures) surface as notices instead
//! of text.

use std::sync::Mutex;

use voxkey_core::error::Result;
#[cfg(not(target_os = "windows"))]
use voxkey_core::error::VoxError;

/// User-visible outcome that carries no text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserNotice {
    /// Nothing but silence was captured.
    NoAudio,
    /// The model heard something but produced nothing usable.
    Unintelligible,
    /// No terminal reply arrived before the watchdog fired.
    Timeout,
    /// Capture, load, or inference failed.
    Failure(String),
}

/// Where terminal session effects land.
pub trait TextSink: Send + Sync {
    /// Type the text at the current input focus.
    fn insert_text(&self, text: &str) -> Result<()>;

    /// Synthesize an Enter key press, submitting the focused input.
    fn press_enter(&self) -> Result<()>;

    /// Surface a non-text outcome to the user.
    fn notify(&self, notice: UserNotice);
}

// =============================================================================
// SendInput implementation
// =============================================================================

/// Injects keystrokes into the focused application via the Windows
/// SendInput API. On non-Windows platforms every injection errors.
pub struct SendInputSink;

impl SendInputSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendInputSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "windows")]
mod send_input {
    use windows_sys::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE,
    };

    use voxkey_core::error::{Result, VoxError};

    const VK_RETURN: u16 = 0x0D;

    fn unicode_pair(scan_code: u16) -> [INPUT; 2] {
        let key = |flags| INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: 0,
                    wScan: scan_code,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        [key(KEYEVENTF_UNICODE), key(KEYEVENTF_UNICODE | KEYEVENTF_KEYUP)]
    }

    fn send(inputs: &[INPUT]) -> Result<()> {
        let sent = unsafe {
            SendInput(
                inputs.len() as u32,
                inputs.as_ptr(),
                std::mem::size_of::<INPUT>() as i32,
            )
        };
        if sent as usize != inputs.len() {
            return Err(VoxError::Session(format!(
                "SendInput only sent {} of {} events",
                sent,
                inputs.len()
            )));
        }
        Ok(())
    }

    pub fn type_text(text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let inputs: Vec<INPUT> = text
            .chars()
            .flat_map(|ch| unicode_pair(ch as u16))
            .collect();
        send(&inputs)?;
        tracing::info!(chars = text.chars().count(), "Text injected");
        Ok(())
    }

    pub fn press_enter() -> Result<()> {
        let key = |flags| INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VK_RETURN,
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        send(&[key(0), key(KEYEVENTF_KEYUP)])
    }
}

#[cfg(target_os = "windows")]
impl TextSink for SendInputSink {
    fn insert_text(&self, text: &str) -> Result<()> {
        tracing::debug!(text_len = text.len(), "Injecting text via SendInput");
        send_input::type_text(text)
    }

    fn press_enter(&self) -> Result<()> {
        send_input::press_enter()
    }

    fn notify(&self, notice: UserNotice) {
        match notice {
            UserNotice::NoAudio => tracing::info!("Nothing was heard"),
            UserNotice::Unintelligible => tracing::info!("Speech was unintelligible"),
            UserNotice::Timeout => tracing::warn!("Transcription timed out"),
            UserNotice::Failure(message) => tracing::error!(%message, "Dictation failed"),
        }
    }
}

#[cfg(not(target_os = "windows"))]
impl TextSink for SendInputSink {
    fn insert_text(&self, text: &str) -> Result<()> {
        tracing::warn!(
            text_len = text.len(),
            "SendInput not available on this platform"
        );
        Err(VoxError::Session(
            "Text injection is only available on Windows".into(),
        ))
    }

    fn press_enter(&self) -> Result<()> {
        Err(VoxError::Session(
            "Text injection is only available on Windows".into(),
        ))
    }

    fn notify(&self, notice: UserNotice) {
        tracing::info!(?notice, "User notice");
    }
}

// =============================================================================
// Memory implementation
// =============================================================================

/// Sink that records every effect, for coordinator tests.
#[derive(Default)]
pub struct MemorySink {
    inserted: Mutex<Vec<String>>,
    enters: Mutex<usize>,
    notices: Mutex<Vec<UserNotice>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inserted(&self) -> Vec<String> {
        self.inserted.lock().expect("inserted mutex poisoned").clone()
    }

    pub fn enter_count(&self) -> usize {
        *self.enters.lock().expect("enters mutex poisoned")
    }

    pub fn notices(&self) -> Vec<UserNotice> {
        self.notices.lock().expect("notices mutex poisoned").clone()
    }
}

impl TextSink for MemorySink {
    fn insert_text(&self, text: &str) -> Result<()> {
        self.inserted
            .lock()
            .expect("inserted mutex poisoned")
            .push(text.to_string());
        Ok(())
    }

    fn press_enter(&self) -> Result<()> {
        *self.enters.lock().expect("enters mutex poisoned") += 1;
        Ok(())
    }

    fn notify(&self, notice: UserNotice) {
        self.notices
            .lock()
            .expect("notices mutex poisoned")
            .push(notice);
    }
}
