//! System-wide dictation trigger key.
//!
//! Windows is the only platform with a real registration, via the
//! `global-hotkey` crate; elsewhere a stub compiles in whose poll never
//! reports a press, so the binary still runs without a trigger.

use voxkey_core::error::{Result, VoxError};

/// The key combination that toggles dictation.
#[derive(Debug, Clone)]
pub struct HotkeyConfig {
    /// `global-hotkey` textual syntax, e.g. "F9" or "Ctrl+Shift+D".
    pub key: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: "F9".to_string(),
        }
    }
}

/// A registered system-wide hotkey, polled rather than callback-driven.
///
/// Registration lives as long as the service; dropping it releases the
/// key back to the OS.
pub struct HotkeyService {
    key: String,
    #[cfg(target_os = "windows")]
    manager: global_hotkey::GlobalHotKeyManager,
    #[cfg(target_os = "windows")]
    registered: global_hotkey::hotkey::HotKey,
}

impl HotkeyService {
    #[cfg(target_os = "windows")]
    pub fn new(config: HotkeyConfig) -> Result<Self> {
        use global_hotkey::hotkey::HotKey;
        use global_hotkey::GlobalHotKeyManager;
        use std::str::FromStr;

        // Parse before touching the OS so a bad config string fails fast.
        let registered = HotKey::from_str(&config.key)
            .map_err(|e| VoxError::Hotkey(format!("'{}' is not a valid hotkey: {}", config.key, e)))?;

        let manager = GlobalHotKeyManager::new()
            .map_err(|e| VoxError::Hotkey(format!("hotkey backend unavailable: {}", e)))?;
        manager
            .register(registered)
            .map_err(|e| VoxError::Hotkey(format!("could not claim '{}': {}", config.key, e)))?;

        tracing::info!(key = %config.key, "Dictation hotkey registered");
        Ok(Self {
            key: config.key,
            manager,
            registered,
        })
    }

    #[cfg(not(target_os = "windows"))]
    pub fn new(config: HotkeyConfig) -> Result<Self> {
        tracing::warn!(key = %config.key, "No global hotkey support on this platform");
        Ok(Self { key: config.key })
    }

    /// The configured key string.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Poll for presses since the last call, draining any backlog so a
    /// slow poller sees at most one toggle per call.
    #[cfg(target_os = "windows")]
    pub fn was_pressed(&self) -> bool {
        use global_hotkey::GlobalHotKeyEvent;

        let mut pressed = false;
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            if event.id() == self.registered.id() {
                pressed = true;
            }
        }
        pressed
    }

    #[cfg(not(target_os = "windows"))]
    pub fn was_pressed(&self) -> bool {
        false
    }
}

#[cfg(target_os = "windows")]
impl Drop for HotkeyService {
    fn drop(&mut self) {
        if self.manager.unregister(self.registered).is_err() {
            tracing::warn!(key = %self.key, "Hotkey was not released cleanly");
        }
    }
}
