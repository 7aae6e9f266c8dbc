use std::sync::Arc;

use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    Error as HotkeyError, GlobalHotKeyManager, HotKeyState,
};
use tracing::{debug, info, warn};

use crate::config::HotkeyConfig;

/// Callback fired when the recall shortcut is pressed.
pub type HotkeyHandler = Arc<dyn Fn() + Send + Sync>;

// =============================================================================
// Key map
// =============================================================================

/// Translate a modifier-list + key-name description into a platform hotkey.
///
/// Names are case-insensitive. Unknown modifiers are ignored and an
/// unrecognised key falls back to `V`.
pub fn parse_hotkey(config: &HotkeyConfig) -> HotKey {
    let mut modifiers = Modifiers::empty();
    for modifier in &config.modifiers {
        match modifier.to_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "shift" => modifiers |= Modifiers::SHIFT,
            "alt" | "option" => modifiers |= Modifiers::ALT,
            "win" | "meta" | "cmd" | "super" => modifiers |= Modifiers::SUPER,
            other => debug!(modifier = other, "Ignoring unknown hotkey modifier"),
        }
    }

    let code = key_code(&config.key).unwrap_or_else(|| {
        warn!(key = %config.key, "Unknown hotkey key, falling back to V");
        Code::KeyV
    });

    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    HotKey::new(modifiers, code)
}

fn key_code(key: &str) -> Option<Code> {
    let key = key.trim().to_lowercase();
    let code = match key.as_str() {
        "f1" => Code::F1,
        "f2" => Code::F2,
        "f3" => Code::F3,
        "f4" => Code::F4,
        "f5" => Code::F5,
        "f6" => Code::F6,
        "f7" => Code::F7,
        "f8" => Code::F8,
        "f9" => Code::F9,
        "f10" => Code::F10,
        "f11" => Code::F11,
        "f12" => Code::F12,
        "space" => Code::Space,
        "tab" => Code::Tab,
        "enter" | "return" => Code::Enter,
        "escape" | "esc" => Code::Escape,
        "backspace" => Code::Backspace,
        "delete" => Code::Delete,
        "insert" => Code::Insert,
        "home" => Code::Home,
        "end" => Code::End,
        "pageup" => Code::PageUp,
        "pagedown" => Code::PageDown,
        single if single.chars().count() == 1 => {
            let c = single.chars().next()?;
            return letter_code(c).or_else(|| digit_code(c));
        }
        _ => return None,
    };
    Some(code)
}

fn letter_code(c: char) -> Option<Code> {
    let code = match c {
        'a' => Code::KeyA,
        'b' => Code::KeyB,
        'c' => Code::KeyC,
        'd' => Code::KeyD,
        'e' => Code::KeyE,
        'f' => Code::KeyF,
        'g' => Code::KeyG,
        'h' => Code::KeyH,
        'i' => Code::KeyI,
        'j' => Code::KeyJ,
        'k' => Code::KeyK,
        'l' => Code::KeyL,
        'm' => Code::KeyM,
        'n' => Code::KeyN,
        'o' => Code::KeyO,
        'p' => Code::KeyP,
        'q' => Code::KeyQ,
        'r' => Code::KeyR,
        's' => Code::KeyS,
        't' => Code::KeyT,
        'u' => Code::KeyU,
        'v' => Code::KeyV,
        'w' => Code::KeyW,
        'x' => Code::KeyX,
        'y' => Code::KeyY,
        'z' => Code::KeyZ,
        _ => return None,
    };
    Some(code)
}

fn digit_code(c: char) -> Option<Code> {
    let code = match c {
        '0' => Code::Digit0,
        '1' => Code::Digit1,
        '2' => Code::Digit2,
        '3' => Code::Digit3,
        '4' => Code::Digit4,
        '5' => Code::Digit5,
        '6' => Code::Digit6,
        '7' => Code::Digit7,
        '8' => Code::Digit8,
        '9' => Code::Digit9,
        _ => return None,
    };
    Some(code)
}

/// Format a hotkey registration error with helpful context
fn format_hotkey_error(e: &HotkeyError, shortcut_display: &str) -> String {
    match e {
        HotkeyError::AlreadyRegistered(hk) => format!(
            "Hotkey '{}' is already registered by another application (ID: {}). \
             Pick a different shortcut in settings.",
            shortcut_display,
            hk.id()
        ),
        HotkeyError::FailedToRegister(msg) => format!(
            "System rejected hotkey '{}': {}. This shortcut may be reserved by the OS.",
            shortcut_display, msg
        ),
        HotkeyError::OsError(os_err) => format!(
            "OS error registering '{}': {}. Check system hotkey settings.",
            shortcut_display, os_err
        ),
        other => format!(
            "Failed to register hotkey '{}': {}",
            shortcut_display, other
        ),
    }
}

// =============================================================================
// Registration
// =============================================================================

/// OS-level shortcut registration.
///
/// Implementations are thread-affine: register, unregister and event delivery
/// all happen on the thread that created the registrar.
pub trait ShortcutRegistrar {
    fn register(&self, hotkey: HotKey) -> Result<(), HotkeyError>;
    fn unregister(&self, hotkey: HotKey) -> Result<(), HotkeyError>;
}

impl ShortcutRegistrar for GlobalHotKeyManager {
    fn register(&self, hotkey: HotKey) -> Result<(), HotkeyError> {
        GlobalHotKeyManager::register(self, hotkey)
    }

    fn unregister(&self, hotkey: HotKey) -> Result<(), HotkeyError> {
        GlobalHotKeyManager::unregister(self, hotkey)
    }
}

/// Owns the single recall shortcut.
///
/// Lives on the capture monitor thread together with its registrar.
pub struct HotkeyCoordinator<R: ShortcutRegistrar> {
    registrar: R,
    current: Option<HotKey>,
    handler: HotkeyHandler,
}

impl<R: ShortcutRegistrar> HotkeyCoordinator<R> {
    pub fn new(registrar: R, handler: HotkeyHandler) -> Self {
        Self {
            registrar,
            current: None,
            handler,
        }
    }

    /// Replace the active binding.
    ///
    /// The previous binding is always released first. If the new one cannot be
    /// registered the shortcut stays unbound and the error message is returned.
    pub fn set_hotkey(&mut self, config: &HotkeyConfig) -> Result<HotKey, String> {
        self.clear();

        let hotkey = parse_hotkey(config);
        let shown = config.display();
        if let Err(e) = self.registrar.register(hotkey) {
            let message = format_hotkey_error(&e, &shown);
            warn!(hotkey = %shown, "{}", message);
            return Err(message);
        }

        info!(hotkey = %shown, id = hotkey.id(), "Registered recall hotkey");
        self.current = Some(hotkey);
        Ok(hotkey)
    }

    /// Release the active binding, if any.
    pub fn clear(&mut self) {
        if let Some(previous) = self.current.take() {
            if let Err(e) = self.registrar.unregister(previous) {
                // The binding is dropped from our side regardless.
                warn!(id = previous.id(), error = %e, "Failed to unregister hotkey");
            } else {
                debug!(id = previous.id(), "Unregistered recall hotkey");
            }
        }
    }

    pub fn current(&self) -> Option<HotKey> {
        self.current
    }

    /// Dispatch one hotkey event. Returns true when it was the recall
    /// shortcut being pressed and the handler ran.
    pub fn handle_event(&self, id: u32, state: HotKeyState) -> bool {
        if state != HotKeyState::Pressed {
            return false;
        }
        match self.current {
            Some(hotkey) if hotkey.id() == id => {
                debug!(id, "Recall hotkey pressed");
                (self.handler)();
                true
            }
            _ => false,
        }
    }
}

impl<R: ShortcutRegistrar> Drop for HotkeyCoordinator<R> {
    fn drop(&mut self) {
        self.clear();
    }
}
