//! Event Normalizer
//!
//! Collapses heterogeneous raw events into the canonical mining alphabet.
//! Every function here is pure and total: any input produces exactly one step,
//! and unrecognised events become an `unknown` action instead of an error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::config::NormalizerConfig;
use crate::event::{
    AppSessionData, AppSwitchData, ClipboardData, EventPayload, FileSystemData, KeyboardData,
    RawEvent,
};

pub const UNKNOWN_ACTION: &str = "unknown";

// macOS virtual key codes.
const FUNCTION_KEYS: std::ops::RangeInclusive<u16> = 96..=111;
const MODIFIER_KEYS: [u16; 10] = [54, 55, 56, 57, 58, 59, 60, 61, 62, 63];
const SPECIAL_KEYS: [u16; 15] = [
    36,  // return
    48,  // tab
    49,  // space
    51,  // delete
    53,  // escape
    76,  // keypad enter
    115, // home
    116, // page up
    117, // forward delete
    119, // end
    121, // page down
    123, 124, 125, 126, // arrows
];

/// Step type. Known event types map to their own variant; any other raw type
/// string is carried as is, so two unrecognised types never collapse together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Keyboard,
    Clipboard,
    AppSwitch,
    AppSession,
    FileSystem,
    Other(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Keyboard => EventPayload::KEYBOARD,
            StepKind::Clipboard => EventPayload::CLIPBOARD,
            StepKind::AppSwitch => EventPayload::APP_SWITCH,
            StepKind::AppSession => EventPayload::APP_SESSION,
            StepKind::FileSystem => EventPayload::FILESYSTEM,
            StepKind::Other(kind) => kind.as_str(),
        }
    }
}

impl From<&str> for StepKind {
    fn from(kind: &str) -> Self {
        match kind {
            EventPayload::KEYBOARD => StepKind::Keyboard,
            EventPayload::CLIPBOARD => StepKind::Clipboard,
            EventPayload::APP_SWITCH => StepKind::AppSwitch,
            EventPayload::APP_SESSION => StepKind::AppSession,
            EventPayload::FILESYSTEM => StepKind::FileSystem,
            other => StepKind::Other(other.to_string()),
        }
    }
}

impl From<String> for StepKind {
    fn from(kind: String) -> Self {
        StepKind::from(kind.as_str())
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a step for mining. Context never takes part in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey {
    pub kind: StepKind,
    pub action: String,
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.action)
    }
}

/// Contextual metadata carried along a step. Never compared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    pub application: Option<String>,
    pub bundle_id: Option<String>,
    pub pattern_value: Option<String>,
}

/// Canonical unit derived from a raw event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<StepContext>,
}

impl Step {
    pub fn new(kind: StepKind, action: impl Into<String>) -> Self {
        Self { kind, action: action.into(), context: None }
    }

    pub fn key(&self) -> StepKey {
        StepKey { kind: self.kind.clone(), action: self.action.clone() }
    }

    /// `type:action`, the unit of a pattern signature.
    pub fn signature(&self) -> String {
        format!("{}:{}", self.kind, self.action)
    }

    pub fn application(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.application.as_deref())
    }
}

// Equality ignores context: the same type/action in two applications is one step.
impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.action == other.action
    }
}

impl Eq for Step {}

impl Hash for Step {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.action.hash(state);
    }
}

/// Class of a key code, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    Function,
    Modifier,
    Special,
    Alphanumeric,
}

impl KeyClass {
    pub fn of(key_code: u16) -> Self {
        if FUNCTION_KEYS.contains(&key_code) {
            KeyClass::Function
        } else if MODIFIER_KEYS.contains(&key_code) {
            KeyClass::Modifier
        } else if SPECIAL_KEYS.contains(&key_code) {
            KeyClass::Special
        } else {
            KeyClass::Alphanumeric
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            KeyClass::Function => "function_key",
            KeyClass::Modifier => "modifier_key",
            KeyClass::Special => "special_key",
            KeyClass::Alphanumeric => "alphanumeric_key",
        }
    }
}

/// Coarse guess at what was copied or pasted.
pub fn guess_content_type(content: &str) -> &'static str {
    if content.is_empty() {
        "empty"
    } else if content.starts_with("http://") || content.starts_with("https://") {
        "url"
    } else if content.contains('/') || content.contains('\\') {
        "path"
    } else if content.contains('{') || content.contains(';') || content.contains('=') {
        "code"
    } else {
        "text"
    }
}

/// Extension of the file-name component, `unknown` when there is none.
pub fn file_extension(path: &str) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
        _ => UNKNOWN_ACTION.to_string(),
    }
}

fn prefixed(prefix: &str, suffix: Option<&str>, fallback: &str) -> String {
    match suffix.filter(|s| !s.is_empty()) {
        Some(s) => format!("{prefix}_{s}"),
        None => fallback.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(&self, event: &RawEvent) -> Step {
        let (kind, action, pattern_value) = match &event.payload {
            EventPayload::Keyboard(data) => self.keyboard(data),
            EventPayload::Clipboard(data) => self.clipboard(data),
            EventPayload::AppSwitch(data) => Self::app_switch(data),
            EventPayload::AppSession(data) => Self::app_session(data),
            EventPayload::FileSystem(data) => Self::filesystem(data, event),
            // Keeps the raw type, including known types whose data did not decode.
            EventPayload::Unknown { kind, .. } => {
                (StepKind::from(kind.as_str()), UNKNOWN_ACTION.to_string(), None)
            }
        };

        let context = self.config.include_context.then(|| StepContext {
            application: event.application().map(str::to_string),
            bundle_id: event.bundle_id().map(str::to_string),
            pattern_value,
        });

        Step { kind, action, context }
    }

    /// Order-preserving, one step per event.
    pub fn normalize_all(&self, events: &[RawEvent]) -> Vec<Step> {
        events.iter().map(|e| self.normalize(e)).collect()
    }

    fn keyboard(&self, data: &KeyboardData) -> (StepKind, String, Option<String>) {
        let class = KeyClass::of(data.key_code);
        let value = if self.config.generalize_keys {
            class.action().to_string()
        } else {
            data.key_code.to_string()
        };
        (StepKind::Keyboard, class.action().to_string(), Some(value))
    }

    fn clipboard(&self, data: &ClipboardData) -> (StepKind, String, Option<String>) {
        let action = prefixed("clipboard", data.operation.as_deref(), "clipboard_operation");
        let value = if self.config.generalize_clipboard {
            "clipboard_content"
        } else {
            guess_content_type(data.content.as_deref().unwrap_or(""))
        };
        (StepKind::Clipboard, action, Some(value.to_string()))
    }

    fn app_switch(data: &AppSwitchData) -> (StepKind, String, Option<String>) {
        (StepKind::AppSwitch, "app_switch".to_string(), data.to.clone())
    }

    fn app_session(data: &AppSessionData) -> (StepKind, String, Option<String>) {
        let action = prefixed("app_session", data.subaction.as_deref(), "app_session_event");
        (StepKind::AppSession, action, None)
    }

    fn filesystem(data: &FileSystemData, event: &RawEvent) -> (StepKind, String, Option<String>) {
        let action = prefixed("file", data.operation.as_deref(), "file_operation");
        let path = data
            .path
            .as_deref()
            .or_else(|| event.context.as_ref().and_then(|c| c.file_path.as_deref()));
        let extension = path.map(file_extension).unwrap_or_else(|| UNKNOWN_ACTION.to_string());
        (StepKind::FileSystem, action, Some(extension))
    }
}
