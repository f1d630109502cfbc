use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A captured user-interaction event. Immutable once captured.
///
/// On the wire the payload is `{"type": ..., "data": {...}}`. Decoding is total:
/// an unrecognised type or a malformed `data` object yields `EventPayload::Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireEvent", into = "WireEvent")]
pub struct RawEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
    pub context: Option<EventContext>,
}

/// Closed set of event shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Keyboard(KeyboardData),
    Clipboard(ClipboardData),
    AppSwitch(AppSwitchData),
    AppSession(AppSessionData),
    FileSystem(FileSystemData),
    /// An event we do not know how to read: its raw type tag and untouched `data`.
    Unknown { kind: String, data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyboardData {
    pub key_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardData {
    pub operation: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSwitchData {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSessionData {
    pub subaction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemData {
    pub operation: Option<String>,
    pub path: Option<String>,
}

/// Where the event happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventContext {
    pub application: Option<String>,
    #[serde(rename = "bundleID")]
    pub bundle_id: Option<String>,
    pub window_title: Option<String>,
    pub file_path: Option<String>,
    pub selection: Option<String>,
}

impl EventPayload {
    pub const KEYBOARD: &'static str = "keyboard";
    pub const CLIPBOARD: &'static str = "clipboard";
    pub const APP_SWITCH: &'static str = "app_switch";
    pub const APP_SESSION: &'static str = "app_session";
    pub const FILESYSTEM: &'static str = "filesystem";

    pub fn type_name(&self) -> &str {
        match self {
            EventPayload::Keyboard(_) => Self::KEYBOARD,
            EventPayload::Clipboard(_) => Self::CLIPBOARD,
            EventPayload::AppSwitch(_) => Self::APP_SWITCH,
            EventPayload::AppSession(_) => Self::APP_SESSION,
            EventPayload::FileSystem(_) => Self::FILESYSTEM,
            EventPayload::Unknown { kind, .. } => kind.as_str(),
        }
    }

    pub fn keyboard(key_code: u16) -> Self {
        EventPayload::Keyboard(KeyboardData { key_code, characters: None })
    }

    pub fn clipboard(operation: &str) -> Self {
        EventPayload::Clipboard(ClipboardData {
            operation: Some(operation.to_string()),
            content: None,
        })
    }

    pub fn unknown(kind: &str) -> Self {
        EventPayload::Unknown { kind: kind.to_string(), data: Value::Null }
    }

    pub fn file(operation: &str, path: &str) -> Self {
        EventPayload::FileSystem(FileSystemData {
            operation: Some(operation.to_string()),
            path: Some(path.to_string()),
        })
    }

    fn decode(kind: String, data: Value) -> Self {
        fn parse<T: DeserializeOwned>(data: Value) -> Option<T> {
            // Missing data reads as an empty object so all-optional shapes still decode.
            let data = if data.is_null() { Value::Object(Default::default()) } else { data };
            serde_json::from_value(data).ok()
        }

        let decoded = match kind.as_str() {
            Self::KEYBOARD => parse(data.clone()).map(EventPayload::Keyboard),
            Self::CLIPBOARD => parse(data.clone()).map(EventPayload::Clipboard),
            Self::APP_SWITCH => parse(data.clone()).map(EventPayload::AppSwitch),
            Self::APP_SESSION => parse(data.clone()).map(EventPayload::AppSession),
            Self::FILESYSTEM => parse(data.clone()).map(EventPayload::FileSystem),
            _ => None,
        };
        decoded.unwrap_or(EventPayload::Unknown { kind, data })
    }

    fn encode(&self) -> Value {
        let encoded = match self {
            EventPayload::Keyboard(d) => serde_json::to_value(d),
            EventPayload::Clipboard(d) => serde_json::to_value(d),
            EventPayload::AppSwitch(d) => serde_json::to_value(d),
            EventPayload::AppSession(d) => serde_json::to_value(d),
            EventPayload::FileSystem(d) => serde_json::to_value(d),
            EventPayload::Unknown { data, .. } => Ok(data.clone()),
        };
        encoded.unwrap_or(Value::Null)
    }
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    id: Uuid,
    #[serde(rename = "type")]
    kind: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<EventContext>,
}

impl From<WireEvent> for RawEvent {
    fn from(wire: WireEvent) -> Self {
        Self {
            id: wire.id,
            timestamp: wire.timestamp,
            payload: EventPayload::decode(wire.kind, wire.data),
            context: wire.context,
        }
    }
}

impl From<RawEvent> for WireEvent {
    fn from(event: RawEvent) -> Self {
        Self {
            id: event.id,
            kind: event.payload.type_name().to_string(),
            timestamp: event.timestamp,
            data: event.payload.encode(),
            context: event.context,
        }
    }
}

impl RawEvent {
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            payload,
            context: None,
        }
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Shorthand for an application-only context.
    pub fn in_app(self, application: &str) -> Self {
        self.with_context(EventContext {
            application: Some(application.to_string()),
            ..EventContext::default()
        })
    }

    /// Non-empty application name, if any.
    pub fn application(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|c| c.application.as_deref())
            .filter(|app| !app.is_empty())
    }

    pub fn bundle_id(&self) -> Option<&str> {
        self.context
            .as_ref()
            .and_then(|c| c.bundle_id.as_deref())
            .filter(|b| !b.is_empty())
    }
}
