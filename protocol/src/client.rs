//! Wire shapes for the local client socket (line-delimited JSON).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed vocabulary of command types a client may submit.
///
/// Unknown strings fail to deserialize, which the router turns into a
/// structural validation error rather than a silent pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    // navigation
    Navigate,
    Open,
    Back,
    Forward,
    Reload,
    Close,
    // snapshot
    Snapshot,
    // element interactions
    Click,
    Dblclick,
    Fill,
    Type,
    Press,
    Hover,
    Focus,
    Check,
    Uncheck,
    Select,
    // scroll
    Scroll,
    Scrollintoview,
    // queries
    Get,
    Is,
    Find,
    // advanced
    Drag,
    Upload,
    Mouse,
    Wait,
    // tab management
    Tab,
    TabNew,
    TabClose,
    TabSwitch,
    TabList,
    // capture
    Screenshot,
    Pdf,
    // scripting
    Eval,
}

impl CommandType {
    /// Whether this type belongs to the `tab_*` family that collapses to a
    /// single extension-facing `tab` command with an `action` subfield.
    pub fn is_tab_family(self) -> bool {
        matches!(
            self,
            Self::TabNew | Self::TabClose | Self::TabSwitch | Self::TabList
        )
    }

    /// The snake_case wire string for this variant, as sent to the
    /// extension channel (same spelling serde would produce, exposed
    /// directly so the router can build extension-facing command shapes
    /// without round-tripping through `serde_json::Value`).
    pub fn wire_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Open => "open",
            Self::Back => "back",
            Self::Forward => "forward",
            Self::Reload => "reload",
            Self::Close => "close",
            Self::Snapshot => "snapshot",
            Self::Click => "click",
            Self::Dblclick => "dblclick",
            Self::Fill => "fill",
            Self::Type => "type",
            Self::Press => "press",
            Self::Hover => "hover",
            Self::Focus => "focus",
            Self::Check => "check",
            Self::Uncheck => "uncheck",
            Self::Select => "select",
            Self::Scroll => "scroll",
            Self::Scrollintoview => "scrollintoview",
            Self::Get => "get",
            Self::Is => "is",
            Self::Find => "find",
            Self::Drag => "drag",
            Self::Upload => "upload",
            Self::Mouse => "mouse",
            Self::Wait => "wait",
            Self::Tab => "tab",
            Self::TabNew => "tab_new",
            Self::TabClose => "tab_close",
            Self::TabSwitch => "tab_switch",
            Self::TabList => "tab_list",
            Self::Screenshot => "screenshot",
            Self::Pdf => "pdf",
            Self::Eval => "eval",
        }
    }
}

/// A client-submitted command, addressed to a single session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default)]
    pub params: Option<Value>,
    pub timestamp: String,
}

/// The terminal outcome of a command, reported back to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            id: id.into(),
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// A request from a local client, keyed by `type` with the payload carried
/// adjacently under `payload` — matches the envelope `{type, payload?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    Ping,
    Command(Command),
    GetEndpoint,
    RegisterExtension,
    /// Supplemental: list all known sessions and their states.
    ListSessions,
    /// Supplemental: explicitly close a session.
    CloseSession { session_id: String },
}

/// A reply from the daemon to a local client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientResponse {
    Pong,
    Response(CommandResponse),
    Endpoint {
        ip: String,
        port: u16,
    },
    #[serde(rename_all = "camelCase")]
    Registration {
        session_id: String,
        ip: String,
        port: u16,
    },
    SessionList(Vec<SessionSummary>),
    Error { message: String },
}

/// A point-in-time view of a session, for `list_sessions` and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub state: String,
    pub created_at_unix_ms: u64,
}
