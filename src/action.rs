use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

/// Closed set of action types the planner may emit. Unrecognized values are
/// preserved as `Unknown`, never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ActionKind {
    Open,
    Click,
    Input,
    Swipe,
    Check,
    Wait,
    Back,
    Home,
    Unknown(String),
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => ActionKind::Open,
            "CLICK" => ActionKind::Click,
            "INPUT" => ActionKind::Input,
            "SWIPE" => ActionKind::Swipe,
            "CHECK" => ActionKind::Check,
            "WAIT" => ActionKind::Wait,
            "BACK" => ActionKind::Back,
            "HOME" => ActionKind::Home,
            _ => ActionKind::Unknown(s),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Open => write!(f, "OPEN"),
            ActionKind::Click => write!(f, "CLICK"),
            ActionKind::Input => write!(f, "INPUT"),
            ActionKind::Swipe => write!(f, "SWIPE"),
            ActionKind::Check => write!(f, "CHECK"),
            ActionKind::Wait => write!(f, "WAIT"),
            ActionKind::Back => write!(f, "BACK"),
            ActionKind::Home => write!(f, "HOME"),
            ActionKind::Unknown(s) => write!(f, "UNKNOWN({})", s),
        }
    }
}

/// Normalized action descriptor produced by the planner and consumed by the
/// dispatcher. The planner emits data, never code; this is the only shape
/// through which new physical effects enter the system.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    /// Query string; meaning depends on `kind`.
    #[serde(default)]
    pub target: Option<String>,
    /// Action-specific bag: `text` for INPUT, `direction` for SWIPE,
    /// `timeout` (seconds) for WAIT.
    #[serde(flatten)]
    pub params: HashMap<String, serde_json::Value>,
}

impl ActionDescriptor {
    pub fn new(kind: ActionKind, target: Option<&str>) -> Self {
        ActionDescriptor {
            kind,
            target: target.map(str::to_string),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: serde_json::Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Numeric param, accepting both JSON numbers and numeric strings.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        match self.params.get(key)? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
