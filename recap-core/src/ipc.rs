use serde::{Deserialize, Serialize};

use crate::models::ClientTurn;

pub const PROTOCOL_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecapRequest {
    Ping,
    Health,
    /// Append a turn to the transcript, then signal the cadence tracker.
    RecordTurn {
        session_id: String,
        role: String,
        text: String,
        /// Epoch milliseconds; server clock when omitted.
        #[serde(default)]
        timestamp: Option<i64>,
        #[serde(default)]
        client_turns: Option<Vec<ClientTurn>>,
        #[serde(default)]
        last_known_version: Option<i64>,
    },
    /// Signal an assistant turn that was recorded elsewhere.
    AssistantTurn {
        session_id: String,
        #[serde(default)]
        last_known_version: Option<i64>,
        #[serde(default)]
        client_turns: Option<Vec<ClientTurn>>,
    },
    GetSummary {
        session_id: String,
    },
    GetCadence {
        session_id: String,
    },
    ReleaseLock {
        session_id: String,
    },
}

impl RecapRequest {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            RecapRequest::Ping | RecapRequest::Health => None,
            RecapRequest::RecordTurn { session_id, .. }
            | RecapRequest::AssistantTurn { session_id, .. }
            | RecapRequest::GetSummary { session_id }
            | RecapRequest::GetCadence { session_id }
            | RecapRequest::ReleaseLock { session_id } => Some(session_id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RecapResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl RecapResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self {
            status: "not_found".to_string(),
            data: None,
            error: Some(what.into()),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
