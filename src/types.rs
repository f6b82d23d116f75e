//! Wire and domain types shared across the gateway.
//!
//! The JSON-RPC surface speaks A2A-style messages and tasks; the REST surface
//! reuses the same payment types. Metadata bags are typed here but serialise
//! to the flat JSON keys clients already send.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parser::SkillRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    /// Terminal states never regress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }

    pub const ALL: [TaskState; 6] = [
        TaskState::Submitted,
        TaskState::Working,
        TaskState::InputRequired,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        }
    }
}

/// x402 payment lifecycle substates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    PaymentRequired,
    PaymentSubmitted,
    PaymentVerified,
    PaymentCompleted,
    PaymentFailed,
    PaymentRejected,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::PaymentRequired,
        PaymentStatus::PaymentSubmitted,
        PaymentStatus::PaymentVerified,
        PaymentStatus::PaymentCompleted,
        PaymentStatus::PaymentFailed,
        PaymentStatus::PaymentRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::PaymentRequired => "payment-required",
            PaymentStatus::PaymentSubmitted => "payment-submitted",
            PaymentStatus::PaymentVerified => "payment-verified",
            PaymentStatus::PaymentCompleted => "payment-completed",
            PaymentStatus::PaymentFailed => "payment-failed",
            PaymentStatus::PaymentRejected => "payment-rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// One part of a message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: Value },
    File { file: FilePart },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePart {
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded content.
    pub bytes: String,
}

/// Client-supplied payment payload. Beyond `network`, fields are opaque to the
/// gateway and forwarded to the facilitator untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentPayload {
    /// Payer wallet, if the client identified one.
    pub fn payer(&self) -> Option<&str> {
        self.from.as_deref().filter(|w| !w.is_empty())
    }
}

/// Typed view of the x402 metadata bag. Serialises to the namespaced keys;
/// deserialisation also accepts the legacy flat spellings. Unknown keys
/// round-trip through `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentMeta {
    #[serde(
        rename = "x402.payment.status",
        alias = "paymentStatus",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<PaymentStatus>,
    #[serde(
        rename = "x402.payment.payload",
        alias = "paymentPayload",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<PaymentPayload>,
    #[serde(
        rename = "x402.payment.signature",
        alias = "paymentSignature",
        skip_serializing_if = "Option::is_none"
    )]
    pub signature: Option<PaymentPayload>,
    #[serde(
        rename = "x402.siwx.wallet",
        alias = "sessionWallet",
        skip_serializing_if = "Option::is_none"
    )]
    pub wallet: Option<String>,
    #[serde(
        rename = "x402.payer",
        alias = "payer",
        skip_serializing_if = "Option::is_none"
    )]
    pub payer: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentMeta {
    /// The attached payment payload, whichever key it arrived under.
    pub fn attached_payload(&self) -> Option<&PaymentPayload> {
        self.payload.as_ref().or(self.signature.as_ref())
    }

    pub fn session_wallet(&self) -> Option<&str> {
        self.wallet.as_deref().filter(|w| !w.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "messageId", default = "new_id")]
    pub message_id: String,
    pub role: Role,
    #[serde(default = "message_kind")]
    pub kind: String,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(rename = "taskId", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(rename = "contextId", skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaymentMeta>,
}

fn message_kind() -> String {
    "message".to_string()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Message {
    /// First text part, if any.
    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Server-authored reply message.
    pub fn agent(parts: Vec<Part>, metadata: Option<PaymentMeta>) -> Self {
        Self {
            message_id: new_id(),
            role: Role::Agent,
            kind: message_kind(),
            parts,
            task_id: None,
            context_id: None,
            metadata,
        }
    }
}

/// Settlement outcome attached to a completed (or failed) paid task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    pub network: String,
    pub payer: String,
    #[serde(rename = "errorReason", skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

/// One `accepts` entry of a payment-requirements object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptsEntry {
    pub scheme: String,
    pub network: String,
    pub price: String,
    #[serde(rename = "payTo")]
    pub pay_to: String,
    pub asset: String,
    #[serde(rename = "maxAmountRequired")]
    pub max_amount_required: String,
    #[serde(rename = "maxTimeoutSeconds")]
    pub max_timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gasless: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequirements {
    pub version: String,
    pub accepts: Vec<AcceptsEntry>,
    pub resource: String,
    pub description: String,
    pub facilitator: String,
    pub extensions: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// Open task metadata map with the keys the gateway manages typed out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(rename = "paymentStatus", skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepts: Option<Vec<AcceptsEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<SkillRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipts: Option<Vec<Receipt>>,
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "contextId")]
    pub context_id: String,
    pub status: TaskStatus,
    pub history: Vec<Message>,
    pub artifacts: Vec<Value>,
    pub metadata: TaskMetadata,
}

impl Task {
    pub fn new(id: String, context_id: String, state: TaskState) -> Self {
        Self {
            id,
            context_id,
            status: TaskStatus {
                state,
                timestamp: Utc::now(),
                message: None,
            },
            history: Vec::new(),
            artifacts: Vec::new(),
            metadata: TaskMetadata::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_wire_names_are_kebab_case() {
        assert_eq!(
            serde_json::to_string(&TaskState::InputRequired).unwrap(),
            "\"input-required\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentStatus::PaymentRequired).unwrap(),
            "\"payment-required\""
        );
    }

    #[test]
    fn parts_round_trip_by_kind_tag() {
        let json = r#"[{"kind":"text","text":"hi"},{"kind":"data","data":{"a":1}}]"#;
        let parts: Vec<Part> = serde_json::from_str(json).unwrap();
        assert!(matches!(&parts[0], Part::Text { text } if text == "hi"));
        assert!(matches!(&parts[1], Part::Data { .. }));
        let back = serde_json::to_value(&parts).unwrap();
        assert_eq!(back[0]["kind"], "text");
        assert_eq!(back[1]["data"]["a"], 1);
    }

    #[test]
    fn payment_meta_accepts_both_key_spellings() {
        let flat: PaymentMeta = serde_json::from_str(
            r#"{"paymentStatus":"payment-submitted","sessionWallet":"0xAbC","payer":"0xAbC"}"#,
        )
        .unwrap();
        assert_eq!(flat.status, Some(PaymentStatus::PaymentSubmitted));
        assert_eq!(flat.session_wallet(), Some("0xAbC"));

        let namespaced: PaymentMeta = serde_json::from_str(
            r#"{"x402.payment.status":"payment-rejected","x402.siwx.wallet":"0xdef"}"#,
        )
        .unwrap();
        assert_eq!(namespaced.status, Some(PaymentStatus::PaymentRejected));
        assert_eq!(namespaced.wallet.as_deref(), Some("0xdef"));
    }

    #[test]
    fn payment_meta_preserves_unknown_keys() {
        let json = r#"{"x402.payer":"0xabc","custom.flag":true}"#;
        let meta: PaymentMeta = serde_json::from_str(json).unwrap();
        assert_eq!(
            meta.extra.get("custom.flag"),
            Some(&Value::Bool(true))
        );
        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back["custom.flag"], true);
        assert_eq!(back["x402.payer"], "0xabc");
    }

    #[test]
    fn message_defaults_fill_id_and_kind() {
        let msg: Message =
            serde_json::from_str(r#"{"role":"user","parts":[{"kind":"text","text":"x"}]}"#)
                .unwrap();
        assert!(!msg.message_id.is_empty());
        assert_eq!(msg.kind, "message");
        assert_eq!(msg.text(), Some("x"));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Canceled.is_terminal());
        assert!(!TaskState::InputRequired.is_terminal());
    }
}
