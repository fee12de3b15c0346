//! Callback-driven finalization of B2B payments.
//!
//! The gateway gets its acknowledgment straight away; the store update runs in a detached task.
//! Confirm and timeout callbacks share the payload shape and this code path. Duplicate or early
//! callbacks find nothing pending and are ignored.

use chrono::{FixedOffset, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::domain::{Transaction, TransactionStatus};
use crate::gateway::client::code_text;
use crate::ports::{RepositoryResult, TransactionRepository};
use crate::services::{FAILURE_CODE, GENERIC_FAILURE_CODE, SUCCESS_CODE};

/// `ResultCode` the gateway sends for a completed payment.
pub const SUCCESS_RESULT_CODE: i64 = 0;
pub const RECEIVED_DESC: &str = "Confirmation payload received successfully.";
pub const INVALID_PAYLOAD_DESC: &str = "Invalid request payload.";
const THIRD_PARTY_TRANS_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// Fixed-shape answer to every callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acknowledgment {
    #[serde(rename = "ResultCode")]
    pub result_code: String,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "ThirdPartyTransID")]
    pub third_party_trans_id: String,
}

/// Fields extracted from a callback's `Result` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    pub conversation_id: Option<String>,
    pub originator_conversation_id: Option<String>,
    pub result_code: Option<i64>,
}

impl CallbackResult {
    /// `None` when the body has no usable `Result` object.
    pub fn from_body(body: Option<&Value>) -> Option<Self> {
        let result = match body?.get("Result")? {
            Value::Object(map) if !map.is_empty() => map,
            _ => return None,
        };

        let id = |field: &str| {
            result
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(CallbackResult {
            conversation_id: id("ConversationID"),
            originator_conversation_id: id("OriginatorConversationID"),
            result_code: result
                .get("ResultCode")
                .and_then(code_text)
                .and_then(|code| code.parse::<i64>().ok()),
        })
    }

    pub fn is_success(&self) -> bool {
        self.result_code == Some(SUCCESS_RESULT_CODE)
    }

    pub fn final_status(&self) -> TransactionStatus {
        if self.is_success() {
            TransactionStatus::Success
        } else {
            TransactionStatus::Failed
        }
    }
}

#[derive(Debug)]
pub struct Reconciliation {
    pub acknowledgment: Acknowledgment,
    pub valid: bool,
    /// Background finalization. Dropping the handle detaches the task.
    pub finalization: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct Reconciler {
    repository: Arc<dyn TransactionRepository>,
    utc_offset: FixedOffset,
}

impl Reconciler {
    pub fn new(repository: Arc<dyn TransactionRepository>, utc_offset: FixedOffset) -> Self {
        Self {
            repository,
            utc_offset,
        }
    }

    /// Must run inside a tokio runtime: finalization is spawned onto it.
    pub fn reconcile(&self, body: Option<&Value>) -> Reconciliation {
        let third_party_trans_id = Utc::now()
            .with_timezone(&self.utc_offset)
            .format(THIRD_PARTY_TRANS_ID_FORMAT)
            .to_string();

        let Some(result) = CallbackResult::from_body(body) else {
            warn!("Callback without a usable Result payload");
            return Reconciliation {
                acknowledgment: Acknowledgment {
                    result_code: GENERIC_FAILURE_CODE.to_string(),
                    result_desc: INVALID_PAYLOAD_DESC.to_string(),
                    third_party_trans_id,
                },
                valid: false,
                finalization: None,
            };
        };

        let result_code = if result.is_success() {
            SUCCESS_CODE
        } else {
            FAILURE_CODE
        };

        let repository = Arc::clone(&self.repository);
        let finalization = tokio::spawn(async move {
            let conversation_id = result.conversation_id.clone().unwrap_or_default();
            match finalize(repository.as_ref(), &result).await {
                Ok(Some(tx)) => info!(
                    conversation_id = %conversation_id,
                    reference = %tx.reference,
                    status = %tx.status,
                    "B2B payment record finalized"
                ),
                Ok(None) => warn!(
                    conversation_id = %conversation_id,
                    "Transaction record not found or already in a final state"
                ),
                Err(e) => tracing::error!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to finalize B2B payment record"
                ),
            }
        });

        Reconciliation {
            acknowledgment: Acknowledgment {
                result_code: result_code.to_string(),
                result_desc: RECEIVED_DESC.to_string(),
                third_party_trans_id,
            },
            valid: true,
            finalization: Some(finalization),
        }
    }
}

/// Applies a callback to the matching pending record. A callback lacking either id matches
/// nothing.
pub async fn finalize(
    repository: &dyn TransactionRepository,
    result: &CallbackResult,
) -> RepositoryResult<Option<Transaction>> {
    let (Some(conversation_id), Some(originator_conversation_id)) = (
        result.conversation_id.as_deref(),
        result.originator_conversation_id.as_deref(),
    ) else {
        return Ok(None);
    };

    info!(conversation_id = %conversation_id, "Updating B2B payment record");
    repository
        .finalize_pending(
            conversation_id,
            originator_conversation_id,
            result.final_status(),
        )
        .await
}
