//! B2B payment initiation.
//!
//! ```text
//! START -> IDEMPOTENCY_CHECKED -> SIGNED -> SENT -> INTERPRETED -> ACCEPTED | REJECTED
//! ```
//!
//! The caller's answer depends only on the gateway's synchronous reply. On acceptance the
//! record is written by a detached task; rejected attempts leave no record so the reference can
//! be retried.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::domain::Transaction;
use crate::gateway::{
    B2bAcceptance, B2bRequest, CredentialSigner, GatewayClient, GatewayError, SigningError,
};
use crate::ports::{RepositoryError, TransactionRepository};
use crate::services::{GENERIC_FAILURE_CODE, SUCCESS_CODE};
use crate::validation::PaymentRequest;

pub const INITIATED_MESSAGE: &str = "B2B payment initiated successfully.";
pub const DUPLICATE_MESSAGE: &str = "A similar B2B payment already exists.";
pub const FAILED_MESSAGE: &str = "Failed to initiate B2B payment.";
pub const REMARKS: &str = "B2B payment.";

#[derive(Error, Debug)]
pub enum InitiationError {
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("Signing failure: {0}")]
    SigningFailure(#[from] SigningError),

    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(#[source] GatewayError),

    #[error("Gateway rejected: {0}")]
    GatewayRejected(#[source] GatewayError),

    #[error("Store failure: {0}")]
    Store(#[from] RepositoryError),
}

impl From<GatewayError> for InitiationError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(_) => InitiationError::GatewayUnreachable(err),
            _ => InitiationError::GatewayRejected(err),
        }
    }
}

impl InitiationError {
    /// What the caller sees. Every failure shares one response shape.
    pub fn caller_message(&self) -> &str {
        match self {
            InitiationError::DuplicateReference(_) => DUPLICATE_MESSAGE,
            InitiationError::GatewayRejected(err) => err.gateway_message().unwrap_or(FAILED_MESSAGE),
            _ => FAILED_MESSAGE,
        }
    }
}

/// Response body returned to the initiating caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitiationResponse {
    pub status_message: String,
    pub status_code: String,
    pub account_reference: String,
}

impl InitiationResponse {
    fn accepted(reference: &str) -> Self {
        Self {
            status_message: INITIATED_MESSAGE.to_string(),
            status_code: SUCCESS_CODE.to_string(),
            account_reference: reference.to_string(),
        }
    }

    fn rejected(reference: &str, message: &str) -> Self {
        Self {
            status_message: message.to_string(),
            status_code: GENERIC_FAILURE_CODE.to_string(),
            account_reference: reference.to_string(),
        }
    }
}

/// Outcome of one initiation attempt.
#[derive(Debug)]
pub struct Initiation {
    pub response: InitiationResponse,
    pub accepted: bool,
    /// Background record creation. Dropping the handle detaches the task.
    pub persistence: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct PaymentInitiator {
    repository: Arc<dyn TransactionRepository>,
    gateway: GatewayClient,
    signer: CredentialSigner,
    config: Arc<GatewayConfig>,
}

impl PaymentInitiator {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        gateway: GatewayClient,
        config: Arc<GatewayConfig>,
    ) -> Self {
        let signer = CredentialSigner::new(config.certificate_path.clone());
        Self {
            repository,
            gateway,
            signer,
            config,
        }
    }

    pub async fn initiate(&self, request: PaymentRequest) -> Initiation {
        info!(reference = %request.reference, "Initiating B2B payment");

        match self.submit(&request).await {
            Ok(acceptance) => {
                info!(
                    reference = %request.reference,
                    conversation_id = %acceptance.conversation_id,
                    description = acceptance.response_description.as_deref().unwrap_or_default(),
                    "B2B payment initiated successfully"
                );
                let persistence = self.spawn_record_creation(&request, acceptance);
                Initiation {
                    response: InitiationResponse::accepted(&request.reference),
                    accepted: true,
                    persistence: Some(persistence),
                }
            }
            Err(err) => {
                match &err {
                    InitiationError::Store(_) => error!(
                        reference = %request.reference,
                        error = %err,
                        "Internal fault while initiating B2B payment"
                    ),
                    _ => error!(
                        reference = %request.reference,
                        error = %err,
                        "Failed to initiate B2B payment"
                    ),
                }
                Initiation {
                    response: InitiationResponse::rejected(
                        &request.reference,
                        err.caller_message(),
                    ),
                    accepted: false,
                    persistence: None,
                }
            }
        }
    }

    async fn submit(&self, request: &PaymentRequest) -> Result<B2bAcceptance, InitiationError> {
        // Concurrent attempts can both pass this; the unique constraint catches the second.
        if self
            .repository
            .find_by_reference(&request.reference)
            .await?
            .is_some()
        {
            return Err(InitiationError::DuplicateReference(request.reference.clone()));
        }

        let credential = self.signer.sign(&self.config.initiator_password)?;
        let payload = self.build_payload(request, credential);
        let token = self.gateway.fetch_token().await?;

        debug!(reference = %request.reference, payload = ?payload, "Sending B2B request");
        Ok(self.gateway.remit(&token, &payload).await?)
    }

    fn build_payload(&self, request: &PaymentRequest, security_credential: String) -> B2bRequest {
        let callback_base = self.config.callback_base_url.trim_end_matches('/');
        B2bRequest {
            initiator: self.config.initiator.clone(),
            security_credential,
            command_id: self.config.command_id.clone(),
            sender_identifier_type: self.config.sender_identifier_type.clone(),
            receiver_identifier_type: self.config.receiver_identifier_type.clone(),
            amount: request.amount,
            party_a: self.config.short_code.clone(),
            party_b: self.config.party_b.clone(),
            remarks: REMARKS.to_string(),
            queue_timeout_url: format!("{}/payment/timeout", callback_base),
            result_url: format!("{}/payment/confirm", callback_base),
            account_reference: request.reference.clone(),
        }
    }

    fn spawn_record_creation(
        &self,
        request: &PaymentRequest,
        acceptance: B2bAcceptance,
    ) -> JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let tx = Transaction::new(
            request.reference.clone(),
            request.amount,
            acceptance.originator_conversation_id,
            acceptance.conversation_id,
        );

        tokio::spawn(async move {
            info!(reference = %tx.reference, "Saving B2B payment record");
            match repository.insert(&tx).await {
                Ok(saved) => info!(
                    reference = %saved.reference,
                    id = %saved.id,
                    "B2B payment record saved"
                ),
                Err(RepositoryError::Conflict(reason)) => warn!(
                    reference = %tx.reference,
                    reason = %reason,
                    "B2B payment record already exists"
                ),
                Err(e) => error!(
                    reference = %tx.reference,
                    error = %e,
                    "Failed to save B2B payment record"
                ),
            }
        })
    }
}
