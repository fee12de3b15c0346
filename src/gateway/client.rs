use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::config::GatewayConfig;

/// Value of `ResponseCode` on an accepted B2B request.
pub const ACCEPTED_RESPONSE_CODE: &str = "0";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Token endpoint returned status {0}")]
    UnexpectedStatus(u16),

    #[error("Token endpoint returned no access token")]
    MissingToken,

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),

    /// The body carried an explicit error indicator.
    #[error("Gateway rejected request ({code}): {}", .message.as_deref().unwrap_or("no message"))]
    Rejected {
        code: String,
        message: Option<String>,
    },

    /// No error indicator, but the acceptance signal (result code or conversation ids) is absent.
    #[error("Gateway did not accept request: {0}")]
    NotAccepted(String),
}

impl GatewayError {
    /// Message worth surfacing to the caller, when the gateway supplied one.
    pub fn gateway_message(&self) -> Option<&str> {
        match self {
            GatewayError::Rejected { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Short-lived bearer token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(****)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Body of a B2B payment request, in the gateway's field naming.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct B2bRequest {
    #[serde(rename = "Initiator")]
    pub initiator: String,
    #[serde(rename = "SecurityCredential")]
    pub security_credential: String,
    #[serde(rename = "CommandID")]
    pub command_id: String,
    #[serde(rename = "SenderIdentifierType")]
    pub sender_identifier_type: String,
    // The gateway's own spelling.
    #[serde(rename = "RecieverIdentifierType")]
    pub receiver_identifier_type: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "Remarks")]
    pub remarks: String,
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: String,
    #[serde(rename = "ResultURL")]
    pub result_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
}

/// Correlation ids issued by the gateway for an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct B2bAcceptance {
    pub conversation_id: String,
    pub originator_conversation_id: String,
    pub response_description: Option<String>,
}

/// HTTP client for the B2B gateway: OAuth token endpoint and the remittance endpoint.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(GatewayClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
        })
    }

    /// Fetches a fresh bearer token with client-credential basic auth. One attempt, no caching.
    pub async fn fetch_token(&self) -> Result<AccessToken, GatewayError> {
        let url = format!("{}/oauth/v1/generate", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(&self.consumer_key, Some(&self.consumer_secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::UnexpectedStatus(response.status().as_u16()));
        }

        let body = response.json::<TokenResponse>().await?;
        match body.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(GatewayError::MissingToken),
        }
    }

    /// Submits a B2B payment. The transport status is not trusted on its own: the gateway
    /// answers 200 for rejected requests, so the body decides.
    pub async fn remit(
        &self,
        token: &AccessToken,
        request: &B2bRequest,
    ) -> Result<B2bAcceptance, GatewayError> {
        let url = format!("{}/mpesa/b2b/v1/remittax", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token.as_str())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(
            reference = %request.account_reference,
            status = status.as_u16(),
            body = %text,
            "B2B gateway response"
        );

        let body: Value = serde_json::from_str(&text).map_err(|e| {
            GatewayError::InvalidResponse(format!("status {}: {}", status.as_u16(), e))
        })?;

        interpret_remittance(&body)
    }
}

/// Decides acceptance from a remittance response body.
pub fn interpret_remittance(body: &Value) -> Result<B2bAcceptance, GatewayError> {
    if let Some(code) = body.get("errorCode").and_then(code_text) {
        return Err(GatewayError::Rejected {
            code,
            message: body
                .get("errorMessage")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }

    match body.get("ResponseCode").and_then(code_text) {
        Some(code) if code == ACCEPTED_RESPONSE_CODE => {}
        Some(code) => {
            return Err(GatewayError::NotAccepted(format!("ResponseCode {}", code)));
        }
        None => return Err(GatewayError::NotAccepted("ResponseCode missing".to_string())),
    }

    let conversation_id = id_field(body, "ConversationID")?;
    let originator_conversation_id = id_field(body, "OriginatorConversationID")?;

    Ok(B2bAcceptance {
        conversation_id,
        originator_conversation_id,
        response_description: body
            .get("ResponseDescription")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Codes arrive as strings or numbers depending on the endpoint. Empty means absent.
pub(crate) fn code_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn id_field(body: &Value, field: &str) -> Result<String, GatewayError> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::NotAccepted(format!("{} missing", field)))
}
