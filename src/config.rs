use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// East Africa Time, the gateway's home timezone.
const DEFAULT_ACK_UTC_OFFSET_SECONDS: i32 = 3 * 3600;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub reference_field: String,
    pub ack_utc_offset_seconds: i32,
    pub log_request_body: bool,
    pub gateway: GatewayConfig,
}

/// Everything needed to talk to the B2B gateway and to tell it where to call back.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub initiator: String,
    pub initiator_password: String,
    pub certificate_path: PathBuf,
    pub command_id: String,
    pub sender_identifier_type: String,
    pub receiver_identifier_type: String,
    pub short_code: String,
    pub party_b: String,
    pub callback_base_url: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: parse_or("SERVER_PORT", 3000)?,
            database_url: required("DATABASE_URL")?,
            reference_field: env::var("REFERENCE_FIELD").unwrap_or_else(|_| "pnr".to_string()),
            ack_utc_offset_seconds: parse_or(
                "ACK_UTC_OFFSET_SECONDS",
                DEFAULT_ACK_UTC_OFFSET_SECONDS,
            )?,
            log_request_body: parse_or("LOG_REQUEST_BODY", false)?,
            gateway: GatewayConfig::from_env()?,
        })
    }

    /// Checks values that parse fine but cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.reference_field.trim().is_empty() || self.reference_field == "Amount" {
            anyhow::bail!("REFERENCE_FIELD must be a non-empty name other than 'Amount'");
        }
        chrono::FixedOffset::east_opt(self.ack_utc_offset_seconds)
            .context("ACK_UTC_OFFSET_SECONDS is out of range")?;

        url::Url::parse(&self.gateway.base_url).context("B2B_BASE_URL is not a valid URL")?;
        url::Url::parse(&self.gateway.callback_base_url)
            .context("CALLBACK_BASE_URL is not a valid URL")?;

        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Ok(GatewayConfig {
            base_url: required("B2B_BASE_URL")?,
            consumer_key: required("B2B_CONSUMER_KEY")?,
            consumer_secret: required("B2B_CONSUMER_SECRET")?,
            initiator: required("B2B_INITIATOR")?,
            initiator_password: required("B2B_INITIATOR_PASSWORD")?,
            certificate_path: PathBuf::from(required("B2B_CERTIFICATE_PATH")?),
            command_id: required("B2B_COMMAND_ID")?,
            sender_identifier_type: required("SENDER_IDENTIFIER_TYPE")?,
            receiver_identifier_type: required("RECIEVER_IDENTIFIER_TYPE")?,
            short_code: required("B2B_SHORT_CODE")?,
            party_b: required("PAY_TAX_CODE")?,
            callback_base_url: required("CALLBACK_BASE_URL")?,
            connect_timeout: Duration::from_secs(parse_or("GATEWAY_CONNECT_TIMEOUT_SECS", 10)?),
            timeout: Duration::from_secs(parse_or("GATEWAY_TIMEOUT_SECS", 30)?),
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{} is required", name))
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) fn test_gateway_config(base_url: &str) -> GatewayConfig {
    GatewayConfig {
        base_url: base_url.to_string(),
        consumer_key: "consumer-key".to_string(),
        consumer_secret: "consumer-secret".to_string(),
        initiator: "Safaricom".to_string(),
        initiator_password: "initiator-password".to_string(),
        certificate_path: PathBuf::from("/nonexistent/cert.pem"),
        command_id: "PayTaxToKRA".to_string(),
        sender_identifier_type: "4".to_string(),
        receiver_identifier_type: "4".to_string(),
        short_code: "222".to_string(),
        party_b: "572572".to_string(),
        callback_base_url: "http://localhost:3000/api/v1.0".to_string(),
        connect_timeout: Duration::from_secs(2),
        timeout: Duration::from_secs(5),
    }
}
