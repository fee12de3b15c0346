pub mod client;
pub mod credential;

pub use client::{AccessToken, B2bAcceptance, B2bRequest, GatewayClient, GatewayError};
pub use credential::{CredentialSigner, SigningError};
