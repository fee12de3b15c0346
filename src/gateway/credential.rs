//! Security credential for the B2B initiator.
//!
//! The gateway expects the initiator password encrypted with its public certificate under
//! PKCS#1 v1.5 padding and base64-encoded. Padding is randomized, so two calls never yield the
//! same ciphertext for the same password.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use std::path::{Path, PathBuf};
use thiserror::Error;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Certificate unavailable at {path}: {source}")]
    CertificateUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key material in {path}: {reason}")]
    InvalidKeyMaterial { path: PathBuf, reason: String },

    #[error("Encryption failed: {0}")]
    Encryption(#[from] rsa::Error),
}

/// Encrypts `secret` with the RSA public key found at `certificate_path`.
pub fn sign(secret: &str, certificate_path: &Path) -> Result<String, SigningError> {
    let pem = std::fs::read_to_string(certificate_path).map_err(|source| {
        SigningError::CertificateUnavailable {
            path: certificate_path.to_path_buf(),
            source,
        }
    })?;

    let key = public_key_from_pem(&pem).map_err(|reason| SigningError::InvalidKeyMaterial {
        path: certificate_path.to_path_buf(),
        reason,
    })?;

    let ciphertext = key.encrypt(&mut OsRng, Pkcs1v15Encrypt, secret.as_bytes())?;
    Ok(STANDARD.encode(ciphertext))
}

/// Accepts an X.509 certificate, an SPKI `PUBLIC KEY` or a PKCS#1 `RSA PUBLIC KEY`.
fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, String> {
    if let Ok(certificate) = Certificate::from_pem(pem.as_bytes()) {
        let spki = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| e.to_string())?;
        return RsaPublicKey::from_public_key_der(&spki).map_err(|e| e.to_string());
    }

    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| e.to_string())
}

/// Signs the configured initiator password with the configured certificate.
#[derive(Debug, Clone)]
pub struct CredentialSigner {
    certificate_path: PathBuf,
}

impl CredentialSigner {
    pub fn new(certificate_path: impl Into<PathBuf>) -> Self {
        Self {
            certificate_path: certificate_path.into(),
        }
    }

    pub fn sign(&self, secret: &str) -> Result<String, SigningError> {
        sign(secret, &self.certificate_path)
    }
}
