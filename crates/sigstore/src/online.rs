//! Online verification of staged blob signatures.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use sigstore::crypto::Signature;
use x509_cert::der::Encode;

use crate::bundle::{ensure_valid_at, verify_with_certificate};
use crate::certificate::load_certificate;
use crate::keys::LoadedKey;
use crate::rekor::RekorClient;
use crate::trust::{KeylessTrust, TrustMode};

/// Inputs of an online check. All payloads are staged files.
#[derive(Debug, Clone, Copy)]
pub struct OnlineRequest<'a> {
  pub trust: &'a TrustMode,
  pub certificate: Option<&'a Path>,
  pub signature: &'a Path,
  pub message: &'a Path,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineVerification {
  /// Integration time of the log entry that backed the check, if any.
  pub log_integrated_time: Option<i64>,
}

/// Verifies a signature against live services.
#[async_trait]
pub trait OnlineVerifier: Send + Sync {
  async fn verify(&self, request: OnlineRequest<'_>) -> Result<OnlineVerification>;
}

/// Production adapter: key signatures locally, keyless signatures against
/// the trusted roots and the Rekor instance of the request.
#[derive(Debug, Clone, Default)]
pub struct SigstoreOnlineVerifier;

#[async_trait]
impl OnlineVerifier for SigstoreOnlineVerifier {
  #[tracing::instrument(skip_all, fields(mode = request.trust.name()))]
  async fn verify(&self, request: OnlineRequest<'_>) -> Result<OnlineVerification> {
    let message = read(request.message, "message").await?;
    let signature = signature_bytes(read(request.signature, "signature").await?);

    match request.trust {
      TrustMode::PublicKey(key) => verify_with_key(key, &signature, &message),
      TrustMode::Keyless(trust) => {
        let cert_path = request
          .certificate
          .context("keyless verification requires a certificate")?;
        let cert_pem = read(cert_path, "certificate").await?;
        verify_keyless(trust, &cert_pem, &signature, &message).await
      }
    }
  }
}

fn verify_with_key(key: &LoadedKey, signature: &[u8], message: &[u8]) -> Result<OnlineVerification> {
  key
    .verification_key()?
    .verify_signature(Signature::Raw(signature), message)
    .map_err(|e| anyhow!("signature does not verify with the public key: {e}"))?;
  tracing::debug!("Signature verified with public key");
  Ok(OnlineVerification::default())
}

async fn verify_keyless(
  trust: &KeylessTrust,
  cert_pem: &[u8],
  signature: &[u8],
  message: &[u8],
) -> Result<OnlineVerification> {
  let cert = load_certificate(cert_pem)?;
  let cert_der = cert.to_der().context("Failed to encode certificate")?;
  verify_with_certificate(&cert, signature, message)?;
  tracing::debug!("Signature verified with certificate key");

  let digest = hex::encode(Sha256::digest(message));
  let entry = RekorClient::new(&trust.endpoints.rekor_url)
    .find_entry(&digest, signature, &cert_der, &trust.material.keyring)
    .await?;

  ensure_valid_at(&cert, entry.integrated_time)?;
  trust
    .material
    .pool
    .verify(&cert_der, entry.integrated_time)?;

  tracing::debug!(log_index = entry.log_index, "Transparency log entry verified");
  Ok(OnlineVerification {
    log_integrated_time: Some(entry.integrated_time),
  })
}

async fn read(path: &Path, what: &str) -> Result<Vec<u8>> {
  tokio::fs::read(path)
    .await
    .with_context(|| format!("Failed to read staged {what} {}", path.display()))
}

/// Signature files hold either the raw signature or its base64 text.
fn signature_bytes(raw: Vec<u8>) -> Vec<u8> {
  let text: Vec<u8> = raw
    .iter()
    .copied()
    .filter(|b| !b.is_ascii_whitespace())
    .collect();
  let is_base64 = !text.is_empty()
    && text
      .iter()
      .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
  if is_base64 && let Ok(decoded) = BASE64.decode(&text) {
    return decoded;
  }
  raw
}
