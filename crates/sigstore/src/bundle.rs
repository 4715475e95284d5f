//! Offline verification of cosign transparency-log bundles.

use anyhow::anyhow;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use manifest_sig_core::{Result, VerifyError};
use serde::{Deserialize, Serialize};
use sigstore::crypto::{CosignVerificationKey, Signature};
use x509_cert::Certificate;
use x509_cert::der::Encode;

use crate::certificate::{SignerNames, load_certificate};
use crate::chain::CertificatePool;
use crate::evidence::SignatureEvidence;
use crate::tlog::{LogEntry, RekorKeyring};

/// A cosign bundle: the log's promise of inclusion for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekorBundle {
  #[serde(rename = "SignedEntryTimestamp")]
  pub signed_entry_timestamp: String,
  #[serde(rename = "Payload")]
  pub payload: BundlePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlePayload {
  pub body: String,
  #[serde(rename = "integratedTime")]
  pub integrated_time: i64,
  #[serde(rename = "logIndex")]
  pub log_index: i64,
  #[serde(rename = "logID")]
  pub log_id: String,
}

impl RekorBundle {
  pub fn from_json(json: &[u8]) -> Result<Self> {
    serde_json::from_slice(json).map_err(|e| VerifyError::BundleParse(e.into()))
  }

  pub fn log_entry(&self) -> LogEntry {
    LogEntry {
      body: self.payload.body.clone(),
      integrated_time: self.payload.integrated_time,
      log_index: self.payload.log_index,
      log_id: self.payload.log_id.clone(),
      signed_entry_timestamp: self.signed_entry_timestamp.clone(),
    }
  }
}

/// Outcome of a successful bundle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleVerification {
  pub verified: bool,
  pub signer_name: String,
  pub integrated_time: i64,
  pub signer: SignerNames,
}

impl BundleVerification {
  pub fn into_evidence(self) -> SignatureEvidence {
    SignatureEvidence::BundleBased {
      signer: self.signer,
      integrated_time: self.integrated_time,
    }
  }
}

/// Verifies signatures against a previously recorded log bundle. Performs no
/// network I/O.
#[derive(Debug, Clone)]
pub struct BundleVerifier {
  keyring: RekorKeyring,
  pool: Option<CertificatePool>,
}

impl BundleVerifier {
  pub fn new(keyring: RekorKeyring) -> Self {
    Self {
      keyring,
      pool: None,
    }
  }

  /// Also require the signing certificate to chain to one of these roots.
  pub fn with_pool(mut self, pool: CertificatePool) -> Self {
    self.pool = Some(pool);
    self
  }

  /// Verify `signature_b64` made with `cert_pem` against `bundle_json`.
  ///
  /// When `message` is given, the recorded digest and the signature itself
  /// are checked against it as well.
  #[tracing::instrument(
    skip_all,
    fields(bundle_len = bundle_json.len(), with_message = message.is_some())
  )]
  pub fn verify(
    &self,
    signature_b64: &[u8],
    cert_pem: &[u8],
    bundle_json: &[u8],
    message: Option<&[u8]>,
  ) -> Result<BundleVerification> {
    let bundle = RekorBundle::from_json(bundle_json)?;
    let entry = bundle.log_entry();

    self.keyring.verify_set(&entry).map_err(failed)?;
    tracing::debug!(log_index = entry.log_index, "Bundle SET verified");

    let signature = BASE64
      .decode(strip_whitespace(signature_b64))
      .map_err(|e| failed(anyhow!("signature is not base64: {e}")))?;
    let cert = load_certificate(cert_pem)
      .map_err(|e| VerifyError::BundleVerification(format!("certificate: {e}")))?;
    let cert_der = cert
      .to_der()
      .map_err(|e| failed(anyhow!("failed to encode certificate: {e}")))?;

    let record = entry.signature_record().map_err(failed)?;
    record.ensure_matches(&signature, &cert_der).map_err(failed)?;

    ensure_valid_at(&cert, entry.integrated_time).map_err(failed)?;
    if let Some(pool) = &self.pool {
      pool
        .verify(&cert_der, entry.integrated_time)
        .map_err(failed)?;
    }

    if let Some(message) = message {
      record.ensure_digest_of(message).map_err(failed)?;
      verify_with_certificate(&cert, &signature, message).map_err(failed)?;
      tracing::debug!("Message signature verified against bundle certificate");
    }

    let signer = SignerNames::from_certificate(&cert);
    let signer_name = signer.signer_name();
    tracing::info!(signer = %signer_name, "Bundle verified offline");
    Ok(BundleVerification {
      verified: true,
      signer_name,
      integrated_time: entry.integrated_time,
      signer,
    })
  }
}

fn failed(e: anyhow::Error) -> VerifyError {
  VerifyError::BundleVerification(format!("{e:#}"))
}

fn strip_whitespace(bytes: &[u8]) -> Vec<u8> {
  bytes
    .iter()
    .copied()
    .filter(|b| !b.is_ascii_whitespace())
    .collect()
}

/// The log integrated the entry while the short-lived certificate was valid.
pub(crate) fn ensure_valid_at(cert: &Certificate, integrated_time: i64) -> anyhow::Result<()> {
  let validity = &cert.tbs_certificate.validity;
  let not_before = validity.not_before.to_unix_duration().as_secs() as i64;
  let not_after = validity.not_after.to_unix_duration().as_secs() as i64;
  if integrated_time < not_before || integrated_time > not_after {
    anyhow::bail!(
      "certificate not valid at integrated time {integrated_time} (valid {not_before}..{not_after})"
    );
  }
  Ok(())
}

/// Verify a raw signature over `message` with the certificate's public key.
pub(crate) fn verify_with_certificate(
  cert: &Certificate,
  signature: &[u8],
  message: &[u8],
) -> anyhow::Result<()> {
  let key = CosignVerificationKey::try_from(&cert.tbs_certificate.subject_public_key_info)
    .map_err(|e| anyhow!("unsupported certificate key: {e}"))?;
  key
    .verify_signature(Signature::Raw(signature), message)
    .map_err(|e| anyhow!("signature does not verify: {e}"))
}
