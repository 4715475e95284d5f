//! Detached blob signature verification.

use anyhow::anyhow;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use manifest_sig_core::{
  CancellationToken, Result, StagedFile, StagingArea, VerifiedResult, VerifyError, decode_field,
  decode_optional, run_cancellable,
};

use crate::certificate::{SignerNames, signer_name_from_pem};
use crate::online::OnlineRequest;
use crate::verifier::Verifier;

/// A detached signature over a message. Every payload is in transport
/// encoding: base64, optionally over gzip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobRequest {
  pub message: Vec<u8>,
  pub signature: Vec<u8>,
  pub certificate: Option<Vec<u8>>,
  pub bundle: Option<Vec<u8>>,
  pub public_key: Option<String>,
}

impl BlobRequest {
  pub fn new(message: impl Into<Vec<u8>>, signature: impl Into<Vec<u8>>) -> Self {
    Self {
      message: message.into(),
      signature: signature.into(),
      ..Default::default()
    }
  }

  pub fn with_certificate(mut self, certificate: impl Into<Vec<u8>>) -> Self {
    self.certificate = Some(certificate.into());
    self
  }

  pub fn with_bundle(mut self, bundle: impl Into<Vec<u8>>) -> Self {
    self.bundle = Some(bundle.into());
    self
  }

  pub fn with_public_key(mut self, key_ref: impl Into<String>) -> Self {
    self.public_key = Some(key_ref.into());
    self
  }
}

impl Verifier {
  /// Verify a detached signature.
  ///
  /// A supplied bundle is tried offline first; when it verifies, no online
  /// service is contacted. Otherwise the staged inputs go to the online
  /// verifier. Staged files are removed on every exit path.
  #[tracing::instrument(
    skip_all,
    fields(
      message_len = request.message.len(),
      with_certificate = request.certificate.is_some(),
      with_bundle = request.bundle.is_some(),
    )
  )]
  pub async fn verify_blob(
    &self,
    request: &BlobRequest,
    cancel: &CancellationToken,
  ) -> Result<VerifiedResult> {
    let message = decode_field("message", &request.message)?;
    let signature = decode_field("signature", &request.signature)?;
    if signature.is_empty() {
      return Err(VerifyError::InputDecode {
        field: "signature",
        source: anyhow!("signature is empty"),
      });
    }

    let staging = StagingArea::new()?;
    let message_path = staging.stage(StagedFile::Message, &message)?;
    let signature_path = staging.stage(StagedFile::Signature, &signature)?;

    let certificate = decode_optional("certificate", request.certificate.as_deref())
      .map_err(|e| VerifyError::CertificateLoad(Box::new(e)))?;
    let certificate_path = match &certificate {
      Some(pem) => Some(staging.stage(StagedFile::Certificate, pem)?),
      None => None,
    };

    if let Some(bundle) = decode_optional("bundle", request.bundle.as_deref())? {
      match certificate.as_deref() {
        Some(cert_pem) => {
          if let Some(result) = self
            .try_bundle(&signature, cert_pem, &bundle, &message, cancel)
            .await?
          {
            return Ok(result);
          }
        }
        None => tracing::debug!("Bundle supplied without certificate, skipping offline check"),
      }
    }

    let trust = self
      .resolve_trust(request.public_key.as_deref(), cancel)
      .await?;
    let online = run_cancellable(cancel, "online blob verification", async {
      self
        .online
        .verify(OnlineRequest {
          trust: &trust,
          certificate: certificate_path.as_deref(),
          signature: &signature_path,
          message: &message_path,
        })
        .await
        .map_err(VerifyError::OnlineVerification)
    })
    .await?;
    drop(trust);

    let signer_name = match &certificate {
      Some(pem) => signer_name_from_pem(pem).map_err(|e| VerifyError::CertificateLoad(Box::new(e)))?,
      None => String::new(),
    };
    tracing::info!(signer = %signer_name, "Blob signature verified online");
    Ok(VerifiedResult::verified(
      signer_name,
      online.log_integrated_time,
    ))
  }

  /// Offline bundle attempt. `Ok(None)` means fall back to online
  /// verification; bundle parse and proof errors are never fatal.
  async fn try_bundle(
    &self,
    signature: &[u8],
    cert_pem: &[u8],
    bundle: &[u8],
    message: &[u8],
    cancel: &CancellationToken,
  ) -> Result<Option<VerifiedResult>> {
    let material = match self.trust_material(cancel).await {
      Ok(material) => material,
      Err(e) if e.is_cancelled() => return Err(e),
      Err(e) => {
        tracing::debug!(error = %e, "No trust material for bundle check, falling back");
        return Ok(None);
      }
    };

    let signature_b64 = BASE64.encode(signature);
    match material.bundle_verifier().verify(
      signature_b64.as_bytes(),
      cert_pem,
      bundle,
      Some(message),
    ) {
      Ok(outcome) if outcome.verified => {
        tracing::debug!("Verified by bundle information");
        let evidence = outcome.into_evidence();
        let signer_name = evidence
          .signer_names()
          .map(SignerNames::signer_name)
          .unwrap_or_default();
        Ok(Some(VerifiedResult::verified(
          signer_name,
          evidence.integrated_time(),
        )))
      }
      Ok(_) => Ok(None),
      Err(e) if e.is_bundle_error() => {
        tracing::debug!(error = %e, "Bundle verification failed, falling back to online");
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }
}
