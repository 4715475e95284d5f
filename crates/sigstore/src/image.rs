//! Container image signature verification.

use manifest_sig_core::{CancellationToken, Result, VerifiedResult, VerifyError, run_cancellable};
use sigstore::registry::OciReference;

use crate::evidence::SignatureEvidence;
use crate::verifier::Verifier;

impl Verifier {
  /// Verify the signatures attached to `image_ref`.
  ///
  /// `pub_key` selects public-key verification; `None` or an empty string
  /// selects keyless verification. The signer identity comes from the
  /// first verified signature that is a container image claim backed by a
  /// certificate, and stays empty when there is none.
  ///
  /// Keyless image verification never contacts the configured Rekor URL.
  /// Log evidence comes only from the bundles attached to the signatures,
  /// which the cosign client checks against the trusted Rekor keys.
  #[tracing::instrument(skip(self, cancel), fields(keyed = pub_key.is_some_and(|k| !k.trim().is_empty())))]
  pub async fn verify_image(
    &self,
    image_ref: &str,
    pub_key: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<VerifiedResult> {
    let reference: OciReference =
      image_ref
        .parse()
        .map_err(|e| VerifyError::InvalidReference {
          reference: image_ref.to_string(),
          source: anyhow::anyhow!("{e}"),
        })?;

    // Dropping the trust mode closes any hardware session it holds.
    let trust = self.resolve_trust(pub_key, cancel).await?;

    let evidence = run_cancellable(cancel, "image signature retrieval", async {
      self
        .source
        .verified_signatures(&reference, &trust)
        .await
        .map_err(|e| VerifyError::NoValidSignature {
          reference: image_ref.to_string(),
          source: Some(e),
        })
    })
    .await?;

    if evidence.is_empty() {
      return Err(VerifyError::NoValidSignature {
        reference: image_ref.to_string(),
        source: None,
      });
    }
    tracing::debug!(count = evidence.len(), "Verified signatures");

    let (signer_name, signed_timestamp) = select_signer(&evidence);
    tracing::info!(image = %image_ref, signer = %signer_name, "Image signature verified");
    Ok(VerifiedResult::verified(signer_name, signed_timestamp))
  }
}

/// First success wins: the first evidence naming a signer, else no signer
/// and the log time of the first evidence.
fn select_signer(evidence: &[SignatureEvidence]) -> (String, Option<i64>) {
  evidence
    .iter()
    .find_map(|ev| ev.image_signer().map(|name| (name, ev.integrated_time())))
    .unwrap_or_else(|| {
      (
        String::new(),
        evidence.first().and_then(SignatureEvidence::integrated_time),
      )
    })
}
