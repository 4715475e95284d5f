//! Signatures attached to container images in an OCI registry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sigstore::cosign::ClientBuilder;
use sigstore::cosign::signature_layers::SignatureLayer;
use sigstore::cosign::verification_constraint::{PublicKeyVerifier, VerificationConstraint};
use sigstore::cosign::CosignCapabilities;
use sigstore::crypto::{Signature, SigningScheme};
use sigstore::registry::{Auth, OciReference};

use crate::certificate::SignerNames;
use crate::evidence::SignatureEvidence;
use crate::trust::TrustMode;

/// Retrieves the signatures attached to an image and returns those that
/// verify under the given trust mode.
#[async_trait]
pub trait SignatureSource: Send + Sync {
  async fn verified_signatures(
    &self,
    image: &OciReference,
    trust: &TrustMode,
  ) -> Result<Vec<SignatureEvidence>>;
}

/// Production source backed by the `sigstore` cosign client, pulling
/// anonymously.
#[derive(Debug, Clone, Default)]
pub struct CosignRegistrySource;

#[async_trait]
impl SignatureSource for CosignRegistrySource {
  #[tracing::instrument(skip_all, fields(image = %image, mode = trust.name()))]
  async fn verified_signatures(
    &self,
    image: &OciReference,
    trust: &TrustMode,
  ) -> Result<Vec<SignatureEvidence>> {
    let mut builder = ClientBuilder::default();
    if let TrustMode::Keyless(keyless) = trust {
      let root = keyless
        .material
        .tuf_root()
        .context("Keyless image verification requires the Sigstore TUF trust root")?;
      builder = builder
        .with_trust_repository(root)
        .context("Failed to load trust root into cosign client")?;
    }
    let mut client = builder.build().context("Failed to build cosign client")?;

    let (cosign_image, source_digest) = client
      .triangulate(image, &Auth::Anonymous)
      .await
      .context("Failed to locate signatures in the registry")?;
    tracing::debug!(signature_image = %cosign_image, digest = %source_digest, "Triangulated");

    let layers = client
      .trusted_signature_layers(&Auth::Anonymous, &source_digest, &cosign_image)
      .await
      .context("Failed to retrieve signature layers")?;
    tracing::debug!(layers = layers.len(), "Fetched signature layers");

    match trust {
      TrustMode::PublicKey(key) => {
        let verifier = PublicKeyVerifier::new(&key.pem, &SigningScheme::default())
          .context("Failed to build public key verifier")?;
        Ok(
          layers
            .iter()
            .filter(|layer| verifier.verify(layer).unwrap_or(false))
            .map(|layer| SignatureEvidence::KeyBased {
              payload: layer.raw_data.clone(),
              integrated_time: integrated_time(layer),
            })
            .collect(),
        )
      }
      TrustMode::Keyless(_) => Ok(layers.iter().filter_map(keyless_evidence).collect()),
    }
  }
}

/// Layers carry a certificate signature only once the cosign client has
/// chained the certificate to Fulcio and checked the log bundle; the payload
/// signature is checked here against the certificate key.
fn keyless_evidence(layer: &SignatureLayer) -> Option<SignatureEvidence> {
  let cert = layer.certificate_signature.as_ref()?;
  let signature = layer.signature.as_ref()?;
  if let Err(e) = cert
    .verification_key
    .verify_signature(Signature::Base64Encoded(signature.as_bytes()), &layer.raw_data)
  {
    tracing::debug!(error = %e, "Skipping layer with invalid signature");
    return None;
  }
  Some(SignatureEvidence::CertBased {
    payload: layer.raw_data.clone(),
    signer: SignerNames::from(&cert.subject),
    integrated_time: integrated_time(layer),
  })
}

fn integrated_time(layer: &SignatureLayer) -> Option<i64> {
  layer.bundle.as_ref().map(|b| b.payload.integrated_time)
}
