//! Trust material for keyless verification and trust-mode selection.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rustls_pki_types::CertificateDer;
use serde::Deserialize;
use sigstore::trust::TrustRoot;
use sigstore::trust::sigstore::SigstoreTrustRoot;

use crate::bundle::BundleVerifier;
use crate::chain::CertificatePool;
use crate::config::SigstoreEndpoints;
use crate::keys::LoadedKey;
use crate::tlog::RekorKeyring;

/// Fulcio roots and transparency-log keys.
#[derive(Clone)]
pub struct TrustMaterial {
  pub pool: CertificatePool,
  pub keyring: RekorKeyring,
  /// The TUF trust root this material was read from, needed by the registry
  /// client. `None` for material loaded from a file.
  tuf_root: Option<Arc<SigstoreTrustRoot>>,
}

impl std::fmt::Debug for TrustMaterial {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TrustMaterial")
      .field("roots", &self.pool.len())
      .field("log_keys", &self.keyring.len())
      .field("tuf", &self.tuf_root.is_some())
      .finish()
  }
}

impl TrustMaterial {
  pub fn new(pool: CertificatePool, keyring: RekorKeyring) -> Self {
    Self {
      pool,
      keyring,
      tuf_root: None,
    }
  }

  /// Fetch the public-good trust root through Sigstore's TUF repository.
  #[tracing::instrument]
  pub async fn production() -> Result<Self> {
    tracing::debug!("Fetching Sigstore trust root");
    let root = SigstoreTrustRoot::new(None)
      .await
      .context("Failed to fetch Sigstore trust root")?;
    let mut material = Self::from_trust_root(&root)?;
    material.tuf_root = Some(Arc::new(root));
    Ok(material)
  }

  /// Read roots and log keys from any `sigstore` trust root.
  pub fn from_trust_root<R: TrustRoot>(root: &R) -> Result<Self> {
    let certs: Vec<CertificateDer<'static>> = root
      .fulcio_certs()
      .context("Failed to read Fulcio certificates")?
      .into_iter()
      .map(|c| c.into_owned())
      .collect();
    let pool = CertificatePool::from_roots(certs)?;
    let keyring = RekorKeyring::from_der_keys(
      root
        .rekor_keys()
        .context("Failed to read Rekor keys")?
        .into_iter(),
    )?;
    Ok(Self::new(pool, keyring))
  }

  /// Parse a `trusted_root.json` document.
  pub fn from_trusted_root_json(json: &[u8]) -> Result<Self> {
    let root: TrustedRootDoc =
      serde_json::from_slice(json).context("Failed to parse trusted root JSON")?;

    let mut chains = Vec::new();
    for ca in &root.certificate_authorities {
      let chain = ca
        .cert_chain
        .certificates
        .iter()
        .map(|c| decode_raw(&c.raw_bytes).map(CertificateDer::from))
        .collect::<Result<Vec<_>>>()
        .context("Invalid certificate in trusted root")?;
      chains.push(chain);
    }

    let keys = root
      .tlogs
      .iter()
      .map(|t| decode_raw(&t.public_key.raw_bytes))
      .collect::<Result<Vec<_>>>()
      .context("Invalid transparency log key in trusted root")?;

    if chains.is_empty() && keys.is_empty() {
      bail!("trusted root holds no certificate authorities or logs");
    }
    Ok(Self::new(
      CertificatePool::from_chains(chains)?,
      RekorKeyring::from_der_keys(keys)?,
    ))
  }

  pub async fn from_file(path: &Path) -> Result<Self> {
    let json = tokio::fs::read(path)
      .await
      .with_context(|| format!("Failed to read trusted root {}", path.display()))?;
    Self::from_trusted_root_json(&json)
  }

  /// An offline bundle verifier anchored in this material.
  pub fn bundle_verifier(&self) -> BundleVerifier {
    BundleVerifier::new(self.keyring.clone()).with_pool(self.pool.clone())
  }

  pub(crate) fn tuf_root(&self) -> Option<&SigstoreTrustRoot> {
    self.tuf_root.as_deref()
  }
}

fn decode_raw(raw: &str) -> Result<Vec<u8>> {
  BASE64.decode(raw.trim()).context("rawBytes is not base64")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustedRootDoc {
  #[serde(default)]
  tlogs: Vec<TlogDoc>,
  #[serde(default)]
  certificate_authorities: Vec<CertificateAuthorityDoc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TlogDoc {
  public_key: PublicKeyDoc,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyDoc {
  raw_bytes: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateAuthorityDoc {
  cert_chain: CertChainDoc,
}

#[derive(Deserialize)]
struct CertChainDoc {
  certificates: Vec<RawCertDoc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCertDoc {
  raw_bytes: String,
}

/// The single active trust model of a request.
#[derive(Debug)]
pub enum TrustMode {
  /// Static public key.
  PublicKey(LoadedKey),
  /// Short-lived certificates anchored in the transparency log.
  Keyless(KeylessTrust),
}

impl TrustMode {
  pub fn name(&self) -> &'static str {
    match self {
      TrustMode::PublicKey(_) => "public-key",
      TrustMode::Keyless(_) => "keyless",
    }
  }
}

/// Everything keyless verification needs.
#[derive(Debug, Clone)]
pub struct KeylessTrust {
  pub endpoints: SigstoreEndpoints,
  pub material: TrustMaterial,
}
