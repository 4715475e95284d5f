//! Certificate chain validation against trusted Fulcio roots.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rustls_pki_types::{CertificateDer, TrustAnchor, UnixTime};
use webpki::{EndEntityCert, KeyUsage};

/// Extended key usage id-kp-codeSigning (1.3.6.1.5.5.7.3.3), DER value bytes.
const EKU_CODE_SIGNING: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x03, 0x03];

/// Trusted roots plus the intermediates needed to build paths to them.
#[derive(Debug, Clone)]
pub struct CertificatePool {
  roots: Vec<TrustAnchor<'static>>,
  intermediates: Vec<CertificateDer<'static>>,
}

impl CertificatePool {
  /// Build a pool from certificate chains ordered leaf-most first; the last
  /// certificate of each chain is the root.
  pub fn from_chains<I>(chains: I) -> Result<Self>
  where
    I: IntoIterator<Item = Vec<CertificateDer<'static>>>,
  {
    let mut roots = Vec::new();
    let mut intermediates = Vec::new();

    for mut chain in chains {
      let Some(root) = chain.pop() else {
        continue;
      };
      let anchor = webpki::anchor_from_trusted_cert(&root)
        .map_err(|e| anyhow!("failed to create trust anchor: {e:?}"))?
        .to_owned();
      roots.push(anchor);
      intermediates.extend(chain);
    }

    if roots.is_empty() {
      anyhow::bail!("no trusted root certificates");
    }
    Ok(Self {
      roots,
      intermediates,
    })
  }

  /// Build a pool where every certificate is a root.
  pub fn from_roots<I>(roots: I) -> Result<Self>
  where
    I: IntoIterator<Item = CertificateDer<'static>>,
  {
    Self::from_chains(roots.into_iter().map(|root| vec![root]))
  }

  /// Build a pool from PEM-encoded root certificates.
  pub fn from_pem_roots(pem_bytes: &[u8]) -> Result<Self> {
    let blocks = pem::parse_many(pem_bytes).context("invalid PEM in root bundle")?;
    Self::from_roots(
      blocks
        .into_iter()
        .filter(|b| b.tag() == "CERTIFICATE")
        .map(|b| CertificateDer::from(b.into_contents())),
    )
  }

  pub fn len(&self) -> usize {
    self.roots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.roots.is_empty()
  }

  /// Verify that `cert_der` chains to a trusted root with the code-signing
  /// usage, evaluated at `signed_at` (Unix seconds).
  pub fn verify(&self, cert_der: &[u8], signed_at: i64) -> Result<()> {
    let cert_der = CertificateDer::from(cert_der);
    let cert = EndEntityCert::try_from(&cert_der)
      .map_err(|e| anyhow!("failed to parse end-entity certificate: {e:?}"))?;
    let time = UnixTime::since_unix_epoch(Duration::from_secs(signed_at.max(0) as u64));

    cert.verify_for_usage(
      webpki::ALL_VERIFICATION_ALGS,
      &self.roots,
      &self.intermediates,
      time,
      KeyUsage::required(EKU_CODE_SIGNING),
      None,
      None,
    )
    .map_err(|e| anyhow!("certificate chain verification failed: {e:?}"))?;

    tracing::debug!("Signing certificate chains back to trusted root");
    Ok(())
  }
}
