//! Certificate loading and signer identity extraction.

use manifest_sig_core::{Result, VerifyError};
use x509_cert::Certificate;
use x509_cert::der::asn1::{Ia5StringRef, PrintableStringRef, Utf8StringRef};
use x509_cert::der::{Any, Decode};
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::pkix::name::GeneralName;

/// Parse a PEM-encoded X.509 certificate.
pub fn load_certificate(pem_bytes: &[u8]) -> Result<Certificate> {
  let block = pem::parse(pem_bytes).map_err(|e| VerifyError::CertificateDecode(e.to_string()))?;
  if block.tag() != "CERTIFICATE" {
    return Err(VerifyError::CertificateDecode(format!(
      "expected a CERTIFICATE block, found `{}`",
      block.tag()
    )));
  }
  Certificate::from_der(block.contents())
    .map_err(|e| VerifyError::CertificateParse(anyhow::anyhow!("{e}")))
}

/// Name fields of a signer certificate that can carry its identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerNames {
  pub emails: Vec<String>,
  pub uris: Vec<String>,
  pub common_name: Option<String>,
}

impl SignerNames {
  pub fn from_certificate(cert: &Certificate) -> Self {
    let mut names = SignerNames::default();

    let san_ext = cert.tbs_certificate.extensions.as_ref().and_then(|exts| {
      exts.iter()
        .find(|ext| ext.extn_id == const_oid::db::rfc5280::ID_CE_SUBJECT_ALT_NAME)
    });
    if let Some(ext) = san_ext {
      match SubjectAltName::from_der(ext.extn_value.as_bytes()) {
        Ok(san) => {
          for name in san.0 {
            match name {
              GeneralName::Rfc822Name(email) => names.emails.push(email.to_string()),
              GeneralName::UniformResourceIdentifier(uri) => {
                names.uris.push(uri.to_string())
              }
              _ => {}
            }
          }
        }
        Err(e) => tracing::debug!(error = %e, "Ignoring malformed SAN extension"),
      }
    }

    names.common_name = cert
      .tbs_certificate
      .subject
      .0
      .iter()
      .flat_map(|rdn| rdn.0.iter())
      .find(|atv| atv.oid == const_oid::db::rfc4519::CN)
      .and_then(|atv| directory_string(&atv.value));

    names
  }

  /// The signer identity: first SAN e-mail, then first SAN URI, then the
  /// subject common name. Empty when none is present.
  pub fn signer_name(&self) -> String {
    self.emails
      .first()
      .or_else(|| self.uris.first())
      .or(self.common_name.as_ref())
      .map(|s| s.trim().to_string())
      .unwrap_or_default()
  }
}

/// Signer identity of a parsed certificate.
pub fn signer_name(cert: &Certificate) -> String {
  SignerNames::from_certificate(cert).signer_name()
}

/// Load a PEM certificate and return its signer identity.
pub fn signer_name_from_pem(pem_bytes: &[u8]) -> Result<String> {
  load_certificate(pem_bytes).map(|cert| signer_name(&cert))
}

fn directory_string(value: &Any) -> Option<String> {
  if let Ok(s) = Utf8StringRef::try_from(value) {
    return Some(s.as_str().to_string());
  }
  if let Ok(s) = PrintableStringRef::try_from(value) {
    return Some(s.as_str().to_string());
  }
  Ia5StringRef::try_from(value)
    .ok()
    .map(|s| s.as_str().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  const SIGNER: &[u8] = include_bytes!("../tests/fixtures/signer.crt.pem");
  const WORKFLOW: &[u8] = include_bytes!("../tests/fixtures/other.crt.pem");
  const CN_ONLY: &[u8] = include_bytes!("../tests/fixtures/cn_only.crt.pem");
  const PUBKEY: &[u8] = include_bytes!("../tests/fixtures/signer.pub.pem");

  #[test]
  fn email_san_wins() {
    assert_eq!(signer_name_from_pem(SIGNER).unwrap(), "signer@example.com");
  }

  #[test]
  fn uri_san_when_no_email() {
    let names = SignerNames::from_certificate(&load_certificate(WORKFLOW).unwrap());
    assert!(names.emails.is_empty());
    assert_eq!(names.common_name.as_deref(), Some("ci-bot"));
    assert_eq!(
      names.signer_name(),
      "https://github.com/example/repo/.github/workflows/release.yml@refs/heads/main"
    );
  }

  #[test]
  fn common_name_as_last_resort() {
    assert_eq!(signer_name_from_pem(CN_ONLY).unwrap(), "cn only");
  }

  #[test]
  fn empty_names_give_empty_identity() {
    assert_eq!(SignerNames::default().signer_name(), "");
  }

  #[test]
  fn loading_is_idempotent() {
    let first = SignerNames::from_certificate(&load_certificate(SIGNER).unwrap());
    let second = SignerNames::from_certificate(&load_certificate(SIGNER).unwrap());
    assert_eq!(first, second);
  }

  #[test]
  fn non_pem_is_a_decode_error() {
    let err = load_certificate(b"definitely not pem").unwrap_err();
    assert!(matches!(err, VerifyError::CertificateDecode(_)));
  }

  #[test]
  fn public_key_block_is_a_decode_error() {
    let err = load_certificate(PUBKEY).unwrap_err();
    assert!(matches!(err, VerifyError::CertificateDecode(_)));
  }

  #[test]
  fn garbage_der_is_a_parse_error() {
    let pem = pem::encode(&pem::Pem::new("CERTIFICATE", vec![0x30, 0x03, 0x02, 0x01, 0x01]));
    let err = load_certificate(pem.as_bytes()).unwrap_err();
    assert!(matches!(err, VerifyError::CertificateParse(_)));
  }
}
