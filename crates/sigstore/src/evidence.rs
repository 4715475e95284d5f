//! Evidence backing a verified signature.

use manifest_sig_core::SimpleContainerImage;
use sigstore::cosign::signature_layers::CertificateSubject;
use thiserror::Error;

use crate::certificate::SignerNames;

/// What a verified signature was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureEvidence {
  /// Verified with a static public key. Carries no identity.
  KeyBased {
    payload: Vec<u8>,
    integrated_time: Option<i64>,
  },
  /// Verified with a certificate issued to the signer.
  CertBased {
    payload: Vec<u8>,
    signer: SignerNames,
    integrated_time: Option<i64>,
  },
  /// Verified offline against a log bundle. The signed payload itself is
  /// not part of the evidence.
  BundleBased {
    signer: SignerNames,
    integrated_time: i64,
  },
}

/// The evidence variant cannot answer the question asked of it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} is not available for {kind} evidence")]
pub struct Unsupported {
  pub operation: &'static str,
  pub kind: &'static str,
}

impl SignatureEvidence {
  pub fn kind(&self) -> &'static str {
    match self {
      SignatureEvidence::KeyBased { .. } => "key-based",
      SignatureEvidence::CertBased { .. } => "certificate-based",
      SignatureEvidence::BundleBased { .. } => "bundle-based",
    }
  }

  fn unsupported(&self, operation: &'static str) -> Unsupported {
    Unsupported {
      operation,
      kind: self.kind(),
    }
  }

  /// The signed payload.
  pub fn payload(&self) -> Result<&[u8], Unsupported> {
    match self {
      SignatureEvidence::KeyBased { payload, .. } | SignatureEvidence::CertBased { payload, .. } => {
        Ok(payload)
      }
      SignatureEvidence::BundleBased { .. } => Err(self.unsupported("payload")),
    }
  }

  /// Identity fields of the signing certificate.
  pub fn signer_names(&self) -> Result<&SignerNames, Unsupported> {
    match self {
      SignatureEvidence::CertBased { signer, .. } | SignatureEvidence::BundleBased { signer, .. } => {
        Ok(signer)
      }
      SignatureEvidence::KeyBased { .. } => Err(self.unsupported("signer identity")),
    }
  }

  /// Log integration time, when the evidence includes a log entry.
  pub fn integrated_time(&self) -> Option<i64> {
    match self {
      SignatureEvidence::KeyBased {
        integrated_time, ..
      }
      | SignatureEvidence::CertBased {
        integrated_time, ..
      } => *integrated_time,
      SignatureEvidence::BundleBased {
        integrated_time, ..
      } => Some(*integrated_time),
    }
  }

  /// Signer identity when the payload is a container image claim and a
  /// certificate is available.
  pub fn image_signer(&self) -> Option<String> {
    let payload = self.payload().ok()?;
    SimpleContainerImage::from_payload(payload)?;
    self.signer_names().ok().map(SignerNames::signer_name)
  }
}

impl From<&CertificateSubject> for SignerNames {
  fn from(subject: &CertificateSubject) -> Self {
    match subject {
      CertificateSubject::Email(email) => SignerNames {
        emails: vec![email.clone()],
        ..Default::default()
      },
      CertificateSubject::Uri(uri) => SignerNames {
        uris: vec![uri.clone()],
        ..Default::default()
      },
    }
  }
}
