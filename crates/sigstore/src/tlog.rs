//! Transparency log entries: Signed Entry Timestamp verification and
//! entry body decoding.
//!
//! An entry is proven to have been accepted by the log when its SET, an
//! ECDSA P-256 signature by the log key over the RFC 8785 canonical form of
//! `{body, integratedTime, logID, logIndex}`, verifies.

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use p256::ecdsa::{Signature, VerifyingKey, signature::Verifier};
use p256::pkcs8::DecodePublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A log entry together with its Signed Entry Timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
  /// Base64 entry body.
  pub body: String,
  pub integrated_time: i64,
  pub log_index: i64,
  /// Hex SHA-256 of the log's public key.
  pub log_id: String,
  /// Base64 DER ECDSA signature.
  pub signed_entry_timestamp: String,
}

#[derive(Serialize)]
struct SignedEntry<'a> {
  body: &'a str,
  #[serde(rename = "integratedTime")]
  integrated_time: i64,
  #[serde(rename = "logID")]
  log_id: &'a str,
  #[serde(rename = "logIndex")]
  log_index: i64,
}

impl LogEntry {
  fn canonical_payload(&self) -> Result<Vec<u8>> {
    let entry = SignedEntry {
      body: &self.body,
      integrated_time: self.integrated_time,
      log_id: &self.log_id,
      log_index: self.log_index,
    };
    serde_jcs::to_vec(&entry).context("failed to canonicalize log entry")
  }

  /// Decode the entry body as a signature record.
  pub fn signature_record(&self) -> Result<SignatureRecord> {
    let raw = BASE64
      .decode(&self.body)
      .context("log entry body is not base64")?;
    let body: EntryBody =
      serde_json::from_slice(&raw).context("log entry body is not a JSON entry")?;
    match body.kind.as_str() {
      "hashedrekord" | "rekord" => {}
      other => bail!("unsupported log entry kind `{other}`"),
    }
    let spec: RecordSpec =
      serde_json::from_value(body.spec).context("malformed signature record spec")?;

    Ok(SignatureRecord {
      digest_algorithm: spec.data.hash.algorithm,
      digest_hex: spec.data.hash.value.to_lowercase(),
      signature: BASE64
        .decode(spec.signature.content.trim())
        .context("recorded signature is not base64")?,
      public_key_pem: BASE64
        .decode(spec.signature.public_key.content.trim())
        .context("recorded public key is not base64")?,
    })
  }
}

#[derive(Deserialize)]
struct EntryBody {
  kind: String,
  spec: serde_json::Value,
}

#[derive(Deserialize)]
struct RecordSpec {
  data: RecordData,
  signature: RecordSignature,
}

#[derive(Deserialize)]
struct RecordData {
  hash: RecordHash,
}

#[derive(Deserialize)]
struct RecordHash {
  algorithm: String,
  value: String,
}

#[derive(Deserialize)]
struct RecordSignature {
  content: String,
  #[serde(rename = "publicKey")]
  public_key: RecordPublicKey,
}

#[derive(Deserialize)]
struct RecordPublicKey {
  content: String,
}

/// Signature, artifact digest and signer key material recorded in a log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
  pub digest_algorithm: String,
  pub digest_hex: String,
  pub signature: Vec<u8>,
  /// PEM certificate (keyless) or PEM public key.
  pub public_key_pem: Vec<u8>,
}

impl SignatureRecord {
  /// Check that the record is about exactly this signature and certificate.
  pub fn ensure_matches(&self, signature: &[u8], cert_der: &[u8]) -> Result<()> {
    if self.signature != signature {
      bail!("log entry records a different signature");
    }
    let recorded = pem::parse(&self.public_key_pem)
      .context("recorded public key is not PEM")?;
    if recorded.tag() != "CERTIFICATE" || recorded.contents() != cert_der {
      bail!("log entry records a different certificate");
    }
    Ok(())
  }

  /// Check the recorded artifact digest against `message`.
  pub fn ensure_digest_of(&self, message: &[u8]) -> Result<()> {
    if self.digest_algorithm != "sha256" {
      bail!("unsupported digest algorithm `{}`", self.digest_algorithm);
    }
    if hex::encode(Sha256::digest(message)) != self.digest_hex {
      bail!("artifact digest does not match the log entry");
    }
    Ok(())
  }
}

/// Public keys of the transparency logs we trust.
#[derive(Debug, Clone, Default)]
pub struct RekorKeyring {
  keys: Vec<(String, VerifyingKey)>,
}

impl RekorKeyring {
  /// Build a keyring from DER SubjectPublicKeyInfo keys. Keys that are not
  /// ECDSA P-256 are skipped.
  pub fn from_der_keys<I, K>(keys: I) -> Result<Self>
  where
    I: IntoIterator<Item = K>,
    K: AsRef<[u8]>,
  {
    let mut ring = Vec::new();
    for der in keys {
      let der = der.as_ref();
      match VerifyingKey::from_public_key_der(der) {
        Ok(key) => {
          let log_id = hex::encode(Sha256::digest(der));
          tracing::debug!(log_id = %log_id, "Loaded transparency log key");
          ring.push((log_id, key));
        }
        Err(e) => tracing::warn!(error = %e, "Skipping non ECDSA P-256 log key"),
      }
    }
    if ring.is_empty() {
      bail!("no usable transparency log keys");
    }
    Ok(Self { keys: ring })
  }

  /// Build a keyring from one or more PEM `PUBLIC KEY` blocks.
  pub fn from_pem(pem_bytes: &[u8]) -> Result<Self> {
    let blocks = pem::parse_many(pem_bytes).context("invalid PEM in log key file")?;
    Self::from_der_keys(
      blocks
        .into_iter()
        .filter(|b| b.tag() == "PUBLIC KEY")
        .map(|b| b.into_contents()),
    )
  }

  pub fn len(&self) -> usize {
    self.keys.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keys.is_empty()
  }

  /// Verify the Signed Entry Timestamp of `entry`.
  pub fn verify_set(&self, entry: &LogEntry) -> Result<()> {
    let sig_bytes = BASE64
      .decode(entry.signed_entry_timestamp.trim())
      .context("signed entry timestamp is not base64")?;
    let signature = Signature::from_der(&sig_bytes)
      .or_else(|_| Signature::from_slice(&sig_bytes))
      .map_err(|e| anyhow!("malformed signed entry timestamp: {e}"))?;
    let payload = entry.canonical_payload()?;

    // Prefer the key named by the entry; fall back to every trusted key
    // for entries that carry no (or an unexpected) log id.
    let named = self
      .keys
      .iter()
      .filter(|(id, _)| id.eq_ignore_ascii_case(&entry.log_id));
    let verified = named
      .chain(self.keys.iter())
      .any(|(_, key)| key.verify(&payload, &signature).is_ok());

    if !verified {
      bail!("signed entry timestamp does not verify with any trusted log key");
    }
    tracing::debug!(log_index = entry.log_index, "Signed entry timestamp verified");
    Ok(())
  }
}
