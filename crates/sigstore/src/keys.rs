//! Public-key references and hardware token sessions.
//!
//! A key reference is either a file path, `env://NAME` (PEM held in an
//! environment variable), or a `pkcs11:` URI resolved through a
//! [`HardwareTokenProvider`].

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use manifest_sig_core::{Result, VerifyError};
use sigstore::crypto::CosignVerificationKey;

const ENV_PREFIX: &str = "env://";
const PKCS11_PREFIX: &str = "pkcs11:";

/// Where a public key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRef {
  File(PathBuf),
  Env(String),
  Hardware(String),
}

impl KeyRef {
  /// Parse a key reference. `None` or an empty string means no key, which
  /// selects keyless verification.
  pub fn parse(key_ref: Option<&str>) -> Option<Self> {
    let key_ref = key_ref.map(str::trim).filter(|k| !k.is_empty())?;
    Some(if let Some(name) = key_ref.strip_prefix(ENV_PREFIX) {
      KeyRef::Env(name.to_string())
    } else if key_ref.starts_with(PKCS11_PREFIX) {
      KeyRef::Hardware(key_ref.to_string())
    } else {
      KeyRef::File(PathBuf::from(key_ref))
    })
  }
}

impl fmt::Display for KeyRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyRef::File(path) => write!(f, "{}", path.display()),
      KeyRef::Env(name) => write!(f, "{ENV_PREFIX}{name}"),
      KeyRef::Hardware(uri) => f.write_str(uri),
    }
  }
}

/// An open session on a hardware token.
pub trait HardwareKeySession: Send + Sync {
  /// PEM-encoded public key of the referenced token object.
  fn public_key_pem(&self) -> anyhow::Result<Vec<u8>>;

  /// Release the session.
  fn close(self: Box<Self>) -> anyhow::Result<()>;
}

/// Opens sessions on hardware tokens (PKCS#11 modules and the like).
pub trait HardwareTokenProvider: Send + Sync {
  fn open_session(&self, uri: &str) -> anyhow::Result<Box<dyn HardwareKeySession>>;
}

/// Owns a hardware session and closes it exactly once: explicitly through
/// [`SessionGuard::close`], or on drop.
pub struct SessionGuard {
  session: Option<Box<dyn HardwareKeySession>>,
}

impl SessionGuard {
  pub fn new(session: Box<dyn HardwareKeySession>) -> Self {
    Self {
      session: Some(session),
    }
  }

  pub fn close(mut self) -> anyhow::Result<()> {
    match self.session.take() {
      Some(session) => session.close(),
      None => Ok(()),
    }
  }
}

impl Drop for SessionGuard {
  fn drop(&mut self) {
    if let Some(session) = self.session.take()
      && let Err(e) = session.close()
    {
      tracing::warn!(error = %e, "Failed to close hardware token session");
    }
  }
}

impl fmt::Debug for SessionGuard {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SessionGuard")
      .field("open", &self.session.is_some())
      .finish()
  }
}

/// A public key ready for verification, plus the hardware session backing
/// it when it came from a token.
#[derive(Debug)]
pub struct LoadedKey {
  pub pem: Vec<u8>,
  session: Option<SessionGuard>,
}

impl LoadedKey {
  pub fn from_pem(pem: Vec<u8>) -> anyhow::Result<Self> {
    CosignVerificationKey::try_from_pem(&pem).map_err(|e| anyhow!("unsupported public key: {e}"))?;
    Ok(Self { pem, session: None })
  }

  pub fn verification_key(&self) -> anyhow::Result<CosignVerificationKey> {
    CosignVerificationKey::try_from_pem(&self.pem).map_err(|e| anyhow!("unsupported public key: {e}"))
  }

  pub fn is_hardware_backed(&self) -> bool {
    self.session.is_some()
  }

  /// Close the hardware session now instead of on drop.
  pub fn release(mut self) -> anyhow::Result<()> {
    match self.session.take() {
      Some(guard) => guard.close(),
      None => Ok(()),
    }
  }
}

/// Load the key named by `key_ref`.
#[tracing::instrument(skip_all, fields(key_ref = %key_ref))]
pub async fn load_public_key(
  key_ref: &KeyRef,
  hardware: Option<&dyn HardwareTokenProvider>,
) -> Result<LoadedKey> {
  load_with_env(key_ref, hardware, |name| std::env::var(name).ok()).await
}

async fn load_with_env(
  key_ref: &KeyRef,
  hardware: Option<&dyn HardwareTokenProvider>,
  env: impl Fn(&str) -> Option<String>,
) -> Result<LoadedKey> {
  let loaded = match key_ref {
    KeyRef::File(path) => tokio::fs::read(path)
      .await
      .with_context(|| format!("Failed to read {}", path.display()))
      .and_then(LoadedKey::from_pem),
    KeyRef::Env(name) => env(name)
      .filter(|v| !v.trim().is_empty())
      .ok_or_else(|| anyhow!("environment variable {name} is not set"))
      .and_then(|v| LoadedKey::from_pem(v.into_bytes())),
    KeyRef::Hardware(uri) => open_hardware_key(uri, hardware),
  };
  let key = loaded.map_err(|source| VerifyError::KeyLoad {
    key_ref: key_ref.to_string(),
    source,
  })?;
  tracing::debug!(hardware = key.is_hardware_backed(), "Public key loaded");
  Ok(key)
}

fn open_hardware_key(
  uri: &str,
  hardware: Option<&dyn HardwareTokenProvider>,
) -> anyhow::Result<LoadedKey> {
  let Some(provider) = hardware else {
    bail!("no hardware token provider is configured");
  };
  let guard = SessionGuard::new(provider.open_session(uri)?);
  // On error the guard drops here and closes the session.
  let pem = guard
    .session
    .as_ref()
    .map(|s| s.public_key_pem())
    .transpose()?
    .ok_or_else(|| anyhow!("hardware session already closed"))?;
  let mut key = LoadedKey::from_pem(pem)?;
  key.session = Some(guard);
  Ok(key)
}
