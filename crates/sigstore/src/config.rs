//! Service endpoints used by the keyless trust mode.

/// Environment variable overriding the transparency-log URL.
pub const REKOR_SERVER_ENV: &str = "REKOR_SERVER";

/// Sigstore service endpoints configuration.
///
/// The Fulcio and OIDC parameters are only carried along for keyless
/// configuration; verification itself never contacts Fulcio or requests an
/// identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigstoreEndpoints {
  pub rekor_url: String,
  pub fulcio_url: String,
  pub oidc_issuer: String,
  pub oidc_client_id: String,
}

impl Default for SigstoreEndpoints {
  fn default() -> Self {
    Self {
      rekor_url: crate::DEFAULT_REKOR_URL.to_string(),
      fulcio_url: crate::DEFAULT_FULCIO_URL.to_string(),
      oidc_issuer: crate::DEFAULT_OIDC_ISSUER.to_string(),
      oidc_client_id: crate::DEFAULT_OIDC_CLIENT_ID.to_string(),
    }
  }
}

impl SigstoreEndpoints {
  /// Defaults, with the transparency-log URL taken from `REKOR_SERVER`
  /// when set.
  pub fn from_env() -> Self {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut endpoints = Self::default();
    if let Some(url) = lookup(REKOR_SERVER_ENV).filter(|u| !u.trim().is_empty()) {
      tracing::debug!(rekor_url = %url, "Using transparency log from environment");
      endpoints.rekor_url = url.trim().trim_end_matches('/').to_string();
    }
    endpoints
  }

  /// Apply an explicit transparency-log URL (e.g. from `--rekor-url`).
  pub fn with_rekor_url(mut self, rekor_url: Option<String>) -> Self {
    if let Some(url) = rekor_url {
      self.rekor_url = url.trim_end_matches('/').to_string();
    }
    self
  }
}
