//! The verification entry point and its collaborators.

use std::fmt;
use std::sync::Arc;

use manifest_sig_core::{CancellationToken, Result, VerifyError, run_cancellable};
use tokio::sync::OnceCell;

use crate::config::SigstoreEndpoints;
use crate::keys::{HardwareTokenProvider, KeyRef, load_public_key};
use crate::online::{OnlineVerifier, SigstoreOnlineVerifier};
use crate::registry::{CosignRegistrySource, SignatureSource};
use crate::trust::{KeylessTrust, TrustMaterial, TrustMode};

/// Verifies image and blob signatures.
///
/// Holds no per-request state; every call resolves its own trust mode,
/// staging area and key session. Keyless trust material is resolved once
/// and reused.
pub struct Verifier {
  pub(crate) endpoints: SigstoreEndpoints,
  pub(crate) source: Arc<dyn SignatureSource>,
  pub(crate) online: Arc<dyn OnlineVerifier>,
  hardware: Option<Arc<dyn HardwareTokenProvider>>,
  material: OnceCell<TrustMaterial>,
}

impl fmt::Debug for Verifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Verifier")
      .field("endpoints", &self.endpoints)
      .field("hardware", &self.hardware.is_some())
      .field("material", &self.material.get())
      .finish()
  }
}

impl Verifier {
  pub fn builder() -> VerifierBuilder {
    VerifierBuilder::default()
  }

  /// Public-good endpoints (honouring `REKOR_SERVER`), TUF trust root,
  /// anonymous registry access.
  pub fn production() -> Self {
    Self::builder()
      .endpoints(SigstoreEndpoints::from_env())
      .build()
  }

  pub fn endpoints(&self) -> &SigstoreEndpoints {
    &self.endpoints
  }

  /// Keyless trust material, fetched on first use.
  pub(crate) async fn trust_material(&self, cancel: &CancellationToken) -> Result<TrustMaterial> {
    self
      .material
      .get_or_try_init(|| {
        run_cancellable(cancel, "trust root fetch", async {
          TrustMaterial::production().await.map_err(VerifyError::Trust)
        })
      })
      .await
      .cloned()
  }

  /// Select the trust mode: a non-empty key reference means public-key
  /// verification, anything else keyless.
  pub(crate) async fn resolve_trust(
    &self,
    pub_key: Option<&str>,
    cancel: &CancellationToken,
  ) -> Result<TrustMode> {
    let mode = match KeyRef::parse(pub_key) {
      Some(key_ref) => {
        TrustMode::PublicKey(load_public_key(&key_ref, self.hardware.as_deref()).await?)
      }
      None => TrustMode::Keyless(KeylessTrust {
        endpoints: self.endpoints.clone(),
        material: self.trust_material(cancel).await?,
      }),
    };
    tracing::debug!(mode = mode.name(), "Trust mode selected");
    Ok(mode)
  }
}

/// Builder for [`Verifier`]; unset collaborators default to production ones.
#[derive(Default)]
pub struct VerifierBuilder {
  endpoints: Option<SigstoreEndpoints>,
  material: Option<TrustMaterial>,
  source: Option<Arc<dyn SignatureSource>>,
  online: Option<Arc<dyn OnlineVerifier>>,
  hardware: Option<Arc<dyn HardwareTokenProvider>>,
}

impl VerifierBuilder {
  pub fn endpoints(mut self, endpoints: SigstoreEndpoints) -> Self {
    self.endpoints = Some(endpoints);
    self
  }

  /// Use this trust material instead of fetching the TUF trust root.
  pub fn trust_material(mut self, material: TrustMaterial) -> Self {
    self.material = Some(material);
    self
  }

  pub fn signature_source(mut self, source: Arc<dyn SignatureSource>) -> Self {
    self.source = Some(source);
    self
  }

  pub fn online_verifier(mut self, online: Arc<dyn OnlineVerifier>) -> Self {
    self.online = Some(online);
    self
  }

  pub fn hardware_provider(mut self, hardware: Arc<dyn HardwareTokenProvider>) -> Self {
    self.hardware = Some(hardware);
    self
  }

  pub fn build(self) -> Verifier {
    Verifier {
      endpoints: self.endpoints.unwrap_or_default(),
      source: self
        .source
        .unwrap_or_else(|| Arc::new(CosignRegistrySource)),
      online: self
        .online
        .unwrap_or_else(|| Arc::new(SigstoreOnlineVerifier)),
      hardware: self.hardware,
      material: OnceCell::new_with(self.material),
    }
  }
}
