//! Sigstore verification of container images and detached blobs: public-key
//! and keyless trust, offline bundle checks with online fallback, and signer
//! identity extraction.

pub mod blob;
pub mod bundle;
pub mod certificate;
pub mod chain;
pub mod config;
pub mod evidence;
pub mod image;
pub mod keys;
pub mod online;
pub mod registry;
pub mod rekor;
pub mod tlog;
pub mod trust;
pub mod verifier;

pub use blob::BlobRequest;
pub use bundle::{BundleVerification, BundleVerifier, RekorBundle};
pub use certificate::{SignerNames, load_certificate, signer_name, signer_name_from_pem};
pub use chain::CertificatePool;
pub use config::{REKOR_SERVER_ENV, SigstoreEndpoints};
pub use evidence::{SignatureEvidence, Unsupported};
pub use keys::{HardwareKeySession, HardwareTokenProvider, KeyRef, LoadedKey, load_public_key};
pub use online::{OnlineRequest, OnlineVerification, OnlineVerifier, SigstoreOnlineVerifier};
pub use registry::{CosignRegistrySource, SignatureSource};
pub use sigstore::registry::OciReference;
pub use tlog::{LogEntry, RekorKeyring};
pub use trust::{KeylessTrust, TrustMaterial, TrustMode};
pub use verifier::{Verifier, VerifierBuilder};

/// Default Sigstore public endpoints.
pub const DEFAULT_OIDC_ISSUER: &str = "https://oauth2.sigstore.dev/auth";
pub const DEFAULT_FULCIO_URL: &str = "https://fulcio.sigstore.dev";
pub const DEFAULT_REKOR_URL: &str = "https://rekor.sigstore.dev";
pub const DEFAULT_OIDC_CLIENT_ID: &str = "sigstore";
