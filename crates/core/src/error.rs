//! Error taxonomy shared by the image and blob verification paths.

use thiserror::Error;

/// Errors surfaced by the verification orchestrators.
///
/// Underlying causes (network, crypto, parsing) are carried as
/// [`anyhow::Error`] sources so the full chain survives into the CLI.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The image reference could not be parsed.
    #[error("failed to parse image ref `{reference}`")]
    InvalidReference {
        reference: String,
        #[source]
        source: anyhow::Error,
    },

    /// The public key (file, env var or hardware token) could not be loaded.
    #[error("failed to load public key `{key_ref}`")]
    KeyLoad {
        key_ref: String,
        #[source]
        source: anyhow::Error,
    },

    /// The certificate bytes are not PEM.
    #[error("failed to decode PEM bytes: {0}")]
    CertificateDecode(String),

    /// The PEM block does not hold a valid X.509 certificate.
    #[error("failed to parse certificate")]
    CertificateParse(#[source] anyhow::Error),

    /// A field the caller supplied could not be decoded.
    #[error("failed to decode {field}")]
    InputDecode {
        field: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The bundle payload is not a valid bundle document.
    #[error("failed to parse bundle")]
    BundleParse(#[source] anyhow::Error),

    /// The bundle's log proof does not match the signature or certificate.
    #[error("bundle verification failed: {0}")]
    BundleVerification(String),

    /// Retrieval failed or no attached signature verified.
    #[error("no verified signatures in the image `{reference}`")]
    NoValidSignature {
        reference: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The online verification toolchain rejected the signature.
    #[error("online verification failed")]
    OnlineVerification(#[source] anyhow::Error),

    /// A supplied certificate could not be loaded after the signature verified.
    #[error("failed to load certificate")]
    CertificateLoad(#[source] Box<VerifyError>),

    /// The caller cancelled the operation.
    #[error("{operation} was cancelled")]
    Cancelled { operation: &'static str },

    /// The private staging area could not be prepared.
    #[error("failed to stage {what}")]
    Staging {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Trust material (roots, log keys) could not be resolved.
    #[error("failed to resolve trust material")]
    Trust(#[source] anyhow::Error),
}

impl VerifyError {
    /// `true` for errors that the blob path recovers from by falling back
    /// to online verification.
    pub fn is_bundle_error(&self) -> bool {
        matches!(
            self,
            VerifyError::BundleParse(_) | VerifyError::BundleVerification(_)
        )
    }

    /// `true` when the operation stopped because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, VerifyError::Cancelled { .. })
    }
}

/// Result type for verification operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
