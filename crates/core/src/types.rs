//! Common types and result structures.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of an image or blob verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedResult {
    pub verified: bool,
    /// Signer identity from the certificate; empty for pure key-based checks.
    pub signer_name: String,
    /// Transparency-log integration time (Unix seconds) of the evidence
    /// that backed the result, when any log evidence was involved.
    pub signed_timestamp: Option<i64>,
}

impl VerifiedResult {
    pub fn verified(signer_name: impl Into<String>, signed_timestamp: Option<i64>) -> Self {
        Self {
            verified: true,
            signer_name: signer_name.into(),
            signed_timestamp,
        }
    }
}

/// Simple signing claim attached to container image signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleContainerImage {
    pub critical: Critical,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critical {
    pub identity: Identity,
    pub image: Image,
    #[serde(rename = "type")]
    pub claim_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "docker-reference")]
    pub docker_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(rename = "docker-manifest-digest")]
    pub docker_manifest_digest: String,
}

impl SimpleContainerImage {
    /// Parse a signature payload; `None` when it is not a simple signing claim.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        serde_json::from_slice(payload).ok()
    }
}
