//! Core building blocks for manifest-sig: the verification result type, the
//! error taxonomy, transport decoding of signature fields, private staging
//! of inputs, and cancellation.
//!
//! This crate has no Sigstore or CLI dependencies.

pub mod cancel;
pub mod encoding;
pub mod error;
pub mod staging;
pub mod types;

pub use cancel::{CancellationToken, run_cancellable};
pub use encoding::{decode_field, decode_optional, encode_field};
pub use error::{Result, VerifyError};
pub use staging::{StagedFile, StagingArea};
pub use types::*;
