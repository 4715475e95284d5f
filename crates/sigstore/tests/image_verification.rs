//! Image verification through the orchestrator with fake collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use manifest_sig_core::{CancellationToken, VerifyError};
use manifest_sig_sigstore::{SignatureEvidence, SignerNames, SigstoreEndpoints, Verifier};

const IMAGE: &str = "ghcr.io/example/app:v1.2.0";

fn verifier(source: Arc<FakeSource>) -> Verifier {
  Verifier::builder()
    .trust_material(trust_material())
    .signature_source(source)
    .build()
}

fn cert_evidence(email: &str, payload: &[u8], ts: Option<i64>) -> SignatureEvidence {
  SignatureEvidence::CertBased {
    payload: payload.to_vec(),
    signer: SignerNames {
      emails: vec![email.to_string()],
      ..Default::default()
    },
    integrated_time: ts,
  }
}

#[tokio::test]
async fn invalid_reference_never_reaches_the_registry() {
  let source = FakeSource::with(Vec::new());
  let err = verifier(source.clone())
    .verify_image("::not a ref::", None, &CancellationToken::new())
    .await
    .unwrap_err();

  match err {
    VerifyError::InvalidReference { reference, .. } => assert_eq!(reference, "::not a ref::"),
    other => panic!("expected InvalidReference, got {other:?}"),
  }
  assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn keyless_takes_first_claim_with_certificate() {
  let source = FakeSource::with(vec![
    cert_evidence("skipped@example.com", b"{\"not\":\"a claim\"}", Some(10)),
    cert_evidence(SIGNER_EMAIL, CLAIM, Some(20)),
    cert_evidence("later@example.com", CLAIM, Some(30)),
  ]);

  let result = verifier(source.clone())
    .verify_image(IMAGE, None, &CancellationToken::new())
    .await
    .unwrap();

  assert!(result.verified);
  assert_eq!(result.signer_name, SIGNER_EMAIL);
  assert_eq!(result.signed_timestamp, Some(20));
  assert_eq!(source.modes(), vec!["keyless"]);
}

#[tokio::test]
async fn keyless_image_check_leaves_the_configured_log_alone() {
  let rekor = FakeRekor::serve(vec![("abc", Some(rekor_entry(None, None)))]).await;
  let source = FakeSource::with(vec![cert_evidence(SIGNER_EMAIL, CLAIM, Some(20))]);
  let verifier = Verifier::builder()
    .endpoints(SigstoreEndpoints {
      rekor_url: rekor.url.clone(),
      ..Default::default()
    })
    .trust_material(trust_material())
    .signature_source(source)
    .build();

  let result = verifier
    .verify_image(IMAGE, None, &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(result.signed_timestamp, Some(20));
  assert!(rekor.requests().is_empty());
}

#[tokio::test]
async fn empty_key_string_selects_keyless() {
  let source = FakeSource::with(vec![cert_evidence(SIGNER_EMAIL, CLAIM, None)]);
  verifier(source.clone())
    .verify_image(IMAGE, Some(""), &CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(source.modes(), vec!["keyless"]);
}

#[tokio::test]
async fn key_mode_signature_without_certificate_still_verifies() {
  let key = KeyFile::signer();
  let source = FakeSource::with(vec![SignatureEvidence::KeyBased {
    payload: CLAIM.to_vec(),
    integrated_time: None,
  }]);

  let result = verifier(source.clone())
    .verify_image(IMAGE, Some(&key.key_ref()), &CancellationToken::new())
    .await
    .unwrap();

  assert!(result.verified);
  assert_eq!(result.signer_name, "");
  assert_eq!(result.signed_timestamp, None);
  assert_eq!(source.modes(), vec!["public-key"]);
}

#[tokio::test]
async fn nothing_verified_is_no_valid_signature() {
  let source = FakeSource::with(Vec::new());
  let err = verifier(source)
    .verify_image(IMAGE, None, &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    VerifyError::NoValidSignature { ref reference, source: None } if reference == IMAGE
  ));
}

#[tokio::test]
async fn retrieval_failure_is_no_valid_signature() {
  let err = verifier(FakeSource::failing())
    .verify_image(IMAGE, None, &CancellationToken::new())
    .await
    .unwrap_err();

  match err {
    VerifyError::NoValidSignature {
      source: Some(cause),
      ..
    } => assert_eq!(cause.to_string(), "manifest unknown"),
    other => panic!("expected NoValidSignature, got {other:?}"),
  }
}

#[tokio::test]
async fn missing_key_file_is_a_key_load_error() {
  let source = FakeSource::with(Vec::new());
  let err = verifier(source.clone())
    .verify_image(IMAGE, Some("/nonexistent/cosign.pub"), &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, VerifyError::KeyLoad { .. }));
  assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn hardware_session_is_closed_once_after_success() {
  let token = Arc::new(FakeToken::default());
  let source = FakeSource::with(vec![SignatureEvidence::KeyBased {
    payload: CLAIM.to_vec(),
    integrated_time: None,
  }]);
  let verifier = Verifier::builder()
    .signature_source(source)
    .hardware_provider(token.clone())
    .build();

  verifier
    .verify_image(IMAGE, Some("pkcs11:token=ci;object=cosign"), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(token.opened(), 1);
  assert_eq!(token.closed(), 1);
}

#[tokio::test]
async fn hardware_session_is_closed_once_after_failure() {
  let token = Arc::new(FakeToken::default());
  let verifier = Verifier::builder()
    .signature_source(FakeSource::failing())
    .hardware_provider(token.clone())
    .build();

  let err = verifier
    .verify_image(IMAGE, Some("pkcs11:token=ci;object=cosign"), &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, VerifyError::NoValidSignature { .. }));
  assert_eq!(token.opened(), 1);
  assert_eq!(token.closed(), 1);
}

#[tokio::test]
async fn cancellation_during_retrieval_is_prompt() {
  let verifier = verifier(FakeSource::hanging());
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.cancel();
  });

  let err = tokio::time::timeout(
    Duration::from_secs(5),
    verifier.verify_image(IMAGE, None, &cancel),
  )
  .await
  .expect("cancellation was not prompt")
  .unwrap_err();

  assert!(err.is_cancelled());
}
