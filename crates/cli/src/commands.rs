//! The verify-image and verify-blob commands.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use manifest_sig_core::{CancellationToken, VerifiedResult};
use manifest_sig_sigstore::{BlobRequest, KeyRef, SigstoreEndpoints, TrustMaterial, Verifier};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::GlobalArgs;
use crate::json::VerifyJson;
use crate::util::describe_inputs;

/// Files holding the encoded blob verification inputs.
pub struct BlobFiles {
  pub message: PathBuf,
  pub signature: PathBuf,
  pub certificate: Option<PathBuf>,
  pub bundle: Option<PathBuf>,
}

pub fn verify_image(image: String, key: Option<String>, global: &GlobalArgs) -> Result<()> {
  eprintln!("{}", style("==> Verifying image signatures").cyan().bold());
  let trust_mode = trust_mode_name(key.as_deref());
  eprintln!("    Trust mode: {}", style(trust_mode).cyan());

  let spinner = spinner()?;
  spinner.set_message(format!("Checking signatures of {}", style(&image).cyan()));

  let target = image.clone();

  let result = run_verification(global, |verifier, cancel| async move {
    verifier.verify_image(&image, key.as_deref(), &cancel).await
  });
  let result = finish(&spinner, result, "Found a verified signature")?;

  report(&result);
  emit(
    global.json,
    VerifyJson {
      status: "ok",
      command: "verify-image",
      target,
      trust_mode,
      verified: result.verified,
      signer_name: result.signer_name,
      signed_timestamp: result.signed_timestamp,
    },
  )
}

pub fn verify_blob(files: BlobFiles, key: Option<String>, global: &GlobalArgs) -> Result<()> {
  eprintln!("{}", style("==> Verifying blob signature").cyan().bold());
  let trust_mode = trust_mode_name(key.as_deref());
  eprintln!("    Trust mode: {}", style(trust_mode).cyan());

  let spinner = spinner()?;
  spinner.set_message(format!(
    "Reading inputs for {}",
    style(files.message.display()).cyan()
  ));

  let message = read_input(&files.message, "message")?;
  let signature = read_input(&files.signature, "signature")?;
  let mut request = BlobRequest::new(message, signature);
  if let Some(path) = &files.certificate {
    request = request.with_certificate(read_input(path, "certificate")?);
  }
  if let Some(path) = &files.bundle {
    request = request.with_bundle(read_input(path, "bundle")?);
  }
  if let Some(key) = &key {
    request = request.with_public_key(key.clone());
  }

  tracing::debug!(inputs = %describe_inputs(&request), "Loaded blob inputs");
  spinner.set_message(format!("Verifying {}", style(describe_inputs(&request)).cyan()));

  let result = run_verification(global, |verifier, cancel| async move {
    verifier.verify_blob(&request, &cancel).await
  });
  let result = finish(&spinner, result, "Signature verified")?;

  report(&result);
  emit(
    global.json,
    VerifyJson {
      status: "ok",
      command: "verify-blob",
      target: files.message.display().to_string(),
      trust_mode,
      verified: result.verified,
      signer_name: result.signer_name,
      signed_timestamp: result.signed_timestamp,
    },
  )
}

/// Run one verification on a fresh runtime. Ctrl-C and `--timeout` cancel it.
fn run_verification<F, Fut>(global: &GlobalArgs, op: F) -> Result<VerifiedResult>
where
  F: FnOnce(Verifier, CancellationToken) -> Fut,
  Fut: Future<Output = manifest_sig_core::Result<VerifiedResult>>,
{
  let rt = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
  rt.block_on(async {
    let verifier = build_verifier(global).await?;
    let cancel = CancellationToken::new();
    let _stop_triggers = cancel.clone().drop_guard();
    spawn_cancel_triggers(cancel.clone(), global.timeout);

    Ok(op(verifier, cancel).await?)
  })
}

async fn build_verifier(global: &GlobalArgs) -> Result<Verifier> {
  let endpoints = SigstoreEndpoints::from_env().with_rekor_url(global.rekor_url.clone());
  tracing::debug!(?endpoints, "Resolved endpoints");

  let mut builder = Verifier::builder().endpoints(endpoints);
  if let Some(path) = &global.trusted_root {
    let material = TrustMaterial::from_file(path)
      .await
      .with_context(|| format!("Failed to load trusted root: {}", path.display()))?;
    builder = builder.trust_material(material);
  }
  Ok(builder.build())
}

fn spawn_cancel_triggers(cancel: CancellationToken, timeout: Option<u64>) {
  tokio::spawn(async move {
    let deadline = async {
      match timeout {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
      }
    };
    tokio::select! {
      _ = cancel.cancelled() => return,
      res = tokio::signal::ctrl_c() => {
        if let Err(e) = res {
          tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
          return;
        }
        tracing::warn!("Interrupted, cancelling verification");
      }
      _ = deadline => tracing::warn!(timeout_secs = ?timeout, "Timed out, cancelling verification"),
    }
    cancel.cancel();
  });
}

fn trust_mode_name(key: Option<&str>) -> &'static str {
  match KeyRef::parse(key) {
    Some(_) => "public-key",
    None => "keyless",
  }
}

fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
  let data = std::fs::read(path)
    .with_context(|| format!("Failed to read {what}: {}", path.display()))?;
  tracing::debug!(input = what, bytes = data.len(), "Read input");
  Ok(data)
}

fn spinner() -> Result<ProgressBar> {
  let spinner = ProgressBar::new_spinner();
  spinner.set_style(
    ProgressStyle::default_spinner()
      .template("{spinner:.cyan} {msg}")
      .context("Invalid spinner template")?,
  );
  spinner.enable_steady_tick(Duration::from_millis(80));
  Ok(spinner)
}

fn finish(spinner: &ProgressBar, result: Result<VerifiedResult>, ok: &str) -> Result<VerifiedResult> {
  match result {
    Ok(result) => {
      spinner.finish_with_message(format!("[OK] {ok}"));
      Ok(result)
    }
    Err(e) => {
      spinner.finish_and_clear();
      Err(e)
    }
  }
}

fn report(result: &VerifiedResult) {
  eprintln!(
    "\n{} {}",
    style("[VALID]").green().bold(),
    style("Signature verified").green()
  );
  if result.signer_name.is_empty() {
    eprintln!("      Signer: {}", style("(no certificate)").dim());
  } else {
    eprintln!("      Signer: {}", style(&result.signer_name).cyan());
  }
  if let Some(ts) = result.signed_timestamp {
    eprintln!("      Logged: {}", style(format!("integratedTime {ts}")).cyan());
  }
}

fn emit(json: bool, payload: VerifyJson<'_>) -> Result<()> {
  if json {
    println!("{}", serde_json::to_string(&payload)?);
  } else {
    // Only print "OK" when stdout is piped (for pipeline composition)
    use std::io::IsTerminal;
    if !std::io::stdout().is_terminal() {
      println!("OK");
    }
  }
  Ok(())
}
