//! Minimal Rekor REST client: look up entries for an artifact digest.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::tlog::{LogEntry, RekorKeyring};

/// A client for a Rekor instance.
#[derive(Debug, Clone)]
pub struct RekorClient {
  url: String,
  client: reqwest::Client,
}

#[derive(Serialize)]
struct SearchIndex<'a> {
  hash: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryResponse {
  body: String,
  integrated_time: i64,
  #[serde(rename = "logID")]
  log_id: String,
  log_index: i64,
  verification: Option<EntryVerification>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryVerification {
  signed_entry_timestamp: Option<String>,
}

impl RekorClient {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into().trim_end_matches('/').to_string(),
      client: reqwest::Client::new(),
    }
  }

  /// UUIDs of the entries recorded for a SHA-256 artifact digest.
  pub async fn search_by_digest(&self, digest_hex: &str) -> Result<Vec<String>> {
    let url = format!("{}/api/v1/index/retrieve", self.url);
    let hash = format!("sha256:{digest_hex}");
    let response = self
      .client
      .post(&url)
      .json(&SearchIndex { hash: &hash })
      .send()
      .await
      .with_context(|| format!("Failed to query {url}"))?;

    if !response.status().is_success() {
      bail!("Rekor index search failed: {}", response.status());
    }
    response
      .json()
      .await
      .context("Failed to parse Rekor index response")
  }

  pub async fn get_entry(&self, uuid: &str) -> Result<LogEntry> {
    let url = format!("{}/api/v1/log/entries/{uuid}", self.url);
    let response = self
      .client
      .get(&url)
      .send()
      .await
      .with_context(|| format!("Failed to fetch {url}"))?;

    if !response.status().is_success() {
      bail!("Rekor entry fetch failed: {}", response.status());
    }
    let bytes = response
      .bytes()
      .await
      .context("Failed to read Rekor entry")?;
    parse_entry_response(&bytes)
  }

  /// The first entry for `digest_hex` that records exactly this signature
  /// and certificate and whose SET verifies.
  #[tracing::instrument(skip_all, fields(rekor = %self.url, digest = %digest_hex))]
  pub async fn find_entry(
    &self,
    digest_hex: &str,
    signature: &[u8],
    cert_der: &[u8],
    keyring: &RekorKeyring,
  ) -> Result<LogEntry> {
    let uuids = self.search_by_digest(digest_hex).await?;
    tracing::debug!(candidates = uuids.len(), "Rekor index search done");

    for uuid in &uuids {
      let entry = match self.get_entry(uuid).await {
        Ok(entry) => entry,
        Err(e) => {
          tracing::debug!(uuid = %uuid, error = %e, "Skipping unreadable log entry");
          continue;
        }
      };
      let matched = entry
        .signature_record()
        .and_then(|record| record.ensure_matches(signature, cert_der))
        .and_then(|()| keyring.verify_set(&entry));
      match matched {
        Ok(()) => return Ok(entry),
        Err(e) => tracing::debug!(uuid = %uuid, error = %e, "Skipping log entry"),
      }
    }
    bail!("no matching transparency log entry for sha256:{digest_hex}")
  }
}

/// Parse a `GET /api/v1/log/entries/{uuid}` response body.
fn parse_entry_response(bytes: &[u8]) -> Result<LogEntry> {
  let entries: BTreeMap<String, EntryResponse> =
    serde_json::from_slice(bytes).context("Failed to parse Rekor entry")?;
  let Some((_, entry)) = entries.into_iter().next() else {
    bail!("empty Rekor entry response");
  };
  let signed_entry_timestamp = entry
    .verification
    .and_then(|v| v.signed_entry_timestamp)
    .context("Rekor entry has no signed entry timestamp")?;

  Ok(LogEntry {
    body: entry.body,
    integrated_time: entry.integrated_time,
    log_index: entry.log_index,
    log_id: entry.log_id,
    signed_entry_timestamp,
  })
}
