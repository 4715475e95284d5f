//! Fixtures and fakes shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use manifest_sig_core::encode_field;
use manifest_sig_sigstore::{
  HardwareKeySession, HardwareTokenProvider, OciReference, OnlineRequest, OnlineVerification,
  OnlineVerifier, SignatureEvidence, SignatureSource, TrustMaterial, TrustMode,
};

pub const ROOT: &[u8] = include_bytes!("../fixtures/root.crt.pem");
pub const SIGNER: &[u8] = include_bytes!("../fixtures/signer.crt.pem");
pub const SIGNER_PUB: &[u8] = include_bytes!("../fixtures/signer.pub.pem");
pub const OTHER: &[u8] = include_bytes!("../fixtures/other.crt.pem");
pub const MESSAGE: &[u8] = include_bytes!("../fixtures/message.yaml");
pub const SIGNATURE: &[u8] = include_bytes!("../fixtures/message.sig");
pub const BUNDLE: &[u8] = include_bytes!("../fixtures/bundle.json");
pub const TRUSTED_ROOT: &[u8] = include_bytes!("../fixtures/trusted_root.json");
pub const INTEGRATED_TIME: &str = include_str!("../fixtures/integrated_time.txt");

pub const SIGNER_EMAIL: &str = "signer@example.com";
pub const WORKFLOW_URI: &str =
  "https://github.com/example/repo/.github/workflows/release.yml@refs/heads/main";

pub fn integrated_time() -> i64 {
  INTEGRATED_TIME.trim().parse().unwrap()
}

pub fn trust_material() -> TrustMaterial {
  TrustMaterial::from_trusted_root_json(TRUSTED_ROOT).unwrap()
}

/// Message field as annotation producers write it.
pub fn encoded_message() -> String {
  encode_field(MESSAGE)
}

/// Signature field: plain base64, no gzip.
pub fn encoded_signature() -> String {
  BASE64.encode(SIGNATURE)
}

pub fn encoded(raw: &[u8]) -> String {
  encode_field(raw)
}

/// Writes the signer's public key into a temporary directory.
pub struct KeyFile {
  _dir: tempfile::TempDir,
  pub path: PathBuf,
}

impl KeyFile {
  pub fn signer() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cosign.pub");
    std::fs::write(&path, SIGNER_PUB).unwrap();
    Self { _dir: dir, path }
  }

  pub fn key_ref(&self) -> String {
    self.path.display().to_string()
  }
}

pub const CLAIM: &[u8] = br#"{"critical":{"identity":{"docker-reference":"ghcr.io/example/app"},"image":{"docker-manifest-digest":"sha256:5f0b4a0c4e4f"},"type":"cosign container image signature"},"optional":null}"#;

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
  Succeed(Option<i64>),
  Fail,
  Panic,
  Hang,
}

/// What the fake online verifier saw during one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
  pub mode: &'static str,
  pub message: PathBuf,
  pub signature: PathBuf,
  pub certificate: Option<PathBuf>,
  pub message_bytes: Vec<u8>,
  pub signature_bytes: Vec<u8>,
}

/// Online verifier fake that records staged paths and behaves as told.
pub struct FakeOnline {
  behaviour: Behaviour,
  calls: AtomicUsize,
  seen: Mutex<Vec<SeenRequest>>,
}

impl FakeOnline {
  pub fn new(behaviour: Behaviour) -> Arc<Self> {
    Arc::new(Self {
      behaviour,
      calls: AtomicUsize::new(0),
      seen: Mutex::new(Vec::new()),
    })
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn seen(&self) -> Vec<SeenRequest> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl OnlineVerifier for FakeOnline {
  async fn verify(&self, request: OnlineRequest<'_>) -> Result<OnlineVerification> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.seen.lock().unwrap().push(SeenRequest {
      mode: request.trust.name(),
      message: request.message.to_path_buf(),
      signature: request.signature.to_path_buf(),
      certificate: request.certificate.map(Path::to_path_buf),
      message_bytes: std::fs::read(request.message)?,
      signature_bytes: std::fs::read(request.signature)?,
    });
    match self.behaviour {
      Behaviour::Succeed(log_integrated_time) => Ok(OnlineVerification {
        log_integrated_time,
      }),
      Behaviour::Fail => bail!("tlog entry not found"),
      Behaviour::Panic => panic!("online verifier exploded"),
      Behaviour::Hang => {
        std::future::pending::<()>().await;
        unreachable!()
      }
    }
  }
}

/// Signature source fake returning canned evidence.
pub struct FakeSource {
  evidence: Vec<SignatureEvidence>,
  fail: bool,
  hang: bool,
  calls: AtomicUsize,
  modes: Mutex<Vec<&'static str>>,
}

impl FakeSource {
  pub fn with(evidence: Vec<SignatureEvidence>) -> Arc<Self> {
    Arc::new(Self {
      evidence,
      fail: false,
      hang: false,
      calls: AtomicUsize::new(0),
      modes: Mutex::new(Vec::new()),
    })
  }

  pub fn failing() -> Arc<Self> {
    Arc::new(Self {
      fail: true,
      ..Self::plain()
    })
  }

  pub fn hanging() -> Arc<Self> {
    Arc::new(Self {
      hang: true,
      ..Self::plain()
    })
  }

  fn plain() -> Self {
    Self {
      evidence: Vec::new(),
      fail: false,
      hang: false,
      calls: AtomicUsize::new(0),
      modes: Mutex::new(Vec::new()),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn modes(&self) -> Vec<&'static str> {
    self.modes.lock().unwrap().clone()
  }
}

#[async_trait]
impl SignatureSource for FakeSource {
  async fn verified_signatures(
    &self,
    _image: &OciReference,
    trust: &TrustMode,
  ) -> Result<Vec<SignatureEvidence>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.modes.lock().unwrap().push(trust.name());
    if self.hang {
      std::future::pending::<()>().await;
    }
    if self.fail {
      return Err(anyhow!("manifest unknown"));
    }
    Ok(self.evidence.clone())
  }
}

/// Hardware token fake counting session opens and closes.
#[derive(Default)]
pub struct FakeToken {
  pub opened: Arc<AtomicUsize>,
  pub closed: Arc<AtomicUsize>,
}

impl FakeToken {
  pub fn opened(&self) -> usize {
    self.opened.load(Ordering::SeqCst)
  }

  pub fn closed(&self) -> usize {
    self.closed.load(Ordering::SeqCst)
  }
}

struct FakeSession {
  closed: Arc<AtomicUsize>,
}

impl HardwareKeySession for FakeSession {
  fn public_key_pem(&self) -> Result<Vec<u8>> {
    Ok(SIGNER_PUB.to_vec())
  }

  fn close(self: Box<Self>) -> Result<()> {
    self.closed.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

impl HardwareTokenProvider for FakeToken {
  fn open_session(&self, _uri: &str) -> Result<Box<dyn HardwareKeySession>> {
    self.opened.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(FakeSession {
      closed: self.closed.clone(),
    }))
  }
}

/// Rekor API entry for the fixture bundle, optionally with another body or
/// integration time.
pub fn rekor_entry(body: Option<String>, integrated_time: Option<i64>) -> serde_json::Value {
  let bundle: serde_json::Value = serde_json::from_slice(BUNDLE).unwrap();
  let payload = &bundle["Payload"];
  serde_json::json!({
    "body": body.map(serde_json::Value::String).unwrap_or_else(|| payload["body"].clone()),
    "integratedTime": integrated_time
      .map(serde_json::Value::from)
      .unwrap_or_else(|| payload["integratedTime"].clone()),
    "logID": payload["logID"],
    "logIndex": payload["logIndex"],
    "verification": { "signedEntryTimestamp": bundle["SignedEntryTimestamp"] },
  })
}

/// The fixture entry body with the recorded certificate swapped for `pem`.
pub fn body_recording_certificate(pem: &[u8]) -> String {
  let bundle: serde_json::Value = serde_json::from_slice(BUNDLE).unwrap();
  let raw = BASE64
    .decode(bundle["Payload"]["body"].as_str().unwrap())
    .unwrap();
  let mut body: serde_json::Value = serde_json::from_slice(&raw).unwrap();
  body["spec"]["signature"]["publicKey"]["content"] = BASE64.encode(pem).into();
  BASE64.encode(serde_json::to_vec(&body).unwrap())
}

/// A Rekor instance on a local port. The index search returns every uuid
/// in order; entries mapped to `None` answer 404.
pub struct FakeRekor {
  pub url: String,
  requests: Arc<Mutex<Vec<String>>>,
  task: tokio::task::JoinHandle<()>,
}

impl FakeRekor {
  pub async fn serve(entries: Vec<(&'static str, Option<serde_json::Value>)>) -> Self {
    use tokio::io::AsyncWriteExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();

    let task = tokio::spawn(async move {
      while let Ok((mut stream, _)) = listener.accept().await {
        let line = read_request_line(&mut stream).await;
        seen.lock().unwrap().push(line.clone());
        let (status, body) = route(&line, &entries);
        let response = format!(
          "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
          body.len()
        );
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
      }
    });
    Self {
      url,
      requests,
      task,
    }
  }

  /// Request lines received so far, e.g. `GET /api/v1/log/entries/abc`.
  pub fn requests(&self) -> Vec<String> {
    self.requests.lock().unwrap().clone()
  }
}

impl Drop for FakeRekor {
  fn drop(&mut self) {
    self.task.abort();
  }
}

fn route(line: &str, entries: &[(&'static str, Option<serde_json::Value>)]) -> (&'static str, String) {
  if line == "POST /api/v1/index/retrieve" {
    let uuids: Vec<&str> = entries.iter().map(|(uuid, _)| *uuid).collect();
    return ("200 OK", serde_json::to_string(&uuids).unwrap());
  }
  let found = line
    .strip_prefix("GET /api/v1/log/entries/")
    .and_then(|uuid| entries.iter().find(|(u, _)| *u == uuid))
    .and_then(|(uuid, entry)| entry.as_ref().map(|e| (uuid, e)));
  match found {
    Some((uuid, entry)) => {
      let mut response = serde_json::Map::new();
      response.insert(uuid.to_string(), entry.clone());
      ("200 OK", serde_json::Value::Object(response).to_string())
    }
    None => ("404 Not Found", r#"{"code":404,"message":"not found"}"#.to_string()),
  }
}

/// Read one HTTP request and return its method and path.
async fn read_request_line(stream: &mut tokio::net::TcpStream) -> String {
  use tokio::io::AsyncReadExt;

  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];
  loop {
    let n = stream.read(&mut chunk).await.unwrap_or(0);
    if n == 0 {
      break;
    }
    buf.extend_from_slice(&chunk[..n]);
    let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
      continue;
    };
    let head = String::from_utf8_lossy(&buf[..end]).to_string();
    let body_len = head
      .lines()
      .filter_map(|l| l.split_once(':'))
      .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
      .and_then(|(_, v)| v.trim().parse::<usize>().ok())
      .unwrap_or(0);
    if buf.len() >= end + 4 + body_len {
      break;
    }
  }
  let text = String::from_utf8_lossy(&buf);
  let mut parts = text.lines().next().unwrap_or_default().split_whitespace();
  format!(
    "{} {}",
    parts.next().unwrap_or_default(),
    parts.next().unwrap_or_default()
  )
}
