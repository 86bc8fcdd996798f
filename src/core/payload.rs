
use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version tag of the only payload format currently understood.
pub const JS1_TAG: &str = "JS1:";
/// Written upstream when the job ran too briefly to collect anything useful.
pub const JS1_SHORT: &str = "JS1:Short";
/// Written upstream when no statistics were collected at all.
pub const JS1_NONE: &str = "JS1:None";

#[derive(Error, Debug)]
pub enum PayloadError {
  #[error("Base64 decoding failed: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("Gzip stream error: {0}")]
  Gzip(#[from] std::io::Error),
  #[error("Payload is not valid UTF-8: {0}")]
  Utf8(#[from] std::string::FromUtf8Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Job-level statistics carried by a JS1 payload. Every key is optional.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct DecodedStats {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_time: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gpus: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nodes: Option<BTreeMap<String, NodeStats>>,
}

/// Per-node statistics. GPU maps are keyed by GPU index as reported upstream;
/// a GPU may report `null` for a metric it could not sample.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone)]
pub struct NodeStats {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cpus: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_memory: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub used_memory: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_time: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gpu_utilization: Option<BTreeMap<String, Option<f64>>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gpu_used_memory: Option<BTreeMap<String, Option<f64>>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gpu_total_memory: Option<BTreeMap<String, Option<f64>>>,
}

/// Decodes a JS1 payload.
///
/// Returns `None` for empty input, for the `Short`/`None` sentinels, for any
/// other version tag, and for payloads that fail to decode. Decode failures
/// are logged as warnings and never propagated, so callers can still store
/// the raw payload.
pub fn decode_js1_payload(raw: &str) -> Option<DecodedStats> {
  if raw.is_empty() || raw == JS1_SHORT || raw == JS1_NONE {
    return None;
  }
  let body = raw.strip_prefix(JS1_TAG)?;

  match decode_body(body) {
    Ok(stats) => Some(stats),
    Err(e) => {
      warn!("Failed to decode JS1 payload: {}", e);
      None
    }
  }
}

fn decode_body(body: &str) -> Result<DecodedStats, PayloadError> {
  // Payloads may arrive line-wrapped.
  let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
  let compressed = STANDARD.decode(&body)?;
  let mut decompressed = Vec::new();
  GzDecoder::new(compressed.as_slice()).read_to_end(&mut decompressed)?;
  let json = String::from_utf8(decompressed)?;
  Ok(serde_json::from_str(&json)?)
}

/// Builds the JS1 payload for `stats`: tag followed by base64(gzip(json)).
pub fn encode_js1_payload(stats: &DecodedStats) -> Result<String, PayloadError> {
  let json = serde_json::to_vec(stats)?;
  let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
  encoder.write_all(&json)?;
  let compressed = encoder.finish()?;
  Ok(format!("{}{}", JS1_TAG, STANDARD.encode(compressed)))
}
