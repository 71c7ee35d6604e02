//! Record/replay bundles (`rezi-repro-v1`).
//!
//! A repro bundle is a deterministic JSON document capturing the terminal
//! capabilities, timing model, and polled input batches of a session.
//! Validation is strict: unknown fields are rejected, the schema version is
//! gated separately from malformed JSON, batch steps must equal their array
//! position, and totals must match the batch metrics. Serialization sorts
//! object keys, so equal bundles produce byte-identical output.

use serde::{Deserialize, Serialize};

/// The schema string accepted and emitted.
pub const SCHEMA_V1: &str = "rezi-repro-v1";

/// Repro bundle errors.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReproError {
    /// The input is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(String),

    /// The JSON is valid but the bundle shape is not.
    #[error("invalid bundle: {0}")]
    Bundle(String),

    /// The schema field is missing or unrecognized.
    #[error("invalid schema: {0}")]
    Schema(String),

    /// The schema is a rezi repro schema of an unsupported version.
    #[error("unsupported repro schema version {found} at $.schema")]
    UnsupportedVersion {
        /// The version that was found.
        found: u64,
    },

    /// A field not in the schema was present.
    #[error("unknown field: {0}")]
    UnknownField(String),
}

/// Capture session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CaptureConfig {
    /// How the capture was initiated (`manual`, `env`).
    pub mode: String,
    /// Viewport columns at capture start.
    pub viewport_cols: u32,
    /// Viewport rows at capture start.
    pub viewport_rows: u32,
}

/// Snapshot of terminal capabilities at capture time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TerminalCapsSnapshot {
    /// Color support level, `0..=3`.
    pub color_mode: u8,
    /// Mouse reporting.
    pub supports_mouse: bool,
    /// Bracketed paste.
    pub supports_bracketed_paste: bool,
    /// Focus reporting.
    pub supports_focus_events: bool,
    /// Bitmask of supported SGR attributes.
    pub sgr_attrs_supported: u32,
}

/// Snapshot of the backend identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BackendCapsSnapshot {
    /// Backend implementation name.
    pub name: String,
    /// Backend version string.
    pub version: String,
}

/// Terminal and backend capability snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CapsSnapshot {
    /// Terminal capabilities.
    pub terminal_caps: TerminalCapsSnapshot,
    /// Backend identity.
    pub backend_caps: BackendCapsSnapshot,
}

/// The deterministic timing model used by replay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimingModel {
    /// Always `deterministic`.
    pub kind: String,
    /// Always `monotonic-ms`.
    pub clock: String,
    /// Always `recorded-delta`.
    pub replay_strategy: String,
    /// Monotonic base timestamp in milliseconds.
    pub base_time_ms: u64,
}

/// Capture bounds in force during recording.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CaptureBounds {
    /// Maximum batch count.
    pub max_batches: u64,
    /// Maximum event count.
    pub max_events: u64,
    /// Maximum byte count.
    pub max_bytes: u64,
}

/// Captured totals; must equal the sums over batches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CaptureTotals {
    /// Batches captured.
    pub captured_batches: u64,
    /// Events captured.
    pub captured_events: u64,
    /// Bytes captured.
    pub captured_bytes: u64,
}

/// Why capture stopped early.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Truncation {
    /// One of `max-batches`, `max-events`, `max-bytes`.
    pub reason: String,
    /// Step index of the first omitted batch.
    pub first_omitted_step: u64,
}

/// One polled input batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventBatchRecord {
    /// Batch index; must equal the array position.
    pub step: u64,
    /// Milliseconds since the previous batch.
    pub delta_ms: u64,
    /// Events decoded from this batch.
    pub event_count: u64,
    /// Raw byte length.
    pub byte_length: u64,
    /// Lowercase hex of the raw bytes, length `byte_length * 2`.
    pub bytes_hex: String,
}

/// The captured event stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventCapture {
    /// Always `poll-order`.
    pub ordering: String,
    /// Always `step-delta-ms`.
    pub timing: String,
    /// Bounds in force.
    pub bounds: CaptureBounds,
    /// Captured totals.
    pub totals: CaptureTotals,
    /// Truncation record when capture stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
    /// Batches in step order.
    pub batches: Vec<EventBatchRecord>,
}

/// A complete repro bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReproBundle {
    /// Schema identifier, always [`SCHEMA_V1`].
    pub schema: String,
    /// Capture configuration.
    pub capture_config: CaptureConfig,
    /// Capability snapshots.
    pub caps_snapshot: CapsSnapshot,
    /// Timing model.
    pub timing_model: TimingModel,
    /// Captured events.
    pub event_capture: EventCapture,
}

const TRUNCATION_REASONS: &[&str] = &["max-batches", "max-events", "max-bytes"];

/// Validate bundle semantics beyond what the types enforce.
pub fn validate_repro_bundle(bundle: &ReproBundle) -> Result<(), ReproError> {
    if bundle.schema != SCHEMA_V1 {
        return Err(schema_error(&bundle.schema));
    }
    if bundle.timing_model.kind != "deterministic"
        || bundle.timing_model.clock != "monotonic-ms"
        || bundle.timing_model.replay_strategy != "recorded-delta"
    {
        return Err(ReproError::Bundle(
            "timingModel must be deterministic/monotonic-ms/recorded-delta".into(),
        ));
    }
    let capture = &bundle.event_capture;
    if capture.ordering != "poll-order" {
        return Err(ReproError::Bundle("eventCapture.ordering must be poll-order".into()));
    }
    if capture.timing != "step-delta-ms" {
        return Err(ReproError::Bundle(
            "eventCapture.timing must be step-delta-ms".into(),
        ));
    }

    let mut events = 0u64;
    let mut bytes = 0u64;
    for (i, batch) in capture.batches.iter().enumerate() {
        if batch.step != i as u64 {
            return Err(ReproError::Bundle(format!(
                "batch at position {i} declares step {}",
                batch.step
            )));
        }
        if batch.bytes_hex.len() as u64 != batch.byte_length * 2 {
            return Err(ReproError::Bundle(format!(
                "batch {i}: bytesHex length {} does not match byteLength {}",
                batch.bytes_hex.len(),
                batch.byte_length
            )));
        }
        if !batch
            .bytes_hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(ReproError::Bundle(format!(
                "batch {i}: bytesHex must be lowercase hex"
            )));
        }
        events += batch.event_count;
        bytes += batch.byte_length;
    }

    let totals = &capture.totals;
    if totals.captured_batches != capture.batches.len() as u64 {
        return Err(ReproError::Bundle(format!(
            "totals.capturedBatches {} does not match {} batches",
            totals.captured_batches,
            capture.batches.len()
        )));
    }
    if totals.captured_events != events {
        return Err(ReproError::Bundle(format!(
            "totals.capturedEvents {} does not match batch sum {events}",
            totals.captured_events
        )));
    }
    if totals.captured_bytes != bytes {
        return Err(ReproError::Bundle(format!(
            "totals.capturedBytes {} does not match batch sum {bytes}",
            totals.captured_bytes
        )));
    }

    if let Some(truncation) = &capture.truncation {
        if !TRUNCATION_REASONS.contains(&truncation.reason.as_str()) {
            return Err(ReproError::Bundle(format!(
                "truncation.reason {:?} is not one of {TRUNCATION_REASONS:?}",
                truncation.reason
            )));
        }
        if truncation.first_omitted_step < totals.captured_batches {
            return Err(ReproError::Bundle(format!(
                "truncation.firstOmittedStep {} precedes capturedBatches {}",
                truncation.first_omitted_step, totals.captured_batches
            )));
        }
    }
    Ok(())
}

/// Serialize a bundle to deterministic JSON bytes.
///
/// Object keys are lexicographically sorted and absent optional fields are
/// omitted, so equal bundles serialize byte-identically regardless of how
/// they were constructed.
pub fn serialize_repro_bundle(bundle: &ReproBundle) -> Result<Vec<u8>, ReproError> {
    validate_repro_bundle(bundle)?;
    // serde_json's default map preserves sorted key order.
    let value =
        serde_json::to_value(bundle).map_err(|e| ReproError::Bundle(e.to_string()))?;
    let text = serde_json::to_string(&value).map_err(|e| ReproError::Bundle(e.to_string()))?;
    Ok(text.into_bytes())
}

/// Parse and strictly validate a bundle from JSON bytes.
pub fn parse_repro_bundle(bytes: &[u8]) -> Result<ReproBundle, ReproError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ReproError::Json(e.to_string()))?;

    // The schema gate runs before shape validation so unsupported versions
    // are distinguishable from malformed bundles.
    let schema = value
        .get("schema")
        .and_then(|s| s.as_str())
        .ok_or_else(|| ReproError::Schema("$.schema is missing or not a string".into()))?;
    if schema != SCHEMA_V1 {
        return Err(schema_error(schema));
    }

    let bundle: ReproBundle = serde_json::from_value(value).map_err(|e| {
        let message = e.to_string();
        if message.contains("unknown field") {
            ReproError::UnknownField(message)
        } else {
            ReproError::Bundle(message)
        }
    })?;
    validate_repro_bundle(&bundle)?;
    Ok(bundle)
}

fn schema_error(schema: &str) -> ReproError {
    if let Some(version) = schema
        .strip_prefix("rezi-repro-v")
        .and_then(|v| v.parse::<u64>().ok())
    {
        return ReproError::UnsupportedVersion { found: version };
    }
    ReproError::Schema(format!("unrecognized schema {schema:?} at $.schema"))
}

/// Encode bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let hi = b >> 4;
        let lo = b & 0xf;
        let digit = |n: u8| char::from(if n < 10 { b'0' + n } else { b'a' + n - 10 });
        out.push(digit(hi));
        out.push(digit(lo));
    }
    out
}

/// Decode lowercase hex into bytes.
pub fn from_hex(hex: &str) -> Result<Vec<u8>, ReproError> {
    if hex.len() % 2 != 0 {
        return Err(ReproError::Bundle("hex string has odd length".into()));
    }
    let digit = |b: u8| -> Result<u8, ReproError> {
        match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'a'..=b'f' => Ok(b - b'a' + 10),
            _ => Err(ReproError::Bundle(format!("bad hex digit {:?}", char::from(b)))),
        }
    };
    let raw = hex.as_bytes();
    let mut out = Vec::with_capacity(raw.len() / 2);
    for pair in raw.chunks_exact(2) {
        out.push((digit(pair[0])? << 4) | digit(pair[1])?);
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_bundle() -> ReproBundle {
        ReproBundle {
            schema: SCHEMA_V1.to_owned(),
            capture_config: CaptureConfig {
                mode: "manual".into(),
                viewport_cols: 80,
                viewport_rows: 24,
            },
            caps_snapshot: CapsSnapshot {
                terminal_caps: TerminalCapsSnapshot {
                    color_mode: 3,
                    supports_mouse: true,
                    supports_bracketed_paste: true,
                    supports_focus_events: true,
                    sgr_attrs_supported: 0xff,
                },
                backend_caps: BackendCapsSnapshot {
                    name: "test".into(),
                    version: "0.1.0".into(),
                },
            },
            timing_model: TimingModel {
                kind: "deterministic".into(),
                clock: "monotonic-ms".into(),
                replay_strategy: "recorded-delta".into(),
                base_time_ms: 1000,
            },
            event_capture: EventCapture {
                ordering: "poll-order".into(),
                timing: "step-delta-ms".into(),
                bounds: CaptureBounds {
                    max_batches: 100,
                    max_events: 1000,
                    max_bytes: 65536,
                },
                totals: CaptureTotals {
                    captured_batches: 2,
                    captured_events: 3,
                    captured_bytes: 5,
                },
                truncation: None,
                batches: vec![
                    EventBatchRecord {
                        step: 0,
                        delta_ms: 0,
                        event_count: 1,
                        byte_length: 2,
                        bytes_hex: "6869".into(),
                    },
                    EventBatchRecord {
                        step: 1,
                        delta_ms: 16,
                        event_count: 2,
                        byte_length: 3,
                        bytes_hex: "1b5b41".into(),
                    },
                ],
            },
        }
    }

    #[test]
    fn round_trip() {
        let bundle = sample_bundle();
        let bytes = serialize_repro_bundle(&bundle).unwrap();
        let parsed = parse_repro_bundle(&bytes).unwrap();
        assert_eq!(parsed, bundle);
    }

    #[test]
    fn serialization_is_deterministic_under_key_order() {
        let bundle = sample_bundle();
        let canonical = serialize_repro_bundle(&bundle).unwrap();

        // The same document with top-level keys written in reverse order.
        let value: serde_json::Value = serde_json::from_slice(&canonical).unwrap();
        let object = value.as_object().unwrap();
        let mut reversed = String::from("{");
        for (i, (key, field)) in object.iter().rev().enumerate() {
            if i > 0 {
                reversed.push(',');
            }
            reversed.push_str(&serde_json::to_string(key).unwrap());
            reversed.push(':');
            reversed.push_str(&serde_json::to_string(field).unwrap());
        }
        reversed.push('}');

        let reparsed = parse_repro_bundle(reversed.as_bytes()).unwrap();
        let again = serialize_repro_bundle(&reparsed).unwrap();
        assert_eq!(canonical, again);
    }

    #[test]
    fn v2_schema_is_unsupported_version() {
        let mut bundle_json: serde_json::Value =
            serde_json::from_slice(&serialize_repro_bundle(&sample_bundle()).unwrap()).unwrap();
        bundle_json["schema"] = "rezi-repro-v2".into();
        let err = parse_repro_bundle(bundle_json.to_string().as_bytes()).unwrap_err();
        assert_eq!(err, ReproError::UnsupportedVersion { found: 2 });
    }

    #[test]
    fn foreign_schema_is_invalid_schema() {
        let err = parse_repro_bundle(br#"{"schema":"other-thing"}"#).unwrap_err();
        assert!(matches!(err, ReproError::Schema(_)));
    }

    #[test]
    fn malformed_json_is_distinct() {
        let err = parse_repro_bundle(b"{not json").unwrap_err();
        assert!(matches!(err, ReproError::Json(_)));
    }

    #[test]
    fn unknown_field_rejected() {
        let mut value: serde_json::Value =
            serde_json::from_slice(&serialize_repro_bundle(&sample_bundle()).unwrap()).unwrap();
        value["surprise"] = 1.into();
        let err = parse_repro_bundle(value.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ReproError::UnknownField(_)));
    }

    #[test]
    fn step_mismatch_rejected() {
        let mut bundle = sample_bundle();
        bundle.event_capture.batches[1].step = 5;
        assert!(matches!(
            serialize_repro_bundle(&bundle),
            Err(ReproError::Bundle(_))
        ));
    }

    #[test]
    fn totals_mismatch_rejected() {
        let mut bundle = sample_bundle();
        bundle.event_capture.totals.captured_bytes = 99;
        assert!(matches!(
            serialize_repro_bundle(&bundle),
            Err(ReproError::Bundle(_))
        ));
    }

    #[test]
    fn uppercase_hex_rejected() {
        let mut bundle = sample_bundle();
        bundle.event_capture.batches[0].bytes_hex = "68AB".into();
        assert!(matches!(
            serialize_repro_bundle(&bundle),
            Err(ReproError::Bundle(_))
        ));
    }

    #[test]
    fn hex_length_must_match_byte_length() {
        let mut bundle = sample_bundle();
        bundle.event_capture.batches[0].bytes_hex = "68".into();
        assert!(matches!(
            serialize_repro_bundle(&bundle),
            Err(ReproError::Bundle(_))
        ));
    }

    #[test]
    fn truncation_validation() {
        let mut bundle = sample_bundle();
        bundle.event_capture.truncation = Some(Truncation {
            reason: "max-bytes".into(),
            first_omitted_step: 2,
        });
        assert!(serialize_repro_bundle(&bundle).is_ok());

        bundle.event_capture.truncation = Some(Truncation {
            reason: "max-bytes".into(),
            first_omitted_step: 1,
        });
        assert!(serialize_repro_bundle(&bundle).is_err());

        bundle.event_capture.truncation = Some(Truncation {
            reason: "bored".into(),
            first_omitted_step: 2,
        });
        assert!(serialize_repro_bundle(&bundle).is_err());
    }

    #[test]
    fn hex_helpers_round_trip() {
        let bytes = [0x00u8, 0x1b, 0xff, 0x42];
        let hex = to_hex(&bytes);
        assert_eq!(hex, "001bff42");
        assert_eq!(from_hex(&hex).unwrap(), bytes);
        assert!(from_hex("0G").is_err());
    }

    #[test]
    fn keys_are_sorted_in_output() {
        let bytes = serialize_repro_bundle(&sample_bundle()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let caps = text.find("\"capsSnapshot\"").unwrap();
        let capture = text.find("\"captureConfig\"").unwrap();
        let event = text.find("\"eventCapture\"").unwrap();
        let schema = text.find("\"schema\"").unwrap();
        let timing = text.find("\"timingModel\"").unwrap();
        assert!(caps < capture && capture < event && event < schema && schema < timing);
    }
}
