//! The normalized, flattened record delivered downstream (spec §3, §4.8).

use serde::Serialize;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    Connected,
    Scan,
}

/// One row of the downstream measurement schema. Required fields are plain;
/// everything else is optional and connected-only fields are `None` on
/// `Scan` rows (I1-I8 enforced by `Validator`/`Transformer`, not here).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Measurement {
    pub bssid: String,
    pub measurement_timestamp: i64,
    pub event_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub rssi: i32,
    pub connection_status: ConnectionStatus,
    pub quality_weight: f64,
    pub ingestion_timestamp: i64,
    pub processing_batch_id: String,

    // Device
    pub device_id: Option<String>,
    pub device_model: Option<String>,
    pub device_manufacturer: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,

    // Location
    pub altitude: Option<f64>,
    pub location_accuracy: Option<f64>,
    pub location_timestamp: Option<i64>,
    pub location_provider: Option<String>,
    pub location_source: Option<String>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,

    // Wifi
    pub ssid: Option<String>,
    pub frequency: Option<i32>,
    pub scan_timestamp: Option<i64>,

    // Connected-only
    pub link_speed: Option<i32>,
    pub channel_width: Option<i32>,
    pub center_freq0: Option<i32>,
    pub center_freq1: Option<i32>,
    pub capabilities: Option<String>,
    pub is80211mc_responder: Option<bool>,
    pub is_passpoint_network: Option<bool>,
    pub operator_friendly_name: Option<String>,
    pub venue_name: Option<String>,
    pub is_captive: Option<bool>,
    pub num_scan_results: Option<i32>,

    // Processing
    pub data_version: Option<String>,
    pub quality_score: Option<f64>,

    // Global-outlier columns: always null, as specified.
    pub outlier_score: Option<f64>,
    pub is_global_outlier: Option<bool>,
}

#[derive(Debug, Snafu)]
#[snafu(display("serialized record ({size} bytes) exceeds max_record_bytes ({max})"))]
pub struct RecordTooLarge {
    pub size: usize,
    pub max: usize,
}

#[derive(Debug, Snafu)]
pub enum SerializeError {
    #[snafu(display("failed to encode measurement as JSON: {source}"))]
    Encode { source: serde_json::Error },
    #[snafu(transparent)]
    TooLarge { source: RecordTooLarge },
}

/// Encodes one `Measurement` as a single newline-terminated JSON line,
/// rejecting anything that would exceed `max_record_bytes`.
pub fn encode(measurement: &Measurement, max_record_bytes: usize) -> Result<Vec<u8>, SerializeError> {
    let mut bytes = serde_json::to_vec(measurement).context(EncodeSnafu)?;
    bytes.push(b'\n');
    if bytes.len() > max_record_bytes {
        return Err(RecordTooLarge {
            size: bytes.len(),
            max: max_record_bytes,
        }
        .into());
    }
    Ok(bytes)
}
