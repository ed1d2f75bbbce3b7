//! `ScanDocument` data model and parser (spec §3, §4.5).

mod parser;

pub use parser::{parse, ParseError};

use serde::Deserialize;

/// One parsed JSON document from one decoded line. Exists only within the
/// processing frame of the line it came from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanDocument {
    pub device_id: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub data_version: Option<String>,
    pub wifi_connected_events: Vec<WifiConnectedEvent>,
    pub scan_results: Vec<ScanResultGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WifiConnectedEvent {
    pub timestamp: Option<i64>,
    pub event_id: Option<String>,
    pub wifi_connected_info: Option<WifiConnectedInfo>,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WifiConnectedInfo {
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub rssi: Option<i32>,
    pub frequency: Option<i32>,
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
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanResultGroup {
    pub timestamp: Option<i64>,
    pub location: Option<Location>,
    pub results: Vec<ScanResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScanResult {
    pub bssid: Option<String>,
    pub ssid: Option<String>,
    pub rssi: Option<i32>,
    pub frequency: Option<i32>,
    pub scantime: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub time: Option<i64>,
    pub provider: Option<String>,
    pub source: Option<String>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
}
