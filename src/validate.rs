//! Sanity checks applied at document and observation granularity (spec §4.6).

use regex::Regex;
use std::sync::LazyLock;

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingCoords,
    CoordsOutOfRange,
    RssiOutOfRange,
    AccuracyTooHigh,
    MissingBssid,
    MalformedBssid,
    TimestampOutOfRange,
    BroadcastBssid,
    ZeroBssid,
}

static BSSID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[0-9a-f]{2}(:[0-9a-f]{2}){5}$").expect("static regex is valid")
});

const BROADCAST_BSSID: &str = "ff:ff:ff:ff:ff:ff";
const ZERO_BSSID: &str = "00:00:00:00:00:00";

/// Normalizes a BSSID to lowercase `xx:xx:xx:xx:xx:xx` and validates its
/// shape (I4), returning the normalized form on success.
pub fn normalize_and_validate_bssid(raw: Option<&str>) -> Result<String, RejectReason> {
    let raw = raw.ok_or(RejectReason::MissingBssid)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RejectReason::MissingBssid);
    }
    if !BSSID_RE.is_match(trimmed) {
        return Err(RejectReason::MalformedBssid);
    }
    let lower = trimmed.to_lowercase();
    if lower == ZERO_BSSID {
        return Err(RejectReason::ZeroBssid);
    }
    if lower == BROADCAST_BSSID {
        return Err(RejectReason::BroadcastBssid);
    }
    Ok(lower)
}

/// I1: coordinate range check, applied to a (possibly missing) lat/lon pair.
pub fn validate_coords(latitude: Option<f64>, longitude: Option<f64>) -> Result<(f64, f64), RejectReason> {
    let (lat, lon) = match (latitude, longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return Err(RejectReason::MissingCoords),
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(RejectReason::CoordsOutOfRange);
    }
    Ok((lat, lon))
}

/// I2: RSSI range check.
pub fn validate_rssi(rssi: Option<i32>, settings: &Settings) -> Result<i32, RejectReason> {
    let rssi = rssi.ok_or(RejectReason::RssiOutOfRange)?;
    if rssi < settings.rssi_min || rssi > settings.rssi_max {
        return Err(RejectReason::RssiOutOfRange);
    }
    Ok(rssi)
}

/// I3: accuracy bound check. `None` accuracy is permitted (the field itself
/// is optional); only a present, too-large accuracy is rejected.
pub fn validate_accuracy(accuracy: Option<f64>, settings: &Settings) -> Result<(), RejectReason> {
    match accuracy {
        Some(acc) if acc > settings.max_accuracy_meters => Err(RejectReason::AccuracyTooHigh),
        _ => Ok(()),
    }
}

/// I5: timestamp must not be unreasonably far in the future (beyond skew
/// tolerance) nor unreasonably far in the past.
pub fn validate_timestamp(
    timestamp_ms: i64,
    now_ms: i64,
    settings: &Settings,
) -> Result<(), RejectReason> {
    let future_bound = now_ms + settings.max_future_skew_secs * 1_000;
    let past_bound = now_ms - settings.max_past_days * 24 * 60 * 60 * 1_000;
    if timestamp_ms > future_bound || timestamp_ms < past_bound {
        return Err(RejectReason::TimestampOutOfRange);
    }
    Ok(())
}
