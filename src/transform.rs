//! Flattens a validated `ScanDocument` into zero or more `Measurement`s
//! (spec §4.7).

use sha2::{Digest, Sha256};

use crate::config::Settings;
use crate::internal_events::{InternalEvent, ValidationReject};
use crate::measurement::{ConnectionStatus, Measurement};
use crate::oui::{OuiDecision, OuiPolicy};
use crate::scan::{ScanDocument, ScanResult, ScanResultGroup, WifiConnectedEvent};
use crate::validate::{
    normalize_and_validate_bssid, validate_accuracy, validate_coords, validate_rssi,
    validate_timestamp, RejectReason,
};

/// Context shared by every `Measurement` produced from one input object
/// (I8: all rows from one object share one `processing_batch_id`).
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub processing_batch_id: String,
    pub ingestion_timestamp: i64,
}

/// Produces every measurement derivable from `doc`, skipping individual
/// observations that fail validation or are excluded by OUI policy, without
/// aborting the rest of the document.
pub fn transform(
    doc: &ScanDocument,
    ctx: &BatchContext,
    settings: &Settings,
    now_ms: i64,
    object_key: &str,
) -> Vec<Measurement> {
    let device_id = doc.device_id.as_deref().map(hash_device_id);
    let oui_policy = OuiPolicy::new(&settings.oui);

    let mut out = Vec::new();

    for event in &doc.wifi_connected_events {
        match build_connected(event, doc, ctx, settings, now_ms, device_id.as_deref(), &oui_policy) {
            Ok(Some(measurement)) => out.push(measurement),
            Ok(None) => {}
            Err(reason) => ValidationReject::new(object_key, reason).emit(),
        }
    }

    for group in &doc.scan_results {
        for result in &group.results {
            match build_scan(
                result,
                group,
                doc,
                ctx,
                settings,
                now_ms,
                device_id.as_deref(),
                &oui_policy,
            ) {
                Ok(Some(measurement)) => out.push(measurement),
                Ok(None) => {}
                Err(reason) => ValidationReject::new(object_key, reason).emit(),
            }
        }
    }

    out
}

fn hash_device_id(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SSID is trimmed; a SSID made up only of the NUL character becomes `None`.
fn normalize_ssid(ssid: Option<&str>) -> Option<String> {
    let ssid = ssid?.trim();
    if ssid.is_empty() || ssid.chars().all(|c| c == '\0') {
        return None;
    }
    Some(ssid.to_string())
}

#[allow(clippy::too_many_arguments)]
fn build_connected(
    event: &WifiConnectedEvent,
    doc: &ScanDocument,
    ctx: &BatchContext,
    settings: &Settings,
    now_ms: i64,
    device_id: Option<&str>,
    oui_policy: &OuiPolicy<'_>,
) -> Result<Option<Measurement>, RejectReason> {
    let info = event.wifi_connected_info.as_ref();
    let bssid = normalize_and_validate_bssid(info.and_then(|i| i.bssid.as_deref()))?;

    if oui_policy.decide(&bssid) == OuiDecision::Excluded {
        return Ok(None);
    }

    let location = event.location.as_ref();
    let (lat, lon) = validate_coords(
        location.and_then(|l| l.latitude),
        location.and_then(|l| l.longitude),
    )?;
    validate_accuracy(location.and_then(|l| l.accuracy), settings)?;

    let rssi = validate_rssi(info.and_then(|i| i.rssi), settings)?;

    let timestamp = event
        .timestamp
        .or_else(|| location.and_then(|l| l.time))
        .ok_or(RejectReason::TimestampOutOfRange)?;
    validate_timestamp(timestamp, now_ms, settings)?;

    let link_speed = info.and_then(|i| i.link_speed);
    let quality_weight = connected_quality_weight(rssi, link_speed, settings);
    let quality_score = quality_weight / settings.connected_weight;

    Ok(Some(Measurement {
        bssid,
        measurement_timestamp: timestamp,
        event_id: event.event_id.clone(),
        latitude: lat,
        longitude: lon,
        rssi,
        connection_status: ConnectionStatus::Connected,
        quality_weight,
        ingestion_timestamp: ctx.ingestion_timestamp,
        processing_batch_id: ctx.processing_batch_id.clone(),
        device_id: device_id.map(str::to_string),
        device_model: doc.model.clone(),
        device_manufacturer: doc.manufacturer.clone(),
        os_version: doc.os_version.clone(),
        app_version: doc.app_version.clone(),
        altitude: location.and_then(|l| l.altitude),
        location_accuracy: location.and_then(|l| l.accuracy),
        location_timestamp: location.and_then(|l| l.time),
        location_provider: location.and_then(|l| l.provider.clone()),
        location_source: location.and_then(|l| l.source.clone()),
        speed: location.and_then(|l| l.speed),
        bearing: location.and_then(|l| l.bearing),
        ssid: normalize_ssid(info.and_then(|i| i.ssid.as_deref())),
        frequency: info.and_then(|i| i.frequency),
        scan_timestamp: None,
        link_speed,
        channel_width: info.and_then(|i| i.channel_width),
        center_freq0: info.and_then(|i| i.center_freq0),
        center_freq1: info.and_then(|i| i.center_freq1),
        capabilities: info.and_then(|i| i.capabilities.clone()),
        is80211mc_responder: info.and_then(|i| i.is80211mc_responder),
        is_passpoint_network: info.and_then(|i| i.is_passpoint_network),
        operator_friendly_name: info.and_then(|i| i.operator_friendly_name.clone()),
        venue_name: info.and_then(|i| i.venue_name.clone()),
        is_captive: info.and_then(|i| i.is_captive),
        num_scan_results: info.and_then(|i| i.num_scan_results),
        data_version: doc.data_version.clone(),
        quality_score: Some(quality_score),
        outlier_score: None,
        is_global_outlier: None,
    }))
}

#[allow(clippy::too_many_arguments)]
fn build_scan(
    result: &ScanResult,
    group: &ScanResultGroup,
    doc: &ScanDocument,
    ctx: &BatchContext,
    settings: &Settings,
    now_ms: i64,
    device_id: Option<&str>,
    oui_policy: &OuiPolicy<'_>,
) -> Result<Option<Measurement>, RejectReason> {
    let bssid = normalize_and_validate_bssid(result.bssid.as_deref())?;

    if oui_policy.decide(&bssid) == OuiDecision::Excluded {
        return Ok(None);
    }

    let location = group.location.as_ref();
    let (lat, lon) = validate_coords(
        location.and_then(|l| l.latitude),
        location.and_then(|l| l.longitude),
    )?;
    validate_accuracy(location.and_then(|l| l.accuracy), settings)?;

    let rssi = validate_rssi(result.rssi, settings)?;

    let timestamp = result
        .scantime
        .or(group.timestamp)
        .ok_or(RejectReason::TimestampOutOfRange)?;
    validate_timestamp(timestamp, now_ms, settings)?;

    let quality_weight = settings.scan_weight;
    let quality_score = quality_weight / settings.scan_weight;

    Ok(Some(Measurement {
        bssid,
        measurement_timestamp: timestamp,
        event_id: None,
        latitude: lat,
        longitude: lon,
        rssi,
        connection_status: ConnectionStatus::Scan,
        quality_weight,
        ingestion_timestamp: ctx.ingestion_timestamp,
        processing_batch_id: ctx.processing_batch_id.clone(),
        device_id: device_id.map(str::to_string),
        device_model: doc.model.clone(),
        device_manufacturer: doc.manufacturer.clone(),
        os_version: doc.os_version.clone(),
        app_version: doc.app_version.clone(),
        altitude: location.and_then(|l| l.altitude),
        location_accuracy: location.and_then(|l| l.accuracy),
        location_timestamp: location.and_then(|l| l.time),
        location_provider: location.and_then(|l| l.provider.clone()),
        location_source: location.and_then(|l| l.source.clone()),
        speed: location.and_then(|l| l.speed),
        bearing: location.and_then(|l| l.bearing),
        ssid: normalize_ssid(result.ssid.as_deref()),
        frequency: result.frequency,
        scan_timestamp: Some(timestamp),
        link_speed: None,
        channel_width: None,
        center_freq0: None,
        center_freq1: None,
        capabilities: None,
        is80211mc_responder: None,
        is_passpoint_network: None,
        operator_friendly_name: None,
        venue_name: None,
        is_captive: None,
        num_scan_results: None,
        data_version: doc.data_version.clone(),
        quality_score: Some(quality_score),
        outlier_score: None,
        is_global_outlier: None,
    }))
}

/// I6: CONNECTED observations weigh 2.0, down-ranked to 1.5 when RSSI is
/// strong but link speed is unexpectedly low.
fn connected_quality_weight(rssi: i32, link_speed: Option<i32>, settings: &Settings) -> f64 {
    let strong_rssi = rssi >= settings.low_link_speed_rssi_threshold;
    let low_link_speed = link_speed
        .map(|speed| speed < settings.low_link_speed_mbps_threshold)
        .unwrap_or(false);
    if strong_rssi && low_link_speed {
        settings.low_link_speed_weight
    } else {
        settings.connected_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{Location, ScanResultGroup as Group, WifiConnectedInfo};

    fn settings() -> Settings {
        let mut s = Settings::default();
        s.queue_url = "q".into();
        s.stream_name = "s".into();
        s
    }

    fn ctx() -> BatchContext {
        BatchContext {
            processing_batch_id: "batch-1".into(),
            ingestion_timestamp: 1_690_000_000_500,
        }
    }

    fn doc_with_connected(bssid: &str, rssi: i32, link_speed: i32) -> ScanDocument {
        ScanDocument {
            device_id: Some("dev-1".into()),
            wifi_connected_events: vec![WifiConnectedEvent {
                timestamp: Some(1_690_000_000_000),
                event_id: Some("e1".into()),
                wifi_connected_info: Some(WifiConnectedInfo {
                    bssid: Some(bssid.into()),
                    rssi: Some(rssi),
                    link_speed: Some(link_speed),
                    ..Default::default()
                }),
                location: Some(Location {
                    latitude: Some(37.0),
                    longitude: Some(-122.0),
                    accuracy: Some(10.0),
                    ..Default::default()
                }),
            }],
            ..Default::default()
        }
    }

    fn doc_with_scans(entries: &[(&str, i32)]) -> ScanDocument {
        ScanDocument {
            scan_results: vec![Group {
                timestamp: Some(1_690_000_000_000),
                location: Some(Location {
                    latitude: Some(37.0),
                    longitude: Some(-122.0),
                    ..Default::default()
                }),
                results: entries
                    .iter()
                    .map(|(bssid, rssi)| ScanResult {
                        bssid: Some((*bssid).into()),
                        rssi: Some(*rssi),
                        ..Default::default()
                    })
                    .collect(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn happy_path_scenario_1() {
        let s = settings();
        let now = 1_700_000_000_000;
        let mut doc = doc_with_connected("AA:BB:CC:DD:EE:01", -60, 300);
        doc.scan_results = doc_with_scans(&[("aa:bb:cc:dd:ee:02", -70), ("aa:bb:cc:dd:ee:03", -80)])
            .scan_results;

        let out = transform(&doc, &ctx(), &s, now, "feedA/file.txt.gz");
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].connection_status, ConnectionStatus::Connected);
        assert_eq!(out[0].quality_weight, 2.0);
        assert_eq!(out[1].connection_status, ConnectionStatus::Scan);
        assert_eq!(out[1].quality_weight, 1.0);
        assert_eq!(out[2].quality_weight, 1.0);
        assert!(out.iter().all(|m| m.processing_batch_id == "batch-1"));
    }

    #[test]
    fn low_link_speed_downranks_scenario_2() {
        let s = settings();
        let now = 1_700_000_000_000;
        let doc = doc_with_connected("AA:BB:CC:DD:EE:01", -55, 10);
        let out = transform(&doc, &ctx(), &s, now, "feedA/file.txt.gz");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].quality_weight, 1.5);
    }

    #[test]
    fn validation_rejection_scenario_3() {
        let s = settings();
        let now = 1_700_000_000_000;
        let doc = doc_with_scans(&[("aa:bb:cc:dd:ee:02", 5), ("aa:bb:cc:dd:ee:03", -65)]);
        let out = transform(&doc, &ctx(), &s, now, "feedA/file.txt.gz");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bssid, "aa:bb:cc:dd:ee:03");
    }

    #[test]
    fn connected_fields_null_on_scan_rows() {
        let s = settings();
        let now = 1_700_000_000_000;
        let doc = doc_with_scans(&[("aa:bb:cc:dd:ee:02", -70)]);
        let out = transform(&doc, &ctx(), &s, now, "feedA/file.txt.gz");
        assert_eq!(out.len(), 1);
        assert!(out[0].link_speed.is_none());
        assert!(out[0].channel_width.is_none());
        assert!(out[0].operator_friendly_name.is_none());
    }

    #[test]
    fn device_id_is_hashed_not_raw() {
        let s = settings();
        let now = 1_700_000_000_000;
        let doc = doc_with_connected("AA:BB:CC:DD:EE:01", -60, 300);
        let out = transform(&doc, &ctx(), &s, now, "feedA/file.txt.gz");
        let hashed = out[0].device_id.as_deref().unwrap();
        assert_ne!(hashed, "dev-1");
        assert_eq!(hashed.len(), 64);
    }

    #[test]
    fn oui_exclude_drops_matching_bssid() {
        let mut s = settings();
        s.oui.enabled = true;
        s.oui.action = crate::config::OuiAction::Exclude;
        s.oui.prefixes = vec!["aa:bb:cc".into()];
        let now = 1_700_000_000_000;
        let doc = doc_with_connected("AA:BB:CC:DD:EE:01", -60, 300);
        let out = transform(&doc, &ctx(), &s, now, "feedA/file.txt.gz");
        assert!(out.is_empty());
    }
}
