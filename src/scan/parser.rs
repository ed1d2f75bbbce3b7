//! Parses decoded text as one `ScanDocument` (spec §4.5). Tolerates unknown
//! fields since every `ScanDocument` field is optional and serde ignores
//! unrecognized keys by default.

use snafu::{ResultExt, Snafu};

use super::ScanDocument;

#[derive(Debug, Snafu)]
#[snafu(display("failed to parse scan document: {source}"))]
pub struct ParseError {
    source: serde_json::Error,
}

pub fn parse(text: &str) -> Result<ScanDocument, ParseError> {
    serde_json::from_str(text).context(ParseSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let doc = parse(r#"{"deviceId":"abc"}"#).unwrap();
        assert_eq!(doc.device_id.as_deref(), Some("abc"));
        assert!(doc.wifi_connected_events.is_empty());
        assert!(doc.scan_results.is_empty());
    }

    #[test]
    fn tolerates_unknown_fields() {
        let doc = parse(r#"{"deviceId":"abc","somethingNew":{"nested":true},"extra":[1,2,3]}"#)
            .unwrap();
        assert_eq!(doc.device_id.as_deref(), Some("abc"));
    }

    #[test]
    fn parses_full_document() {
        let text = r#"{
            "deviceId": "dev-1",
            "model": "Pixel",
            "wifiConnectedEvents": [
                {
                    "timestamp": 1690000000000,
                    "eventId": "e1",
                    "wifiConnectedInfo": {
                        "ssid": "home",
                        "bssid": "AA:BB:CC:DD:EE:01",
                        "rssi": -60,
                        "linkSpeed": 300
                    },
                    "location": {"latitude": 37.0, "longitude": -122.0, "accuracy": 10.0}
                }
            ],
            "scanResults": [
                {
                    "timestamp": 1690000001000,
                    "location": {"latitude": 37.1, "longitude": -122.1},
                    "results": [
                        {"bssid": "aa:bb:cc:dd:ee:02", "rssi": -70}
                    ]
                }
            ]
        }"#;
        let doc = parse(text).unwrap();
        assert_eq!(doc.wifi_connected_events.len(), 1);
        assert_eq!(doc.scan_results.len(), 1);
        assert_eq!(doc.scan_results[0].results.len(), 1);
        let info = doc.wifi_connected_events[0]
            .wifi_connected_info
            .as_ref()
            .unwrap();
        assert_eq!(info.bssid.as_deref(), Some("AA:BB:CC:DD:EE:01"));
        assert_eq!(info.link_speed, Some(300));
    }

    #[test]
    fn rejects_malformed_json() {
        let result = parse("{not json");
        assert!(result.is_err());
    }
}
