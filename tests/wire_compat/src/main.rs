fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use serde_json::Value;

    use healthnet_protocol::constants::{
        EVENT_ALERT, EVENT_CONNECTION, EVENT_ERROR, EVENT_METRICS, EVENT_SUBSCRIBE,
        EVENT_UNSUBSCRIBE, RECONNECT_EXHAUSTED_MESSAGE,
    };
    use healthnet_protocol::{
        Alert, ConnectionStatus, Envelope, ErrorEvent, LinkStatus, MetricsSnapshot, Severity,
        StreamRequest,
    };

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture as the raw frame text the backend would send.
    fn load_frame(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_envelope(name: &str) -> Envelope {
        Envelope::from_frame(&load_frame(name))
            .unwrap_or_else(|e| panic!("fixture {name} is not an envelope: {e}"))
    }

    /// Integer-valued floats compare equal to integers (`20` vs `20.0`).
    fn normalize(v: &Value) -> Value {
        match v {
            Value::Number(n) => n.as_f64().map_or_else(|| v.clone(), |f| serde_json::json!(f)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize(v)))
                    .collect(),
            ),
            Value::Array(arr) => Value::Array(arr.iter().map(normalize).collect()),
            _ => v.clone(),
        }
    }

    /// Typed decode then re-encode must reproduce the fixture payload.
    fn assert_payload_stable<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let envelope = load_envelope(name);
        let typed: T = envelope
            .parse_payload()
            .unwrap_or_else(|e| panic!("fixture {name} payload: {e}"));
        let encoded = serde_json::to_value(&typed).unwrap();
        assert_eq!(
            normalize(&encoded),
            normalize(&envelope.payload),
            "payload drift in {name}"
        );
    }

    #[test]
    fn metrics_frame() {
        let envelope = load_envelope("metrics.json");
        assert_eq!(envelope.event_type, EVENT_METRICS);

        let snapshot: MetricsSnapshot = envelope.parse_payload().unwrap();
        assert_eq!(snapshot.bandwidth, Some(75.5));
        assert_eq!(snapshot.latency, Some(20.0));
        assert_eq!(snapshot.active_users, Some(12.0));
        assert_eq!(snapshot.value("packetLoss"), Some(0.2));

        assert_payload_stable::<MetricsSnapshot>("metrics.json");
    }

    #[test]
    fn alert_frame() {
        let envelope = load_envelope("alert.json");
        assert_eq!(envelope.event_type, EVENT_ALERT);

        let alert: Alert = envelope.parse_payload().unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.facility_id.as_deref(), Some("kisumu-01"));

        assert_payload_stable::<Alert>("alert.json");
    }

    #[test]
    fn connection_frames() {
        let connected = load_envelope("connection_connected.json");
        assert_eq!(connected.event_type, EVENT_CONNECTION);
        assert_eq!(
            connected.parse_payload::<ConnectionStatus>().unwrap(),
            ConnectionStatus::connected()
        );

        let failed: ConnectionStatus = load_envelope("connection_error.json")
            .parse_payload()
            .unwrap();
        assert_eq!(failed.status, LinkStatus::Error);
        assert!(failed.error.is_some());

        assert_payload_stable::<ConnectionStatus>("connection_error.json");
    }

    #[test]
    fn exhaustion_error_frame() {
        let envelope = load_envelope("reconnect_exhausted.json");
        assert_eq!(envelope.event_type, EVENT_ERROR);

        let event: ErrorEvent = envelope.parse_payload().unwrap();
        assert_eq!(event.error, RECONNECT_EXHAUSTED_MESSAGE);
    }

    #[test]
    fn outbound_hints_match_fixtures() {
        let subscribe = Envelope::new(EVENT_SUBSCRIBE, &StreamRequest::default()).unwrap();
        assert_eq!(subscribe, load_envelope("subscribe.json"));

        let unsubscribe =
            Envelope::new(EVENT_UNSUBSCRIBE, &StreamRequest::unsubscribe_all()).unwrap();
        assert_eq!(unsubscribe, load_envelope("unsubscribe.json"));
    }

    #[test]
    fn outbound_frame_text_parses_as_fixture() {
        let frame = Envelope::new(EVENT_SUBSCRIBE, &StreamRequest::subscribe_all(2000))
            .unwrap()
            .to_frame()
            .unwrap();
        let ours: Value = serde_json::from_str(&frame).unwrap();
        let theirs: Value = serde_json::from_str(&load_frame("subscribe.json")).unwrap();
        assert_eq!(ours, theirs);
    }
}
