fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use pendant_protocol::{
        ApiResponse, ErrorCode, FirmwareBeginRequest, SettingsData, TargetId, UploadAck,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  device: {fixture}\n  Rust:   {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_firmware_begin_request() {
        let req = roundtrip_test::<FirmwareBeginRequest>("firmware_begin_request.json");
        assert_eq!(req.target, TargetId::Controller);
        assert_eq!(req.size, 10_000);
    }

    #[test]
    fn fixture_empty_ack() {
        let resp = roundtrip_test::<ApiResponse>("ack_empty.json");
        assert_eq!(resp.into_result().unwrap(), None);
    }

    #[test]
    fn fixture_upload_ack() {
        let resp = roundtrip_test::<ApiResponse<UploadAck>>("upload_ack.json");
        assert_eq!(
            resp.into_result().unwrap(),
            Some(UploadAck {
                offset: 4096,
                written: 4096
            })
        );
    }

    #[test]
    fn fixture_negative_acks() {
        for (name, code) in [
            ("nack_invalid_param.json", ErrorCode::InvalidParam),
            ("nack_flash_write.json", ErrorCode::FlashWrite),
        ] {
            let resp = roundtrip_test::<ApiResponse>(name);
            let err = resp.into_result().unwrap_err();
            assert_eq!(ErrorCode::from_code(err.code), Some(code), "{name}");
            assert!(!err.message.is_empty(), "{name}");
        }
    }

    #[test]
    fn fixture_settings_reply() {
        let resp = roundtrip_test::<ApiResponse<SettingsData>>("settings.json");
        let settings = resp.into_result().unwrap().unwrap();
        assert_eq!(settings.ver.firmware, "V1.0.3");
        assert_eq!(settings.ver.serial, "PD2024001");
        assert!(settings.system.is_some());
        assert!(settings.network.is_some());
    }

    #[test]
    fn all_fixtures_are_valid_json() {
        let entries = fs::read_dir(fixtures_dir()).expect("fixtures dir missing");
        let mut count = 0;
        for entry in entries {
            let path = entry.unwrap().path();
            if path.extension().is_some_and(|e| e == "json") {
                let data = fs::read_to_string(&path).unwrap();
                serde_json::from_str::<serde_json::Value>(&data)
                    .unwrap_or_else(|e| panic!("{}: {e}", path.display()));
                count += 1;
            }
        }
        assert!(count >= 6, "expected at least 6 fixtures, found {count}");
    }
}
