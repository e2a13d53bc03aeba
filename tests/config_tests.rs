// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use genmai_capture::Config;
use genmai_capture::backends::camera::{Resolution, SensorRotation};
use std::io::Write;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.display_resolution, Resolution::new(1200, 600));
    assert_eq!(config.rotation, SensorRotation::Rotate180);
    assert!(config.validate().is_ok(), "Defaults must be runnable");
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{
            "output_dir": "/srv/genmai",
            "sample_kinds": ["つや姫"],
            "initial_metadata": {{ "position": "kita" }}
        }}"#
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.output_dir.to_str(), Some("/srv/genmai"));
    assert_eq!(config.sample_kinds, vec!["つや姫"]);
    assert_eq!(config.initial_metadata.position, "kita");
    assert_eq!(config.initial_metadata.position_counter, "01");
    assert_eq!(config.camera_device, Config::default().camera_device);
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load(Some(&dir.path().join("absent.json"))).is_err());
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{ not json").unwrap();
    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
fn test_button_map_follows_configured_codes() {
    let config = Config::from_json(r#"{ "button_codes": { "30": "A" } }"#).unwrap();
    let map = config.button_map();

    assert_eq!(map.len(), 1);
    assert_eq!(map.name(30), Some("A"));
    assert_eq!(map.name(0x290), None);
}
