//! The shipped configuration must load and every sensor in it must parse.

use sensorium::config::{AppConfig, parse_sensors};

#[test]
fn test_shipped_config_loads() {
    let config = AppConfig::load_with_sensor_path("configs/config.yaml")
        .expect("Failed to load configs/config.yaml");

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.telemetry.shutdown_timeout.as_secs(), 5);
    assert_eq!(config.sensors.len(), 3);

    let sensors = parse_sensors(config.sensors, false).expect("Shipped sensors should parse");
    let names: Vec<String> = sensors.iter().map(|s| s.fq_name()).collect();
    assert_eq!(
        names,
        [
            "host_load1",
            "host_disk_root_used_ratio",
            "host_disk_root_used_ratio_observed",
        ]
    );
    assert!(sensors.iter().all(|s| s.is_ready()));
}
