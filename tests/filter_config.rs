use std::io::Write;
use std::sync::Mutex;

use notify_zone_filter::config::FilterConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ZONE_FILTER_CONFIG",
        "ZONE_FILTER_DB_PATH",
        "ZONE_FILTER_ZONES_FILE",
        "ZONE_FILTER_EPSILON",
        "ZONE_FILTER_MQTT_BROKER",
        "ZONE_FILTER_INPUT_TOPIC",
        "ZONE_FILTER_OUTPUT_TOPIC",
        "ZONE_FILTER_SUPPRESSED_TOPIC",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FilterConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "zone_filter.db");
    assert!(cfg.zones_file.is_none());
    assert_eq!(cfg.epsilon, 0.0);
    assert_eq!(cfg.mqtt.broker, "127.0.0.1:1883");
    assert_eq!(cfg.mqtt.input_topic, "zone_filter/notifications/in");
    assert_eq!(cfg.mqtt.output_topic, "zone_filter/notifications/out");
    assert!(cfg.mqtt.suppressed_topic.is_none());
    assert!(!cfg.mqtt.allow_remote);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().expect("temp config");
    file.write_all(
        br#"{
            "db_path": "/var/lib/zone_filter/zones.db",
            "epsilon": 0.01,
            "mqtt": {
                "broker": "mqtts://broker.lan:8883",
                "client_id": "filter-1",
                "input_topic": "scrypted/notify",
                "output_topic": "scrypted/notify/filtered",
                "allow_remote": true
            }
        }"#,
    )
    .expect("write config");

    std::env::set_var("ZONE_FILTER_CONFIG", file.path());
    std::env::set_var("ZONE_FILTER_EPSILON", "0.02");
    std::env::set_var("ZONE_FILTER_SUPPRESSED_TOPIC", "scrypted/notify/suppressed");

    let cfg = FilterConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "/var/lib/zone_filter/zones.db");
    assert_eq!(cfg.epsilon, 0.02);
    assert_eq!(cfg.tolerance().epsilon, 0.02);
    assert_eq!(cfg.mqtt.broker, "mqtts://broker.lan:8883");
    assert_eq!(cfg.mqtt.client_id, "filter-1");
    assert_eq!(cfg.mqtt.input_topic, "scrypted/notify");
    assert_eq!(cfg.mqtt.output_topic, "scrypted/notify/filtered");
    assert_eq!(
        cfg.mqtt.suppressed_topic.as_deref(),
        Some("scrypted/notify/suppressed")
    );
    assert!(cfg.mqtt.allow_remote);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().expect("temp config");
    file.write_all(
        br#"
zones_file = "/etc/zone_filter/zones.toml"

[mqtt]
input_topic = "in"
output_topic = "out"
"#,
    )
    .expect("write config");

    let cfg = FilterConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(
        cfg.zones_file.as_deref(),
        Some(std::path::Path::new("/etc/zone_filter/zones.toml"))
    );
    assert_eq!(cfg.mqtt.input_topic, "in");
    assert_eq!(cfg.mqtt.output_topic, "out");
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ZONE_FILTER_EPSILON", "0.5");
    assert!(FilterConfig::load().is_err());
    std::env::set_var("ZONE_FILTER_EPSILON", "NaN");
    assert!(FilterConfig::load().is_err());
    std::env::set_var("ZONE_FILTER_EPSILON", "wide");
    assert!(FilterConfig::load().is_err());
    std::env::remove_var("ZONE_FILTER_EPSILON");

    std::env::set_var("ZONE_FILTER_INPUT_TOPIC", "same");
    std::env::set_var("ZONE_FILTER_OUTPUT_TOPIC", "same");
    let err = FilterConfig::load().unwrap_err();
    assert!(err.to_string().contains("must differ"));

    std::env::set_var("ZONE_FILTER_OUTPUT_TOPIC", "other");
    std::env::set_var("ZONE_FILTER_SUPPRESSED_TOPIC", "same");
    assert!(FilterConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ZONE_FILTER_CONFIG", "/nonexistent/zone_filter.json");
    let err = FilterConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
