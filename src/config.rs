use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::geometry::Tolerance;

const DEFAULT_DB_PATH: &str = "zone_filter.db";
const DEFAULT_MQTT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_CLIENT_ID: &str = "zone-filter-bridge";
const DEFAULT_INPUT_TOPIC: &str = "zone_filter/notifications/in";
const DEFAULT_OUTPUT_TOPIC: &str = "zone_filter/notifications/out";
const MAX_EPSILON: f64 = 0.1;

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    db_path: Option<String>,
    zones_file: Option<PathBuf>,
    epsilon: Option<f64>,
    mqtt: Option<MqttConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    client_id: Option<String>,
    input_topic: Option<String>,
    output_topic: Option<String>,
    suppressed_topic: Option<String>,
    allow_remote: Option<bool>,
    tls_ca_path: Option<PathBuf>,
    tls_client_cert: Option<PathBuf>,
    tls_client_key: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// SQLite zone database. Ignored when `zones_file` is set.
    pub db_path: String,
    /// Static zone document loaded into memory instead of the database.
    pub zones_file: Option<PathBuf>,
    pub epsilon: f64,
    pub mqtt: MqttSettings,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub client_id: String,
    pub input_topic: String,
    pub output_topic: String,
    pub suppressed_topic: Option<String>,
    pub allow_remote: bool,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_client_cert: Option<PathBuf>,
    pub tls_client_key: Option<PathBuf>,
}

impl FilterConfig {
    /// Loads the file named by `ZONE_FILTER_CONFIG` (if any), then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = non_empty_env("ZONE_FILTER_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => FilterConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn tolerance(&self) -> Tolerance {
        Tolerance::new(self.epsilon)
    }

    fn from_file(file: FilterConfigFile) -> Self {
        let mqtt = file.mqtt.unwrap_or_default();
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            zones_file: file.zones_file,
            epsilon: file.epsilon.unwrap_or(0.0),
            mqtt: MqttSettings {
                broker: mqtt
                    .broker
                    .unwrap_or_else(|| DEFAULT_MQTT_BROKER.to_string()),
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                input_topic: mqtt
                    .input_topic
                    .unwrap_or_else(|| DEFAULT_INPUT_TOPIC.to_string()),
                output_topic: mqtt
                    .output_topic
                    .unwrap_or_else(|| DEFAULT_OUTPUT_TOPIC.to_string()),
                suppressed_topic: mqtt.suppressed_topic,
                allow_remote: mqtt.allow_remote.unwrap_or(false),
                tls_ca_path: mqtt.tls_ca_path,
                tls_client_cert: mqtt.tls_client_cert,
                tls_client_key: mqtt.tls_client_key,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("ZONE_FILTER_DB_PATH") {
            self.db_path = path;
        }
        if let Some(path) = non_empty_env("ZONE_FILTER_ZONES_FILE") {
            self.zones_file = Some(PathBuf::from(path));
        }
        if let Some(epsilon) = non_empty_env("ZONE_FILTER_EPSILON") {
            self.epsilon = epsilon
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONE_FILTER_EPSILON must be a decimal number"))?;
        }
        if let Some(broker) = non_empty_env("ZONE_FILTER_MQTT_BROKER") {
            self.mqtt.broker = broker;
        }
        if let Some(topic) = non_empty_env("ZONE_FILTER_INPUT_TOPIC") {
            self.mqtt.input_topic = topic;
        }
        if let Some(topic) = non_empty_env("ZONE_FILTER_OUTPUT_TOPIC") {
            self.mqtt.output_topic = topic;
        }
        if let Some(topic) = non_empty_env("ZONE_FILTER_SUPPRESSED_TOPIC") {
            self.mqtt.suppressed_topic = Some(topic);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !self.epsilon.is_finite() || !(0.0..=MAX_EPSILON).contains(&self.epsilon) {
            return Err(anyhow!(
                "epsilon must be between 0 and {} (got {})",
                MAX_EPSILON,
                self.epsilon
            ));
        }
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }

        self.mqtt.input_topic = self.mqtt.input_topic.trim().to_string();
        self.mqtt.output_topic = self.mqtt.output_topic.trim().to_string();
        if self.mqtt.input_topic.is_empty() || self.mqtt.output_topic.is_empty() {
            return Err(anyhow!("MQTT input and output topics must not be empty"));
        }
        if self.mqtt.input_topic == self.mqtt.output_topic {
            return Err(anyhow!(
                "MQTT output topic must differ from the input topic ({})",
                self.mqtt.input_topic
            ));
        }
        if let Some(topic) = self.mqtt.suppressed_topic.take() {
            let topic = topic.trim().to_string();
            if !topic.is_empty() {
                if topic == self.mqtt.input_topic || topic == self.mqtt.output_topic {
                    return Err(anyhow!(
                        "MQTT suppressed topic must differ from the input and output topics"
                    ));
                }
                self.mqtt.suppressed_topic = Some(topic);
            }
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(anyhow!("MQTT client id must not be empty"));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<FilterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
