//! zone_filter_bridge - filter camera notifications by zone over MQTT.
//!
//! 1. Subscribes to the inbound notification topic
//! 2. Resolves the notifier's zones for the notification's camera
//! 3. Republishes the payload unchanged when an object is inside a zone
//! 4. Drops it otherwise (or routes it to the suppressed topic for audit)
//!
//! Anything that cannot be parsed or resolved is forwarded unfiltered.

use anyhow::{Context, Result};
use clap::Parser;
use rumqttc::v5::{mqttbytes::QoS, Client, Event, Incoming, MqttOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use notify_zone_filter::config::FilterConfig;
use notify_zone_filter::transport::{MqttEndpoint, Notification, TlsMaterials};
use notify_zone_filter::{InMemoryZoneStore, SqliteZoneStore, ZoneDocument, ZoneFilter, ZoneSource};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about = "Filter camera notifications by zone over MQTT")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "ZONE_FILTER_CONFIG")]
    config: Option<PathBuf>,

    /// Allow non-loopback MQTT brokers.
    #[arg(long, env = "ALLOW_REMOTE_MQTT")]
    allow_remote_mqtt: bool,

    #[arg(long, env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD")]
    mqtt_password: Option<String>,

    /// Enable TLS for scheme-less broker addresses.
    #[arg(long, env = "MQTT_USE_TLS")]
    mqtt_use_tls: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Forward,
    Suppress,
}

struct Bridge {
    filter: ZoneFilter<Box<dyn ZoneSource>>,
    output_topic: String,
    suppressed_topic: Option<String>,
}

impl Bridge {
    fn route(&self, payload: &[u8]) -> Route {
        let notification = match Notification::from_slice(payload) {
            Ok(notification) => notification,
            Err(e) => {
                log::warn!("forwarding unparseable notification: {:#}", e);
                return Route::Forward;
            }
        };
        let event = match notification.detection_event() {
            Ok(event) => event,
            Err(e) => {
                log::info!(
                    "notifier {}: forwarding '{}' unfiltered: {:#}",
                    notification.notifier_id,
                    notification.title,
                    e
                );
                return Route::Forward;
            }
        };

        let decision = self.filter.filter(&notification.notifier_id, &event);
        if let Some(first) = &decision.first_match {
            let debug = self
                .filter
                .source()
                .notifier_settings(&notification.notifier_id)
                .ok()
                .flatten()
                .map(|settings| settings.debug_zones)
                .unwrap_or(false);
            if debug {
                let object = &event.objects[first.object_index];
                log::info!(
                    "debug zones: '{}' {:?} matched zone '{}'",
                    object.class_label,
                    object.bounding_box,
                    first.zone
                );
            }
        }

        if decision.allow {
            Route::Forward
        } else {
            Route::Suppress
        }
    }

    fn handle(&self, client: &Client, payload: &[u8]) -> Result<()> {
        let topic = match self.route(payload) {
            Route::Forward => &self.output_topic,
            Route::Suppress => match &self.suppressed_topic {
                Some(topic) => topic,
                None => return Ok(()),
            },
        };
        client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload.to_vec())
            .with_context(|| format!("publish to {}", topic))?;
        Ok(())
    }
}

struct MqttRuntime {
    client: Client,
    inbound: Receiver<Vec<u8>>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttRuntime {
    fn start(options: MqttOptions, topic: &str) -> Result<Self> {
        let (client, mut connection) = Client::new(options, 10);
        client.subscribe(topic, QoS::AtLeastOnce)?;

        let (tx, inbound) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            for event in connection.iter() {
                match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        if tx.send(publish.payload.to_vec()).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::error!("MQTT connection error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client,
            inbound,
            connection_handle: Some(handle),
        })
    }

    fn disconnect(mut self) {
        if let Err(e) = self.client.disconnect() {
            log::debug!("MQTT disconnect: {}", e);
        }
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
    }
}

fn open_source(cfg: &FilterConfig) -> Result<Box<dyn ZoneSource>> {
    match &cfg.zones_file {
        Some(path) => {
            let doc = ZoneDocument::load(path)?;
            let store = InMemoryZoneStore::from_document(&doc)?;
            log::info!("  Zones: {} (static)", path.display());
            Ok(Box::new(store))
        }
        None => {
            let store = SqliteZoneStore::open(&cfg.db_path)?;
            log::info!("  Zones: {} (sqlite)", cfg.db_path);
            Ok(Box::new(store))
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = FilterConfig::load_from(args.config.as_deref())?;

    let endpoint = MqttEndpoint::parse(&cfg.mqtt.broker, args.mqtt_use_tls)?;
    endpoint.check_allowed(args.allow_remote_mqtt || cfg.mqtt.allow_remote)?;
    let tls = TlsMaterials::from_settings(&cfg.mqtt)?;
    let credentials = args
        .mqtt_username
        .as_deref()
        .map(|user| (user, args.mqtt_password.as_deref().unwrap_or_default()));

    log::info!("zone_filter_bridge starting");
    log::info!("  MQTT broker: {}", endpoint);
    log::info!("  Input topic: {}", cfg.mqtt.input_topic);
    log::info!("  Output topic: {}", cfg.mqtt.output_topic);
    if let Some(topic) = &cfg.mqtt.suppressed_topic {
        log::info!("  Suppressed topic: {}", topic);
    }
    log::info!("  Epsilon: {}", cfg.epsilon);

    let bridge = Bridge {
        filter: ZoneFilter::new(open_source(&cfg)?, cfg.tolerance()),
        output_topic: cfg.mqtt.output_topic.clone(),
        suppressed_topic: cfg.mqtt.suppressed_topic.clone(),
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("error setting Ctrl-C handler")?;
    }

    while running.load(Ordering::SeqCst) {
        let options = endpoint.options(&cfg.mqtt.client_id, credentials, &tls)?;
        let runtime = MqttRuntime::start(options, &cfg.mqtt.input_topic)?;
        log::info!(
            "Connected to MQTT broker (TLS: {}, auth: {}), subscribed to {}",
            endpoint.use_tls,
            credentials.is_some(),
            cfg.mqtt.input_topic
        );

        while running.load(Ordering::SeqCst) {
            match runtime.inbound.recv_timeout(POLL_INTERVAL) {
                Ok(payload) => {
                    if let Err(e) = bridge.handle(&runtime.client, &payload) {
                        log::warn!("Failed to process notification: {:#}", e);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        runtime.disconnect();

        if running.load(Ordering::SeqCst) {
            log::warn!("MQTT connection closed. Reconnecting...");
            std::thread::sleep(RECONNECT_DELAY);
        }
    }

    log::info!("shutdown signal received, bridge stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_zone_filter::{NotifierSettings, Tolerance, ZoneConfigStore, ZoneOwner, ZoneSpec};
    use serde_json::json;

    fn bridge_with_driveway_zone() -> Bridge {
        let mut store = InMemoryZoneStore::new();
        let preset = store.create_preset("Driveway").unwrap();
        store
            .put_zone(
                &ZoneOwner::Preset(preset.clone()),
                "cam1",
                ZoneSpec::new("drive", vec![[0.0, 0.5], [1.0, 0.5], [1.0, 1.0], [0.0, 1.0]]),
            )
            .unwrap();
        store
            .put_notifier_settings(
                "phone",
                &NotifierSettings {
                    selected_preset: Some(preset),
                    ..NotifierSettings::default()
                },
            )
            .unwrap();
        Bridge {
            filter: ZoneFilter::new(Box::new(store), Tolerance::EXACT),
            output_topic: "out".to_string(),
            suppressed_topic: None,
        }
    }

    fn payload(notifier: &str, y_px: u32) -> Vec<u8> {
        json!({
            "notifier_id": notifier,
            "title": "Person",
            "options": {"recordedEvent": {"id": "cam1", "data": {
                "inputDimensions": [100, 100],
                "detections": [{"className": "person", "boundingBox": [10, y_px, 10, 10]}]
            }}}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn forwards_objects_inside_zone() {
        let bridge = bridge_with_driveway_zone();
        assert_eq!(bridge.route(&payload("phone", 70)), Route::Forward);
        assert_eq!(bridge.route(&payload("phone", 10)), Route::Suppress);
    }

    #[test]
    fn unknown_notifier_and_garbage_fail_open() {
        let bridge = bridge_with_driveway_zone();
        assert_eq!(bridge.route(&payload("tablet", 10)), Route::Forward);
        assert_eq!(bridge.route(b"{not json"), Route::Forward);
        assert_eq!(
            bridge.route(br#"{"notifier_id": "phone", "title": "x"}"#),
            Route::Forward
        );
    }

    fn payload_with(detections: serde_json::Value) -> Vec<u8> {
        json!({
            "notifier_id": "phone",
            "options": {"recordedEvent": {"id": "cam1", "data": {
                "inputDimensions": [100, 100],
                "detections": detections
            }}}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn boxless_detections_are_forwarded_unfiltered() {
        let bridge = bridge_with_driveway_zone();
        assert_eq!(
            bridge.route(&payload_with(json!([{"className": "motion"}]))),
            Route::Forward
        );
    }

    #[test]
    fn unlabelled_box_is_still_tested_against_zones() {
        let bridge = bridge_with_driveway_zone();
        assert_eq!(
            bridge.route(&payload_with(json!([{"boundingBox": [10, 70, 10, 10]}]))),
            Route::Forward
        );
        assert_eq!(
            bridge.route(&payload_with(json!([{"boundingBox": [10, 10, 10, 10]}]))),
            Route::Suppress
        );
    }
}
