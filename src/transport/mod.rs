//! Transport for the MQTT filter bridge: notification payload parsing and
//! broker connection setup.

mod mqtt;
mod notification;

pub use mqtt::{MqttEndpoint, TlsMaterials};
pub use notification::Notification;
