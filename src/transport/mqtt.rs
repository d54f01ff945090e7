//! MQTT broker addressing and TLS setup for the filter bridge.

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::MqttOptions;
use rumqttc::Transport;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::config::MqttSettings;

/// PEM material for broker TLS. Without a CA the webpki roots are trusted.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    pub ca: Option<Vec<u8>>,
    /// Client certificate and key for mutual TLS.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    pub fn load(
        ca_path: Option<&Path>,
        client_cert_path: Option<&Path>,
        client_key_path: Option<&Path>,
    ) -> Result<Self> {
        let ca = ca_path
            .map(|path| read_pem(path, "CA certificate"))
            .transpose()?;

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert), Some(key)) => Some((
                read_pem(cert, "client certificate")?,
                read_pem(key, "client key")?,
            )),
            (None, None) => None,
            (Some(_), None) => {
                return Err(anyhow!("MQTT TLS client certificate provided without key"))
            }
            (None, Some(_)) => {
                return Err(anyhow!("MQTT TLS client key provided without certificate"))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn from_settings(settings: &MqttSettings) -> Result<Self> {
        Self::load(
            settings.tls_ca_path.as_deref(),
            settings.tls_client_cert.as_deref(),
            settings.tls_client_key.as_deref(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path)
        .with_context(|| format!("failed to read MQTT TLS {} '{}'", what, path.display()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl MqttEndpoint {
    /// Parses `host:port`, `[v6]:port`, or a `mqtt://`, `tcp://`, `mqtts://`,
    /// `ssl://` URL. `force_tls` turns TLS on for scheme-less addresses.
    pub fn parse(addr: &str, force_tls: bool) -> Result<Self> {
        let mut use_tls = force_tls;
        let mut remainder = addr.trim();

        if let Some((scheme, rest)) = remainder.split_once("://") {
            match scheme.to_ascii_lowercase().as_str() {
                "mqtt" | "tcp" => {}
                "mqtts" | "ssl" => use_tls = true,
                other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
            }
            remainder = rest.trim_end_matches('/');
        }

        let (host, port) = split_host_port(remainder)?;
        if host.is_empty() {
            return Err(anyhow!("missing MQTT host in {}", addr));
        }
        Ok(Self {
            host,
            port,
            use_tls,
        })
    }

    pub fn is_loopback(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.host
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    /// Rejects non-loopback brokers unless remote access was opted into.
    pub fn check_allowed(&self, allow_remote: bool) -> Result<()> {
        if self.is_loopback() {
            return Ok(());
        }
        if allow_remote {
            log::warn!("remote MQTT broker {} enabled; ensure it is on a trusted network", self);
            return Ok(());
        }
        Err(anyhow!(
            "MQTT broker must be loopback: {} (use --allow-remote-mqtt to override)",
            self
        ))
    }

    pub fn build_transport(&self, materials: &TlsMaterials) -> Result<Transport> {
        if !self.use_tls {
            if materials.is_configured() {
                return Err(anyhow!(
                    "MQTT TLS material provided but TLS is disabled; use an mqtts:// broker"
                ));
            }
            return Ok(Transport::tcp());
        }
        if !materials.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }
        let ca = materials.ca.clone().ok_or_else(|| {
            anyhow!("MQTT TLS CA certificate is required when providing a client certificate")
        })?;
        Ok(Transport::tls(ca, materials.client_auth.clone(), None))
    }

    pub fn options(
        &self,
        client_id: &str,
        credentials: Option<(&str, &str)>,
        materials: &TlsMaterials,
    ) -> Result<MqttOptions> {
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some((user, password)) = credentials {
            options.set_credentials(user, password);
        }
        options.set_transport(self.build_transport(materials)?);
        Ok(options)
    }
}

impl fmt::Display for MqttEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_tls { "mqtts" } else { "mqtt" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = match addr.strip_prefix('[') {
        Some(rest) => {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
            let port = rest
                .strip_prefix(':')
                .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
            (host, port)
        }
        None => addr
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?,
    };
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;
    Ok((host.to_string(), port))
}
