//! Transport endpoint URLs.
//!
//! | Scheme             | Default port | TLS |
//! |--------------------|--------------|-----|
//! | `mqtt://`          | 1883         | no  |
//! | `mqtts://`, `ssl://` | 8883       | yes |
//! | `memory://`        | n/a          | n/a |

use std::fmt;

use crate::error::{AirBridgeError, Result};

const MQTT_PORT: u16 = 1883;
const MQTTS_PORT: u16 = 8883;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Mqtt,
    Mqtts,
    Memory,
}

/// Parsed transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parses an endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` for unknown schemes, a missing host or
    /// an unparsable port.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::sync::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("mqtts://broker.example.com")?;
    /// assert_eq!(endpoint.port(), 8883);
    /// assert!(endpoint.is_tls());
    /// # Ok::<(), air_bridge::error::AirBridgeError>(())
    /// ```
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            AirBridgeError::TransportUnavailable(format!("invalid endpoint '{}': {}", url, reason))
        };

        let (scheme, rest) = url.trim().split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "mqtt" | "tcp" => Scheme::Mqtt,
            "mqtts" | "ssl" => Scheme::Mqtts,
            "memory" => Scheme::Memory,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };

        let authority = rest.split('/').next().unwrap_or_default();

        if scheme == Scheme::Memory {
            let host = if authority.is_empty() { "local" } else { authority };
            return Ok(Self {
                scheme,
                host: host.to_string(),
                port: 0,
            });
        }

        let default_port = if scheme == Scheme::Mqtts { MQTTS_PORT } else { MQTT_PORT };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // IPv6 literal
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            let port = match after.strip_prefix(':') {
                Some(port) => port.parse().map_err(|_| invalid("bad port"))?,
                None => default_port,
            };
            (host.to_string(), port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (
                    host.to_string(),
                    port.parse().map_err(|_| invalid("bad port"))?,
                ),
                None => (authority.to_string(), default_port),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self { scheme, host, port })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns true if the link is encrypted.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Mqtts
    }

    /// Returns true if the endpoint never leaves the local machine.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        match self.scheme {
            Scheme::Memory => true,
            _ => {
                let host = self.host.to_ascii_lowercase();
                host == "localhost" || host == "::1" || host.starts_with("127.")
            }
        }
    }

    /// Returns true if motion data may travel over this endpoint.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.is_tls() || self.is_loopback()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::Memory => write!(f, "memory://{}", self.host),
            Scheme::Mqtt => write!(f, "mqtt://{}:{}", self.host, self.port),
            Scheme::Mqtts => write!(f, "mqtts://{}:{}", self.host, self.port),
        }
    }
}
