//! Transport security gate for motion sensors.
//!
//! Motion data is only collected when it travels over an encrypted link or
//! stays on the local machine. The check runs before any sensor is opened.

use crate::error::{AirBridgeError, Result};
use crate::sync::Endpoint;

/// Whether the configured transport may carry motion data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityContext {
    Secure,
    Insecure { endpoint: String },
}

impl SecurityContext {
    /// Classifies an endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use air_bridge::input::SecurityContext;
    /// use air_bridge::sync::Endpoint;
    ///
    /// let ctx = SecurityContext::from_endpoint(&Endpoint::parse("mqtt://broker.lan")?);
    /// assert!(!ctx.is_secure());
    /// # Ok::<(), air_bridge::error::AirBridgeError>(())
    /// ```
    #[must_use]
    pub fn from_endpoint(endpoint: &Endpoint) -> Self {
        if endpoint.is_secure() {
            Self::Secure
        } else {
            Self::Insecure {
                endpoint: endpoint.to_string(),
            }
        }
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Secure)
    }

    /// Fails with `InsecureContext` unless secure.
    ///
    /// # Errors
    ///
    /// Returns `InsecureContext` naming the endpoint.
    pub fn require_secure(&self) -> Result<()> {
        match self {
            Self::Secure => Ok(()),
            Self::Insecure { endpoint } => Err(AirBridgeError::InsecureContext(endpoint.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_and_loopback_are_secure() {
        for url in ["mqtts://broker.example.com", "mqtt://localhost:1883", "memory://local"] {
            let ctx = SecurityContext::from_endpoint(&Endpoint::parse(url).unwrap());
            assert!(ctx.require_secure().is_ok(), "{} should be secure", url);
        }
    }

    #[test]
    fn test_plain_remote_is_insecure() {
        let ctx = SecurityContext::from_endpoint(&Endpoint::parse("mqtt://10.1.2.3").unwrap());
        match ctx.require_secure() {
            Err(AirBridgeError::InsecureContext(endpoint)) => {
                assert_eq!(endpoint, "mqtt://10.1.2.3:1883")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
