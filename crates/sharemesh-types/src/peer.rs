//! Peer addresses exchanged by gossip.

use crate::error::SharemeshError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address of a sharemesh server: `(hostname, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Hostname or IP address.
    pub hostname: String,
    /// TCP port.
    pub port: u16,
}

impl PeerAddress {
    /// Create a new peer address.
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Parse one `serverList` entry, returning `None` for malformed entries.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let hostname = value.get("hostname")?.as_str()?.trim();
        let port = value.get("port")?.as_u64()?;
        if hostname.is_empty() {
            return None;
        }
        let port = u16::try_from(port).ok()?;
        Some(Self::new(hostname, port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = SharemeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| SharemeshError::InvalidPeer(format!("expected host:port, got '{s}'")))?;
        if host.is_empty() {
            return Err(SharemeshError::InvalidPeer(format!("missing host in '{s}'")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| SharemeshError::InvalidPeer(format!("invalid port in '{s}'")))?;
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_display() {
        let peer: PeerAddress = "example.org:3781".parse().unwrap();
        assert_eq!(peer, PeerAddress::new("example.org", 3781));
        assert_eq!(peer.to_string(), "example.org:3781");
        assert!("example.org".parse::<PeerAddress>().is_err());
        assert!(":3000".parse::<PeerAddress>().is_err());
        assert!("host:70000".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn test_from_value_skips_malformed_entries() {
        assert_eq!(
            PeerAddress::from_value(&json!({"hostname": "a", "port": 3000})),
            Some(PeerAddress::new("a", 3000))
        );
        assert!(PeerAddress::from_value(&json!({"hostname": "a"})).is_none());
        assert!(PeerAddress::from_value(&json!({"hostname": "a", "port": "3000"})).is_none());
        assert!(PeerAddress::from_value(&json!({"hostname": "a", "port": 99999})).is_none());
        assert!(PeerAddress::from_value(&json!({"hostname": 1, "port": 3000})).is_none());
        assert!(PeerAddress::from_value(&json!("a:3000")).is_none());
    }

    #[test]
    fn test_serialization_matches_server_list_shape() {
        let json = serde_json::to_value(PeerAddress::new("h", 1)).unwrap();
        assert_eq!(json, json!({"hostname": "h", "port": 1}));
    }
}
