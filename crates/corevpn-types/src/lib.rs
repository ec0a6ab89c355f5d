use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub mod netbox;

// --- Inventory records ---

/// A device as the inventory stores it, before interfaces and the public
/// address are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: u64,
    pub name: String,
    pub asn: Option<u32>,
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: u64,
    pub device: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Interface {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Index `N` of a tunnel interface named `wg<N>`.
    ///
    /// Names whose remainder after `wg` is not a plain integer (`wg`,
    /// `wg1a`, `wgmgmt`) are not tunnel interfaces and yield `None`.
    pub fn tunnel_index(&self) -> Option<u32> {
        let rest = self.name.strip_prefix("wg")?;
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        rest.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefix {
    pub id: u64,
    pub cidr: IpNet,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A single address. `address` keeps the mask of its parent prefix
/// (`10.1.0.1/30`), the way the inventory stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: u64,
    pub address: IpNet,
    #[serde(default)]
    pub description: String,
    pub interface_id: Option<u64>,
}

impl Address {
    pub fn ip(&self) -> IpAddr {
        self.address.addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str) -> Interface {
        Interface {
            id: 1,
            device: "edge-a".into(),
            name: name.into(),
            description: String::new(),
            tags: vec![],
        }
    }

    #[test]
    fn tunnel_index_parses_plain_suffix() {
        assert_eq!(iface("wg0").tunnel_index(), Some(0));
        assert_eq!(iface("wg17").tunnel_index(), Some(17));
    }

    #[test]
    fn tunnel_index_ignores_non_numeric_suffixes() {
        assert_eq!(iface("wg").tunnel_index(), None);
        assert_eq!(iface("wg1a").tunnel_index(), None);
        assert_eq!(iface("wgmgmt").tunnel_index(), None);
        assert_eq!(iface("wg-1").tunnel_index(), None);
        assert_eq!(iface("wg+1").tunnel_index(), None);
        assert_eq!(iface("eth0").tunnel_index(), None);
    }

    #[test]
    fn tunnel_index_ignores_overflowing_suffix() {
        assert_eq!(iface("wg99999999999").tunnel_index(), None);
    }

    #[test]
    fn address_ip_drops_mask() {
        let addr = Address {
            id: 3,
            address: "10.1.0.2/30".parse().unwrap(),
            description: "edge-b".into(),
            interface_id: None,
        };
        assert_eq!(addr.ip().to_string(), "10.1.0.2");
    }

    #[test]
    fn interface_json_defaults() {
        let json = r#"{"id":4,"device":"edge-a","name":"eth0"}"#;
        let parsed: Interface = serde_json::from_str(json).unwrap();
        assert!(parsed.description.is_empty());
        assert!(parsed.tags.is_empty());
        assert!(!parsed.has_tag("Public interface"));
    }
}
