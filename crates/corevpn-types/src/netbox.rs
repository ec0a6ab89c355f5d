//! NetBox REST wire shapes and their conversion into inventory records.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{Address, Interface, Prefix};

/// Custom field holding a VM's WireGuard public key.
pub const PUBLIC_KEY_FIELD: &str = "wg-public-key";

const VM_INTERFACE_TYPE: &str = "virtualization.vminterface";

// --- Envelopes ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

// --- Nested references ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedTag {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

impl NestedTag {
    /// NetBox filters on slugs but people write tag names; accept either.
    pub fn matches(&self, tag: &str) -> bool {
        self.name == tag || self.slug == tag
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedAsn {
    pub id: u64,
    pub asn: u32,
}

// --- Records ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: u64,
    pub name: String,
    pub site: Option<NestedRef>,
    #[serde(default)]
    pub tags: Vec<NestedTag>,
    #[serde(default)]
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

impl VirtualMachine {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.matches(tag))
    }

    pub fn public_key(&self) -> Option<String> {
        self.custom_fields
            .get(PUBLIC_KEY_FIELD)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub asn: Option<u32>,
    #[serde(default)]
    pub asns: Vec<NestedAsn>,
}

impl Site {
    /// Legacy single `asn` field first, then the first of the `asns` list.
    pub fn asn(&self) -> Option<u32> {
        self.asn.or_else(|| self.asns.first().map(|a| a.asn))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInterface {
    pub id: u64,
    pub name: String,
    pub virtual_machine: NestedRef,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<NestedTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixRecord {
    pub id: u64,
    pub prefix: IpNet,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<NestedTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddressRecord {
    pub id: u64,
    pub address: IpNet,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_object_type: Option<String>,
    #[serde(default)]
    pub assigned_object_id: Option<u64>,
}

// --- Request bodies ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSelector {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInterfaceRequest {
    pub name: String,
    pub virtual_machine: VmSelector,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrefixRequest {
    pub prefix_length: u8,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAddressRequest {
    pub description: String,
}

// --- Conversions ---

/// Names and slugs both, so a tag configured either way matches.
fn tag_names(tags: Vec<NestedTag>) -> Vec<String> {
    let mut names = Vec::with_capacity(tags.len() * 2);
    for tag in tags {
        if tag.slug != tag.name {
            names.push(tag.slug);
        }
        names.push(tag.name);
    }
    names
}

impl From<VmInterface> for Interface {
    fn from(r: VmInterface) -> Self {
        Interface {
            id: r.id,
            device: r.virtual_machine.name,
            name: r.name,
            description: r.description.unwrap_or_default(),
            tags: tag_names(r.tags),
        }
    }
}

impl From<PrefixRecord> for Prefix {
    fn from(r: PrefixRecord) -> Self {
        Prefix {
            id: r.id,
            cidr: r.prefix,
            description: r.description.unwrap_or_default(),
            tags: tag_names(r.tags),
        }
    }
}

impl From<IpAddressRecord> for Address {
    fn from(r: IpAddressRecord) -> Self {
        let interface_id = match r.assigned_object_type.as_deref() {
            Some(VM_INTERFACE_TYPE) => r.assigned_object_id,
            _ => None,
        };
        Address {
            id: r.id,
            address: r.address,
            description: r.description.unwrap_or_default(),
            interface_id,
        }
    }
}
