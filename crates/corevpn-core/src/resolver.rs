//! Find-or-create resolution of tunnel resources against the inventory.
//!
//! Every resolve step searches by a canonical key first and only creates on
//! a miss, so re-running against the same inventory reuses what an earlier
//! run created. Search and create are not atomic: two concurrent runs for
//! the same pair can both miss and both create.

use std::collections::HashMap;
use std::net::IpAddr;

use corevpn_types::{Address, DeviceRecord, Interface, Prefix};
use tracing::{debug, info};

use crate::inventory::Inventory;
use crate::port::TRANSIT_PREFIX_LEN;
use crate::{Error, Result};

pub const DEVICE_TAG: &str = "Core VPN";
pub const PUBLIC_INTERFACE_TAG: &str = "Public interface";
pub const POOL_TAG: &str = "core-vpn-link-network-pool";

/// Classification tags the resolver looks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tags {
    pub device: String,
    pub public_interface: String,
    pub pool: String,
}

impl Default for Tags {
    fn default() -> Self {
        Self {
            device: DEVICE_TAG.to_string(),
            public_interface: PUBLIC_INTERFACE_TAG.to_string(),
            pool: POOL_TAG.to_string(),
        }
    }
}

/// A Core VPN device with its interfaces and public address attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: u64,
    pub name: String,
    pub asn: u32,
    pub public_key: Option<String>,
    pub public_ip: Option<IpAddr>,
    pub interfaces: Vec<Interface>,
}

/// Interfaces per device name, fetched lazily and kept for one run.
#[derive(Debug, Default)]
pub struct InterfaceCache {
    by_device: HashMap<String, Vec<Interface>>,
}

impl InterfaceCache {
    pub fn get_or_fetch<I: Inventory + ?Sized>(&mut self, inventory: &I, device: &str) -> Result<&[Interface]> {
        if !self.by_device.contains_key(device) {
            let fetched = inventory.list_interfaces(device)?;
            debug!(device, count = fetched.len(), "fetched interfaces");
            self.by_device.insert(device.to_string(), fetched);
        }
        Ok(self.by_device.get(device).map(Vec::as_slice).unwrap_or_default())
    }

    /// Record an interface created during this run.
    pub fn insert(&mut self, iface: Interface) {
        self.by_device.entry(iface.device.clone()).or_default().push(iface);
    }
}

/// Description that identifies the transit prefix of an unordered pair.
pub fn canonical_description(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{low} - {high} [WG]")
}

/// Index for the next `wg<N>` interface: one past the highest existing `N`,
/// or 0 when the device has none. Gaps are not reused.
pub fn next_tunnel_index(interfaces: &[Interface]) -> Result<u32> {
    match interfaces.iter().filter_map(Interface::tunnel_index).max() {
        None => Ok(0),
        Some(highest) => highest.checked_add(1).ok_or_else(|| {
            Error::InvariantViolation(format!("no tunnel interface name left after wg{highest}"))
        }),
    }
}

pub fn find_description<'a>(interfaces: &'a [Interface], description: &str) -> Option<&'a Interface> {
    interfaces.iter().find(|i| i.description == description)
}

pub struct Resolver<'a, I: ?Sized> {
    inventory: &'a I,
    tags: Tags,
    interfaces: InterfaceCache,
    devices: Option<Vec<DeviceRecord>>,
    pool: Option<Prefix>,
}

impl<'a, I: Inventory + ?Sized> Resolver<'a, I> {
    pub fn new(inventory: &'a I, tags: Tags) -> Self {
        Self {
            inventory,
            tags,
            interfaces: InterfaceCache::default(),
            devices: None,
            pool: None,
        }
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// All device records carrying the device tag, in inventory order.
    pub fn device_records(&mut self) -> Result<&[DeviceRecord]> {
        if self.devices.is_none() {
            let records = self.inventory.list_devices(&self.tags.device)?;
            debug!(tag = %self.tags.device, count = records.len(), "fetched devices");
            self.devices = Some(records);
        }
        Ok(self.devices.as_deref().unwrap_or_default())
    }

    /// Look up a tagged device by name and attach its interfaces and
    /// public address. A missing public interface or address is left as
    /// `None`; it only becomes an error when an endpoint needs it.
    pub fn device(&mut self, name: &str) -> Result<Device> {
        let record = self
            .device_records()?
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let asn = record
            .asn
            .ok_or_else(|| Error::MissingAsn(name.to_string()))?;

        let interfaces = self.interfaces.get_or_fetch(self.inventory, name)?.to_vec();
        let public_ip = match interfaces
            .iter()
            .find(|i| i.has_tag(&self.tags.public_interface))
        {
            Some(public) => self.inventory.get_address(public.id)?.map(|a| a.ip()),
            None => None,
        };

        Ok(Device {
            id: record.id,
            name: record.name,
            asn,
            public_key: record.public_key,
            public_ip,
            interfaces,
        })
    }

    /// The pool prefix every transit prefix is carved from.
    pub fn pool(&mut self) -> Result<&Prefix> {
        if self.pool.is_none() {
            let pool = self.inventory.get_pool_prefix(&self.tags.pool)?;
            debug!(pool = %pool.cidr, "fetched pool prefix");
            self.pool = Some(pool);
        }
        self.pool
            .as_ref()
            .ok_or_else(|| Error::MissingPool(self.tags.pool.clone()))
    }

    /// The tunnel interface on `device` whose description names `peer`,
    /// created as the next free `wg<N>` when there is none.
    pub fn resolve_interface(&mut self, device: &str, peer: &str) -> Result<Interface> {
        let existing = self.interfaces.get_or_fetch(self.inventory, device)?;
        if let Some(iface) = find_description(existing, peer) {
            debug!(device, peer, interface = %iface.name, "reusing tunnel interface");
            return Ok(iface.clone());
        }

        let name = format!("wg{}", next_tunnel_index(existing)?);
        let iface = self.inventory.create_interface(device, &name, peer)?;
        info!(device, peer, interface = %iface.name, "created tunnel interface");
        self.interfaces.insert(iface.clone());
        Ok(iface)
    }

    /// The /30 shared by `a` and `b`. Argument order does not matter.
    pub fn resolve_transit_prefix(&mut self, a: &str, b: &str) -> Result<Prefix> {
        let description = canonical_description(a, b);
        let pool = self.pool()?.clone();

        let existing = self.inventory.list_prefixes_within(&pool.cidr)?;
        if let Some(prefix) = existing.into_iter().find(|p| p.description == description) {
            debug!(%description, prefix = %prefix.cidr, "reusing transit prefix");
            return Ok(prefix);
        }

        let prefix = self
            .inventory
            .create_sub_prefix(&pool, TRANSIT_PREFIX_LEN, &description)?;
        info!(%description, prefix = %prefix.cidr, "created transit prefix");
        Ok(prefix)
    }

    /// The address in `prefix` whose description names `device`.
    pub fn resolve_tunnel_address(&mut self, prefix: &Prefix, device: &str) -> Result<Address> {
        let existing = self.inventory.list_addresses_within(&prefix.cidr)?;
        if let Some(addr) = existing.into_iter().find(|a| a.description == device) {
            debug!(device, address = %addr.address, "reusing tunnel address");
            return Ok(addr);
        }

        let addr = self.inventory.create_address(prefix, device)?;
        info!(device, address = %addr.address, "created tunnel address");
        Ok(addr)
    }
}
