//! In-memory inventory.
//!
//! Behaves like NetBox for the calls the resolver makes: sub-prefixes are
//! handed out first-fit in address order, addresses as the lowest free host.
//! Create calls are counted so callers can check what a run wrote.

use std::sync::Mutex;

use corevpn_types::{Address, DeviceRecord, Interface, Prefix};
use ipnet::IpNet;

use crate::inventory::Inventory;
use crate::{Error, Result};

/// Number of records created through the [`Inventory`] trait.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Creations {
    pub interfaces: usize,
    pub prefixes: usize,
    pub addresses: usize,
}

impl Creations {
    pub fn total(&self) -> usize {
        self.interfaces + self.prefixes + self.addresses
    }
}

#[derive(Default)]
struct State {
    last_id: u64,
    devices: Vec<(DeviceRecord, Vec<String>)>,
    interfaces: Vec<Interface>,
    prefixes: Vec<Prefix>,
    addresses: Vec<Address>,
    creations: Creations,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Default)]
pub struct MemoryInventory {
    state: Mutex<State>,
}

fn parse_net(cidr: &str) -> Result<IpNet> {
    cidr.parse()
        .map_err(|e| Error::InventoryUnavailable(format!("invalid prefix '{cidr}': {e}")))
}

fn overlaps(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Seeding ---

    pub fn add_device(&self, name: &str, asn: u32, public_key: Option<&str>, tags: &[&str]) -> u64 {
        self.add_device_record(name, Some(asn), public_key, tags)
    }

    pub fn add_device_record(&self, name: &str, asn: Option<u32>, public_key: Option<&str>, tags: &[&str]) -> u64 {
        let mut state = self.state();
        let id = state.next_id();
        let record = DeviceRecord {
            id,
            name: name.to_string(),
            asn,
            public_key: public_key.map(|k| k.to_string()),
        };
        state
            .devices
            .push((record, tags.iter().map(|t| t.to_string()).collect()));
        id
    }

    pub fn add_interface(&self, device: &str, name: &str, description: &str, tags: &[&str]) -> Interface {
        let mut state = self.state();
        let iface = Interface {
            id: state.next_id(),
            device: device.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        state.interfaces.push(iface.clone());
        iface
    }

    pub fn add_prefix(&self, cidr: &str, description: &str, tags: &[&str]) -> Result<Prefix> {
        let cidr = parse_net(cidr)?;
        let mut state = self.state();
        let prefix = Prefix {
            id: state.next_id(),
            cidr,
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        state.prefixes.push(prefix.clone());
        Ok(prefix)
    }

    pub fn add_address(&self, address: &str, description: &str, interface_id: Option<u64>) -> Result<Address> {
        let address = parse_net(address)?;
        let mut state = self.state();
        let record = Address {
            id: state.next_id(),
            address,
            description: description.to_string(),
            interface_id,
        };
        state.addresses.push(record.clone());
        Ok(record)
    }

    // --- Inspection ---

    pub fn creations(&self) -> Creations {
        self.state().creations
    }

    pub fn interfaces(&self) -> Vec<Interface> {
        self.state().interfaces.clone()
    }

    pub fn prefixes(&self) -> Vec<Prefix> {
        self.state().prefixes.clone()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.state().addresses.clone()
    }
}

impl Inventory for MemoryInventory {
    fn list_devices(&self, tag: &str) -> Result<Vec<DeviceRecord>> {
        Ok(self
            .state()
            .devices
            .iter()
            .filter(|(_, tags)| tags.iter().any(|t| t == tag))
            .map(|(d, _)| d.clone())
            .collect())
    }

    fn list_interfaces(&self, device: &str) -> Result<Vec<Interface>> {
        Ok(self
            .state()
            .interfaces
            .iter()
            .filter(|i| i.device == device)
            .cloned()
            .collect())
    }

    fn get_address(&self, interface_id: u64) -> Result<Option<Address>> {
        Ok(self
            .state()
            .addresses
            .iter()
            .find(|a| a.interface_id == Some(interface_id))
            .cloned())
    }

    fn create_interface(&self, device: &str, name: &str, description: &str) -> Result<Interface> {
        let mut state = self.state();
        if !state.devices.iter().any(|(d, _)| d.name == device) {
            return Err(Error::InventoryUnavailable(format!(
                "cannot create interface on unknown device '{device}'"
            )));
        }
        let iface = Interface {
            id: state.next_id(),
            device: device.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            tags: vec![],
        };
        state.interfaces.push(iface.clone());
        state.creations.interfaces += 1;
        Ok(iface)
    }

    fn get_pool_prefix(&self, tag: &str) -> Result<Prefix> {
        let state = self.state();
        let mut tagged = state
            .prefixes
            .iter()
            .filter(|p| p.tags.iter().any(|t| t == tag));
        match (tagged.next(), tagged.next()) {
            (Some(pool), None) => Ok(pool.clone()),
            _ => Err(Error::MissingPool(tag.to_string())),
        }
    }

    fn list_prefixes_within(&self, parent: &IpNet) -> Result<Vec<Prefix>> {
        Ok(self
            .state()
            .prefixes
            .iter()
            .filter(|p| p.cidr.prefix_len() > parent.prefix_len() && parent.contains(&p.cidr))
            .cloned()
            .collect())
    }

    fn create_sub_prefix(&self, parent: &Prefix, length: u8, description: &str) -> Result<Prefix> {
        let mut state = self.state();
        let candidates = parent.cidr.subnets(length).map_err(|e| {
            Error::InventoryUnavailable(format!("cannot carve /{length} from {}: {e}", parent.cidr))
        })?;
        let taken: Vec<IpNet> = state
            .prefixes
            .iter()
            .filter(|p| p.id != parent.id && parent.cidr.contains(&p.cidr))
            .map(|p| p.cidr)
            .collect();
        let cidr = candidates
            .into_iter()
            .find(|c| !taken.iter().any(|t| overlaps(c, t)))
            .ok_or_else(|| {
                Error::InventoryUnavailable(format!("no available /{length} left in {}", parent.cidr))
            })?;
        let prefix = Prefix {
            id: state.next_id(),
            cidr,
            description: description.to_string(),
            tags: vec![],
        };
        state.prefixes.push(prefix.clone());
        state.creations.prefixes += 1;
        Ok(prefix)
    }

    fn list_addresses_within(&self, prefix: &IpNet) -> Result<Vec<Address>> {
        Ok(self
            .state()
            .addresses
            .iter()
            .filter(|a| prefix.contains(&a.ip()))
            .cloned()
            .collect())
    }

    fn create_address(&self, prefix: &Prefix, description: &str) -> Result<Address> {
        let mut state = self.state();
        let free = prefix
            .cidr
            .hosts()
            .find(|ip| !state.addresses.iter().any(|a| a.ip() == *ip))
            .ok_or_else(|| {
                Error::InventoryUnavailable(format!("no available addresses left in {}", prefix.cidr))
            })?;
        let address = IpNet::new(free, prefix.cidr.prefix_len())
            .map_err(|e| Error::InventoryUnavailable(e.to_string()))?;
        let record = Address {
            id: state.next_id(),
            address,
            description: description.to_string(),
            interface_id: None,
        };
        state.addresses.push(record.clone());
        state.creations.addresses += 1;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(inv: &MemoryInventory) -> Prefix {
        inv.add_prefix("10.1.0.0/24", "Core VPN links", &["core-vpn-link-network-pool"])
            .unwrap()
    }

    #[test]
    fn sub_prefixes_are_first_fit() {
        let inv = MemoryInventory::new();
        let pool = pool(&inv);
        inv.add_prefix("10.1.0.4/30", "taken", &[]).unwrap();

        let a = inv.create_sub_prefix(&pool, 30, "a").unwrap();
        let b = inv.create_sub_prefix(&pool, 30, "b").unwrap();
        assert_eq!(a.cidr.to_string(), "10.1.0.0/30");
        assert_eq!(b.cidr.to_string(), "10.1.0.8/30");
        assert_eq!(inv.creations().prefixes, 2);
    }

    #[test]
    fn sub_prefix_exhaustion() {
        let inv = MemoryInventory::new();
        let pool = inv.add_prefix("10.2.0.0/29", "", &["pool"]).unwrap();
        inv.create_sub_prefix(&pool, 30, "a").unwrap();
        inv.create_sub_prefix(&pool, 30, "b").unwrap();
        let err = inv.create_sub_prefix(&pool, 30, "c").unwrap_err();
        assert!(matches!(err, Error::InventoryUnavailable(_)));
    }

    #[test]
    fn addresses_are_lowest_free_host() {
        let inv = MemoryInventory::new();
        let pool = pool(&inv);
        let link = inv.create_sub_prefix(&pool, 30, "link").unwrap();

        let first = inv.create_address(&link, "edge-a").unwrap();
        let second = inv.create_address(&link, "edge-b").unwrap();
        assert_eq!(first.address.to_string(), "10.1.0.1/30");
        assert_eq!(second.address.to_string(), "10.1.0.2/30");
        assert!(inv.create_address(&link, "edge-c").is_err());
    }

    #[test]
    fn within_excludes_parent_itself() {
        let inv = MemoryInventory::new();
        let pool = pool(&inv);
        inv.add_prefix("10.1.0.0/30", "x", &[]).unwrap();
        inv.add_prefix("10.9.0.0/30", "elsewhere", &[]).unwrap();

        let within = inv.list_prefixes_within(&pool.cidr).unwrap();
        assert_eq!(within.len(), 1);
        assert_eq!(within[0].description, "x");
    }

    #[test]
    fn pool_must_be_unique() {
        let inv = MemoryInventory::new();
        assert!(matches!(
            inv.get_pool_prefix("pool").unwrap_err(),
            Error::MissingPool(_)
        ));
        inv.add_prefix("10.0.0.0/24", "", &["pool"]).unwrap();
        assert!(inv.get_pool_prefix("pool").is_ok());
        inv.add_prefix("10.0.1.0/24", "", &["pool"]).unwrap();
        assert!(inv.get_pool_prefix("pool").is_err());
    }

    #[test]
    fn create_interface_requires_known_device() {
        let inv = MemoryInventory::new();
        assert!(inv.create_interface("ghost", "wg0", "edge-b").is_err());
        inv.add_device("edge-a", 65001, None, &["Core VPN"]);
        let iface = inv.create_interface("edge-a", "wg0", "edge-b").unwrap();
        assert_eq!(inv.list_interfaces("edge-a").unwrap(), vec![iface]);
    }
}
