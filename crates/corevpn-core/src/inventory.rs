use corevpn_types::{Address, DeviceRecord, Interface, Prefix};
use ipnet::IpNet;

use crate::Result;

/// Read/write access to the IPAM inventory.
///
/// Implementations make no promise about deduplicating concurrent
/// creations; callers search before they create.
pub trait Inventory {
    fn list_devices(&self, tag: &str) -> Result<Vec<DeviceRecord>>;
    fn list_interfaces(&self, device: &str) -> Result<Vec<Interface>>;
    fn get_address(&self, interface_id: u64) -> Result<Option<Address>>;
    fn create_interface(&self, device: &str, name: &str, description: &str) -> Result<Interface>;
    fn get_pool_prefix(&self, tag: &str) -> Result<Prefix>;
    fn list_prefixes_within(&self, parent: &IpNet) -> Result<Vec<Prefix>>;
    fn create_sub_prefix(&self, parent: &Prefix, length: u8, description: &str) -> Result<Prefix>;
    fn list_addresses_within(&self, prefix: &IpNet) -> Result<Vec<Address>>;
    fn create_address(&self, prefix: &Prefix, description: &str) -> Result<Address>;
}
