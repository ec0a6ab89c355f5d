//! Core VPN link provisioning: find-or-create resolution of tunnel
//! interfaces, transit prefixes and tunnel addresses against an IPAM
//! inventory, port derivation, and rendering of device configuration.

pub mod connection;
pub mod error;
pub mod inventory;
pub mod memory;
pub mod port;
pub mod render;
pub mod resolver;

pub use connection::{build_pair, make_connection, ConnectionEndpoint};
pub use error::{Error, Result};
pub use inventory::Inventory;
pub use memory::MemoryInventory;
pub use port::derive_port;
pub use resolver::{Device, Resolver, Tags};
