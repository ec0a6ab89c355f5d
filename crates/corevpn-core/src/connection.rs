use std::net::IpAddr;

use ipnet::IpNet;
use tracing::debug;

use crate::inventory::Inventory;
use crate::port::derive_port;
use crate::resolver::{Device, Resolver};
use crate::{Error, Result};

/// One device's side of a tunnel to a peer. Built fresh on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    pub device: Device,
    pub interface_name: String,
    pub public_ip: IpAddr,
    pub public_key: String,
    /// Tunnel address with the transit prefix's mask.
    pub tunnel_ip: IpNet,
    pub port: u16,
    pub asn: u32,
}

impl ConnectionEndpoint {
    pub fn name(&self) -> &str {
        &self.device.name
    }
}

fn public_ip(device: &Device) -> Result<IpAddr> {
    device
        .public_ip
        .ok_or_else(|| Error::MissingPublicAddress(device.name.clone()))
}

fn public_key(device: &Device) -> Result<String> {
    device
        .public_key
        .clone()
        .ok_or_else(|| Error::MissingPublicKey(device.name.clone()))
}

/// Resolve `local`'s side of its tunnel to `peer`, creating whatever the
/// inventory does not have yet.
pub fn make_connection<I: Inventory + ?Sized>(
    resolver: &mut Resolver<'_, I>,
    local: &Device,
    peer: &Device,
) -> Result<ConnectionEndpoint> {
    let public_ip = public_ip(local)?;
    let public_key = public_key(local)?;

    let interface = resolver.resolve_interface(&local.name, &peer.name)?;
    let transit = resolver.resolve_transit_prefix(&local.name, &peer.name)?;
    let pool = resolver.pool()?.cidr;
    let port = derive_port(&pool, &transit.cidr)?;
    let tunnel = resolver.resolve_tunnel_address(&transit, &local.name)?;
    // Stored addresses may carry any mask (/32 when entered by hand).
    let tunnel_ip = IpNet::new(tunnel.ip(), transit.cidr.prefix_len())
        .map_err(|e| Error::InvariantViolation(format!("tunnel address {}: {e}", tunnel.address)))?;

    debug!(
        device = %local.name,
        peer = %peer.name,
        interface = %interface.name,
        transit = %transit.cidr,
        port,
        "resolved endpoint"
    );

    Ok(ConnectionEndpoint {
        device: local.clone(),
        interface_name: interface.name,
        public_ip,
        public_key,
        tunnel_ip,
        port,
        asn: local.asn,
    })
}

/// Both sides of the tunnel between `a` and `b`.
///
/// Public address and key of both devices are checked before anything is
/// resolved, so a pair that cannot be linked leaves the inventory untouched.
pub fn build_pair<I: Inventory + ?Sized>(
    resolver: &mut Resolver<'_, I>,
    a: &Device,
    b: &Device,
) -> Result<(ConnectionEndpoint, ConnectionEndpoint)> {
    for device in [a, b] {
        public_ip(device)?;
        public_key(device)?;
    }
    let a_side = make_connection(resolver, a, b)?;
    let b_side = make_connection(resolver, b, a)?;
    Ok((a_side, b_side))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryInventory;
    use crate::resolver::{Tags, DEVICE_TAG, POOL_TAG, PUBLIC_INTERFACE_TAG};

    fn inventory() -> MemoryInventory {
        let inv = MemoryInventory::new();
        inv.add_prefix("10.1.0.0/24", "", &[POOL_TAG]).unwrap();
        for (name, asn, ip) in [("edge-a", 65001, "198.51.100.1/24"), ("edge-b", 65002, "203.0.113.2/24")] {
            inv.add_device(name, asn, Some(format!("{name}-key=").as_str()), &[DEVICE_TAG]);
            let public = inv.add_interface(name, "eth0", "", &[PUBLIC_INTERFACE_TAG]);
            inv.add_address(ip, "", Some(public.id)).unwrap();
        }
        inv
    }

    #[test]
    fn pair_shares_prefix_and_port() {
        let inv = inventory();
        let mut resolver = Resolver::new(&inv, Tags::default());
        let a = resolver.device("edge-a").unwrap();
        let b = resolver.device("edge-b").unwrap();

        let (a_side, b_side) = build_pair(&mut resolver, &a, &b).unwrap();
        assert_eq!(a_side.port, 51820);
        assert_eq!(b_side.port, 51820);
        assert_eq!(a_side.interface_name, "wg0");
        assert_eq!(b_side.interface_name, "wg0");
        assert_eq!(a_side.tunnel_ip.to_string(), "10.1.0.1/30");
        assert_eq!(b_side.tunnel_ip.to_string(), "10.1.0.2/30");
        assert_eq!(a_side.public_ip.to_string(), "198.51.100.1");
        assert_eq!(b_side.asn, 65002);
        assert_eq!(b_side.public_key, "edge-b-key=");
    }

    #[test]
    fn port_follows_prefix_position() {
        let inv = inventory();
        inv.add_prefix("10.1.0.0/30", "x - y [WG]", &[]).unwrap();
        inv.add_prefix("10.1.0.4/30", "x - z [WG]", &[]).unwrap();
        let mut resolver = Resolver::new(&inv, Tags::default());
        let a = resolver.device("edge-a").unwrap();
        let b = resolver.device("edge-b").unwrap();

        let endpoint = make_connection(&mut resolver, &a, &b).unwrap();
        assert_eq!(endpoint.port, 51822);
        assert_eq!(endpoint.tunnel_ip.to_string(), "10.1.0.9/30");
    }

    #[test]
    fn reused_address_gets_transit_mask() {
        let inv = inventory();
        inv.add_prefix("10.1.0.0/30", "edge-a - edge-b [WG]", &[]).unwrap();
        inv.add_address("10.1.0.1/32", "edge-a", None).unwrap();
        inv.add_address("10.1.0.2/32", "edge-b", None).unwrap();
        let mut resolver = Resolver::new(&inv, Tags::default());
        let a = resolver.device("edge-a").unwrap();
        let b = resolver.device("edge-b").unwrap();

        let (a_side, b_side) = build_pair(&mut resolver, &a, &b).unwrap();
        assert_eq!(a_side.tunnel_ip.to_string(), "10.1.0.1/30");
        assert_eq!(b_side.tunnel_ip.to_string(), "10.1.0.2/30");
        assert!(crate::render::render_wireguard(&a_side, &b_side)
            .starts_with("set interfaces wireguard wg0 address '10.1.0.1/30'"));
        assert_eq!(inv.creations().addresses, 0);
    }

    #[test]
    fn missing_public_address_creates_nothing() {
        let inv = inventory();
        inv.add_device("edge-c", 65003, Some("c-key="), &[DEVICE_TAG]);
        inv.add_interface("edge-c", "eth0", "", &[]);
        let mut resolver = Resolver::new(&inv, Tags::default());
        let a = resolver.device("edge-a").unwrap();
        let c = resolver.device("edge-c").unwrap();

        let err = build_pair(&mut resolver, &a, &c).unwrap_err();
        assert!(matches!(err, Error::MissingPublicAddress(ref n) if n == "edge-c"));
        assert_eq!(err.to_string(), "could not find public address for edge-c");
        assert_eq!(inv.creations().total(), 0);
    }

    #[test]
    fn missing_public_key_is_fatal() {
        let inv = inventory();
        inv.add_device("edge-d", 65004, None, &[DEVICE_TAG]);
        let public = inv.add_interface("edge-d", "eth0", "", &[PUBLIC_INTERFACE_TAG]);
        inv.add_address("192.0.2.4/24", "", Some(public.id)).unwrap();
        let mut resolver = Resolver::new(&inv, Tags::default());
        let d = resolver.device("edge-d").unwrap();
        let a = resolver.device("edge-a").unwrap();

        let err = build_pair(&mut resolver, &d, &a).unwrap_err();
        assert!(matches!(err, Error::MissingPublicKey(_)));
    }

    #[test]
    fn tampered_transit_prefix_is_an_invariant_violation() {
        let inv = inventory();
        inv.add_prefix("10.1.0.0/29", "edge-a - edge-b [WG]", &[]).unwrap();
        let mut resolver = Resolver::new(&inv, Tags::default());
        let a = resolver.device("edge-a").unwrap();
        let b = resolver.device("edge-b").unwrap();

        let err = build_pair(&mut resolver, &a, &b).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }
}
