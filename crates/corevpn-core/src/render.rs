//! VyOS `set` statements for one side of a tunnel.

use crate::connection::ConnectionEndpoint;

pub const MTU: u16 = 1420;
pub const ROUTE_MAP: &str = "ONLYRFC1918PREFIXES";
pub const ALLOWED_IPS: &str = "0.0.0.0/0";

pub fn render_wireguard(local: &ConnectionEndpoint, remote: &ConnectionEndpoint) -> String {
    let iface = format!("set interfaces wireguard {}", local.interface_name);
    let peer = format!("{iface} peer {}", remote.name());
    [
        format!("{iface} address '{}'", local.tunnel_ip),
        format!("{iface} description '{}'", remote.name()),
        format!("{iface} mtu '{MTU}'"),
        format!("{peer} address '{}'", remote.public_ip),
        format!("{peer} allowed-ips '{ALLOWED_IPS}'"),
        // Port belongs to the shared transit prefix, so both sides use it.
        format!("{peer} port '{}'", local.port),
        format!("{peer} public-key '{}'", remote.public_key),
        format!("{iface} port '{}'", local.port),
    ]
    .join("\n")
}

pub fn render_bgp(_local: &ConnectionEndpoint, remote: &ConnectionEndpoint) -> String {
    let neighbor = format!("set protocols bgp neighbor {}", remote.tunnel_ip.addr());
    let family = format!("{neighbor} address-family ipv4-unicast");
    [
        format!("{family} route-map export '{ROUTE_MAP}'"),
        format!("{family} route-map import '{ROUTE_MAP}'"),
        format!("{family} soft-reconfiguration inbound"),
        format!("{neighbor} description '{}'", remote.name()),
        format!("{neighbor} remote-as '{}'", remote.asn),
    ]
    .join("\n")
}

/// Both blocks for `local`, headed by a comment naming the device.
pub fn render_device(local: &ConnectionEndpoint, remote: &ConnectionEndpoint) -> String {
    format!(
        "# {}\n{}\n\n{}\n",
        local.name(),
        render_wireguard(local, remote),
        render_bgp(local, remote)
    )
}

/// Configuration for both devices of a pair, in the given order.
pub fn render_pair(a: &ConnectionEndpoint, b: &ConnectionEndpoint) -> String {
    format!("{}\n{}", render_device(a, b), render_device(b, a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Device;

    fn endpoint(name: &str, iface: &str, public: &str, tunnel: &str, asn: u32) -> ConnectionEndpoint {
        ConnectionEndpoint {
            device: Device {
                id: 1,
                name: name.into(),
                asn,
                public_key: Some(format!("{name}-key=")),
                public_ip: Some(public.parse().unwrap()),
                interfaces: vec![],
            },
            interface_name: iface.into(),
            public_ip: public.parse().unwrap(),
            public_key: format!("{name}-key="),
            tunnel_ip: tunnel.parse().unwrap(),
            port: 51822,
            asn,
        }
    }

    fn pair() -> (ConnectionEndpoint, ConnectionEndpoint) {
        (
            endpoint("edge-a", "wg0", "198.51.100.1", "10.0.0.9/30", 65001),
            endpoint("edge-b", "wg3", "203.0.113.2", "10.0.0.10/30", 65002),
        )
    }

    #[test]
    fn wireguard_block() {
        let (a, b) = pair();
        let expected = "\
set interfaces wireguard wg0 address '10.0.0.9/30'
set interfaces wireguard wg0 description 'edge-b'
set interfaces wireguard wg0 mtu '1420'
set interfaces wireguard wg0 peer edge-b address '203.0.113.2'
set interfaces wireguard wg0 peer edge-b allowed-ips '0.0.0.0/0'
set interfaces wireguard wg0 peer edge-b port '51822'
set interfaces wireguard wg0 peer edge-b public-key 'edge-b-key='
set interfaces wireguard wg0 port '51822'";
        assert_eq!(render_wireguard(&a, &b), expected);
    }

    #[test]
    fn bgp_block() {
        let (a, b) = pair();
        let expected = "\
set protocols bgp neighbor 10.0.0.10 address-family ipv4-unicast route-map export 'ONLYRFC1918PREFIXES'
set protocols bgp neighbor 10.0.0.10 address-family ipv4-unicast route-map import 'ONLYRFC1918PREFIXES'
set protocols bgp neighbor 10.0.0.10 address-family ipv4-unicast soft-reconfiguration inbound
set protocols bgp neighbor 10.0.0.10 description 'edge-b'
set protocols bgp neighbor 10.0.0.10 remote-as '65002'";
        assert_eq!(render_bgp(&a, &b), expected);
    }

    #[test]
    fn each_side_uses_its_own_interface() {
        let (a, b) = pair();
        let b_side = render_wireguard(&b, &a);
        assert!(b_side.starts_with("set interfaces wireguard wg3 address '10.0.0.10/30'"));
        assert!(b_side.contains("peer edge-a address '198.51.100.1'"));
        assert!(render_bgp(&b, &a).contains("neighbor 10.0.0.9 remote-as '65001'"));
    }

    #[test]
    fn pair_output_layout() {
        let (a, b) = pair();
        let out = render_pair(&a, &b);
        assert!(out.starts_with("# edge-a\n"));
        assert!(out.contains("\n\n# edge-b\n"));
        assert!(out.ends_with("remote-as '65001'\n"));
    }
}
