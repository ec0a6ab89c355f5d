//! UDP port derivation from a transit subnet's position in the pool.
//!
//! The pool is cut into contiguous /30 blocks in address order:
//! block 0 → port 51820, block 1 → port 51821, and so on.
//!
//! pool 10.1.0.0/24: 10.1.0.0/30 → 51820, 10.1.0.4/30 → 51821, ...

use ipnet::{IpNet, Ipv4Net};

use crate::{Error, Result};

pub const BASE_PORT: u16 = 51820;
pub const TRANSIT_PREFIX_LEN: u8 = 30;

/// Zero-based index of `transit` among the /30 blocks of `pool`.
pub fn subnet_index(pool: &Ipv4Net, transit: &Ipv4Net) -> Result<u32> {
    if transit.prefix_len() != TRANSIT_PREFIX_LEN {
        return Err(Error::InvariantViolation(format!(
            "transit prefix {transit} is not a /{TRANSIT_PREFIX_LEN}"
        )));
    }
    if transit.trunc() != *transit {
        return Err(Error::InvariantViolation(format!(
            "transit prefix {transit} is not aligned to a /{TRANSIT_PREFIX_LEN} boundary"
        )));
    }
    if pool.prefix_len() > TRANSIT_PREFIX_LEN || !pool.contains(transit) {
        return Err(Error::InvariantViolation(format!(
            "transit prefix {transit} is not inside pool {pool}"
        )));
    }
    let offset = u32::from(transit.network()) - u32::from(pool.network());
    Ok(offset >> (32 - TRANSIT_PREFIX_LEN))
}

pub fn derive_port(pool: &IpNet, transit: &IpNet) -> Result<u16> {
    let (IpNet::V4(pool), IpNet::V4(transit)) = (pool, transit) else {
        return Err(Error::InvariantViolation(format!(
            "port derivation needs IPv4 prefixes (pool {pool}, transit {transit})"
        )));
    };
    let index = subnet_index(pool, transit)?;
    u16::try_from(index)
        .ok()
        .and_then(|i| BASE_PORT.checked_add(i))
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "transit prefix {transit} sits at index {index} of {pool}, past the last UDP port"
            ))
        })
}
