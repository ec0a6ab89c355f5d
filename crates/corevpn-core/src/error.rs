use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("device '{0}' not found in inventory (or not tagged as a Core VPN device)")]
    NotFound(String),

    #[error("could not find public address for {0}")]
    MissingPublicAddress(String),

    #[error("device '{0}' has no ASN (its site in the inventory carries none)")]
    MissingAsn(String),

    #[error("no WireGuard public key recorded for {0}")]
    MissingPublicKey(String),

    #[error("no unique pool prefix tagged '{0}'")]
    MissingPool(String),

    #[error("inventory unavailable: {0}")]
    InventoryUnavailable(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
