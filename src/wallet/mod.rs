//! Wallet Address Resolution
//! Mission: Know which public address to value on each chain for every account

pub mod derive;
pub mod resolver;

pub use derive::{derive_address, DerivationError, RecoverySecret};
pub use resolver::{AddressResolver, ResolveError, ResolvedAddresses};
