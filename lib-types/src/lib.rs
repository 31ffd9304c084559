//! Presale primitives.
//! Stable, storage-neutral, behavior-free.
//!
//! Rule: parse at the edge, compare bytes inside.

pub mod package;
pub mod primitives;

pub use package::{package, Package, PackageId, UnknownPackage, PACKAGES, REFERRAL_REWARD};
pub use primitives::{format_units, parse_units, Address, Amount, ParseError, TxHash, TOKEN_DECIMALS};
