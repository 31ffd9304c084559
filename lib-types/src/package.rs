//! Package catalog
//!
//! The purchase tiers are static configuration shared with the contract.
//! The core consults this table; it never persists or mutates it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::primitives::Amount;

/// Referral reward credited to a referrer per newly registered address
pub const REFERRAL_REWARD: u64 = 200;

const WEI: Amount = 1_000_000_000_000_000_000;

/// Purchase tier identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageId {
    Basic,
    Standard,
    Premium,
    Royal,
}

impl PackageId {
    /// All tiers in catalog order
    pub const ALL: [PackageId; 4] = [
        PackageId::Basic,
        PackageId::Standard,
        PackageId::Premium,
        PackageId::Royal,
    ];

    /// Identifier as passed to the contract
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageId::Basic => "basic",
            PackageId::Standard => "standard",
            PackageId::Premium => "premium",
            PackageId::Royal => "royal",
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown package: {0}")]
pub struct UnknownPackage(pub String);

impl FromStr for PackageId {
    type Err = UnknownPackage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(PackageId::Basic),
            "standard" => Ok(PackageId::Standard),
            "premium" => Ok(PackageId::Premium),
            "royal" => Ok(PackageId::Royal),
            other => Err(UnknownPackage(other.to_string())),
        }
    }
}

/// Terms of a purchase tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Package {
    pub id: PackageId,
    pub name: &'static str,
    /// Price in native-currency base units (wei)
    pub price: Amount,
    /// Whole tokens granted on purchase
    pub token_amount: u64,
    /// Refills granted on purchase
    pub refill_allowance: u64,
}

pub const PACKAGES: [Package; 4] = [
    Package {
        id: PackageId::Basic,
        name: "Basic",
        price: WEI / 4,
        token_amount: 1_000,
        refill_allowance: 0,
    },
    Package {
        id: PackageId::Standard,
        name: "Standard",
        price: WEI / 2,
        token_amount: 2_200,
        refill_allowance: 4,
    },
    Package {
        id: PackageId::Premium,
        name: "Premium",
        price: WEI + WEI / 4,
        token_amount: 6_000,
        refill_allowance: 0,
    },
    Package {
        id: PackageId::Royal,
        name: "Royal",
        price: 2 * WEI + WEI / 2,
        token_amount: 13_000,
        refill_allowance: 0,
    },
];

/// Look up the catalog entry for a tier
pub fn package(id: PackageId) -> &'static Package {
    // PACKAGES is indexed in PackageId::ALL order
    &PACKAGES[id as usize]
}
