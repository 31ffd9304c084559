//! Canonical Primitive Types for the Presale Core
//!
//! Rule: addresses are compared as bytes, never as strings.
//!
//! Wallet providers hand out checksummed or lowercase hex strings and users
//! paste referral links with either casing. Parsing into fixed-size types at
//! the edge makes `0xABC..` and `0xabc..` the same key everywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// TYPE ALIASES
// ============================================================================

/// Raw base-unit amounts (wei for native currency, 18-decimal token units)
pub type Amount = u128;

/// Decimals used by the native currency and the sale token
pub const TOKEN_DECIMALS: u32 = 18;

// ============================================================================
// PARSE ERRORS
// ============================================================================

/// Error parsing a primitive from its textual form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing 0x prefix: {0}")]
    MissingPrefix(String),

    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid decimal amount: {0}")]
    InvalidAmount(String),
}

fn decode_prefixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let trimmed = s.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ParseError::MissingPrefix(trimmed.to_string()))?;

    if body.len() != N * 2 {
        return Err(ParseError::InvalidLength {
            expected: N * 2,
            actual: body.len(),
        });
    }

    let mut out = [0u8; N];
    hex::decode_to_slice(body, &mut out).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    Ok(out)
}

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// 20-byte account address
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The null address; as a referrer it means "no referrer"
    pub const ZERO: Self = Self([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True for `0x000…000`, the placeholder wallets send for "none"
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Abbreviated form for log lines, `0x1234…abcd`
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}…{}", &full[..4], &full[full.len() - 4..])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<20>(s).map(Self)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ============================================================================
// HASH TYPES
// ============================================================================

/// Hash identifying a submitted ledger write
#[derive(Clone, Copy, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash(0x{}…)", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<32>(s).map(Self)
    }
}

impl TryFrom<String> for TxHash {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.to_string()
    }
}

impl From<[u8; 32]> for TxHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

// ============================================================================
// AMOUNT FORMATTING
// ============================================================================

/// Render a base-unit amount as a decimal string, trimming trailing zeros
///
/// Works on the digit string, so any `decimals` is accepted.
pub fn format_units(amount: Amount, decimals: u32) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (whole, frac) = padded.split_at(padded.len() - decimals);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, frac)
    }
}

/// Parse a decimal string such as `"0.25"` into base units
///
/// Fails on stray characters, on more fractional digits than `decimals`,
/// and when the result does not fit an `Amount`.
pub fn parse_units(value: &str, decimals: u32) -> Result<Amount, ParseError> {
    let invalid = || ParseError::InvalidAmount(value.to_string());
    let trimmed = value.trim();
    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if frac.len() > decimals as usize {
        return Err(invalid());
    }
    if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    match digits.trim_start_matches('0') {
        "" => Ok(0),
        significant => significant.parse().map_err(|_| invalid()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
