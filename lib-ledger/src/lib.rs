//! Presale ledger adapter
//!
//! The contract is the single source of truth for token balances, refill
//! counts and claim flags. This crate defines how the core talks to it
//! (`LedgerAdapter`) and ships an in-process implementation
//! (`InMemoryLedger`) for development and tests.

pub mod adapter;
pub mod errors;
pub mod memory;

pub use adapter::{LedgerAdapter, ReadKind, TxReceipt};
pub use errors::{LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
