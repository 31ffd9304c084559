//! Reconciliation Service
//!
//! Background task that keeps the dashboard's `DisplayState` in step with
//! the ledger for the active address.
//!
//! ## Operation
//! - Ticks immediately on start, then every `interval_ms` (default: 30s)
//! - Each tick issues five reads concurrently: token balance, refill count,
//!   claim flag, global claim switch, off-chain record
//! - All five succeed: the snapshot is replaced and published on a `watch`
//!   channel
//! - Any read fails: the previous snapshot stays, a `SyncNotice` goes out on
//!   a `broadcast` channel, and the next tick runs as usual
//!
//! The loop only reads. It never writes records or ledger state.
//!
//! ## Cancellation
//! Switching address or stopping aborts the running task and bumps a
//! generation counter. Publication checks the generation under the watch
//! channel's lock, so a read that completes after cancellation is dropped.

use anyhow::Result;
use chrono::Utc;
use lib_ledger::LedgerAdapter;
use lib_records::RecordStore;
use lib_types::Address;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ReconciliationConfig;
use crate::display::DisplayState;
use crate::wallet::ActiveAddress;

const NOTICE_CAPACITY: usize = 64;

/// One of the reads a tick performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncField {
    TokenBalance,
    RefillCount,
    ClaimStatus,
    GlobalClaimStatus,
    Record,
}

impl SyncField {
    pub const ALL: [SyncField; 5] = [
        SyncField::TokenBalance,
        SyncField::RefillCount,
        SyncField::ClaimStatus,
        SyncField::GlobalClaimStatus,
        SyncField::Record,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncField::TokenBalance => "token_balance",
            SyncField::RefillCount => "refill_count",
            SyncField::ClaimStatus => "claim_status",
            SyncField::GlobalClaimStatus => "global_claim_status",
            SyncField::Record => "record",
        }
    }
}

impl fmt::Display for SyncField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-blocking notice that a refresh did not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    /// Some reads failed; the displayed values may be stale
    Degraded {
        address: Address,
        failed: Vec<SyncField>,
    },
    /// Every read failed
    Unavailable { address: Address },
}

impl SyncNotice {
    pub fn address(&self) -> &Address {
        match self {
            SyncNotice::Degraded { address, .. } => address,
            SyncNotice::Unavailable { address } => address,
        }
    }
}

/// A refresh whose reads did not all succeed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Refresh for {} failed on {} of 5 reads: {}", .address, .failed.len(), .errors.join("; "))]
pub struct SyncFailure {
    pub address: Address,
    pub failed: Vec<SyncField>,
    pub errors: Vec<String>,
}

impl SyncFailure {
    pub fn is_total(&self) -> bool {
        self.failed.len() == SyncField::ALL.len()
    }

    pub fn notice(&self) -> SyncNotice {
        if self.is_total() {
            SyncNotice::Unavailable {
                address: self.address,
            }
        } else {
            SyncNotice::Degraded {
                address: self.address,
                failed: self.failed.clone(),
            }
        }
    }

    /// Record a failed read, passing successful values through
    fn take<T, E: fmt::Display>(&mut self, field: SyncField, result: std::result::Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.failed.push(field);
                self.errors.push(format!("{}: {}", field, e));
                None
            }
        }
    }
}

/// State shared between the service handle and its spawned loop
struct Shared {
    ledger: Arc<dyn LedgerAdapter>,
    store: Arc<dyn RecordStore>,
    display: watch::Sender<Option<DisplayState>>,
    notices: broadcast::Sender<SyncNotice>,
    generation: AtomicU64,
}

impl Shared {
    /// Issue all reads concurrently; succeed only if every read did
    async fn fetch(&self, address: &Address) -> std::result::Result<DisplayState, SyncFailure> {
        let (balance, refills, claimed, global, record) = tokio::join!(
            self.ledger.token_balance(address),
            self.ledger.refill_count(address),
            self.ledger.claim_status(address),
            self.ledger.global_claim_status(),
            self.store.get_record(address),
        );

        let mut failure = SyncFailure {
            address: *address,
            failed: Vec::new(),
            errors: Vec::new(),
        };
        let balance = failure.take(SyncField::TokenBalance, balance);
        let refills = failure.take(SyncField::RefillCount, refills);
        let claimed = failure.take(SyncField::ClaimStatus, claimed);
        let global = failure.take(SyncField::GlobalClaimStatus, global);
        let record = failure.take(SyncField::Record, record);

        match (balance, refills, claimed, global, record) {
            (Some(token_balance), Some(refill_count), Some(has_claimed), Some(global_claim_active), Some(record)) => {
                Ok(DisplayState {
                    address: *address,
                    token_balance,
                    refill_count,
                    has_claimed,
                    global_claim_active,
                    record,
                    refreshed_at: Utc::now(),
                })
            }
            _ => Err(failure),
        }
    }

    /// Replace the snapshot unless `generation` has been superseded
    fn publish(&self, generation: u64, state: DisplayState) -> bool {
        self.display.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = Some(state);
            true
        })
    }

    /// Invalidate running loops and clear the snapshot
    fn reset(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.display.send_replace(None);
        generation
    }

    async fn refresh(&self, address: &Address, generation: u64) -> std::result::Result<DisplayState, SyncFailure> {
        match self.fetch(address).await {
            Ok(state) => {
                if self.publish(generation, state.clone()) {
                    debug!("Refreshed display state for {}", address.short());
                } else {
                    debug!("Dropped refresh for {} from a cancelled loop", address.short());
                }
                Ok(state)
            }
            Err(failure) => {
                // no receivers is fine
                let _ = self.notices.send(failure.notice());
                Err(failure)
            }
        }
    }
}

struct RunningLoop {
    address: Address,
    handle: JoinHandle<()>,
}

/// Periodic ledger reconciliation for the active address
pub struct ReconciliationService {
    shared: Arc<Shared>,
    config: ReconciliationConfig,
    service_handle: RwLock<Option<RunningLoop>>,
}

impl ReconciliationService {
    /// Create a new reconciliation service
    pub fn new(
        ledger: Arc<dyn LedgerAdapter>,
        store: Arc<dyn RecordStore>,
        config: ReconciliationConfig,
    ) -> Self {
        let (display, _) = watch::channel(None);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                ledger,
                store,
                display,
                notices,
                generation: AtomicU64::new(0),
            }),
            config,
            service_handle: RwLock::new(None),
        }
    }

    /// Create with default configuration
    pub fn with_defaults(ledger: Arc<dyn LedgerAdapter>, store: Arc<dyn RecordStore>) -> Self {
        Self::new(ledger, store, ReconciliationConfig::default())
    }

    /// Snapshot updates; `None` while no address is being reconciled
    pub fn subscribe(&self) -> watch::Receiver<Option<DisplayState>> {
        self.shared.display.subscribe()
    }

    /// Failure notices
    pub fn notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.shared.notices.subscribe()
    }

    /// Latest published snapshot
    pub fn current(&self) -> Option<DisplayState> {
        self.shared.display.borrow().clone()
    }

    /// Start reconciling `address`, replacing any loop for another address
    pub async fn start(&self, address: Address) -> Result<()> {
        if !self.config.enabled {
            info!("Reconciliation service disabled");
            return Ok(());
        }
        self.config.validate()?;

        let mut slot = self.service_handle.write().await;
        if let Some(running) = slot.as_ref() {
            if running.address == address && !running.handle.is_finished() {
                debug!("Reconciliation already running for {}", address.short());
                return Ok(());
            }
        }
        if let Some(previous) = slot.take() {
            previous.handle.abort();
            debug!("Cancelled reconciliation for {}", previous.address.short());
        }

        let generation = self.shared.reset();
        let shared = Arc::clone(&self.shared);
        let period = self.config.interval();
        let handle = tokio::spawn(async move {
            Self::reconcile_loop(shared, address, generation, period).await;
        });

        *slot = Some(RunningLoop { address, handle });
        info!(
            "Reconciliation started for {} (interval: {}ms)",
            address.short(),
            self.config.interval_ms
        );
        Ok(())
    }

    /// Stop reconciling and clear the snapshot
    pub async fn stop(&self) -> Result<()> {
        if let Some(running) = self.service_handle.write().await.take() {
            running.handle.abort();
            self.shared.reset();
            info!("Reconciliation stopped for {}", running.address.short());
        }
        Ok(())
    }

    /// Check if a loop is running
    pub async fn is_running(&self) -> bool {
        self.service_handle
            .read()
            .await
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    /// Address currently being reconciled
    pub async fn running_for(&self) -> Option<Address> {
        self.service_handle.read().await.as_ref().map(|r| r.address)
    }

    /// Refresh `address` now
    ///
    /// Publishes only if `address` is the one being reconciled; otherwise
    /// the fresh state is returned without touching the snapshot.
    pub async fn reconcile_once(&self, address: &Address) -> std::result::Result<DisplayState, SyncFailure> {
        let generation = {
            let slot = self.service_handle.read().await;
            match slot.as_ref() {
                Some(running) if running.address == *address => {
                    Some(self.shared.generation.load(Ordering::SeqCst))
                }
                _ => None,
            }
        };

        match generation {
            Some(generation) => self.shared.refresh(address, generation).await,
            None => self.shared.fetch(address).await,
        }
    }

    /// Track the active address: restart on change, stop when cleared
    ///
    /// The returned task ends, stopping reconciliation, once every
    /// `ActiveAddress` handle is dropped.
    pub fn follow(self: &Arc<Self>, active: &ActiveAddress) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut rx = active.subscribe();

        tokio::spawn(async move {
            loop {
                let current = *rx.borrow_and_update();
                let result = match current {
                    Some(address) => service.start(address).await,
                    None => service.stop().await,
                };
                if let Err(e) = result {
                    error!("Failed to follow active address: {}", e);
                }

                if rx.changed().await.is_err() {
                    break;
                }
            }

            if let Err(e) = service.stop().await {
                error!("Failed to stop reconciliation: {}", e);
            }
            debug!("Active address context closed");
        })
    }

    /// Main reconciliation loop
    async fn reconcile_loop(shared: Arc<Shared>, address: Address, generation: u64, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut consecutive_failures: u32 = 0;

        debug!("Reconciliation loop started for {}", address.short());

        loop {
            ticker.tick().await;

            match shared.refresh(&address, generation).await {
                Ok(_) => {
                    if consecutive_failures > 0 {
                        info!(
                            "Reconciliation for {} recovered after {} failed ticks",
                            address.short(),
                            consecutive_failures
                        );
                    }
                    consecutive_failures = 0;
                }
                Err(failure) => {
                    consecutive_failures += 1;
                    if failure.is_total() {
                        error!("Error during reconciliation: {}", failure);
                    } else {
                        warn!("Partial reconciliation failure: {}", failure);
                    }
                }
            }
        }
    }
}

impl Drop for ReconciliationService {
    fn drop(&mut self) {
        if let Some(running) = self.service_handle.get_mut().take() {
            running.handle.abort();
        }
    }
}
