//! Reconciliation service integration tests
//!
//! The loop ticks immediately, survives failed reads without losing the
//! last good snapshot, and stops polling as soon as its address goes away.

use async_trait::async_trait;
use lib_ledger::{InMemoryLedger, LedgerAdapter, ReadKind};
use lib_presale::{ActiveAddress, ReconciliationConfig, ReconciliationService, SyncField, SyncNotice};
use lib_records::{
    CreateOutcome, GlobalClaimConfig, KvRecordStore, MemoryBackend, RecordResult, RecordStore,
    RecordUpdate, SortDirection, SortField, StorageError, UserRecord,
};
use lib_types::{package, Address, PackageId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

// ============================================================================
// Test Utilities
// ============================================================================

const OWNER: Address = Address::new([0xEE; 20]);
const WAIT: Duration = Duration::from_secs(5);

fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

/// Record store that counts lookups and can be told to fail them
struct CountingStore {
    inner: KvRecordStore<MemoryBackend>,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: KvRecordStore::new(MemoryBackend::new()),
            lookups: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn get_record(&self, address: &Address) -> RecordResult<Option<UserRecord>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::engine("get", "store offline").into());
        }
        self.inner.get_record(address).await
    }

    async fn create_record(&self, record: UserRecord) -> RecordResult<CreateOutcome> {
        self.inner.create_record(record).await
    }

    async fn update_record(&self, address: &Address, update: &RecordUpdate) -> RecordResult<UserRecord> {
        self.inner.update_record(address, update).await
    }

    async fn credit_referral(&self, referrer: &Address, reward: u64) -> RecordResult<Option<UserRecord>> {
        self.inner.credit_referral(referrer, reward).await
    }

    async fn list_records(&self, field: SortField, direction: SortDirection) -> RecordResult<Vec<UserRecord>> {
        self.inner.list_records(field, direction).await
    }

    async fn global_config(&self) -> RecordResult<GlobalClaimConfig> {
        self.inner.global_config().await
    }

    async fn set_global_config(&self, claim_active: bool) -> RecordResult<GlobalClaimConfig> {
        self.inner.set_global_config(claim_active).await
    }
}

struct Fixture {
    ledger: Arc<InMemoryLedger>,
    store: Arc<CountingStore>,
    service: Arc<ReconciliationService>,
}

fn fixture(interval_ms: u64) -> Fixture {
    let ledger = Arc::new(InMemoryLedger::new(OWNER));
    let store = Arc::new(CountingStore::new());
    let config = ReconciliationConfig {
        enabled: true,
        interval_ms,
    };
    let service = Arc::new(ReconciliationService::new(ledger.clone(), store.clone(), config));
    Fixture {
        ledger,
        store,
        service,
    }
}

async fn buy(ledger: &InMemoryLedger, who: &Address, id: PackageId) {
    ledger
        .buy_package(who, id, package(id).price, None)
        .await
        .unwrap();
}

// ============================================================================
// Ticking
// ============================================================================

#[tokio::test]
async fn first_tick_is_immediate() {
    // an hour-long interval: only the initial tick can publish
    let f = fixture(3_600_000);
    buy(&f.ledger, &addr(1), PackageId::Standard).await;

    let mut rx = f.service.subscribe();
    f.service.start(addr(1)).await.unwrap();

    let state = timeout(WAIT, rx.wait_for(|s| s.is_some()))
        .await
        .expect("initial tick did not publish")
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(state.address, addr(1));
    assert_eq!(state.refill_count, 4);
    assert_eq!(state.display_balance(), "2200");
    assert!(!state.global_claim_active);

    f.service.stop().await.unwrap();
}

#[tokio::test]
async fn failed_reads_keep_previous_snapshot_and_loop_continues() {
    let f = fixture(50);
    buy(&f.ledger, &addr(1), PackageId::Basic).await;

    let mut rx = f.service.subscribe();
    let mut notices = f.service.notices();
    f.service.start(addr(1)).await.unwrap();

    let first = timeout(WAIT, rx.wait_for(|s| s.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();

    f.ledger.fail_read(ReadKind::RefillCount);
    buy(&f.ledger, &addr(1), PackageId::Standard).await;

    let notice = timeout(WAIT, notices.recv()).await.unwrap().unwrap();
    assert_eq!(
        notice,
        SyncNotice::Degraded {
            address: addr(1),
            failed: vec![SyncField::RefillCount],
        }
    );
    // the new balance is readable but must not be applied on its own
    assert_eq!(f.service.current().unwrap().token_balance, first.token_balance);
    assert!(f.service.is_running().await);

    f.ledger.heal_reads();
    let healed = timeout(
        WAIT,
        rx.wait_for(|s| s.as_ref().map(|s| s.refill_count == 4).unwrap_or(false)),
    )
    .await
    .expect("loop did not recover")
    .unwrap()
    .clone()
    .unwrap();
    assert!(healed.token_balance > first.token_balance);

    f.service.stop().await.unwrap();
}

#[tokio::test]
async fn every_read_failing_is_reported_unavailable() {
    let f = fixture(50);
    let mut notices = f.service.notices();

    f.ledger.fail_all_reads();
    f.store.set_failing(true);
    f.service.start(addr(1)).await.unwrap();

    let notice = timeout(WAIT, notices.recv()).await.unwrap().unwrap();
    assert_eq!(notice, SyncNotice::Unavailable { address: addr(1) });
    assert!(f.service.current().is_none());
    assert!(f.service.is_running().await);

    f.service.stop().await.unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn no_queries_without_an_address() {
    let f = fixture(20);
    let active = ActiveAddress::new();
    let follower = f.service.follow(&active);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(f.store.lookups(), 0);
    assert!(!f.service.is_running().await);
    assert!(f.service.current().is_none());

    drop(active);
    timeout(WAIT, follower).await.unwrap().unwrap();
}

#[tokio::test]
async fn switching_address_restarts_and_drops_the_old_snapshot() {
    let f = fixture(20);
    buy(&f.ledger, &addr(1), PackageId::Basic).await;
    buy(&f.ledger, &addr(2), PackageId::Royal).await;

    let active = ActiveAddress::new();
    let mut rx = f.service.subscribe();
    let _follower = f.service.follow(&active);

    active.set(addr(1));
    timeout(WAIT, rx.wait_for(|s| s.as_ref().map(|s| s.address == addr(1)).unwrap_or(false)))
        .await
        .unwrap()
        .unwrap();

    active.set(addr(2));
    timeout(WAIT, rx.wait_for(|s| s.as_ref().map(|s| s.address == addr(2)).unwrap_or(false)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(f.service.running_for().await, Some(addr(2)));

    // several more ticks: nothing from the old address may appear
    rx.borrow_and_update();
    for _ in 0..5 {
        if timeout(Duration::from_millis(200), rx.changed()).await.is_err() {
            break;
        }
        if let Some(state) = rx.borrow_and_update().as_ref() {
            assert_eq!(state.address, addr(2));
        }
    }

    f.service.stop().await.unwrap();
}

#[tokio::test]
async fn clearing_the_address_stops_polling() {
    let f = fixture(20);
    buy(&f.ledger, &addr(1), PackageId::Basic).await;

    let active = ActiveAddress::new();
    let mut rx = f.service.subscribe();
    let follower = f.service.follow(&active);

    active.set(addr(1));
    timeout(WAIT, rx.wait_for(|s| s.is_some())).await.unwrap().unwrap();

    active.clear();
    timeout(WAIT, rx.wait_for(|s| s.is_none())).await.unwrap().unwrap();
    assert!(!f.service.is_running().await);

    let lookups = f.store.lookups();
    sleep(Duration::from_millis(150)).await;
    assert_eq!(f.store.lookups(), lookups);
    assert!(f.service.current().is_none());

    drop(active);
    timeout(WAIT, follower).await.unwrap().unwrap();
}

#[tokio::test]
async fn dropping_the_context_ends_the_follower() {
    let f = fixture(20);
    let active = ActiveAddress::new();
    let follower = f.service.follow(&active);

    active.set(addr(1));
    timeout(WAIT, async {
        while !f.service.is_running().await {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    drop(active);
    timeout(WAIT, follower).await.unwrap().unwrap();
    assert!(!f.service.is_running().await);

    let lookups = f.store.lookups();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(f.store.lookups(), lookups);
}

#[tokio::test]
async fn reconcile_once_refreshes_the_running_address() {
    let f = fixture(3_600_000);
    let mut rx = f.service.subscribe();
    f.service.start(addr(1)).await.unwrap();
    timeout(WAIT, rx.wait_for(|s| s.is_some())).await.unwrap().unwrap();

    buy(&f.ledger, &addr(1), PackageId::Premium).await;
    let state = f.service.reconcile_once(&addr(1)).await.unwrap();
    assert_eq!(state.display_balance(), "6000");
    assert_eq!(f.service.current().unwrap().token_balance, state.token_balance);

    // another address is fetched but not published
    let other = f.service.reconcile_once(&addr(2)).await.unwrap();
    assert_eq!(other.address, addr(2));
    assert_eq!(f.service.current().unwrap().address, addr(1));

    f.service.stop().await.unwrap();
}

#[tokio::test]
async fn zero_interval_is_refused_up_front() {
    let f = fixture(0);
    let mut notices = f.service.notices();

    let err = f.service.start(addr(1)).await.unwrap_err();
    assert!(err.to_string().contains("interval_ms"));
    assert!(!f.service.is_running().await);
    assert_eq!(f.service.running_for().await, None);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(f.store.lookups(), 0);
    assert!(f.service.current().is_none());
    assert!(notices.try_recv().is_err());
}
