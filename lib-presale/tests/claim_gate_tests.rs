//! Claim gate integration tests
//!
//! Eligibility is decided by the ledger alone, the claim is one-shot, and
//! ledger rejections reach the caller untouched.

use lib_ledger::{InMemoryLedger, LedgerAdapter, LedgerError, ReadKind};
use lib_presale::{
    AdminAuthority, AdminPanel, AdminSession, ClaimPhase, ErrorClass, PresaleError, PresaleSession,
};
use lib_records::{KvRecordStore, MemoryBackend, RecordStore};
use lib_types::{Address, PackageId, REFERRAL_REWARD};
use std::sync::Arc;
use std::time::Duration;

const OWNER: Address = Address::new([0xEE; 20]);

fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}

struct Fixture {
    ledger: Arc<InMemoryLedger>,
    store: Arc<dyn RecordStore>,
    session: PresaleSession,
}

fn fixture() -> Fixture {
    let ledger = Arc::new(InMemoryLedger::new(OWNER));
    let store: Arc<dyn RecordStore> = Arc::new(KvRecordStore::new(MemoryBackend::new()));
    let session = PresaleSession::new(store.clone(), ledger.clone(), REFERRAL_REWARD);
    Fixture {
        ledger,
        store,
        session,
    }
}

#[tokio::test]
async fn can_claim_follows_ledger_flags_only() {
    let f = fixture();
    let user = addr(1);
    f.session.purchase(&user, PackageId::Basic, None).await.unwrap();

    // advisory flags all say yes; the ledger says no
    let advisory = AdminPanel::new(f.store.clone(), f.ledger.clone(), AdminAuthority::Advisory);
    let admin = AdminSession::new("ops");
    advisory.set_global_claim(&admin, true).await.unwrap();
    advisory.set_user_claim(&admin, &user, true).await.unwrap();
    assert!(!f.session.gate().can_claim(&user).await.unwrap());

    // and the reverse: advisory off, ledger open
    advisory.set_global_claim(&admin, false).await.unwrap();
    advisory.set_user_claim(&admin, &user, false).await.unwrap();
    f.ledger.set_global_claim_status(&OWNER, true).await.unwrap();
    assert!(f.session.gate().can_claim(&user).await.unwrap());
}

#[tokio::test]
async fn phases_cover_the_flag_table() {
    let f = fixture();
    let user = addr(1);
    let gate = f.session.gate();

    assert_eq!(gate.authorize(&user).await.unwrap().phase(), ClaimPhase::NotEligible);

    f.ledger.set_global_claim_status(&OWNER, true).await.unwrap();
    assert_eq!(gate.authorize(&user).await.unwrap().phase(), ClaimPhase::Eligible);

    f.ledger.claim(&user).await.unwrap();
    assert_eq!(gate.authorize(&user).await.unwrap().phase(), ClaimPhase::Claimed);

    f.ledger.set_global_claim_status(&OWNER, false).await.unwrap();
    assert_eq!(gate.authorize(&user).await.unwrap().phase(), ClaimPhase::Claimed);
}

#[tokio::test]
async fn second_claim_is_rejected_without_a_ledger_write() {
    let f = fixture();
    let user = addr(1);
    f.session.purchase(&user, PackageId::Premium, None).await.unwrap();
    f.ledger.set_global_claim_status(&OWNER, true).await.unwrap();

    let confirmation = f.session.claim(&user).await.unwrap();
    assert!(confirmation.record_updated);
    let record = f.store.get_record(&user).await.unwrap().unwrap();
    assert_eq!(record.claim_tx_hash, Some(confirmation.receipt.tx_hash));
    assert!(record.claimed_at.is_some());

    let writes = f.ledger.writes_submitted();
    let err = f.session.claim(&user).await.unwrap_err();
    assert!(matches!(err, PresaleError::AlreadyClaimed));
    assert_eq!(err.class(), ErrorClass::NotEligible);
    assert_eq!(f.ledger.writes_submitted(), writes);
}

#[tokio::test]
async fn closed_claim_is_rejected_without_a_ledger_write() {
    let f = fixture();
    let user = addr(1);
    f.session.purchase(&user, PackageId::Basic, None).await.unwrap();
    let writes = f.ledger.writes_submitted();

    let err = f.session.claim(&user).await.unwrap_err();
    assert!(matches!(err, PresaleError::ClaimNotOpen));
    assert_eq!(f.ledger.writes_submitted(), writes);
}

#[tokio::test]
async fn ledger_revert_is_surfaced_verbatim_and_not_retried() {
    let f = fixture();
    let user = addr(1);
    f.session.purchase(&user, PackageId::Basic, None).await.unwrap();
    f.ledger.set_global_claim_status(&OWNER, true).await.unwrap();

    let writes = f.ledger.writes_submitted();
    f.ledger.revert_next_write("execution reverted: paused");
    let err = f.session.claim(&user).await.unwrap_err();

    match err {
        PresaleError::Ledger(e) => assert_eq!(e, LedgerError::reverted("execution reverted: paused")),
        other => panic!("expected ledger error, got {:?}", other),
    }
    assert_eq!(f.ledger.writes_submitted(), writes + 1);
    assert!(f.store.get_record(&user).await.unwrap().unwrap().claim_tx_hash.is_none());

    // nothing was remembered; the user may try again
    assert!(!f.session.gate().has_confirmed(&user));
    f.session.claim(&user).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_settle_on_the_ledger() {
    let f = fixture();
    let user = addr(1);
    f.session.purchase(&user, PackageId::Basic, None).await.unwrap();
    f.ledger.set_global_claim_status(&OWNER, true).await.unwrap();
    f.ledger.set_confirmation_delay(Some(Duration::from_millis(20)));

    let gate = f.session.gate().clone();
    let first = gate.authorize(&user).await.unwrap();
    let second = gate.authorize(&user).await.unwrap();

    let (a, b) = tokio::join!(gate.submit(first), gate.submit(second));
    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let failure = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
    assert!(matches!(
        failure,
        PresaleError::Ledger(LedgerError::Reverted { .. }) | PresaleError::AlreadyClaimed
    ));
    assert!(f.ledger.claim_status(&user).await.unwrap());
}

#[tokio::test]
async fn failed_eligibility_read_is_transient_not_a_wallet_problem() {
    let f = fixture();
    let user = addr(1);
    f.session.purchase(&user, PackageId::Basic, None).await.unwrap();
    f.ledger.set_global_claim_status(&OWNER, true).await.unwrap();
    let writes = f.ledger.writes_submitted();

    f.ledger.fail_read(ReadKind::ClaimStatus);
    let err = f.session.claim(&user).await.unwrap_err();
    assert!(matches!(err, PresaleError::Ledger(LedgerError::Transport(_))));
    assert_eq!(err.class(), ErrorClass::TransientRead);
    assert_eq!(f.ledger.writes_submitted(), writes);

    f.ledger.heal_reads();
    f.session.claim(&user).await.unwrap();
}
