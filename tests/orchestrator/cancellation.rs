use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::machine_harness::{FakeWallet, Rig, amount};
use tollgate::TollgateError;
use tollgate::orchestrator::TaskState;

#[tokio::test]
async fn cancel_while_confirming_keeps_committed_spend() {
    let rig = Rig::with_wallet("0.001", FakeWallet::slow(Duration::from_secs(5))).await;
    rig.policy.enable(amount("0.1")).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let err = rig
        .orchestrator
        .run("unlock smart_lock_01", &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, TollgateError::Cancelled));
    assert_eq!(rig.orchestrator.state(), TaskState::Idle);
    assert!(rig.orchestrator.current().is_none());
    assert_eq!(rig.wallet.sent(), 1);
    // The transfer was submitted, so it counts.
    assert_eq!(rig.policy.state().daily_spent, amount("0.001"));

    let history = rig.orchestrator.history().entries();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, TaskState::Error);
}

#[tokio::test]
async fn second_run_while_busy_is_refused() {
    let rig = Rig::with_wallet("0.001", FakeWallet::slow(Duration::from_millis(200))).await;
    rig.policy.enable(amount("0.1")).unwrap();
    let cancel = CancellationToken::new();

    let (first, second) = tokio::join!(
        rig.orchestrator.run("unlock smart_lock_01", &cancel),
        rig.orchestrator.run("unlock smart_lock_01", &cancel),
    );

    let (done, refused) = match (first, second) {
        (Ok(done), Err(refused)) | (Err(refused), Ok(done)) => (done, refused),
        other => panic!("expected one run to be refused, got {other:?}"),
    };
    assert_eq!(done.state, TaskState::Success);
    assert!(matches!(refused, TollgateError::TaskInProgress));
    assert_eq!(rig.wallet.sent(), 1);
}

#[tokio::test]
async fn reset_aborts_an_in_flight_run() {
    let rig = Rig::with_wallet("0.001", FakeWallet::slow(Duration::from_secs(5))).await;
    rig.policy.enable(amount("0.1")).unwrap();
    let cancel = CancellationToken::new();

    let run = rig.orchestrator.run("unlock smart_lock_01", &cancel);
    let reset = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        rig.orchestrator.reset();
    };
    let (result, ()) = tokio::join!(run, reset);

    assert!(matches!(result, Err(TollgateError::Cancelled)));
    assert_eq!(rig.orchestrator.state(), TaskState::Idle);
    assert!(!cancel.is_cancelled());
}
