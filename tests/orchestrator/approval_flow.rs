use tokio_util::sync::CancellationToken;

use super::machine_harness::{LOCK_ID, Rig, TX_HASH, amount};
use tollgate::TollgateError;
use tollgate::orchestrator::{AutoApprove, AutoDenyApprover, TaskState};

#[tokio::test]
async fn attended_run_stops_at_quote_with_terms() {
    let rig = Rig::new("0.001").await;
    let cancel = CancellationToken::new();

    let record = rig
        .orchestrator
        .run("unlock smart_lock_01", &cancel)
        .await
        .unwrap();

    assert_eq!(record.state, TaskState::Quote);
    assert_eq!(rig.orchestrator.state(), TaskState::Quote);
    let details = record.payment_details.expect("quote carries payment details");
    assert_eq!(details.amount.to_string(), "0.001");
    assert_eq!(details.chain_id, 84532);
    assert_eq!(record.device.unwrap().id, LOCK_ID);
    assert_eq!(rig.wallet.sent(), 0);
    assert!(rig.orchestrator.history().is_empty());
}

#[tokio::test]
async fn authorizing_a_quote_pays_once_and_succeeds() {
    let rig = Rig::new("0.001").await;
    let cancel = CancellationToken::new();
    rig.orchestrator
        .run("unlock smart_lock_01", &cancel)
        .await
        .unwrap();

    let record = rig.orchestrator.authorize(&cancel).await.unwrap();

    assert_eq!(record.state, TaskState::Success);
    assert_eq!(record.tx_hash.as_deref(), Some(TX_HASH));
    assert_eq!(record.result_data.unwrap()["status"], "unlocked");
    assert_eq!(rig.wallet.sent(), 1);
    assert_eq!(
        rig.machine
            .hits(&format!("/devices/{LOCK_ID}/unlock"))
            .await,
        2
    );
    // Human-approved payments sit outside the autonomous budget.
    assert_eq!(rig.policy.state().daily_spent, amount("0"));

    let history = rig.orchestrator.history().entries();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, TaskState::Success);
    assert_eq!(history[0].tx_hash.as_deref(), Some(TX_HASH));
}

#[tokio::test]
async fn declining_a_quote_ends_in_error() {
    let rig = Rig::new("0.001").await;
    let cancel = CancellationToken::new();
    rig.orchestrator
        .run("unlock smart_lock_01", &cancel)
        .await
        .unwrap();

    let err = rig.orchestrator.decline("too expensive").unwrap_err();

    assert!(matches!(err, TollgateError::AuthorizationDenied(ref r) if r == "too expensive"));
    assert_eq!(rig.orchestrator.state(), TaskState::Error);
    assert_eq!(rig.wallet.sent(), 0);
    let history = rig.orchestrator.history().entries();
    assert_eq!(history[0].state, TaskState::Error);
    assert!(history[0].error.as_deref().unwrap().contains("too expensive"));
}

#[tokio::test]
async fn authorize_without_quote_is_rejected() {
    let rig = Rig::new("0.001").await;
    let err = rig
        .orchestrator
        .authorize(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::NoPendingQuote));
}

#[tokio::test]
async fn approver_decides_the_quote() {
    let cancel = CancellationToken::new();

    let approved = Rig::new("0.001").await;
    let record = approved
        .orchestrator
        .run_with_approval("unlock smart_lock_01", &AutoApprove, &cancel)
        .await
        .unwrap();
    assert_eq!(record.state, TaskState::Success);
    assert_eq!(approved.wallet.sent(), 1);

    let denied = Rig::new("0.001").await;
    let deny = AutoDenyApprover {
        reason: "no terminal".into(),
    };
    let err = denied
        .orchestrator
        .run_with_approval("unlock smart_lock_01", &deny, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, TollgateError::AuthorizationDenied(_)));
    assert_eq!(denied.wallet.sent(), 0);
}

#[tokio::test]
async fn reset_discards_the_pending_quote() {
    let rig = Rig::new("0.001").await;
    let cancel = CancellationToken::new();
    rig.orchestrator
        .run("unlock smart_lock_01", &cancel)
        .await
        .unwrap();

    rig.orchestrator.reset();

    assert_eq!(rig.orchestrator.state(), TaskState::Idle);
    assert!(rig.orchestrator.current().is_none());
    assert!(matches!(
        rig.orchestrator.authorize(&cancel).await,
        Err(TollgateError::NoPendingQuote)
    ));
}
