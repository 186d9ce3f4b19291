use tokio_util::sync::CancellationToken;

use super::machine_harness::{LOCK_ID, Rig, TX_HASH, amount};
use tollgate::orchestrator::TaskState;

#[tokio::test]
async fn enabled_policy_pays_without_asking() {
    let rig = Rig::new("0.001").await;
    rig.policy.enable(amount("0.1")).unwrap();

    let record = rig
        .orchestrator
        .run("unlock smart_lock_01", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.state, TaskState::Success);
    assert_eq!(record.tx_hash.as_deref(), Some(TX_HASH));
    assert_eq!(rig.wallet.sent(), 1);
    assert_eq!(rig.policy.state().daily_spent, amount("0.001"));
    assert_eq!(rig.policy.remaining(), amount("0.099"));
    assert_eq!(
        rig.machine
            .hits(&format!("/devices/{LOCK_ID}/unlock"))
            .await,
        2
    );
}

#[tokio::test]
async fn quote_above_remaining_budget_asks_a_human() {
    let rig = Rig::new("0.001").await;
    rig.policy.enable(amount("0.0005")).unwrap();

    let record = rig
        .orchestrator
        .run("unlock smart_lock_01", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.state, TaskState::Quote);
    assert_eq!(rig.wallet.sent(), 0);
    assert_eq!(rig.policy.state().daily_spent, amount("0"));
}

#[tokio::test]
async fn attended_only_asks_even_when_enabled() {
    let rig = Rig::new("0.001").await;
    rig.policy.enable(amount("0.1")).unwrap();
    let orchestrator = rig.orchestrator.attended_only(true);

    let record = orchestrator
        .run("unlock smart_lock_01", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.state, TaskState::Quote);
    assert_eq!(rig.wallet.sent(), 0);
}

#[tokio::test]
async fn chat_ends_idle_without_history() {
    let rig = Rig::new("0.001").await;

    let record = rig
        .orchestrator
        .run("hello, what can you do?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.state, TaskState::Idle);
    assert!(record.message.is_some());
    assert_eq!(rig.orchestrator.state(), TaskState::Idle);
    assert!(rig.orchestrator.history().is_empty());
    assert_eq!(rig.machine.hits("/status").await, 0);
}
