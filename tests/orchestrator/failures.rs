use tokio_util::sync::CancellationToken;

use super::machine_harness::Rig;
use tollgate::TollgateError;
use tollgate::orchestrator::{TaskEvent, TaskState};

#[tokio::test]
async fn missing_manifest_fails_the_task() {
    let rig = Rig::new("0.001").await;
    let mut events = rig.orchestrator.subscribe();

    // The lock machine serves no manifest for its printer.
    let err = rig
        .orchestrator
        .run("print model_01", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TollgateError::CatalogUnavailable { .. }));
    assert_eq!(rig.orchestrator.state(), TaskState::Error);

    let current = rig.orchestrator.current().unwrap();
    assert_eq!(current.state, TaskState::Error);
    assert!(current.error.is_some());
    assert_eq!(current.device.unwrap().id, "printer_01");

    let history = rig.orchestrator.history().entries();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].state, TaskState::Error);
    assert_eq!(history[0].device.as_deref(), Some("printer_01"));

    let mut failed = false;
    while let Ok(event) = events.try_recv() {
        failed |= matches!(event, TaskEvent::Failed { .. });
    }
    assert!(failed);
    assert_eq!(rig.wallet.sent(), 0);
}

#[tokio::test]
async fn a_failed_task_does_not_block_the_next_one() {
    let rig = Rig::new("0.001").await;
    let cancel = CancellationToken::new();
    rig.orchestrator
        .run("print model_01", &cancel)
        .await
        .unwrap_err();

    let record = rig
        .orchestrator
        .run("unlock smart_lock_01", &cancel)
        .await
        .unwrap();
    assert_eq!(record.state, TaskState::Quote);
}
