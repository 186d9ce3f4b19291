use tokio_util::sync::CancellationToken;

use super::machine_harness::{LOCK_ID, Rig, TX_HASH, amount};
use tollgate::orchestrator::{TaskEvent, TaskState};

#[tokio::test]
async fn autonomous_run_publishes_progress_in_order() {
    let rig = Rig::new("0.001").await;
    rig.policy.enable(amount("0.1")).unwrap();
    let mut events = rig.orchestrator.subscribe();
    let mut states = rig.orchestrator.watch_state();

    let record = rig
        .orchestrator
        .run("unlock smart_lock_01", &CancellationToken::new())
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    for event in &seen {
        let task_id = match event {
            TaskEvent::StateChanged { task_id, .. }
            | TaskEvent::MachineResolved { task_id, .. }
            | TaskEvent::DeviceSelected { task_id, .. }
            | TaskEvent::CapabilitySelected { task_id, .. }
            | TaskEvent::QuoteIssued { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Chat { task_id, .. } => task_id,
        };
        assert_eq!(task_id, &record.id);
    }

    let transitions: Vec<TaskState> = seen
        .iter()
        .filter_map(|e| match e {
            TaskEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![TaskState::Scanning, TaskState::Executing, TaskState::Success]
    );

    let resolved = seen
        .iter()
        .position(|e| matches!(e, TaskEvent::MachineResolved { degraded: false, .. }))
        .unwrap();
    let device = seen
        .iter()
        .position(|e| matches!(e, TaskEvent::DeviceSelected { device_id, .. } if device_id == LOCK_ID))
        .unwrap();
    let capability = seen
        .iter()
        .position(|e| {
            matches!(e, TaskEvent::CapabilitySelected { capability_id, payment_required: true, .. } if capability_id == "unlock_device")
        })
        .unwrap();
    let completed = seen
        .iter()
        .position(|e| matches!(e, TaskEvent::Completed { tx_hash: Some(tx), .. } if tx == TX_HASH))
        .unwrap();
    assert!(resolved < device && device < capability && capability < completed);

    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), TaskState::Success);
}

#[tokio::test]
async fn attended_run_announces_the_quote() {
    let rig = Rig::new("0.002").await;
    let mut events = rig.orchestrator.subscribe();

    rig.orchestrator
        .run("open the front door lock smart_lock_01", &CancellationToken::new())
        .await
        .unwrap();

    let mut quote = None;
    while let Ok(event) = events.try_recv() {
        if let TaskEvent::QuoteIssued { details, .. } = event {
            quote = Some(details);
        }
    }
    let quote = quote.expect("quote event");
    assert_eq!(quote.amount, amount("0.002"));
    assert_eq!(quote.chain_name, "Base Sepolia");
}
