use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::machine_harness::{FakeWallet, LOCK_ID, LockMachine, RECIPIENT, TX_HASH, amount};
use tollgate::core::{Capability, Machine};
use tollgate::discovery::{CapabilityCatalog, MachineClient};
use tollgate::payment::{ExecutionOutcome, GatewayPhase, PaymentGateway, PaymentMode, SpendPolicy};

struct Setup {
    machine: LockMachine,
    wallet: Arc<FakeWallet>,
    policy: Arc<SpendPolicy>,
    gateway: PaymentGateway,
    target: Machine,
    capabilities: Vec<Capability>,
    params: Map<String, Value>,
}

async fn setup(price: &str) -> Setup {
    let machine = LockMachine::start(price).await;
    let client = MachineClient::new(Duration::from_secs(5));
    let wallet = Arc::new(FakeWallet::default());
    let policy = Arc::new(SpendPolicy::in_memory(amount("0.1")));
    let gateway = PaymentGateway::new(client.clone(), Arc::clone(&policy), wallet.clone(), wallet.clone());
    let capabilities = CapabilityCatalog::new(client)
        .get_capabilities(&machine.uri(), Some(LOCK_ID))
        .await
        .unwrap();

    let target = Machine {
        logical_id: "smart-lock".into(),
        display_name: "Smart Lock".into(),
        base_url: machine.uri(),
        payment_address: RECIPIENT.into(),
        device_id: LOCK_ID.into(),
        device_name: LOCK_ID.into(),
        name_domain: None,
    };
    let mut params = Map::new();
    params.insert("device_id".into(), Value::String(LOCK_ID.into()));

    Setup {
        machine,
        wallet,
        policy,
        gateway,
        target,
        capabilities,
        params,
    }
}

fn capability<'a>(setup: &'a Setup, id: &str) -> &'a Capability {
    setup.capabilities.iter().find(|c| c.id == id).unwrap()
}

#[tokio::test]
async fn autonomous_handshake_pays_exactly_once() {
    let s = setup("0.001").await;
    s.policy.enable(amount("0.01")).unwrap();
    let mut phases = s.gateway.subscribe();

    let outcome = s
        .gateway
        .execute(
            &s.target,
            capability(&s, "unlock_device"),
            &s.params,
            PaymentMode::Autonomous,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let ExecutionOutcome::Completed(execution) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(execution.tx_hash.as_deref(), Some(TX_HASH));
    assert_eq!(execution.paid, Some(amount("0.001")));
    assert_eq!(s.wallet.sent(), 1);
    assert_eq!(s.machine.hits(&format!("/devices/{LOCK_ID}/unlock")).await, 2);
    assert_eq!(s.policy.remaining(), amount("0.009"));
    assert_eq!(*phases.borrow_and_update(), GatewayPhase::Success);
}

#[tokio::test]
async fn free_capability_needs_no_payment() {
    let s = setup("0.001").await;

    let outcome = s
        .gateway
        .execute(
            &s.target,
            capability(&s, "lock_device"),
            &s.params,
            PaymentMode::Autonomous,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let ExecutionOutcome::Completed(execution) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(execution.data["status"], "locked");
    assert!(execution.tx_hash.is_none());
    assert_eq!(s.wallet.sent(), 0);
}

#[tokio::test]
async fn quote_over_budget_is_surfaced_not_paid() {
    let s = setup("0.5").await;
    s.policy.enable(amount("0.1")).unwrap();

    let outcome = s
        .gateway
        .execute(
            &s.target,
            capability(&s, "unlock_device"),
            &s.params,
            PaymentMode::Autonomous,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let ExecutionOutcome::PaymentRequired(details) = outcome else {
        panic!("expected a quote");
    };
    assert_eq!(details.amount, amount("0.5"));
    assert_eq!(details.recipient_address, RECIPIENT);
    assert_eq!(s.wallet.sent(), 0);
    assert_eq!(s.policy.state().daily_spent, amount("0"));
    assert_eq!(s.gateway.phase(), GatewayPhase::PaymentRequired);
}
