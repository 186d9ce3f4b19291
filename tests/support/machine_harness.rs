#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tollgate::config::{MachineConfig, ResolverConfig};
use tollgate::core::Amount;
use tollgate::discovery::{MachineClient, MachineDirectory, MachineEntry, NameResolver};
use tollgate::error::WalletError;
use tollgate::intent::KeywordIntentParser;
use tollgate::orchestrator::{TaskHistory, TaskOrchestrator};
use tollgate::payment::wallet::WalletFuture;
use tollgate::payment::{ConfirmationWatcher, PaymentGateway, PaymentSigner, SpendPolicy};
use tollgate::storage::{KeyValueStore, MemoryStore};

pub const TX_HASH: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
pub const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";
pub const LOCK_ID: &str = "smart_lock_01";

/// Wallet double that records transfers and confirms after an optional delay.
#[derive(Default)]
pub struct FakeWallet {
    pub sent: AtomicUsize,
    pub confirmed: AtomicUsize,
    pub confirm_delay: Option<Duration>,
}

impl FakeWallet {
    pub fn slow(delay: Duration) -> Self {
        Self {
            confirm_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

impl PaymentSigner for FakeWallet {
    fn send_transaction<'a>(&'a self, _to: &'a str, _amount: Amount) -> WalletFuture<'a, String> {
        Box::pin(async move {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(TX_HASH.to_string())
        })
    }
}

impl ConfirmationWatcher for FakeWallet {
    fn wait_for_confirmation<'a>(&'a self, _tx_hash: &'a str) -> WalletFuture<'a, ()> {
        Box::pin(async move {
            if let Some(delay) = self.confirm_delay {
                tokio::time::sleep(delay).await;
            }
            self.confirmed.fetch_add(1, Ordering::SeqCst);
            Ok::<_, WalletError>(())
        })
    }
}

pub fn amount(raw: &str) -> Amount {
    Amount::parse(raw).unwrap()
}

pub fn lock_devices() -> Value {
    json!([
        {
            "id": LOCK_ID,
            "name": "Front Door",
            "type": "smart_lock",
            "status": "locked",
            "telemetry": {"battery": 91}
        },
        {
            "id": "printer_01",
            "name": "Workshop Printer",
            "type": "3d_printer",
            "status": "idle",
            "telemetry": {}
        }
    ])
}

pub fn lock_manifest(price: &str) -> Value {
    json!({
        "name": "Smart Lock",
        "version": "1.0.0",
        "capabilities": [
            {
                "id": "unlock_device",
                "endpoint": "unlock",
                "method": "POST",
                "description": "Unlock the door",
                "payment_required": true,
                "default_amount_eth": price
            },
            {
                "id": "lock_device",
                "endpoint": "lock",
                "method": "POST",
                "payment_required": false
            }
        ]
    })
}

pub fn payment_required_body(price: &str) -> Value {
    json!({
        "detail": {
            "error": "Payment Required",
            "paymentDetails": {
                "chainId": 84532,
                "chainName": "Base Sepolia",
                "token": "ETH",
                "recipient": RECIPIENT,
                "amount": price,
                "description": "Unlock Front Door"
            }
        }
    })
}

/// A machine that lists one smart lock, resolves `smartlock.eth` to
/// itself and charges `price` to unlock.
pub struct LockMachine {
    pub server: MockServer,
}

impl LockMachine {
    pub async fn start(price: &str) -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lock_devices()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/devices/{LOCK_ID}/ai-manifest")))
            .respond_with(ResponseTemplate::new(200).set_body_json(lock_manifest(price)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/resolve/smartlock"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": server.uri(),
                "payment_address": RECIPIENT,
                "device_id": LOCK_ID,
                "device_name": LOCK_ID,
                "ens_domain": "smartlock.eth"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/devices/{LOCK_ID}/unlock")))
            .and(header("authorization", format!("Bearer {TX_HASH}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "unlocked",
                "device_id": LOCK_ID
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/devices/{LOCK_ID}/unlock")))
            .respond_with(ResponseTemplate::new(402).set_body_json(payment_required_body(price)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/devices/{LOCK_ID}/lock")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "locked"})))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn machine_config(&self) -> MachineConfig {
        MachineConfig {
            default_url: self.uri(),
            request_timeout_secs: 5,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            url: Some(self.uri()),
            ..ResolverConfig::default()
        }
    }

    pub fn directory(&self) -> MachineDirectory {
        MachineDirectory::new(vec![MachineEntry {
            id: "smart-lock".into(),
            name: "Smart Lock".into(),
            description: String::new(),
            device_type: Some("smart_lock".into()),
            name_domain: Some("smartlock.eth".into()),
            url: None,
            device_id: None,
        }])
    }

    /// Requests the machine received at `route`.
    pub async fn hits(&self, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == route)
            .count()
    }
}

pub struct Rig {
    pub machine: LockMachine,
    pub wallet: Arc<FakeWallet>,
    pub policy: Arc<SpendPolicy>,
    pub store: Arc<dyn KeyValueStore>,
    pub orchestrator: TaskOrchestrator,
}

impl Rig {
    pub async fn new(price: &str) -> Self {
        Self::with_wallet(price, FakeWallet::default()).await
    }

    pub async fn with_wallet(price: &str, wallet: FakeWallet) -> Self {
        let machine = LockMachine::start(price).await;
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let policy = Arc::new(SpendPolicy::in_memory(amount("0.1")));
        let wallet = Arc::new(wallet);
        let client = MachineClient::new(Duration::from_secs(5));

        let gateway = PaymentGateway::new(
            client.clone(),
            Arc::clone(&policy),
            wallet.clone(),
            wallet.clone(),
        );
        let resolver = NameResolver::new(
            client.clone(),
            &machine.machine_config(),
            &machine.resolver_config(),
        );
        let history = TaskHistory::load(Arc::clone(&store), 10).unwrap();
        let orchestrator = TaskOrchestrator::new(
            Arc::new(KeywordIntentParser),
            machine.directory(),
            resolver,
            client,
            gateway,
            history,
        );

        Self {
            machine,
            wallet,
            policy,
            store,
            orchestrator,
        }
    }
}
