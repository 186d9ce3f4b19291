use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::machine_harness::{LOCK_ID, LockMachine, RECIPIENT};
use tollgate::config::{MachineConfig, ResolverConfig};
use tollgate::discovery::{MachineClient, MachineDirectory, MachineEntry, NameResolver};

fn entry(domain: &str, url: Option<&str>) -> MachineEntry {
    MachineEntry {
        id: "smart-lock".into(),
        name: "Smart Lock".into(),
        description: String::new(),
        device_type: Some("smart_lock".into()),
        name_domain: Some(domain.into()),
        url: url.map(Into::into),
        device_id: None,
    }
}

fn resolver(machine_url: &str, resolver_url: &str, timeout_secs: u64) -> NameResolver {
    NameResolver::new(
        MachineClient::new(Duration::from_secs(5)),
        &MachineConfig {
            default_url: machine_url.into(),
            request_timeout_secs: 5,
        },
        &ResolverConfig {
            url: Some(resolver_url.into()),
            timeout_secs,
            ..ResolverConfig::default()
        },
    )
}

#[tokio::test]
async fn resolved_name_supplies_address_and_device() {
    let machine = LockMachine::start("0.001").await;
    let resolver = resolver(&machine.uri(), &machine.uri(), 5);

    let resolution = resolver.resolve(&entry("smartlock.eth", None)).await;

    assert!(!resolution.degraded);
    assert!(resolution.reason.is_none());
    assert_eq!(resolution.machine.base_url, machine.uri());
    assert_eq!(resolution.machine.payment_address, RECIPIENT);
    assert_eq!(resolution.machine.device_id, LOCK_ID);
    assert_eq!(resolution.machine.name_domain.as_deref(), Some("smartlock.eth"));
}

#[tokio::test]
async fn slow_resolver_falls_back_to_literal_url() {
    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/resolve/smartlock"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(4)))
        .mount(&slow)
        .await;
    let resolver = resolver("http://127.0.0.1:9", &slow.uri(), 1);

    let started = std::time::Instant::now();
    let resolution = resolver
        .resolve(&entry("smartlock.eth", Some("http://192.168.1.50:8000")))
        .await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(resolution.degraded);
    let reason = resolution.reason.unwrap();
    assert!(reason.starts_with("name resolution degraded:"), "{reason}");
    assert!(reason.contains("smartlock.eth"), "{reason}");
    assert_eq!(resolution.machine.base_url, "http://192.168.1.50:8000");
    assert_eq!(
        resolution.machine.payment_address,
        ResolverConfig::default().default_payment_address
    );
}

#[tokio::test]
async fn failed_resolver_matches_device_from_listing() {
    let machine = LockMachine::start("0.001").await;
    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    let resolver = resolver(&machine.uri(), &broken.uri(), 5);

    let resolution = resolver.resolve(&entry("smart_lock_01.eth", None)).await;

    assert!(resolution.degraded);
    assert_eq!(resolution.machine.base_url, machine.uri());
    assert_eq!(resolution.machine.device_id, LOCK_ID);
}

#[tokio::test]
async fn unreachable_everything_uses_local_defaults() {
    let resolver = resolver("http://127.0.0.1:9", "http://127.0.0.1:9", 1);

    let resolution = resolver.resolve(&entry("frontdoor.eth", None)).await;

    assert!(resolution.degraded);
    assert_eq!(resolution.machine.base_url, "http://127.0.0.1:9");
    assert_eq!(resolution.machine.device_id, "frontdoor");
    assert!(resolution.reason.unwrap().contains("local defaults"));
}

#[tokio::test]
async fn resolve_id_accepts_bare_domains() {
    let machine = LockMachine::start("0.001").await;
    let resolver = resolver(&machine.uri(), &machine.uri(), 5);
    let directory = MachineDirectory::new(Vec::new());

    let resolution = resolver.resolve_id(&directory, "smartlock.eth").await;

    assert!(!resolution.degraded);
    assert_eq!(resolution.machine.device_id, LOCK_ID);
}
