use std::time::Duration;

use super::machine_harness::{LOCK_ID, LockMachine};
use tollgate::TollgateError;
use tollgate::core::Action;
use tollgate::discovery::{
    CapabilityCatalog, DeviceQuery, MachineClient, find_device, find_matching_capability,
};

#[tokio::test]
async fn listed_devices_match_noisy_hints() {
    let machine = LockMachine::start("0.001").await;
    let devices = MachineClient::new(Duration::from_secs(5))
        .devices(&machine.uri())
        .await
        .unwrap();

    let by_name = DeviceQuery::new(None, Some("front door"), Some(&Action::Unlock));
    assert_eq!(find_device(&devices, &by_name).unwrap().id, LOCK_ID);

    let by_type = DeviceQuery::new(None, Some("the big one"), Some(&Action::Print));
    assert_eq!(find_device(&devices, &by_type).unwrap().id, "printer_01");

    let by_id = DeviceQuery::new(Some("printer_01"), None, Some(&Action::Unlock));
    assert_eq!(find_device(&devices, &by_id).unwrap().id, "printer_01");
}

#[tokio::test]
async fn device_manifest_yields_matching_capability() {
    let machine = LockMachine::start("0.001").await;
    let catalog = CapabilityCatalog::new(MachineClient::new(Duration::from_secs(5)));

    let capabilities = catalog
        .get_capabilities(&machine.uri(), Some(LOCK_ID))
        .await
        .unwrap();
    let unlock = find_matching_capability(&capabilities, &Action::Unlock).unwrap();

    assert_eq!(unlock.id, "unlock_device");
    assert!(unlock.payment_required);
    assert_eq!(unlock.default_amount.unwrap().to_string(), "0.001");
}

#[tokio::test]
async fn missing_manifest_is_catalog_unavailable() {
    let machine = LockMachine::start("0.001").await;
    let catalog = CapabilityCatalog::new(MachineClient::new(Duration::from_secs(5)));

    let err = catalog
        .get_capabilities(&machine.uri(), Some("printer_01"))
        .await
        .unwrap_err();

    match err {
        TollgateError::CatalogUnavailable { url, .. } => {
            assert!(url.ends_with("/devices/printer_01/ai-manifest"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
