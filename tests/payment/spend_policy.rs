use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::TempDir;

use super::machine_harness::amount;
use tollgate::TollgateError;
use tollgate::payment::{Clock, ManualClock, SpendPolicy};
use tollgate::storage::{FileStore, KeyValueStore};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

fn open(tmp: &TempDir, clock: &Arc<ManualClock>) -> SpendPolicy {
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(tmp.path()).unwrap());
    let clock: Arc<dyn Clock> = clock.clone();
    SpendPolicy::load(store, clock, amount("0.1")).unwrap()
}

#[test]
fn spend_survives_restart_and_resets_next_day() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(day(10)));

    {
        let policy = open(&tmp, &clock);
        policy.enable(amount("0.01")).unwrap();
        policy.record_spend(amount("0.004")).unwrap();
    }

    let policy = open(&tmp, &clock);
    let state = policy.state();
    assert!(state.enabled);
    assert_eq!(state.daily_spent, amount("0.004"));
    assert_eq!(policy.remaining(), amount("0.006"));

    clock.advance_days(1);
    let policy = open(&tmp, &clock);
    let state = policy.state();
    assert_eq!(state.daily_spent, amount("0"));
    assert_eq!(state.last_reset_date, day(11));
    assert_eq!(state.daily_limit, amount("0.01"));
}

#[test]
fn reservations_cannot_overcommit_the_budget() {
    let policy = SpendPolicy::in_memory(amount("0.1"));
    policy.enable(amount("0.003")).unwrap();

    let first = policy.check_and_reserve(amount("0.002")).unwrap();
    let second = policy.check_and_reserve(amount("0.002"));
    assert!(matches!(second, Err(TollgateError::SpendLimitExceeded { .. })));

    first.commit().unwrap();
    assert_eq!(policy.state().daily_spent, amount("0.002"));
    assert!(policy.can_spend(amount("0.001")));
    assert!(!policy.can_spend(amount("0.0011")));
}
