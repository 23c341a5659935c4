#![allow(dead_code)]

use raffle_sync::admin::{AdminGate, AdminToken};
use raffle_sync::broadcast::BroadcastHub;
use raffle_sync::clock::ManualClock;
use raffle_sync::config::AdminConfig;
use raffle_sync::instance::{InstanceHandle, InstanceSettings, RaffleInstance};
use raffle_sync::models::{CampaignConfig, Contact, TicketNumber};
use raffle_sync::state_manager::RaffleState;
use raffle_sync::store::{MemoryStore, RaffleStore};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub fn t(n: u32) -> TicketNumber {
    TicketNumber::new(n)
}

pub fn ana() -> Contact {
    Contact::new("Ana", "11999998888", "ana@x.com")
}

pub fn bruno() -> Contact {
    Contact::new("Bruno Lima", "(21) 98888-7777", "bruno@y.com")
}

/// Full observable state, for before/after equality checks
pub fn fingerprint(state: &RaffleState) -> (raffle_sync::state_manager::SharedState, BTreeMap<TicketNumber, i64>) {
    (state.shared().clone(), state.reservations().clone())
}

pub fn policy(max_entries_per_phone: u32, max_purchase_limit: u32) -> CampaignConfig {
    CampaignConfig {
        max_entries_per_phone,
        max_purchase_limit,
        ..CampaignConfig::default()
    }
}

pub fn admin() -> AdminToken {
    AdminGate::new(&AdminConfig {
        passphrase: "secret".to_string(),
    })
    .login("secret")
    .expect("admin login")
}

/// One instance on a shared hub with a manual clock
pub struct TestInstance {
    pub handle: InstanceHandle,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

pub fn settings() -> InstanceSettings {
    InstanceSettings {
        sweep_interval: Duration::from_millis(20),
        ..InstanceSettings::default()
    }
}

pub fn spawn_instance(hub: &BroadcastHub, store: Arc<MemoryStore>) -> TestInstance {
    spawn_with(hub, store, settings())
}

pub fn spawn_with(hub: &BroadcastHub, store: Arc<MemoryStore>, settings: InstanceSettings) -> TestInstance {
    let clock = Arc::new(ManualClock::new(0));
    let dyn_store: Arc<dyn RaffleStore> = store.clone();
    let instance = RaffleInstance::load(settings, dyn_store, hub, clock.clone());
    let (handle, _task) = instance.spawn();
    TestInstance {
        handle,
        clock,
        store,
    }
}

/// Poll `check` until it returns true or a second passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
