//! Fixed-interval device telemetry polling.
//!
//! Read-only with respect to task state: the poller only refreshes the
//! device list for display and never touches orchestration or the
//! spend policy.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::Device;
use crate::discovery::client::MachineClient;

/// Latest view of a machine's devices. A failed poll keeps the previous
/// device list and records the error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub devices: Vec<Device>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct DevicePoller {
    client: MachineClient,
    base_url: String,
    interval: Duration,
    snapshot: watch::Sender<DeviceSnapshot>,
}

impl DevicePoller {
    pub fn new(client: MachineClient, base_url: impl Into<String>, interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(DeviceSnapshot::default());
        Self {
            client,
            base_url: base_url.into(),
            interval: interval.max(Duration::from_millis(1)),
            snapshot,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn latest(&self) -> DeviceSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Fetch once and publish the result.
    pub async fn poll_once(&self) -> DeviceSnapshot {
        match self.client.devices(&self.base_url).await {
            Ok(devices) => {
                tracing::debug!(url = %self.base_url, count = devices.len(), "devices polled");
                self.snapshot.send_replace(DeviceSnapshot {
                    devices,
                    fetched_at: Some(Utc::now()),
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!(url = %self.base_url, error = %e, "device poll failed");
                self.snapshot.send_modify(|snap| snap.error = Some(e.to_string()));
            }
        }
        self.latest()
    }

    /// Poll until `cancel` fires. The first poll happens immediately.
    pub fn spawn(self, cancel: CancellationToken) -> (watch::Receiver<DeviceSnapshot>, JoinHandle<()>) {
        let rx = self.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        self.poll_once().await;
                    }
                }
            }
            tracing::debug!(url = %self.base_url, "device poller stopped");
        });
        (rx, handle)
    }
}
