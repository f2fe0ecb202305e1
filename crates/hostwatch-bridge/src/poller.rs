//! Periodic telemetry push to subscribers.

use std::sync::Arc;
use std::time::Duration;

use hostwatch_conf::PollerConfig;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::SubscriberRegistry;
use crate::error::Result;
use crate::transport::ProviderClient;

/// `{"type": "system_data", "data": .., "timestamp": ..}`
pub fn snapshot_message(data: Value) -> Value {
    json!({
        "type": "system_data",
        "data": data,
        "timestamp": chrono::Local::now().to_rfc3339(),
    })
}

/// Fetch one snapshot and wrap it for a subscriber that just connected.
pub async fn initial_snapshot(client: &ProviderClient) -> Result<Value> {
    Ok(snapshot_message(client.fetch_telemetry().await?))
}

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do: the provider is down or nobody is listening.
    Idle,
    /// Snapshot pushed to this many subscribers.
    Delivered(usize),
    Failed,
}

pub struct TelemetryPoller {
    client: Arc<ProviderClient>,
    subscribers: Arc<SubscriberRegistry>,
    interval: Duration,
    error_backoff: Duration,
}

impl TelemetryPoller {
    pub fn new(client: Arc<ProviderClient>, subscribers: Arc<SubscriberRegistry>) -> Self {
        Self::with_config(client, subscribers, &PollerConfig::default())
    }

    pub fn with_config(
        client: Arc<ProviderClient>,
        subscribers: Arc<SubscriberRegistry>,
        config: &PollerConfig,
    ) -> Self {
        Self {
            client,
            subscribers,
            interval: config.interval(),
            error_backoff: config.error_backoff(),
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        if !self.client.is_connected() || self.subscribers.is_empty() {
            debug!(
                connected = self.client.is_connected(),
                subscribers = self.subscribers.count(),
                "Skipping telemetry push"
            );
            return TickOutcome::Idle;
        }

        match self.client.fetch_telemetry().await {
            Ok(data) => {
                let delivered = self.subscribers.broadcast(&snapshot_message(data));
                debug!(delivered, "Telemetry pushed");
                TickOutcome::Delivered(delivered)
            }
            Err(e) => {
                warn!(error = %e, "Telemetry poll failed");
                TickOutcome::Failed
            }
        }
    }

    /// Poll forever. A failed cycle waits the back-off instead of the
    /// interval; nothing stops the loop short of aborting its task.
    pub async fn run(self) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            backoff_ms = self.error_backoff.as_millis() as u64,
            "Telemetry poller started"
        );

        loop {
            let wait = match self.tick().await {
                TickOutcome::Failed => self.error_backoff,
                _ => self.interval,
            };
            tokio::time::sleep(wait).await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
