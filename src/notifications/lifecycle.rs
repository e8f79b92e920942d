use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{stores::DeviceStore, utils::with_timeout};

/// Removes device tokens the push gateway reported as unregistered.
///
/// Runs until every sender is dropped. Removal failures are logged and never
/// reach the delivery path.
pub struct DeviceLifecycleSink {
    devices: Arc<dyn DeviceStore>,
    call_timeout: Duration,
    intake: mpsc::Receiver<String>,
}

impl DeviceLifecycleSink {
    pub fn spawn(
        devices: Arc<dyn DeviceStore>,
        capacity: usize,
        call_timeout: Duration,
    ) -> (mpsc::Sender<String>, JoinHandle<()>) {
        let (sender, intake) = mpsc::channel(capacity.max(1));

        let sink = Self {
            devices,
            call_timeout,
            intake,
        };

        (sender, tokio::spawn(sink.run()))
    }

    async fn run(mut self) {
        while let Some(token) = self.intake.recv().await {
            match with_timeout(
                self.call_timeout,
                "device removal",
                self.devices.remove_device(&token),
            )
            .await
            {
                Ok(()) => info!(device = %redact(&token), "Removed unregistered device"),
                Err(e) => warn!(
                    device = %redact(&token),
                    error = %e,
                    "Failed to remove unregistered device"
                ),
            }
        }

        debug!("Device lifecycle sink closed");
    }
}

/// First eight characters of a device token, for logs.
pub fn redact(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(index, _)| index)
        .unwrap_or(token.len());
    &token[..end]
}
