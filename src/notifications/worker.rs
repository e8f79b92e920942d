use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{
    future::join_all,
    stream::{self, StreamExt},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::DeliveryError,
    models::{
        notification::{PushNotification, StoredNotification},
        target::Target,
    },
    notifications::{history::HistoryStore, lifecycle::redact, limiter::RateLimiter},
    pool::JobHandler,
    stores::{DeviceStore, PushGateway},
    utils::with_timeout,
};

/// One notification for a set of recipients.
#[derive(Debug, Clone)]
pub struct Job {
    pub targets: Vec<Target>,
    pub notification: PushNotification,
}

/// Collaborators shared by every delivery worker.
pub struct DeliveryContext {
    pub limiter: RateLimiter,
    pub devices: Arc<dyn DeviceStore>,
    pub gateway: Arc<dyn PushGateway>,
    pub history: HistoryStore,
    pub call_timeout: Duration,
    /// Upper bound on recipients of one job handled at once.
    pub target_concurrency: usize,
}

/// Handles one job at a time: rate limit, device lookup, fan-out, history.
///
/// Tokens the gateway reports as unregistered go to this worker's own
/// lifecycle sink, which closes when the worker is dropped.
pub struct DeliveryWorker {
    context: Arc<DeliveryContext>,
    unregistered: mpsc::Sender<String>,
}

impl DeliveryWorker {
    pub fn new(context: Arc<DeliveryContext>, unregistered: mpsc::Sender<String>) -> Self {
        Self {
            context,
            unregistered,
        }
    }

    pub async fn process(&self, job: &Job) {
        info!(
            category = %job.notification.category,
            key = %job.notification.alert.key,
            targets = job.targets.len(),
            "Delivering notification"
        );

        stream::iter(&job.targets)
            .for_each_concurrent(Some(self.context.target_concurrency.max(1)), |target| {
                self.deliver_to_target(target, &job.notification)
            })
            .await;
    }

    async fn deliver_to_target(&self, target: &Target, notification: &PushNotification) {
        let context = &self.context;

        if !context.limiter.should_send(target, notification).await {
            return;
        }

        let devices = match with_timeout(
            context.call_timeout,
            "device lookup",
            context.devices.devices_for_user(target.user_id),
        )
        .await
        {
            Ok(devices) => devices,
            Err(e) => {
                warn!(user_id = target.user_id, error = %e, "Failed to fetch devices");
                return;
            }
        };

        join_all(
            devices
                .iter()
                .map(|token| self.deliver_to_device(target.user_id, token, notification)),
        )
        .await;

        context.limiter.record_sent(target, notification).await;

        if notification.category.is_storable() {
            let stored = StoredNotification {
                timestamp: Utc::now().timestamp(),
                from_user_id: notification.origin.unwrap_or_default(),
                category: notification.category,
                arguments: notification.arguments.clone(),
            };

            if let Err(e) = context.history.store(target.user_id, &stored).await {
                warn!(user_id = target.user_id, error = %e, "Failed to store notification");
            }
        }
    }

    async fn deliver_to_device(&self, user_id: i64, token: &str, notification: &PushNotification) {
        match with_timeout(
            self.context.call_timeout,
            "push delivery",
            self.context.gateway.send(token, notification),
        )
        .await
        {
            Ok(()) => debug!(user_id, device = %redact(token), "Push delivered"),
            Err(DeliveryError::Unregistered) => {
                info!(user_id, device = %redact(token), "Device unregistered");
                if self.unregistered.send(token.to_string()).await.is_err() {
                    warn!(device = %redact(token), "Lifecycle sink closed, device not removed");
                }
            }
            Err(DeliveryError::Other(e)) => {
                warn!(user_id, device = %redact(token), error = %e, "Push delivery failed");
            }
        }
    }
}

#[async_trait]
impl JobHandler<Job> for DeliveryWorker {
    async fn handle(&mut self, job: Job) {
        self.process(&job).await;
    }
}
