use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Error, Result};
use tracing::{debug, warn};

use crate::{
    clients::{database::DatabaseClient, rbmq::RabbitMqClient, redis::RedisCache},
    models::health::{HealthCheckResponse, ServiceHealth},
    utils::with_timeout,
};

pub struct HealthChecker {
    database: Arc<DatabaseClient>,
    cache: RedisCache,
    broker: Arc<RabbitMqClient>,
    call_timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        database: Arc<DatabaseClient>,
        cache: RedisCache,
        broker: Arc<RabbitMqClient>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            database,
            cache,
            broker,
            call_timeout,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let (database, cache) = tokio::join!(
            self.probe("database", self.database.health_check()),
            self.probe("cache_service", self.cache.ping()),
        );

        let broker = if self.broker.is_connected() {
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ connection lost");
            ServiceHealth::unhealthy("Connection lost".to_string())
        };

        let mut checks = HashMap::new();
        checks.insert("database".to_string(), database);
        checks.insert("cache_service".to_string(), cache);
        checks.insert("message_broker".to_string(), broker);

        HealthCheckResponse::from_checks(checks)
    }

    /// Runs a probe with twice the call timeout; answering slower than one
    /// call timeout counts as degraded.
    async fn probe<F>(&self, name: &str, check: F) -> ServiceHealth
    where
        F: Future<Output = Result<(), Error>>,
    {
        let start = Instant::now();

        match with_timeout(self.call_timeout * 2, name, check).await {
            Ok(()) => {
                let elapsed = start.elapsed();
                let elapsed_ms = elapsed.as_millis() as u64;
                debug!(service = name, response_time_ms = elapsed_ms, "Health check passed");

                if elapsed > self.call_timeout {
                    ServiceHealth::degraded(elapsed_ms)
                } else {
                    ServiceHealth::healthy(elapsed_ms)
                }
            }
            Err(e) => {
                warn!(service = name, error = %e, "Health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }
}
