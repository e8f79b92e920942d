use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::notifications::limiter::LimiterConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_user_events_queue")]
    pub user_events_queue: String,
    #[serde(default = "default_room_events_queue")]
    pub room_events_queue: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    pub redis_url: String,

    pub database_url: String,

    pub room_service_url: String,

    pub fcm_project_id: String,
    #[serde(default = "default_fcm_endpoint")]
    pub fcm_endpoint: String,
    /// Static bearer token, for emulators. Without it `gcp_auth` supplies one.
    #[serde(default)]
    pub fcm_access_token: Option<String>,

    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_job_queue_capacity")]
    pub job_queue_capacity: usize,
    #[serde(default = "default_unregistered_sink_capacity")]
    pub unregistered_sink_capacity: usize,
    /// Recipients of one job delivered at the same time.
    #[serde(default = "default_target_concurrency")]
    pub target_concurrency: usize,

    #[serde(default = "default_room_cooldown_seconds")]
    pub room_cooldown_seconds: u64,
    #[serde(default = "default_room_invite_cooldown_seconds")]
    pub room_invite_cooldown_seconds: u64,

    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    #[serde(default = "default_welcome_room_recent_limit")]
    pub welcome_room_recent_limit: i64,
    #[serde(default)]
    pub welcome_room_greeters: Vec<i64>,

    #[serde(default = "default_external_call_timeout_ms")]
    pub external_call_timeout_ms: u64,

    #[serde(default = "default_recommendation_pool_size")]
    pub recommendation_pool_size: usize,
    #[serde(default = "default_recommendation_interval_seconds")]
    pub recommendation_interval_seconds: u64,
    #[serde(default = "default_recommendation_batch_size")]
    pub recommendation_batch_size: i64,
    #[serde(default = "default_recommendation_limit")]
    pub recommendation_limit: i64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

fn default_user_events_queue() -> String {
    "user-lifecycle".to_string()
}

fn default_room_events_queue() -> String {
    "room-lifecycle".to_string()
}

fn default_prefetch_count() -> u16 {
    20
}

fn default_fcm_endpoint() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_worker_pool_size() -> usize {
    5
}

fn default_job_queue_capacity() -> usize {
    100
}

fn default_unregistered_sink_capacity() -> usize {
    64
}

fn default_target_concurrency() -> usize {
    8
}

fn default_room_cooldown_seconds() -> u64 {
    30 * 60
}

fn default_room_invite_cooldown_seconds() -> u64 {
    5 * 60
}

fn default_history_cap() -> usize {
    10
}

fn default_welcome_room_recent_limit() -> i64 {
    5
}

fn default_external_call_timeout_ms() -> u64 {
    5000
}

fn default_recommendation_pool_size() -> usize {
    2
}

fn default_recommendation_interval_seconds() -> u64 {
    24 * 60 * 60
}

fn default_recommendation_batch_size() -> i64 {
    100
}

fn default_recommendation_limit() -> i64 {
    3
}

fn default_server_port() -> u16 {
    8080
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(pairs)
            .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.worker_pool_size == 0 {
            return Err(anyhow!("WORKER_POOL_SIZE must be at least 1"));
        }
        if self.recommendation_pool_size == 0 {
            return Err(anyhow!("RECOMMENDATION_POOL_SIZE must be at least 1"));
        }
        if self.job_queue_capacity == 0 || self.unregistered_sink_capacity == 0 {
            return Err(anyhow!("Queue capacities must be at least 1"));
        }
        if self.target_concurrency == 0 {
            return Err(anyhow!("TARGET_CONCURRENCY must be at least 1"));
        }
        if self.history_cap == 0 {
            return Err(anyhow!("HISTORY_CAP must be at least 1"));
        }
        Ok(())
    }

    pub fn room_cooldown(&self) -> Duration {
        Duration::from_secs(self.room_cooldown_seconds)
    }

    pub fn room_invite_cooldown(&self) -> Duration {
        Duration::from_secs(self.room_invite_cooldown_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.external_call_timeout_ms)
    }

    pub fn recommendation_interval(&self) -> Duration {
        Duration::from_secs(self.recommendation_interval_seconds)
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            room_cooldown: self.room_cooldown(),
            room_invite_cooldown: self.room_invite_cooldown(),
            call_timeout: self.call_timeout(),
        }
    }
}
