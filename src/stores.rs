//! Seams to the systems this engine talks to but does not own.
//!
//! Production adapters live in `clients`; tests swap in in-memory fakes.

use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::{
    error::{DeliveryError, StoreError},
    models::{event::Event, notification::PushNotification, room::RoomState, target::Target},
};

/// TTL-capable key/value and list cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, Error>;

    async fn set_with_ttl(&self, key: &str, ttl: Duration) -> Result<(), Error>;

    /// Prepends `value` and trims the list to the `cap` most recent entries.
    async fn push_and_trim(&self, key: &str, value: String, cap: usize) -> Result<(), Error>;

    async fn range(&self, key: &str) -> Result<Vec<String>, Error>;
}

/// Notification preferences held in the relational store.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn settings_for_user(&self, user_id: i64) -> Result<Target, StoreError>;

    async fn settings_for_followers(&self, user_id: i64) -> Result<Vec<Target>, StoreError>;

    /// Most recently active first.
    async fn settings_for_active_users(&self, limit: i64) -> Result<Vec<Target>, StoreError>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn devices_for_user(&self, user_id: i64) -> Result<Vec<String>, Error>;

    async fn remove_device(&self, token: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn display_name(&self, user_id: i64) -> Result<Option<String>, Error>;
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn room(&self, room_id: &str) -> Result<Option<RoomState>, Error>;
}

#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(
        &self,
        device_token: &str,
        notification: &PushNotification,
    ) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, queue: &str, event: &Event) -> Result<(), Error>;
}

#[async_trait]
pub trait FollowRecommender: Send + Sync {
    async fn recommend(&self, user_id: i64, limit: i64) -> Result<Vec<i64>, Error>;

    /// Users eligible for a recommendation round, most recently active first.
    async fn candidates(&self, limit: i64) -> Result<Vec<i64>, Error>;
}
