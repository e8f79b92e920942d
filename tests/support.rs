use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use push_dispatcher::{
    config::Config,
    error::{DeliveryError, StoreError},
    models::{
        event::Event,
        notification::PushNotification,
        room::{RoomMember, RoomState},
        target::Target,
    },
    notifications::limiter::LimiterConfig,
    pool::{JobHandler, WorkerPool},
    stores::{
        CacheStore, DeviceStore, EventPublisher, FollowRecommender, PushGateway, RoomDirectory,
        SettingsStore, UserDirectory,
    },
};
use tokio::{sync::mpsc, time::sleep};

pub const CALL_TIMEOUT: Duration = Duration::from_secs(1);
pub const TARGET_CONCURRENCY: usize = 4;

pub fn limiter_config() -> LimiterConfig {
    LimiterConfig {
        room_cooldown: Duration::from_secs(30 * 60),
        room_invite_cooldown: Duration::from_secs(5 * 60),
        call_timeout: CALL_TIMEOUT,
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Result<Config> {
    let mut pairs: Vec<(String, String)> = [
        ("RABBITMQ_URL", "amqp://localhost:5672"),
        ("REDIS_URL", "redis://localhost:6379"),
        ("DATABASE_URL", "postgres://localhost/social"),
        ("ROOM_SERVICE_URL", "http://localhost:9000"),
        ("FCM_PROJECT_ID", "social-dev"),
        ("FCM_ACCESS_TOKEN", "test-token"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    Config::from_pairs(pairs)
}

pub fn room(id: &str, name: Option<&str>, members: &[(i64, &str)]) -> RoomState {
    RoomState {
        id: id.to_string(),
        name: name.map(str::to_string),
        members: members
            .iter()
            .map(|(id, name)| RoomMember::new(*id, *name))
            .collect(),
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[derive(Default)]
pub struct MemoryCache {
    keys: Mutex<HashMap<String, Duration>>,
    lists: Mutex<HashMap<String, Vec<String>>>,
    failing: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.keys.lock().unwrap().get(key).copied()
    }

    pub fn key_count(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("cache unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.check()?;
        Ok(self.keys.lock().unwrap().contains_key(key))
    }

    async fn set_with_ttl(&self, key: &str, ttl: Duration) -> Result<(), Error> {
        self.check()?;
        self.keys.lock().unwrap().insert(key.to_string(), ttl);
        Ok(())
    }

    async fn push_and_trim(&self, key: &str, value: String, cap: usize) -> Result<(), Error> {
        self.check()?;
        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        list.insert(0, value);
        list.truncate(cap);
        Ok(())
    }

    async fn range(&self, key: &str) -> Result<Vec<String>, Error> {
        self.check()?;
        Ok(self
            .lists
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeSettings {
    pub users: HashMap<i64, Target>,
    pub followers: HashMap<i64, Vec<Target>>,
    pub active: Vec<Target>,
    pub failing: bool,
}

impl FakeSettings {
    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Other(anyhow!("database unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FakeSettings {
    async fn settings_for_user(&self, user_id: i64) -> Result<Target, StoreError> {
        self.check()?;
        self.users.get(&user_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn settings_for_followers(&self, user_id: i64) -> Result<Vec<Target>, StoreError> {
        self.check()?;
        self.followers
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn settings_for_active_users(&self, limit: i64) -> Result<Vec<Target>, StoreError> {
        self.check()?;
        Ok(self.active.iter().take(limit as usize).cloned().collect())
    }
}

#[derive(Default)]
pub struct FakeDevices {
    pub devices: HashMap<i64, Vec<String>>,
    pub fail_lookup: bool,
    pub fail_removal: bool,
    /// Holds every lookup open this long, so overlapping lookups can be counted.
    pub lookup_delay: Option<Duration>,
    pub lookups: Mutex<Vec<i64>>,
    pub removals: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl FakeDevices {
    pub fn with(devices: Vec<(i64, Vec<&str>)>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|(user, tokens)| (user, tokens.into_iter().map(str::to_string).collect()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn lookups(&self) -> Vec<i64> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().unwrap().clone()
    }

    /// Most lookups that were running at the same time.
    pub fn peak_lookups(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceStore for FakeDevices {
    async fn devices_for_user(&self, user_id: i64) -> Result<Vec<String>, Error> {
        self.lookups.lock().unwrap().push(user_id);
        if let Some(delay) = self.lookup_delay {
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail_lookup {
            return Err(anyhow!("device store unavailable"));
        }
        Ok(self.devices.get(&user_id).cloned().unwrap_or_default())
    }

    async fn remove_device(&self, token: &str) -> Result<(), Error> {
        self.removals.lock().unwrap().push(token.to_string());
        if self.fail_removal {
            return Err(anyhow!("device store unavailable"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub unregistered: HashSet<String>,
    pub failing: HashSet<String>,
    pub attempts: Mutex<Vec<(String, PushNotification)>>,
}

impl FakeGateway {
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(token, _)| token.clone())
            .collect();
        tokens.sort();
        tokens
    }
}

#[async_trait]
impl PushGateway for FakeGateway {
    async fn send(
        &self,
        device_token: &str,
        notification: &PushNotification,
    ) -> Result<(), DeliveryError> {
        self.attempts
            .lock()
            .unwrap()
            .push((device_token.to_string(), notification.clone()));

        if self.unregistered.contains(device_token) {
            return Err(DeliveryError::Unregistered);
        }
        if self.failing.contains(device_token) {
            return Err(DeliveryError::Other(anyhow!("gateway unavailable")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeUsers(pub HashMap<i64, String>);

impl FakeUsers {
    pub fn with(users: &[(i64, &str)]) -> Self {
        Self(
            users
                .iter()
                .map(|(id, name)| (*id, name.to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn display_name(&self, user_id: i64) -> Result<Option<String>, Error> {
        Ok(self.0.get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeRooms(pub HashMap<String, RoomState>);

impl FakeRooms {
    pub fn with(rooms: Vec<RoomState>) -> Self {
        Self(rooms.into_iter().map(|room| (room.id.clone(), room)).collect())
    }
}

#[async_trait]
impl RoomDirectory for FakeRooms {
    async fn room(&self, room_id: &str) -> Result<Option<RoomState>, Error> {
        Ok(self.0.get(room_id).cloned())
    }
}

#[derive(Default)]
pub struct FakePublisher {
    pub published: Mutex<Vec<(String, Event)>>,
}

#[async_trait]
impl EventPublisher for FakePublisher {
    async fn publish(&self, queue: &str, event: &Event) -> Result<(), Error> {
        self.published
            .lock()
            .unwrap()
            .push((queue.to_string(), event.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRecommender {
    pub recommendations: HashMap<i64, Vec<i64>>,
    pub candidates: Vec<i64>,
}

#[async_trait]
impl FollowRecommender for FakeRecommender {
    async fn recommend(&self, user_id: i64, limit: i64) -> Result<Vec<i64>, Error> {
        Ok(self
            .recommendations
            .get(&user_id)
            .map(|ids| ids.iter().take(limit as usize).copied().collect())
            .unwrap_or_default())
    }

    async fn candidates(&self, limit: i64) -> Result<Vec<i64>, Error> {
        Ok(self.candidates.iter().take(limit as usize).copied().collect())
    }
}

/// Forwards every job it receives to a channel.
pub struct Collect<J>(pub mpsc::UnboundedSender<J>);

#[async_trait]
impl<J: Send + 'static> JobHandler<J> for Collect<J> {
    async fn handle(&mut self, job: J) {
        let _ = self.0.send(job);
    }
}

pub fn collecting_pool<J: Send + 'static>() -> (WorkerPool<J>, mpsc::UnboundedReceiver<J>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let pool = WorkerPool::start("test", 2, 8, move |_| Collect(sender.clone()));
    (pool, receiver)
}
