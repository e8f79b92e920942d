use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use push_dispatcher::{
    models::{
        notification::{NotificationCategory, StoredNotification},
        target::Target,
    },
    notifications::{
        content::ContentBuilder,
        history::HistoryStore,
        lifecycle::DeviceLifecycleSink,
        limiter::RateLimiter,
        service::{HandleOutcome, NotificationService},
        targets::TargetResolver,
        worker::{DeliveryContext, DeliveryWorker, Job},
    },
    pool::{JobHandler, WorkerPool},
    recommendations::worker::{RecommendationJob, RecommendationWorker},
    utils::process_message,
};
use tokio::time::sleep;

use crate::support::{
    CALL_TIMEOUT, FakeDevices, FakeGateway, FakePublisher, FakeRecommender, FakeRooms,
    FakeSettings, FakeUsers, MemoryCache, TARGET_CONCURRENCY, eventually, limiter_config, room,
};

/// Counts jobs a delivery worker has finished.
struct Counted {
    worker: DeliveryWorker,
    handled: Arc<AtomicUsize>,
}

#[async_trait]
impl JobHandler<Job> for Counted {
    async fn handle(&mut self, job: Job) {
        self.worker.process(&job).await;
        self.handled.fetch_add(1, Ordering::SeqCst);
    }
}

struct Pipeline {
    service: NotificationService,
    pool: WorkerPool<Job>,
    handled: Arc<AtomicUsize>,
    cache: Arc<MemoryCache>,
    devices: Arc<FakeDevices>,
    gateway: Arc<FakeGateway>,
    history: HistoryStore,
}

impl Pipeline {
    fn handled(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }
}

fn pipeline(settings: FakeSettings, devices: FakeDevices) -> Pipeline {
    let cache = MemoryCache::new();
    let devices = Arc::new(devices);
    let gateway = Arc::new(FakeGateway::default());
    let history = HistoryStore::new(cache.clone(), 10, CALL_TIMEOUT);

    let context = Arc::new(DeliveryContext {
        limiter: RateLimiter::new(cache.clone(), limiter_config()),
        devices: devices.clone(),
        gateway: gateway.clone(),
        history: history.clone(),
        call_timeout: CALL_TIMEOUT,
        target_concurrency: TARGET_CONCURRENCY,
    });

    let handled = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::<Job>::start("delivery", 2, 8, |_| {
        let (unregistered, _sink) = DeviceLifecycleSink::spawn(devices.clone(), 8, CALL_TIMEOUT);
        Counted {
            worker: DeliveryWorker::new(Arc::clone(&context), unregistered),
            handled: Arc::clone(&handled),
        }
    });

    let users = FakeUsers::with(&[(1, "foo"), (2, "bar"), (3, "baz"), (9, "Ada")]);
    let rooms = FakeRooms::with(vec![room("xyz", Some("Lounge"), &[(1, "foo"), (2, "bar")])]);
    let content = ContentBuilder::new(Arc::new(users), Arc::new(rooms), CALL_TIMEOUT);
    let resolver = TargetResolver::new(Arc::new(settings), Vec::new(), 5, CALL_TIMEOUT);

    Pipeline {
        service: NotificationService::new(content, resolver, pool.dispatcher()),
        pool,
        handled,
        cache,
        devices,
        gateway,
        history,
    }
}

/// Waits for the history of `user_id` to fill, since delivery runs on the pool.
async fn stored_for(history: &HistoryStore, user_id: i64) -> Result<Vec<StoredNotification>> {
    for _ in 0..100 {
        let stored = history.notifications(user_id).await?;
        if !stored.is_empty() {
            return Ok(stored);
        }
        sleep(Duration::from_millis(10)).await;
    }
    Ok(Vec::new())
}

/// Test: A room join on the queue reaches every follower's devices once
#[tokio::test]
async fn test_end_to_end_room_join() -> Result<()> {
    let settings = FakeSettings {
        followers: HashMap::from([(1, vec![Target::with_defaults(5), Target::with_defaults(6)])]),
        ..Default::default()
    };
    let devices = FakeDevices::with(vec![(5, vec!["tok-5"]), (6, vec!["tok-6a", "tok-6b"])]);
    let pipeline = pipeline(settings, devices);

    let payload = br#"{"type":"room_join","params":{"room":"xyz","creator":1,"visibility":"public"}}"#;

    let first = process_message(payload, &pipeline.service).await?;
    assert_eq!(first, HandleOutcome::Dispatched { targets: 2 });
    assert!(eventually(|| pipeline.handled() == 1).await);
    assert_eq!(pipeline.cache.key_count(), 2);

    // The same join again is inside the cooldown window.
    process_message(payload, &pipeline.service).await?;
    assert!(eventually(|| pipeline.handled() == 2).await);
    pipeline.pool.stop().await;

    let mut looked_up = pipeline.devices.lookups();
    looked_up.sort();
    assert_eq!(looked_up, vec![5, 6]);
    assert_eq!(pipeline.gateway.tokens(), vec!["tok-5", "tok-6a", "tok-6b"]);

    let attempts = pipeline.gateway.attempts.lock().unwrap().clone();
    let (_, notification) = &attempts[0];
    assert_eq!(notification.alert.key, "join_named_room_with_2");
    assert_eq!(notification.alert.arguments, vec!["Lounge", "foo", "bar"]);
    assert_eq!(notification.collapse_key.as_deref(), Some("xyz"));

    Ok(())
}

/// Test: A new follower is pushed and kept in the followee's history
#[tokio::test]
async fn test_end_to_end_new_follower() -> Result<()> {
    let pipeline = pipeline(
        FakeSettings::default(),
        FakeDevices::with(vec![(1, vec!["tok-1"])]),
    );

    let payload = br#"{"type":"new_follower","params":{"follower":9,"followee":1}}"#;
    process_message(payload, &pipeline.service).await?;

    let stored = stored_for(&pipeline.history, 1).await?;
    pipeline.pool.stop().await;

    assert_eq!(pipeline.gateway.tokens(), vec!["tok-1"]);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].category, NotificationCategory::NewFollower);
    assert_eq!(stored[0].from_user_id, 9);

    Ok(())
}

/// Test: Published recommendations flow back through the pipeline
#[tokio::test]
async fn test_end_to_end_follow_recommendations() -> Result<()> {
    let recommender = FakeRecommender {
        recommendations: HashMap::from([(1, vec![2, 3])]),
        ..Default::default()
    };
    let publisher = Arc::new(FakePublisher::default());
    let worker = RecommendationWorker::new(
        Arc::new(recommender),
        publisher.clone(),
        "user-lifecycle".to_string(),
        3,
        CALL_TIMEOUT,
    );

    worker.process(RecommendationJob { user_id: 1 }).await;

    let (queue, event) = publisher.published.lock().unwrap()[0].clone();
    assert_eq!(queue, "user-lifecycle");

    let pipeline = pipeline(
        FakeSettings::default(),
        FakeDevices::with(vec![(1, vec!["tok-1"])]),
    );
    process_message(&serde_json::to_vec(&event)?, &pipeline.service).await?;
    assert!(eventually(|| pipeline.gateway.tokens().len() == 1).await);
    pipeline.pool.stop().await;

    let attempts = pipeline.gateway.attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].1.alert.key, "follow_recommendations_with_2");
    assert_eq!(attempts[0].1.alert.arguments, vec!["bar", "baz"]);

    Ok(())
}
