use std::time::Duration;

use push_dispatcher::{
    models::{
        notification::{Alert, NotificationCategory, PushNotification},
        target::Target,
    },
    notifications::limiter::{RateLimiter, limiter_key},
};

use crate::support::{MemoryCache, limiter_config};

fn room_notification(category: NotificationCategory, room: &str) -> PushNotification {
    PushNotification::new(category, Alert::new("join_room_with_1", vec!["foo".to_string()]))
        .with_collapse_key(room)
}

/// Test: New follower notifications are never suppressed
#[tokio::test]
async fn test_new_follower_is_never_limited() {
    let cache = MemoryCache::new();
    let limiter = RateLimiter::new(cache.clone(), limiter_config());
    let target = Target::with_defaults(7);
    let notification = PushNotification::new(
        NotificationCategory::NewFollower,
        Alert::new("new_follower_notification", vec!["Ada".to_string()]),
    );

    for _ in 0..3 {
        assert!(limiter.should_send(&target, &notification).await);
        limiter.record_sent(&target, &notification).await;
    }

    assert_eq!(cache.key_count(), 0);
}

/// Test: Room activity is suppressed per user and per room after a send
#[tokio::test]
async fn test_room_notifications_are_limited_per_user_and_room() {
    let cache = MemoryCache::new();
    let limiter = RateLimiter::new(cache.clone(), limiter_config());
    let alice = Target::with_defaults(1);
    let bob = Target::with_defaults(2);
    let xyz = room_notification(NotificationCategory::RoomJoined, "xyz");
    let abc = room_notification(NotificationCategory::RoomJoined, "abc");

    assert!(limiter.should_send(&alice, &xyz).await);
    limiter.record_sent(&alice, &xyz).await;

    assert!(!limiter.should_send(&alice, &xyz).await);
    assert!(limiter.should_send(&alice, &abc).await);
    assert!(limiter.should_send(&bob, &xyz).await);

    // Creation and join share one cooldown class.
    let created = room_notification(NotificationCategory::NewRoom, "xyz");
    assert!(!limiter.should_send(&alice, &created).await);

    assert_eq!(
        cache.ttl(&limiter_key(1, "room", "xyz")),
        Some(Duration::from_secs(1800))
    );
}

/// Test: Invites and room activity for the same room do not suppress each other
#[tokio::test]
async fn test_invite_cooldown_is_separate() {
    let cache = MemoryCache::new();
    let limiter = RateLimiter::new(cache.clone(), limiter_config());
    let target = Target::with_defaults(1);
    let invite = room_notification(NotificationCategory::RoomInvite, "xyz");
    let joined = room_notification(NotificationCategory::RoomJoined, "xyz");

    limiter.record_sent(&target, &invite).await;

    assert!(!limiter.should_send(&target, &invite).await);
    assert!(limiter.should_send(&target, &joined).await);
    assert_eq!(
        cache.ttl(&limiter_key(1, "room_invite", "xyz")),
        Some(Duration::from_secs(300))
    );
}

/// Test: An unavailable cache lets notifications through
#[tokio::test]
async fn test_cache_failure_fails_open() {
    let cache = MemoryCache::new();
    let limiter = RateLimiter::new(cache.clone(), limiter_config());
    let target = Target::with_defaults(1);
    let notification = room_notification(NotificationCategory::RoomJoined, "xyz");

    limiter.record_sent(&target, &notification).await;
    cache.fail();

    assert!(limiter.should_send(&target, &notification).await);
    limiter.record_sent(&target, &notification).await;
}

/// Test: Room notifications without a collapse key are not limited
#[tokio::test]
async fn test_missing_context_is_not_limited() {
    let cache = MemoryCache::new();
    let limiter = RateLimiter::new(cache.clone(), limiter_config());
    let target = Target::with_defaults(1);
    let notification = PushNotification::new(
        NotificationCategory::RoomJoined,
        Alert::new("join_room_with_1", vec!["foo".to_string()]),
    );

    limiter.record_sent(&target, &notification).await;

    assert!(limiter.should_send(&target, &notification).await);
    assert_eq!(cache.key_count(), 0);
}
