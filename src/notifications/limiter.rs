use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    models::{
        notification::{NotificationCategory, PushNotification},
        target::Target,
    },
    stores::CacheStore,
    utils::with_timeout,
};

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub room_cooldown: Duration,
    pub room_invite_cooldown: Duration,
    pub call_timeout: Duration,
}

/// Suppresses repeats of the same notification to the same user within a
/// cooldown window.
///
/// The context of a notification is its collapse key, so anything the
/// gateway would collapse is also what gets limited. Cache failures fail
/// open: the notification is sent.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn CacheStore>,
    config: LimiterConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn CacheStore>, config: LimiterConfig) -> Self {
        Self { cache, config }
    }

    pub async fn should_send(&self, target: &Target, notification: &PushNotification) -> bool {
        let Some((key, _)) = self.cooldown(target, notification) else {
            return true;
        };

        match with_timeout(
            self.config.call_timeout,
            "rate limit check",
            self.cache.exists(&key),
        )
        .await
        {
            Ok(limited) => {
                if limited {
                    debug!(user_id = target.user_id, key = %key, "Notification rate limited");
                }
                !limited
            }
            Err(e) => {
                warn!(error = %e, key = %key, "Rate limit check failed, allowing notification");
                true
            }
        }
    }

    pub async fn record_sent(&self, target: &Target, notification: &PushNotification) {
        let Some((key, ttl)) = self.cooldown(target, notification) else {
            return;
        };

        if let Err(e) = with_timeout(
            self.config.call_timeout,
            "rate limit record",
            self.cache.set_with_ttl(&key, ttl),
        )
        .await
        {
            warn!(error = %e, key = %key, "Failed to record sent notification");
        }
    }

    /// Limiter key and window, or `None` for notifications that are never
    /// limited.
    fn cooldown(
        &self,
        target: &Target,
        notification: &PushNotification,
    ) -> Option<(String, Duration)> {
        let (class, ttl) = match notification.category {
            NotificationCategory::NewFollower | NotificationCategory::FollowRecommendations => {
                return None;
            }
            NotificationCategory::RoomInvite => ("room_invite", self.config.room_invite_cooldown),
            NotificationCategory::NewRoom
            | NotificationCategory::RoomJoined
            | NotificationCategory::WelcomeRoom => ("room", self.config.room_cooldown),
        };

        let context = notification.collapse_key.as_deref()?;
        Some((limiter_key(target.user_id, class, context), ttl))
    }
}

pub fn limiter_key(user_id: i64, class: &str, context: &str) -> String {
    format!("notification_limiter:{}:{}:{}", user_id, class, context)
}
