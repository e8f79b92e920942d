use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    NewFollower,
    NewRoom,
    RoomJoined,
    RoomInvite,
    WelcomeRoom,
    FollowRecommendations,
}

impl NotificationCategory {
    /// Categories that are kept in the in-app notification history.
    pub fn is_storable(&self) -> bool {
        matches!(
            self,
            NotificationCategory::NewFollower | NotificationCategory::WelcomeRoom
        )
    }
}

impl Display for NotificationCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            NotificationCategory::NewFollower => write!(f, "NEW_FOLLOWER"),
            NotificationCategory::NewRoom => write!(f, "NEW_ROOM"),
            NotificationCategory::RoomJoined => write!(f, "ROOM_JOINED"),
            NotificationCategory::RoomInvite => write!(f, "ROOM_INVITE"),
            NotificationCategory::WelcomeRoom => write!(f, "WELCOME_ROOM"),
            NotificationCategory::FollowRecommendations => write!(f, "FOLLOW_RECOMMENDATIONS"),
        }
    }
}

/// Localisation happens on the device: the payload only names the template
/// and its positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "body-loc-key")]
    pub key: String,

    #[serde(rename = "body-loc-args")]
    pub arguments: Vec<String>,
}

impl Alert {
    pub fn new(key: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            key: key.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    pub category: NotificationCategory,
    pub alert: Alert,

    #[serde(default)]
    pub arguments: Map<String, JsonValue>,

    /// Gateway-side collapse identity. Also the rate limiter's context id.
    #[serde(skip)]
    pub collapse_key: Option<String>,

    /// The user whose action produced the notification.
    #[serde(skip)]
    pub origin: Option<i64>,
}

impl PushNotification {
    pub fn new(category: NotificationCategory, alert: Alert) -> Self {
        Self {
            category,
            alert,
            arguments: Map::new(),
            collapse_key: None,
            origin: None,
        }
    }

    pub fn with_argument(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    pub fn with_collapse_key(mut self, collapse_key: impl Into<String>) -> Self {
        self.collapse_key = Some(collapse_key.into());
        self
    }

    pub fn with_origin(mut self, origin: i64) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// An entry of the per-user in-app notification history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub timestamp: i64,

    #[serde(rename = "from")]
    pub from_user_id: i64,

    pub category: NotificationCategory,

    #[serde(default)]
    pub arguments: Map<String, JsonValue>,
}
