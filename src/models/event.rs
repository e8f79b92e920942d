use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// A domain event as published on the user and room lifecycle queues.
///
/// The wire form is `{"type": "...", "params": {...}}`; it is decoded once at
/// the consumer boundary so handlers never inspect untyped params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Event {
    NewFollower {
        follower: i64,
        followee: i64,
    },
    RoomCreation {
        room: String,
        creator: i64,
        visibility: Visibility,
    },
    /// `creator` is the member who joined.
    RoomJoin {
        room: String,
        creator: i64,
        visibility: Visibility,
    },
    RoomInvite {
        room: String,
        from: i64,
        target: i64,
    },
    WelcomeRoom {
        user: i64,
        room: String,
    },
    FollowRecommendations {
        user: i64,
        recommendations: Vec<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewFollower,
    RoomCreation,
    RoomJoin,
    RoomInvite,
    WelcomeRoom,
    FollowRecommendations,
}

impl Event {
    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::NewFollower { .. } => EventKind::NewFollower,
            Event::RoomCreation { .. } => EventKind::RoomCreation,
            Event::RoomJoin { .. } => EventKind::RoomJoin,
            Event::RoomInvite { .. } => EventKind::RoomInvite,
            Event::WelcomeRoom { .. } => EventKind::WelcomeRoom,
            Event::FollowRecommendations { .. } => EventKind::FollowRecommendations,
        }
    }

    /// The user whose action produced the event.
    pub fn origin(&self) -> i64 {
        match self {
            Event::NewFollower { follower, .. } => *follower,
            Event::RoomCreation { creator, .. } | Event::RoomJoin { creator, .. } => *creator,
            Event::RoomInvite { from, .. } => *from,
            Event::WelcomeRoom { user, .. } => *user,
            Event::FollowRecommendations { user, .. } => *user,
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            EventKind::NewFollower => write!(f, "new_follower"),
            EventKind::RoomCreation => write!(f, "room_creation"),
            EventKind::RoomJoin => write!(f, "room_join"),
            EventKind::RoomInvite => write!(f, "room_invite"),
            EventKind::WelcomeRoom => write!(f, "welcome_room"),
            EventKind::FollowRecommendations => write!(f, "follow_recommendations"),
        }
    }
}
