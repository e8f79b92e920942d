use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::debug;

use crate::{
    error::BuildError,
    models::{
        event::{Event, EventKind, Visibility},
        notification::{Alert, NotificationCategory, PushNotification},
        room::RoomState,
    },
    notifications::membership::{lead_with, pluralize, room_key},
    stores::{RoomDirectory, UserDirectory},
    utils::with_timeout,
};

/// Turns one event into one notification.
#[async_trait]
pub trait BuildNotification: Send + Sync {
    async fn build(&self, event: &Event) -> Result<PushNotification, BuildError>;
}

/// Registry of per-event builders.
pub struct ContentBuilder {
    builders: HashMap<EventKind, Arc<dyn BuildNotification>>,
}

impl ContentBuilder {
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry with a builder for every event kind.
    pub fn new(
        users: Arc<dyn UserDirectory>,
        rooms: Arc<dyn RoomDirectory>,
        call_timeout: Duration,
    ) -> Self {
        let lookups = Lookups {
            users,
            rooms,
            call_timeout,
        };

        let mut registry = Self::empty();
        registry.register(
            EventKind::NewFollower,
            Arc::new(NewFollowerBuilder(lookups.clone())),
        );
        registry.register(
            EventKind::RoomCreation,
            Arc::new(RoomMembershipBuilder {
                lookups: lookups.clone(),
                verb: "create",
                category: NotificationCategory::NewRoom,
            }),
        );
        registry.register(
            EventKind::RoomJoin,
            Arc::new(RoomMembershipBuilder {
                lookups: lookups.clone(),
                verb: "join",
                category: NotificationCategory::RoomJoined,
            }),
        );
        registry.register(
            EventKind::RoomInvite,
            Arc::new(RoomInviteBuilder(lookups.clone())),
        );
        registry.register(
            EventKind::WelcomeRoom,
            Arc::new(WelcomeRoomBuilder(lookups.clone())),
        );
        registry.register(
            EventKind::FollowRecommendations,
            Arc::new(FollowRecommendationsBuilder(lookups)),
        );
        registry
    }

    pub fn register(&mut self, kind: EventKind, builder: Arc<dyn BuildNotification>) {
        self.builders.insert(kind, builder);
    }

    pub async fn build(&self, event: &Event) -> Result<PushNotification, BuildError> {
        let builder = self
            .builders
            .get(&event.kind())
            .ok_or_else(|| BuildError::UnexpectedEvent(event.kind().to_string()))?;

        builder.build(event).await
    }
}

#[derive(Clone)]
struct Lookups {
    users: Arc<dyn UserDirectory>,
    rooms: Arc<dyn RoomDirectory>,
    call_timeout: Duration,
}

impl Lookups {
    async fn name(&self, user_id: i64) -> Result<String, BuildError> {
        with_timeout(
            self.call_timeout,
            "display name lookup",
            self.users.display_name(user_id),
        )
        .await?
        .ok_or(BuildError::UnknownUser(user_id))
    }

    async fn room(&self, room_id: &str) -> Result<RoomState, BuildError> {
        with_timeout(self.call_timeout, "room lookup", self.rooms.room(room_id))
            .await?
            .ok_or_else(|| BuildError::UnknownRoom(room_id.to_string()))
    }
}

fn unexpected(event: &Event) -> BuildError {
    BuildError::UnexpectedEvent(event.kind().to_string())
}

struct NewFollowerBuilder(Lookups);

#[async_trait]
impl BuildNotification for NewFollowerBuilder {
    async fn build(&self, event: &Event) -> Result<PushNotification, BuildError> {
        let Event::NewFollower { follower, .. } = event else {
            return Err(unexpected(event));
        };

        let name = self.0.name(*follower).await?;

        Ok(PushNotification::new(
            NotificationCategory::NewFollower,
            Alert::new("new_follower_notification", vec![name]),
        )
        .with_argument("id", *follower)
        .with_origin(*follower))
    }
}

/// Room creation and join notifications, phrased by who is in the room.
struct RoomMembershipBuilder {
    lookups: Lookups,
    verb: &'static str,
    category: NotificationCategory,
}

#[async_trait]
impl BuildNotification for RoomMembershipBuilder {
    async fn build(&self, event: &Event) -> Result<PushNotification, BuildError> {
        let (room_id, actor, visibility) = match event {
            Event::RoomCreation {
                room,
                creator,
                visibility,
            }
            | Event::RoomJoin {
                room,
                creator,
                visibility,
            } => (room, *creator, *visibility),
            _ => return Err(unexpected(event)),
        };

        if visibility == Visibility::Private {
            return Err(BuildError::PrivateRoom(room_id.clone()));
        }

        let room = self.lookups.room(room_id).await?;

        if room.members.is_empty() {
            return Err(BuildError::EmptyRoom(room_id.clone()));
        }

        let ordered = lead_with(&room.members, actor).ok_or_else(|| BuildError::ActorLeftRoom {
            room: room_id.clone(),
            member: actor,
        })?;
        let names: Vec<&str> = ordered.iter().map(|member| member.name.as_str()).collect();

        let room_name = room.display_name();
        let alert = pluralize(
            &room_key(self.verb, room_name.is_some()),
            room_name,
            &names,
            room.members.len(),
        )?;

        debug!(room = %room_id, key = %alert.key, "Built room notification");

        Ok(PushNotification::new(self.category, alert)
            .with_argument("id", room_id.as_str())
            .with_collapse_key(room_id.as_str())
            .with_origin(actor))
    }
}

struct RoomInviteBuilder(Lookups);

#[async_trait]
impl BuildNotification for RoomInviteBuilder {
    async fn build(&self, event: &Event) -> Result<PushNotification, BuildError> {
        let Event::RoomInvite { room, from, .. } = event else {
            return Err(unexpected(event));
        };

        let (inviter, state) = tokio::join!(self.0.name(*from), self.0.room(room));
        let inviter = inviter?;
        let state = state?;

        let alert = match state.display_name() {
            Some(room_name) => Alert::new(
                "room_invite_named_notification",
                vec![inviter, room_name.to_string()],
            ),
            None => Alert::new("room_invite_notification", vec![inviter]),
        };

        Ok(
            PushNotification::new(NotificationCategory::RoomInvite, alert)
                .with_argument("id", room.as_str())
                .with_collapse_key(room.as_str())
                .with_origin(*from),
        )
    }
}

struct WelcomeRoomBuilder(Lookups);

#[async_trait]
impl BuildNotification for WelcomeRoomBuilder {
    async fn build(&self, event: &Event) -> Result<PushNotification, BuildError> {
        let Event::WelcomeRoom { user, room } = event else {
            return Err(unexpected(event));
        };

        let name = self.0.name(*user).await?;

        Ok(PushNotification::new(
            NotificationCategory::WelcomeRoom,
            Alert::new("welcome_room_notification", vec![name]),
        )
        .with_argument("id", room.as_str())
        .with_argument("from", *user)
        .with_collapse_key(room.as_str())
        .with_origin(*user))
    }
}

struct FollowRecommendationsBuilder(Lookups);

#[async_trait]
impl BuildNotification for FollowRecommendationsBuilder {
    async fn build(&self, event: &Event) -> Result<PushNotification, BuildError> {
        let Event::FollowRecommendations {
            user,
            recommendations,
        } = event
        else {
            return Err(unexpected(event));
        };

        // Accounts deleted since the recommendation was computed are dropped.
        let lookups = recommendations.iter().map(|id| self.0.name(*id));
        let mut resolved = Vec::with_capacity(recommendations.len());
        for (id, name) in recommendations.iter().zip(join_all(lookups).await) {
            match name {
                Ok(name) => resolved.push((*id, name)),
                Err(BuildError::UnknownUser(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if resolved.is_empty() {
            return Err(BuildError::NothingToBuild(format!(
                "follow recommendations for user {}",
                user
            )));
        }

        let names: Vec<&str> = resolved.iter().map(|(_, name)| name.as_str()).collect();
        let ids: Vec<i64> = resolved.iter().map(|(id, _)| *id).collect();
        let alert = pluralize("follow_recommendations_with", None, &names, names.len())?;

        Ok(
            PushNotification::new(NotificationCategory::FollowRecommendations, alert)
                .with_argument("ids", ids)
                .with_origin(*user),
        )
    }
}
