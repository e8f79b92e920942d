use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use futures_util::future::join_all;

use crate::{
    error::StoreError,
    models::{event::Event, target::Target},
    stores::SettingsStore,
    utils::with_timeout,
};

/// Works out who should hear about an event, with their preferences.
///
/// A missing settings row means default preferences, and a missing follower
/// list means nobody; only real lookup failures are errors.
#[derive(Clone)]
pub struct TargetResolver {
    settings: Arc<dyn SettingsStore>,
    greeters: Vec<i64>,
    welcome_recent_limit: i64,
    call_timeout: Duration,
}

impl TargetResolver {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        greeters: Vec<i64>,
        welcome_recent_limit: i64,
        call_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            greeters,
            welcome_recent_limit,
            call_timeout,
        }
    }

    pub async fn targets(&self, event: &Event) -> Result<Vec<Target>, Error> {
        let targets = match event {
            Event::NewFollower { followee, .. } => vec![self.user(*followee).await?]
                .into_iter()
                .filter(|target| target.notify_on_follow)
                .collect(),
            Event::RoomCreation { creator, .. } | Event::RoomJoin { creator, .. } => self
                .followers(*creator)
                .await?
                .into_iter()
                .filter(Target::wants_room_notifications)
                .collect(),
            Event::RoomInvite { target, .. } => vec![self.user(*target).await?],
            Event::WelcomeRoom { user, .. } => self
                .welcomers(*user)
                .await?
                .into_iter()
                .filter(|target| target.notify_on_welcome_room)
                .collect(),
            Event::FollowRecommendations { user, .. } => vec![self.user(*user).await?],
        };

        Ok(targets)
    }

    async fn user(&self, user_id: i64) -> Result<Target, Error> {
        match with_timeout(
            self.call_timeout,
            "settings lookup",
            self.settings.settings_for_user(user_id),
        )
        .await
        {
            Ok(target) => Ok(target),
            Err(StoreError::NotFound) => Ok(Target::with_defaults(user_id)),
            Err(StoreError::Other(e)) => {
                Err(anyhow!("Settings lookup for {} failed: {}", user_id, e))
            }
        }
    }

    async fn followers(&self, user_id: i64) -> Result<Vec<Target>, Error> {
        match with_timeout(
            self.call_timeout,
            "follower settings lookup",
            self.settings.settings_for_followers(user_id),
        )
        .await
        {
            Ok(targets) => Ok(targets),
            Err(StoreError::NotFound) => Ok(Vec::new()),
            Err(StoreError::Other(e)) => {
                Err(anyhow!("Follower lookup for {} failed: {}", user_id, e))
            }
        }
    }

    /// Recently active users followed by the configured greeters, without
    /// duplicates and without the newcomer.
    async fn welcomers(&self, newcomer: i64) -> Result<Vec<Target>, Error> {
        let active = match with_timeout(
            self.call_timeout,
            "active user lookup",
            self.settings
                .settings_for_active_users(self.welcome_recent_limit),
        )
        .await
        {
            Ok(targets) => targets,
            Err(StoreError::NotFound) => Vec::new(),
            Err(StoreError::Other(e)) => return Err(anyhow!("Active user lookup failed: {}", e)),
        };

        let greeters = join_all(self.greeters.iter().map(|id| self.user(*id)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, Error>>()?;

        let mut seen = HashSet::from([newcomer]);
        Ok(active
            .into_iter()
            .take(self.welcome_recent_limit.max(0) as usize)
            .chain(greeters)
            .filter(|target| seen.insert(target.user_id))
            .collect())
    }
}
