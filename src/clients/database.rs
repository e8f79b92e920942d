use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::{
    error::StoreError,
    models::target::{RoomFrequency, Target},
    stores::{DeviceStore, FollowRecommender, SettingsStore, UserDirectory},
};

/// Settings columns with defaults for users that never saved any.
const SETTINGS_COLUMNS: &str = r#"
    COALESCE(s.room_frequency, 2::SMALLINT) AS room_frequency,
    COALESCE(s.follows, TRUE) AS follows,
    COALESCE(s.welcome_rooms, TRUE) AS welcome_rooms
"#;

pub struct DatabaseClient {
    client: Client,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }

    async fn targets(&self, query: &str, user_id: i64) -> Result<Vec<Target>, StoreError> {
        let rows = self
            .client
            .query(query, &[&user_id])
            .await
            .map_err(|e| anyhow!("Settings query failed: {}", e))?;

        rows.iter()
            .map(|row| target_from_row(row).map_err(StoreError::from))
            .collect()
    }
}

fn target_from_row(row: &Row) -> Result<Target, Error> {
    let read = |e: tokio_postgres::Error| anyhow!("Malformed settings row: {}", e);

    Ok(Target {
        user_id: row.try_get("user_id").map_err(read)?,
        room_frequency: RoomFrequency::from_code(row.try_get("room_frequency").map_err(read)?),
        notify_on_follow: row.try_get("follows").map_err(read)?,
        notify_on_welcome_room: row.try_get("welcome_rooms").map_err(read)?,
    })
}

#[async_trait]
impl SettingsStore for DatabaseClient {
    async fn settings_for_user(&self, user_id: i64) -> Result<Target, StoreError> {
        let query = format!(
            "SELECT s.user_id, {} FROM notification_settings s WHERE s.user_id = $1",
            SETTINGS_COLUMNS
        );

        let row = self
            .client
            .query_opt(query.as_str(), &[&user_id])
            .await
            .map_err(|e| anyhow!("Settings query failed: {}", e))?
            .ok_or(StoreError::NotFound)?;

        Ok(target_from_row(&row)?)
    }

    async fn settings_for_followers(&self, user_id: i64) -> Result<Vec<Target>, StoreError> {
        let query = format!(
            r#"
            SELECT f.follower AS user_id, {}
            FROM followers f
            LEFT JOIN notification_settings s ON s.user_id = f.follower
            WHERE f.user_id = $1
            "#,
            SETTINGS_COLUMNS
        );

        let targets = self.targets(&query, user_id).await?;
        debug!(user_id, followers = targets.len(), "Loaded follower settings");
        Ok(targets)
    }

    async fn settings_for_active_users(&self, limit: i64) -> Result<Vec<Target>, StoreError> {
        let query = format!(
            r#"
            SELECT a.user_id, {}
            FROM user_active_times a
            LEFT JOIN notification_settings s ON s.user_id = a.user_id
            ORDER BY a.last_active DESC
            LIMIT $1
            "#,
            SETTINGS_COLUMNS
        );

        self.targets(&query, limit).await
    }
}

#[async_trait]
impl DeviceStore for DatabaseClient {
    async fn devices_for_user(&self, user_id: i64) -> Result<Vec<String>, Error> {
        let rows = self
            .client
            .query("SELECT token FROM devices WHERE user_id = $1", &[&user_id])
            .await
            .map_err(|e| anyhow!("Device query failed: {}", e))?;

        rows.iter()
            .map(|row| {
                row.try_get("token")
                    .map_err(|e| anyhow!("Malformed device row: {}", e))
            })
            .collect()
    }

    async fn remove_device(&self, token: &str) -> Result<(), Error> {
        self.client
            .execute("DELETE FROM devices WHERE token = $1", &[&token])
            .await
            .map_err(|e| anyhow!("Device removal failed: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for DatabaseClient {
    async fn display_name(&self, user_id: i64) -> Result<Option<String>, Error> {
        let row = self
            .client
            .query_opt("SELECT display_name FROM users WHERE id = $1", &[&user_id])
            .await
            .map_err(|e| anyhow!("User query failed: {}", e))?;

        row.map(|row| {
            row.try_get("display_name")
                .map_err(|e| anyhow!("Malformed user row: {}", e))
        })
        .transpose()
    }
}

#[async_trait]
impl FollowRecommender for DatabaseClient {
    /// Accounts followed by the people `user_id` follows, ranked by how many
    /// of them follow it.
    async fn recommend(&self, user_id: i64, limit: i64) -> Result<Vec<i64>, Error> {
        let rows = self
            .client
            .query(
                r#"
                SELECT f2.user_id AS id
                FROM followers f1
                INNER JOIN followers f2 ON f2.follower = f1.user_id
                WHERE f1.follower = $1
                  AND f2.user_id <> $1
                  AND NOT EXISTS (
                      SELECT 1 FROM followers f3
                      WHERE f3.follower = $1 AND f3.user_id = f2.user_id
                  )
                GROUP BY f2.user_id
                ORDER BY COUNT(*) DESC, f2.user_id
                LIMIT $2
                "#,
                &[&user_id, &limit],
            )
            .await
            .map_err(|e| anyhow!("Recommendation query failed: {}", e))?;

        rows.iter()
            .map(|row| {
                row.try_get("id")
                    .map_err(|e| anyhow!("Malformed recommendation row: {}", e))
            })
            .collect()
    }

    async fn candidates(&self, limit: i64) -> Result<Vec<i64>, Error> {
        let rows = self
            .client
            .query(
                "SELECT user_id FROM user_active_times ORDER BY last_active DESC LIMIT $1",
                &[&limit],
            )
            .await
            .map_err(|e| anyhow!("Candidate query failed: {}", e))?;

        rows.iter()
            .map(|row| {
                row.try_get("user_id")
                    .map_err(|e| anyhow!("Malformed candidate row: {}", e))
            })
            .collect()
    }
}
