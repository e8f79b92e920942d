use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::{config::Config, models::room::RoomState, stores::RoomDirectory};

/// Reads live room state from the room service.
pub struct RoomServiceClient {
    http_client: Client,
    base_url: String,
}

impl RoomServiceClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(config.call_timeout())
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        Ok(Self::with_client(http_client, &config.room_service_url))
    }

    pub fn with_client(http_client: Client, base_url: &str) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RoomDirectory for RoomServiceClient {
    async fn room(&self, room_id: &str) -> Result<Option<RoomState>, Error> {
        let url = format!("{}/api/v1/rooms/{}", self.base_url, room_id);

        debug!(room = %room_id, "Fetching room state");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Room service request failed: {}", e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            return Err(anyhow!("Room service returned status {}", status));
        }

        let room = response
            .json::<RoomState>()
            .await
            .map_err(|e| anyhow!("Failed to parse room state JSON: {}", e))?;

        Ok(Some(room))
    }
}
