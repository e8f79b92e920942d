use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::{
    config::Config,
    error::DeliveryError,
    models::{
        fcm::{AndroidConfig, ApnsConfig, FcmErrorResponse, FcmMessage, FcmRequest},
        notification::PushNotification,
    },
    stores::PushGateway,
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

/// Envelope key under which the notification JSON travels in the data map.
pub const PAYLOAD_KEY: &str = "notification";

enum Credentials {
    Static(String),
    Google(Arc<dyn TokenProvider>),
}

pub struct FcmClient {
    http_client: Client,
    send_url: String,
    credentials: Credentials,
}

impl FcmClient {
    pub async fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(config.call_timeout())
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        let credentials = match &config.fcm_access_token {
            Some(token) => Credentials::Static(token.clone()),
            None => Credentials::Google(
                gcp_auth::provider()
                    .await
                    .map_err(|e| anyhow!("Failed to load Google credentials: {}", e))?,
            ),
        };

        info!(project_id = %config.fcm_project_id, "FCM client initialized");

        Ok(Self {
            http_client,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                config.fcm_endpoint.trim_end_matches('/'),
                config.fcm_project_id
            ),
            credentials,
        })
    }

    async fn bearer(&self) -> Result<String, Error> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Google(provider) => provider
                .token(FCM_SCOPES)
                .await
                .map(|token| token.as_str().to_string())
                .map_err(|e| anyhow!("Failed to obtain FCM access token: {}", e)),
        }
    }
}

pub fn fcm_request(
    device_token: &str,
    notification: &PushNotification,
) -> Result<FcmRequest, Error> {
    let payload = serde_json::to_string(notification)
        .map_err(|e| anyhow!("Failed to serialize notification: {}", e))?;

    let collapse_key = notification.collapse_key.clone();

    Ok(FcmRequest {
        message: FcmMessage {
            token: device_token.to_string(),
            data: HashMap::from([(PAYLOAD_KEY.to_string(), payload)]),
            android: collapse_key.clone().map(|collapse_key| AndroidConfig { collapse_key }),
            apns: collapse_key.map(|collapse_key| ApnsConfig {
                headers: HashMap::from([("apns-collapse-id".to_string(), collapse_key)]),
            }),
        },
    })
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(
        &self,
        device_token: &str,
        notification: &PushNotification,
    ) -> Result<(), DeliveryError> {
        let request = fcm_request(device_token, notification)?;
        let bearer = self.bearer().await?;

        let response = self
            .http_client
            .post(&self.send_url)
            .bearer_auth(bearer)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("FCM request failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            debug!(category = %notification.category, "FCM push notification sent");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<FcmErrorResponse>(&body).ok();

        // A bare 404 (wrong project or endpoint) is not a verdict on the token.
        if error.as_ref().is_some_and(|e| {
            e.error.is_unregistered()
                || (status == StatusCode::NOT_FOUND
                    && e.error.status.as_deref() == Some("NOT_FOUND"))
        }) {
            return Err(DeliveryError::Unregistered);
        }

        let reason = error
            .and_then(|e| e.error.message.or(e.error.status))
            .unwrap_or(body);

        Err(DeliveryError::Other(anyhow!(
            "FCM request failed with {}: {}",
            status,
            reason
        )))
    }
}
