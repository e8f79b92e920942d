use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct FcmRequest {
    pub message: FcmMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct FcmMessage {
    pub token: String,
    pub data: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<AndroidConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns: Option<ApnsConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AndroidConfig {
    pub collapse_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApnsConfig {
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorResponse {
    pub error: FcmError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmError {
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorDetail {
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
}

impl FcmError {
    pub fn is_unregistered(&self) -> bool {
        self.details
            .iter()
            .any(|detail| detail.error_code.as_deref() == Some("UNREGISTERED"))
    }
}
