//! `reqwest` client for the face and device services.

use std::time::Duration;

use async_trait::async_trait;
use homegate_core::{
    CapturedImage, DeviceService, DoorAction, DoorLock, Enrollment, FaceService, ServiceError,
    VerifyOutcome,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};

use crate::wire;

pub const DEFAULT_API_URL: &str = "http://localhost:4000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL the service paths are joined onto.
    pub base_url: String,
    /// Bearer token sent on every request.
    pub auth_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Implements both [`FaceService`] and [`DeviceService`] against one API
/// gateway.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and collect status plus body text. Only transport failures are
    /// errors here; status handling belongs to the caller.
    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<(u16, String), ServiceError> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(request = what, error = %e, "request failed");
            ServiceError::Transport(e.to_string())
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        tracing::debug!(request = what, status, bytes = body.len(), "response received");
        Ok((status, body))
    }
}

fn image_part(image: &CapturedImage) -> Result<Part, ServiceError> {
    Part::bytes(image.bytes().to_vec())
        .file_name(image.file_name())
        .mime_str(image.mime())
        .map_err(|e| ServiceError::Transport(e.to_string()))
}

#[async_trait]
impl FaceService for ApiClient {
    async fn verify(
        &self,
        image: &CapturedImage,
        room_id: Option<&str>,
    ) -> Result<VerifyOutcome, ServiceError> {
        let mut form = Form::new().part("image", image_part(image)?);
        if let Some(room_id) = room_id {
            form = form.text("room_id", room_id.to_string());
        }
        if let Some(token) = &self.auth_token {
            form = form.text("auth_token", token.clone());
        }

        let (status, body) = self
            .send(self.request(Method::POST, "faces/verify").multipart(form), "verify")
            .await?;
        wire::classify_verify(status, &body)
    }

    async fn enroll(
        &self,
        user_id: &str,
        allowed_rooms: &[String],
        image: &CapturedImage,
    ) -> Result<Enrollment, ServiceError> {
        let rooms = serde_json::to_string(allowed_rooms)
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        let form = Form::new()
            .text("user_id", user_id.to_string())
            .text("allowed_rooms", rooms)
            .part("image", image_part(image)?);

        let (status, body) = self
            .send(self.request(Method::POST, "faces/enroll").multipart(form), "enroll")
            .await?;
        wire::classify_enroll(status, &body)
    }
}

#[async_trait]
impl DeviceService for ApiClient {
    async fn door_locks(&self) -> Result<Vec<DoorLock>, ServiceError> {
        let builder = self
            .request(Method::GET, "devices")
            .query(&[("device_type", wire::DOOR_LOCK_TYPE)]);
        let (status, body) = self.send(builder, "door_locks").await?;
        wire::classify_door_locks(status, &body)
    }

    async fn control(&self, device_id: &str, action: DoorAction) -> Result<(), ServiceError> {
        let path = format!("devices/{device_id}/control");
        let builder = self
            .request(Method::POST, &path)
            .json(&serde_json::json!({ "action": action }));
        let (status, body) = self.send(builder, "control").await?;
        wire::classify_control(status, &body)
    }
}
