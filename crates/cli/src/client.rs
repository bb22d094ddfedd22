//! API client for communicating with a running sensor agent

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use sensor_lib::{
    analysis::AlertRecord, pipeline::TallySnapshot, Channel, DeviceSnapshot, HealthResponse,
    LinkStatus,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the agent HTTP API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response)
            .await?
            .json()
            .await
            .context("Failed to parse response")
    }

    /// Make a DELETE request, ignoring any body
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .context("Failed to send request")?;

        check_status(response).await?;
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        // 503 still carries the report
        let url = self.base_url.join("healthz").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn summary(&self) -> Result<Summary> {
        self.get("api/v1/summary").await
    }

    pub async fn devices(&self) -> Result<Vec<DeviceSnapshot>> {
        self.get("api/v1/devices").await
    }

    pub async fn set_device_active(&self, device_id: &str, active: bool) -> Result<DeviceSnapshot> {
        let path = format!("api/v1/devices/{}/active", device_id);
        self.post(&path, &ActivationRequest { active }).await
    }

    pub async fn alerts(&self, channel: Option<Channel>, limit: usize) -> Result<Vec<AlertRecord>> {
        let mut path = format!("api/v1/alerts?limit={}", limit);
        if let Some(channel) = channel {
            path.push_str(&format!("&channel={}", channel));
        }
        self.get(&path).await
    }

    pub async fn clear_alerts(&self) -> Result<()> {
        self.delete("api/v1/alerts").await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({}): {}", status, body);
    }
    Ok(response)
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub link: LinkStatus,
    pub devices: usize,
    pub active_devices: usize,
    pub tally: TallySnapshot,
    pub alerts_stored: usize,
    #[serde(default)]
    pub readings_dropped: u64,
    pub generated_at: DateTime<Utc>,
}
