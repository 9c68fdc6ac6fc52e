// Restoration API Adapter
//
// Anti-Corruption Layer for HTTP photo-restoration servers (GFPGAN-style
// model hosts). Supports self-hosted deployments without external vendors.

use crate::domain::enhance::{EnhanceError, PhotoEnhancer};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

pub struct RestorationAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: Option<String>,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct RestoreRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    image: String,
}

#[derive(Deserialize)]
struct RestoreResponse {
    image: String,
}

impl RestorationAdapter {
    pub fn new(
        name: String,
        endpoint: String,
        model: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            name,
            endpoint,
            model,
            api_key,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }
}

#[async_trait]
impl PhotoEnhancer for RestorationAdapter {
    async fn enhance(&self, photo: &[u8]) -> Result<Vec<u8>, EnhanceError> {
        let request = RestoreRequest {
            model: self.model.clone(),
            image: BASE64.encode(photo),
        };

        let url = format!("{}/api/restore", self.endpoint.trim_end_matches('/'));

        let response = self
            .request(self.client.post(&url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EnhanceError::Provider(format!(
                "HTTP {status}: {error_text}"
            )));
        }

        let restore_response: RestoreResponse = response
            .json()
            .await
            .map_err(|e| EnhanceError::Provider(format!("Failed to parse response: {e}")))?;

        BASE64
            .decode(restore_response.image.as_bytes())
            .map_err(|e| EnhanceError::Provider(format!("Response image is not base64: {e}")))
    }

    async fn health_check(&self) -> Result<(), EnhanceError> {
        let url = format!("{}/api/health", self.endpoint.trim_end_matches('/'));

        let response = self.request(self.client.get(&url)).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EnhanceError::Network(format!("HTTP {}", response.status())))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
