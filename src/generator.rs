use crate::config::GeneratorConfig;
use crate::error::{AppError, AppResult};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Produces prize copy and artwork. Fallible; callers keep their previous
/// values when a call fails.
pub trait PrizeContentGenerator: Send + Sync {
    fn generate_description<'a>(
        &'a self,
        prize_label: &'a str,
        instruction: &'a str,
    ) -> BoxFuture<'a, AppResult<String>>;

    /// Returns an image data URL or remote URL
    fn generate_image<'a>(&'a self, prize_label: &'a str) -> BoxFuture<'a, AppResult<String>>;
}

#[derive(Deserialize)]
struct DescriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct ImageResponse {
    image: String,
}

/// Generator backed by an HTTP service exposing
/// `POST /generate-description` and `POST /generate-image`
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Build from config, `None` when no URL is set
    pub fn from_config(config: &GeneratorConfig) -> Option<Self> {
        config
            .url
            .as_deref()
            .map(|url| Self::new(url, config.timeout()))
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> AppResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!("Generator request to {} failed: {}", url, e);
                AppError::ExternalService(format!("generator unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "generator returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::ExternalService(format!("invalid generator response: {}", e)))
    }
}

fn non_empty(value: String, what: &str) -> AppResult<String> {
    if value.trim().is_empty() {
        return Err(AppError::ExternalService(format!("generator returned empty {}", what)));
    }
    Ok(value)
}

impl PrizeContentGenerator for HttpGenerator {
    fn generate_description<'a>(
        &'a self,
        prize_label: &'a str,
        instruction: &'a str,
    ) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "prize_label": prize_label,
                "instruction": instruction,
            });
            let response: DescriptionResponse = self.post("generate-description", body).await?;
            info!("Generated description for {}", prize_label);
            non_empty(response.text, "description")
        })
    }

    fn generate_image<'a>(&'a self, prize_label: &'a str) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async move {
            let body = serde_json::json!({ "prize_label": prize_label });
            let response: ImageResponse = self.post("generate-image", body).await?;
            info!("Generated image for {}", prize_label);
            non_empty(response.image, "image")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_url() {
        assert!(HttpGenerator::from_config(&GeneratorConfig::default()).is_none());

        let config = GeneratorConfig {
            url: Some("http://localhost:9000/".to_string()),
            timeout_secs: 1,
        };
        let generator = HttpGenerator::from_config(&config).unwrap();
        assert_eq!(generator.base_url, "http://localhost:9000");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_external_error() {
        let generator = HttpGenerator::new("http://127.0.0.1:9", Duration::from_millis(200));
        let result = generator.generate_image("Moto").await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));
    }
}
