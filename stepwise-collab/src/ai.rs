use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::PrimaryKey;

pub type SharedAiService = Arc<dyn AiService>;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Request to the AI service failed: {0}")]
    Request(String),
    #[error("AI service responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("AI service did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Invalid AI service URL: {0}")]
    InvalidUrl(String),
}

/// The external service that writes instructions and caches image analyses
#[async_trait]
pub trait AiService: Send + Sync {
    /// Rewrites a numbered list of instructions for someone with the given profile.
    /// The returned text holds one instruction per line.
    async fn generate(&self, base_description: &str, profile_context: &str)
        -> Result<String, AiError>;

    /// Drops everything the service cached for a room
    async fn invalidate(&self, room_id: PrimaryKey) -> Result<(), AiError>;
}

/// Runs an AI call, failing with [AiError::Timeout] if it takes longer than `limit`
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, AiError>
where
    F: Future<Output = Result<T, AiError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AiError::Timeout(limit))?
}

/// Talks to the AI service over HTTP
pub struct HttpAiService {
    client: Client,
    base: Url,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    base_description: &'a str,
    disability_info: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearCacheRequest {
    room_id: PrimaryKey,
}

impl HttpAiService {
    pub fn new(base: &str, api_key: impl Into<String>) -> Result<Self, AiError> {
        // Without a trailing slash, joining would replace the last path segment
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };

        let base = Url::parse(&base).map_err(|e| AiError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            client: Client::new(),
            base,
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AiError> {
        self.base
            .join(path)
            .map_err(|e| AiError::InvalidUrl(e.to_string()))
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Response, AiError> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl AiService for HttpAiService {
    async fn generate(
        &self,
        base_description: &str,
        profile_context: &str,
    ) -> Result<String, AiError> {
        let request = GenerateRequest {
            base_description,
            disability_info: profile_context,
        };

        let response: GenerateResponse = self
            .post("generate-description", &request)
            .await?
            .json()
            .await
            .map_err(|e| AiError::Request(e.to_string()))?;

        Ok(response.description)
    }

    async fn invalidate(&self, room_id: PrimaryKey) -> Result<(), AiError> {
        self.post("clear-cache", &ClearCacheRequest { room_id })
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_the_base_path() {
        let service = HttpAiService::new("http://localhost:8000/api", "secret").unwrap();

        assert_eq!(
            service.endpoint("clear-cache").unwrap().as_str(),
            "http://localhost:8000/api/clear-cache"
        );
    }

    #[test]
    fn invalid_base_urls_are_rejected() {
        assert!(matches!(
            HttpAiService::new("not a url", "secret"),
            Err(AiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn clear_cache_body_uses_camel_case() {
        let body = serde_json::to_value(ClearCacheRequest { room_id: 4 }).unwrap();
        assert_eq!(body, serde_json::json!({ "roomId": 4 }));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let limit = Duration::from_millis(10);
        let result = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AiError::Timeout(_))));
    }
}
