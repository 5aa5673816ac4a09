/// HTTP generation gateway
///
/// Thin reqwest adapter over the generation service's REST surface. The
/// engine treats any non-2xx or a response without a result reference as a
/// hard failure for the call.
use async_trait::async_trait;
use serde::Deserialize;

use canvas_graph::NodeId;

use super::{
    GenerationProvider, ImageRequest, ImageResult, LocalModelRequest, ProviderError,
    StatusResponse, VideoRequest, VideoResult,
};

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl HttpProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

pub struct HttpProvider {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.config.base_url, path));
        if let Some(key) = &self.config.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::rejected(format!("{status} - {body}")))
    }
}

#[async_trait]
impl GenerationProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResult, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/images")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;
        let response = Self::check(response).await?;

        let body: ImageResponseBody = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;
        let url = body
            .url
            .ok_or_else(|| ProviderError::invalid_response("response missing result reference"))?;
        Ok(ImageResult {
            url,
            all_urls: body.urls,
        })
    }

    async fn generate_video(&self, request: VideoRequest) -> Result<VideoResult, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/videos")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;
        let response = Self::check(response).await?;

        let body: VideoResponseBody = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;
        let url = body
            .url
            .ok_or_else(|| ProviderError::invalid_response("response missing result reference"))?;
        Ok(VideoResult { url })
    }

    async fn generate_local_image(
        &self,
        request: LocalModelRequest,
    ) -> Result<ImageResult, ProviderError> {
        let response = self
            .request(reqwest::Method::POST, "/v1/local-images")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;
        let response = Self::check(response).await?;

        let body: LocalImageResponseBody = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))?;
        if !body.success {
            return Err(ProviderError::rejected(
                body.error.unwrap_or_else(|| "local model failed".to_string()),
            ));
        }
        let url = body
            .url
            .ok_or_else(|| ProviderError::invalid_response("response missing result reference"))?;
        Ok(ImageResult::single(url))
    }

    async fn generation_status(&self, node_id: NodeId) -> Result<StatusResponse, ProviderError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/generations/{node_id}"),
            )
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ImageResponseBody {
    url: Option<String>,
    #[serde(default)]
    urls: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct VideoResponseBody {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocalImageResponseBody {
    success: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
