/// Generation gateway boundary
///
/// The engine only knows these request/response contracts; transport and
/// model routing live behind the trait.
pub mod http;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use canvas_graph::NodeId;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    Configuration(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    InvalidResponse(String),
    /// Explicit error response from the generation backend.
    #[error("{0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn transport(msg: impl Into<String>) -> Self {
        ProviderError::Transport(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        ProviderError::InvalidResponse(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        ProviderError::Rejected(msg.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRequest {
    pub node_id: NodeId,
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    pub variation_count: u32,
    #[serde(default)]
    pub input_images: Vec<String>,
    #[serde(default)]
    pub intensity: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageResult {
    /// Primary result reference. Its absence upstream is a hard failure.
    pub url: String,
    /// All produced references when the model returned several natively.
    #[serde(default)]
    pub all_urls: Option<Vec<String>>,
}

impl ImageResult {
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            all_urls: None,
        }
    }

    /// Every produced reference, primary first when no full list came back.
    pub fn urls(&self) -> Vec<String> {
        match &self.all_urls {
            Some(urls) if !urls.is_empty() => urls.clone(),
            _ => vec![self.url.clone()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoRequest {
    pub node_id: NodeId,
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub start_frame: Option<String>,
    #[serde(default)]
    pub end_frame: Option<String>,
    /// Mutually exclusive with start/end frames.
    #[serde(default)]
    pub reference_images: Vec<String>,
    /// Motion-control source video.
    #[serde(default)]
    pub motion_source: Option<String>,
    #[serde(default)]
    pub generate_audio: bool,
    #[serde(default)]
    pub intensity: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoResult {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalModelRequest {
    pub node_id: NodeId,
    /// Model identifier or filesystem path.
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Image,
    Video,
}

/// Answer to a generation status query, keyed by node id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub state: StatusState,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kind: Option<ResultKind>,
    /// When the result was produced; the freshness guard compares this
    /// against the node's generation start time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn pending() -> Self {
        Self {
            state: StatusState::Pending,
            url: None,
            kind: None,
            created_at: None,
            error: None,
        }
    }

    pub fn success(url: impl Into<String>) -> Self {
        Self {
            state: StatusState::Success,
            url: Some(url.into()),
            kind: None,
            created_at: None,
            error: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            state: StatusState::Error,
            url: None,
            kind: None,
            created_at: None,
            error: Some(detail.into()),
        }
    }

    pub fn with_kind(mut self, kind: ResultKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Asynchronous generation gateway.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResult, ProviderError>;

    async fn generate_video(&self, request: VideoRequest) -> Result<VideoResult, ProviderError>;

    async fn generate_local_image(
        &self,
        request: LocalModelRequest,
    ) -> Result<ImageResult, ProviderError>;

    /// Status of the most recent generation dispatched for a node. Used by
    /// the recovery poller after in-session state was lost.
    async fn generation_status(&self, node_id: NodeId) -> Result<StatusResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_result_urls() {
        let single = ImageResult::single("a.png");
        assert_eq!(single.urls(), vec!["a.png".to_string()]);

        let multi = ImageResult {
            url: "a.png".to_string(),
            all_urls: Some(vec!["a.png".to_string(), "b.png".to_string()]),
        };
        assert_eq!(multi.urls().len(), 2);
    }

    #[test]
    fn test_status_response_builders() {
        let status = StatusResponse::success("out.mp4").with_kind(ResultKind::Video);
        assert_eq!(status.state, StatusState::Success);
        assert_eq!(status.kind, Some(ResultKind::Video));
        assert!(status.error.is_none());
    }
}
