/// Media probe boundary
///
/// Derived artifacts (pixel dimensions for aspect detection, the final video
/// frame used for chaining) come from an adjacent media service. Probe
/// failures never escalate a generation outcome; the caller just leaves the
/// derived field unset.
use async_trait::async_trait;
use image::GenericImageView;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Decode(String),
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Pixel dimensions of an image reference.
    async fn image_dimensions(&self, url: &str) -> Result<(u32, u32), ProbeError>;

    /// Played-back pixel dimensions of a video reference.
    async fn video_dimensions(&self, url: &str) -> Result<(u32, u32), ProbeError>;

    /// Extract the final frame of a video and return a reference to the
    /// produced still.
    async fn extract_last_frame(&self, url: &str) -> Result<String, ProbeError>;
}

/// Probe backed by the media service: images are downloaded and decoded
/// locally, video probing is delegated to the service endpoints.
pub struct HttpMediaProbe {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMediaProbe {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DimensionsBody {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct LastFrameBody {
    url: String,
}

#[async_trait]
impl MediaProbe for HttpMediaProbe {
    async fn image_dimensions(&self, url: &str) -> Result<(u32, u32), ProbeError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        let image = image::load_from_memory(&bytes).map_err(|e| ProbeError::Decode(e.to_string()))?;
        Ok(image.dimensions())
    }

    async fn video_dimensions(&self, url: &str) -> Result<(u32, u32), ProbeError> {
        let response = self
            .client
            .get(format!("{}/v1/probe", self.base_url))
            .query(&[("url", url)])
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProbeError::Transport(format!(
                "probe failed: {}",
                response.status()
            )));
        }
        let body: DimensionsBody = response
            .json()
            .await
            .map_err(|e| ProbeError::Decode(e.to_string()))?;
        Ok((body.width, body.height))
    }

    async fn extract_last_frame(&self, url: &str) -> Result<String, ProbeError> {
        let response = self
            .client
            .post(format!("{}/v1/last-frame", self.base_url))
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProbeError::Transport(format!(
                "last-frame extraction failed: {}",
                response.status()
            )));
        }
        let body: LastFrameBody = response
            .json()
            .await
            .map_err(|e| ProbeError::Decode(e.to_string()))?;
        Ok(body.url)
    }
}

/// Fixed-answer probe for tests.
pub struct MockProbe {
    pub dimensions: (u32, u32),
    pub fail: bool,
}

impl Default for MockProbe {
    fn default() -> Self {
        Self {
            dimensions: (1024, 1024),
            fail: false,
        }
    }
}

impl MockProbe {
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            dimensions: (width, height),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            dimensions: (0, 0),
            fail: true,
        }
    }
}

#[async_trait]
impl MediaProbe for MockProbe {
    async fn image_dimensions(&self, _url: &str) -> Result<(u32, u32), ProbeError> {
        if self.fail {
            return Err(ProbeError::Transport("probe unavailable".to_string()));
        }
        Ok(self.dimensions)
    }

    async fn video_dimensions(&self, _url: &str) -> Result<(u32, u32), ProbeError> {
        if self.fail {
            return Err(ProbeError::Transport("probe unavailable".to_string()));
        }
        Ok(self.dimensions)
    }

    async fn extract_last_frame(&self, url: &str) -> Result<String, ProbeError> {
        if self.fail {
            return Err(ProbeError::Transport("probe unavailable".to_string()));
        }
        Ok(format!("{url}#last-frame"))
    }
}
