/// Scripted gateway for tests and headless dry runs.
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use canvas_graph::NodeId;

use super::{
    GenerationProvider, ImageRequest, ImageResult, LocalModelRequest, ProviderError,
    StatusResponse, VideoRequest, VideoResult,
};

/// Pops scripted outcomes in call order; once a queue runs dry every further
/// call succeeds with a synthetic reference. Requests are logged so tests
/// can assert on resolved payloads.
#[derive(Default)]
pub struct MockProvider {
    image_outcomes: Mutex<VecDeque<Result<ImageResult, ProviderError>>>,
    video_outcomes: Mutex<VecDeque<Result<VideoResult, ProviderError>>>,
    status_outcomes: Mutex<VecDeque<Result<StatusResponse, ProviderError>>>,
    pub image_requests: Mutex<Vec<ImageRequest>>,
    pub video_requests: Mutex<Vec<VideoRequest>>,
    pub local_requests: Mutex<Vec<LocalModelRequest>>,
    pub status_queries: Mutex<Vec<NodeId>>,
    counter: Mutex<u32>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_image(&self, outcome: Result<ImageResult, ProviderError>) {
        self.image_outcomes.lock().push_back(outcome);
    }

    pub fn script_image_ok(&self, url: impl Into<String>) {
        self.script_image(Ok(ImageResult::single(url)));
    }

    pub fn script_image_err(&self, message: impl Into<String>) {
        self.script_image(Err(ProviderError::rejected(message)));
    }

    pub fn script_video(&self, outcome: Result<VideoResult, ProviderError>) {
        self.video_outcomes.lock().push_back(outcome);
    }

    pub fn script_video_ok(&self, url: impl Into<String>) {
        self.script_video(Ok(VideoResult { url: url.into() }));
    }

    pub fn script_status(&self, outcome: Result<StatusResponse, ProviderError>) {
        self.status_outcomes.lock().push_back(outcome);
    }

    fn synthetic_url(&self, ext: &str) -> String {
        let mut counter = self.counter.lock();
        *counter += 1;
        format!("mock://result-{}.{ext}", *counter)
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_image(&self, request: ImageRequest) -> Result<ImageResult, ProviderError> {
        self.image_requests.lock().push(request);
        match self.image_outcomes.lock().pop_front() {
            Some(outcome) => outcome,
            None => Ok(ImageResult::single(self.synthetic_url("png"))),
        }
    }

    async fn generate_video(&self, request: VideoRequest) -> Result<VideoResult, ProviderError> {
        self.video_requests.lock().push(request);
        match self.video_outcomes.lock().pop_front() {
            Some(outcome) => outcome,
            None => Ok(VideoResult {
                url: self.synthetic_url("mp4"),
            }),
        }
    }

    async fn generate_local_image(
        &self,
        request: LocalModelRequest,
    ) -> Result<ImageResult, ProviderError> {
        self.local_requests.lock().push(request);
        match self.image_outcomes.lock().pop_front() {
            Some(outcome) => outcome,
            None => Ok(ImageResult::single(self.synthetic_url("png"))),
        }
    }

    async fn generation_status(&self, node_id: NodeId) -> Result<StatusResponse, ProviderError> {
        self.status_queries.lock().push(node_id);
        match self.status_outcomes.lock().pop_front() {
            Some(outcome) => outcome,
            None => Ok(StatusResponse::pending()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_graph::NodeId;

    fn image_request() -> ImageRequest {
        ImageRequest {
            node_id: NodeId::new(),
            model: "flux-dev".to_string(),
            prompt: "a cat".to_string(),
            aspect_ratio: None,
            resolution: None,
            variation_count: 1,
            input_images: vec![],
            intensity: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_outcomes_pop_in_order() {
        let provider = MockProvider::new();
        provider.script_image_ok("first.png");
        provider.script_image_err("boom");

        let first = provider.generate_image(image_request()).await.unwrap();
        assert_eq!(first.url, "first.png");
        assert!(provider.generate_image(image_request()).await.is_err());
        // Queue exhausted: synthetic success.
        assert!(provider.generate_image(image_request()).await.is_ok());
        assert_eq!(provider.image_requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_status_defaults_to_pending() {
        let provider = MockProvider::new();
        let status = provider.generation_status(NodeId::new()).await.unwrap();
        assert_eq!(status.state, super::super::StatusState::Pending);
    }
}
