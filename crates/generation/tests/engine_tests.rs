/// End-to-end engine scenarios against the scripted provider.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use canvas_graph::{Node, NodeId, NodeKind, NodeStatus, NodeStore, VideoMode};
use chrono::Utc;
use generation::providers::mock::MockProvider;
use generation::providers::StatusResponse;
use generation::{
    EngineConfig, GenerationEngine, GenerationProvider, ImageRequest, ImageResult,
    LocalModelRequest, MockProbe, ProviderError, VideoRequest, VideoResult,
};

/// Gateway whose calls never resolve, for driving the engine mid-flight.
struct StalledProvider;

#[async_trait]
impl GenerationProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate_image(&self, _request: ImageRequest) -> Result<ImageResult, ProviderError> {
        std::future::pending().await
    }

    async fn generate_video(&self, _request: VideoRequest) -> Result<VideoResult, ProviderError> {
        std::future::pending().await
    }

    async fn generate_local_image(
        &self,
        _request: LocalModelRequest,
    ) -> Result<ImageResult, ProviderError> {
        std::future::pending().await
    }

    async fn generation_status(&self, _node_id: NodeId) -> Result<StatusResponse, ProviderError> {
        Ok(StatusResponse::pending())
    }
}

fn engine_with(
    nodes: Vec<Node>,
    probe: MockProbe,
) -> (GenerationEngine, Arc<NodeStore>, Arc<MockProvider>) {
    let store = Arc::new(NodeStore::new(nodes));
    let provider = Arc::new(MockProvider::new());
    let engine = GenerationEngine::new(
        store.clone(),
        provider.clone(),
        Arc::new(probe),
        EngineConfig::default(),
    );
    (engine, store, provider)
}

fn text_node(prompt: &str) -> Node {
    Node::new(NodeKind::Text).with_prompt(prompt)
}

fn image_node_with_result(url: &str) -> Node {
    let mut node = Node::new(NodeKind::Image);
    node.status = NodeStatus::Success;
    node.result_url = Some(url.to_string());
    node
}

#[tokio::test]
async fn test_text_to_image_single_success() {
    let text = text_node("a lighthouse at dusk");
    let mut image = Node::new(NodeKind::Image).with_parents(vec![text.id]);
    image.image_model = Some("flux-dev".to_string());
    let image_id = image.id;

    let (engine, store, provider) = engine_with(vec![text, image], MockProbe::default());
    provider.script_image_ok("https://cdn.test/lighthouse.png");

    engine.generate(image_id).await;

    let node = store.get(image_id).unwrap();
    assert_eq!(node.status, NodeStatus::Success);
    assert_eq!(node.result_url.as_deref(), Some("https://cdn.test/lighthouse.png"));
    assert!(node.result_urls.is_none());
    assert_eq!(node.carousel_settings.len(), 1);
    assert!(node.error_message.is_none());
    assert!(node.generation_start_time.is_none());

    let requests = provider.image_requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "a lighthouse at dusk");
    assert_eq!(requests[0].variation_count, 1);
}

#[tokio::test]
async fn test_parent_prompt_composes_before_own() {
    let text = text_node("wide shot of a harbor");
    let style = Node::new(NodeKind::Style).with_prompt("in watercolor");
    let mut image = Node::new(NodeKind::Image)
        .with_parents(vec![text.id, style.id])
        .with_prompt("morning light");
    image.image_model = Some("flux-dev".to_string());
    let image_id = image.id;

    let (engine, _store, provider) = engine_with(vec![text, style, image], MockProbe::default());
    engine.generate(image_id).await;

    let requests = provider.image_requests.lock().clone();
    assert_eq!(
        requests[0].prompt,
        "wide shot of a harbor\n\nin watercolor\n\nmorning light"
    );
}

#[tokio::test]
async fn test_missing_prompt_aborts_without_touching_node() {
    let mut image = Node::new(NodeKind::Image);
    image.image_model = Some("flux-dev".to_string());
    let image_id = image.id;

    let (engine, store, provider) = engine_with(vec![image], MockProbe::default());
    engine.generate(image_id).await;

    let node = store.get(image_id).unwrap();
    assert_eq!(node.status, NodeStatus::Idle);
    assert!(node.generation_start_time.is_none());
    assert!(provider.image_requests.lock().is_empty());
}

#[tokio::test]
async fn test_provider_rejection_settles_error_with_normalized_message() {
    let mut image = Node::new(NodeKind::Image).with_prompt("a cat");
    image.image_model = Some("flux-dev".to_string());
    let image_id = image.id;

    let (engine, store, provider) = engine_with(vec![image], MockProbe::default());
    provider.script_image_err("403 - insufficient permissions for model");

    engine.generate(image_id).await;

    let node = store.get(image_id).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    let message = node.error_message.unwrap();
    assert!(message.contains("credentials"), "got: {message}");
    assert!(node.generation_start_time.is_none());
}

#[tokio::test]
async fn test_aspect_detection_labels_result() {
    let mut image = Node::new(NodeKind::Image).with_prompt("a skyline");
    image.image_model = Some("flux-dev".to_string());
    let image_id = image.id;

    let (engine, store, _provider) = engine_with(vec![image], MockProbe::with_dimensions(1920, 1080));
    engine.generate(image_id).await;

    let node = store.get(image_id).unwrap();
    assert_eq!(node.detected_aspect_ratio.as_deref(), Some("16:9"));
    assert_eq!(node.aspect_ratio_label.as_deref(), Some("16:9"));
}

#[tokio::test]
async fn test_regeneration_fan_out_with_partial_failures() {
    let mut image = Node::new(NodeKind::Image).with_prompt("a fox");
    image.image_model = Some("seedream-4".to_string());
    image.variation_count = Some(4);
    image.status = NodeStatus::Success;
    image.result_url = Some("old.png".to_string());
    let image_id = image.id;

    let (engine, store, provider) = engine_with(vec![image], MockProbe::default());
    provider.script_image_ok("v1.png");
    provider.script_image_err("boom");
    provider.script_image_ok("v2.png");
    provider.script_image_err("boom");

    engine.generate(image_id).await;

    let node = store.get(image_id).unwrap();
    assert_eq!(node.status, NodeStatus::Success);
    assert_eq!(node.error_message.as_deref(), Some("Some variations failed"));
    // Prior single result plus the two surviving variations.
    assert_eq!(node.carousel_len(), 3);
    assert_eq!(node.carousel_index, 1);
    assert!(node.image_variations.is_none());

    // Four independent single-variation calls went out.
    let requests = provider.image_requests.lock().clone();
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|r| r.variation_count == 1));
}

#[tokio::test]
async fn test_fan_out_total_failure_preserves_carousel() {
    let mut image = Node::new(NodeKind::Image).with_prompt("a fox");
    image.image_model = Some("flux-kontext-pro".to_string());
    image.variation_count = Some(2);
    image.status = NodeStatus::Success;
    image.result_url = Some("old.png".to_string());
    let image_id = image.id;

    let (engine, store, provider) = engine_with(vec![image], MockProbe::default());
    provider.script_image_err("boom");
    provider.script_image_err("boom");

    engine.generate(image_id).await;

    let node = store.get(image_id).unwrap();
    assert_eq!(node.status, NodeStatus::Error);
    assert_eq!(node.error_message.as_deref(), Some("All image variations failed"));
    assert_eq!(node.result_url.as_deref(), Some("old.png"));
    assert_eq!(node.carousel_len(), 1);
}

#[tokio::test]
async fn test_non_family_model_sends_native_variation_count() {
    let mut image = Node::new(NodeKind::Image).with_prompt("a fox");
    image.image_model = Some("flux-dev".to_string());
    image.variation_count = Some(4);
    let image_id = image.id;

    let (engine, _store, provider) = engine_with(vec![image], MockProbe::default());
    engine.generate(image_id).await;

    let requests = provider.image_requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].variation_count, 4);
}

#[tokio::test]
async fn test_local_image_model_routes_to_local_call() {
    let mut node = Node::new(NodeKind::LocalImageModel).with_prompt("a barn owl");
    node.image_model = Some("/models/sdxl.safetensors".to_string());
    let node_id = node.id;

    let (engine, store, provider) = engine_with(vec![node], MockProbe::default());
    engine.generate(node_id).await;

    assert_eq!(store.get(node_id).unwrap().status, NodeStatus::Success);
    assert_eq!(provider.local_requests.lock().len(), 1);
    assert!(provider.image_requests.lock().is_empty());
}

#[tokio::test]
async fn test_video_frame_pair_from_two_image_parents() {
    let start = image_node_with_result("start.png");
    let end = image_node_with_result("end.png");
    let mut video = Node::new(NodeKind::Video)
        .with_parents(vec![start.id, end.id])
        .with_prompt("slow pan");
    video.video_model = Some("kling-2.1".to_string());
    let video_id = video.id;

    let (engine, store, provider) = engine_with(vec![start, end, video], MockProbe::default());
    provider.script_video_ok("https://cdn.test/pan.mp4");

    engine.generate(video_id).await;

    let requests = provider.video_requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].start_frame.as_deref(), Some("start.png"));
    assert_eq!(requests[0].end_frame.as_deref(), Some("end.png"));
    assert!(requests[0].reference_images.is_empty());

    let node = store.get(video_id).unwrap();
    assert_eq!(node.status, NodeStatus::Success);
    assert_eq!(node.result_url.as_deref(), Some("https://cdn.test/pan.mp4"));
    assert_eq!(
        node.last_frame.as_deref(),
        Some("https://cdn.test/pan.mp4#last-frame")
    );
}

#[tokio::test]
async fn test_video_reference_mode_collects_ingredients() {
    let a = image_node_with_result("a.png");
    let b = image_node_with_result("b.png");
    let c = image_node_with_result("c.png");
    let mut video = Node::new(NodeKind::Video)
        .with_parents(vec![a.id, b.id, c.id])
        .with_prompt("the three subjects together");
    video.video_model = Some("veo-3".to_string());
    video.video_mode = Some(VideoMode::Reference);
    let video_id = video.id;

    let (engine, _store, provider) = engine_with(vec![a, b, c, video], MockProbe::default());
    engine.generate(video_id).await;

    let requests = provider.video_requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].start_frame.is_none());
    assert_eq!(
        requests[0].reference_images,
        vec!["a.png".to_string(), "b.png".to_string(), "c.png".to_string()]
    );
}

#[tokio::test]
async fn test_chained_videos_hand_on_last_frame() {
    let mut first = Node::new(NodeKind::Video);
    first.status = NodeStatus::Success;
    first.result_url = Some("first.mp4".to_string());
    first.last_frame = Some("first-last.png".to_string());
    let mut second = Node::new(NodeKind::Video)
        .with_parents(vec![first.id])
        .with_prompt("continue the motion");
    second.video_model = Some("veo-3".to_string());
    let second_id = second.id;

    let (engine, _store, provider) = engine_with(vec![first, second], MockProbe::default());
    engine.generate(second_id).await;

    let requests = provider.video_requests.lock().clone();
    assert_eq!(requests[0].start_frame.as_deref(), Some("first-last.png"));
    assert!(requests[0].end_frame.is_none());
}

#[tokio::test]
async fn test_cancel_mid_flight_restores_pre_generation_state() {
    let mut image = Node::new(NodeKind::Image).with_prompt("a cat");
    image.image_model = Some("flux-dev".to_string());
    image.status = NodeStatus::Success;
    image.result_urls = Some(vec!["older.png".to_string(), "old.png".to_string()]);
    image.result_url = Some("old.png".to_string());
    image.carousel_index = 1;
    image.error_message = Some("Some variations failed".to_string());
    let image_id = image.id;

    let store = Arc::new(NodeStore::new(vec![image]));
    let engine = Arc::new(GenerationEngine::new(
        store.clone(),
        Arc::new(StalledProvider),
        Arc::new(MockProbe::default()),
        EngineConfig::default(),
    ));

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.generate(image_id).await })
    };
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.get(image_id).unwrap().status != NodeStatus::Loading {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("generation never reached Loading");

    engine.cancel(image_id);
    task.abort();

    let node = store.get(image_id).unwrap();
    assert_eq!(node.status, NodeStatus::Success);
    assert_eq!(node.result_url.as_deref(), Some("old.png"));
    assert_eq!(
        node.result_urls.as_deref(),
        Some(&["older.png".to_string(), "old.png".to_string()][..])
    );
    assert_eq!(node.carousel_index, 1);
    assert_eq!(node.error_message.as_deref(), Some("Some variations failed"));
    assert!(node.image_variations.is_none());
    assert!(node.generation_start_time.is_none());

    // The restore consumed the snapshot: a second cancel can only reset.
    engine.cancel(image_id);
    assert_eq!(store.get(image_id).unwrap().status, NodeStatus::Idle);
}

#[tokio::test]
async fn test_cancel_without_snapshot_resets_node() {
    let mut node = Node::new(NodeKind::Image);
    node.status = NodeStatus::Loading;
    node.generation_start_time = Some(Utc::now());
    node.error_message = Some("stale".to_string());
    let node_id = node.id;

    let (engine, store, _provider) = engine_with(vec![node], MockProbe::default());
    engine.cancel(node_id);

    let node = store.get(node_id).unwrap();
    assert_eq!(node.status, NodeStatus::Idle);
    assert!(node.error_message.is_none());
    assert!(node.generation_start_time.is_none());
}

#[tokio::test]
async fn test_settled_generation_discards_its_snapshot() {
    let mut image = Node::new(NodeKind::Image).with_prompt("a cat");
    image.image_model = Some("flux-dev".to_string());
    image.status = NodeStatus::Success;
    image.result_url = Some("old.png".to_string());
    let image_id = image.id;

    let (engine, store, provider) = engine_with(vec![image], MockProbe::default());
    provider.script_image_ok("new.png");
    engine.generate(image_id).await;

    // Cancel after settlement must not resurrect the pre-generation state.
    engine.cancel(image_id);
    let node = store.get(image_id).unwrap();
    assert_eq!(node.status, NodeStatus::Idle);
    assert!(node.result_url.is_none());
}

#[tokio::test]
async fn test_recovery_settles_orphaned_loading_node() {
    let mut node = Node::new(NodeKind::Image);
    node.status = NodeStatus::Loading;
    node.generation_start_time = Some(Utc::now() - chrono::Duration::minutes(2));
    let node_id = node.id;

    let (engine, store, provider) = engine_with(vec![node], MockProbe::default());
    provider.script_status(Ok(
        StatusResponse::success("recovered.png").with_created_at(Utc::now())
    ));

    let handle = engine.spawn_recovery();
    // First tick fires immediately; give the pass a moment to land.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if store.get(node_id).unwrap().status == NodeStatus::Success {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("recovery never settled the node");
    handle.shutdown().await;

    let node = store.get(node_id).unwrap();
    assert_eq!(node.result_url.as_deref(), Some("recovered.png"));
    assert!(node.generation_start_time.is_none());
}

#[tokio::test]
async fn test_recovery_retries_after_transport_failure() {
    let mut node = Node::new(NodeKind::Image);
    node.status = NodeStatus::Loading;
    node.generation_start_time = Some(Utc::now());
    let node_id = node.id;

    let store = Arc::new(NodeStore::new(vec![node]));
    let provider = Arc::new(MockProvider::new());
    provider.script_status(Err(ProviderError::transport("connection refused")));
    provider.script_status(Ok(
        StatusResponse::success("late.png").with_created_at(Utc::now())
    ));

    let engine = GenerationEngine::new(
        store.clone(),
        provider.clone(),
        Arc::new(MockProbe::default()),
        EngineConfig::default().with_poll_interval(1),
    );
    let handle = engine.spawn_recovery();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.get(node_id).unwrap().status == NodeStatus::Success {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("recovery never retried");
    handle.shutdown().await;

    assert!(provider.status_queries.lock().len() >= 2);
}

#[tokio::test]
async fn test_unknown_node_is_a_no_op() {
    let (engine, _store, provider) = engine_with(vec![], MockProbe::default());
    engine.generate(NodeId::new()).await;
    assert!(provider.image_requests.lock().is_empty());
    assert!(provider.video_requests.lock().is_empty());
}
