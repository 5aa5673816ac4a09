/// Input resolver
///
/// Derives the generation payload for a target node from a graph snapshot:
/// prompt composition, image collection up the parent chains, video input
/// mode selection, and the fan-out decision for parallel variations. Pure
/// over the snapshot; it never fails, it only declines to produce a plan.
use canvas_graph::{Graph, Node, NodeId, NodeKind, VideoMode};

use crate::config::EngineConfig;
use crate::providers::{ImageRequest, LocalModelRequest, VideoRequest};

/// What the engine should dispatch for one generate request.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationPlan {
    /// One provider call, possibly requesting several variations natively.
    SingleImage(ImageRequest),
    /// K independent single-variation calls joined by the orchestrator.
    /// `request.variation_count` is already 1.
    FanOutImage { request: ImageRequest, count: u32 },
    LocalImage(LocalModelRequest),
    Video(VideoRequest),
}

/// Build the plan for a node, or None when the request is invalid (missing
/// required prompt) or the node kind is not generatable.
pub fn resolve(graph: &Graph, node: &Node, config: &EngineConfig) -> Option<GenerationPlan> {
    match node.kind {
        NodeKind::Image | NodeKind::ImageEditor | NodeKind::CameraAngle => {
            resolve_image(graph, node, config)
        }
        NodeKind::LocalImageModel => resolve_local_image(graph, node),
        NodeKind::Video | NodeKind::VideoEditor => resolve_video(graph, node, config),
        NodeKind::Text | NodeKind::Style => None,
    }
}

/// Combined prompt: Text-parent prompts, then Style-parent prompts, then the
/// node's own chips, then its own prompt; blank-line joined, empty segments
/// skipped.
pub fn combined_prompt(graph: &Graph, node: &Node) -> String {
    let mut segments: Vec<String> = Vec::new();
    for parent in graph.parents_of_kind(node, NodeKind::Text) {
        segments.push(parent.prompt.trim().to_string());
    }
    for parent in graph.parents_of_kind(node, NodeKind::Style) {
        segments.push(parent.prompt.trim().to_string());
    }
    for chip in &node.prompt_chips {
        segments.push(chip.trim().to_string());
    }
    segments.push(node.prompt.trim().to_string());
    segments.retain(|s| !s.is_empty());
    segments.join("\n\n")
}

/// Collect input images for an image target: one face image per parent
/// chain (Text nodes skipped), then explicit reference urls, capped at the
/// provider limit.
pub fn collect_input_images(graph: &Graph, node: &Node, cap: usize) -> Vec<String> {
    let mut images = Vec::new();
    for parent_id in &node.parent_ids {
        if images.len() >= cap {
            break;
        }
        if let Some(url) = graph.chain_face_image(*parent_id) {
            images.push(url);
        }
    }
    for url in &node.reference_urls {
        if images.len() >= cap {
            break;
        }
        images.push(url.clone());
    }
    images
}

fn resolve_image(graph: &Graph, node: &Node, config: &EngineConfig) -> Option<GenerationPlan> {
    let prompt = combined_prompt(graph, node);
    if prompt.is_empty() {
        return None;
    }

    let model = node.image_model.clone().unwrap_or_default();
    let count = config.clamp_variation_count(node.variation_count);
    let input_images = collect_input_images(graph, node, config.max_input_images);

    let request = ImageRequest {
        node_id: node.id,
        model: model.clone(),
        prompt,
        aspect_ratio: node.aspect_ratio.clone(),
        resolution: node.resolution.clone(),
        variation_count: count,
        input_images,
        intensity: node.motion_intensity,
    };

    if count > 1 && config.model_families.image_fans_out(&model) {
        Some(GenerationPlan::FanOutImage {
            request: ImageRequest {
                variation_count: 1,
                ..request
            },
            count,
        })
    } else {
        Some(GenerationPlan::SingleImage(request))
    }
}

fn resolve_local_image(graph: &Graph, node: &Node) -> Option<GenerationPlan> {
    let prompt = combined_prompt(graph, node);
    if prompt.is_empty() {
        return None;
    }
    Some(GenerationPlan::LocalImage(LocalModelRequest {
        node_id: node.id,
        model: node.image_model.clone().unwrap_or_default(),
        prompt,
        aspect_ratio: node.aspect_ratio.clone(),
        resolution: node.resolution.clone(),
    }))
}

/// Resolved video inputs, in priority order of the modes that produce them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoInputs {
    pub start_frame: Option<String>,
    pub end_frame: Option<String>,
    pub reference_images: Vec<String>,
    pub motion_source: Option<String>,
}

fn resolve_video(graph: &Graph, node: &Node, config: &EngineConfig) -> Option<GenerationPlan> {
    let model = node.video_model.clone().unwrap_or_default();
    let prompt = combined_prompt(graph, node);

    // An empty prompt is permitted only for frame-pair-capable models fed by
    // at least two parents.
    let prompt_exempt =
        config.model_families.video_supports_frame_pair(&model) && node.parent_ids.len() >= 2;
    if prompt.is_empty() && !prompt_exempt {
        return None;
    }

    let inputs = resolve_video_inputs(graph, node, config);

    Some(GenerationPlan::Video(VideoRequest {
        node_id: node.id,
        model,
        prompt,
        aspect_ratio: node.aspect_ratio.clone(),
        resolution: node.resolution.clone(),
        duration_secs: node.duration_secs,
        start_frame: inputs.start_frame,
        end_frame: inputs.end_frame,
        reference_images: inputs.reference_images,
        motion_source: inputs.motion_source,
        generate_audio: node.generate_audio,
        intensity: node.motion_intensity,
    }))
}

/// Priority-ordered video input decision: motion-control, then
/// reference/ingredients, then frame-pair, then standard single image.
pub fn resolve_video_inputs(graph: &Graph, node: &Node, config: &EngineConfig) -> VideoInputs {
    let model = node.video_model.as_deref().unwrap_or_default();

    if config.model_families.video_is_motion_control(model) {
        return motion_control_inputs(graph, node);
    }
    if wants_reference_mode(graph, node) {
        return reference_inputs(graph, node, config.max_reference_images);
    }
    if wants_frame_pair(graph, node) {
        return frame_pair_inputs(graph, node);
    }
    standard_inputs(graph, node)
}

/// Motion source from a parent Video node's result, plus a
/// character-reference image from a parent Image node with a result.
fn motion_control_inputs(graph: &Graph, node: &Node) -> VideoInputs {
    let motion_source = graph
        .first_parent_where(node, |p| p.kind.is_video() && p.result_url.is_some())
        .and_then(|p| p.result_url.clone());
    let character = graph
        .first_parent_where(node, |p| {
            matches!(p.kind, NodeKind::Image | NodeKind::ImageEditor) && p.face_image().is_some()
        })
        .and_then(|p| p.face_image().map(str::to_string));

    VideoInputs {
        motion_source,
        reference_images: character.into_iter().collect(),
        ..VideoInputs::default()
    }
}

fn wants_reference_mode(graph: &Graph, node: &Node) -> bool {
    if node.video_mode == Some(VideoMode::Reference) {
        return true;
    }
    let resolvable = node
        .parent_ids
        .iter()
        .filter(|id| {
            graph
                .node(**id)
                .map(|p| p.kind != NodeKind::Text)
                .unwrap_or(false)
                && graph.chain_face_image(**id).is_some()
        })
        .count();
    resolvable >= 3
}

fn reference_inputs(graph: &Graph, node: &Node, cap: usize) -> VideoInputs {
    let mut reference_images = Vec::new();
    for parent_id in &node.parent_ids {
        if reference_images.len() >= cap {
            break;
        }
        if let Some(url) = graph.chain_face_image(*parent_id) {
            reference_images.push(url);
        }
    }
    VideoInputs {
        reference_images,
        ..VideoInputs::default()
    }
}

fn wants_frame_pair(graph: &Graph, node: &Node) -> bool {
    if node.video_mode == Some(VideoMode::FramePair) {
        return true;
    }
    if node.frame_inputs.len() >= 2 {
        return true;
    }
    let image_capable = graph
        .parents(node)
        .into_iter()
        .filter(|p| p.kind.is_image_capable())
        .count();
    image_capable >= 2
}

/// Start/end frames: explicit frame-input assignments first (order =
/// start/end); when either side does not resolve, fall back to positional
/// parents entirely.
fn frame_pair_inputs(graph: &Graph, node: &Node) -> VideoInputs {
    if node.frame_inputs.len() >= 2 {
        let start = contributed_by_id(graph, node.frame_inputs[0]);
        let end = contributed_by_id(graph, node.frame_inputs[1]);
        if start.is_some() && end.is_some() {
            return VideoInputs {
                start_frame: start,
                end_frame: end,
                ..VideoInputs::default()
            };
        }
    }

    let parents: Vec<&Node> = graph
        .parents(node)
        .into_iter()
        .filter(|p| p.kind.is_image_capable())
        .collect();
    VideoInputs {
        start_frame: parents
            .first()
            .and_then(|p| p.contributed_image().map(str::to_string)),
        end_frame: parents
            .get(1)
            .and_then(|p| p.contributed_image().map(str::to_string)),
        ..VideoInputs::default()
    }
}

fn contributed_by_id(graph: &Graph, id: NodeId) -> Option<String> {
    graph.node(id)?.contributed_image().map(str::to_string)
}

/// First non-Text parent's last frame (when it is a video with one), else
/// its face image.
fn standard_inputs(graph: &Graph, node: &Node) -> VideoInputs {
    let start_frame = graph
        .first_parent_where(node, |p| p.kind != NodeKind::Text)
        .and_then(|p| p.contributed_image().map(str::to_string));
    VideoInputs {
        start_frame,
        ..VideoInputs::default()
    }
}
