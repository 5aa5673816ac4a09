/// State reconciler
///
/// Translates provider outcomes into node field updates: carousel append,
/// aspect detection, last-frame chaining, and error-message normalization.
/// Every mutation is one atomic store update; probing happens before the
/// lock is taken.
use std::sync::Arc;
use tracing::debug;

use canvas_graph::{GenerationSettings, Node, NodeId, NodeStatus, NodeStore};

use crate::media::MediaProbe;

pub const GENERIC_FAILURE: &str = "Generation failed";
pub const PARTIAL_FAILURE_NOTE: &str = "Some variations failed";
pub const TOTAL_FAILURE_MESSAGE: &str = "All image variations failed";

/// Standard labels, checked in order; ties resolve to the earlier entry.
pub const STANDARD_ASPECT_RATIOS: [(&str, f64); 10] = [
    ("1:1", 1.0),
    ("16:9", 16.0 / 9.0),
    ("9:16", 9.0 / 16.0),
    ("4:3", 4.0 / 3.0),
    ("3:4", 3.0 / 4.0),
    ("3:2", 3.0 / 2.0),
    ("2:3", 2.0 / 3.0),
    ("5:4", 5.0 / 4.0),
    ("4:5", 4.0 / 5.0),
    ("21:9", 21.0 / 9.0),
];

/// Nearest standard label by minimum absolute ratio difference.
pub fn nearest_aspect_label(width: u32, height: u32) -> &'static str {
    let ratio = width as f64 / height.max(1) as f64;
    let mut best = STANDARD_ASPECT_RATIOS[0].0;
    let mut best_diff = f64::MAX;
    for (label, reference) in STANDARD_ASPECT_RATIOS {
        let diff = (ratio - reference).abs();
        if diff < best_diff {
            best = label;
            best_diff = diff;
        }
    }
    best
}

/// Exact ratio from pixel dimensions, reduced (e.g. 1920x1080 -> "16:9").
pub fn exact_aspect_ratio(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 {
            a.max(1)
        } else {
            gcd(b, a % b)
        }
    }
    let d = gcd(width.max(1), height.max(1));
    format!("{}:{}", width.max(1) / d, height.max(1) / d)
}

const PERMISSION_PATTERNS: [&str; 5] = ["403", "permission", "forbidden", "unauthorized", "api key"];
const BAD_IMAGE_PATTERNS: [&str; 4] = [
    "invalid input image",
    "invalid image",
    "unsupported image",
    "400",
];

/// Map a raw provider error onto the user-facing message. Case-insensitive
/// substring matching; permission hints win over image hints.
pub fn normalize_error_message(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if PERMISSION_PATTERNS.iter().any(|p| lower.contains(p)) {
        format!("{GENERIC_FAILURE}: the provider rejected your credentials. Check the API key configured for this model.")
    } else if BAD_IMAGE_PATTERNS.iter().any(|p| lower.contains(p)) {
        format!("{GENERIC_FAILURE}: the input image was not accepted. Try a different image format or aspect ratio.")
    } else {
        GENERIC_FAILURE.to_string()
    }
}

/// Append new results to a node's carousel. Returns the previous carousel
/// length, which becomes the new carousel index (first new entry). A single
/// first result stays in the bare `result_url` field without materializing
/// the list.
pub fn append_to_carousel(node: &mut Node, urls: &[String], settings: &GenerationSettings) -> usize {
    let prev_len = node.carousel_len();
    if prev_len == 0 && urls.len() == 1 {
        node.result_url = Some(urls[0].clone());
        node.result_urls = None;
        node.carousel_index = 0;
    } else {
        let mut list = match node.result_urls.take() {
            Some(list) => list,
            None => node.result_url.clone().into_iter().collect(),
        };
        list.extend(urls.iter().cloned());
        node.carousel_index = prev_len;
        node.result_url = list.get(prev_len).cloned();
        node.result_urls = Some(list);
    }
    for _ in urls {
        node.carousel_settings.push(settings.clone());
    }
    prev_len
}

pub struct Reconciler {
    store: Arc<NodeStore>,
    probe: Arc<dyn MediaProbe>,
}

impl Reconciler {
    pub fn new(store: Arc<NodeStore>, probe: Arc<dyn MediaProbe>) -> Self {
        Self { store, probe }
    }

    /// Commit image results: append to the carousel, detect aspect from the
    /// first new reference, settle at Success. `advisory` carries the
    /// partial-failure note from a variation run; `overwrite_aspect` is set
    /// on the variation path, where the detected label replaces the
    /// user-selected one.
    pub async fn commit_image_success(
        &self,
        node_id: NodeId,
        urls: Vec<String>,
        settings: GenerationSettings,
        overwrite_aspect: bool,
        advisory: Option<&str>,
    ) {
        if urls.is_empty() {
            return;
        }
        let detected = match self.probe.image_dimensions(&urls[0]).await {
            Ok(dims) => Some(dims),
            Err(e) => {
                debug!(node = %node_id, error = %e, "aspect probe failed; leaving fields unset");
                None
            }
        };
        let advisory = advisory.map(str::to_string);
        self.store.update(node_id, |node| {
            append_to_carousel(node, &urls, &settings);
            node.image_variations = None;
            node.status = NodeStatus::Success;
            node.error_message = advisory;
            node.generation_start_time = None;
            if let Some((w, h)) = detected {
                node.detected_aspect_ratio = Some(exact_aspect_ratio(w, h));
                let label = nearest_aspect_label(w, h);
                node.aspect_ratio_label = Some(label.to_string());
                if overwrite_aspect || node.aspect_ratio.is_none() {
                    node.aspect_ratio = Some(label.to_string());
                }
            }
        });
    }

    /// Commit a video result: append, detect the played-back aspect, extract
    /// the final frame for downstream chaining. Probe failures leave the
    /// derived fields unset.
    pub async fn commit_video_success(
        &self,
        node_id: NodeId,
        url: String,
        settings: GenerationSettings,
    ) {
        let detected = self.probe.video_dimensions(&url).await.ok();
        let last_frame = match self.probe.extract_last_frame(&url).await {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!(node = %node_id, error = %e, "last-frame extraction failed");
                None
            }
        };
        self.store.update(node_id, |node| {
            append_to_carousel(node, std::slice::from_ref(&url), &settings);
            node.image_variations = None;
            node.status = NodeStatus::Success;
            node.error_message = None;
            node.generation_start_time = None;
            node.last_frame = last_frame;
            if let Some((w, h)) = detected {
                node.detected_aspect_ratio = Some(exact_aspect_ratio(w, h));
                node.aspect_ratio_label = Some(nearest_aspect_label(w, h).to_string());
            }
        });
    }

    /// Settle a node at Error with a normalized message.
    pub fn commit_failure(&self, node_id: NodeId, raw: &str) {
        self.apply_error(node_id, normalize_error_message(raw));
    }

    /// Settle a node at Error with an already-final message.
    pub fn apply_error(&self, node_id: NodeId, message: String) {
        self.store.update(node_id, |node| {
            node.status = NodeStatus::Error;
            node.error_message = Some(message);
            node.generation_start_time = None;
            node.image_variations = None;
        });
    }
}
