use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node kind decides which resolver and reconciler path applies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Text,
    Style,
    Image,
    ImageEditor,
    LocalImageModel,
    Video,
    VideoEditor,
    CameraAngle,
}

impl NodeKind {
    /// Kinds that can contribute an image to a descendant.
    pub fn is_image_capable(&self) -> bool {
        !matches!(self, NodeKind::Text | NodeKind::Style)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, NodeKind::Video | NodeKind::VideoEditor)
    }
}

/// Generation state of a node. Only the orchestration engine and the
/// recovery poller write this field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Idle
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Generating,
    Success,
    Failed,
}

/// One slot of an in-flight parallel variation run. Transient: always folded
/// into the result carousel before the node reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariationSlot {
    pub status: SlotStatus,
    #[serde(default)]
    pub url: Option<String>,
}

impl VariationSlot {
    pub fn generating() -> Self {
        Self {
            status: SlotStatus::Generating,
            url: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SlotStatus::Success && self.url.is_some()
    }
}

/// Explicit video input mode. Absent means the resolver infers the mode
/// from the node's parents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    FramePair,
    Reference,
}

/// Settings echoed into the carousel alongside each produced result, so a
/// result remembers how it was generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationSettings {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Ordered parents: first = primary/start, second = secondary/end in
    /// frame-pair mode.
    #[serde(default)]
    pub parent_ids: Vec<NodeId>,
    #[serde(default)]
    pub status: NodeStatus,

    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub prompt_chips: Vec<String>,

    /// Primary result reference.
    #[serde(default)]
    pub result_url: Option<String>,
    /// Full carousel. Append-only across regenerations; only an explicit
    /// rollback reverts it.
    #[serde(default)]
    pub result_urls: Option<Vec<String>>,
    /// Active entry in `result_urls`/`image_variations`.
    #[serde(default)]
    pub carousel_index: usize,
    /// Settings snapshot for each carousel entry, in carousel order.
    #[serde(default)]
    pub carousel_settings: Vec<GenerationSettings>,
    /// Transient fan-out slots; present only during a parallel run.
    #[serde(default)]
    pub image_variations: Option<Vec<VariationSlot>>,

    /// Final frame of a video result, used as an implicit image input by
    /// descendants.
    #[serde(default)]
    pub last_frame: Option<String>,
    /// Set when a generation begins; rejects stale asynchronous completions.
    #[serde(default)]
    pub generation_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,

    /// Exact aspect ratio of the most recent result, from real pixel
    /// dimensions (e.g. "1024:768" reduced).
    #[serde(default)]
    pub detected_aspect_ratio: Option<String>,
    /// Nearest standard label for the most recent result (e.g. "16:9").
    #[serde(default)]
    pub aspect_ratio_label: Option<String>,

    // Configuration inputs. The core echoes these into settings snapshots
    // but never mutates them, except the variation path updating
    // `aspect_ratio` from the detected label.
    #[serde(default)]
    pub video_mode: Option<VideoMode>,
    /// Explicit frame-input assignments: order = start, end.
    #[serde(default)]
    pub frame_inputs: Vec<NodeId>,
    #[serde(default)]
    pub video_model: Option<String>,
    #[serde(default)]
    pub image_model: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub variation_count: Option<u32>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub motion_intensity: Option<f32>,
    #[serde(default)]
    pub generate_audio: bool,
    /// Explicit character-reference image urls, appended after collected
    /// parent images.
    #[serde(default)]
    pub reference_urls: Vec<String>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            parent_ids: Vec::new(),
            status: NodeStatus::Idle,
            prompt: String::new(),
            prompt_chips: Vec::new(),
            result_url: None,
            result_urls: None,
            carousel_index: 0,
            carousel_settings: Vec::new(),
            image_variations: None,
            last_frame: None,
            generation_start_time: None,
            error_message: None,
            detected_aspect_ratio: None,
            aspect_ratio_label: None,
            video_mode: None,
            frame_inputs: Vec::new(),
            video_model: None,
            image_model: None,
            aspect_ratio: None,
            resolution: None,
            variation_count: None,
            duration_secs: None,
            motion_intensity: None,
            generate_audio: false,
            reference_urls: Vec::new(),
        }
    }

    pub fn with_parents(mut self, parents: Vec<NodeId>) -> Self {
        self.parent_ids = parents;
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// The one image that represents this node right now.
    ///
    /// Variation slots take precedence while a parallel run is in flight:
    /// the slot at the carousel index if it succeeded, else the first
    /// successful slot. With no usable slot the carousel entry at the
    /// current index applies, then the single result field.
    pub fn face_image(&self) -> Option<&str> {
        if let Some(slots) = self.image_variations.as_deref() {
            if !slots.is_empty() {
                if let Some(slot) = slots.get(self.carousel_index) {
                    if slot.is_success() {
                        return slot.url.as_deref();
                    }
                }
                if let Some(slot) = slots.iter().find(|s| s.is_success()) {
                    return slot.url.as_deref();
                }
            }
        }
        if let Some(urls) = self.result_urls.as_deref() {
            if !urls.is_empty() {
                return urls.get(self.carousel_index).map(String::as_str);
            }
        }
        self.result_url.as_deref()
    }

    /// The image this node contributes to a descendant: a video's last frame
    /// when it has one, otherwise the face image.
    pub fn contributed_image(&self) -> Option<&str> {
        if self.kind.is_video() {
            if let Some(frame) = self.last_frame.as_deref() {
                return Some(frame);
            }
        }
        self.face_image()
    }

    /// Number of entries the result carousel currently holds, counting a
    /// bare `result_url` as a one-entry carousel.
    pub fn carousel_len(&self) -> usize {
        match self.result_urls.as_deref() {
            Some(urls) => urls.len(),
            None => usize::from(self.result_url.is_some()),
        }
    }
}
