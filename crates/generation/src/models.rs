use serde::{Deserialize, Serialize};

/// Model-family classification by case-insensitive substring match on the
/// model identifier. The defaults cover the providers we route today;
/// deployments can re-pin families through `EngineConfig` without a code
/// change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFamilies {
    /// Image models that only produce one output per call, so multi-variation
    /// requests fan out into parallel single calls.
    pub parallel_variation_image: Vec<String>,

    /// Video models that accept a start/end frame pair and permit an empty
    /// prompt when two parents supply the frames.
    pub frame_pair_video: Vec<String>,

    /// Video models driven by a motion-reference video.
    pub motion_control_video: Vec<String>,
}

impl Default for ModelFamilies {
    fn default() -> Self {
        Self {
            parallel_variation_image: vec!["seedream".into(), "flux-kontext".into()],
            frame_pair_video: vec!["kling".into(), "wan".into(), "pixverse".into()],
            motion_control_video: vec!["motion-control".into()],
        }
    }
}

fn matches_family(model: &str, family: &[String]) -> bool {
    let model = model.to_lowercase();
    family.iter().any(|m| model.contains(&m.to_lowercase()))
}

impl ModelFamilies {
    pub fn image_fans_out(&self, model: &str) -> bool {
        matches_family(model, &self.parallel_variation_image)
    }

    pub fn video_supports_frame_pair(&self, model: &str) -> bool {
        matches_family(model, &self.frame_pair_video)
    }

    pub fn video_is_motion_control(&self, model: &str) -> bool {
        matches_family(model, &self.motion_control_video)
    }
}
