use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::ModelFamilies;

/// Engine limits and model-family pins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Provider cap on collected input images.
    pub max_input_images: usize,

    /// Cap on reference images in ingredients mode.
    pub max_reference_images: usize,

    /// Permitted parallel variation counts; anything else falls back to 1.
    pub allowed_variation_counts: Vec<u32>,

    /// Recovery poll period in seconds.
    pub poll_interval_secs: u64,

    /// Model-family classification.
    pub model_families: ModelFamilies,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_input_images: 14,
            max_reference_images: 3,
            allowed_variation_counts: vec![1, 2, 4],
            poll_interval_secs: 10,
            model_families: ModelFamilies::default(),
        }
    }
}

impl EngineConfig {
    /// With a custom poll period
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// With custom model families
    pub fn with_model_families(mut self, families: ModelFamilies) -> Self {
        self.model_families = families;
        self
    }

    /// Clamp a requested variation count into the permitted set.
    pub fn clamp_variation_count(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(n) if self.allowed_variation_counts.contains(&n) => n,
            _ => 1,
        }
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}
