use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of instances per draw call.
    pub batch_limit: usize,
    pub enable_culling: bool,
    /// Minimum number of slots handed to a single parallel cull task.
    pub cull_chunk_size: usize,
    /// Fraction of instances that survive deterministic thinning, in `[0, 1]`.
    pub visible_probability: f32,
    pub sync_transforms: bool,
    /// Shader level of detail the device runs at.
    pub maximum_shader_lod: u32,
    /// At or below this shader LOD only instances enabled for low-end
    /// devices may join.
    pub low_end_lod_threshold: u32,
}

impl EngineConfig {
    pub const DEFAULT_BATCH_LIMIT: usize = 1023;

    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(source).context("Failed to parse engine config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config {}", path.display()))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.batch_limit == 0 {
            return Err(EngineError::InvalidConfig(
                "batch_limit must be at least 1".into(),
            ));
        }

        if self.cull_chunk_size == 0 {
            return Err(EngineError::InvalidConfig(
                "cull_chunk_size must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.visible_probability) {
            return Err(EngineError::InvalidConfig(format!(
                "visible_probability {} is outside [0, 1]",
                self.visible_probability
            )));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_limit: Self::DEFAULT_BATCH_LIMIT,
            enable_culling: true,
            cull_chunk_size: 64,
            visible_probability: 1.0,
            sync_transforms: false,
            maximum_shader_lod: u32::MAX,
            low_end_lod_threshold: 100,
        }
    }
}
