//! Engine settings
//!
//! Loaded from a JSON file next to the scene data; every field has a
//! default so partial files are fine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;
use crate::engine::visibility::SweepParams;

/// Quality preset levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl QualityPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Low => "Low",
            QualityPreset::Medium => "Medium",
            QualityPreset::High => "High",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(QualityPreset::Low),
            "medium" | "med" => Some(QualityPreset::Medium),
            "high" => Some(QualityPreset::High),
            _ => None,
        }
    }

    /// Line segments per curve span
    pub fn curve_segments(&self) -> usize {
        match self {
            QualityPreset::Low => 8,
            QualityPreset::Medium => DEFAULT_CURVE_SEGMENTS,
            QualityPreset::High => 32,
        }
    }

    /// Rays around an unobstructed sight circle
    pub fn circle_samples(&self) -> usize {
        match self {
            QualityPreset::Low => 32,
            QualityPreset::Medium => DEFAULT_CIRCLE_SAMPLES,
            QualityPreset::High => 128,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Geometry quality preset
    pub quality: QualityPreset,
    /// Overrides the preset's curve segment count
    pub curve_segments: Option<usize>,
    /// Overrides the preset's circle sample count
    pub circle_samples: Option<usize>,
    /// Angular offset of the corner rays (radians)
    pub ray_epsilon: f32,
    /// Fog-of-war cell size (scene units)
    pub fog_cell_size: u32,
    /// Quiet period before exploration changes are written out
    pub persist_debounce_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            quality: QualityPreset::Medium,
            curve_segments: None,
            circle_samples: None,
            ray_epsilon: RAY_ANGLE_EPSILON,
            fog_cell_size: DEFAULT_CELL_SIZE,
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
        }
    }
}

impl EngineSettings {
    /// Settings from a quality preset
    pub fn from_preset(preset: QualityPreset) -> Self {
        Self {
            quality: preset,
            ..Self::default()
        }
    }

    /// Effective curve segment count (at least 1)
    pub fn curve_segments(&self) -> usize {
        self.curve_segments
            .unwrap_or_else(|| self.quality.curve_segments())
            .max(1)
    }

    /// Effective circle sample count (at least 3)
    pub fn circle_samples(&self) -> usize {
        self.circle_samples
            .unwrap_or_else(|| self.quality.circle_samples())
            .max(3)
    }

    pub fn sweep_params(&self) -> SweepParams {
        let ray_epsilon = if self.ray_epsilon > 0.0 && self.ray_epsilon.is_finite() {
            self.ray_epsilon
        } else {
            RAY_ANGLE_EPSILON
        };
        SweepParams {
            circle_samples: self.circle_samples(),
            ray_epsilon,
        }
    }

    pub fn persist_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.persist_debounce_ms)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings = serde_json::from_str(&json)?;
        log::info!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults on any error
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Using default settings ({e})");
                Self::default()
            }
        }
    }

    /// Save settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }
}
