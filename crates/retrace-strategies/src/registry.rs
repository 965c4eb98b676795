//! Preset registry for named detector variants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use retrace_core::error::ConfigError;
use retrace_core::traits::SignalDetector;

use crate::filters::{FilterConfig, FilterStage, MomentumFilter, MomentumMode, SessionFilter};
use crate::rsi_break::{DetectorConfig, EntryStyle, RsiBreakDetector};

/// Information about a registered preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    /// Preset key
    pub name: String,
    /// Preset description
    pub description: String,
    /// Default detector configuration as JSON
    pub default_config: serde_json::Value,
}

/// Registry of built-in detector presets.
pub struct PresetRegistry {
    presets: BTreeMap<String, (String, DetectorConfig)>,
}

impl PresetRegistry {
    /// Create a registry with all built-in presets.
    pub fn new() -> Self {
        let mut presets = BTreeMap::new();

        presets.insert(
            "rsi_reversal".to_string(),
            (
                "Fades RSI 72/28 extremes once price breaks the 5-bar swing against the move"
                    .to_string(),
                DetectorConfig::default(),
            ),
        );

        presets.insert(
            "rsi_continuation".to_string(),
            (
                "Follows RSI 70/30 extremes once price breaks the 5-bar swing with the move"
                    .to_string(),
                DetectorConfig {
                    high_trigger: 70.0,
                    low_trigger: 30.0,
                    style: EntryStyle::Continuation,
                    max_arm_bars: Some(12),
                    ..Default::default()
                },
            ),
        );

        presets.insert(
            "rsi_reversal_session".to_string(),
            (
                "RSI reversal limited to weekday sessions and counter-trend momentum".to_string(),
                DetectorConfig {
                    filters: FilterConfig {
                        stage: FilterStage::Arm,
                        momentum: Some(MomentumFilter {
                            bars: 24,
                            mode: MomentumMode::AgainstTrend,
                        }),
                        session: Some(SessionFilter {
                            allowed_hours: Vec::new(),
                            excluded_weekdays: vec![chrono::Weekday::Sat, chrono::Weekday::Sun],
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ),
        );

        Self { presets }
    }

    /// List all presets in name order.
    pub fn list(&self) -> Vec<PresetInfo> {
        self.presets
            .iter()
            .filter_map(|(name, (description, config))| {
                Some(PresetInfo {
                    name: name.clone(),
                    description: description.clone(),
                    default_config: serde_json::to_value(config).ok()?,
                })
            })
            .collect()
    }

    /// Check if a preset exists.
    pub fn exists(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    /// Get all preset names.
    pub fn names(&self) -> Vec<&str> {
        self.presets.keys().map(String::as_str).collect()
    }

    /// Default detector configuration of a preset.
    pub fn config(&self, name: &str) -> Result<DetectorConfig, ConfigError> {
        self.presets
            .get(name)
            .map(|(_, config)| config.clone())
            .ok_or_else(|| ConfigError::PresetNotFound(name.to_string()))
    }

    /// Create a detector from a preset name and a JSON configuration.
    ///
    /// Fields missing from `config` take their default values.
    pub fn create(
        &self,
        name: &str,
        config: serde_json::Value,
    ) -> Result<Box<dyn SignalDetector>, ConfigError> {
        if !self.exists(name) {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }
        let config: DetectorConfig =
            serde_json::from_value(config).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Ok(Box::new(RsiBreakDetector::new(name, config)?))
    }

    /// Create a detector with the preset's default configuration.
    pub fn create_default(&self, name: &str) -> Result<Box<dyn SignalDetector>, ConfigError> {
        let config = self.config(name)?;
        Ok(Box::new(RsiBreakDetector::new(name, config)?))
    }
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
