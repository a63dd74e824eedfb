use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fluency::curriculum::Curriculum;
use crate::fluency::types::{AdvancementMode, Operation, Tier};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read engine config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid engine config json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value:?}")]
    Env { key: String, value: String },
    #[error("curriculum has no sub-levels for {0}")]
    MissingOperation(Operation),
    #[error("threshold table has no entry for mode {0}")]
    MissingThreshold(AdvancementMode),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Percentage lower bounds for each tier above `doesNotKnow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TierCutPoints {
    pub emerging: f64,
    pub approaching: f64,
    pub proficient: f64,
    pub mastered: f64,
}

impl Default for TierCutPoints {
    fn default() -> Self {
        Self {
            emerging: 20.0,
            approaching: 60.0,
            proficient: 80.0,
            mastered: 100.0,
        }
    }
}

impl TierCutPoints {
    pub fn tier_for(&self, percentage: f64) -> Tier {
        if percentage >= self.mastered {
            Tier::Mastered
        } else if percentage >= self.proficient {
            Tier::Proficient
        } else if percentage >= self.approaching {
            Tier::Approaching
        } else if percentage >= self.emerging {
            Tier::Emerging
        } else {
            Tier::DoesNotKnow
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let points = [self.emerging, self.approaching, self.proficient, self.mastered];
        if points.iter().any(|p| !(0.0..=100.0).contains(p)) {
            return Err(ConfigError::Validation(
                "tier cut points must lie within 0-100".to_string(),
            ));
        }
        if points.windows(2).any(|w| w[0] >= w[1]) || self.emerging <= 0.0 {
            return Err(ConfigError::Validation(
                "tier cut points must be strictly ascending and above zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Contribution of secure tiers to operation-level proficiency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecureTierWeights {
    pub proficient: f64,
    pub mastered: f64,
}

impl Default for SecureTierWeights {
    fn default() -> Self {
        Self {
            proficient: 1.0,
            mastered: 1.0,
        }
    }
}

impl SecureTierWeights {
    pub fn weight(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Proficient => self.proficient,
            Tier::Mastered => self.mastered,
            _ => 0.0,
        }
    }
}

/// Advancement threshold per mode, as a percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable(BTreeMap<AdvancementMode, f64>);

impl Default for ThresholdTable {
    fn default() -> Self {
        Self(BTreeMap::from([
            (AdvancementMode::Standard, 80.0),
            (AdvancementMode::HighPerformer, 75.0),
            (AdvancementMode::FastTrack, 70.0),
        ]))
    }
}

impl ThresholdTable {
    pub fn get(&self, mode: AdvancementMode) -> Option<f64> {
        self.0.get(&mode).copied()
    }

    pub fn set(&mut self, mode: AdvancementMode, value: f64) {
        self.0.insert(mode, value);
    }

    pub fn remove(&mut self, mode: AdvancementMode) -> Option<f64> {
        self.0.remove(&mode)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for &mode in AdvancementMode::all() {
            let value = self.get(mode).ok_or(ConfigError::MissingThreshold(mode))?;
            if !(value > 0.0 && value <= 100.0) {
                return Err(ConfigError::Validation(format!(
                    "threshold for {mode} must be within (0, 100], got {value}"
                )));
            }
        }
        if let (Some(standard), Some(fast)) = (
            self.get(AdvancementMode::Standard),
            self.get(AdvancementMode::FastTrack),
        ) {
            if fast > standard {
                tracing::warn!(standard, fast_track = fast, "fast-track threshold is above standard");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancementParams {
    /// Diagnostic accuracy (0-100) that engages fast-track and skips the learning round.
    pub fast_track_diagnostic_accuracy: f64,
    /// Session accuracy (0-100) that counts toward the high-performer streak.
    pub high_accuracy_session: f64,
    pub high_performer_streak: u32,
    pub quick_check_min_accuracy: f64,
    /// Known problems required at the sub-level before advancing. Zero disables the gate.
    pub min_known_problems: usize,
}

impl Default for AdvancementParams {
    fn default() -> Self {
        Self {
            fast_track_diagnostic_accuracy: 90.0,
            high_accuracy_session: 90.0,
            high_performer_streak: 3,
            quick_check_min_accuracy: 80.0,
            min_known_problems: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionParams {
    pub diagnostic_size: usize,
    pub learning_size: usize,
    pub practice_size: usize,
    pub quick_check_size: usize,
    /// Share of practice slots given to secure problems from earlier sub-levels.
    pub maintenance_share: f64,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            diagnostic_size: 5,
            learning_size: 4,
            practice_size: 10,
            quick_check_size: 5,
            maintenance_share: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChallengeParams {
    pub target_count: usize,
    pub next_level_max: usize,
    pub previous_operation_max: usize,
}

impl Default for ChallengeParams {
    fn default() -> Self {
        Self {
            target_count: 4,
            next_level_max: 2,
            previous_operation_max: 2,
        }
    }
}

/// Accuracy lower bounds (0-100) for session quality ratings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityBands {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
}

impl Default for QualityBands {
    fn default() -> Self {
        Self {
            excellent: 90.0,
            good: 75.0,
            fair: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrendParams {
    pub history_len: usize,
    pub dead_band: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            history_len: 10,
            dead_band: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub cut_points: TierCutPoints,
    pub secure_weights: SecureTierWeights,
    pub thresholds: ThresholdTable,
    pub advancement: AdvancementParams,
    pub session: SessionParams,
    pub challenge: ChallengeParams,
    pub quality: QualityBands,
    pub trend: TrendParams,
    pub curriculum: Curriculum,
}

impl EngineConfig {
    /// Defaults or the JSON document at `path`, then env overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let modes = [
            ("FLUENCY_STANDARD_THRESHOLD", AdvancementMode::Standard),
            ("FLUENCY_FAST_TRACK_THRESHOLD", AdvancementMode::FastTrack),
            ("FLUENCY_HIGH_PERFORMER_THRESHOLD", AdvancementMode::HighPerformer),
        ];
        for (key, mode) in modes {
            if let Some(val) = lookup(key) {
                let parsed = val.trim().parse::<f64>().map_err(|_| ConfigError::Env {
                    key: key.to_string(),
                    value: val.clone(),
                })?;
                self.thresholds.set(mode, parsed);
            }
        }
        if let Some(val) = lookup("FLUENCY_CHALLENGE_TARGET") {
            self.challenge.target_count = val.trim().parse().map_err(|_| ConfigError::Env {
                key: "FLUENCY_CHALLENGE_TARGET".to_string(),
                value: val.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cut_points.validate()?;
        self.thresholds.validate()?;

        let s = &self.session;
        if s.diagnostic_size == 0 || s.practice_size == 0 || s.quick_check_size == 0 {
            return Err(ConfigError::Validation(
                "diagnostic, practice and quick-check rounds need at least one problem".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&s.maintenance_share) {
            return Err(ConfigError::Validation(
                "maintenance share must be within [0, 1)".to_string(),
            ));
        }
        if !(3..=5).contains(&self.challenge.target_count) {
            return Err(ConfigError::Validation(format!(
                "challenge target count must be 3-5, got {}",
                self.challenge.target_count
            )));
        }
        let q = &self.quality;
        if !(q.excellent > q.good && q.good > q.fair) {
            return Err(ConfigError::Validation(
                "quality bands must be strictly descending".to_string(),
            ));
        }
        if self.trend.history_len < 2 {
            return Err(ConfigError::Validation(
                "trend history needs at least two snapshots".to_string(),
            ));
        }

        self.curriculum.validate()
    }
}

pub(crate) fn ensure_unique<'a, I>(ids: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ConfigError::Validation(format!("duplicate sub-level id {id}")));
        }
    }
    Ok(())
}
