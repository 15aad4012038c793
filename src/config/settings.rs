//! TOML-based configuration for the join-order search.
//!
//! Supports a config file (ljqo.toml); every key is optional.
//!
//! Example configuration:
//! ```toml
//! seed = 42
//!
//! [selector]
//! threshold = 12
//! algorithm = "sdp"
//!
//! [twopo]
//! bushy_space = true
//! ii_stop = 10
//! sa_initial_temperature = 0.1
//! cache_size_kb = 51200
//!
//! [sdp]
//! iteration_factor = 1
//! max_iterations = 240
//! ```

use crate::planner::join_optimizer::dp_optimizer::MAX_EXHAUSTIVE_RELATIONS;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Seed for the random source; unset draws one from the OS.
    pub seed: Option<u64>,

    /// Which optimizer handles a query.
    pub selector: SelectorSettings,

    /// Two-phase optimization.
    pub twopo: TwoPhaseSettings,

    /// Sampling + dynamic programming.
    pub sdp: SampleDpSettings,
}

/// Randomized algorithm used at or above the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Twopo,
    Sdp,
}

impl FromStr for Algorithm {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twopo" => Ok(Algorithm::Twopo),
            "sdp" => Ok(Algorithm::Sdp),
            _ => Err(SettingsError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Twopo => write!(f, "twopo"),
            Algorithm::Sdp => write!(f, "sdp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectorSettings {
    /// Queries with fewer relations go to the exhaustive search.
    pub threshold: usize,

    pub algorithm: Algorithm,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            threshold: 12,
            algorithm: Algorithm::Twopo,
        }
    }
}

/// Two-phase optimization settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TwoPhaseSettings {
    /// Search bushy trees; false restricts the search to left-deep trees.
    pub bushy_space: bool,

    /// Start the first iteration from edges ordered by pair cost.
    pub heuristic_states: bool,

    /// Number of initial states in the iterative improvement phase.
    pub ii_stop: usize,

    /// Descend each initial state to a local minimum.
    pub ii_improve_states: bool,

    /// Run simulated annealing after iterative improvement.
    pub sa_phase: bool,

    /// Initial temperature as a fraction of the starting cost.
    pub sa_initial_temperature: f64,

    pub sa_temperature_reduction: f64,

    /// Neighbours per temperature stage, per relation.
    pub sa_equilibrium: usize,

    /// Reuse joins of identical subtrees between builds.
    pub cache_plans: bool,

    /// Trial arena size above which cached joins are discarded.
    pub cache_size_kb: usize,
}

impl Default for TwoPhaseSettings {
    fn default() -> Self {
        Self {
            bushy_space: true,
            heuristic_states: true,
            ii_stop: 10,
            ii_improve_states: true,
            sa_phase: true,
            sa_initial_temperature: 0.1,
            sa_temperature_reduction: 0.95,
            sa_equilibrium: 16,
            cache_plans: true,
            cache_size_kb: 51200,
        }
    }
}

/// Sampling + DP settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SampleDpSettings {
    /// Samples per relation.
    pub iteration_factor: usize,

    pub iteration_offset: usize,

    pub min_iterations: usize,

    pub max_iterations: usize,
}

impl Default for SampleDpSettings {
    fn default() -> Self {
        Self {
            iteration_factor: 1,
            iteration_offset: 0,
            min_iterations: 5,
            max_iterations: 240,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `LJQO_CONFIG`
    /// 2. `./ljqo.toml`
    /// 3. `~/.config/ljqo/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("LJQO_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("ljqo.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ljqo").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check every value against its accepted range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.selector.validate()?;
        self.twopo.validate()?;
        self.sdp.validate()
    }
}

impl SelectorSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check(self.threshold >= 2, "selector.threshold must be at least 2")?;
        // Queries below the threshold must fit the exhaustive search.
        if self.threshold > MAX_EXHAUSTIVE_RELATIONS + 1 {
            return Err(SettingsError::InvalidConfig(format!(
                "selector.threshold must be at most {}",
                MAX_EXHAUSTIVE_RELATIONS + 1
            )));
        }
        Ok(())
    }
}

impl TwoPhaseSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check(self.ii_stop >= 1, "twopo.ii_stop must be at least 1")?;
        check(
            (0.0..=2.0).contains(&self.sa_initial_temperature),
            "twopo.sa_initial_temperature must be within [0, 2]",
        )?;
        check(
            (0.1..=0.95).contains(&self.sa_temperature_reduction),
            "twopo.sa_temperature_reduction must be within [0.1, 0.95]",
        )?;
        check(self.sa_equilibrium >= 1, "twopo.sa_equilibrium must be at least 1")?;
        check(self.cache_size_kb >= 512, "twopo.cache_size_kb must be at least 512")
    }
}

impl SampleDpSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        check(
            (1..=100).contains(&self.iteration_factor),
            "sdp.iteration_factor must be within [1, 100]",
        )?;
        check(self.min_iterations >= 2, "sdp.min_iterations must be at least 2")?;
        check(self.max_iterations >= 10, "sdp.max_iterations must be at least 10")?;
        check(
            self.min_iterations <= self.max_iterations,
            "sdp.min_iterations must not exceed sdp.max_iterations",
        )
    }
}

fn check(ok: bool, message: &str) -> Result<(), SettingsError> {
    if ok {
        Ok(())
    } else {
        Err(SettingsError::InvalidConfig(message.to_string()))
    }
}
