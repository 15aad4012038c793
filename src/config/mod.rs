//! Configuration module for ljqo.
//!
//! Handles the optimizer settings file and its defaults.

mod settings;

pub use settings::{
    Algorithm, SampleDpSettings, SelectorSettings, Settings, SettingsError, TwoPhaseSettings,
};
