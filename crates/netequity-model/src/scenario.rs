//! Hypothetical feature vectors and named presets.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::record::FeatureRecord;
use crate::schema::{Feature, N_FEATURES};
use crate::train::TrainedModel;

/// A feature vector without a label, used for a single prediction.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scenario {
    values: [Option<f64>; N_FEATURES],
}

impl Scenario {
    /// An empty scenario with every feature absent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one feature.
    #[must_use]
    pub fn with_value(mut self, feature: Feature, value: f64) -> Self {
        self.values[feature.index()] = Some(value);
        self
    }

    /// Set or clear one feature in place.
    pub fn set(&mut self, feature: Feature, value: Option<f64>) {
        self.values[feature.index()] = value;
    }

    /// Value of one feature, if present.
    #[must_use]
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values[feature.index()]
    }

    /// All slots in schema order.
    #[must_use]
    pub fn values(&self) -> &[Option<f64>; N_FEATURES] {
        &self.values
    }

    /// First absent feature in schema order.
    #[must_use]
    pub fn first_missing(&self) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| self.get(*f).is_none())
    }
}

impl From<&FeatureRecord> for Scenario {
    fn from(record: &FeatureRecord) -> Self {
        Self {
            values: record.values,
        }
    }
}

/// Named reference profiles built from training percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Every feature at its 90th percentile.
    Developed,
    /// Every feature at its 50th percentile.
    Emerging,
    /// Every feature at its 10th percentile.
    Rural,
}

impl Preset {
    /// All presets, most to least developed.
    pub const ALL: [Preset; 3] = [Preset::Developed, Preset::Emerging, Preset::Rural];

    /// The percentile this preset reads from the training profile.
    #[must_use]
    pub fn percentile(self) -> f64 {
        match self {
            Preset::Developed => 90.0,
            Preset::Emerging => 50.0,
            Preset::Rural => 10.0,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Preset::Developed => "developed",
            Preset::Emerging => "emerging",
            Preset::Rural => "rural",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownPreset {
                name: s.to_string(),
            })
    }
}

impl TrainedModel {
    /// A complete scenario with every feature at the preset's training percentile.
    #[must_use]
    pub fn preset_scenario(&self, preset: Preset) -> Scenario {
        let mut scenario = Scenario::new();
        for feature in Feature::ALL {
            scenario.set(feature, Some(self.reference.value(preset, feature)));
        }
        scenario
    }
}
