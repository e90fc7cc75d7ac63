//! The fixed feature schema shared by records, scenarios and models.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Number of feature columns.
pub const N_FEATURES: usize = 8;

/// Column name of the label.
pub const TARGET_NAME: &str = "web_pages_per_million";

/// One country-level indicator, in schema order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// GDP per capita in current US dollars.
    GdpPerCapita,
    /// Share of the population using the internet, percent.
    InternetPenetration,
    /// Urban population share, percent.
    UrbanPct,
    /// Adult literacy rate, percent.
    LiteracyRate,
    /// Mobile subscriptions per 100 inhabitants.
    MobileSubscriptions,
    /// Share of the population with electricity, percent.
    ElectricityAccess,
    /// Education index in [0, 1].
    EducationIndex,
    /// Median age in years.
    AgeMedian,
}

impl Feature {
    /// All features in schema order.
    pub const ALL: [Feature; N_FEATURES] = [
        Feature::GdpPerCapita,
        Feature::InternetPenetration,
        Feature::UrbanPct,
        Feature::LiteracyRate,
        Feature::MobileSubscriptions,
        Feature::ElectricityAccess,
        Feature::EducationIndex,
        Feature::AgeMedian,
    ];

    /// Column name as it appears in datasets and reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Feature::GdpPerCapita => "gdp_per_capita",
            Feature::InternetPenetration => "internet_penetration",
            Feature::UrbanPct => "urban_pct",
            Feature::LiteracyRate => "literacy_rate",
            Feature::MobileSubscriptions => "mobile_subscriptions",
            Feature::ElectricityAccess => "electricity_access",
            Feature::EducationIndex => "education_index",
            Feature::AgeMedian => "age_median",
        }
    }

    /// Zero-based schema position.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Feature at a schema position, if in range.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| ValidationError::UnknownFeature {
                name: s.to_string(),
            })
    }
}

/// Feature names in schema order, as owned strings.
#[must_use]
pub fn feature_names() -> Vec<String> {
    Feature::ALL.iter().map(|f| f.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_schema_order() {
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
            assert_eq!(Feature::from_index(i), Some(*feature));
        }
        assert_eq!(Feature::from_index(N_FEATURES), None);
    }

    #[test]
    fn names_parse_back() {
        for feature in Feature::ALL {
            assert_eq!(feature.name().parse::<Feature>().unwrap(), feature);
        }
    }

    #[test]
    fn unknown_name_rejected() {
        let err = "population".parse::<Feature>().unwrap_err();
        assert!(matches!(err, ValidationError::UnknownFeature { name } if name == "population"));
    }
}
