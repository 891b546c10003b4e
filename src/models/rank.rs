use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RankError;

/// Placeholder written into ranking cells when no value is available.
pub const NOT_AVAILABLE: &str = "N/A";
pub const NOT_IN_TOP_RESULTS: &str = "Not in top results";
pub const NO_RESULTS_FOUND: &str = "No results found";

/// Dataset columns filled in by a job, in the order they are appended.
pub const OUTPUT_COLUMNS: [&str; 4] = ["Ranking", "Rank Group", "Rank Absolute", "Device"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile => "mobile",
            Device::Tablet => "tablet",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(Device::Desktop),
            "mobile" => Ok(Device::Mobile),
            "tablet" => Ok(Device::Tablet),
            other => Err(RankError::Validation(format!(
                "Unknown device '{}': expected desktop, mobile or tablet",
                other
            ))),
        }
    }
}

/// Search parameters shared by every lookup of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupParams {
    pub location_code: u32,
    pub location_name: Option<String>,
    pub device: Device,
    pub language_code: String,
}

/// What the lookup collaborator reports for one keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankOutcome {
    Found {
        position: u32,
        rank_group: u32,
        rank_absolute: u32,
    },
    /// The search succeeded but the target is not ranked; carries the label
    /// written into the `Ranking` column.
    NotRanked { label: String },
}

/// A ranking cell: either a numeric position or a label such as `N/A`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RankValue {
    Position(u32),
    Label(String),
}

impl RankValue {
    pub fn not_available() -> Self {
        RankValue::Label(NOT_AVAILABLE.to_string())
    }
}

impl fmt::Display for RankValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankValue::Position(p) => write!(f, "{}", p),
            RankValue::Label(l) => f.write_str(l),
        }
    }
}

/// One entry of a job's result list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankRecord {
    pub keyword: String,
    pub ranking: RankValue,
    pub rank_group: RankValue,
    pub rank_absolute: RankValue,
    pub device: Device,
}

impl RankRecord {
    /// Build the record for `keyword` from a lookup outcome. Lookup errors
    /// become an all-`N/A` record.
    pub fn from_outcome(
        keyword: &str,
        outcome: &Result<RankOutcome, RankError>,
        device: Device,
    ) -> Self {
        let (ranking, rank_group, rank_absolute) = match outcome {
            Ok(RankOutcome::Found {
                position,
                rank_group,
                rank_absolute,
            }) => (
                RankValue::Position(*position),
                RankValue::Position(*rank_group),
                RankValue::Position(*rank_absolute),
            ),
            Ok(RankOutcome::NotRanked { label }) => (
                RankValue::Label(label.clone()),
                RankValue::not_available(),
                RankValue::not_available(),
            ),
            Err(_) => (
                RankValue::not_available(),
                RankValue::not_available(),
                RankValue::not_available(),
            ),
        };
        Self {
            keyword: keyword.to_string(),
            ranking,
            rank_group,
            rank_absolute,
            device,
        }
    }

    /// Cell values for the dataset output columns, aligned with [`OUTPUT_COLUMNS`].
    pub fn cells(&self) -> [(&'static str, String); 4] {
        [
            (OUTPUT_COLUMNS[0], self.ranking.to_string()),
            (OUTPUT_COLUMNS[1], self.rank_group.to_string()),
            (OUTPUT_COLUMNS[2], self.rank_absolute.to_string()),
            (OUTPUT_COLUMNS[3], self.device.to_string()),
        ]
    }
}
