//! Batch, stage and location types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The five sequential checkpoints of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Plantation = 1,
    Growth = 2,
    Health = 3,
    PreHarvest = 4,
    FinalVerification = 5,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Plantation,
        Stage::Growth,
        Stage::Health,
        Stage::PreHarvest,
        Stage::FinalVerification,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Stage> {
        match n {
            1 => Some(Stage::Plantation),
            2 => Some(Stage::Growth),
            3 => Some(Stage::Health),
            4 => Some(Stage::PreHarvest),
            5 => Some(Stage::FinalVerification),
            _ => None,
        }
    }

    /// Following stage; `None` for the final stage
    pub fn next(self) -> Option<Stage> {
        Stage::from_number(self.number() + 1)
    }

    /// Stages whose evidence is submitted by the farmer and approved by the collector
    pub fn requires_submission(self) -> bool {
        matches!(self, Stage::Growth | Stage::Health | Stage::PreHarvest)
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Plantation => "plantation",
            Stage::Growth => "growth",
            Stage::Health => "health",
            Stage::PreHarvest => "pre-harvest",
            Stage::FinalVerification => "final verification",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.name())
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Stage::from_number(n).ok_or_else(|| format!("stage must be between 1 and 5, got {}", n))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> u8 {
        stage.number()
    }
}

/// Lifecycle position of a batch: an active stage or the terminal lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "phase", content = "stage")]
pub enum BatchPhase {
    Active(Stage),
    Locked,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPhase::Active(stage) => write!(f, "{}", stage),
            BatchPhase::Locked => f.write_str("locked"),
        }
    }
}

/// Known herb species
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Species {
    Tulsi,
    Ashwagandha,
    Brahmi,
    Neem,
    Turmeric,
    Giloy,
    Shatavari,
    Amla,
    Moringa,
}

impl Species {
    pub const ALL: [Species; 9] = [
        Species::Tulsi,
        Species::Ashwagandha,
        Species::Brahmi,
        Species::Neem,
        Species::Turmeric,
        Species::Giloy,
        Species::Shatavari,
        Species::Amla,
        Species::Moringa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Species::Tulsi => "Tulsi",
            Species::Ashwagandha => "Ashwagandha",
            Species::Brahmi => "Brahmi",
            Species::Neem => "Neem",
            Species::Turmeric => "Turmeric",
            Species::Giloy => "Giloy",
            Species::Shatavari => "Shatavari",
            Species::Amla => "Amla",
            Species::Moringa => "Moringa",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Species::ALL
            .into_iter()
            .find(|species| species.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown species '{}'", wanted))
    }
}

impl TryFrom<String> for Species {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Species> for String {
    fn from(species: Species) -> String {
        species.as_str().to_string()
    }
}

/// Latitude/longitude pair captured on the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTag {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoTag {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, String> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("latitude {} out of range [-90, 90]", latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("longitude {} out of range [-180, 180]", longitude));
        }
        Ok(Self { latitude, longitude })
    }
}

impl FromStr for GeoTag {
    type Err = String;

    /// Parses `"lat,long"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| format!("expected 'lat,long', got '{}'", s))?;
        let latitude = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid latitude '{}': {}", lat.trim(), e))?;
        let longitude = lon
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid longitude '{}': {}", lon.trim(), e))?;
        GeoTag::new(latitude, longitude)
    }
}

/// Wire form of a location: `"10.0,20.0"` or `{"latitude": 10.0, "longitude": 20.0}`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GeoTagInput {
    Text(String),
    Object {
        #[serde(alias = "lat")]
        latitude: f64,
        #[serde(alias = "lng", alias = "lon", alias = "long")]
        longitude: f64,
    },
}

impl GeoTagInput {
    pub fn parse(&self) -> Result<GeoTag, String> {
        match self {
            GeoTagInput::Text(text) => text.parse(),
            GeoTagInput::Object { latitude, longitude } => GeoTag::new(*latitude, *longitude),
        }
    }
}

/// Stage-5 details recorded when the batch locks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalDetails {
    pub final_quantity: f64,
    pub harvest_date: NaiveDate,
    pub final_geotag: GeoTag,
    pub final_photo_hash: String,
}

/// One tracked unit of herb produce moving through the five-stage pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: Uuid,
    pub farmer_id: String,
    pub farmer_name: Option<String>,
    pub species: Species,
    pub visit_date: NaiveDate,
    pub geotag: GeoTag,
    pub estimated_quantity: Option<f64>,
    pub current_stage: Stage,
    pub completed_stages: BTreeSet<Stage>,
    pub locked: bool,
    pub final_details: Option<FinalDetails>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped on every persisted change
    pub version: i64,
}

impl Batch {
    pub fn phase(&self) -> BatchPhase {
        if self.locked {
            BatchPhase::Locked
        } else {
            BatchPhase::Active(self.current_stage)
        }
    }

    /// Whether `user_id` takes part in this batch (farmer or creating collector)
    pub fn involves(&self, user_id: &str) -> bool {
        self.farmer_id == user_id || self.created_by == user_id
    }
}
