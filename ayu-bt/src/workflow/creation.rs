//! Batch creation workflow
//!
//! Validates Stage-1 field-visit input and produces the initial batch
//! (stage 1, nothing completed, unlocked). The Stage-1 photo is a separate
//! confirmation phase handled by the batch service: creation never waits on
//! it and is never rolled back because of it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::models::{Batch, GeoTag, GeoTagInput, Species, Stage};

/// Field-visit form input
///
/// Accepts both the form field names and the external create-batch contract
/// (`farmId`, `startDate`, `coords`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    #[serde(default)]
    pub farmer_name: Option<String>,

    #[serde(default, alias = "farmId")]
    pub farmer_id: Option<String>,

    #[serde(default)]
    pub species: Option<String>,

    /// Defaults to today when absent
    #[serde(default, alias = "startDate")]
    pub visit_date: Option<String>,

    #[serde(default, alias = "coords")]
    pub geotag: Option<GeoTagInput>,

    #[serde(default)]
    pub estimated_quantity: Option<f64>,
}

/// Input that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub farmer_name: Option<String>,
    pub farmer_id: String,
    pub species: Species,
    pub visit_date: NaiveDate,
    pub geotag: GeoTag,
    pub estimated_quantity: Option<f64>,
}

impl ValidatedBatch {
    /// Allocate the batch record in its initial state
    pub fn into_batch(self, created_by: &str, now: DateTime<Utc>) -> Batch {
        Batch {
            batch_id: Uuid::new_v4(),
            farmer_id: self.farmer_id,
            farmer_name: self.farmer_name,
            species: self.species,
            visit_date: self.visit_date,
            geotag: self.geotag,
            estimated_quantity: self.estimated_quantity,
            current_stage: Stage::Plantation,
            completed_stages: BTreeSet::new(),
            locked: false,
            final_details: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Validate creation input; `today` fills a missing visit date
pub fn validate_batch_input(
    input: &BatchInput,
    today: NaiveDate,
) -> Result<ValidatedBatch, ValidationError> {
    let farmer_id = required_text(&input.farmer_id, "farmerId")?;

    let farmer_name = match &input.farmer_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ValidationError::invalid("farmerName", "must not be empty"))
        }
        Some(name) => Some(name.trim().to_string()),
        None => None,
    };

    let species_text = required_text(&input.species, "species")?;
    let species: Species = species_text
        .parse()
        .map_err(|reason: String| ValidationError::invalid("species", reason))?;

    let visit_date = parse_date(input.visit_date.as_deref(), "visitDate")?.unwrap_or(today);

    let geotag = input
        .geotag
        .as_ref()
        .ok_or(ValidationError::MissingField("geotag"))?
        .parse()
        .map_err(|reason| ValidationError::invalid("geotag", reason))?;

    let estimated_quantity = match input.estimated_quantity {
        Some(q) if !q.is_finite() || q <= 0.0 => {
            return Err(ValidationError::invalid(
                "estimatedQuantity",
                format!("must be a positive number, got {}", q),
            ))
        }
        other => other,
    };

    Ok(ValidatedBatch {
        farmer_name,
        farmer_id,
        species,
        visit_date,
        geotag,
        estimated_quantity,
    })
}

fn required_text(value: &Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// Parse an optional `YYYY-MM-DD` date; empty strings count as absent
pub fn parse_date(
    value: Option<&str>,
    field: &'static str,
) -> Result<Option<NaiveDate>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| ValidationError::invalid(field, format!("'{}': {}", text, e))),
    }
}
