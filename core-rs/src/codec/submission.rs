//! Submission payload and load-data result
//!
//! `submit_data` is tagged by its `type` field. Only `plant_operation`
//! simulations model a continuous reactor, so only that variant carries the
//! reactor parameters.

use super::decode_blob;
use crate::errors::Result;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// Simulation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationType {
    PlantOperation,
    Prefeasibility,
}

impl SimulationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationType::PlantOperation => "plant_operation",
            SimulationType::Prefeasibility => "prefeasibility",
        }
    }
}

impl fmt::Display for SimulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reactor and feed parameters of a plant-operation simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantOperation {
    /// Working (liquid) volume, m3
    #[serde(deserialize_with = "number")]
    pub working_volume: f64,
    /// Headspace (gas) volume, m3
    #[serde(deserialize_with = "number")]
    pub headspace_volume: f64,
    /// Feed flow, m3/d
    #[serde(deserialize_with = "number")]
    pub flow: f64,
    /// kgCOD/m3
    #[serde(deserialize_with = "number")]
    pub total_cod: f64,
    /// kgCOD/m3
    #[serde(deserialize_with = "number")]
    pub soluble_cod: f64,
    /// %
    #[serde(deserialize_with = "number")]
    pub volatile_solids: f64,
    /// kg/m3
    #[serde(deserialize_with = "number")]
    pub ammonia_nitrogen: f64,
    /// kg/m3
    #[serde(deserialize_with = "number")]
    pub total_nitrogen: f64,
    #[serde(deserialize_with = "number")]
    pub ph: f64,
    /// kgCaCO3/m3
    #[serde(deserialize_with = "number")]
    pub total_alkalinity: f64,
    /// kgCaCO3/m3
    #[serde(deserialize_with = "number")]
    pub partial_alkalinity: f64,
}

/// Substrate parameters of a prefeasibility simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefeasibility {
    #[serde(deserialize_with = "number")]
    pub flow: f64,
    #[serde(deserialize_with = "number")]
    pub volatile_solids: f64,
}

/// Decoded `submit_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Submission {
    PlantOperation(PlantOperation),
    Prefeasibility(Prefeasibility),
}

impl Submission {
    /// Parse `submit_data`, stored either as a JSON string or structured JSON
    pub fn parse(raw: &JsonValue) -> Result<Self> {
        decode_blob(raw, "submit_data")
    }

    pub fn kind(&self) -> SimulationType {
        match self {
            Submission::PlantOperation(_) => SimulationType::PlantOperation,
            Submission::Prefeasibility(_) => SimulationType::Prefeasibility,
        }
    }

    pub fn flow(&self) -> f64 {
        match self {
            Submission::PlantOperation(p) => p.flow,
            Submission::Prefeasibility(p) => p.flow,
        }
    }

    pub fn volatile_solids(&self) -> f64 {
        match self {
            Submission::PlantOperation(p) => p.volatile_solids,
            Submission::Prefeasibility(p) => p.volatile_solids,
        }
    }

    /// Reactor parameters, present only for plant-operation simulations
    pub fn plant_operation(&self) -> Option<&PlantOperation> {
        match self {
            Submission::PlantOperation(p) => Some(p),
            Submission::Prefeasibility(_) => None,
        }
    }
}

/// One observed substrate series from the load-data stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedSubstrate {
    pub name: String,
    pub values: Vec<f64>,
}

/// Output of the upstream data-wrangling stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadDataResult {
    #[serde(default)]
    pub time: Vec<f64>,
    pub substrates: Vec<ObservedSubstrate>,
    /// Fields the orchestrator forwards untouched
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl LoadDataResult {
    pub fn parse(raw: &JsonValue) -> Result<Self> {
        decode_blob(raw, "load_data_result")
    }
}

/// Accept a JSON number or a numeric string; web forms submit the latter.
fn number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    let value = match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => n,
        NumberOrText::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| de::Error::custom(format!("expected a number, got {:?}", text)))?,
    };

    if !value.is_finite() {
        return Err(de::Error::custom("expected a finite number"));
    }
    Ok(value)
}
