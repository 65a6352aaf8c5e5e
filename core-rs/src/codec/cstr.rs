//! CSTR run variants, uncertainty propagation and the stage result
//!
//! Every usable substrate is simulated three times:
//!
//! | variant | `uncertainty` | purpose                     |
//! |---------|---------------|-----------------------------|
//! | 0       | `off`         | baseline                    |
//! | 1       | `bo`          | sensitivity to `Bo`         |
//! | 2       | `kh`          | sensitivity to `Kh`         |
//!
//! The CSTR service applies the perturbation itself, so all three requests
//! carry the same fitted `Bo`/`Kh` values.

use super::bmp::BmpSubstrate;
use super::progress::ProgressTicket;
use super::submission::PlantOperation;
use crate::errors::{Result, SimError};
use crate::model::SimulationId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;

/// Which kinetic parameter a run perturbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Uncertainty {
    Off,
    Bo,
    Kh,
}

impl Uncertainty {
    /// In variant-index order
    pub const ALL: [Uncertainty; 3] = [Uncertainty::Off, Uncertainty::Bo, Uncertainty::Kh];

    pub fn variant_index(&self) -> usize {
        match self {
            Uncertainty::Off => 0,
            Uncertainty::Bo => 1,
            Uncertainty::Kh => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Uncertainty::Off => "off",
            Uncertainty::Bo => "bo",
            Uncertainty::Kh => "kh",
        }
    }
}

impl fmt::Display for Uncertainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body POSTed to `{cstr}/api/v1/cstr/run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CstrRunRequest {
    #[serde(rename = "V_liq")]
    pub v_liq: f64,
    #[serde(rename = "V_gas")]
    pub v_gas: f64,
    pub q_ad: f64,
    #[serde(rename = "COD")]
    pub cod: f64,
    #[serde(rename = "CODs")]
    pub cod_soluble: f64,
    #[serde(rename = "SV")]
    pub sv: f64,
    #[serde(rename = "Ni")]
    pub ni: f64,
    #[serde(rename = "Nt")]
    pub nt: f64,
    #[serde(rename = "pH_in")]
    pub ph_in: f64,
    #[serde(rename = "At")]
    pub at: f64,
    #[serde(rename = "Ap")]
    pub ap: f64,
    #[serde(rename = "Bo")]
    pub bo: f64,
    #[serde(rename = "Kh")]
    pub kh: f64,
    pub uncertainty: Uncertainty,
    pub progress_url: String,
}

impl CstrRunRequest {
    /// Build the baseline, Bo and Kh variants for one substrate, in variant
    /// order. Each carries its own progress callback URL.
    pub fn variants(
        plant: &PlantOperation,
        substrate: &BmpSubstrate,
        simulation_id: &SimulationId,
        substrate_index: usize,
        substrate_count: usize,
        app_url: &str,
    ) -> Result<[CstrRunRequest; 3]> {
        let bo = substrate.bo()?.value;
        let kh = substrate.kh()?.value;

        let build = |uncertainty: Uncertainty| -> Result<CstrRunRequest> {
            let ticket = ProgressTicket {
                simulation_id: simulation_id.clone(),
                substrate_index,
                substrate_count,
                variant_index: uncertainty.variant_index(),
            };
            Ok(CstrRunRequest {
                v_liq: plant.working_volume,
                v_gas: plant.headspace_volume,
                q_ad: plant.flow,
                cod: plant.total_cod,
                cod_soluble: plant.soluble_cod,
                sv: plant.volatile_solids,
                ni: plant.ammonia_nitrogen,
                nt: plant.total_nitrogen,
                ph_in: plant.ph,
                at: plant.total_alkalinity,
                ap: plant.partial_alkalinity,
                bo,
                kh,
                uncertainty,
                progress_url: ticket.url(app_url)?,
            })
        };

        Ok([
            build(Uncertainty::Off)?,
            build(Uncertainty::Bo)?,
            build(Uncertainty::Kh)?,
        ])
    }
}

/// `{name, value}` entry of a CSTR run response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedResult {
    pub name: String,
    pub value: JsonValue,
}

/// Response of a CSTR run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CstrRunResponse {
    #[serde(default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub trh: Option<f64>,
    #[serde(default)]
    pub execution_days: Option<i64>,
    pub results: Vec<NamedResult>,
}

impl CstrRunResponse {
    pub fn from_json(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| SimError::MalformedInput(format!("undecodable CSTR response: {}", e)))
    }

    pub fn named(&self, name: &str) -> Option<&NamedResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// `gasflow.q_gas` series
    pub fn q_gas(&self) -> Result<Vec<f64>> {
        self.series("gasflow", "q_gas")
    }

    /// `simulate_results.pH` series
    pub fn ph(&self) -> Result<Vec<f64>> {
        self.series("simulate_results", "pH")
    }

    /// The `energy` entry, appended to the propagation result
    pub fn energy(&self) -> Option<&NamedResult> {
        self.named("energy")
    }

    fn series(&self, entry: &str, field: &str) -> Result<Vec<f64>> {
        let value = self
            .named(entry)
            .and_then(|r| r.value.get(field))
            .ok_or_else(|| {
                SimError::MalformedInput(format!("CSTR response has no {}.{}", entry, field))
            })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            SimError::MalformedInput(format!("CSTR response {}.{} is not a number series: {}", entry, field, e))
        })
    }
}

/// Body POSTed to `{cstr}/api/v1/cstr/uncertainty-propagation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyRequest {
    #[serde(rename = "BoSE")]
    pub bo_se: f64,
    #[serde(rename = "KhSE")]
    pub kh_se: f64,
    #[serde(rename = "BoKhCovariance")]
    pub bo_kh_covariance: f64,
    #[serde(rename = "NSamples")]
    pub n_samples: usize,
    #[serde(rename = "Original_qGas")]
    pub original_q_gas: Vec<f64>,
    #[serde(rename = "Original_pH")]
    pub original_ph: Vec<f64>,
    #[serde(rename = "BoDelta_qGas")]
    pub bo_delta_q_gas: Vec<f64>,
    #[serde(rename = "BoDelta_pH")]
    pub bo_delta_ph: Vec<f64>,
    #[serde(rename = "KhDelta_qGas")]
    pub kh_delta_q_gas: Vec<f64>,
    #[serde(rename = "KhDelta_pH")]
    pub kh_delta_ph: Vec<f64>,
}

impl UncertaintyRequest {
    /// `runs` must be in variant order: baseline, Bo, Kh
    pub fn build(substrate: &BmpSubstrate, runs: &[CstrRunResponse; 3]) -> Result<Self> {
        let [original, bo_delta, kh_delta] = runs;

        Ok(Self {
            bo_se: substrate.bo()?.standard_error()?,
            kh_se: substrate.kh()?.standard_error()?,
            bo_kh_covariance: substrate.bo_kh_covariance()?,
            n_samples: substrate.positive_samples(),
            original_q_gas: original.q_gas()?,
            original_ph: original.ph()?,
            bo_delta_q_gas: bo_delta.q_gas()?,
            bo_delta_ph: bo_delta.ph()?,
            kh_delta_q_gas: kh_delta.q_gas()?,
            kh_delta_ph: kh_delta.ph()?,
        })
    }
}

/// Outcome of one substrate in the fan-out
///
/// The stage result holds exactly one outcome per BMP substrate, in BMP
/// order, so consumers can align by position or by `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubstrateOutcome {
    /// Propagation result with the baseline `energy` entry appended
    Completed {
        index: usize,
        name: String,
        results: Vec<JsonValue>,
    },
    /// BMP marked the substrate as failed; no CSTR call was made
    Skipped {
        index: usize,
        name: String,
        reason: String,
    },
    Failed {
        index: usize,
        name: String,
        errors: Vec<String>,
    },
}

impl SubstrateOutcome {
    pub fn completed(index: usize, name: &str, mut propagation: Vec<JsonValue>, energy: Option<&NamedResult>) -> Self {
        if let Some(energy) = energy {
            propagation.push(json!({"name": energy.name, "value": energy.value}));
        }
        SubstrateOutcome::Completed {
            index,
            name: name.to_string(),
            results: propagation,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            SubstrateOutcome::Completed { index, .. }
            | SubstrateOutcome::Skipped { index, .. }
            | SubstrateOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, SubstrateOutcome::Completed { .. })
    }

    pub fn errors(&self) -> &[String] {
        match self {
            SubstrateOutcome::Failed { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// Persisted `cstr_result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CstrResult {
    Substrates(Vec<SubstrateOutcome>),
    Error(String),
}

impl CstrResult {
    pub fn substrates(&self) -> Option<&[SubstrateOutcome]> {
        match self {
            CstrResult::Substrates(outcomes) => Some(outcomes),
            CstrResult::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            CstrResult::Error(text) => Some(text),
            CstrResult::Substrates(_) => None,
        }
    }
}
