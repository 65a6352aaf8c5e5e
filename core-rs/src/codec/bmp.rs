//! BMP request body and response
//!
//! Request: `{flow, volatile_solid, time, substrates, ...}` where everything
//! after `volatile_solid` comes from the load-data stage.
//!
//! Response: `{status_code, time, substrates: [{status_code, name, values,
//! predicted_values, params: {status_code, params: [...]}, metrics, energy}]}`.
//! `status_code != 0` marks a failed fit, both globally and per substrate.

use super::submission::{LoadDataResult, Submission};
use crate::errors::{Result, SimError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Body POSTed to `{bmp}/api/v1/bmp/run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmpRequest {
    pub flow: f64,
    /// Renamed from the submission's `volatile_solids`
    pub volatile_solid: f64,
    #[serde(flatten)]
    pub load_data: LoadDataResult,
}

impl BmpRequest {
    pub fn build(submission: &Submission, load_data: &LoadDataResult) -> Self {
        let mut load_data = load_data.clone();
        // Submission values win over anything the load stage happened to carry.
        load_data.extra.remove("flow");
        load_data.extra.remove("volatile_solid");

        Self {
            flow: submission.flow(),
            volatile_solid: submission.volatile_solids(),
            load_data,
        }
    }
}

/// Covariance entry of a fitted parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Covariance {
    #[serde(default)]
    pub covar_to: String,
    pub value: f64,
}

/// One fitted kinetic parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedParameter {
    #[serde(default)]
    pub name: String,
    pub value: f64,
    /// Standard error
    #[serde(default)]
    pub se: Option<f64>,
    #[serde(default)]
    pub ci_inf: Option<f64>,
    #[serde(default)]
    pub ci_sup: Option<f64>,
    #[serde(default)]
    pub covar_list: Vec<Covariance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_codes: Vec<i64>,
}

impl FittedParameter {
    pub fn standard_error(&self) -> Result<f64> {
        self.se.ok_or_else(|| {
            SimError::MalformedInput(format!("parameter '{}' has no standard error", self.name))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterList {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub params: Vec<FittedParameter>,
}

/// Per-substrate fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmpSubstrate {
    pub status_code: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub values: Vec<f64>,
    #[serde(default)]
    pub predicted_values: Vec<f64>,
    #[serde(default)]
    pub params: ParameterList,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub metrics: JsonValue,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub energy: JsonValue,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl BmpSubstrate {
    /// BMP itself marked this substrate as fitted
    pub fn is_usable(&self) -> bool {
        self.status_code == 0
    }

    /// Ultimate methane potential, first fitted parameter
    pub fn bo(&self) -> Result<&FittedParameter> {
        self.params.params.first().ok_or_else(|| {
            SimError::MalformedInput(format!("substrate '{}' has no Bo parameter", self.name))
        })
    }

    /// Hydrolysis constant, second fitted parameter
    pub fn kh(&self) -> Result<&FittedParameter> {
        self.params.params.get(1).ok_or_else(|| {
            SimError::MalformedInput(format!("substrate '{}' has no Kh parameter", self.name))
        })
    }

    /// Bo/Kh covariance: the Bo entry pointing at Kh, else Bo's first entry
    pub fn bo_kh_covariance(&self) -> Result<f64> {
        let bo = self.bo()?;
        let kh = self.kh()?;
        bo.covar_list
            .iter()
            .find(|c| !kh.name.is_empty() && c.covar_to == kh.name)
            .or_else(|| bo.covar_list.first())
            .map(|c| c.value)
            .ok_or_else(|| {
                SimError::MalformedInput(format!("substrate '{}' has no Bo covariance", self.name))
            })
    }

    /// Number of strictly positive observations
    pub fn positive_samples(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.0).count()
    }
}

/// Full BMP response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmpResponse {
    pub status_code: i64,
    #[serde(default)]
    pub time: Vec<f64>,
    #[serde(default)]
    pub substrates: Vec<BmpSubstrate>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl BmpResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 0
    }

    pub fn from_json(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| SimError::MalformedInput(format!("undecodable BMP response: {}", e)))
    }
}

/// Persisted `bmp_result`
///
/// Failure detail travels in the same field as success: a transport or decode
/// failure is stored as text, anything the service answered is stored whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BmpResult {
    Response(BmpResponse),
    Error(String),
}

impl BmpResult {
    pub fn response(&self) -> Option<&BmpResponse> {
        match self {
            BmpResult::Response(response) => Some(response),
            BmpResult::Error(_) => None,
        }
    }
}
