//! Stage result codec
//!
//! Pure data transformation, no I/O:
//! - `submission`: user parameters and the load-data stage output
//! - `bmp`: BMP request body and response
//! - `cstr`: CSTR run variants, uncertainty-propagation body, stage result
//! - `progress`: progress callback ticket and fraction formula
//!
//! Every decode failure surfaces as [`crate::SimError::MalformedInput`];
//! nothing is silently defaulted.

mod submission;
mod bmp;
mod cstr;
mod progress;

pub use submission::{LoadDataResult, ObservedSubstrate, PlantOperation, Prefeasibility, SimulationType, Submission};
pub use bmp::{BmpRequest, BmpResponse, BmpResult, BmpSubstrate, Covariance, FittedParameter, ParameterList};
pub use cstr::{
    CstrResult, CstrRunRequest, CstrRunResponse, NamedResult, SubstrateOutcome, Uncertainty, UncertaintyRequest,
};
pub use progress::{progress_fraction, ProgressTicket, VARIANTS_PER_SUBSTRATE};

use crate::errors::{Result, SimError};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Decode a blob that may be stored either as structured JSON or as a JSON
/// document inside a string.
pub(crate) fn decode_blob<T: DeserializeOwned>(raw: &JsonValue, what: &str) -> Result<T> {
    let decoded = match raw {
        JsonValue::String(text) => serde_json::from_str(text),
        other => serde_json::from_value(other.clone()),
    };
    decoded.map_err(|e| SimError::MalformedInput(format!("invalid {}: {}", what, e)))
}
