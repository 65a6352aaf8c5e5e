//! Progress callback ticket
//!
//! The CSTR service calls back `progress_url` once per variant run. The URL
//! identifies the run by query parameters:
//!
//! ```text
//! {app}/simulation/progress?simulation_id=..&substrate_index=..&length=..&index=..
//! ```
//!
//! Progress for variant `k` of substrate `i` out of `N` is
//! `(i*100 + k*100/3) / N`.

use crate::errors::{Result, SimError};
use crate::model::SimulationId;
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const VARIANTS_PER_SUBSTRATE: usize = 3;

/// Route the CSTR service posts progress to, relative to the app URL
pub const PROGRESS_ROUTE: &str = "simulation/progress";

/// Overall CSTR progress in percent
pub fn progress_fraction(substrate_index: usize, substrate_count: usize, variant_index: usize) -> f64 {
    let i = substrate_index as f64;
    let k = variant_index as f64;
    let n = substrate_count as f64;
    (i * 100.0 + k * 100.0 / VARIANTS_PER_SUBSTRATE as f64) / n
}

/// Identity of one variant run, as carried by the callback query string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressTicket {
    pub simulation_id: SimulationId,
    pub substrate_index: usize,
    #[serde(rename = "length")]
    pub substrate_count: usize,
    #[serde(rename = "index")]
    pub variant_index: usize,
}

impl ProgressTicket {
    /// Callback URL under `app_url`
    pub fn url(&self, app_url: &str) -> Result<String> {
        let base = format!("{}/{}", app_url.trim_end_matches('/'), PROGRESS_ROUTE);
        let mut url = Url::parse(&base)
            .map_err(|e| SimError::Config(format!("invalid app URL '{}': {}", app_url, e)))?;
        url.query_pairs_mut()
            .append_pair("simulation_id", self.simulation_id.as_str())
            .append_pair("substrate_index", &self.substrate_index.to_string())
            .append_pair("length", &self.substrate_count.to_string())
            .append_pair("index", &self.variant_index.to_string());
        Ok(url.to_string())
    }

    /// Percent value to store, rejecting tickets that could not come from a run
    pub fn fraction(&self) -> Result<f64> {
        if self.substrate_count == 0 {
            return Err(SimError::MalformedInput("progress length must be positive".to_string()));
        }
        if self.substrate_index >= self.substrate_count {
            return Err(SimError::MalformedInput(format!(
                "substrate_index {} out of range for length {}",
                self.substrate_index, self.substrate_count
            )));
        }
        if self.variant_index >= VARIANTS_PER_SUBSTRATE {
            return Err(SimError::MalformedInput(format!(
                "variant index {} out of range",
                self.variant_index
            )));
        }
        Ok(progress_fraction(self.substrate_index, self.substrate_count, self.variant_index))
    }
}
