//! Shared fixtures for integration and contract tests
//!
//! `ScriptedComputeClient` stands in for the BMP and CSTR services: it counts
//! calls, records CSTR requests and fails on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use procycla_core::drivers::{ComputeClient, SimulationStore};
use procycla_core::errors::{Result, SimError};
use procycla_core::{
    BmpRequest, BmpResponse, CstrRunRequest, CstrRunResponse, NewSimulation, SimulationId, UncertaintyRequest,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct ScriptedComputeClient {
    bmp_reply: std::result::Result<JsonValue, String>,
    failing_bo: Mutex<HashSet<u64>>,
    failing_propagation: AtomicBool,
    delay: Option<Duration>,
    bmp_calls: AtomicUsize,
    cstr_calls: AtomicUsize,
    propagation_calls: AtomicUsize,
    cstr_requests: Mutex<Vec<CstrRunRequest>>,
    bmp_requests: Mutex<Vec<BmpRequest>>,
}

impl ScriptedComputeClient {
    /// BMP answers `bmp_reply`; CSTR runs and propagation succeed
    pub fn new(bmp_reply: JsonValue) -> Self {
        Self {
            bmp_reply: Ok(bmp_reply),
            failing_bo: Mutex::new(HashSet::new()),
            failing_propagation: AtomicBool::new(false),
            delay: None,
            bmp_calls: AtomicUsize::new(0),
            cstr_calls: AtomicUsize::new(0),
            propagation_calls: AtomicUsize::new(0),
            cstr_requests: Mutex::new(Vec::new()),
            bmp_requests: Mutex::new(Vec::new()),
        }
    }

    /// BMP answers with a non-OK HTTP status
    pub fn bmp_unavailable(status_text: &str) -> Self {
        let mut client = Self::new(JsonValue::Null);
        client.bmp_reply = Err(status_text.to_string());
        client
    }

    /// Every call sleeps first, to widen race windows
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// CSTR runs for the substrate fitted with this Bo fail
    pub fn fail_cstr_for_bo(self, bo: f64) -> Self {
        if let Ok(mut failing) = self.failing_bo.lock() {
            failing.insert(bo.to_bits());
        }
        self
    }

    pub fn fail_propagation(self) -> Self {
        self.failing_propagation.store(true, Ordering::SeqCst);
        self
    }

    pub fn bmp_calls(&self) -> usize {
        self.bmp_calls.load(Ordering::SeqCst)
    }

    pub fn cstr_calls(&self) -> usize {
        self.cstr_calls.load(Ordering::SeqCst)
    }

    pub fn propagation_calls(&self) -> usize {
        self.propagation_calls.load(Ordering::SeqCst)
    }

    pub fn cstr_requests(&self) -> Vec<CstrRunRequest> {
        self.cstr_requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn bmp_requests(&self) -> Vec<BmpRequest> {
        self.bmp_requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ComputeClient for ScriptedComputeClient {
    async fn run_bmp(&self, request: &BmpRequest) -> Result<BmpResponse> {
        self.bmp_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.bmp_requests.lock() {
            requests.push(request.clone());
        }
        self.pause().await;
        match &self.bmp_reply {
            Ok(body) => BmpResponse::from_json(body.clone()),
            Err(text) => Err(SimError::TransportFailure(text.clone())),
        }
    }

    async fn run_cstr(&self, request: &CstrRunRequest) -> Result<CstrRunResponse> {
        self.cstr_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.cstr_requests.lock() {
            requests.push(request.clone());
        }
        self.pause().await;

        let failing = self
            .failing_bo
            .lock()
            .map(|f| f.contains(&request.bo.to_bits()))
            .unwrap_or(false);
        if failing {
            return Err(SimError::TransportFailure("Service Unavailable".to_string()));
        }

        let scale = request.uncertainty.variant_index() as f64 + 1.0;
        CstrRunResponse::from_json(json!({
            "status_code": 0,
            "trh": 20.0,
            "execution_days": 100,
            "results": [
                {"name": "simulate_results", "value": {"pH": [7.0, 7.0 + 0.01 * scale]}},
                {"name": "gasflow", "value": {"q_gas": [request.bo * scale, request.bo * scale]}},
                {"name": "energy", "value": {"EBG": [1.5], "ETG": [0.6], "EEG": [0.5]}}
            ]
        }))
    }

    async fn propagate_uncertainty(&self, request: &UncertaintyRequest) -> Result<Vec<JsonValue>> {
        self.propagation_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.failing_propagation.load(Ordering::SeqCst) {
            return Err(SimError::TransportFailure("Internal Server Error".to_string()));
        }
        Ok(vec![
            json!({
                "name": "q_gas",
                "value": request.original_q_gas,
                "min": request.original_q_gas.iter().map(|v| v * 0.9).collect::<Vec<_>>(),
                "max": request.original_q_gas.iter().map(|v| v * 1.1).collect::<Vec<_>>()
            }),
            json!({
                "name": "pH",
                "value": request.original_ph,
                "min": request.original_ph,
                "max": request.original_ph
            }),
        ])
    }
}

pub fn plant_submission() -> JsonValue {
    json!({
        "type": "plant_operation",
        "working_volume": "1000",
        "headspace_volume": 100,
        "flow": 50,
        "total_cod": 100,
        "soluble_cod": 10,
        "volatile_solids": 8,
        "ammonia_nitrogen": 0.5,
        "total_nitrogen": 2,
        "ph": 7,
        "total_alkalinity": 2,
        "partial_alkalinity": 0.5
    })
}

pub fn prefeasibility_submission() -> JsonValue {
    json!({"type": "prefeasibility", "flow": 50, "volatile_solids": 8})
}

pub fn load_data(substrates: usize) -> JsonValue {
    let substrates: Vec<JsonValue> = (0..substrates)
        .map(|i| json!({"name": format!("S{}", i + 1), "values": [0.0, 10.0, 20.0]}))
        .collect();
    json!({"time": [0.0, 5.0, 10.0], "substrates": substrates})
}

/// BMP substrate fit with `Bo = bo`, `Kh = 0.2`
pub fn bmp_substrate(name: &str, bo: f64, status_code: i64) -> JsonValue {
    json!({
        "status_code": status_code,
        "name": name,
        "values": [0.0, 10.0, 20.0],
        "predicted_values": [0.0, 9.8, 20.3],
        "params": {
            "status_code": 0,
            "params": [
                {"name": "a", "value": bo, "se": 4.0, "ci_inf": bo - 8.0, "ci_sup": bo + 8.0,
                 "covar_list": [{"covar_to": "a", "value": 16.0}, {"covar_to": "k", "value": -0.03}]},
                {"name": "k", "value": 0.2, "se": 0.01, "ci_inf": 0.18, "ci_sup": 0.22,
                 "covar_list": [{"covar_to": "a", "value": -0.03}]}
            ]
        },
        "metrics": {"status_code": 0},
        "energy": [{"name": "EBG", "value": 1.0}]
    })
}

/// Successful BMP response with one usable substrate per Bo value
pub fn bmp_response(bos: &[f64]) -> JsonValue {
    let substrates: Vec<JsonValue> = bos
        .iter()
        .enumerate()
        .map(|(i, bo)| bmp_substrate(&format!("S{}", i + 1), *bo, 0))
        .collect();
    json!({"status_code": 0, "time": [0.0, 5.0, 10.0], "substrates": substrates})
}

/// Insert a record whose load data is finished
pub fn seed(store: &dyn SimulationStore, submit_data: JsonValue, substrates: usize) -> SimulationId {
    store
        .create(NewSimulation {
            project_id: "project-1".to_string(),
            name: "Digester A".to_string(),
            description: None,
            submit_data,
            load_data_result: Some(load_data(substrates)),
        })
        .expect("seed record")
        .id
}
