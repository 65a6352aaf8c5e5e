// ApiServer - HTTP front door of the orchestrator
//
// Routes:
// - GET|POST /simulation/start?simulation_id=..   accept a trigger (202)
// - POST     /simulation/progress?simulation_id=..&substrate_index=..&length=..&index=..
// - GET      /simulation/:id                      poll a record
// - DELETE   /simulation/:id                      remove a record
// - GET      /simulations                         list records
// - GET      /healthz
//
// Triggers return as soon as the pipeline task is spawned. Stage outcomes
// are only visible by polling the record. Handlers touching the store run on
// the blocking pool.

use crate::codec::ProgressTicket;
use crate::errors::{Result, SimError};
use crate::model::SimulationId;
use crate::pipeline::{Orchestrator, ProgressReporter};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
    progress: ProgressReporter,
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    simulation_id: SimulationId,
}

pub struct ApiServer {
    orchestrator: Orchestrator,
}

impl ApiServer {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            progress: self.orchestrator.progress_reporter(),
            orchestrator: self.orchestrator.clone(),
        };

        Router::new()
            .route("/healthz", get(healthz))
            .route("/simulation/start", get(start_simulation).post(start_simulation))
            .route("/simulation/progress", get(report_progress).post(report_progress))
            .route("/simulation/:id", get(get_simulation).delete(delete_simulation))
            .route("/simulations", get(list_simulations))
            .with_state(state)
    }

    /// Serve on `listener` until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(addr = ?addr, "orchestrator API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("orchestrator API stopped");
        Ok(())
    }

    /// Bind `addr` and serve until Ctrl-C
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

struct ApiError(SimError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SimError::RecordGone(_) => StatusCode::NOT_FOUND,
            SimError::NotReady(_) => StatusCode::CONFLICT,
            SimError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"message": self.0.to_string()}))).into_response()
    }
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        ApiError(err)
    }
}

async fn off_runtime<T, F>(call: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ApiError(SimError::Store(format!("handler task failed: {}", e))))?
        .map_err(ApiError)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({"status": "ok", "version": crate::VERSION}))
}

async fn start_simulation(
    State(state): State<AppState>,
    Query(query): Query<StartQuery>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    // Detached: the handle is dropped and the pipeline keeps running.
    let orchestrator = state.orchestrator.clone();
    let id = query.simulation_id.clone();
    off_runtime(move || orchestrator.start(&id).map(drop)).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"simulation_id": query.simulation_id, "accepted": true})),
    ))
}

async fn report_progress(
    State(state): State<AppState>,
    Query(ticket): Query<ProgressTicket>,
) -> std::result::Result<Json<bool>, ApiError> {
    let simulation_id = ticket.simulation_id.clone();
    let progress = state.progress.clone();
    match off_runtime(move || progress.report(&ticket)).await {
        Ok(_) => Ok(Json(true)),
        Err(e) => {
            warn!(simulation_id = %simulation_id, error = %e.0, "progress callback rejected");
            Err(e)
        }
    }
}

async fn get_simulation(
    State(state): State<AppState>,
    Path(id): Path<SimulationId>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let store = state.orchestrator.store().clone();
    let record = off_runtime(move || store.require(&id)).await?;
    Ok(Json(record))
}

async fn delete_simulation(
    State(state): State<AppState>,
    Path(id): Path<SimulationId>,
) -> std::result::Result<StatusCode, ApiError> {
    let store = state.orchestrator.store().clone();
    let target = id.clone();
    if off_runtime(move || store.delete(&target)).await? {
        info!(simulation_id = %id, "record deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SimError::RecordGone(id.to_string()).into())
    }
}

async fn list_simulations(
    State(state): State<AppState>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let store = state.orchestrator.store().clone();
    Ok(Json(off_runtime(move || store.list()).await?))
}
