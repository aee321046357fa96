// Parking Engine - Web Server
// REST API with Axum over the SQLite-backed engine

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use parking_engine::{
    Config, EngineError, EngineResult, Facility, NewFacility, NewTariff, ParkingEngine, Receipt,
    SqliteStore, Stay, Tariff, VehicleType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Arc<ParkingEngine<SqliteStore>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
struct CreateParkingEntry {
    parking_lot_id: i64,
    vehicle_type: VehicleType,
    license_plate: String,
}

#[derive(Serialize)]
struct ExitResponse {
    entry: Stay,
    receipt: Receipt,
}

// ============================================================================
// Error mapping
// ============================================================================

enum ApiError {
    Engine(EngineError),
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Engine(err) => {
                let status = match &err {
                    EngineError::FacilityNotFound { .. }
                    | EngineError::StayNotFound { .. }
                    | EngineError::TariffNotFound { .. }
                    | EngineError::UnknownTariff { .. } => StatusCode::NOT_FOUND,
                    EngineError::NoAvailableSpots { .. } | EngineError::AlreadyExited { .. } => {
                        StatusCode::CONFLICT
                    }
                    EngineError::VehicleNotExited { .. } => StatusCode::BAD_REQUEST,
                    EngineError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if err.is_domain() {
                    (status, err.to_string())
                } else {
                    error!(error = %err, "storage failure");
                    (status, "internal storage error".to_string())
                }
            }
            ApiError::Internal(message) => {
                error!(%message, "request task failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(ApiResponse::<()>::err(message))).into_response()
    }
}

/// Run an engine call on the blocking pool; SQLite I/O must not stall the runtime.
async fn run<T, F>(state: &AppState, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&ParkingEngine<SqliteStore>) -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || call(&engine))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /parking-lots - Create a parking lot
async fn create_parking_lot(
    State(state): State<AppState>,
    Json(body): Json<NewFacility>,
) -> Result<(StatusCode, Json<ApiResponse<Facility>>), ApiError> {
    let lot = run(&state, move |engine| engine.create_facility(body)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(lot))))
}

/// GET /parking-lots/:id - Get one parking lot
async fn get_parking_lot(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Facility>>, ApiError> {
    let lot = run(&state, move |engine| engine.get_facility(id)).await?;
    Ok(Json(ApiResponse::ok(lot)))
}

/// GET /parking-lots/:id/available-spots - Free spots per vehicle type
async fn get_available_spots(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<BTreeMap<VehicleType, i64>>>, ApiError> {
    let spots = run(&state, move |engine| engine.get_available_spots(id)).await?;
    Ok(Json(ApiResponse::ok(spots)))
}

/// POST /parking-entries - Admit a vehicle
async fn create_parking_entry(
    State(state): State<AppState>,
    Json(body): Json<CreateParkingEntry>,
) -> Result<(StatusCode, Json<ApiResponse<Stay>>), ApiError> {
    let stay = run(&state, move |engine| {
        engine.admit(body.parking_lot_id, body.vehicle_type, &body.license_plate)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(stay))))
}

/// GET /parking-entries/:id - Get one parking entry
async fn get_parking_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Stay>>, ApiError> {
    let stay = run(&state, move |engine| engine.get_stay(id)).await?;
    Ok(Json(ApiResponse::ok(stay)))
}

/// PUT /parking-entries/:id/exit - Close an entry and issue its receipt
async fn exit_parking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ExitResponse>>, ApiError> {
    let (entry, receipt) = run(&state, move |engine| engine.exit(id)).await?;
    Ok(Json(ApiResponse::ok(ExitResponse { entry, receipt })))
}

/// GET /parking-entries/:id/fee - Fee of a closed entry
async fn get_fee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Decimal>>, ApiError> {
    let fee = run(&state, move |engine| engine.calculate_fee(id)).await?;
    Ok(Json(ApiResponse::ok(fee)))
}

/// GET /parking-entries/:id/receipt - Receipt of a closed entry
async fn get_receipt(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Receipt>>, ApiError> {
    let receipt = run(&state, move |engine| engine.get_receipt(id)).await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

/// POST /tariffs - Register a tariff
async fn create_tariff(
    State(state): State<AppState>,
    Json(body): Json<NewTariff>,
) -> Result<(StatusCode, Json<ApiResponse<Tariff>>), ApiError> {
    let tariff = run(&state, move |engine| engine.create_tariff(body)).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(tariff))))
}

/// GET /tariffs/:id - Get one tariff
async fn get_tariff(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Tariff>>, ApiError> {
    let tariff = run(&state, move |engine| engine.get_tariff(id)).await?;
    Ok(Json(ApiResponse::ok(tariff)))
}

// ============================================================================
// Main Server
// ============================================================================

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/parking-lots", post(create_parking_lot))
        .route("/parking-lots/:id", get(get_parking_lot))
        .route("/parking-lots/:id/available-spots", get(get_available_spots))
        .route("/parking-entries", post(create_parking_entry))
        .route("/parking-entries/:id", get(get_parking_entry))
        .route("/parking-entries/:id/exit", put(exit_parking))
        .route("/parking-entries/:id/fee", get(get_fee))
        .route("/parking-entries/:id/receipt", get(get_receipt))
        .route("/tariffs", post(create_tariff))
        .route("/tariffs/:id", get(get_tariff))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(None).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_filter))),
        )
        .init();

    let store = SqliteStore::open(&config.database_path, config.busy_timeout())
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    info!(path = %config.database_path.display(), "database opened");

    let state = AppState {
        engine: Arc::new(ParkingEngine::new(store)),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!(address = %config.bind_address, "parking server listening");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
