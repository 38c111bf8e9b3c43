// Delivery Calendar - Web Server
// Login gate + calendar endpoints with Axum

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{Datelike, Local, NaiveDate};
use delivery_calendar::{compute_layout, AuthGate, Config, DeliveryRecord, SessionStore};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

const SESSION_COOKIE: &str = "delivery_session";

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    gate: Arc<AuthGate>,
    sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        if self.gate.is_open() {
            return true;
        }
        let Some(id) = session_id(headers) else {
            return false;
        };
        self.sessions
            .lock()
            .map(|sessions| sessions.is_authenticated(&id))
            .unwrap_or(false)
    }
}

fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok())
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
struct MonthQuery {
    year: Option<i32>,
    month: Option<u32>,
}

impl MonthQuery {
    fn resolve(&self) -> (i32, u32) {
        let today = Local::now().date_naive();
        (
            self.year.unwrap_or(today.year()),
            self.month.unwrap_or(today.month()),
        )
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

/// Delivery response (simplified for API)
#[derive(Serialize)]
struct DeliveryResponse {
    date: NaiveDate,
    label: String,
    source: String,
    color: String,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::err("login required")),
    )
        .into_response()
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Each request reads the sources afresh on the blocking pool; nothing is
/// cached between requests
async fn load_records(config: Arc<Config>) -> Result<Vec<DeliveryRecord>, Response> {
    tokio::task::spawn_blocking(move || {
        let loader = config
            .loader()
            .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        loader.load_all(&config.data_sources()).map_err(|e| {
            error!("Error loading delivery logs: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })
    })
    .await
    .map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Task join error: {}", e),
        )
    })?
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/login - Check the password and set a session cookie
async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let mut session = state.gate.open_session();

    if !state.gate.login(&mut session, &req.password) {
        warn!("Rejected login attempt");
        return error_response(StatusCode::UNAUTHORIZED, "incorrect password".to_string());
    }

    let id = session.id();
    match state.sessions.lock() {
        Ok(mut sessions) => sessions.insert(session),
        Err(_) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "session store unavailable".to_string(),
            )
        }
    }

    info!(session = %id, "Session authenticated");
    let cookie = format!("{}={}; HttpOnly; SameSite=Strict; Path=/", SESSION_COOKIE, id);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::ok(id)),
    )
        .into_response()
}

/// POST /api/logout - Forget the cookie's session
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        if let Ok(mut sessions) = state.sessions.lock() {
            if sessions.remove(&id).is_some() {
                info!(session = %id, "Session logged out");
            }
        }
    }

    let cookie = format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", SESSION_COOKIE);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(ApiResponse::ok("logged out")),
    )
        .into_response()
}

/// GET /api/calendar?year=&month= - Rendered month as SVG
async fn get_calendar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MonthQuery>,
) -> Response {
    if !state.is_authenticated(&headers) {
        return unauthorized();
    }

    let (year, month) = query.resolve();
    let records = match load_records(state.config.clone()).await {
        Ok(records) => records,
        Err(response) => return response,
    };

    match compute_layout(&records, year, month, &state.config.layout) {
        Ok(layout) => {
            let svg = state.config.renderer().render(&layout).to_svg();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "image/svg+xml")],
                svg,
            )
                .into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// GET /api/deliveries?year=&month= - Deliveries of a month, in calendar order
async fn get_deliveries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MonthQuery>,
) -> Response {
    if !state.is_authenticated(&headers) {
        return unauthorized();
    }

    let (year, month) = query.resolve();
    let records = match load_records(state.config.clone()).await {
        Ok(records) => records,
        Err(response) => return response,
    };

    match compute_layout(&records, year, month, &state.config.layout) {
        Ok(layout) => {
            let palette = state.config.palette();
            let response: Vec<DeliveryResponse> = layout
                .cells()
                .flat_map(|cell| cell.records.iter())
                .map(|record| DeliveryResponse {
                    date: record.date,
                    label: record.label.clone(),
                    source: record.source.clone(),
                    color: palette.color_for(&record.source).to_string(),
                })
                .collect();

            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let gate = config.auth_gate()?;

    if gate.is_open() {
        warn!("No password configured; calendar is open to anyone who can reach the server");
    }

    // Create shared state
    let state = AppState {
        config: Arc::new(config),
        gate: Arc::new(gate),
        sessions: Arc::new(Mutex::new(SessionStore::default())),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/calendar", get(get_calendar))
        .route("/deliveries", get(get_deliveries))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("DELIVERY_CALENDAR_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server running on http://{}", addr);
    info!("   Calendar: http://{}/api/calendar?year=2025&month=3", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
