//! # REST API
//!
//! Builds the axum router that exposes the loan module over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                      | Description                      |
//! |--------|---------------------------|----------------------------------|
//! | GET    | `/health`                 | Liveness probe                   |
//! | GET    | `/status`                 | Version, height, loan count      |
//! | GET    | `/accounts/:address`      | Account balance                  |
//! | GET    | `/loans`                  | All loans, `?state=` to filter   |
//! | GET    | `/loans/:id`              | One loan                         |
//! | POST   | `/loans`                  | Request a loan                   |
//! | POST   | `/loans/:id/:op`          | approve, cancel, repay, liquidate|
//!
//! Mutations go through one mutex around the keeper, so commands apply in
//! arrival order.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lendbook_contracts::{
    Loan, LoanError, LoanId, LoanKeeper, LoanMsg, LoanRequest, LoanResponse, LoanState,
    Operation, SledLoanStore,
};
use lendbook_protocol::storage::LedgerDb;
use lendbook_protocol::vault::{Address, Coins, Ledger, LedgerError};

use crate::metrics::SharedMetrics;

/// The keeper the node runs: sled ledger and sled loan store in one database.
pub type NodeKeeper = LoanKeeper<Arc<LedgerDb>, SledLoanStore>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Ledger database. Also owned by the keeper; kept here for height
    /// and balance reads that don't need the keeper lock.
    pub db: Arc<LedgerDb>,
    pub keeper: Arc<Mutex<NodeKeeper>>,
    pub metrics: SharedMetrics,
}

impl AppState {
    pub fn new(version: String, db: Arc<LedgerDb>, metrics: SharedMetrics) -> anyhow::Result<Self> {
        let store = SledLoanStore::new(&db)?;
        let keeper = LoanKeeper::new(Arc::clone(&db), store);
        Ok(Self {
            version,
            db,
            keeper: Arc::new(Mutex::new(keeper)),
            metrics,
        })
    }

    /// Runs one keeper command under the lock and records its metrics.
    async fn command<T>(
        &self,
        op: &str,
        f: impl FnOnce(&NodeKeeper) -> Result<T, LoanError>,
    ) -> Result<T, LoanError> {
        let keeper = self.keeper.lock().await;
        let started = Instant::now();
        let result = f(&*keeper);
        self.metrics.observe_command(op, &result, started.elapsed());
        result
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/loans", get(list_loans_handler).post(request_loan_handler))
        .route("/loans/:id", get(loan_handler))
        .route("/loans/:id/:op", post(transition_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /loans`. Coin values arrive as text and are parsed here so
/// a bad value is a 400 with a useful message.
#[derive(Debug, Deserialize)]
pub struct RequestLoanBody {
    pub borrower: String,
    pub amount: String,
    #[serde(default)]
    pub fee: String,
    pub collateral: String,
    pub deadline: u64,
}

impl RequestLoanBody {
    fn into_request(self) -> Result<LoanRequest, ApiError> {
        Ok(LoanRequest {
            borrower: parse_address("borrower", &self.borrower)?,
            amount: parse_coins("amount", &self.amount)?,
            fee: parse_coins("fee", &self.fee)?,
            collateral: parse_coins("collateral", &self.collateral)?,
            deadline: self.deadline,
        })
    }
}

/// Body of `POST /loans/:id/:op`.
#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct LoansQuery {
    pub state: Option<String>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub block_height: u64,
    pub loan_count: usize,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: String,
    /// Canonical coin text; empty for an account that holds nothing.
    pub balance: String,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            message,
        }
    }

    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message,
        }
    }

    fn ledger(e: LedgerError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "ledger",
            message: e.to_string(),
        }
    }
}

/// 425 Too Early: the deadline has not been reached yet.
fn too_early() -> StatusCode {
    StatusCode::from_u16(425).unwrap_or(StatusCode::CONFLICT)
}

impl From<LoanError> for ApiError {
    fn from(e: LoanError) -> Self {
        let status = match &e {
            LoanError::NotFound(_) => StatusCode::NOT_FOUND,
            LoanError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            LoanError::InvalidState { .. } => StatusCode::CONFLICT,
            LoanError::DeadlineNotReached { .. } => too_early(),
            LoanError::TransferFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LoanError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            LoanError::MalformedAmount { .. }
            | LoanError::CorruptRecord { .. }
            | LoanError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            kind: self.kind.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address, ApiError> {
    Address::new(raw).map_err(|e| ApiError::bad_request(format!("{field}: {e}")))
}

fn parse_coins(field: &str, raw: &str) -> Result<Coins, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::bad_request(format!("{field}: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let loan_count = state.keeper.lock().await.store().len();
    Json(StatusResponse {
        version: state.version.clone(),
        block_height: state.db.current_height(),
        loan_count,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /accounts/:address`. Unknown accounts report an empty balance.
/// The escrow is readable here but can never appear in a command body.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountResponse>, ApiError> {
    let escrow = Address::escrow();
    let address = if address == escrow.to_string() {
        escrow
    } else {
        parse_address("address", &address)?
    };
    let balance = state.db.balance(&address).map_err(ApiError::ledger)?;
    Ok(Json(AccountResponse {
        address: address.to_string(),
        balance: balance.to_string(),
    }))
}

/// `GET /loans[?state=approved]`
async fn list_loans_handler(
    Query(query): Query<LoansQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Loan>>, ApiError> {
    let filter = query
        .state
        .as_deref()
        .map(str::parse::<LoanState>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let loans = state.keeper.lock().await.loans(filter)?;
    Ok(Json(loans))
}

/// `GET /loans/:id`
async fn loan_handler(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<Loan>, ApiError> {
    let loan = state.keeper.lock().await.loan(LoanId(id))?;
    Ok(Json(loan))
}

/// `POST /loans`
async fn request_loan_handler(
    State(state): State<AppState>,
    Json(body): Json<RequestLoanBody>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let request = body.into_request()?;
    let response = state
        .command("request", |keeper| keeper.request_loan(request))
        .await?;
    state.metrics.loans_requested_total.inc();
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /loans/:id/:op` where `op` is approve, cancel, repay or liquidate.
async fn transition_handler(
    Path((id, op)): Path<(u64, String)>,
    State(state): State<AppState>,
    Json(body): Json<ActorBody>,
) -> Result<Json<LoanResponse>, ApiError> {
    let op = op
        .parse::<Operation>()
        .map_err(|e| ApiError::not_found(e.to_string()))?;
    let msg = LoanMsg::new(op, LoanId(id), parse_address("actor", &body.actor)?);
    let response = state
        .command(op.as_str(), |keeper| keeper.execute(&msg))
        .await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
