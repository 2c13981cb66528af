// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP/JSON binding of the ledger.
//!
//! ## Endpoints
//!
//! - `POST /tables` - Create a table
//! - `GET /tables` - Tables with occupied and remaining seats
//! - `POST /guest_list/{name}` - Register a guest
//! - `GET /guest_list` - The guest list
//! - `PUT /guests/{name}` - More of a guest's party arrives
//! - `DELETE /guests/{name}` - A guest and their party leave
//! - `GET /guests` - Guests at the venue
//! - `GET /seats_empty` - Empty seats across all tables
//! - `GET /health` - Liveness
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST http://localhost:3000/tables \
//!   -H "Content-Type: application/json" \
//!   -d '{"capacity": 10, "allowed_extras": 2}'
//!
//! curl -X POST http://localhost:3000/guest_list/alice \
//!   -H "Content-Type: application/json" \
//!   -d '{"table": 1, "accompanying_guests": 5}'
//!
//! curl http://localhost:3000/seats_empty
//! ```

use crate::base::TableId;
use crate::error::{ErrorKind, LedgerError, RETRY_LATER};
use crate::guest::Guest;
use crate::ledger::Ledger;
use crate::store::SeatingStore;
use crate::table::{Table, TableOccupancy};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{Span, error};

/// Request body for `POST /tables`. `allowed_extras` defaults to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub capacity: i64,
    #[serde(default)]
    pub allowed_extras: i64,
}

/// Request body for `POST /guest_list/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterGuestRequest {
    pub table: TableId,
    pub accompanying_guests: i64,
}

/// Request body for `PUT /guests/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestArrivesRequest {
    pub accompanying_guests: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestNameResponse {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GuestListResponse {
    pub guests: Vec<Guest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivedGuest {
    pub name: String,
    pub accompanying_guests: u32,
    pub time_arrived: String,
}

impl From<Guest> for ArrivedGuest {
    fn from(guest: Guest) -> Self {
        Self {
            name: guest.name,
            accompanying_guests: guest.accompanying_guests,
            time_arrived: guest
                .created_at
                .format("%a, %d %b %Y %H:%M:%S UTC")
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivedGuestsResponse {
    pub guests: Vec<ArrivedGuest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<TableOccupancy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatsEmptyResponse {
    pub seats_empty: i64,
}

/// Response body for errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Failure of a single request.
#[derive(Debug)]
pub enum AppError {
    /// The ledger refused or failed the operation.
    Ledger(LedgerError),
    /// The body was not JSON of the expected shape.
    InvalidRequest(String),
    /// The task running the operation panicked or was cancelled.
    Task(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Ledger(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        let err = match self {
            AppError::InvalidRequest(_) => return (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            AppError::Task(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            AppError::Ledger(err) => err,
        };

        let code = match err {
            LedgerError::InvalidCapacity => "INVALID_CAPACITY",
            LedgerError::InvalidAllowedExtras => "INVALID_ALLOWED_EXTRAS",
            LedgerError::EmptyName => "EMPTY_NAME",
            LedgerError::InvalidPartySize => "INVALID_PARTY_SIZE",
            LedgerError::InvalidAdditionalGuests => "INVALID_ADDITIONAL_GUESTS",
            LedgerError::DuplicateGuest(_) => "DUPLICATE_GUEST",
            LedgerError::TableNotFound(_) => "TABLE_NOT_FOUND",
            LedgerError::GuestNotFound(_) => "GUEST_NOT_FOUND",
            LedgerError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            LedgerError::Inconsistent(_) | LedgerError::Storage(_) => "INTERNAL",
        };
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::CapacityExceeded => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, code)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::InvalidRequest(detail) => detail.clone(),
            AppError::Task(detail) => {
                error!(error = %detail, "request task failed");
                RETRY_LATER.to_string()
            }
            AppError::Ledger(err) => {
                if err.kind() == ErrorKind::Internal {
                    error!(error = %err, "request failed");
                }
                err.public_message()
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

type LedgerState<S> = State<Arc<Ledger<S>>>;

/// Runs a ledger operation on the blocking pool.
///
/// Ledger calls wait on table locks and, with a database store, on queries,
/// so they stay off the async workers.
async fn with_ledger<S, T, F>(ledger: Arc<Ledger<S>>, op: F) -> Result<T, AppError>
where
    S: SeatingStore + 'static,
    T: Send + 'static,
    F: FnOnce(&Ledger<S>) -> Result<T, LedgerError> + Send + 'static,
{
    let span = Span::current();
    let result = tokio::task::spawn_blocking(move || span.in_scope(|| op(&ledger)))
        .await
        .map_err(|err| AppError::Task(err.to_string()))?;
    Ok(result?)
}

/// POST /tables - Create a table.
async fn create_table<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
    body: Result<Json<CreateTableRequest>, JsonRejection>,
) -> Result<Json<Table>, AppError> {
    let Json(request) = body?;
    let table = with_ledger(ledger, move |ledger| {
        ledger.create_table(request.capacity, request.allowed_extras)
    })
    .await?;
    Ok(Json(table))
}

/// GET /tables - Occupancy per table.
async fn list_tables<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
) -> Result<Json<TablesResponse>, AppError> {
    let tables = with_ledger(ledger, |ledger| ledger.table_occupancy()).await?;
    Ok(Json(TablesResponse { tables }))
}

/// POST /guest_list/{name} - Register a guest.
async fn register_guest<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
    Path(name): Path<String>,
    body: Result<Json<RegisterGuestRequest>, JsonRejection>,
) -> Result<Json<GuestNameResponse>, AppError> {
    let Json(request) = body?;
    let guest = with_ledger(ledger, move |ledger| {
        ledger.register_guest(&name, request.table, request.accompanying_guests)
    })
    .await?;
    Ok(Json(GuestNameResponse { name: guest.name }))
}

/// GET /guest_list - The guest list.
async fn list_guests<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
) -> Result<Json<GuestListResponse>, AppError> {
    let guests = with_ledger(ledger, |ledger| ledger.list_guests()).await?;
    Ok(Json(GuestListResponse { guests }))
}

/// PUT /guests/{name} - Part of a guest's party arrives.
async fn guest_arrives<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
    Path(name): Path<String>,
    body: Result<Json<GuestArrivesRequest>, JsonRejection>,
) -> Result<Json<GuestNameResponse>, AppError> {
    let Json(request) = body?;
    let guest = with_ledger(ledger, move |ledger| {
        ledger.guest_arrives(&name, request.accompanying_guests)
    })
    .await?;
    Ok(Json(GuestNameResponse { name: guest.name }))
}

/// DELETE /guests/{name} - A guest leaves.
async fn guest_leaves<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    with_ledger(ledger, move |ledger| ledger.guest_leaves(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /guests - Guests at the venue.
async fn list_arrived_guests<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
) -> Result<Json<ArrivedGuestsResponse>, AppError> {
    let guests = with_ledger(ledger, |ledger| ledger.list_arrived_guests())
        .await?
        .into_iter()
        .map(ArrivedGuest::from)
        .collect();
    Ok(Json(ArrivedGuestsResponse { guests }))
}

/// GET /seats_empty - Empty seats venue-wide.
async fn seats_empty<S: SeatingStore + 'static>(
    State(ledger): LedgerState<S>,
) -> Result<Json<SeatsEmptyResponse>, AppError> {
    let seats_empty = with_ledger(ledger, |ledger| ledger.available_seats()).await?;
    Ok(Json(SeatsEmptyResponse { seats_empty }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Builds the router over a shared ledger.
pub fn router<S>(ledger: Arc<Ledger<S>>) -> Router
where
    S: SeatingStore + 'static,
{
    Router::new()
        .route("/tables", post(create_table::<S>).get(list_tables::<S>))
        .route("/guest_list", get(list_guests::<S>))
        .route("/guest_list/{name}", post(register_guest::<S>))
        .route("/guests", get(list_arrived_guests::<S>))
        .route(
            "/guests/{name}",
            put(guest_arrives::<S>).delete(guest_leaves::<S>),
        )
        .route("/seats_empty", get(seats_empty::<S>))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}
