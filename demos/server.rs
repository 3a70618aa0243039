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

//! REST API server for session carts and checkout.
//!
//! Run with: `cargo run --example server`
//!
//! The session is taken from the `x-session-id` header and the logged-in
//! user from `x-user-id`.
//!
//! # Example requests
//!
//! ```bash
//! # Add two tickets to the cart
//! curl -X POST http://localhost:3000/cart \
//!   -H "x-session-id: 1" -H "Content-Type: application/json" \
//!   -d '{"event_id": 1, "ticket_type_id": 7, "quantity": 2}'
//!
//! # Show the cart
//! curl http://localhost:3000/cart -H "x-session-id: 1"
//!
//! # Check out
//! curl -X POST http://localhost:3000/checkout \
//!   -H "x-session-id: 1" -H "x-user-id: 10" -H "Content-Type: application/json" \
//!   -d '{"payment_method": "card", "first_name": "Ada", "last_name": "Lovelace",
//!        "email": "ada@example.com", "phone": "555-0100"}'
//!
//! # Remaining tickets
//! curl http://localhost:3000/ticket-types/7
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ticket_checkout::{
    CartError, CartLine, CheckoutConfig, CheckoutEngine, CheckoutResponse, EventId, MemoryStore,
    PaymentInfo, SessionCarts, SessionId, TicketType, TicketTypeId, TicketTypeInfo, UserId,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SESSION_HEADER: &str = "x-session-id";
const USER_HEADER: &str = "x-user-id";

// === Request/Response DTOs ===

/// Request body for adding tickets to the cart.
///
/// ```json
/// {"event_id": 1, "ticket_type_id": 7, "quantity": 2}
/// ```
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub event_id: EventId,
    pub ticket_type_id: TicketTypeId,
    pub quantity: u32,
}

/// Request body for removing a cart line.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartRequest {
    pub ticket_type_id: TicketTypeId,
}

/// Envelope for successful reads.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Response body for errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

// === Application State ===

/// Shared application state containing the checkout engine and the carts.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CheckoutEngine>,
    pub carts: Arc<SessionCarts>,
}

// === Error Handling ===

/// Errors a handler can answer with.
pub enum AppError {
    MissingHeader(&'static str),
    Cart(CartError),
    TicketTypeNotFound,
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        AppError::Cart(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::MissingHeader(USER_HEADER) => {
                (StatusCode::UNAUTHORIZED, "login required".to_string())
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, format!("missing or invalid {header} header"))
            }
            AppError::TicketTypeNotFound => {
                (StatusCode::NOT_FOUND, "ticket type not found".to_string())
            }
            AppError::Cart(err) => {
                let status = match err {
                    CartError::InvalidQuantity | CartError::AmountOverflow => {
                        StatusCode::BAD_REQUEST
                    }
                    CartError::ExceedsAvailable { .. } => StatusCode::CONFLICT,
                    CartError::TicketTypeNotFound | CartError::LineNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    CartError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

fn header_id<T: std::str::FromStr>(headers: &HeaderMap, name: &'static str) -> Result<T, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or(AppError::MissingHeader(name))
}

// === Handlers ===

/// GET /cart - Lines in the session's cart.
async fn get_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DataResponse<Vec<CartLine>>>, AppError> {
    let session = SessionId(header_id(&headers, SESSION_HEADER)?);
    let lines = state.carts.snapshot(&session).to_vec();
    Ok(Json(DataResponse::new(lines)))
}

/// POST /cart - Add tickets, merging with an existing line.
async fn add_to_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AddToCartRequest>,
) -> Result<Json<DataResponse<Vec<CartLine>>>, AppError> {
    let session = SessionId(header_id(&headers, SESSION_HEADER)?);
    let lines = state.carts.with_cart(session, |cart| {
        state
            .engine
            .add_to_cart(cart, request.event_id, request.ticket_type_id, request.quantity)
            .map(|()| cart.lines().to_vec())
    })?;
    Ok(Json(DataResponse::new(lines)))
}

/// DELETE /cart - Remove one line.
async fn remove_from_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RemoveFromCartRequest>,
) -> Result<Json<DataResponse<Vec<CartLine>>>, AppError> {
    let session = SessionId(header_id(&headers, SESSION_HEADER)?);
    let lines = state.carts.with_cart(session, |cart| {
        cart.remove(request.ticket_type_id);
        cart.lines().to_vec()
    });
    Ok(Json(DataResponse::new(lines)))
}

/// POST /checkout - Book the session's cart.
async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payment): Json<PaymentInfo>,
) -> Result<Response, AppError> {
    let user = UserId(header_id(&headers, USER_HEADER)?);
    let session = SessionId(header_id(&headers, SESSION_HEADER)?);

    // The session's cart stays locked for the whole checkout, so a second
    // checkout from the same session cannot book the same lines twice.
    // Other sessions are not held up.
    let result = state
        .carts
        .with_cart(session, |cart| state.engine.checkout_cart(user, cart, &payment));

    let (status, body) = CheckoutResponse::from_result(&result);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(body)).into_response())
}

/// GET /ticket-types/{id} - Ticket type with its remaining quantity.
async fn get_ticket_type(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<DataResponse<TicketTypeInfo>>, AppError> {
    state
        .engine
        .store()
        .ledger()
        .ticket_type(&TicketTypeId(id))
        .map(|info| Json(DataResponse::new(info)))
        .ok_or(AppError::TicketTypeNotFound)
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/cart", get(get_cart).post(add_to_cart).delete(remove_from_cart))
        .route("/checkout", post(checkout))
        .route("/ticket-types/{id}", get(get_ticket_type))
        .with_state(state)
}

// === Main ===

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CheckoutConfig::from_env()?;
    let store = MemoryStore::with_ticket_types([
        TicketType::new(TicketTypeId(7), EventId(1), "General admission", dec!(45.00), 200)?,
        TicketType::new(TicketTypeId(8), EventId(1), "VIP", dec!(120.00), 20)?,
        TicketType::new(TicketTypeId(9), EventId(2), "Balcony", dec!(30.00), 80)?,
    ]);

    let state = AppState {
        engine: Arc::new(CheckoutEngine::with_store(store, config)),
        carts: Arc::new(SessionCarts::new()),
    };

    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    info!(
        addr = %listener.local_addr()?,
        service_fee = %config.service_fee(),
        "ticket checkout server listening"
    );
    println!("Endpoints:");
    println!("  GET    /cart               - Show the session's cart");
    println!("  POST   /cart               - Add tickets");
    println!("  DELETE /cart               - Remove a line");
    println!("  POST   /checkout           - Book the cart");
    println!("  GET    /ticket-types/:id   - Remaining tickets");

    axum::serve(listener, app).await?;
    Ok(())
}
