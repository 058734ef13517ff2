//! Booking endpoints for the calling patient.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use booking::{BookingDetails, CreateBookingRequest};
use common::BookingId;
use ledger::{Booking, BookingLedger};
use reservation::CompensationJournal;
use slot_store::SlotStore;

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;

/// POST /bookings: reserve one unit of a slot for the caller.
#[tracing::instrument(skip(state, caller, req), fields(slot_id = %req.slot_id))]
pub async fn create<S, L, J>(
    State(state): State<Arc<AppState<S, L, J>>>,
    caller: Caller,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingDetails>), ApiError>
where
    S: SlotStore + 'static,
    L: BookingLedger + 'static,
    J: CompensationJournal + 'static,
{
    let details = state.bookings.create_booking(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /bookings/my: the caller's bookings, most recent first.
#[tracing::instrument(skip(state, caller))]
pub async fn list_mine<S, L, J>(
    State(state): State<Arc<AppState<S, L, J>>>,
    caller: Caller,
) -> Result<Json<Vec<BookingDetails>>, ApiError>
where
    S: SlotStore + 'static,
    L: BookingLedger + 'static,
    J: CompensationJournal + 'static,
{
    let bookings = state.bookings.list_bookings(&caller).await?;
    Ok(Json(bookings))
}

/// PATCH /bookings/{id}/cancel: cancel one of the caller's bookings.
#[tracing::instrument(skip(state, caller))]
pub async fn cancel<S, L, J>(
    State(state): State<Arc<AppState<S, L, J>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError>
where
    S: SlotStore + 'static,
    L: BookingLedger + 'static,
    J: CompensationJournal + 'static,
{
    let booking_id = parse_booking_id(&id)?;
    let booking = state.bookings.cancel_booking(&caller, booking_id).await?;
    Ok(Json(booking))
}

fn parse_booking_id(id: &str) -> Result<BookingId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid booking id: {e}")))
}
