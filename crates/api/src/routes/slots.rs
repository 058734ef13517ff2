//! Slot lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Duration, Utc};
use common::{ServiceId, SlotId};
use ledger::BookingLedger;
use reservation::CompensationJournal;
use serde::Deserialize;
use slot_store::{Slot, SlotStore};

use crate::error::ApiError;
use crate::state::AppState;

/// Window searched when the query leaves `to` open.
const DEFAULT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
pub struct SlotRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// GET /slots/{id}: current capacity of one slot.
#[tracing::instrument(skip(state))]
pub async fn get<S, L, J>(
    State(state): State<Arc<AppState<S, L, J>>>,
    Path(id): Path<String>,
) -> Result<Json<Slot>, ApiError>
where
    S: SlotStore + 'static,
    L: BookingLedger + 'static,
    J: CompensationJournal + 'static,
{
    let slot_id: SlotId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid slot id: {e}")))?;
    let slot = state.bookings.get_slot(slot_id).await?;
    Ok(Json(slot))
}

/// GET /services/{id}/slots?from&to: slots of a service with capacity left.
///
/// `from` defaults to now and `to` to a week after `from`.
#[tracing::instrument(skip(state))]
pub async fn available<S, L, J>(
    State(state): State<Arc<AppState<S, L, J>>>,
    Path(id): Path<String>,
    Query(range): Query<SlotRangeQuery>,
) -> Result<Json<Vec<Slot>>, ApiError>
where
    S: SlotStore + 'static,
    L: BookingLedger + 'static,
    J: CompensationJournal + 'static,
{
    let service_id: ServiceId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid service id: {e}")))?;
    let from = range.from.unwrap_or_else(Utc::now);
    let to = range
        .to
        .unwrap_or(from + Duration::days(DEFAULT_WINDOW_DAYS));

    let slots = state.bookings.available_slots(service_id, from, to).await?;
    Ok(Json(slots))
}
