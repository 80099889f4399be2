//! Calendar API routes: availability scans, conflict reports, client
//! dossiers, and booking writes.
//!
//! Endpoints (mounted under `/api/v1`):
//! - `GET  /availability/compact`       — per-groomer open-slot digest
//! - `GET  /availability/{groomer_id}`  — day-by-day scan, `?extended=true` adds 2:30
//! - `GET  /conflicts`                  — double-bookings across all groomers
//! - `GET  /clients/{id}/dossier`       — cached client summary
//! - `POST /bookings`                   — record an appointment

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use barkline_core::domain::{ClientId, GroomerId, PetId, ServiceKind};
use barkline_core::errors::DomainError;
use barkline_db::repositories::NewBooking;

use crate::context::Dossier;
use crate::pipeline::{AvailabilityReport, GroomerConflicts, Pipeline};
use crate::review::{api_error, ApiError};

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default)]
    pub extended: bool,
}

#[derive(Debug, Serialize)]
pub struct CompactAvailability {
    pub availability: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub groomer_id: i64,
    pub pet_id: i64,
    pub date: NaiveDate,
    pub start_min: u16,
    pub end_min: Option<u16>,
    #[serde(default)]
    pub service: String,
    pub client_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: i64,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/availability/compact", get(compact_availability))
        .route("/availability/{groomer_id}", get(groomer_availability))
        .route("/conflicts", get(conflict_report))
        .route("/clients/{id}/dossier", get(client_dossier))
        .route("/bookings", post(create_booking))
        .with_state(pipeline)
}

async fn groomer_availability(
    Path(groomer_id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<AvailabilityReport>, (StatusCode, Json<ApiError>)> {
    pipeline
        .groomer_availability(GroomerId(groomer_id), query.extended)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn compact_availability(
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<CompactAvailability>, (StatusCode, Json<ApiError>)> {
    pipeline
        .compact_availability()
        .await
        .map(|availability| Json(CompactAvailability { availability }))
        .map_err(api_error)
}

async fn conflict_report(
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<Vec<GroomerConflicts>>, (StatusCode, Json<ApiError>)> {
    pipeline.conflict_report().await.map(Json).map_err(api_error)
}

async fn client_dossier(
    Path(id): Path<i64>,
    State(pipeline): State<Arc<Pipeline>>,
) -> Result<Json<Dossier>, (StatusCode, Json<ApiError>)> {
    match pipeline.client_dossier(ClientId(id)).await.map_err(api_error)? {
        Some(dossier) => Ok(Json(dossier)),
        None => Err(api_error(DomainError::UnknownClient(id).into())),
    }
}

async fn create_booking(
    State(pipeline): State<Arc<Pipeline>>,
    Json(body): Json<BookingRequest>,
) -> Result<Json<BookingResponse>, (StatusCode, Json<ApiError>)> {
    let booking = NewBooking {
        groomer_id: GroomerId(body.groomer_id),
        pet_id: PetId(body.pet_id),
        date: body.date,
        start_min: body.start_min,
        end_min: body.end_min,
        service: ServiceKind::from_label(&body.service),
    };
    pipeline
        .record_booking(&booking, body.client_id.map(ClientId))
        .await
        .map(|booking_id| Json(BookingResponse { booking_id }))
        .map_err(api_error)
}
