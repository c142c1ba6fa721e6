//! Route handlers. Each one is a thin translation onto a [`Gateway`] call.
//!
//! [`Gateway`]: crate::gateway::Gateway

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{ApiError, ApiState};
use crate::error::Error;
use crate::gateway::split_numbers;

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug, Deserialize)]
pub(super) struct SendSmsBody {
    phone_number: String,
    message: String,
}

/// Either a single (possibly comma-separated) string or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum PhoneNumbers {
    One(String),
    Many(Vec<String>),
}

impl PhoneNumbers {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(raw) => split_numbers(&raw),
            Self::Many(list) => list,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct AddToBlacklistBody {
    phone_numbers: PhoneNumbers,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|rejection| ApiError(Error::validation("body", rejection.body_text())))
}

pub(super) async fn health() -> Json<Value> {
    Json(json!({ "system": "up" }))
}

pub(super) async fn send_sms(
    State(state): State<ApiState>,
    payload: Result<Json<SendSmsBody>, JsonRejection>,
) -> ApiResult {
    let req = body(payload)?;
    let receipt = state.gateway.submit(&req.phone_number, &req.message).await?;
    let message = if receipt.enqueued {
        "message accepted for delivery"
    } else {
        "message stored, dispatch pending"
    };
    Ok(Json(json!({
        "request_id": receipt.request_id,
        "enqueued": receipt.enqueued,
        "message": message,
    })))
}

pub(super) async fn get_sms(
    State(state): State<ApiState>,
    Path(request_id): Path<String>,
) -> ApiResult {
    let record = state.gateway.get_status(&request_id).await?;
    Ok(Json(json!({
        "request_id": request_id,
        "message_details": record,
    })))
}

pub(super) async fn list_blacklist(State(state): State<ApiState>) -> ApiResult {
    let numbers = state.gateway.list_blacklist().await?;
    Ok(Json(json!({ "blacklisted_numbers": numbers })))
}

pub(super) async fn add_to_blacklist(
    State(state): State<ApiState>,
    payload: Result<Json<AddToBlacklistBody>, JsonRejection>,
) -> ApiResult {
    let numbers = body(payload)?.phone_numbers.into_vec();
    let added = state.gateway.add_to_blacklist(&numbers).await?;
    info!(requested = numbers.len(), added, "blacklist add via api");
    Ok(Json(json!({
        "added": added,
        "message": format!("{added} new number(s) blacklisted"),
    })))
}

pub(super) async fn remove_from_blacklist(
    State(state): State<ApiState>,
    Path(number): Path<String>,
) -> ApiResult {
    let removed = state.gateway.remove_from_blacklist(&number).await?;
    let message = if removed {
        "number successfully removed"
    } else {
        "number not present in blacklist"
    };
    Ok(Json(json!({ "removed": removed, "message": message })))
}
