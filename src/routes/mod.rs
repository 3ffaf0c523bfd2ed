// routes module: JSON handlers for the client and billing surfaces.

mod billing;
mod clients;

pub use billing::*;
pub use clients::*;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mongodb::bson::{DateTime, oid::ObjectId};
use serde_json::json;
use std::str::FromStr;

use crate::billing::BillingError;

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub(crate) fn parse_object_id(value: &str) -> Result<ObjectId, Response> {
    ObjectId::from_str(value)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Identificador inválido"))
}

pub(crate) fn billing_error_response(err: BillingError) -> Response {
    let status = match &err {
        BillingError::Validation(_) => StatusCode::BAD_REQUEST,
        BillingError::NotFound(_) => StatusCode::NOT_FOUND,
        BillingError::FuturePeriod { .. } | BillingError::State(_) => StatusCode::CONFLICT,
        BillingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if matches!(err, BillingError::Storage(_)) {
        return error_response(status, "internal error");
    }
    error_response(status, &err.to_string())
}

pub(crate) fn datetime_to_string(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| dt.to_string())
}

pub(crate) fn clean_opt(input: Option<String>) -> Option<String> {
    input.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub(crate) fn parse_optional_datetime_field(
    value: Option<String>,
    label: &str,
) -> Result<Option<DateTime>, String> {
    match clean_opt(value) {
        Some(v) => DateTime::parse_rfc3339_str(v.trim())
            .map(Some)
            .map_err(|_| format!("Formato de fecha/hora inválido para {} (usa RFC3339)", label)),
        None => Ok(None),
    }
}
