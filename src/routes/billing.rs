use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    billing::ClientSummary,
    models::BillingPeriod,
    state::{
        AppState, compute_summary, ensure_all_clients_current, ensure_next_period,
        generate_periods_for_range, list_periods_for_client, reactivate_period,
        register_full_payment, register_partial_payment, suspend_period,
    },
};

use super::{billing_error_response, datetime_to_string, error_response, parse_object_id};

#[derive(Serialize)]
pub struct PeriodResponse {
    pub id: String,
    pub client_id: String,
    pub period_year: i32,
    pub period_month: i32,
    pub due_date: String,
    pub amount_due: f64,
    pub amount_paid: f64,
    pub state: &'static str,
    pub paid_at: Option<String>,
}

impl PeriodResponse {
    fn from_period(period: &BillingPeriod) -> Option<Self> {
        period.id.map(|id| PeriodResponse {
            id: id.to_hex(),
            client_id: period.client_id.to_hex(),
            period_year: period.period_year,
            period_month: period.period_month,
            due_date: datetime_to_string(&period.due_date),
            amount_due: period.amount_due,
            amount_paid: period.amount_paid,
            state: period.state.as_str(),
            paid_at: period.paid_at.as_ref().map(datetime_to_string),
        })
    }
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub next_due: Option<PeriodResponse>,
    pub arrears: f64,
    pub amount_to_collect: f64,
}

impl SummaryResponse {
    fn from_summary(summary: &ClientSummary) -> Self {
        SummaryResponse {
            next_due: summary
                .next_due
                .as_ref()
                .and_then(PeriodResponse::from_period),
            arrears: summary.arrears,
            amount_to_collect: summary.amount_to_collect,
        }
    }
}

#[derive(Deserialize)]
pub struct GenerateFormData {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

#[derive(Deserialize)]
pub struct AbonoFormData {
    pub amount: f64,
}

fn parse_year_month(value: &str) -> Result<(i32, i32), String> {
    let trimmed = value.trim();
    let (year, month) = trimmed
        .split_once('-')
        .ok_or_else(|| format!("Periodo inválido '{trimmed}' (usa AAAA-MM)"))?;
    let year = year
        .parse::<i32>()
        .map_err(|_| format!("Periodo inválido '{trimmed}' (usa AAAA-MM)"))?;
    let month = month
        .parse::<i32>()
        .map_err(|_| format!("Periodo inválido '{trimmed}' (usa AAAA-MM)"))?;
    Ok((year, month))
}

fn period_row(period: &BillingPeriod) -> Response {
    match PeriodResponse::from_period(period) {
        Some(row) => Json(row).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn periods_index(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let client_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match list_periods_for_client(&state, &client_id).await {
        Ok(periods) => {
            let rows: Vec<PeriodResponse> = periods
                .iter()
                .filter_map(PeriodResponse::from_period)
                .collect();
            Json(rows).into_response()
        }
        Err(err) => billing_error_response(err),
    }
}

pub async fn billing_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let client_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match compute_summary(&state, &client_id).await {
        Ok(summary) => Json(SummaryResponse::from_summary(&summary)).into_response(),
        Err(err) => billing_error_response(err),
    }
}

pub async fn billing_ensure(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let client_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match ensure_next_period(&state, &client_id).await {
        Ok(Some((created, period))) => Json(json!({
            "created": created,
            "period": PeriodResponse::from_period(&period),
        }))
        .into_response(),
        Ok(None) => Json(json!({ "created": false, "period": null })).into_response(),
        Err(err) => billing_error_response(err),
    }
}

pub async fn billing_generate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(form): Json<GenerateFormData>,
) -> Response {
    let client_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let from = match parse_year_month(&form.from) {
        Ok(v) => v,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let to = match parse_year_month(&form.to) {
        Ok(v) => v,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match generate_periods_for_range(&state, &client_id, from, to, form.amount).await {
        Ok(created) => Json(json!({ "created_count": created })).into_response(),
        Err(err) => billing_error_response(err),
    }
}

pub async fn period_pay(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let period_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match register_full_payment(&state, &period_id).await {
        Ok(period) => period_row(&period),
        Err(err) => billing_error_response(err),
    }
}

pub async fn period_abono(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(form): Json<AbonoFormData>,
) -> Response {
    let period_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match register_partial_payment(&state, &period_id, form.amount).await {
        Ok(period) => period_row(&period),
        Err(err) => billing_error_response(err),
    }
}

pub async fn period_suspend(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let period_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match suspend_period(&state, &period_id).await {
        Ok(period) => period_row(&period),
        Err(err) => billing_error_response(err),
    }
}

pub async fn period_reactivate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let period_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match reactivate_period(&state, &period_id).await {
        Ok(period) => period_row(&period),
        Err(err) => billing_error_response(err),
    }
}

pub async fn billing_sweep(State(state): State<Arc<AppState>>) -> Response {
    match ensure_all_clients_current(&state).await {
        Ok(created) => Json(json!({ "created_count": created })).into_response(),
        Err(err) => billing_error_response(err),
    }
}
