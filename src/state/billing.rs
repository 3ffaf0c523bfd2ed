// state/billing.rs
// Storage-backed billing operations. Calendar rules live in crate::billing;
// this module persists periods and relies on the unique
// (client_id, period_year, period_month) index to serialize creators.

use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use mongodb::error::{ErrorKind, WriteFailure};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::billing::{
    BillingAnchor, BillingError, ClientSummary, compute_next_due, date_in_month, is_future_period,
    month_add, resolve_state, summarize,
};
use crate::models::{BillingPeriod, Client, PeriodState};

use super::AppState;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn now_bson() -> DateTime {
    DateTime::from_system_time(SystemTime::now())
}

fn bson_date(date: NaiveDate) -> DateTime {
    DateTime::from_chrono(date.and_time(NaiveTime::MIN).and_utc())
}

async fn require_client(state: &AppState, id: &ObjectId) -> Result<Client, BillingError> {
    state
        .clients
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(BillingError::NotFound("client"))
}

async fn require_period(state: &AppState, id: &ObjectId) -> Result<BillingPeriod, BillingError> {
    state
        .periods
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(BillingError::NotFound("billing period"))
}

async fn find_period_by_key(
    state: &AppState,
    client_id: &ObjectId,
    year: i32,
    month: i32,
) -> Result<Option<BillingPeriod>, BillingError> {
    state
        .periods
        .find_one(doc! { "client_id": client_id, "period_year": year, "period_month": month })
        .await
        .map_err(Into::into)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write)) if write.code == 11000
    )
}

/// Inserts a period, treating a duplicate-key failure from the unique index
/// as "someone else created it first" rather than an error.
async fn insert_period(
    state: &AppState,
    mut period: BillingPeriod,
) -> Result<Option<BillingPeriod>, BillingError> {
    match state.periods.insert_one(&period).await {
        Ok(res) => {
            period.id = res.inserted_id.as_object_id();
            Ok(Some(period))
        }
        Err(err) if is_duplicate_key(&err) => {
            debug!(
                client_id = %period.client_id,
                year = period.period_year,
                month = period.period_month,
                "period already exists, skipping"
            );
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Periods for a client, ordered by period key, with the overdue state
/// re-derived from each due date before returning.
pub async fn list_periods_for_client(
    state: &AppState,
    client_id: &ObjectId,
) -> Result<Vec<BillingPeriod>, BillingError> {
    require_client(state, client_id).await?;

    let reference = today();
    let mut cursor = state
        .periods
        .find(doc! { "client_id": client_id })
        .sort(doc! { "period_year": 1, "period_month": 1 })
        .await?;
    let mut items = Vec::new();
    while let Some(mut period) = cursor.try_next().await? {
        period.state = resolve_state(&period, reference);
        items.push(period);
    }
    Ok(items)
}

/// Lazily creates the soonest missing period for a client. Returns `None`
/// when the client has no billing anchor configured, otherwise
/// `(created, period)`. Safe to call repeatedly and concurrently.
pub async fn ensure_next_period(
    state: &AppState,
    client_id: &ObjectId,
) -> Result<Option<(bool, BillingPeriod)>, BillingError> {
    let client = require_client(state, client_id).await?;
    let anchor = BillingAnchor::from_client(&client);
    let Some(next) = compute_next_due(&anchor, today()) else {
        return Ok(None);
    };

    let year = next.due_date.year();
    let month = next.due_date.month() as i32;
    if let Some(existing) = find_period_by_key(state, client_id, year, month).await? {
        return Ok(Some((false, existing)));
    }

    let period = BillingPeriod {
        id: None,
        client_id: client_id.clone(),
        period_year: year,
        period_month: month,
        due_date: bson_date(next.due_date),
        amount_due: anchor.monthly_amount,
        amount_paid: 0.0,
        state: PeriodState::Pendiente,
        paid_at: None,
        created_at: Some(now_bson()),
        updated_at: None,
        notes: None,
    };

    match insert_period(state, period).await? {
        Some(created) => Ok(Some((true, created))),
        None => {
            // Lost the race; the winner's row is the period we wanted.
            let existing = find_period_by_key(state, client_id, year, month)
                .await?
                .ok_or(BillingError::NotFound("billing period"))?;
            Ok(Some((false, existing)))
        }
    }
}

/// Cron-style sweep: ensures the next period exists for every active
/// service client. Returns how many periods were created.
pub async fn ensure_all_clients_current(state: &AppState) -> Result<u64, BillingError> {
    let mut cursor = state
        .clients
        .find(doc! { "client_type": "servicio", "is_active": true })
        .await?;

    let mut created = 0u64;
    while let Some(client) = cursor.try_next().await? {
        let Some(id) = client.id.as_ref() else {
            continue;
        };
        if let Some((true, _)) = ensure_next_period(state, id).await? {
            created += 1;
        }
    }
    info!(created, "billing sweep finished");
    Ok(created)
}

/// Creates one period per calendar month in the inclusive range, skipping
/// months that already have one. Returns the number created.
pub async fn generate_periods_for_range(
    state: &AppState,
    client_id: &ObjectId,
    from: (i32, i32),
    to: (i32, i32),
    amount_override: Option<f64>,
) -> Result<u64, BillingError> {
    for (_, month) in [from, to] {
        if !(1..=12).contains(&month) {
            return Err(BillingError::Validation(format!(
                "month {month} must be within 1..=12"
            )));
        }
    }
    if from.0 * 100 + from.1 > to.0 * 100 + to.1 {
        return Err(BillingError::Validation(
            "range start is after range end".to_string(),
        ));
    }
    if let Some(amount) = amount_override {
        if amount < 0.0 {
            return Err(BillingError::Validation(
                "amount override must not be negative".to_string(),
            ));
        }
    }

    let client = require_client(state, client_id).await?;
    let anchor = BillingAnchor::from_client(&client);
    let due_day = match anchor.due_day_of_month {
        Some(day) => day.clamp(1, 28) as u32,
        None => anchor
            .first_due_date
            .map(|first| first.day().min(28))
            .unwrap_or(1),
    };
    let amount_due = amount_override.unwrap_or(anchor.monthly_amount);

    let mut created = 0u64;
    let (mut year, mut month) = from;
    while year * 100 + month <= to.0 * 100 + to.1 {
        let period = BillingPeriod {
            id: None,
            client_id: client_id.clone(),
            period_year: year,
            period_month: month,
            due_date: bson_date(date_in_month(year, month as u32, due_day)),
            amount_due,
            amount_paid: 0.0,
            state: PeriodState::Pendiente,
            paid_at: None,
            created_at: Some(now_bson()),
            updated_at: None,
            notes: None,
        };
        if find_period_by_key(state, client_id, year, month).await?.is_none()
            && insert_period(state, period).await?.is_some()
        {
            created += 1;
        }
        let (next_year, next_month) = month_add(year, month as u32, 1);
        year = next_year;
        month = next_month as i32;
    }
    Ok(created)
}

fn reject_future(period: &BillingPeriod, reference: NaiveDate) -> Result<(), BillingError> {
    if is_future_period(period.period_year, period.period_month, reference) {
        return Err(BillingError::FuturePeriod {
            year: period.period_year,
            month: period.period_month,
        });
    }
    Ok(())
}

/// Settles a period in full. Calling again on a paid period is a no-op
/// success; a period cannot be un-paid.
pub async fn register_full_payment(
    state: &AppState,
    period_id: &ObjectId,
) -> Result<BillingPeriod, BillingError> {
    let period = require_period(state, period_id).await?;
    if period.state == PeriodState::Pagado {
        return Ok(period);
    }
    reject_future(&period, today())?;

    let now = now_bson();
    // Pipeline update so amount_paid snaps to amount_due atomically.
    state
        .periods
        .update_one(
            doc! { "_id": period_id },
            vec![doc! { "$set": {
                "amount_paid": "$amount_due",
                "state": PeriodState::Pagado.as_str(),
                "paid_at": now,
                "updated_at": now,
            } }],
        )
        .await?;

    require_period(state, period_id).await
}

/// Registers an abono. The increment is applied as a clamped pipeline
/// update so concurrent abonos never push amount_paid past amount_due.
pub async fn register_partial_payment(
    state: &AppState,
    period_id: &ObjectId,
    amount: f64,
) -> Result<BillingPeriod, BillingError> {
    if amount <= 0.0 {
        return Err(BillingError::Validation(
            "payment amount must be positive".to_string(),
        ));
    }

    let period = require_period(state, period_id).await?;
    if period.state == PeriodState::Pagado {
        return Ok(period);
    }
    reject_future(&period, today())?;

    state
        .periods
        .update_one(
            doc! { "_id": period_id },
            vec![doc! { "$set": {
                "amount_paid": { "$min": ["$amount_due", { "$add": ["$amount_paid", amount] }] },
                "updated_at": now_bson(),
            } }],
        )
        .await?;

    let updated = require_period(state, period_id).await?;
    if updated.state != PeriodState::Pagado && updated.amount_paid >= updated.amount_due {
        let now = now_bson();
        state
            .periods
            .update_one(
                doc! { "_id": period_id, "state": { "$ne": PeriodState::Pagado.as_str() } },
                doc! { "$set": {
                    "state": PeriodState::Pagado.as_str(),
                    "paid_at": now,
                    "updated_at": now,
                } },
            )
            .await?;
        return require_period(state, period_id).await;
    }
    Ok(updated)
}

/// Suspends any non-paid, non-future period. Suspending an already
/// suspended period is a no-op.
pub async fn suspend_period(
    state: &AppState,
    period_id: &ObjectId,
) -> Result<BillingPeriod, BillingError> {
    let period = require_period(state, period_id).await?;
    reject_future(&period, today())?;

    match period.state {
        PeriodState::Pagado => Err(BillingError::State(
            "cannot suspend a paid period".to_string(),
        )),
        PeriodState::Suspendido => Ok(period),
        PeriodState::Pendiente | PeriodState::Vencido => {
            state
                .periods
                .update_one(
                    doc! { "_id": period_id },
                    doc! { "$set": {
                        "state": PeriodState::Suspendido.as_str(),
                        "updated_at": now_bson(),
                    } },
                )
                .await?;
            require_period(state, period_id).await
        }
    }
}

/// Reactivates a suspended period back to pendiente. Read-time resolution
/// re-derives vencido if the due date has already passed.
pub async fn reactivate_period(
    state: &AppState,
    period_id: &ObjectId,
) -> Result<BillingPeriod, BillingError> {
    let period = require_period(state, period_id).await?;
    if period.state != PeriodState::Suspendido {
        return Err(BillingError::State(format!(
            "cannot reactivate from {}",
            period.state.as_str()
        )));
    }

    state
        .periods
        .update_one(
            doc! { "_id": period_id },
            doc! { "$set": {
                "state": PeriodState::Pendiente.as_str(),
                "updated_at": now_bson(),
            } },
        )
        .await?;
    require_period(state, period_id).await
}

/// Nearest open period plus carried arrears for a client.
pub async fn compute_summary(
    state: &AppState,
    client_id: &ObjectId,
) -> Result<ClientSummary, BillingError> {
    require_client(state, client_id).await?;

    let mut cursor = state.periods.find(doc! { "client_id": client_id }).await?;
    let mut periods = Vec::new();
    while let Some(period) = cursor.try_next().await? {
        periods.push(period);
    }
    Ok(summarize(&periods, today()))
}
