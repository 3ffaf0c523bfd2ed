// billing.rs
// Billing period engine: due-date advancement, read-time state resolution,
// and arrears aggregation for service clients. Pure calendar logic; all
// persistence goes through state::billing.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::models::{BillingPeriod, Client, PeriodState};

/// Errors surfaced by billing operations. Every variant is recoverable by
/// the caller; the engine performs no retries.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("period {year}-{month:02} has not started yet")]
    FuturePeriod { year: i32, month: i32 },
    #[error("invalid state transition: {0}")]
    State(String),
    #[error(transparent)]
    Storage(#[from] mongodb::error::Error),
}

/// Billing anchor read off a client record, in calendar-date form.
#[derive(Debug, Clone)]
pub struct BillingAnchor {
    pub installation_date: Option<NaiveDate>,
    pub first_due_date: Option<NaiveDate>,
    pub due_day_of_month: Option<i32>,
    pub monthly_amount: f64,
}

/// How the anchor drives period advancement, resolved once instead of
/// re-checking optional fields at every call site. An explicit first due
/// date always wins over a day-of-month rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    FixedFirstDue(NaiveDate),
    DayOfMonth(u32),
    None,
}

impl BillingAnchor {
    pub fn from_client(client: &Client) -> Self {
        BillingAnchor {
            installation_date: client.installation_date.map(|d| d.to_chrono().date_naive()),
            first_due_date: client.first_due_date.map(|d| d.to_chrono().date_naive()),
            due_day_of_month: client.due_day_of_month,
            monthly_amount: client.monthly_amount,
        }
    }

    pub fn kind(&self) -> AnchorKind {
        if let Some(first) = self.first_due_date {
            return AnchorKind::FixedFirstDue(first);
        }
        if let Some(day) = self.due_day_of_month {
            // Clamped to 28 so monthly stepping never hits month-length issues.
            return AnchorKind::DayOfMonth(day.clamp(1, 28) as u32);
        }
        AnchorKind::None
    }
}

/// Due date of the next unresolved period, relative to `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextDue {
    pub due_date: NaiveDate,
    pub days_until_due: i64,
    pub overdue: bool,
}

/// Computes the next due date for an anchor, or `None` when the client has
/// no recurring billing configured (neither first due date nor day of month).
pub fn compute_next_due(anchor: &BillingAnchor, today: NaiveDate) -> Option<NextDue> {
    let (mut due, anchor_day) = match anchor.kind() {
        AnchorKind::FixedFirstDue(first) => {
            // Advance one calendar month at a time from the anchor until the
            // candidate reaches today. Each candidate is rebuilt from the
            // original day-of-month so clamping in short months is not sticky.
            let mut candidate = first;
            let mut step = 0u32;
            while candidate < today {
                step += 1;
                let (y, m) = month_add(first.year(), first.month(), step);
                candidate = date_in_month(y, m, first.day());
            }
            (candidate, first.day())
        }
        AnchorKind::DayOfMonth(day) => {
            let this_month = date_in_month(today.year(), today.month(), day);
            let due = if today > this_month {
                let (y, m) = month_add(today.year(), today.month(), 1);
                date_in_month(y, m, day)
            } else {
                this_month
            };
            (due, day)
        }
        AnchorKind::None => return None,
    };

    // Service cannot be due before it started: shift to the month after the
    // installation date, keeping the anchor's day-of-month.
    if let Some(installed) = anchor.installation_date {
        if installed > due {
            let (y, m) = month_add(installed.year(), installed.month(), 1);
            due = date_in_month(y, m, anchor_day);
        }
    }

    let days_until_due = (due - today).num_days();
    Some(NextDue {
        due_date: due,
        days_until_due,
        overdue: due < today,
    })
}

/// Classifies a period for display and action gating without mutating it.
/// `pagado` and `suspendido` are sticky; otherwise overdue is re-derived
/// from the due date, regardless of what state was stored.
pub fn resolve_state(period: &BillingPeriod, today: NaiveDate) -> PeriodState {
    match period.state {
        PeriodState::Pagado => PeriodState::Pagado,
        PeriodState::Suspendido => PeriodState::Suspendido,
        PeriodState::Pendiente | PeriodState::Vencido => {
            if period.due_date.to_chrono().date_naive() < today {
                PeriodState::Vencido
            } else {
                PeriodState::Pendiente
            }
        }
    }
}

/// Calendar-month comparison only: a period due on the 1st of the current
/// month is never future, even on the last day of the prior month.
pub fn is_future_period(period_year: i32, period_month: i32, today: NaiveDate) -> bool {
    period_year * 100 + period_month > today.year() * 100 + today.month() as i32
}

/// Per-client collection summary: nearest open period plus carried arrears.
#[derive(Debug, Clone)]
pub struct ClientSummary {
    pub next_due: Option<BillingPeriod>,
    pub arrears: f64,
    pub amount_to_collect: f64,
}

/// Aggregates a client's non-future periods. `arrears` sums unpaid balances
/// of derived-vencido periods; `amount_to_collect` is the next installment's
/// balance plus arrears excluding that same period, so an overdue next
/// period is never counted twice.
pub fn summarize(periods: &[BillingPeriod], today: NaiveDate) -> ClientSummary {
    let mut arrears = 0.0;
    let mut next: Option<&BillingPeriod> = None;

    for period in periods {
        if is_future_period(period.period_year, period.period_month, today) {
            continue;
        }
        let state = resolve_state(period, today);
        if state == PeriodState::Vencido {
            arrears += (period.amount_due - period.amount_paid).max(0.0);
        }
        if matches!(state, PeriodState::Pendiente | PeriodState::Vencido) {
            let key = period.period_year * 100 + period.period_month;
            let is_sooner = match next {
                Some(current) => key < current.period_year * 100 + current.period_month,
                None => true,
            };
            if is_sooner {
                next = Some(period);
            }
        }
    }

    let amount_to_collect = match next {
        Some(period) => {
            let balance = (period.amount_due - period.amount_paid).max(0.0);
            let arrears_excluding_next = if resolve_state(period, today) == PeriodState::Vencido {
                arrears - balance
            } else {
                arrears
            };
            balance + arrears_excluding_next
        }
        None => arrears,
    };

    let next_due = next.map(|period| {
        let mut period = period.clone();
        period.state = resolve_state(&period, today);
        period
    });

    ClientSummary {
        next_due,
        arrears,
        amount_to_collect,
    }
}

/// Steps `(year, month)` forward by `step` calendar months.
pub fn month_add(year: i32, month: u32, step: u32) -> (i32, u32) {
    let months = year as i64 * 12 + (month as i64 - 1) + step as i64;
    ((months.div_euclid(12)) as i32, (months.rem_euclid(12) + 1) as u32)
}

/// Builds a date in the given month, clamping the day to the month's length.
pub fn date_in_month(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day.max(1))
        .unwrap_or_else(|| last_day_of_month(year, month))
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = month_add(year, month, 1);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .pred_opt()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{DateTime, oid::ObjectId};

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn anchor_day(day: i32) -> BillingAnchor {
        BillingAnchor {
            installation_date: None,
            first_due_date: None,
            due_day_of_month: Some(day),
            monthly_amount: 500.0,
        }
    }

    fn anchor_first_due(date: NaiveDate) -> BillingAnchor {
        BillingAnchor {
            installation_date: None,
            first_due_date: Some(date),
            due_day_of_month: None,
            monthly_amount: 500.0,
        }
    }

    fn period(
        year: i32,
        month: i32,
        due: NaiveDate,
        amount_due: f64,
        amount_paid: f64,
        state: PeriodState,
    ) -> BillingPeriod {
        BillingPeriod {
            id: Some(ObjectId::new()),
            client_id: ObjectId::new(),
            period_year: year,
            period_month: month,
            due_date: DateTime::from_chrono(due.and_hms_opt(0, 0, 0).unwrap().and_utc()),
            amount_due,
            amount_paid,
            state,
            paid_at: None,
            created_at: None,
            updated_at: None,
            notes: None,
        }
    }

    #[test]
    fn day_of_month_due_today_stays_in_current_month() {
        let next = compute_next_due(&anchor_day(15), d(2024, 3, 15)).unwrap();
        assert_eq!(next.due_date, d(2024, 3, 15));
        assert_eq!(next.days_until_due, 0);
        assert!(!next.overdue);
    }

    #[test]
    fn day_of_month_past_due_day_rolls_to_next_month() {
        let next = compute_next_due(&anchor_day(15), d(2024, 3, 20)).unwrap();
        assert_eq!(next.due_date, d(2024, 4, 15));
        assert_eq!(next.days_until_due, 26);
        assert!(!next.overdue);
    }

    #[test]
    fn day_of_month_rolls_over_december() {
        let next = compute_next_due(&anchor_day(15), d(2024, 12, 20)).unwrap();
        assert_eq!(next.due_date, d(2025, 1, 15));
    }

    #[test]
    fn day_of_month_above_28_is_clamped() {
        let next = compute_next_due(&anchor_day(31), d(2024, 2, 10)).unwrap();
        assert_eq!(next.due_date, d(2024, 2, 28));
    }

    #[test]
    fn first_due_date_advances_month_by_month_until_today() {
        let next = compute_next_due(&anchor_first_due(d(2024, 1, 10)), d(2024, 5, 3)).unwrap();
        assert_eq!(next.due_date, d(2024, 5, 10));
        assert_eq!(next.days_until_due, 7);
        assert!(!next.overdue);
    }

    #[test]
    fn first_due_date_in_future_is_returned_unchanged() {
        let next = compute_next_due(&anchor_first_due(d(2024, 8, 5)), d(2024, 5, 3)).unwrap();
        assert_eq!(next.due_date, d(2024, 8, 5));
    }

    #[test]
    fn first_due_advancement_never_lands_before_today() {
        let first = d(2024, 1, 10);
        for offset in 0..365 {
            let today = d(2024, 1, 1) + chrono::Duration::days(offset);
            let next = compute_next_due(&anchor_first_due(first), today).unwrap();
            assert!(next.due_date >= today);
            assert!(!next.overdue);
        }
    }

    #[test]
    fn first_due_day_31_clamps_per_month_without_drifting() {
        // Jan 31 anchor: February clamps to 29 (leap year) but March goes
        // back to the 31st instead of inheriting the clamp.
        let next = compute_next_due(&anchor_first_due(d(2024, 1, 31)), d(2024, 3, 1)).unwrap();
        assert_eq!(next.due_date, d(2024, 3, 31));
    }

    #[test]
    fn installation_date_pushes_due_to_following_month() {
        let anchor = BillingAnchor {
            installation_date: Some(d(2024, 5, 20)),
            first_due_date: None,
            due_day_of_month: Some(10),
            monthly_amount: 500.0,
        };
        let next = compute_next_due(&anchor, d(2024, 5, 5)).unwrap();
        assert_eq!(next.due_date, d(2024, 6, 10));
    }

    #[test]
    fn missing_anchor_yields_no_billing() {
        let anchor = BillingAnchor {
            installation_date: Some(d(2024, 1, 1)),
            first_due_date: None,
            due_day_of_month: None,
            monthly_amount: 500.0,
        };
        assert!(compute_next_due(&anchor, d(2024, 5, 5)).is_none());
        assert_eq!(anchor.kind(), AnchorKind::None);
    }

    #[test]
    fn first_due_date_takes_precedence_over_day_of_month() {
        let anchor = BillingAnchor {
            installation_date: None,
            first_due_date: Some(d(2024, 4, 20)),
            due_day_of_month: Some(5),
            monthly_amount: 500.0,
        };
        assert_eq!(anchor.kind(), AnchorKind::FixedFirstDue(d(2024, 4, 20)));
    }

    #[test]
    fn resolve_state_derives_vencido_from_due_date() {
        let p = period(2024, 3, d(2024, 3, 15), 500.0, 0.0, PeriodState::Pendiente);
        assert_eq!(resolve_state(&p, d(2024, 3, 16)), PeriodState::Vencido);
        assert_eq!(resolve_state(&p, d(2024, 3, 15)), PeriodState::Pendiente);
    }

    #[test]
    fn resolve_state_keeps_pagado_and_suspendido_sticky() {
        let paid = period(2024, 3, d(2024, 3, 15), 500.0, 500.0, PeriodState::Pagado);
        assert_eq!(resolve_state(&paid, d(2025, 1, 1)), PeriodState::Pagado);

        let suspended = period(2024, 3, d(2024, 3, 15), 500.0, 0.0, PeriodState::Suspendido);
        assert_eq!(resolve_state(&suspended, d(2025, 1, 1)), PeriodState::Suspendido);
    }

    #[test]
    fn stored_vencido_is_rederived_from_due_date() {
        // A stale stored "vencido" on a period whose due date has not passed
        // reads back as pendiente.
        let p = period(2024, 6, d(2024, 6, 15), 500.0, 0.0, PeriodState::Vencido);
        assert_eq!(resolve_state(&p, d(2024, 6, 1)), PeriodState::Pendiente);
    }

    #[test]
    fn future_period_uses_month_granularity() {
        assert!(is_future_period(2024, 4, d(2024, 3, 31)));
        // Due on the 1st of the current month: never future, even though the
        // day has not arrived within the month.
        assert!(!is_future_period(2024, 3, d(2024, 3, 1)));
        assert!(!is_future_period(2024, 2, d(2024, 3, 1)));
        assert!(is_future_period(2025, 1, d(2024, 12, 31)));
    }

    #[test]
    fn summarize_does_not_double_count_next_period_in_arrears() {
        let today = d(2024, 3, 20);
        let periods = vec![
            period(2024, 1, d(2024, 1, 15), 500.0, 100.0, PeriodState::Pendiente),
            period(2024, 2, d(2024, 2, 15), 500.0, 0.0, PeriodState::Pendiente),
        ];
        let summary = summarize(&periods, today);
        assert_eq!(summary.arrears, 900.0);
        let next = summary.next_due.unwrap();
        assert_eq!((next.period_year, next.period_month), (2024, 1));
        assert_eq!(next.state, PeriodState::Vencido);
        // next installment balance (400) + remaining arrears (500)
        assert_eq!(summary.amount_to_collect, 900.0);
    }

    #[test]
    fn summarize_skips_future_suspended_and_paid_periods() {
        let today = d(2024, 3, 20);
        let periods = vec![
            period(2024, 1, d(2024, 1, 15), 500.0, 500.0, PeriodState::Pagado),
            period(2024, 2, d(2024, 2, 15), 500.0, 0.0, PeriodState::Suspendido),
            period(2024, 3, d(2024, 3, 25), 500.0, 0.0, PeriodState::Pendiente),
            period(2024, 4, d(2024, 4, 25), 500.0, 0.0, PeriodState::Pendiente),
        ];
        let summary = summarize(&periods, today);
        assert_eq!(summary.arrears, 0.0);
        let next = summary.next_due.unwrap();
        assert_eq!((next.period_year, next.period_month), (2024, 3));
        assert_eq!(next.state, PeriodState::Pendiente);
        assert_eq!(summary.amount_to_collect, 500.0);
    }

    #[test]
    fn summarize_with_no_open_periods_reports_nothing_to_collect() {
        let today = d(2024, 3, 20);
        let periods = vec![period(
            2024,
            1,
            d(2024, 1, 15),
            500.0,
            500.0,
            PeriodState::Pagado,
        )];
        let summary = summarize(&periods, today);
        assert!(summary.next_due.is_none());
        assert_eq!(summary.arrears, 0.0);
        assert_eq!(summary.amount_to_collect, 0.0);
    }

    #[test]
    fn month_add_handles_year_rollover() {
        assert_eq!(month_add(2024, 12, 1), (2025, 1));
        assert_eq!(month_add(2024, 1, 11), (2024, 12));
        assert_eq!(month_add(2024, 1, 24), (2026, 1));
    }
}
