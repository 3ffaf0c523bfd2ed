use anyhow::{Context, Result, bail};
use futures::stream::TryStreamExt;
use mongodb::bson::{DateTime, doc, oid::ObjectId};
use std::time::SystemTime;

use crate::models::{Client, ClientType};

use super::AppState;

pub async fn list_clients(state: &AppState) -> Result<Vec<Client>> {
    let mut cursor = state.clients.find(doc! {}).await?;
    let mut items = Vec::new();
    while let Some(client) = cursor.try_next().await? {
        items.push(client);
    }
    Ok(items)
}

pub async fn get_client_by_id(state: &AppState, id: &ObjectId) -> Result<Option<Client>> {
    state
        .clients
        .find_one(doc! { "_id": id })
        .await
        .map_err(Into::into)
}

pub async fn create_client(
    state: &AppState,
    name: &str,
    client_type: ClientType,
    installation_date: Option<DateTime>,
    first_due_date: Option<DateTime>,
    due_day_of_month: Option<i32>,
    monthly_amount: f64,
    is_active: bool,
    notes: Option<String>,
) -> Result<ObjectId> {
    validate_anchor_fields(due_day_of_month, monthly_amount)?;

    let res = state
        .clients
        .insert_one(Client {
            id: None,
            name: name.to_string(),
            client_type,
            installation_date,
            first_due_date,
            due_day_of_month,
            monthly_amount,
            is_active,
            created_at: Some(DateTime::from_system_time(SystemTime::now())),
            updated_at: None,
            notes,
        })
        .await?;
    res.inserted_id
        .as_object_id()
        .context("client insert missing _id")
}

pub async fn update_client(
    state: &AppState,
    id: &ObjectId,
    name: &str,
    client_type: ClientType,
    installation_date: Option<DateTime>,
    first_due_date: Option<DateTime>,
    due_day_of_month: Option<i32>,
    monthly_amount: f64,
    is_active: bool,
    notes: Option<String>,
) -> Result<()> {
    validate_anchor_fields(due_day_of_month, monthly_amount)?;

    state
        .clients
        .update_one(
            doc! { "_id": id },
            doc! { "$set": {
                "name": name,
                "client_type": client_type.as_str(),
                "installation_date": installation_date,
                "first_due_date": first_due_date,
                "due_day_of_month": due_day_of_month,
                "monthly_amount": monthly_amount,
                "is_active": is_active,
                "notes": notes,
                "updated_at": DateTime::from_system_time(SystemTime::now()),
            } },
        )
        .await?;
    Ok(())
}

/// Clients with billing history are deactivated instead of removed so their
/// periods keep a valid owner.
pub async fn delete_client(state: &AppState, id: &ObjectId) -> Result<()> {
    let has_periods = state
        .periods
        .find_one(doc! { "client_id": id })
        .await?
        .is_some();

    if has_periods {
        state
            .clients
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "is_active": false,
                    "updated_at": DateTime::from_system_time(SystemTime::now()),
                } },
            )
            .await?;
        return Ok(());
    }

    state.clients.delete_one(doc! { "_id": id }).await?;
    Ok(())
}

fn validate_anchor_fields(due_day_of_month: Option<i32>, monthly_amount: f64) -> Result<()> {
    if let Some(day) = due_day_of_month {
        if !(1..=31).contains(&day) {
            bail!("due_day_of_month must be within 1..=31");
        }
    }
    if monthly_amount < 0.0 {
        bail!("monthly_amount must not be negative");
    }
    Ok(())
}
