use anyhow::Result;
use mongodb::{
    Database, IndexModel,
    bson::doc,
    options::IndexOptions,
};
use serde::de::DeserializeOwned;
use std::{env, fs};

use crate::models::Client;

pub(super) async fn is_database_empty(db: &Database) -> Result<bool> {
    let clients = db.collection::<Client>("clients");
    let count = clients.estimated_document_count().await?;
    Ok(count == 0)
}

pub(super) async fn ensure_collections(db: &Database) -> Result<()> {
    let existing = db.list_collection_names().await?;
    if !existing.iter().any(|name| name == "clients") {
        db.create_collection("clients").await?;
    }
    if !existing.iter().any(|name| name == "billing_periods") {
        db.create_collection("billing_periods").await?;
    }
    Ok(())
}

/// One period per client per calendar month: the unique index is what lets
/// concurrent ensure/generate calls treat a duplicate insert as a no-op.
pub(super) async fn ensure_indexes(db: &Database) -> Result<()> {
    let periods = db.collection::<crate::models::BillingPeriod>("billing_periods");
    let index = IndexModel::builder()
        .keys(doc! { "client_id": 1, "period_year": 1, "period_month": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build();
    periods.create_index(index).await?;
    Ok(())
}

pub(super) fn load_json_array<T: DeserializeOwned>(
    env_key: &str,
    default_path: &str,
) -> Result<Vec<T>> {
    let path = env::var(env_key).unwrap_or_else(|_| default_path.to_string());
    if let Ok(contents) = fs::read_to_string(&path) {
        let parsed = serde_json::from_str::<Vec<T>>(&contents)?;
        Ok(parsed)
    } else {
        Ok(Vec::new())
    }
}

pub(super) async fn seed_sample_clients(db: &Database) -> Result<()> {
    let clients = db.collection::<Client>("clients");
    let seeded: Vec<Client> = load_json_array("CLIENTS_FILE", "./data/clientes.json")?;

    for client in seeded {
        clients
            .insert_one(Client {
                id: None,
                ..client
            })
            .await?;
    }
    Ok(())
}
