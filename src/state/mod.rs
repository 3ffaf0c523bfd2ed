// state module: AppState, initialization, and re-exports of submodules.

use anyhow::Result;
use mongodb::{Client as MongoClient, Collection};
use std::env;

use crate::models::{BillingPeriod, Client};

mod billing;
mod clients;
mod seed;

pub use billing::*;
pub use clients::*;

#[derive(Clone)]
pub struct AppState {
    pub clients: Collection<Client>,
    pub periods: Collection<BillingPeriod>,
}

pub async fn init_state() -> Result<AppState> {
    let uri = env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let db_name = env::var("MONGODB_DB").unwrap_or_else(|_| "fichasdev".to_string());

    let client = MongoClient::with_uri_str(uri).await?;
    let db = client.database(&db_name);

    seed::ensure_collections(&db).await?;
    seed::ensure_indexes(&db).await?;

    // Only seed when the database is effectively empty (no clients).
    if seed::is_database_empty(&db).await? {
        seed::seed_sample_clients(&db).await?;
    }

    Ok(AppState {
        clients: db.collection::<Client>("clients"),
        periods: db.collection::<BillingPeriod>("billing_periods"),
    })
}
