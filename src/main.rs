// main.rs
// Axum server wiring: initializes MongoDB state, builds the JSON router, and
// serves on :8080.
//
// Endpoints:
// - GET/POST /clients                          -> client CRUD
// - GET  /clients/{id}/billing/periods         -> periods with derived states
// - GET  /clients/{id}/billing/summary         -> next due + arrears
// - POST /clients/{id}/billing/ensure          -> lazily create next period
// - POST /clients/{id}/billing/generate        -> create periods for a range
// - POST /billing/periods/{id}/pay|abono|suspend|reactivate
// - POST /billing/sweep                        -> ensure billing is current

use axum::{
    Router,
    routing::{get, post},
};
use dotenvy::dotenv;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use fichasdev::{routes, state};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let state = Arc::new(
        state::init_state()
            .await
            .expect("failed to initialize MongoDB state"),
    );

    let app = Router::new()
        .route(
            "/clients",
            get(routes::clients_index).post(routes::clients_create),
        )
        .route("/clients/{id}", get(routes::clients_show))
        .route("/clients/{id}/update", post(routes::clients_update))
        .route("/clients/{id}/delete", post(routes::clients_delete))
        .route("/clients/{id}/billing/periods", get(routes::periods_index))
        .route("/clients/{id}/billing/summary", get(routes::billing_summary))
        .route("/clients/{id}/billing/ensure", post(routes::billing_ensure))
        .route(
            "/clients/{id}/billing/generate",
            post(routes::billing_generate),
        )
        .route("/billing/periods/{id}/pay", post(routes::period_pay))
        .route("/billing/periods/{id}/abono", post(routes::period_abono))
        .route("/billing/periods/{id}/suspend", post(routes::period_suspend))
        .route(
            "/billing/periods/{id}/reactivate",
            post(routes::period_reactivate),
        )
        .route("/billing/sweep", post(routes::billing_sweep))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("listening on http://{addr}");
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
