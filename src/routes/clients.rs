use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    models::{Client, ClientType},
    state::{AppState, create_client, delete_client, get_client_by_id, list_clients, update_client},
};

use super::{clean_opt, datetime_to_string, error_response, parse_object_id,
    parse_optional_datetime_field};

#[derive(Serialize)]
pub struct ClientResponse {
    pub id: String,
    pub name: String,
    pub client_type: &'static str,
    pub installation_date: Option<String>,
    pub first_due_date: Option<String>,
    pub due_day_of_month: Option<i32>,
    pub monthly_amount: f64,
    pub is_active: bool,
    pub notes: Option<String>,
}

impl ClientResponse {
    fn from_client(client: &Client) -> Option<Self> {
        client.id.map(|id| ClientResponse {
            id: id.to_hex(),
            name: client.name.clone(),
            client_type: client.client_type.as_str(),
            installation_date: client.installation_date.as_ref().map(datetime_to_string),
            first_due_date: client.first_due_date.as_ref().map(datetime_to_string),
            due_day_of_month: client.due_day_of_month,
            monthly_amount: client.monthly_amount,
            is_active: client.is_active,
            notes: client.notes.clone(),
        })
    }
}

#[derive(Deserialize)]
pub struct ClientFormData {
    pub name: String,
    pub client_type: String,
    #[serde(default)]
    pub installation_date: Option<String>,
    #[serde(default)]
    pub first_due_date: Option<String>,
    #[serde(default)]
    pub due_day_of_month: Option<i32>,
    #[serde(default)]
    pub monthly_amount: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_active() -> bool {
    true
}

fn parse_client_type(value: &str) -> Result<ClientType, String> {
    match value.to_lowercase().as_str() {
        "servicio" => Ok(ClientType::Servicio),
        "revendedor" => Ok(ClientType::Revendedor),
        _ => Err("Tipo de cliente inválido".into()),
    }
}

struct ParsedClientForm {
    name: String,
    client_type: ClientType,
    installation_date: Option<mongodb::bson::DateTime>,
    first_due_date: Option<mongodb::bson::DateTime>,
    due_day_of_month: Option<i32>,
    monthly_amount: f64,
    is_active: bool,
    notes: Option<String>,
}

fn parse_client_form(form: ClientFormData) -> Result<ParsedClientForm, String> {
    let name = form.name.trim().to_string();
    if name.is_empty() {
        return Err("Nombre es obligatorio".into());
    }
    Ok(ParsedClientForm {
        name,
        client_type: parse_client_type(&form.client_type)?,
        installation_date: parse_optional_datetime_field(
            form.installation_date,
            "Fecha de instalación",
        )?,
        first_due_date: parse_optional_datetime_field(form.first_due_date, "Primer vencimiento")?,
        due_day_of_month: form.due_day_of_month,
        monthly_amount: form.monthly_amount,
        is_active: form.is_active,
        notes: clean_opt(form.notes),
    })
}

pub async fn clients_index(State(state): State<Arc<AppState>>) -> Response {
    match list_clients(&state).await {
        Ok(clients) => {
            let rows: Vec<ClientResponse> = clients
                .iter()
                .filter_map(ClientResponse::from_client)
                .collect();
            Json(rows).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn clients_show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let object_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match get_client_by_id(&state, &object_id).await {
        Ok(Some(client)) => match ClientResponse::from_client(&client) {
            Some(row) => Json(row).into_response(),
            None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Cliente no encontrado"),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn clients_create(
    State(state): State<Arc<AppState>>,
    Json(form): Json<ClientFormData>,
) -> Response {
    let parsed = match parse_client_form(form) {
        Ok(parsed) => parsed,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match create_client(
        &state,
        &parsed.name,
        parsed.client_type,
        parsed.installation_date,
        parsed.first_due_date,
        parsed.due_day_of_month,
        parsed.monthly_amount,
        parsed.is_active,
        parsed.notes,
    )
    .await
    {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": id.to_hex() })),
        )
            .into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

pub async fn clients_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(form): Json<ClientFormData>,
) -> Response {
    let object_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match get_client_by_id(&state, &object_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Cliente no encontrado"),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }

    let parsed = match parse_client_form(form) {
        Ok(parsed) => parsed,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match update_client(
        &state,
        &object_id,
        &parsed.name,
        parsed.client_type,
        parsed.installation_date,
        parsed.first_due_date,
        parsed.due_day_of_month,
        parsed.monthly_amount,
        parsed.is_active,
        parsed.notes,
    )
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

pub async fn clients_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let object_id = match parse_object_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match get_client_by_id(&state, &object_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Cliente no encontrado"),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }

    match delete_client(&state, &object_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
