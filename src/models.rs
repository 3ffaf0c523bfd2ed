// models.rs
// Domain models for MongoDB collections and seed data (clientes.json).

use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Client kinds. Only `servicio` clients carry recurring billing;
/// `revendedor` clients receive ficha inventory and are billed elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Servicio,
    Revendedor,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Servicio => "servicio",
            ClientType::Revendedor => "revendedor",
        }
    }
}

/// Stored state of a billing period. `vencido` is re-derived from
/// `due_date` at read time; `pagado` and `suspendido` are sticky.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PeriodState {
    Pendiente,
    Pagado,
    Vencido,
    Suspendido,
}

impl PeriodState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodState::Pendiente => "pendiente",
            PeriodState::Pagado => "pagado",
            PeriodState::Vencido => "vencido",
            PeriodState::Suspendido => "suspendido",
        }
    }
}

/// Client document stored in MongoDB. The billing anchor fields
/// (installation_date / first_due_date / due_day_of_month / monthly_amount)
/// live on the client record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub client_type: ClientType,
    pub installation_date: Option<DateTime>,
    pub first_due_date: Option<DateTime>,
    pub due_day_of_month: Option<i32>,
    pub monthly_amount: f64,
    pub is_active: bool,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
    pub notes: Option<String>,
}

/// One billing cycle for a service client. Unique per
/// (client_id, period_year, period_month); never deleted, only
/// transitioned through states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingPeriod {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub client_id: ObjectId,
    pub period_year: i32,
    pub period_month: i32,
    pub due_date: DateTime,
    pub amount_due: f64,
    pub amount_paid: f64,
    pub state: PeriodState,
    pub paid_at: Option<DateTime>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
    pub notes: Option<String>,
}
