//! Linked external identities

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Account entity linking a user to a provider identity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub created_at: DateTime<Utc>,
}

/// New account link payload
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
}
