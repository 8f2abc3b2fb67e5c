use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User record as this service sees it. Identity (credentials, signup)
/// lives in the auth service; the membership projection columns are a
/// cache of the latest active ledger entry, maintained by
/// `MembershipService` and repairable from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub has_membership: bool,
    pub membership_start: Option<DateTime<Utc>>,
    pub membership_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
