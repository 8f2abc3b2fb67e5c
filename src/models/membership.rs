use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Lifecycle of one ledger entry. `Active` is the only non-terminal state:
/// renewal supersedes the entry (`Renewed`), the expiry sweep closes it
/// (`Expired`), the user closes it (`Cancelled`), or the grace-period sweep
/// locks the account (`Suspended`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
pub enum MembershipStatus {
    Active,
    Renewed,
    Expired,
    Cancelled,
    Suspended,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
pub enum PaymentMethod {
    #[serde(rename = "COD")]
    #[sqlx(rename = "COD")]
    Cod,
    #[serde(rename = "VNPay")]
    #[sqlx(rename = "VNPay")]
    VnPay,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// One billing period in a user's membership ledger. Rows are appended, not
/// rewritten: a renewal creates a fresh row and flips this one to `Renewed`,
/// so the full billing history survives.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MembershipTransaction {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub transaction_date: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: MembershipStatus,
    pub auto_renewal: bool,
    pub renewal_attempts: i64,
    pub next_renewal_date: Option<DateTime<Utc>>,
    pub last_renewal_attempt: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub grace_period_start: Option<DateTime<Utc>>,
    pub grace_period_end: Option<DateTime<Utc>>,
    pub is_in_grace_period: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    pub plan_id: i64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenewRequest {
    pub plan_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelMembershipRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub transaction_id: i64,
    pub plan_id: i64,
    pub plan_name: String,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub status: MembershipStatus,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct MembershipTransactionResponse {
    pub id: i64,
    pub plan_name: String,
    pub transaction_date: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: MembershipStatus,
    pub auto_renewal: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembershipStatusResponse {
    pub has_active_membership: bool,
    pub current_plan_name: Option<String>,
    pub membership_start: Option<DateTime<Utc>>,
    pub membership_expiry: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub history: Vec<MembershipTransactionResponse>,
}
