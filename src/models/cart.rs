use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// One cart row per user, created lazily on first access and kept for the
/// account's lifetime; checkout clears the items, not the row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
    pub discount_code_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// At most one row per (cart, product); `unit_price` is captured when the
/// line is first added and is not live-repriced.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub product_id: i64,
    /// New absolute quantity, not a delta.
    pub quantity: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncCartItem {
    pub product_id: i64,
    pub quantity: i64,
}

/// Guest cart carried in client storage, merged on login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncCartRequest {
    pub items: Vec<SyncCartItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub product_id: i64,
    pub product_name: String,
    pub product_image_url: Option<String>,
    pub unit_price: i64,
    pub quantity: i64,
    pub line_total: i64,
    pub stock_available: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartResponse {
    pub id: i64,
    pub user_id: i64,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<CartItemResponse>,
    pub subtotal: i64,
    pub discount_code: Option<String>,
    pub discount_amount: i64,
    pub total: i64,
}
