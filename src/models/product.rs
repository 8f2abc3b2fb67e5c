use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// VND.
    pub price: i64,
    /// Live stock on hand.
    pub quantity: i64,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
