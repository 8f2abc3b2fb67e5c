use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MembershipPlan {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub duration_months: i64,
    /// VND.
    pub price: i64,
    /// Strike-through price for discount display.
    pub original_price: Option<i64>,
    pub is_popular: bool,
    pub is_active: bool,
    /// JSON array of feature strings.
    pub features: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlanResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub duration_months: i64,
    pub price: i64,
    pub original_price: Option<i64>,
    pub discount_percentage: Option<i64>,
    pub is_popular: bool,
    pub features: Vec<String>,
}

impl From<MembershipPlan> for PlanResponse {
    fn from(plan: MembershipPlan) -> Self {
        let discount_percentage = discount_percentage(plan.price, plan.original_price);
        let features = parse_features(&plan.features);
        Self {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            duration_months: plan.duration_months,
            price: plan.price,
            original_price: plan.original_price,
            discount_percentage,
            is_popular: plan.is_popular,
            features,
        }
    }
}

fn discount_percentage(price: i64, original_price: Option<i64>) -> Option<i64> {
    match original_price {
        Some(original) if original > price && original > 0 => {
            // Rounded percentage saved against the strike-through price.
            Some(((original - price) * 100 + original / 2) / original)
        }
        _ => None,
    }
}

/// Plans store features as a JSON array; older rows used a comma-separated
/// list, so fall back to splitting.
fn parse_features(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| {
        raw.split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    })
}
