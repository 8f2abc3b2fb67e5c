use crate::database::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::CartService;
use crate::utils::Clock;
use chrono::{DateTime, Utc};

/// Discount arithmetic. A fixed amount never discounts below zero; the
/// percentage path truncates toward zero on division.
pub fn calculate_discount(subtotal: i64, code: &DiscountCode) -> i64 {
    match code.discount_type {
        DiscountType::Percentage => subtotal * code.discount_value / 100,
        DiscountType::FixedAmount => code.discount_value.min(subtotal),
    }
}

/// Eligibility rules for a code against a cart subtotal at instant `now`.
/// Shared between apply-time and order-placement revalidation.
pub(crate) fn validate_code(
    now: DateTime<Utc>,
    code: &DiscountCode,
    subtotal: i64,
) -> AppResult<()> {
    if now < code.valid_from {
        return Err(AppError::CodeNotYetValid);
    }
    if now > code.valid_until {
        return Err(AppError::CodeExpired);
    }
    if let Some(limit) = code.usage_limit
        && code.used_count >= limit
    {
        return Err(AppError::UsageLimitReached);
    }
    if let Some(minimum) = code.minimum_order_amount
        && subtotal < minimum
    {
        return Err(AppError::MinimumNotMet { minimum });
    }
    Ok(())
}

/// Applies and removes discount codes on a user's cart. Usage counting
/// happens at order placement, not here, so abandoned carts never burn a
/// use.
#[derive(Clone)]
pub struct DiscountService {
    pool: DbPool,
    clock: Clock,
    cart_service: CartService,
}

impl DiscountService {
    pub fn new(pool: DbPool, clock: Clock, cart_service: CartService) -> Self {
        Self {
            pool,
            clock,
            cart_service,
        }
    }

    pub async fn apply_code(&self, user_id: i64, code: &str) -> AppResult<CartResponse> {
        let cart = self
            .cart_service
            .find_cart(user_id)
            .await?
            .ok_or(AppError::CartNotFound)?;

        let code_row = sqlx::query_as::<_, DiscountCode>(
            "SELECT * FROM discount_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?
        .filter(|c| c.is_active)
        .ok_or(AppError::CodeNotFound)?;

        let subtotal: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity * unit_price), 0) FROM cart_items WHERE cart_id = ?",
        )
        .bind(cart.id)
        .fetch_one(&self.pool)
        .await?;

        validate_code(self.clock.now(), &code_row, subtotal)?;

        sqlx::query("UPDATE carts SET discount_code_id = ?, updated_at = ? WHERE id = ?")
            .bind(code_row.id)
            .bind(self.clock.now())
            .bind(cart.id)
            .execute(&self.pool)
            .await?;

        self.cart_service.get_cart(user_id).await
    }

    pub async fn remove_code(&self, user_id: i64) -> AppResult<CartResponse> {
        let cart = self
            .cart_service
            .find_cart(user_id)
            .await?
            .ok_or(AppError::CartNotFound)?;

        sqlx::query("UPDATE carts SET discount_code_id = NULL, updated_at = ? WHERE id = ?")
            .bind(self.clock.now())
            .bind(cart.id)
            .execute(&self.pool)
            .await?;

        self.cart_service.get_cart(user_id).await
    }
}
