use crate::database::DbPool;
use crate::error::{AppError, AppResult};
use crate::external::Notification;
use crate::models::*;
use crate::services::NotificationService;
use crate::services::discount_service::{calculate_discount, validate_code};
use crate::utils::{Clock, PaginationParams, Paginated, validate_vn_phone};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

/// Converts a reconciled cart into an immutable order: stock is decremented
/// conditionally per line, the applied discount is settled, and the cart is
/// cleared only after the order is safely persisted.
#[derive(Clone)]
pub struct OrderService {
    pool: DbPool,
    clock: Clock,
    notifications: NotificationService,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    product_id: i64,
    product_name: String,
    quantity: i64,
    unit_price: i64,
}

impl OrderService {
    pub fn new(pool: DbPool, clock: Clock, notifications: NotificationService) -> Self {
        Self {
            pool,
            clock,
            notifications,
        }
    }

    pub async fn create_order(
        &self,
        user_id: i64,
        req: CreateOrderRequest,
    ) -> AppResult<OrderResponse> {
        validate_delivery(&req)?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::EmptyCart)?;

        let lines = sqlx::query_as::<_, OrderLineRow>(
            "SELECT ci.product_id, p.name AS product_name, ci.quantity, ci.unit_price \
             FROM cart_items ci \
             JOIN products p ON p.id = ci.product_id \
             WHERE ci.cart_id = ? \
             ORDER BY ci.id",
        )
        .bind(cart.id)
        .fetch_all(&self.pool)
        .await?;

        if lines.is_empty() {
            return Err(AppError::EmptyCart);
        }

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        // Conditional decrement per line: the guard in the WHERE clause is
        // what makes concurrent checkouts unable to oversell a product.
        for line in &lines {
            let result = sqlx::query(
                "UPDATE products SET quantity = quantity - ? WHERE id = ? AND quantity >= ?",
            )
            .bind(line.quantity)
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?")
                        .bind(line.product_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match available {
                    Some(available) => AppError::InsufficientStock { available },
                    None => AppError::ProductNotFound,
                });
            }
        }

        let subtotal: i64 = lines.iter().map(|l| l.unit_price * l.quantity).sum();

        // Settle the applied code now: re-validate against the final
        // subtotal and consume one use. A code that went stale since it was
        // applied fails the order with its specific error.
        let mut discount_amount = 0i64;
        let mut discount_code_id = None;
        if let Some(code_id) = cart.discount_code_id {
            let code = sqlx::query_as::<_, DiscountCode>(
                "SELECT * FROM discount_codes WHERE id = ?",
            )
            .bind(code_id)
            .fetch_optional(&mut *tx)
            .await?
            .filter(|c| c.is_active)
            .ok_or(AppError::CodeNotFound)?;

            validate_code(now, &code, subtotal)?;
            discount_amount = calculate_discount(subtotal, &code);

            sqlx::query("UPDATE discount_codes SET used_count = used_count + 1 WHERE id = ?")
                .bind(code.id)
                .execute(&mut *tx)
                .await?;
            discount_code_id = Some(code.id);
        }

        let total = subtotal - discount_amount;
        let order_number = next_order_number(&mut tx, now).await?;

        let order_id: i64 = sqlx::query_scalar(
            "INSERT INTO orders \
             (order_number, user_id, order_date, status, subtotal_amount, discount_amount, \
              total_amount, receiver_name, receiver_phone, delivery_address, city, district, \
              ward, notes, payment_method, payment_status, discount_code_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&order_number)
        .bind(user_id)
        .bind(now)
        .bind(OrderStatus::Pending)
        .bind(subtotal)
        .bind(discount_amount)
        .bind(total)
        .bind(req.receiver_name.trim())
        .bind(req.receiver_phone.trim())
        .bind(req.delivery_address.trim())
        .bind(req.city.trim())
        .bind(req.district.trim())
        .bind(req.ward.trim())
        .bind(&req.notes)
        .bind(req.payment_method)
        .bind(PaymentStatus::Pending)
        .bind(discount_code_id)
        .fetch_one(&mut *tx)
        .await?;

        // Snapshot every line; the order stays truthful however the catalog
        // changes later.
        for line in &lines {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.notifications
            .dispatch(
                &user.email,
                &user.full_name,
                &Notification::OrderConfirmation {
                    order_number: &order_number,
                    total_amount: total,
                },
            )
            .await;

        // The cart is cleared only after the order exists. If clearing
        // fails, the order stands; the stale cart is an inconvenience, not
        // a correctness problem.
        if let Err(e) = self.clear_cart_after_order(cart.id).await {
            log::warn!("order {order_number} placed but cart {} not cleared: {e:?}", cart.id);
        }

        self.get_order(order_id, user_id).await
    }

    async fn clear_cart_after_order(&self, cart_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("UPDATE carts SET discount_code_id = NULL, updated_at = ? WHERE id = ?")
            .bind(self.clock.now())
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_order(&self, order_id: i64, user_id: i64) -> AppResult<OrderResponse> {
        let order = self.find_order(order_id).await?;
        if order.user_id != user_id {
            return Err(AppError::Forbidden);
        }

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = ? ORDER BY id",
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderResponse::from_order(order, items))
    }

    pub async fn get_user_orders(
        &self,
        user_id: i64,
        params: &PaginationParams,
    ) -> AppResult<Paginated<OrderSummaryResponse>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, OrderSummaryResponse>(
            "SELECT o.id, o.order_number, o.order_date, o.status, o.total_amount, \
                    (SELECT COUNT(*) FROM order_items oi WHERE oi.order_id = o.id) AS item_count \
             FROM orders o \
             WHERE o.user_id = ? \
             ORDER BY o.order_date DESC, o.id DESC \
             LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(params.per_page() as i64)
        .bind(params.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(items, params, total))
    }

    /// Only pending orders can be cancelled; cancellation puts the
    /// decremented stock back on the shelf.
    pub async fn cancel_order(&self, order_id: i64, user_id: i64) -> AppResult<()> {
        let order = self.find_order(order_id).await?;
        if order.user_id != user_id {
            return Err(AppError::Forbidden);
        }
        if order.status != OrderStatus::Pending {
            return Err(AppError::InvalidOrderState(order.status.to_string()));
        }

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = ?",
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
            .bind(OrderStatus::Cancelled)
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        for item in &items {
            sqlx::query("UPDATE products SET quantity = quantity + ? WHERE id = ?")
                .bind(item.quantity)
                .bind(item.product_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_order(&self, order_id: i64) -> AppResult<Order> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::OrderNotFound)
    }
}

/// `ORD-YYYYMMDD-NNNN` with a per-day sequence. The counter row is bumped
/// atomically inside the placement transaction, so concurrent checkouts get
/// distinct numbers.
async fn next_order_number(
    tx: &mut Transaction<'_, Sqlite>,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let day = now.format("%Y%m%d").to_string();
    let seq: i64 = sqlx::query_scalar(
        "INSERT INTO order_counters (day, seq) VALUES (?, 1) \
         ON CONFLICT (day) DO UPDATE SET seq = seq + 1 \
         RETURNING seq",
    )
    .bind(&day)
    .fetch_one(&mut **tx)
    .await?;

    Ok(format!("ORD-{day}-{seq:04}"))
}

fn validate_delivery(req: &CreateOrderRequest) -> AppResult<()> {
    for (value, field) in [
        (&req.receiver_name, "receiver_name"),
        (&req.delivery_address, "delivery_address"),
        (&req.city, "city"),
        (&req.district, "district"),
        (&req.ward, "ward"),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::ValidationError(format!("{field} is required")));
        }
    }
    validate_vn_phone(req.receiver_phone.trim())
}
